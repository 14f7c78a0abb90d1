// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use lamina_core::geometry::Rect;
use lamina_core::trace::{
    BitmapEvent, DamageEvent, ElementChangeEvent, ElementEvent, LeakEvent, TeardownEvent,
    TraceSink, UpdateBeginEvent, UpdateCommitEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

struct R(Rect);

impl std::fmt::Display for R {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Rect { origin, size } = self.0;
        write!(f, "{}x{}@{},{}", size.width, size.height, origin.x, origin.y)
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_bitmap_created(&mut self, e: &BitmapEvent) {
        let _ = writeln!(
            self.writer,
            "[bitmap:new] resource={} {:?} {}x{}",
            e.resource.0, e.format, e.size.width, e.size.height,
        );
    }

    fn on_bitmap_freed(&mut self, e: &BitmapEvent) {
        let _ = writeln!(self.writer, "[bitmap:free] resource={}", e.resource.0);
    }

    fn on_bitmap_leaked(&mut self, e: &LeakEvent) {
        let _ = writeln!(
            self.writer,
            "[bitmap:LEAK] resource={} retained={}",
            e.resource.0, e.retain_count,
        );
    }

    fn on_update_begin(&mut self, e: &UpdateBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[update:begin] update={} priority={}",
            e.update.0, e.priority,
        );
    }

    fn on_update_commit(&mut self, e: &UpdateCommitEvent) {
        let status = if e.ok { "ok" } else { "FAILED" };
        let _ = writeln!(
            self.writer,
            "[update:commit] update={} ops={} {status}",
            e.update.0, e.enlisted,
        );
    }

    fn on_element_added(&mut self, e: &ElementEvent) {
        let _ = writeln!(
            self.writer,
            "[element:add] element={} resource={} layer={} dest={}",
            e.element.0,
            e.resource.0,
            e.layer,
            R(e.dest),
        );
    }

    fn on_element_removed(&mut self, e: &ElementEvent) {
        let _ = writeln!(
            self.writer,
            "[element:remove] element={} resource={}",
            e.element.0, e.resource.0,
        );
    }

    fn on_element_changed(&mut self, e: &ElementChangeEvent) {
        let swapped = if e.source_swapped { " +source" } else { "" };
        let _ = writeln!(
            self.writer,
            "[element:change] element={} {:?}{swapped}",
            e.element.0, e.mask,
        );
    }

    fn on_damage(&mut self, e: &DamageEvent) {
        let _ = writeln!(
            self.writer,
            "[damage] update={} resource={} rect={}",
            e.update.0,
            e.resource.0,
            R(e.rect),
        );
    }

    fn on_teardown(&mut self, e: &TeardownEvent) {
        let _ = writeln!(
            self.writer,
            "[teardown] elements={} bitmaps={} errors={}",
            e.elements_removed, e.bitmaps_closed, e.errors,
        );
    }
}
