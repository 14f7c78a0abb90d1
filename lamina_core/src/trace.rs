// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for compositor operations.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! compositor calls as bitmaps, elements, and update transactions change
//! state. All method bodies default to no-ops, so implementing only the events
//! you care about is fine.
//!
//! Sinks for development and post-mortem analysis live in `lamina_debug`.
//!
//! [`on_bitmap_leaked`](TraceSink::on_bitmap_leaked) is the operator-visible
//! signal for a bitmap that was closed while still retained. Its GPU resource
//! stays allocated until the last reference is released.

use crate::geometry::{Rect, Size};
use crate::handle::{ElementHandle, ResourceHandle, UpdateHandle};
use crate::pixel::PixelFormat;
use crate::service::ChangeMask;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// A managed bitmap's GPU resource was allocated or freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitmapEvent {
    /// The bitmap's resource.
    pub resource: ResourceHandle,
    /// Pixel format.
    pub format: PixelFormat,
    /// Size in pixels.
    pub size: Size,
}

/// A bitmap was closed while it was still retained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeakEvent {
    /// The bitmap's resource.
    pub resource: ResourceHandle,
    /// Outstanding retains at the time of the close.
    pub retain_count: u32,
}

/// An update transaction was opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateBeginEvent {
    /// Transaction handle.
    pub update: UpdateHandle,
    /// Submission priority.
    pub priority: i32,
}

/// An update transaction was submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateCommitEvent {
    /// Transaction handle.
    pub update: UpdateHandle,
    /// Number of element operations enlisted on it.
    pub enlisted: u32,
    /// Whether the service accepted the batch.
    pub ok: bool,
}

/// An element was added to or removed from the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementEvent {
    /// Element handle.
    pub element: ElementHandle,
    /// Source resource at the time of the event.
    pub resource: ResourceHandle,
    /// Layer.
    pub layer: u16,
    /// Destination rectangle.
    pub dest: Rect,
}

/// An element's attributes or source changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementChangeEvent {
    /// Element handle.
    pub element: ElementHandle,
    /// Attribute fields that changed.
    pub mask: ChangeMask,
    /// Whether the source resource was swapped.
    pub source_swapped: bool,
}

/// Pixels of a bound bitmap changed since the previous commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageEvent {
    /// Transaction the damage was flushed with.
    pub update: UpdateHandle,
    /// The bitmap's resource.
    pub resource: ResourceHandle,
    /// Bounding box of the modified pixels, in bitmap coordinates.
    pub rect: Rect,
}

/// Summary of a compositor teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TeardownEvent {
    /// Elements removed by the teardown transaction.
    pub elements_removed: u32,
    /// Bitmaps whose resources were freed.
    pub bitmaps_closed: u32,
    /// Failures collected along the way.
    pub errors: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the compositor.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after a managed bitmap allocated its resource.
    fn on_bitmap_created(&mut self, e: &BitmapEvent) {
        _ = e;
    }

    /// Called after a managed bitmap freed its resource.
    fn on_bitmap_freed(&mut self, e: &BitmapEvent) {
        _ = e;
    }

    /// Called when a bitmap is closed while still retained.
    fn on_bitmap_leaked(&mut self, e: &LeakEvent) {
        _ = e;
    }

    /// Called after an update transaction is opened.
    fn on_update_begin(&mut self, e: &UpdateBeginEvent) {
        _ = e;
    }

    /// Called after an update transaction is submitted.
    fn on_update_commit(&mut self, e: &UpdateCommitEvent) {
        _ = e;
    }

    /// Called after an element addition is enlisted.
    fn on_element_added(&mut self, e: &ElementEvent) {
        _ = e;
    }

    /// Called after an element removal is enlisted.
    fn on_element_removed(&mut self, e: &ElementEvent) {
        _ = e;
    }

    /// Called after an element change is enlisted.
    fn on_element_changed(&mut self, e: &ElementChangeEvent) {
        _ = e;
    }

    /// Called at commit for each bound bitmap with pending damage.
    fn on_damage(&mut self, e: &DamageEvent) {
        _ = e;
    }

    /// Called once when a compositor is torn down.
    fn on_teardown(&mut self, e: &TeardownEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}
