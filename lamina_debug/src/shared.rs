// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A sink that stays reachable after it is handed off.
//!
//! A compositor takes ownership of its trace sink. Wrapping the sink in a
//! [`SharedSink`] and passing a clone keeps the original readable:
//!
//! ```
//! use lamina_core::trace::{TeardownEvent, TraceSink};
//! use lamina_debug::recorder::{RecorderSink, decode};
//! use lamina_debug::shared::SharedSink;
//!
//! let shared = SharedSink::new(RecorderSink::new());
//! let mut handed_off: Box<dyn TraceSink + Send> = Box::new(shared.clone());
//! handed_off.on_teardown(&TeardownEvent::default());
//!
//! let count = shared.with(|rec| decode(rec.as_bytes()).count());
//! assert_eq!(count, 1);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use lamina_core::trace::{
    BitmapEvent, DamageEvent, ElementChangeEvent, ElementEvent, LeakEvent, TeardownEvent,
    TraceSink, UpdateBeginEvent, UpdateCommitEvent,
};

/// A [`TraceSink`] shared between its owner and its clones.
pub struct SharedSink<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedSink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SharedSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSink").finish_non_exhaustive()
    }
}

impl<T> SharedSink<T> {
    /// Wraps `sink`.
    #[must_use]
    pub fn new(sink: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// Runs `f` with exclusive access to the wrapped sink.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T: TraceSink> TraceSink for SharedSink<T> {
    fn on_bitmap_created(&mut self, e: &BitmapEvent) {
        self.with(|s| s.on_bitmap_created(e));
    }

    fn on_bitmap_freed(&mut self, e: &BitmapEvent) {
        self.with(|s| s.on_bitmap_freed(e));
    }

    fn on_bitmap_leaked(&mut self, e: &LeakEvent) {
        self.with(|s| s.on_bitmap_leaked(e));
    }

    fn on_update_begin(&mut self, e: &UpdateBeginEvent) {
        self.with(|s| s.on_update_begin(e));
    }

    fn on_update_commit(&mut self, e: &UpdateCommitEvent) {
        self.with(|s| s.on_update_commit(e));
    }

    fn on_element_added(&mut self, e: &ElementEvent) {
        self.with(|s| s.on_element_added(e));
    }

    fn on_element_removed(&mut self, e: &ElementEvent) {
        self.with(|s| s.on_element_removed(e));
    }

    fn on_element_changed(&mut self, e: &ElementChangeEvent) {
        self.with(|s| s.on_element_changed(e));
    }

    fn on_damage(&mut self, e: &DamageEvent) {
        self.with(|s| s.on_damage(e));
    }

    fn on_teardown(&mut self, e: &TeardownEvent) {
        self.with(|s| s.on_teardown(e));
    }
}
