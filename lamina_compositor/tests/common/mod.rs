// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared harness for the integration tests.
//!
//! The host is a process-wide singleton, so every test holds [`Harness`] for
//! its whole body and tests in one binary run one at a time.

#![allow(dead_code, reason = "each test binary uses a subset of the harness")]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lamina_backend_soft::SoftGpu;
use lamina_compositor::{Compositor, Host};
use lamina_core::geometry::Size;
use lamina_core::trace::{
    BitmapEvent, DamageEvent, ElementChangeEvent, ElementEvent, LeakEvent, TeardownEvent,
    TraceSink, UpdateBeginEvent, UpdateCommitEvent,
};

static SERIAL: Mutex<()> = Mutex::new(());

pub(crate) const SCREEN: Size = Size::new(64, 48);

/// Serializes tests that touch the host singleton without a [`Harness`].
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A software GPU with display 0 and an initialized host.
pub(crate) struct Harness {
    pub(crate) gpu: Arc<SoftGpu>,
    pub(crate) host: Host,
    _guard: MutexGuard<'static, ()>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let guard = serial();
        let gpu = Arc::new(SoftGpu::new().with_display(0, SCREEN));
        let host = Host::init(gpu.clone()).unwrap();
        Self {
            gpu,
            host,
            _guard: guard,
        }
    }

    pub(crate) fn compositor(&self) -> Compositor<'_> {
        let display = self.host.open_display(0).unwrap();
        Compositor::new(&self.host, display).unwrap()
    }
}

/// One trace event, as seen by [`Recording`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Created(BitmapEvent),
    Freed(BitmapEvent),
    Leaked(LeakEvent),
    Begin(UpdateBeginEvent),
    Commit(UpdateCommitEvent),
    Added(ElementEvent),
    Removed(ElementEvent),
    Changed(ElementChangeEvent),
    Damage(DamageEvent),
    Teardown(TeardownEvent),
}

/// A trace sink whose events stay readable after the compositor takes it.
#[derive(Clone, Default)]
pub(crate) struct Recording(Arc<Mutex<Vec<Event>>>);

impl Recording {
    pub(crate) fn sink(&self) -> Box<dyn TraceSink + Send> {
        Box::new(self.clone())
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, event: Event) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl TraceSink for Recording {
    fn on_bitmap_created(&mut self, e: &BitmapEvent) {
        self.push(Event::Created(*e));
    }

    fn on_bitmap_freed(&mut self, e: &BitmapEvent) {
        self.push(Event::Freed(*e));
    }

    fn on_bitmap_leaked(&mut self, e: &LeakEvent) {
        self.push(Event::Leaked(*e));
    }

    fn on_update_begin(&mut self, e: &UpdateBeginEvent) {
        self.push(Event::Begin(*e));
    }

    fn on_update_commit(&mut self, e: &UpdateCommitEvent) {
        self.push(Event::Commit(*e));
    }

    fn on_element_added(&mut self, e: &ElementEvent) {
        self.push(Event::Added(*e));
    }

    fn on_element_removed(&mut self, e: &ElementEvent) {
        self.push(Event::Removed(*e));
    }

    fn on_element_changed(&mut self, e: &ElementChangeEvent) {
        self.push(Event::Changed(*e));
    }

    fn on_damage(&mut self, e: &DamageEvent) {
        self.push(Event::Damage(*e));
    }

    fn on_teardown(&mut self, e: &TeardownEvent) {
        self.push(Event::Teardown(*e));
    }
}
