// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The compositor: bitmap and element ownership plus update transactions.
//!
//! A [`Compositor`] manages one display. It creates bitmaps (holding one
//! retain on each until [`release_bitmap`](Compositor::release_bitmap)),
//! places elements, and runs [`update`](Compositor::update) transactions.
//! Element operations are only accepted inside an update body; bitmap pixel
//! I/O is not transactional and may happen at any time.
//!
//! # Commit
//!
//! An update always commits, even when its body fails or panics: the
//! service has no partial rollback, so whatever was enlisted before the
//! failure is applied. After the batch is submitted:
//!
//! 1. The dirty rectangle of every bitmap bound to a live element is drained
//!    and reported through [`TraceSink::on_damage`].
//! 2. Bitmaps whose last retain was dropped during the update are closed.
//!    Their resources stay allocated until the scan-out no longer
//!    references them.
//!
//! If the service rejects the batch, nothing in it reached the screen, so
//! the element set is rolled back to what it was before the update: added
//! elements are dropped, removed ones come back under their old ids, and
//! changed ones get their previous attributes and bitmap. Bitmaps only close
//! if the rollback left them unretained.
//!
//! # Teardown
//!
//! [`close`](Compositor::close) (or drop) removes every element in one
//! update at [`CompositorConfig::teardown_priority`], then closes every
//! bitmap. Failures along the way are collected into [`Error::Compound`].
//! The display itself stays open.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lamina_core::geometry::{Point, Rect, Size};
use lamina_core::handle::{ElementHandle, ResourceHandle, UpdateHandle};
use lamina_core::pixel::PixelFormat;
use lamina_core::service::{AlphaSource, ChangeMask, Transform};
use lamina_core::trace::{
    BitmapEvent, DamageEvent, ElementChangeEvent, ElementEvent, LeakEvent, NoopSink,
    TeardownEvent, TraceSink, UpdateBeginEvent, UpdateCommitEvent,
};
use lamina_core::{Error, Result};

use crate::bitmap::{Bitmap, CloseOutcome};
use crate::element::{Detached, Element, Placement};
use crate::host::{Display, Host};
use crate::store::{ElementId, Slots};

/// Compositor settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositorConfig {
    /// Priority of the update that removes all elements at teardown.
    pub teardown_priority: i32,
}

/// A snapshot of one element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementInfo {
    /// Service-side handle.
    pub handle: ElementHandle,
    /// Resource of the backing bitmap.
    pub resource: ResourceHandle,
    /// Destination rectangle.
    pub dest: Rect,
    /// Composition layer.
    pub layer: u16,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
    /// Per-pixel alpha source.
    pub alpha_source: AlphaSource,
    /// Orientation of the source.
    pub transform: Transform,
}

/// How to take back one enlisted element operation.
enum Undo {
    Added(ElementId),
    Removed {
        id: ElementId,
        handle: ElementHandle,
        element: Element,
        bitmap: Option<Arc<Bitmap>>,
    },
    Changed(ElementId, Placement),
    Swapped(ElementId, Arc<Bitmap>),
}

struct Transaction {
    handle: UpdateHandle,
    enlisted: u32,
    closing: Vec<Arc<Bitmap>>,
    undo: Vec<Undo>,
}

/// Commits the open update if the body unwinds past it.
struct OpenUpdate<'c, 'h>(Option<&'c Compositor<'h>>);

impl OpenUpdate<'_, '_> {
    fn commit(mut self) -> Result<()> {
        match self.0.take() {
            Some(compositor) => compositor.commit(),
            None => Ok(()),
        }
    }
}

impl Drop for OpenUpdate<'_, '_> {
    fn drop(&mut self) {
        if let Some(compositor) = self.0.take() {
            let _ = compositor.commit();
        }
    }
}

struct State {
    bitmaps: HashMap<ResourceHandle, Arc<Bitmap>>,
    orphans: HashMap<ResourceHandle, Arc<Bitmap>>,
    elements: Slots<Element>,
    current: Option<Transaction>,
    sink: Box<dyn TraceSink + Send>,
    closed: bool,
}

/// Owns the bitmaps and elements of one display.
pub struct Compositor<'h> {
    host: &'h Host,
    display: Display,
    config: CompositorConfig,
    state: Mutex<State>,
}

impl fmt::Debug for Compositor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Compositor")
            .field("display", &self.display)
            .field("config", &self.config)
            .field("bitmaps", &state.bitmaps.len())
            .field("orphans", &state.orphans.len())
            .field("elements", &state.elements.len())
            .field("update", &state.current.as_ref().map(|tx| tx.handle))
            .finish_non_exhaustive()
    }
}

fn bitmap_event(bitmap: &Bitmap) -> BitmapEvent {
    BitmapEvent {
        resource: bitmap.resource(),
        format: bitmap.format(),
        size: bitmap.size(),
    }
}

fn element_event(element: &Element) -> ElementEvent {
    ElementEvent {
        element: element.handle(),
        resource: element
            .bitmap()
            .map_or(ResourceHandle::NONE, |b| b.resource()),
        layer: element.layer(),
        dest: element.dest(),
    }
}

fn owns(bitmaps: &HashMap<ResourceHandle, Arc<Bitmap>>, bitmap: &Arc<Bitmap>) -> bool {
    bitmaps
        .get(&bitmap.resource())
        .is_some_and(|known| Arc::ptr_eq(known, bitmap))
}

/// Queues a bitmap an element let go of for closing if nothing else holds it.
fn detach(
    orphans: &mut HashMap<ResourceHandle, Arc<Bitmap>>,
    closing: &mut Vec<Arc<Bitmap>>,
    detached: Detached,
) {
    if detached.should_free {
        orphans.remove(&detached.bitmap.resource());
        closing.push(detached.bitmap);
    }
}

/// Closes a bitmap and reports the outcome. Returns `true` if its resource
/// was freed by this call.
fn close_bitmap(sink: &mut dyn TraceSink, bitmap: &Bitmap) -> Result<bool> {
    match bitmap.close() {
        Ok(CloseOutcome::Freed) => {
            sink.on_bitmap_freed(&bitmap_event(bitmap));
            Ok(true)
        }
        Ok(CloseOutcome::AlreadyFreed) => Ok(false),
        Err(e) => {
            let retain_count = bitmap.retain_count();
            if retain_count > 0 {
                sink.on_bitmap_leaked(&LeakEvent {
                    resource: bitmap.resource(),
                    retain_count,
                });
            }
            Err(e)
        }
    }
}

/// Takes back `undo` in reverse order. Returns the bitmaps whose retain
/// count it lowered or raised.
fn roll_back(
    elements: &mut Slots<Element>,
    undo: Vec<Undo>,
    errors: &mut Vec<Error>,
) -> Vec<Arc<Bitmap>> {
    let mut touched = Vec::new();
    for step in undo.into_iter().rev() {
        match step {
            Undo::Added(id) => {
                if let Some(detached) = elements.remove(id).and_then(|mut e| e.discard()) {
                    touched.push(detached.bitmap);
                }
            }
            Undo::Removed {
                id,
                handle,
                mut element,
                bitmap,
            } => {
                if let Err(e) = element.reinstate(handle, bitmap.clone()) {
                    errors.push(e);
                    continue;
                }
                touched.extend(bitmap);
                if elements.restore(id, element).is_err() {
                    errors.push(Error::internal("removed element's slot was taken"));
                }
            }
            Undo::Changed(id, placement) => {
                if let Some(element) = elements.get_mut(id) {
                    element.restore_placement(placement);
                }
            }
            Undo::Swapped(id, old) => {
                let Some(element) = elements.get_mut(id) else {
                    continue;
                };
                touched.push(old.clone());
                match element.restore_bitmap(old) {
                    Ok(detached) => touched.extend(detached.map(|d| d.bitmap)),
                    Err(e) => errors.push(e),
                }
            }
        }
    }
    touched
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl<'h> Compositor<'h> {
    /// Creates a compositor for `display` with the default configuration.
    pub fn new(host: &'h Host, display: Display) -> Result<Self> {
        Self::with_config(host, display, CompositorConfig::default())
    }

    /// Creates a compositor for `display`.
    ///
    /// Fails with [`Error::BadParameter`] if the display handle is null.
    pub fn with_config(host: &'h Host, display: Display, config: CompositorConfig) -> Result<Self> {
        if display.handle.is_null() {
            return Err(Error::BadParameter("null display"));
        }
        Ok(Self {
            host,
            display,
            config,
            state: Mutex::new(State {
                bitmaps: HashMap::new(),
                orphans: HashMap::new(),
                elements: Slots::default(),
                current: None,
                sink: Box::new(NoopSink),
                closed: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes trace events to `sink`, replacing the previous one.
    pub fn set_trace_sink(&self, sink: Box<dyn TraceSink + Send>) {
        self.lock().sink = sink;
    }

    // -- Queries --

    /// The display this compositor manages.
    #[must_use]
    pub fn display(&self) -> Display {
        self.display
    }

    /// The configuration this compositor was created with.
    #[must_use]
    pub fn config(&self) -> CompositorConfig {
        self.config
    }

    /// Returns `true` while an update body is running.
    #[must_use]
    pub fn has_open_update(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Number of bitmaps this compositor still holds.
    #[must_use]
    pub fn bitmap_count(&self) -> usize {
        self.lock().bitmaps.len()
    }

    /// Number of released bitmaps kept alive only by elements.
    #[must_use]
    pub fn orphan_count(&self) -> usize {
        self.lock().orphans.len()
    }

    /// Number of live elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.lock().elements.len()
    }

    /// Ids of all live elements, in slot order.
    #[must_use]
    pub fn element_ids(&self) -> Vec<ElementId> {
        self.lock().elements.iter().map(|(id, _)| id).collect()
    }

    /// Returns a snapshot of element `id`, or `None` if it is not live.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<ElementInfo> {
        let state = self.lock();
        let element = state.elements.get(id)?;
        Some(ElementInfo {
            handle: element.handle(),
            resource: element
                .bitmap()
                .map_or(ResourceHandle::NONE, |b| b.resource()),
            dest: element.dest(),
            layer: element.layer(),
            opacity: element.opacity(),
            alpha_source: element.alpha().source,
            transform: element.transform(),
        })
    }

    /// Returns `true` if `bitmap` was created by this compositor and not yet
    /// released.
    #[must_use]
    pub fn owns_bitmap(&self, bitmap: &Arc<Bitmap>) -> bool {
        owns(&self.lock().bitmaps, bitmap)
    }

    // -- Bitmaps --

    /// Allocates a bitmap and keeps one retain on it for the compositor.
    pub fn new_bitmap(&self, size: Size, format: PixelFormat) -> Result<Arc<Bitmap>> {
        let bitmap = Arc::new(Bitmap::new(self.host.service().clone(), format, size)?);
        bitmap.retain()?;
        let mut state = self.lock();
        state.bitmaps.insert(bitmap.resource(), bitmap.clone());
        state.sink.on_bitmap_created(&bitmap_event(&bitmap));
        Ok(bitmap)
    }

    /// Drops the compositor's retain on `bitmap`.
    ///
    /// The bitmap is closed once nothing retains it. While an element still
    /// shows it, it stays allocated and is closed after the update that
    /// detaches the last element. Fails with [`Error::NotFound`] if the
    /// compositor does not hold `bitmap`.
    pub fn release_bitmap(&self, bitmap: &Arc<Bitmap>) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !owns(&state.bitmaps, bitmap) {
            return Err(Error::NotFound("bitmap"));
        }
        state.bitmaps.remove(&bitmap.resource());
        if !bitmap.release() {
            state.orphans.insert(bitmap.resource(), bitmap.clone());
            return Ok(());
        }
        if let Some(tx) = &mut state.current {
            tx.closing.push(bitmap.clone());
            return Ok(());
        }
        close_bitmap(&mut *state.sink, bitmap).map(|_| ())
    }

    // -- Updates --

    /// Runs `body` inside an update transaction opened at `priority`.
    ///
    /// The update is committed whether `body` succeeds, fails, or panics.
    /// Returns the
    /// body's value, the first failure of body or commit, or
    /// [`Error::Compound`] when both fail. Nested updates fail with
    /// [`Error::Internal`] without running `body`.
    pub fn update<T>(&self, priority: i32, body: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.begin(priority)?;
        let open = OpenUpdate(Some(self));
        let result = body(self);
        let committed = open.commit();
        match (result, committed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
            (Err(body), Err(commit)) => Err(Error::Compound(vec![body, commit])),
        }
    }

    fn begin(&self, priority: i32) -> Result<()> {
        let mut state = self.lock();
        if state.current.is_some() {
            return Err(Error::internal("an update is already open"));
        }
        let handle = self.host.service().update_start(priority)?;
        if handle.is_null() {
            return Err(Error::internal("service returned a null update"));
        }
        state.current = Some(Transaction {
            handle,
            enlisted: 0,
            closing: Vec::new(),
            undo: Vec::new(),
        });
        state.sink.on_update_begin(&UpdateBeginEvent {
            update: handle,
            priority,
        });
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(tx) = state.current.take() else {
            return Err(Error::internal("no open update"));
        };
        let submitted = self.host.service().update_submit_sync(tx.handle);
        state.sink.on_update_commit(&UpdateCommitEvent {
            update: tx.handle,
            enlisted: tx.enlisted,
            ok: submitted.is_ok(),
        });

        let mut errors = Vec::new();
        let mut closing = tx.closing;
        match submitted {
            Ok(()) => {
                for step in tx.undo {
                    if let Undo::Removed { mut element, .. } = step {
                        if let Err(e) = element.close() {
                            errors.push(e);
                        }
                    }
                }
                let mut seen = HashSet::new();
                for (_, element) in state.elements.iter() {
                    let Some(bitmap) = element.bitmap() else {
                        continue;
                    };
                    if !seen.insert(bitmap.resource()) {
                        continue;
                    }
                    if let Some(rect) = bitmap.take_dirty() {
                        state.sink.on_damage(&DamageEvent {
                            update: tx.handle,
                            resource: bitmap.resource(),
                            rect,
                        });
                    }
                }
            }
            Err(e) => {
                errors.push(e);
                closing.extend(roll_back(&mut state.elements, tx.undo, &mut errors));
            }
        }
        let mut checked = HashSet::new();
        for bitmap in closing {
            if owns(&state.bitmaps, &bitmap) || !checked.insert(bitmap.resource()) {
                continue;
            }
            if bitmap.retain_count() > 0 {
                // Shown again by an element the rollback brought back.
                state.orphans.insert(bitmap.resource(), bitmap);
                continue;
            }
            state.orphans.remove(&bitmap.resource());
            if let Err(e) = close_bitmap(&mut *state.sink, &bitmap) {
                errors.push(e);
            }
        }
        Error::compound(errors)
    }

    // -- Elements --

    /// Places `bitmap` at `dest` on the display.
    ///
    /// Requires an open update. A zero width or height in `dest` is taken
    /// from the bitmap. Fails with [`Error::NotFound`] if the compositor does
    /// not hold `bitmap`.
    pub fn add_element(
        &self,
        dest: Rect,
        bitmap: &Arc<Bitmap>,
        layer: u16,
        opacity: f32,
        alpha_source: AlphaSource,
    ) -> Result<ElementId> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let tx = state
            .current
            .as_mut()
            .ok_or(Error::internal("no open update"))?;
        if !owns(&state.bitmaps, bitmap) {
            return Err(Error::NotFound("bitmap"));
        }
        let element = Element::new(
            self.host.service().clone(),
            tx.handle,
            self.display.handle,
            bitmap,
            dest,
            layer,
            opacity,
            alpha_source,
        )?;
        tx.enlisted += 1;
        state.sink.on_element_added(&element_event(&element));
        let id = state.elements.insert(element);
        tx.undo.push(Undo::Added(id));
        Ok(id)
    }

    /// Takes element `id` off the display.
    ///
    /// Requires an open update. Fails with [`Error::NotFound`] if `id` is not
    /// live. A released bitmap that this was the last element of is closed
    /// after the update commits.
    pub fn remove_element(&self, id: ElementId) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let tx = state
            .current
            .as_mut()
            .ok_or(Error::internal("no open update"))?;
        let element = state
            .elements
            .get_mut(id)
            .ok_or(Error::NotFound("element"))?;
        let event = element_event(element);
        let handle = element.handle();
        let detached = element.remove(tx.handle)?;
        tx.enlisted += 1;
        state.sink.on_element_removed(&event);
        let bitmap = detached.as_ref().map(|d| d.bitmap.clone());
        if let Some(detached) = detached {
            detach(&mut state.orphans, &mut tx.closing, detached);
        }
        if let Some(element) = state.elements.remove(id) {
            tx.undo.push(Undo::Removed {
                id,
                handle,
                element,
                bitmap,
            });
        }
        Ok(())
    }

    fn change_element(
        &self,
        id: ElementId,
        mask: ChangeMask,
        change: impl FnOnce(&mut Element, UpdateHandle) -> Result<()>,
    ) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let tx = state
            .current
            .as_mut()
            .ok_or(Error::internal("no open update"))?;
        let Some(element) = state.elements.get_mut(id) else {
            return Ok(());
        };
        let placement = element.placement();
        change(element, tx.handle)?;
        tx.enlisted += 1;
        tx.undo.push(Undo::Changed(id, placement));
        state.sink.on_element_changed(&ElementChangeEvent {
            element: element.handle(),
            mask,
            source_swapped: false,
        });
        Ok(())
    }

    /// Moves element `id` to `origin`. A stale `id` is ignored.
    pub fn set_element_origin(&self, id: ElementId, origin: Point) -> Result<()> {
        self.change_element(id, ChangeMask::DEST_RECT, |e, u| e.set_origin(u, origin))
    }

    /// Resizes element `id`. A stale `id` is ignored.
    pub fn set_element_size(&self, id: ElementId, size: Size) -> Result<()> {
        self.change_element(id, ChangeMask::DEST_RECT, |e, u| e.set_size(u, size))
    }

    /// Moves element `id` to `layer`. A stale `id` is ignored.
    pub fn set_element_layer(&self, id: ElementId, layer: u16) -> Result<()> {
        self.change_element(id, ChangeMask::LAYER, |e, u| e.set_layer(u, layer))
    }

    /// Changes the opacity of element `id`. A stale `id` is ignored.
    pub fn set_element_opacity(&self, id: ElementId, opacity: f32) -> Result<()> {
        self.change_element(id, ChangeMask::OPACITY, |e, u| e.set_opacity(u, opacity))
    }

    /// Changes the orientation of element `id`. A stale `id` is ignored.
    pub fn set_element_transform(&self, id: ElementId, transform: Transform) -> Result<()> {
        self.change_element(id, ChangeMask::TRANSFORM, |e, u| {
            e.set_transform(u, transform)
        })
    }

    /// Backs element `id` with `bitmap`. A stale `id` is ignored.
    ///
    /// Fails with [`Error::NotFound`] if the compositor does not hold
    /// `bitmap`. A released bitmap that this element was the last holder of
    /// is closed after the update commits.
    pub fn set_element_bitmap(&self, id: ElementId, bitmap: &Arc<Bitmap>) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let tx = state
            .current
            .as_mut()
            .ok_or(Error::internal("no open update"))?;
        if !owns(&state.bitmaps, bitmap) {
            return Err(Error::NotFound("bitmap"));
        }
        let Some(element) = state.elements.get_mut(id) else {
            return Ok(());
        };
        let detached = element.set_bitmap(tx.handle, bitmap)?;
        tx.enlisted += 2;
        state.sink.on_element_changed(&ElementChangeEvent {
            element: element.handle(),
            mask: ChangeMask::SRC_RECT,
            source_swapped: true,
        });
        if let Some(detached) = detached {
            tx.undo.push(Undo::Swapped(id, detached.bitmap.clone()));
            detach(&mut state.orphans, &mut tx.closing, detached);
        }
        Ok(())
    }

    // -- Teardown --

    /// Removes every element, closes every bitmap, and consumes the
    /// compositor.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let service = self.host.service().clone();
        let priority = self.config.teardown_priority;
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        let mut errors = Vec::new();
        let mut closing = Vec::new();
        let mut summary = TeardownEvent::default();

        // An update whose commit never finished.
        if let Some(tx) = state.current.take() {
            if let Err(e) = service.update_submit_sync(tx.handle) {
                errors.push(e);
            }
            closing.extend(tx.closing);
        }

        let elements = state.elements.drain();
        if !elements.is_empty() {
            match service.update_start(priority) {
                Ok(update) => {
                    state.sink.on_update_begin(&UpdateBeginEvent { update, priority });
                    let mut enlisted = 0;
                    for (_, mut element) in elements {
                        let event = element_event(&element);
                        match element.remove(update) {
                            Ok(detached) => {
                                enlisted += 1;
                                summary.elements_removed += 1;
                                state.sink.on_element_removed(&event);
                                if let Some(detached) = detached {
                                    detach(&mut state.orphans, &mut closing, detached);
                                }
                            }
                            Err(e) => errors.push(e),
                        }
                    }
                    let submitted = service.update_submit_sync(update);
                    state.sink.on_update_commit(&UpdateCommitEvent {
                        update,
                        enlisted,
                        ok: submitted.is_ok(),
                    });
                    if let Err(e) = submitted {
                        errors.push(e);
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        let mut owned: Vec<_> = state.bitmaps.drain().map(|(_, b)| b).collect();
        owned.sort_by_key(|b| b.resource());
        for bitmap in &owned {
            bitmap.release();
        }
        let mut orphans: Vec<_> = state.orphans.drain().map(|(_, b)| b).collect();
        orphans.sort_by_key(|b| b.resource());
        closing.extend(owned);
        closing.extend(orphans);
        for bitmap in &closing {
            match close_bitmap(&mut *state.sink, bitmap) {
                Ok(true) => summary.bitmaps_closed += 1,
                Ok(false) => {}
                Err(e) => errors.push(e),
            }
        }

        summary.errors = count(errors.len());
        state.sink.on_teardown(&summary);
        Error::compound(errors)
    }
}

impl Drop for Compositor<'_> {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}
