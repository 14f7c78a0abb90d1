// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The [`SoftGpu`] service.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lamina_core::geometry::{Point, Rect, Size};
use lamina_core::handle::{DisplayHandle, ElementHandle, ResourceHandle, UpdateHandle};
use lamina_core::pixel::PixelFormat;
use lamina_core::service::{AttrChange, ChangeMask, DisplayInfo, ElementAttrs, GpuService};
use lamina_core::{Error, Result};

use crate::compose::{self, BACKGROUND, PixelSource};

/// A contract operation that [`SoftGpu::fail_next`] can make fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `host_init`.
    HostInit,
    /// `resource_create`.
    ResourceCreate,
    /// `resource_delete`.
    ResourceDelete,
    /// `resource_read_data`.
    ResourceRead,
    /// `resource_write_data`.
    ResourceWrite,
    /// `update_start`.
    UpdateStart,
    /// `update_submit_sync`. The batch is discarded.
    UpdateSubmit,
    /// `element_add`.
    ElementAdd,
    /// `element_remove`.
    ElementRemove,
    /// `element_change_attributes`.
    ElementChange,
    /// `element_change_source`.
    ElementSource,
}

/// Operation counters.
///
/// Every counter counts successful calls only, except
/// [`updates_submitted`](Self::updates_submitted), which counts every batch
/// handed to `update_submit_sync`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// `host_init` calls.
    pub host_inits: u32,
    /// `host_deinit` calls.
    pub host_deinits: u32,
    /// `display_open` calls.
    pub displays_opened: u32,
    /// `display_close` calls.
    pub displays_closed: u32,
    /// `resource_create` calls.
    pub resources_created: u32,
    /// `resource_delete` calls.
    pub resources_deleted: u32,
    /// `resource_read_data` calls.
    pub reads: u32,
    /// `resource_write_data` calls.
    pub writes: u32,
    /// `update_start` calls.
    pub updates_started: u32,
    /// Batches submitted, whether or not they applied.
    pub updates_submitted: u32,
    /// Batches that failed to apply.
    pub updates_failed: u32,
    /// Enlisted `element_add` calls.
    pub elements_added: u32,
    /// Enlisted `element_remove` calls.
    pub elements_removed: u32,
    /// Enlisted `element_change_attributes` calls.
    pub attribute_changes: u32,
    /// Enlisted `element_change_source` calls.
    pub source_changes: u32,
    /// Priority of the most recently started update.
    pub last_priority: Option<i32>,
    /// Resources currently allocated.
    pub live_resources: u32,
    /// Elements currently on screen.
    pub live_elements: u32,
    /// Updates started and not yet submitted.
    pub open_updates: u32,
}

struct Resource {
    format: PixelFormat,
    size: Size,
    stride: usize,
    bpp: usize,
    data: Vec<u8>,
}

impl Resource {
    fn bounds(&self) -> Rect {
        Rect::from_size(self.size)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride + x as usize * self.bpp
    }
}

struct Screen {
    size: Size,
    pixels: Vec<[u8; 4]>,
}

#[derive(Clone, Copy)]
struct Placed {
    display: DisplayHandle,
    attrs: ElementAttrs,
    seq: u64,
}

#[derive(Clone, Copy)]
enum Op {
    Add(ElementHandle, DisplayHandle, ElementAttrs),
    Remove(ElementHandle),
    Change(ElementHandle, ChangeMask, AttrChange),
    Source(ElementHandle, ResourceHandle),
}

struct Pending {
    ops: Vec<Op>,
}

struct State {
    next_handle: u32,
    next_seq: u64,
    host_ready: bool,
    displays: HashMap<DisplayHandle, Screen>,
    resources: HashMap<ResourceHandle, Resource>,
    elements: HashMap<ElementHandle, Placed>,
    pending: HashMap<UpdateHandle, Pending>,
    enlisted: HashSet<ElementHandle>,
    faults: HashSet<Fault>,
    stats: Stats,
}

impl State {
    fn issue(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn inject(&mut self, fault: Fault) -> Result<()> {
        if self.faults.remove(&fault) {
            return Err(Error::internal("injected fault"));
        }
        Ok(())
    }

    fn pending_mut(&mut self, update: UpdateHandle) -> Result<&mut Pending> {
        self.pending
            .get_mut(&update)
            .ok_or(Error::NotFound("update"))
    }

    fn knows_element(&self, element: ElementHandle) -> bool {
        self.elements.contains_key(&element) || self.enlisted.contains(&element)
    }

    fn resource(&self, resource: ResourceHandle) -> Result<&Resource> {
        self.resources
            .get(&resource)
            .ok_or(Error::NotFound("resource"))
    }

    /// Redraws every open display from the committed element set.
    fn recomposite(&mut self) {
        let mut order: Vec<&Placed> = self.elements.values().collect();
        order.sort_by_key(|p| (p.attrs.layer, p.seq));
        let source = Resources(&self.resources);
        for (handle, screen) in &mut self.displays {
            let on_screen = order
                .iter()
                .filter(|p| p.display == *handle)
                .map(|p| &p.attrs);
            compose::composite(&mut screen.pixels, screen.size, on_screen, &source);
        }
    }
}

struct Resources<'a>(&'a HashMap<ResourceHandle, Resource>);

impl PixelSource for Resources<'_> {
    fn describe(&self, resource: ResourceHandle) -> Option<(PixelFormat, Size)> {
        self.0.get(&resource).map(|r| (r.format, r.size))
    }

    fn texel(&self, resource: ResourceHandle, x: u32, y: u32) -> Option<&[u8]> {
        let r = self.0.get(&resource)?;
        let start = r.offset(x, y);
        r.data.get(start..start + r.bpp)
    }
}

/// Applies a batch to a copy of the committed element set.
///
/// Returns the new set, or the first error if any operation does not apply.
fn apply_ops(
    committed: &HashMap<ElementHandle, Placed>,
    resources: &HashMap<ResourceHandle, Resource>,
    ops: &[Op],
    next_seq: &mut u64,
) -> Result<HashMap<ElementHandle, Placed>> {
    let mut elements = committed.clone();
    for op in ops {
        match *op {
            Op::Add(handle, display, attrs) => {
                if !resources.contains_key(&attrs.source) {
                    return Err(Error::NotFound("resource"));
                }
                *next_seq += 1;
                elements.insert(
                    handle,
                    Placed {
                        display,
                        attrs,
                        seq: *next_seq,
                    },
                );
            }
            Op::Remove(handle) => {
                elements.remove(&handle).ok_or(Error::NotFound("element"))?;
            }
            Op::Change(handle, mask, change) => {
                let placed = elements
                    .get_mut(&handle)
                    .ok_or(Error::NotFound("element"))?;
                let attrs = &mut placed.attrs;
                if mask.contains(ChangeMask::LAYER) {
                    attrs.layer = change.layer;
                }
                if mask.contains(ChangeMask::OPACITY) {
                    attrs.alpha.opacity = change.opacity;
                }
                if mask.contains(ChangeMask::DEST_RECT) {
                    attrs.dest = change.dest;
                }
                if mask.contains(ChangeMask::SRC_RECT) {
                    attrs.src = change.src;
                }
                if mask.contains(ChangeMask::TRANSFORM) {
                    attrs.transform = change.transform;
                }
            }
            Op::Source(handle, resource) => {
                if !resources.contains_key(&resource) {
                    return Err(Error::NotFound("resource"));
                }
                let placed = elements
                    .get_mut(&handle)
                    .ok_or(Error::NotFound("element"))?;
                placed.attrs.source = resource;
            }
        }
    }
    Ok(elements)
}

/// A CPU implementation of [`GpuService`].
///
/// Displays are declared up front with [`with_display`](Self::with_display);
/// everything else is created through the service contract. Handles of all
/// kinds come from one counter, start at 1, and are never reused.
pub struct SoftGpu {
    devices: BTreeMap<u32, Size>,
    state: Mutex<State>,
}

impl fmt::Debug for SoftGpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftGpu")
            .field("devices", &self.devices)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Default for SoftGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftGpu {
    /// Creates a service with no displays.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            state: Mutex::new(State {
                next_handle: 0,
                next_seq: 0,
                host_ready: false,
                displays: HashMap::new(),
                resources: HashMap::new(),
                elements: HashMap::new(),
                pending: HashMap::new(),
                enlisted: HashSet::new(),
                faults: HashSet::new(),
                stats: Stats::default(),
            }),
        }
    }

    /// Declares display `device` with a visible area of `size`.
    #[must_use]
    pub fn with_display(mut self, device: u32, size: Size) -> Self {
        self.devices.insert(device, size);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next call of `fault`'s operation fail with
    /// [`Error::Internal`].
    pub fn fail_next(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    /// Returns a snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> Stats {
        let state = self.lock();
        let mut stats = state.stats;
        stats.live_resources = u32::try_from(state.resources.len()).unwrap_or(u32::MAX);
        stats.live_elements = u32::try_from(state.elements.len()).unwrap_or(u32::MAX);
        stats.open_updates = u32::try_from(state.pending.len()).unwrap_or(u32::MAX);
        stats
    }

    /// Returns `true` between `host_init` and `host_deinit`.
    #[must_use]
    pub fn is_host_ready(&self) -> bool {
        self.lock().host_ready
    }

    /// Returns the committed attributes of an element.
    #[must_use]
    pub fn element_attrs(&self, element: ElementHandle) -> Option<ElementAttrs> {
        self.lock().elements.get(&element).map(|p| p.attrs)
    }

    /// Returns the scan-out color of one display pixel as RGBA8.
    #[must_use]
    pub fn pixel_at(&self, display: DisplayHandle, p: Point) -> Option<[u8; 4]> {
        let state = self.lock();
        let screen = state.displays.get(&display)?;
        if !Rect::from_size(screen.size).contains(p) {
            return None;
        }
        let idx = usize::try_from(p.y).ok()? * screen.size.width as usize
            + usize::try_from(p.x).ok()?;
        screen.pixels.get(idx).copied()
    }

    /// Returns a copy of a display's scan-out image, row-major RGBA8.
    #[must_use]
    pub fn scanout(&self, display: DisplayHandle) -> Option<Vec<[u8; 4]>> {
        self.lock()
            .displays
            .get(&display)
            .map(|screen| screen.pixels.clone())
    }
}

impl GpuService for SoftGpu {
    fn host_init(&self) -> Result<()> {
        let mut state = self.lock();
        state.inject(Fault::HostInit)?;
        if state.host_ready {
            return Err(Error::internal("host already initialized"));
        }
        state.host_ready = true;
        state.stats.host_inits += 1;
        Ok(())
    }

    fn host_deinit(&self) {
        let mut state = self.lock();
        state.host_ready = false;
        state.stats.host_deinits += 1;
    }

    fn display_open(&self, device: u32) -> Result<DisplayHandle> {
        let size = *self
            .devices
            .get(&device)
            .ok_or(Error::NotFound("display device"))?;
        let area =
            usize::try_from(size.area()).map_err(|_| Error::BadParameter("display too large"))?;
        let mut state = self.lock();
        let handle = DisplayHandle(state.issue());
        state.displays.insert(
            handle,
            Screen {
                size,
                pixels: vec![BACKGROUND; area],
            },
        );
        state.stats.displays_opened += 1;
        Ok(handle)
    }

    fn display_info(&self, display: DisplayHandle) -> Result<DisplayInfo> {
        let state = self.lock();
        let screen = state
            .displays
            .get(&display)
            .ok_or(Error::NotFound("display"))?;
        Ok(DisplayInfo { size: screen.size })
    }

    fn display_close(&self, display: DisplayHandle) -> Result<()> {
        let mut state = self.lock();
        state
            .displays
            .remove(&display)
            .ok_or(Error::NotFound("display"))?;
        state.stats.displays_closed += 1;
        Ok(())
    }

    fn resource_create(&self, format: PixelFormat, size: Size) -> Result<ResourceHandle> {
        if size.is_empty() {
            return Err(Error::BadParameter("resource size must be at least 1x1"));
        }
        let stride = format.stride_for(size.width)?;
        let bpp = format.bytes_per_pixel()?;
        let len = usize::try_from(u64::from(stride) * u64::from(size.height))
            .map_err(|_| Error::BadParameter("resource too large"))?;
        let mut state = self.lock();
        state.inject(Fault::ResourceCreate)?;
        let handle = ResourceHandle(state.issue());
        state.resources.insert(
            handle,
            Resource {
                format,
                size,
                stride: stride as usize,
                bpp: bpp as usize,
                data: vec![0; len],
            },
        );
        state.stats.resources_created += 1;
        Ok(handle)
    }

    fn resource_delete(&self, resource: ResourceHandle) -> Result<()> {
        let mut state = self.lock();
        state.inject(Fault::ResourceDelete)?;
        state.resource(resource)?;
        if state
            .elements
            .values()
            .any(|p| p.attrs.source == resource)
        {
            return Err(Error::internal("resource in use by an element"));
        }
        state.resources.remove(&resource);
        state.stats.resources_deleted += 1;
        Ok(())
    }

    fn resource_read_data(
        &self,
        resource: ResourceHandle,
        rect: Rect,
        dst: &mut [u8],
        stride: u32,
    ) -> Result<()> {
        let mut state = self.lock();
        state.inject(Fault::ResourceRead)?;
        let res = state.resource(resource)?;
        let (row_len, needed) = transfer_extent(res, rect, stride)?;
        if dst.len() < needed {
            return Err(Error::BadParameter("destination buffer too small"));
        }
        let (x, y) = rect_start(rect)?;
        for row in 0..rect.size.height {
            let from = res.offset(x, y + row);
            let to = row as usize * stride as usize;
            dst[to..to + row_len].copy_from_slice(&res.data[from..from + row_len]);
        }
        state.stats.reads += 1;
        Ok(())
    }

    fn resource_write_data(
        &self,
        resource: ResourceHandle,
        format: PixelFormat,
        stride: u32,
        src: &[u8],
        rect: Rect,
    ) -> Result<()> {
        let mut state = self.lock();
        state.inject(Fault::ResourceWrite)?;
        let res = state
            .resources
            .get_mut(&resource)
            .ok_or(Error::NotFound("resource"))?;
        if res.format != format {
            return Err(Error::BadParameter("pixel format does not match resource"));
        }
        let (row_len, needed) = transfer_extent(res, rect, stride)?;
        if src.len() < needed {
            return Err(Error::BadParameter("source buffer too small"));
        }
        let (x, y) = rect_start(rect)?;
        for row in 0..rect.size.height {
            let to = res.offset(x, y + row);
            let from = row as usize * stride as usize;
            res.data[to..to + row_len].copy_from_slice(&src[from..from + row_len]);
        }
        state.stats.writes += 1;
        Ok(())
    }

    fn update_start(&self, priority: i32) -> Result<UpdateHandle> {
        let mut state = self.lock();
        state.inject(Fault::UpdateStart)?;
        let handle = UpdateHandle(state.issue());
        state.pending.insert(handle, Pending { ops: Vec::new() });
        state.stats.updates_started += 1;
        state.stats.last_priority = Some(priority);
        Ok(handle)
    }

    fn update_submit_sync(&self, update: UpdateHandle) -> Result<()> {
        let mut state = self.lock();
        let pending = state
            .pending
            .remove(&update)
            .ok_or(Error::NotFound("update"))?;
        state.stats.updates_submitted += 1;
        for op in &pending.ops {
            if let Op::Add(handle, ..) = op {
                state.enlisted.remove(handle);
            }
        }
        let applied = state.inject(Fault::UpdateSubmit).and_then(|()| {
            let mut next_seq = state.next_seq;
            let elements =
                apply_ops(&state.elements, &state.resources, &pending.ops, &mut next_seq)?;
            Ok((elements, next_seq))
        });
        match applied {
            Ok((elements, next_seq)) => {
                state.elements = elements;
                state.next_seq = next_seq;
                state.recomposite();
                Ok(())
            }
            Err(e) => {
                state.stats.updates_failed += 1;
                Err(e)
            }
        }
    }

    fn element_add(
        &self,
        update: UpdateHandle,
        display: DisplayHandle,
        attrs: &ElementAttrs,
    ) -> Result<ElementHandle> {
        let mut state = self.lock();
        state.inject(Fault::ElementAdd)?;
        state.pending_mut(update)?;
        if !state.displays.contains_key(&display) {
            return Err(Error::NotFound("display"));
        }
        let res = state.resource(attrs.source)?;
        if attrs.dest.is_empty() {
            return Err(Error::BadParameter("destination must be at least 1x1"));
        }
        if attrs.src.is_empty() || !res.bounds().contains_rect(&attrs.src) {
            return Err(Error::BadParameter("source rect outside resource"));
        }
        let handle = ElementHandle(state.issue());
        state
            .pending_mut(update)?
            .ops
            .push(Op::Add(handle, display, *attrs));
        state.enlisted.insert(handle);
        state.stats.elements_added += 1;
        Ok(handle)
    }

    fn element_remove(&self, update: UpdateHandle, element: ElementHandle) -> Result<()> {
        let mut state = self.lock();
        state.inject(Fault::ElementRemove)?;
        if !state.knows_element(element) {
            return Err(Error::NotFound("element"));
        }
        state.pending_mut(update)?.ops.push(Op::Remove(element));
        state.stats.elements_removed += 1;
        Ok(())
    }

    fn element_change_attributes(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        mask: ChangeMask,
        change: &AttrChange,
    ) -> Result<()> {
        let mut state = self.lock();
        state.inject(Fault::ElementChange)?;
        if !state.knows_element(element) {
            return Err(Error::NotFound("element"));
        }
        if mask.contains(ChangeMask::DEST_RECT) && change.dest.is_empty() {
            return Err(Error::BadParameter("destination must be at least 1x1"));
        }
        state
            .pending_mut(update)?
            .ops
            .push(Op::Change(element, mask, *change));
        state.stats.attribute_changes += 1;
        Ok(())
    }

    fn element_change_source(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        resource: ResourceHandle,
    ) -> Result<()> {
        let mut state = self.lock();
        state.inject(Fault::ElementSource)?;
        if !state.knows_element(element) {
            return Err(Error::NotFound("element"));
        }
        state.resource(resource)?;
        state
            .pending_mut(update)?
            .ops
            .push(Op::Source(element, resource));
        state.stats.source_changes += 1;
        Ok(())
    }
}

/// Validates a row transfer and returns `(row_len, min_buffer_len)`.
fn transfer_extent(res: &Resource, rect: Rect, stride: u32) -> Result<(usize, usize)> {
    if rect.is_empty() || !res.bounds().contains_rect(&rect) {
        return Err(Error::BadParameter("rect outside resource"));
    }
    let row_len = rect.size.width as usize * res.bpp;
    let stride = stride as usize;
    if stride < row_len {
        return Err(Error::BadParameter("stride shorter than a row"));
    }
    Ok((row_len, (rect.size.height as usize - 1) * stride + row_len))
}

fn rect_start(rect: Rect) -> Result<(u32, u32)> {
    let x = u32::try_from(rect.origin.x).map_err(|_| Error::BadParameter("negative origin"))?;
    let y = u32::try_from(rect.origin.y).map_err(|_| Error::BadParameter("negative origin"))?;
    Ok((x, y))
}
