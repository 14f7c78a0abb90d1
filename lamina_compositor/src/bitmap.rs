// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU-resident pixel buffers.
//!
//! A [`Bitmap`] owns exactly one GPU resource of a fixed [`PixelFormat`] and
//! [`Size`]. Pixels move in whole rows, each [`stride`](Bitmap::stride) bytes
//! long. Painting primitives read the affected row band once, plot into it,
//! and write it back once.
//!
//! # Retain count
//!
//! Every element bound to a bitmap holds a retain, and the compositor that
//! created it holds one more. The resource is freed when the count is zero
//! and the bitmap has been [closed](Bitmap::close). Closing a retained bitmap
//! fails and leaves it closed but allocated; the resource is freed once the
//! last holder releases it and closes it again, or when the bitmap is dropped.
//!
//! # Dirty tracking
//!
//! Every write unions the modified region into a single dirty rectangle,
//! clipped to the bitmap bounds. [`take_dirty`](Bitmap::take_dirty) drains it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lamina_core::geometry::{Point, Rect, Size, union_opt};
use lamina_core::handle::ResourceHandle;
use lamina_core::pixel::{Color, PixelFormat, Rgba16};
use lamina_core::service::GpuService;
use lamina_core::{Error, Result};

/// Read-only access to an image.
pub trait ImageView {
    /// The region covered by the image.
    fn bounds(&self) -> Rect;

    /// The pixel format colors are reported in.
    fn color_model(&self) -> PixelFormat;

    /// Returns the color at `(x, y)`.
    ///
    /// Coordinates outside [`bounds`](Self::bounds) yield the transparent
    /// color of [`color_model`](Self::color_model).
    fn at(&self, x: i32, y: i32) -> Result<Color>;
}

#[derive(Debug, Default)]
struct State {
    retain: u32,
    closed: bool,
    freed: bool,
    dirty: Option<Rect>,
    rows: Vec<u8>,
}

/// Successful outcome of [`Bitmap::close`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The GPU resource was freed.
    Freed,
    /// The bitmap was already closed and freed.
    AlreadyFreed,
}

/// A GPU-resident pixel buffer.
pub struct Bitmap {
    service: Arc<dyn GpuService>,
    resource: ResourceHandle,
    format: PixelFormat,
    size: Size,
    stride: u32,
    bpp: u32,
    state: Mutex<State>,
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Bitmap")
            .field("resource", &self.resource)
            .field("format", &self.format)
            .field("size", &self.size)
            .field("stride", &self.stride)
            .field("retain", &state.retain)
            .field("closed", &state.closed)
            .field("dirty", &state.dirty)
            .finish_non_exhaustive()
    }
}

impl Bitmap {
    /// Allocates a bitmap of `format` and `size` on `service`.
    ///
    /// Fails with [`Error::BadParameter`] if either dimension is zero and with
    /// [`Error::Unsupported`] for reserved formats. Neither allocates
    /// anything. Service failures are returned as-is.
    pub fn new(service: Arc<dyn GpuService>, format: PixelFormat, size: Size) -> Result<Self> {
        if size.is_empty() {
            return Err(Error::BadParameter("bitmap size must be at least 1x1"));
        }
        let bpp = format.bytes_per_pixel()?;
        let stride = format.stride_for(size.width)?;
        let resource = service.resource_create(format, size)?;
        if resource.is_null() {
            return Err(Error::internal("service returned a null resource"));
        }
        Ok(Self {
            service,
            resource,
            format,
            size,
            stride,
            bpp,
            state: Mutex::new(State::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.lock();
        if state.closed {
            return Err(Error::BadParameter("bitmap is closed"));
        }
        Ok(state)
    }

    // -- Properties --

    /// The GPU resource backing this bitmap.
    #[inline]
    #[must_use]
    pub fn resource(&self) -> ResourceHandle {
        self.resource
    }

    /// Pixel format.
    #[inline]
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Size in pixels.
    #[inline]
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Bytes between the starts of consecutive rows.
    #[inline]
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// The rectangle `(0, 0, width, height)`.
    #[inline]
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.size)
    }

    /// Current retain count.
    #[must_use]
    pub fn retain_count(&self) -> u32 {
        self.lock().retain
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns `true` once the GPU resource has been deleted.
    #[must_use]
    pub fn is_freed(&self) -> bool {
        self.lock().freed
    }

    /// Region modified since the last [`take_dirty`](Self::take_dirty).
    #[must_use]
    pub fn dirty_rect(&self) -> Option<Rect> {
        self.lock().dirty
    }

    /// Returns and clears the dirty region.
    pub fn take_dirty(&self) -> Option<Rect> {
        self.lock().dirty.take()
    }

    // -- Lifecycle --

    /// Adds a holder and returns the resource for enlisting on an update.
    ///
    /// Fails with [`Error::BadParameter`] once the bitmap is closed.
    pub fn retain(&self) -> Result<ResourceHandle> {
        let mut state = self.lock_open()?;
        state.retain += 1;
        Ok(self.resource)
    }

    /// Drops a holder. Returns `true` when the count reaches zero, meaning the
    /// bitmap should now be closed.
    ///
    /// Releasing a closed bitmap is allowed, so that holders of a leaked
    /// bitmap can still let go of it.
    ///
    /// # Panics
    ///
    /// Panics if the count is already zero.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        let Some(remaining) = state.retain.checked_sub(1) else {
            drop(state);
            panic!("bitmap retain count underflow on {:?}", self.resource);
        };
        state.retain = remaining;
        remaining == 0
    }

    /// Closes the bitmap, freeing its resource if nothing retains it.
    ///
    /// Closing is idempotent. While retained, the bitmap is still marked
    /// closed but the resource stays allocated, and an
    /// [`Error::Internal`] reports the leak.
    pub fn close(&self) -> Result<CloseOutcome> {
        let mut state = self.lock();
        if state.freed {
            return Ok(CloseOutcome::AlreadyFreed);
        }
        state.closed = true;
        state.rows = Vec::new();
        if state.retain > 0 {
            return Err(Error::internal("close called while retained"));
        }
        self.service.resource_delete(self.resource)?;
        state.freed = true;
        Ok(CloseOutcome::Freed)
    }

    // -- Row I/O --

    fn check_band(&self, offset_y: u32, height: u32) -> Result<Rect> {
        let end = offset_y
            .checked_add(height)
            .ok_or(Error::BadParameter("row range overflows"))?;
        if height == 0 || end > self.size.height {
            return Err(Error::BadParameter("row range outside bitmap"));
        }
        let y = i32::try_from(offset_y).map_err(|_| Error::BadParameter("row offset too large"))?;
        Ok(Rect::new(0, y, self.size.width, height))
    }

    fn band_len(&self, height: u32) -> usize {
        self.stride as usize * height as usize
    }

    /// Reads `height` rows starting at row `offset_y`.
    ///
    /// The result is `height * stride` bytes long. Requires
    /// `offset_y + height <= height of the bitmap` and `height >= 1`.
    pub fn read_rows(&self, offset_y: u32, height: u32) -> Result<Vec<u8>> {
        let band = self.check_band(offset_y, height)?;
        let mut state = self.lock_open()?;
        let len = self.band_len(height);
        state.rows.resize(len, 0);
        self.service
            .resource_read_data(self.resource, band, &mut state.rows, self.stride)?;
        Ok(state.rows.clone())
    }

    /// Writes whole rows starting at row `offset_y`.
    ///
    /// `buf` must hold a positive multiple of [`stride`](Self::stride) bytes,
    /// one row per stride, and the rows must fit inside the bitmap.
    pub fn write_rows(&self, buf: &[u8], offset_y: u32) -> Result<()> {
        let stride = self.stride as usize;
        if buf.is_empty() || !buf.len().is_multiple_of(stride) {
            return Err(Error::BadParameter(
                "buffer length must be a multiple of the stride",
            ));
        }
        let rows = u32::try_from(buf.len() / stride)
            .map_err(|_| Error::BadParameter("row range outside bitmap"))?;
        let band = self.check_band(offset_y, rows)?;
        let mut state = self.lock_open()?;
        self.service
            .resource_write_data(self.resource, self.format, self.stride, buf, band)?;
        state.dirty = union_opt(state.dirty, band);
        Ok(())
    }

    // -- Painting --

    fn pack(&self, color: Rgba16) -> Result<Color> {
        self.format.pack(color)
    }

    /// Fills the whole bitmap with `color`.
    pub fn clear_to(&self, color: Rgba16) -> Result<()> {
        let packed = self.pack(color)?;
        let mut state = self.lock_open()?;
        let row_len = self.size.width as usize * self.bpp as usize;
        let mut rows = std::mem::take(&mut state.rows);
        rows.clear();
        rows.resize(self.band_len(self.size.height), 0);
        for row in rows.chunks_exact_mut(self.stride as usize) {
            for px in row[..row_len].chunks_exact_mut(self.bpp as usize) {
                px.copy_from_slice(packed.as_bytes());
            }
        }
        let bounds = self.bounds();
        let written =
            self.service
                .resource_write_data(self.resource, self.format, self.stride, &rows, bounds);
        state.rows = rows;
        written?;
        state.dirty = Some(bounds);
        Ok(())
    }

    /// Sets one pixel. Points outside the bitmap are ignored.
    pub fn set_pixel(&self, p: Point, color: Rgba16) -> Result<()> {
        if !self.bounds().contains(p) {
            return Ok(());
        }
        self.paint(Rect::new(p.x, p.y, 1, 1), color, |canvas| {
            canvas.plot(i64::from(p.x), i64::from(p.y));
        })
    }

    /// Draws a line from `p0` to `p1`, both endpoints included.
    ///
    /// Uses the integer Bresenham algorithm: pixels are 8-connected and the
    /// walk starts at `p0`. Pixels outside the bitmap are skipped.
    pub fn line(&self, p0: Point, p1: Point, color: Rgba16) -> Result<()> {
        let bbox = Rect::from_points(p0, p1);
        self.paint(bbox, color, |canvas| {
            let (x1, y1) = (i64::from(p1.x), i64::from(p1.y));
            let dx = (x1 - i64::from(p0.x)).abs();
            let dy = -(y1 - i64::from(p0.y)).abs();
            let sx = if p0.x < p1.x { 1 } else { -1 };
            let sy = if p0.y < p1.y { 1 } else { -1 };
            let mut err = dx + dy;
            let (mut x, mut y) = (i64::from(p0.x), i64::from(p0.y));
            loop {
                canvas.plot(x, y);
                if x == x1 && y == y1 {
                    break;
                }
                let e2 = 2 * err;
                if e2 >= dy {
                    err += dy;
                    x += sx;
                }
                if e2 <= dx {
                    err += dx;
                    y += sy;
                }
            }
        })
    }

    /// Draws the outline of a circle of radius `r` around `center`.
    ///
    /// Uses the midpoint algorithm with 8-way symmetry. Each step plots the
    /// symmetric points in the order north, south, west, east, writing a
    /// pixel shared by several of them only once. `r = 0` plots `center`.
    /// Only the steps that can land inside the bitmap are walked.
    pub fn circle_outline(&self, center: Point, r: u32, color: Rgba16) -> Result<()> {
        let (cx, cy) = (i64::from(center.x), i64::from(center.y));
        let r = i64::from(r);
        let Some(bbox) = Rect::from_edges(cx - r, cy - r, cx + r + 1, cy + r + 1) else {
            return Ok(());
        };
        self.paint(bbox, color, |canvas| {
            // Every point of step (x, y) sits x away from the center on one
            // axis and y away on the other.
            let (dx_min, dx_max) = offsets(canvas.clip.min_x(), canvas.clip.max_x(), cx);
            let (dy_min, dy_max) = offsets(canvas.clip.min_y(), canvas.clip.max_y(), cy);
            let mut first = i64::MAX;
            let mut last = -1;
            if dx_min <= dy_max {
                first = first.min(dx_min);
                last = last.max(dx_max);
            }
            if dy_min <= dx_max {
                first = first.min(dy_min);
                last = last.max(dy_max);
            }
            let (mut x, mut y, mut err) = if first == 0 {
                (0, r, 1 - r)
            } else {
                let Some((y, err)) = midpoint_at(r, first) else {
                    return;
                };
                (first, y, err)
            };
            while x <= y && x <= last {
                let points = [
                    (cx + x, cy - y),
                    (cx - x, cy - y),
                    (cx + x, cy + y),
                    (cx - x, cy + y),
                    (cx - y, cy + x),
                    (cx - y, cy - x),
                    (cx + y, cy + x),
                    (cx + y, cy - x),
                ];
                for (i, &(px, py)) in points.iter().enumerate() {
                    if !points[..i].contains(&(px, py)) {
                        canvas.plot(px, py);
                    }
                }
                x += 1;
                if err < 0 {
                    err += 2 * x + 1;
                } else {
                    y -= 1;
                    err += 2 * (x - y) + 1;
                }
            }
        })
    }

    /// Runs `draw` against the rows covered by `area`, then writes them back
    /// and marks `area` dirty. Everything is clipped to the bitmap.
    fn paint(&self, area: Rect, color: Rgba16, draw: impl FnOnce(&mut Canvas<'_>)) -> Result<()> {
        let Some(clipped) = self.bounds().intersection(&area) else {
            return Ok(());
        };
        let packed = self.pack(color)?;
        let mut state = self.lock_open()?;
        let band = Rect::new(0, clipped.origin.y, self.size.width, clipped.size.height);
        let mut rows = std::mem::take(&mut state.rows);
        rows.resize(self.band_len(band.size.height), 0);
        let result = self
            .service
            .resource_read_data(self.resource, band, &mut rows, self.stride)
            .and_then(|()| {
                let mut canvas = Canvas {
                    rows: &mut rows,
                    stride: self.stride as usize,
                    bpp: self.bpp as usize,
                    band,
                    clip: clipped,
                    pixel: packed.as_bytes(),
                };
                draw(&mut canvas);
                self.service
                    .resource_write_data(self.resource, self.format, self.stride, &rows, band)
            });
        state.rows = rows;
        result?;
        state.dirty = union_opt(state.dirty, clipped);
        Ok(())
    }
}

impl ImageView for Bitmap {
    fn bounds(&self) -> Rect {
        Self::bounds(self)
    }

    fn color_model(&self) -> PixelFormat {
        self.format
    }

    fn at(&self, x: i32, y: i32) -> Result<Color> {
        let (Ok(col), Ok(row)) = (u32::try_from(x), u32::try_from(y)) else {
            return Color::transparent(self.format);
        };
        if col >= self.size.width || row >= self.size.height {
            return Color::transparent(self.format);
        }
        let rows = self.read_rows(row, 1)?;
        let start = col as usize * self.bpp as usize;
        Color::from_bytes(self.format, &rows[start..])
    }
}

impl Drop for Bitmap {
    fn drop(&mut self) {
        let state = self.lock();
        if state.retain == 0 && !state.freed {
            let _ = self.service.resource_delete(self.resource);
        }
    }
}

/// Smallest and largest distance from `c` to the pixels in `[lo, hi)`.
fn offsets(lo: i64, hi: i64, c: i64) -> (i64, i64) {
    let last = hi - 1;
    let near = if c < lo {
        lo - c
    } else if c > last {
        c - last
    } else {
        0
    };
    (near, (c - lo).abs().max((last - c).abs()))
}

/// Row and decision value of the midpoint circle walk at column `x`.
///
/// The walk keeps `y` at the largest value with `y * (y - 1) < r² - x²` and
/// `err = (x + 1)² + y² - y - r²`. Returns `None` once `x >= r`.
fn midpoint_at(r: i64, x: i64) -> Option<(i64, i64)> {
    let t = i128::from(r) * i128::from(r) - i128::from(x) * i128::from(x);
    if t <= 0 {
        return None;
    }
    let root = u128::try_from(4 * t + 1).ok()?.isqrt();
    let mut y = (i128::try_from(root).ok()? + 1) / 2;
    while y * (y - 1) >= t {
        y -= 1;
    }
    while (y + 1) * y < t {
        y += 1;
    }
    let err = 2 * i128::from(x) + 1 + y * (y - 1) - t;
    Some((i64::try_from(y).ok()?, i64::try_from(err).ok()?))
}

/// A row band being painted.
struct Canvas<'a> {
    rows: &'a mut [u8],
    stride: usize,
    bpp: usize,
    band: Rect,
    clip: Rect,
    pixel: &'a [u8],
}

impl Canvas<'_> {
    fn plot(&mut self, x: i64, y: i64) {
        if x < self.clip.min_x()
            || x >= self.clip.max_x()
            || y < self.clip.min_y()
            || y >= self.clip.max_y()
        {
            return;
        }
        let (Ok(col), Ok(row)) = (
            usize::try_from(x),
            usize::try_from(y - self.band.min_y()),
        ) else {
            return;
        };
        let start = row * self.stride + col * self.bpp;
        if let Some(dst) = self.rows.get_mut(start..start + self.bpp) {
            dst.copy_from_slice(self.pixel);
        }
    }
}
