// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contract for GPU surface services.
//!
//! The compositor never touches GPU memory or scan-out hardware directly.
//! Everything it needs from the platform goes through [`GpuService`]:
//!
//! - **Host** — process-wide `host_init` / `host_deinit`, plus display
//!   bring-up (`display_open`, `display_info`, `display_close`).
//! - **Resources** — pixel buffers of a fixed format and size, with row-level
//!   reads and writes.
//! - **Updates** — transactions opened with `update_start` and applied
//!   atomically by `update_submit_sync`.
//! - **Elements** — rectangles on a display backed by a resource. Element
//!   calls are enlisted on an open update and take effect when it is
//!   submitted.
//!
//! # Crate boundaries
//!
//! `lamina_core` owns this contract. Backend crates implement it (a software
//! implementation lives in `lamina_backend_soft`), and `lamina_compositor`
//! consumes it through `Arc<dyn GpuService>`.
//!
//! All methods take `&self`: a service is shared by the compositor and by
//! every bitmap it creates, so implementations synchronize internally.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

use crate::error::Result;
use crate::geometry::{Rect, Size};
use crate::handle::{DisplayHandle, ElementHandle, ResourceHandle, UpdateHandle};
use crate::pixel::PixelFormat;

/// Where an element takes its per-pixel alpha from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AlphaSource {
    /// Use the source pixels' alpha, scaled by the element opacity.
    #[default]
    FromSource,
    /// Apply the element opacity uniformly, ignoring per-pixel alpha.
    FixedAllPixels,
}

/// Alpha configuration of an element as the service sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Alpha {
    /// Per-pixel alpha source.
    pub source: AlphaSource,
    /// Element opacity, `0` transparent to `255` opaque.
    pub opacity: u8,
}

impl Alpha {
    /// Encodes an opacity in `[0, 1]` as `round(opacity * 255)`.
    ///
    /// Returns `None` for values outside `[0, 1]` (including NaN).
    #[must_use]
    pub fn encode_opacity(opacity: f32) -> Option<u8> {
        if !(0.0..=1.0).contains(&opacity) {
            return None;
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "opacity is in [0, 1], so the rounded product fits in u8"
        )]
        let encoded = (opacity * 255.0 + 0.5) as u8;
        Some(encoded)
    }
}

/// Orientation applied when mapping the source rectangle onto the
/// destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Transform {
    /// No transform.
    #[default]
    Identity,
    /// Rotate 90° clockwise.
    Rotate90,
    /// Rotate 180°.
    Rotate180,
    /// Rotate 270° clockwise.
    Rotate270,
    /// Mirror left-to-right.
    FlipHorizontal,
    /// Mirror top-to-bottom.
    FlipVertical,
}

/// Selects which fields of an [`AttrChange`] a service must apply.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeMask(u32);

impl ChangeMask {
    /// No fields.
    pub const EMPTY: Self = Self(0);
    /// [`AttrChange::layer`].
    pub const LAYER: Self = Self(1 << 0);
    /// [`AttrChange::opacity`].
    pub const OPACITY: Self = Self(1 << 1);
    /// [`AttrChange::dest`].
    pub const DEST_RECT: Self = Self(1 << 2);
    /// [`AttrChange::src`].
    pub const SRC_RECT: Self = Self(1 << 3);
    /// Reserved for mask resources; never set by the compositor.
    pub const MASK: Self = Self(1 << 4);
    /// [`AttrChange::transform`].
    pub const TRANSFORM: Self = Self(1 << 5);

    /// Returns the raw bit set.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Creates a mask from raw bits. Bits without a named field are dropped.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0x3f)
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no bit is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ChangeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ChangeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ChangeMask, &str); 6] = [
            (ChangeMask::LAYER, "LAYER"),
            (ChangeMask::OPACITY, "OPACITY"),
            (ChangeMask::DEST_RECT, "DEST_RECT"),
            (ChangeMask::SRC_RECT, "SRC_RECT"),
            (ChangeMask::MASK, "MASK"),
            (ChangeMask::TRANSFORM, "TRANSFORM"),
        ];
        f.write_str("ChangeMask(")?;
        let mut first = true;
        for (bit, name) in NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        f.write_str(")")
    }
}

/// Everything a service needs to place a new element.
///
/// Clamping and content protection are always off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementAttrs {
    /// Composition order; higher layers are drawn above lower ones.
    pub layer: u16,
    /// Destination on the display.
    pub dest: Rect,
    /// Source resource.
    pub source: ResourceHandle,
    /// Region of the source to show, in source pixels.
    pub src: Rect,
    /// Alpha configuration.
    pub alpha: Alpha,
    /// Source-to-destination orientation.
    pub transform: Transform,
}

/// New attribute values for an existing element.
///
/// Only the fields selected by the accompanying [`ChangeMask`] are read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttrChange {
    /// New layer.
    pub layer: u16,
    /// New opacity, `0..=255`.
    pub opacity: u8,
    /// New destination.
    pub dest: Rect,
    /// New source region.
    pub src: Rect,
    /// New orientation.
    pub transform: Transform,
}

/// Static properties of an open display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DisplayInfo {
    /// Visible area in pixels.
    pub size: Size,
}

/// Operations a GPU surface service provides to the compositor.
///
/// Failures are reported as [`Error`](crate::Error) values; services report
/// refused requests as [`Error::Internal`](crate::Error::Internal) and
/// malformed arguments as [`Error::BadParameter`](crate::Error::BadParameter).
pub trait GpuService: Send + Sync {
    /// Process-wide initialization. Called once before any display is opened.
    fn host_init(&self) -> Result<()> {
        Ok(())
    }

    /// Process-wide teardown. Called once after the last compositor is gone.
    fn host_deinit(&self) {}

    /// Opens display `device` and returns its handle.
    fn display_open(&self, device: u32) -> Result<DisplayHandle>;

    /// Returns the properties of an open display.
    fn display_info(&self, display: DisplayHandle) -> Result<DisplayInfo>;

    /// Closes a display handle.
    fn display_close(&self, display: DisplayHandle) -> Result<()>;

    /// Allocates a resource of `format` and `size`.
    fn resource_create(&self, format: PixelFormat, size: Size) -> Result<ResourceHandle>;

    /// Frees a resource.
    fn resource_delete(&self, resource: ResourceHandle) -> Result<()>;

    /// Copies the pixels of `rect` into `dst`, one row every `stride` bytes.
    fn resource_read_data(
        &self,
        resource: ResourceHandle,
        rect: Rect,
        dst: &mut [u8],
        stride: u32,
    ) -> Result<()>;

    /// Copies pixels from `src` (one row every `stride` bytes, packed in
    /// `format`) into `rect` of the resource.
    fn resource_write_data(
        &self,
        resource: ResourceHandle,
        format: PixelFormat,
        stride: u32,
        src: &[u8],
        rect: Rect,
    ) -> Result<()>;

    /// Opens a transaction. Higher `priority` values are applied later when
    /// several transactions are submitted together.
    fn update_start(&self, priority: i32) -> Result<UpdateHandle>;

    /// Applies every operation enlisted on `update` atomically and returns
    /// once the result is on screen. The handle is consumed.
    fn update_submit_sync(&self, update: UpdateHandle) -> Result<()>;

    /// Enlists the creation of an element on `display`.
    fn element_add(
        &self,
        update: UpdateHandle,
        display: DisplayHandle,
        attrs: &ElementAttrs,
    ) -> Result<ElementHandle>;

    /// Enlists the removal of an element.
    fn element_remove(&self, update: UpdateHandle, element: ElementHandle) -> Result<()>;

    /// Enlists an attribute change; only fields selected by `mask` apply.
    fn element_change_attributes(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        mask: ChangeMask,
        change: &AttrChange,
    ) -> Result<()>;

    /// Enlists a swap of the element's source resource.
    fn element_change_source(
        &self,
        update: UpdateHandle,
        element: ElementHandle,
        resource: ResourceHandle,
    ) -> Result<()>;
}
