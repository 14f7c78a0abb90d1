// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bitmaps placed on a display.
//!
//! An [`Element`] binds a [`Bitmap`] to a destination rectangle at a layer
//! and opacity. Creation, mutation, and removal are enlisted on an open
//! update and take effect when it is submitted.
//!
//! ```text
//!   Unborn ──new──► Live ──remove──► Removed ──close──► Closed
//!                   ▲  │
//!                   └──┘ set_*
//! ```
//!
//! Only `Live → Removed` releases the bitmap. Mutations on an element that is
//! no longer live are silent no-ops.

use std::sync::Arc;

use lamina_core::geometry::{Point, Rect, Size};
use lamina_core::handle::{DisplayHandle, ElementHandle, UpdateHandle};
use lamina_core::service::{
    Alpha, AlphaSource, AttrChange, ChangeMask, ElementAttrs, GpuService, Transform,
};
use lamina_core::{Error, Result};

use crate::bitmap::Bitmap;

/// A bitmap an element let go of.
#[derive(Debug)]
#[must_use]
pub struct Detached {
    /// The bitmap.
    pub bitmap: Arc<Bitmap>,
    /// `true` if this was its last retain, so it should now be closed.
    pub should_free: bool,
}

/// An element's attributes, saved so a rejected update can put them back.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Placement {
    dest: Rect,
    layer: u16,
    opacity: f32,
    alpha: Alpha,
    transform: Transform,
}

/// A layered region of a display backed by a bitmap.
pub struct Element {
    service: Arc<dyn GpuService>,
    handle: ElementHandle,
    display: DisplayHandle,
    bitmap: Option<Arc<Bitmap>>,
    dest: Rect,
    layer: u16,
    opacity: f32,
    alpha: Alpha,
    transform: Transform,
    closed: bool,
}

impl core::fmt::Debug for Element {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Element")
            .field("handle", &self.handle)
            .field("display", &self.display)
            .field("bitmap", &self.bitmap.as_ref().map(|b| b.resource()))
            .field("dest", &self.dest)
            .field("layer", &self.layer)
            .field("opacity", &self.opacity)
            .field("alpha", &self.alpha)
            .field("transform", &self.transform)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn encode_opacity(opacity: f32) -> Result<u8> {
    Alpha::encode_opacity(opacity).ok_or(Error::BadParameter("opacity must be in [0, 1]"))
}

fn require_update(update: UpdateHandle) -> Result<()> {
    if update.is_null() {
        return Err(Error::internal("no open update"));
    }
    Ok(())
}

impl Element {
    /// Places `bitmap` on `display`, enlisted on `update`.
    ///
    /// A zero width or height in `dest` is replaced by the bitmap's. The
    /// element shows the whole bitmap with no transform. The bitmap is
    /// retained for as long as the element is live; if the service refuses
    /// the element, the retain is undone.
    pub fn new(
        service: Arc<dyn GpuService>,
        update: UpdateHandle,
        display: DisplayHandle,
        bitmap: &Arc<Bitmap>,
        dest: Rect,
        layer: u16,
        opacity: f32,
        alpha_source: AlphaSource,
    ) -> Result<Self> {
        if update.is_null() {
            return Err(Error::BadParameter("no open update"));
        }
        if display.is_null() {
            return Err(Error::BadParameter("null display"));
        }
        if bitmap.is_closed() {
            return Err(Error::BadParameter("bitmap is closed"));
        }
        let alpha = Alpha {
            source: alpha_source,
            opacity: encode_opacity(opacity)?,
        };
        let size = bitmap.size();
        let dest = dest.with_size(Size::new(
            if dest.size.width == 0 {
                size.width
            } else {
                dest.size.width
            },
            if dest.size.height == 0 {
                size.height
            } else {
                dest.size.height
            },
        ));

        let source = bitmap.retain()?;
        let attrs = ElementAttrs {
            layer,
            dest,
            source,
            src: bitmap.bounds(),
            alpha,
            transform: Transform::Identity,
        };
        let handle = match service.element_add(update, display, &attrs) {
            Ok(handle) if !handle.is_null() => handle,
            Ok(_) => {
                bitmap.release();
                return Err(Error::internal("service returned a null element"));
            }
            Err(e) => {
                bitmap.release();
                return Err(e);
            }
        };
        Ok(Self {
            service,
            handle,
            display,
            bitmap: Some(bitmap.clone()),
            dest,
            layer,
            opacity,
            alpha,
            transform: Transform::Identity,
            closed: false,
        })
    }

    // -- Properties --

    /// The service-side handle, or [`ElementHandle::NONE`] once removed.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> ElementHandle {
        self.handle
    }

    /// Returns `true` while the element is on its display.
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.handle.is_null()
    }

    /// Returns `true` once [`close`](Self::close) has succeeded.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The display the element was placed on.
    #[must_use]
    pub fn display(&self) -> DisplayHandle {
        self.display
    }

    /// The backing bitmap while live.
    #[must_use]
    pub fn bitmap(&self) -> Option<&Arc<Bitmap>> {
        self.bitmap.as_ref()
    }

    /// Destination rectangle on the display.
    #[must_use]
    pub fn dest(&self) -> Rect {
        self.dest
    }

    /// Composition layer.
    #[must_use]
    pub fn layer(&self) -> u16 {
        self.layer
    }

    /// Opacity in `[0, 1]`.
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Alpha configuration as sent to the service.
    #[must_use]
    pub fn alpha(&self) -> Alpha {
        self.alpha
    }

    /// Orientation of the source on the destination.
    #[must_use]
    pub fn transform(&self) -> Transform {
        self.transform
    }

    // -- Mutation --

    fn change(
        &self,
        update: UpdateHandle,
        mask: ChangeMask,
        edit: impl FnOnce(&mut AttrChange),
    ) -> Result<()> {
        let mut change = AttrChange {
            layer: self.layer,
            opacity: self.alpha.opacity,
            dest: self.dest,
            src: self.bitmap.as_ref().map_or(Rect::default(), |b| b.bounds()),
            transform: self.transform,
        };
        edit(&mut change);
        self.service
            .element_change_attributes(update, self.handle, mask, &change)
    }

    /// Moves the destination to `origin` without resizing it.
    pub fn set_origin(&mut self, update: UpdateHandle, origin: Point) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }
        require_update(update)?;
        let dest = self.dest.with_origin(origin);
        self.change(update, ChangeMask::DEST_RECT, |c| c.dest = dest)?;
        self.dest = dest;
        Ok(())
    }

    /// Resizes the destination. Both dimensions must be at least 1.
    pub fn set_size(&mut self, update: UpdateHandle, size: Size) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }
        require_update(update)?;
        if size.is_empty() {
            return Err(Error::BadParameter("element size must be at least 1x1"));
        }
        let dest = self.dest.with_size(size);
        self.change(update, ChangeMask::DEST_RECT, |c| c.dest = dest)?;
        self.dest = dest;
        Ok(())
    }

    /// Moves the element to another layer.
    pub fn set_layer(&mut self, update: UpdateHandle, layer: u16) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }
        require_update(update)?;
        self.change(update, ChangeMask::LAYER, |c| c.layer = layer)?;
        self.layer = layer;
        Ok(())
    }

    /// Changes the opacity. `opacity` must be in `[0, 1]`.
    pub fn set_opacity(&mut self, update: UpdateHandle, opacity: f32) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }
        require_update(update)?;
        let encoded = encode_opacity(opacity)?;
        self.change(update, ChangeMask::OPACITY, |c| c.opacity = encoded)?;
        self.opacity = opacity;
        self.alpha.opacity = encoded;
        Ok(())
    }

    /// Changes how the source is oriented on the destination.
    pub fn set_transform(&mut self, update: UpdateHandle, transform: Transform) -> Result<()> {
        if !self.is_live() {
            return Ok(());
        }
        require_update(update)?;
        self.change(update, ChangeMask::TRANSFORM, |c| c.transform = transform)?;
        self.transform = transform;
        Ok(())
    }

    /// Swaps the backing bitmap and shows all of it.
    ///
    /// The new bitmap is retained before the old one is released, so the
    /// element is never unbacked. Returns the bitmap that was let go of, or
    /// `None` if the element is not live.
    pub fn set_bitmap(
        &mut self,
        update: UpdateHandle,
        bitmap: &Arc<Bitmap>,
    ) -> Result<Option<Detached>> {
        if !self.is_live() {
            return Ok(None);
        }
        require_update(update)?;
        if bitmap.is_closed() {
            return Err(Error::BadParameter("bitmap is closed"));
        }
        let source = bitmap.retain()?;
        let src = bitmap.bounds();
        let swapped = self
            .change(update, ChangeMask::SRC_RECT, |c| c.src = src)
            .and_then(|()| {
                self.service
                    .element_change_source(update, self.handle, source)
                    .map_err(|e| {
                        // Put the source rectangle back to the old bitmap's.
                        match self.change(update, ChangeMask::SRC_RECT, |_| {}) {
                            Ok(()) => e,
                            Err(undo) => Error::Compound(vec![e, undo]),
                        }
                    })
            });
        if let Err(e) = swapped {
            bitmap.release();
            return Err(e);
        }
        let old = self.bitmap.replace(bitmap.clone());
        Ok(old.map(|old| {
            let should_free = old.release();
            Detached {
                bitmap: old,
                should_free,
            }
        }))
    }

    /// Takes the element off its display and releases its bitmap.
    ///
    /// Returns the released bitmap, or `None` if the element was not live.
    pub fn remove(&mut self, update: UpdateHandle) -> Result<Option<Detached>> {
        if !self.is_live() {
            return Ok(None);
        }
        require_update(update)?;
        self.service.element_remove(update, self.handle)?;
        self.handle = ElementHandle::NONE;
        Ok(self.bitmap.take().map(|bitmap| {
            let should_free = bitmap.release();
            Detached {
                bitmap,
                should_free,
            }
        }))
    }

    // -- Rollback --
    //
    // Used when the service rejects the update these changes were enlisted
    // on. None of them talk to the service.

    pub(crate) fn placement(&self) -> Placement {
        Placement {
            dest: self.dest,
            layer: self.layer,
            opacity: self.opacity,
            alpha: self.alpha,
            transform: self.transform,
        }
    }

    pub(crate) fn restore_placement(&mut self, placement: Placement) {
        self.dest = placement.dest;
        self.layer = placement.layer;
        self.opacity = placement.opacity;
        self.alpha = placement.alpha;
        self.transform = placement.transform;
    }

    /// Puts `old` back as the source and lets go of the current bitmap.
    pub(crate) fn restore_bitmap(&mut self, old: Arc<Bitmap>) -> Result<Option<Detached>> {
        old.retain()?;
        Ok(self.bitmap.replace(old).map(|bitmap| {
            let should_free = bitmap.release();
            Detached {
                bitmap,
                should_free,
            }
        }))
    }

    /// Brings a removed element back under `handle`, retaining `bitmap`.
    pub(crate) fn reinstate(
        &mut self,
        handle: ElementHandle,
        bitmap: Option<Arc<Bitmap>>,
    ) -> Result<()> {
        if let Some(bitmap) = &bitmap {
            bitmap.retain()?;
        }
        self.handle = handle;
        self.bitmap = bitmap;
        Ok(())
    }

    /// Forgets an element the service never applied and releases its bitmap.
    pub(crate) fn discard(&mut self) -> Option<Detached> {
        self.handle = ElementHandle::NONE;
        self.closed = true;
        self.bitmap.take().map(|bitmap| {
            let should_free = bitmap.release();
            Detached {
                bitmap,
                should_free,
            }
        })
    }

    /// Marks a removed element closed.
    ///
    /// Fails while the element is live.
    pub fn close(&mut self) -> Result<()> {
        if self.is_live() {
            return Err(Error::BadParameter("call remove before close"));
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lamina_backend_soft::{Fault, SoftGpu};
    use lamina_core::ErrorKind;
    use lamina_core::pixel::PixelFormat;

    use super::*;

    struct Fixture {
        gpu: Arc<SoftGpu>,
        display: DisplayHandle,
        bitmap: Arc<Bitmap>,
    }

    fn fixture() -> Fixture {
        let gpu = Arc::new(SoftGpu::new().with_display(0, Size::new(16, 16)));
        let display = gpu.display_open(0).unwrap();
        let bitmap =
            Arc::new(Bitmap::new(gpu.clone(), PixelFormat::Rgba32, Size::new(4, 3)).unwrap());
        Fixture {
            gpu,
            display,
            bitmap,
        }
    }

    impl Fixture {
        fn element(&self, update: UpdateHandle, dest: Rect) -> Result<Element> {
            Element::new(
                self.gpu.clone(),
                update,
                self.display,
                &self.bitmap,
                dest,
                0,
                1.0,
                AlphaSource::FromSource,
            )
        }

        fn other_bitmap(&self) -> Arc<Bitmap> {
            Arc::new(
                Bitmap::new(self.gpu.clone(), PixelFormat::Rgb565, Size::new(2, 2)).unwrap(),
            )
        }
    }

    #[test]
    fn new_retains_and_defaults_size() {
        let f = fixture();
        let update = f.gpu.update_start(0).unwrap();
        let el = f.element(update, Rect::new(5, 6, 0, 0)).unwrap();
        assert!(el.is_live());
        assert_eq!(el.dest(), Rect::new(5, 6, 4, 3));
        assert_eq!(f.bitmap.retain_count(), 1);
        f.gpu.update_submit_sync(update).unwrap();
        let attrs = f.gpu.element_attrs(el.handle()).unwrap();
        assert_eq!(attrs.src, Rect::new(0, 0, 4, 3));
        assert_eq!(attrs.alpha.opacity, 255);
        assert_eq!(attrs.transform, Transform::Identity);
    }

    #[test]
    fn zero_width_defaults_only_width() {
        let f = fixture();
        let update = f.gpu.update_start(0).unwrap();
        let el = f.element(update, Rect::new(0, 0, 0, 9)).unwrap();
        assert_eq!(el.dest().size, Size::new(4, 9));
    }

    #[test]
    fn preconditions_are_bad_parameters() {
        let f = fixture();
        let update = f.gpu.update_start(0).unwrap();
        let err = f.element(UpdateHandle::NONE, Rect::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
        let err = Element::new(
            f.gpu.clone(),
            update,
            DisplayHandle::NONE,
            &f.bitmap,
            Rect::default(),
            0,
            1.0,
            AlphaSource::FromSource,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
        let err = Element::new(
            f.gpu.clone(),
            update,
            f.display,
            &f.bitmap,
            Rect::default(),
            0,
            1.5,
            AlphaSource::FromSource,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
        assert_eq!(f.bitmap.retain_count(), 0);
    }

    #[test]
    fn closed_bitmap_is_rejected() {
        let f = fixture();
        let update = f.gpu.update_start(0).unwrap();
        f.bitmap.close().unwrap();
        let err = f.element(update, Rect::default()).unwrap_err();
        assert_eq!(err, Error::BadParameter("bitmap is closed"));
    }

    #[test]
    fn refused_add_releases_the_bitmap() {
        let f = fixture();
        let update = f.gpu.update_start(0).unwrap();
        f.gpu.fail_next(Fault::ElementAdd);
        assert!(f.element(update, Rect::default()).is_err());
        assert_eq!(f.bitmap.retain_count(), 0);
    }

    #[test]
    fn mutations_update_the_model() {
        let f = fixture();
        let update = f.gpu.update_start(0).unwrap();
        let mut el = f.element(update, Rect::default()).unwrap();
        el.set_origin(update, Point::new(3, 4)).unwrap();
        el.set_size(update, Size::new(8, 6)).unwrap();
        el.set_layer(update, 12).unwrap();
        el.set_opacity(update, 0.5).unwrap();
        el.set_transform(update, Transform::FlipVertical).unwrap();
        f.gpu.update_submit_sync(update).unwrap();

        assert_eq!(el.dest(), Rect::new(3, 4, 8, 6));
        assert_eq!(el.layer(), 12);
        assert_eq!(el.alpha().opacity, 128);
        let attrs = f.gpu.element_attrs(el.handle()).unwrap();
        assert_eq!(attrs.dest, Rect::new(3, 4, 8, 6));
        assert_eq!(attrs.layer, 12);
        assert_eq!(attrs.alpha.opacity, 128);
        assert_eq!(attrs.transform, Transform::FlipVertical);
    }

    #[test]
    fn invalid_mutations_are_rejected_without_change() {
        let f = fixture();
        let update = f.gpu.update_start(0).unwrap();
        let mut el = f.element(update, Rect::new(1, 1, 2, 2)).unwrap();
        assert_eq!(
            el.set_size(update, Size::new(0, 3)).unwrap_err().kind(),
            ErrorKind::BadParameter
        );
        assert_eq!(
            el.set_opacity(update, -0.1).unwrap_err().kind(),
            ErrorKind::BadParameter
        );
        assert_eq!(
            el.set_layer(UpdateHandle::NONE, 3).unwrap_err().kind(),
            ErrorKind::Internal
        );
        f.gpu.fail_next(Fault::ElementChange);
        assert!(el.set_origin(update, Point::new(9, 9)).is_err());
        assert_eq!(el.dest(), Rect::new(1, 1, 2, 2));
        assert_eq!(el.layer(), 0);
    }

    #[test]
    fn set_bitmap_swaps_retains() {
        let f = fixture();
        let b2 = f.other_bitmap();
        let update = f.gpu.update_start(0).unwrap();
        let mut el = f.element(update, Rect::default()).unwrap();
        let detached = el.set_bitmap(update, &b2).unwrap().unwrap();
        assert!(Arc::ptr_eq(&detached.bitmap, &f.bitmap));
        assert!(detached.should_free);
        assert_eq!(f.bitmap.retain_count(), 0);
        assert_eq!(b2.retain_count(), 1);
        f.gpu.update_submit_sync(update).unwrap();
        let attrs = f.gpu.element_attrs(el.handle()).unwrap();
        assert_eq!(attrs.source, b2.resource());
        assert_eq!(attrs.src, Rect::new(0, 0, 2, 2));
    }

    #[test]
    fn refused_swap_keeps_the_old_bitmap() {
        let f = fixture();
        let b2 = f.other_bitmap();
        let update = f.gpu.update_start(0).unwrap();
        let mut el = f.element(update, Rect::default()).unwrap();
        f.gpu.fail_next(Fault::ElementSource);
        assert!(el.set_bitmap(update, &b2).is_err());
        assert_eq!(b2.retain_count(), 0);
        assert_eq!(f.bitmap.retain_count(), 1);
        assert!(Arc::ptr_eq(el.bitmap().unwrap(), &f.bitmap));

        f.gpu.update_submit_sync(update).unwrap();
        let attrs = f.gpu.element_attrs(el.handle()).unwrap();
        assert_eq!(attrs.source, f.bitmap.resource());
        assert_eq!(attrs.src, f.bitmap.bounds());
    }

    #[test]
    fn rollback_restores_attributes_source_and_liveness() {
        let f = fixture();
        let b2 = f.other_bitmap();
        let update = f.gpu.update_start(0).unwrap();
        let mut el = f.element(update, Rect::new(1, 1, 0, 0)).unwrap();

        let saved = el.placement();
        el.set_origin(update, Point::new(7, 7)).unwrap();
        el.set_layer(update, 9).unwrap();
        el.restore_placement(saved);
        assert_eq!(el.dest(), Rect::new(1, 1, 4, 3));
        assert_eq!(el.layer(), 0);

        let old = el.set_bitmap(update, &b2).unwrap().unwrap();
        assert_eq!(f.bitmap.retain_count(), 0);
        let swapped_in = el.restore_bitmap(old.bitmap).unwrap().unwrap();
        assert!(Arc::ptr_eq(&swapped_in.bitmap, &b2));
        assert!(swapped_in.should_free);
        assert_eq!(f.bitmap.retain_count(), 1);
        assert!(Arc::ptr_eq(el.bitmap().unwrap(), &f.bitmap));

        let handle = el.handle();
        let removed = el.remove(update).unwrap().unwrap();
        el.reinstate(handle, Some(removed.bitmap)).unwrap();
        assert!(el.is_live());
        assert_eq!(el.handle(), handle);
        assert_eq!(f.bitmap.retain_count(), 1);

        let dropped = el.discard().unwrap();
        assert!(dropped.should_free);
        assert!(!el.is_live());
        assert!(el.is_closed());
        assert_eq!(f.bitmap.retain_count(), 0);
    }

    #[test]
    fn remove_then_close() {
        let f = fixture();
        let update = f.gpu.update_start(0).unwrap();
        let mut el = f.element(update, Rect::default()).unwrap();
        assert_eq!(el.close(), Err(Error::BadParameter("call remove before close")));
        let detached = el.remove(update).unwrap().unwrap();
        assert!(detached.should_free);
        assert!(!el.is_live());
        assert!(el.bitmap().is_none());
        assert_eq!(f.bitmap.retain_count(), 0);
        el.close().unwrap();
        assert!(el.is_closed());
    }

    #[test]
    fn removed_element_ignores_mutations() {
        let f = fixture();
        let update = f.gpu.update_start(0).unwrap();
        let mut el = f.element(update, Rect::default()).unwrap();
        let _ = el.remove(update).unwrap();
        let changes = f.gpu.stats().attribute_changes;
        el.set_layer(update, 4).unwrap();
        el.set_origin(UpdateHandle::NONE, Point::new(1, 1)).unwrap();
        assert!(el.set_bitmap(update, &f.other_bitmap()).unwrap().is_none());
        assert!(el.remove(update).unwrap().is_none());
        assert_eq!(f.gpu.stats().attribute_changes, changes);
        assert_eq!(el.layer(), 0);
    }
}
