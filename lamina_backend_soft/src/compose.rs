// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scan-out composition.
//!
//! Elements are drawn in ascending layer order, ties broken by the order in
//! which they were added. Each display pixel center inside an element's
//! destination is mapped back into the source rectangle through the element
//! transform and sampled with nearest-neighbor filtering.

use kurbo::Affine;
use lamina_core::geometry::{Rect, Size};
use lamina_core::handle::ResourceHandle;
use lamina_core::pixel::PixelFormat;
use lamina_core::service::{AlphaSource, ElementAttrs, Transform};

/// Background of an empty scan-out: opaque black.
pub(crate) const BACKGROUND: [u8; 4] = [0, 0, 0, 0xff];

/// Read access to resource pixels for the compositor.
pub(crate) trait PixelSource {
    /// Format and size of `resource`, if it exists.
    fn describe(&self, resource: ResourceHandle) -> Option<(PixelFormat, Size)>;

    /// Packed bytes of one pixel of `resource`.
    fn texel(&self, resource: ResourceHandle, x: u32, y: u32) -> Option<&[u8]>;
}

/// Maps destination unit coordinates to source unit coordinates.
fn orientation(transform: Transform) -> Affine {
    match transform {
        Transform::Identity => Affine::IDENTITY,
        Transform::Rotate90 => Affine::new([0.0, -1.0, 1.0, 0.0, 0.0, 1.0]),
        Transform::Rotate180 => Affine::new([-1.0, 0.0, 0.0, -1.0, 1.0, 1.0]),
        Transform::Rotate270 => Affine::new([0.0, 1.0, -1.0, 0.0, 1.0, 0.0]),
        Transform::FlipHorizontal => Affine::new([-1.0, 0.0, 0.0, 1.0, 1.0, 0.0]),
        Transform::FlipVertical => Affine::new([1.0, 0.0, 0.0, -1.0, 0.0, 1.0]),
    }
}

/// Builds the display-to-source mapping for an element.
pub(crate) fn sampling_map(attrs: &ElementAttrs) -> Affine {
    let dest = kurbo::Rect::from(attrs.dest);
    let src = kurbo::Rect::from(attrs.src);
    let to_unit = Affine::scale_non_uniform(1.0 / dest.width(), 1.0 / dest.height())
        * Affine::translate((-dest.x0, -dest.y0));
    let to_src = Affine::translate((src.x0, src.y0))
        * Affine::scale_non_uniform(src.width(), src.height());
    to_src * orientation(attrs.transform) * to_unit
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "sample coordinates are bounds-checked against u32 ranges by the caller"
)]
fn texel_index(v: f64) -> i64 {
    v.floor() as i64
}

/// Blends `src` over `dst` with coverage `alpha` (`0..=255`).
fn blend(dst: &mut [u8; 4], src: [u8; 4], alpha: u32) {
    for (d, s) in dst.iter_mut().zip(src).take(3) {
        let mixed = (u32::from(s) * alpha + u32::from(*d) * (255 - alpha) + 127) / 255;
        *d = u8::try_from(mixed).unwrap_or(u8::MAX);
    }
    dst[3] = 0xff;
}

/// Recomposites a display's scan-out image from scratch.
///
/// `elements` must already be sorted into composition order.
pub(crate) fn composite<'a>(
    pixels: &mut [[u8; 4]],
    size: Size,
    elements: impl IntoIterator<Item = &'a ElementAttrs>,
    source: &impl PixelSource,
) {
    pixels.fill(BACKGROUND);
    let screen = Rect::from_size(size);
    for attrs in elements {
        if attrs.dest.is_empty() || attrs.src.is_empty() {
            continue;
        }
        let Some(visible) = screen.intersection(&attrs.dest) else {
            continue;
        };
        let Some((format, res_size)) = source.describe(attrs.source) else {
            continue;
        };
        let bounds = Rect::from_size(res_size);
        let Some(src_rect) = bounds.intersection(&attrs.src) else {
            continue;
        };
        let map = sampling_map(attrs);
        for y in visible.min_y()..visible.max_y() {
            for x in visible.min_x()..visible.max_x() {
                let p = map * kurbo::Point::new(x as f64 + 0.5, y as f64 + 0.5);
                let (sx, sy) = (texel_index(p.x), texel_index(p.y));
                if sx < src_rect.min_x()
                    || sx >= src_rect.max_x()
                    || sy < src_rect.min_y()
                    || sy >= src_rect.max_y()
                {
                    continue;
                }
                let (Ok(sx), Ok(sy)) = (u32::try_from(sx), u32::try_from(sy)) else {
                    continue;
                };
                let Some(color) = source
                    .texel(attrs.source, sx, sy)
                    .and_then(|px| format.unpack(px).ok())
                else {
                    continue;
                };
                let rgba = color.to_rgba8();
                let opacity = u32::from(attrs.alpha.opacity);
                let alpha = match attrs.alpha.source {
                    AlphaSource::FromSource => (u32::from(rgba[3]) * opacity + 127) / 255,
                    AlphaSource::FixedAllPixels => opacity,
                };
                let (Ok(dx), Ok(dy)) = (usize::try_from(x), usize::try_from(y)) else {
                    continue;
                };
                let idx = dy * size.width as usize + dx;
                if let Some(dst) = pixels.get_mut(idx) {
                    blend(dst, rgba, alpha);
                }
            }
        }
    }
}
