// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end compositions against the software GPU service.

mod common;

use common::Harness;
use lamina_compositor::ImageView;
use lamina_core::geometry::{Point, Rect, Size};
use lamina_core::pixel::{PixelFormat, Rgba16};
use lamina_core::service::{AlphaSource, Transform};

const RED: Rgba16 = Rgba16::from_rgba8(0xff, 0, 0, 0xff);

#[test]
fn single_red_pixel_at_origin() {
    let h = Harness::new();
    let c = h.compositor();
    let display = c.display();

    let (bitmap, id) = c
        .update(0, |c| {
            let bitmap = c.new_bitmap(Size::new(1, 1), PixelFormat::Rgba32)?;
            bitmap.set_pixel(Point::ZERO, RED)?;
            let id = c.add_element(Rect::new(0, 0, 0, 0), &bitmap, 0, 1.0, AlphaSource::FromSource)?;
            Ok((bitmap, id))
        })
        .unwrap();

    let stats = h.gpu.stats();
    assert_eq!(stats.updates_submitted, 1);
    assert_eq!(stats.updates_failed, 0);
    assert_eq!(c.element_count(), 1);
    assert_eq!(c.element(id).unwrap().dest, Rect::new(0, 0, 1, 1));
    // One retain for the compositor, one for the element.
    assert_eq!(bitmap.retain_count(), 2);
    c.release_bitmap(&bitmap).unwrap();
    assert_eq!(bitmap.retain_count(), 1);

    assert_eq!(h.gpu.pixel_at(display.handle, Point::ZERO), Some([0xff, 0, 0, 0xff]));
    assert_eq!(
        h.gpu.pixel_at(display.handle, Point::new(1, 0)),
        Some([0, 0, 0, 0xff])
    );
}

#[test]
fn clear_fills_every_row_and_dirties_the_bounds() {
    let h = Harness::new();
    let c = h.compositor();
    let bitmap = c.new_bitmap(Size::new(10, 10), PixelFormat::Rgb565).unwrap();
    bitmap.clear_to(Rgba16::WHITE).unwrap();

    let rows = bitmap.read_rows(0, 10).unwrap();
    for row in rows.chunks(bitmap.stride() as usize) {
        assert!(row[..20].iter().all(|&b| b == 0xff));
    }
    assert_eq!(bitmap.dirty_rect(), Some(bitmap.bounds()));
    assert_eq!(
        bitmap.at(9, 9).unwrap().to_rgba16().unwrap(),
        Rgba16::WHITE
    );
}

#[test]
fn diagonal_line_sets_one_pixel_per_row() {
    let h = Harness::new();
    let c = h.compositor();
    let bitmap = c.new_bitmap(Size::new(100, 100), PixelFormat::Rgba32).unwrap();
    bitmap.clear_to(Rgba16::BLACK).unwrap();
    bitmap.take_dirty();
    bitmap
        .line(Point::ZERO, Point::new(99, 99), Rgba16::WHITE)
        .unwrap();

    let rows = bitmap.read_rows(0, 100).unwrap();
    let stride = bitmap.stride() as usize;
    let mut white = 0;
    for y in 0..100 {
        for x in 0..100 {
            let px = &rows[y * stride + x * 4..][..4];
            if px == [0xff; 4] {
                assert_eq!(x, y);
                white += 1;
            }
        }
    }
    assert_eq!(white, 100);
    assert_eq!(bitmap.dirty_rect(), Some(Rect::new(0, 0, 100, 100)));
}

#[test]
fn midpoint_circle_is_symmetric() {
    let h = Harness::new();
    let c = h.compositor();
    let bitmap = c.new_bitmap(Size::new(201, 201), PixelFormat::Rgba32).unwrap();
    bitmap.circle_outline(Point::new(100, 100), 50, RED).unwrap();

    let rows = bitmap.read_rows(0, 201).unwrap();
    let stride = bitmap.stride() as usize;
    let set = |x: usize, y: usize| rows[y * stride + x * 4..][..4] == [0xff, 0, 0, 0xff];
    let row_count = |y: usize| (0..201).filter(|&x| set(x, y)).count();
    let col_count = |x: usize| (0..201).filter(|&y| set(x, y)).count();
    for i in 0..=200 {
        assert_eq!(row_count(i), row_count(200 - i));
        assert_eq!(col_count(i), col_count(200 - i));
    }
    assert!(set(150, 100));
    assert!(set(100, 50));
    assert!(!set(100, 100));
    assert_eq!(bitmap.dirty_rect(), Some(Rect::new(50, 50, 101, 101)));
}

#[test]
fn bitmap_swap_under_live_element() {
    let h = Harness::new();
    let c = h.compositor();
    let display = c.display();
    let b1 = c.new_bitmap(Size::new(4, 4), PixelFormat::Rgba32).unwrap();
    let b2 = c.new_bitmap(Size::new(2, 2), PixelFormat::Rgba32).unwrap();
    b1.clear_to(RED).unwrap();
    b2.clear_to(Rgba16::WHITE).unwrap();

    let id = c
        .update(0, |c| {
            c.add_element(Rect::new(8, 8, 4, 4), &b1, 0, 1.0, AlphaSource::FromSource)
        })
        .unwrap();
    let (r1, r2) = (b1.retain_count(), b2.retain_count());
    assert_eq!(h.gpu.pixel_at(display.handle, Point::new(8, 8)), Some([0xff, 0, 0, 0xff]));

    c.update(0, |c| c.set_element_bitmap(id, &b2)).unwrap();

    assert_eq!(b1.retain_count(), r1 - 1);
    assert_eq!(b2.retain_count(), r2 + 1);
    let info = c.element(id).unwrap();
    assert_eq!(info.resource, b2.resource());
    assert_eq!(info.dest, Rect::new(8, 8, 4, 4));
    let attrs = h.gpu.element_attrs(info.handle).unwrap();
    assert_eq!(attrs.source, b2.resource());
    assert_eq!(attrs.src, Rect::new(0, 0, 2, 2));
    assert_eq!(h.gpu.pixel_at(display.handle, Point::new(11, 11)), Some([0xff; 4]));

    drop(c);
    let stats = h.gpu.stats();
    assert_eq!(stats.live_resources, 0);
    assert_eq!(stats.live_elements, 0);
}

#[test]
fn teardown_removes_everything_in_one_update() {
    let h = Harness::new();
    let c = h.compositor();
    let display = c.display();
    let bitmaps: Vec<_> = (1..=3)
        .map(|n| c.new_bitmap(Size::new(n, n), PixelFormat::Rgba32).unwrap())
        .collect();
    c.update(0, |c| {
        for (i, bitmap) in bitmaps.iter().enumerate() {
            let x = i32::try_from(i).unwrap() * 4;
            c.add_element(Rect::new(x, 0, 0, 0), bitmap, 0, 1.0, AlphaSource::FromSource)?;
        }
        Ok(())
    })
    .unwrap();
    let before = h.gpu.stats();

    c.close().unwrap();

    let after = h.gpu.stats();
    assert_eq!(after.updates_started - before.updates_started, 1);
    assert_eq!(after.updates_submitted - before.updates_submitted, 1);
    assert_eq!(after.updates_failed, 0);
    assert_eq!(after.elements_removed - before.elements_removed, 3);
    assert_eq!(after.resources_deleted - before.resources_deleted, 3);
    assert_eq!(after.live_resources, 0);
    assert!(bitmaps.iter().all(|b| b.is_closed() && b.is_freed()));
    h.host.close_display(display).unwrap();
}

#[test]
fn layers_and_transforms_reach_the_scan_out() {
    let h = Harness::new();
    let c = h.compositor();
    let display = c.display();
    let back = c.new_bitmap(Size::new(4, 4), PixelFormat::Rgb888).unwrap();
    let front = c.new_bitmap(Size::new(2, 1), PixelFormat::Rgba32).unwrap();
    back.clear_to(Rgba16::WHITE).unwrap();
    front.set_pixel(Point::ZERO, RED).unwrap();

    let (_, top) = c
        .update(0, |c| {
            let a = c.add_element(Rect::new(0, 0, 4, 4), &back, 1, 1.0, AlphaSource::FromSource)?;
            let b = c.add_element(Rect::new(0, 0, 0, 0), &front, 2, 1.0, AlphaSource::FromSource)?;
            Ok((a, b))
        })
        .unwrap();
    // The second pixel of `front` is transparent and lets `back` through.
    assert_eq!(h.gpu.pixel_at(display.handle, Point::ZERO), Some([0xff, 0, 0, 0xff]));
    assert_eq!(h.gpu.pixel_at(display.handle, Point::new(1, 0)), Some([0xff; 4]));

    c.update(0, |c| {
        c.set_element_size(top, Size::new(1, 2))?;
        c.set_element_transform(top, Transform::Rotate90)
    })
    .unwrap();
    assert_eq!(c.element(top).unwrap().transform, Transform::Rotate90);
    assert_eq!(h.gpu.pixel_at(display.handle, Point::ZERO), Some([0xff, 0, 0, 0xff]));
    assert_eq!(h.gpu.pixel_at(display.handle, Point::new(0, 1)), Some([0xff; 4]));

    c.update(0, |c| c.set_element_layer(top, 0)).unwrap();
    assert_eq!(h.gpu.pixel_at(display.handle, Point::ZERO), Some([0xff; 4]));
}

#[test]
fn fixed_alpha_blends_with_the_background() {
    let h = Harness::new();
    let c = h.compositor();
    let display = c.display();
    let bitmap = c.new_bitmap(Size::new(2, 2), PixelFormat::Rgb565).unwrap();
    bitmap.clear_to(Rgba16::WHITE).unwrap();

    let id = c
        .update(0, |c| {
            c.add_element(Rect::new(0, 0, 0, 0), &bitmap, 0, 1.0, AlphaSource::FixedAllPixels)
        })
        .unwrap();
    assert_eq!(h.gpu.pixel_at(display.handle, Point::ZERO), Some([0xff; 4]));

    c.update(0, |c| c.set_element_opacity(id, 0.0)).unwrap();
    assert_eq!(c.element(id).unwrap().opacity, 0.0);
    assert_eq!(h.gpu.pixel_at(display.handle, Point::ZERO), Some([0, 0, 0, 0xff]));

    c.update(0, |c| c.set_element_origin(id, Point::new(10, 10)))
        .unwrap();
    c.update(0, |c| c.set_element_opacity(id, 1.0)).unwrap();
    assert_eq!(h.gpu.pixel_at(display.handle, Point::ZERO), Some([0, 0, 0, 0xff]));
    assert_eq!(h.gpu.pixel_at(display.handle, Point::new(11, 11)), Some([0xff; 4]));
}
