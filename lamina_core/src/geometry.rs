// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer geometry in display pixel space.
//!
//! The origin is at the top-left corner of the display; x grows to the right
//! and y grows downward. Bitmaps and elements share this convention.
//!
//! Rectangles are half-open: a [`Rect`] covers the pixels
//! `origin.x .. origin.x + width` by `origin.y .. origin.y + height`. An empty
//! region is represented by `None` rather than by a zero-size `Rect`; the
//! operations that can produce an empty result return `Option<Rect>`.

use core::fmt;

/// A pixel position.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    /// Horizontal position, growing rightward.
    pub x: i32,
    /// Vertical position, growing downward.
    pub y: i32,
}

impl Point {
    /// The origin `(0, 0)`.
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Creates a point.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A pixel extent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Creates a size.
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered (`width * height`).
    #[inline]
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Debug for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An axis-aligned pixel rectangle: an origin plus a size.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Top-left corner.
    pub origin: Point,
    /// Extent.
    pub size: Size,
}

impl Rect {
    /// Creates a rectangle from its top-left corner and extent.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// Creates a rectangle at the origin with the given size.
    #[inline]
    #[must_use]
    pub const fn from_size(size: Size) -> Self {
        Self {
            origin: Point::ZERO,
            size,
        }
    }

    /// Creates the smallest rectangle containing both pixels `a` and `b`.
    ///
    /// Both corner pixels are inside the result, so `from_points(p, p)` is the
    /// 1x1 rectangle at `p`.
    #[must_use]
    pub fn from_points(a: Point, b: Point) -> Self {
        let x0 = a.x.min(b.x);
        let y0 = a.y.min(b.y);
        let x1 = i64::from(a.x.max(b.x)) + 1;
        let y1 = i64::from(a.y.max(b.y)) + 1;
        Self::from_edges(i64::from(x0), i64::from(y0), x1, y1)
            .unwrap_or(Self::new(x0, y0, 1, 1))
    }

    /// Left edge (inclusive).
    #[inline]
    #[must_use]
    pub const fn min_x(&self) -> i64 {
        self.origin.x as i64
    }

    /// Top edge (inclusive).
    #[inline]
    #[must_use]
    pub const fn min_y(&self) -> i64 {
        self.origin.y as i64
    }

    /// Right edge (exclusive).
    #[inline]
    #[must_use]
    pub const fn max_x(&self) -> i64 {
        self.origin.x as i64 + self.size.width as i64
    }

    /// Bottom edge (exclusive).
    #[inline]
    #[must_use]
    pub const fn max_y(&self) -> i64 {
        self.origin.y as i64 + self.size.height as i64
    }

    /// Returns `true` if the rectangle covers no pixels.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    /// Returns `true` if pixel `p` lies inside the rectangle.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        let x = i64::from(p.x);
        let y = i64::from(p.y);
        x >= self.min_x() && x < self.max_x() && y >= self.min_y() && y < self.max_y()
    }

    /// Returns `true` if `other` lies entirely inside this rectangle.
    #[must_use]
    pub fn contains_rect(&self, other: &Self) -> bool {
        other.min_x() >= self.min_x()
            && other.min_y() >= self.min_y()
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Returns the bounding box of both rectangles.
    ///
    /// An empty operand is ignored, so the union with an empty rectangle is
    /// the other rectangle.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::from_edges(
            self.min_x().min(other.min_x()),
            self.min_y().min(other.min_y()),
            self.max_x().max(other.max_x()),
            self.max_y().max(other.max_y()),
        )
        .unwrap_or(*self)
    }

    /// Returns the overlapping region, or `None` if the rectangles are
    /// disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        Self::from_edges(
            self.min_x().max(other.min_x()),
            self.min_y().max(other.min_y()),
            self.max_x().min(other.max_x()),
            self.max_y().min(other.max_y()),
        )
    }

    /// Returns the same rectangle moved to `origin`.
    #[inline]
    #[must_use]
    pub const fn with_origin(self, origin: Point) -> Self {
        Self {
            origin,
            size: self.size,
        }
    }

    /// Returns the same rectangle resized to `size`.
    #[inline]
    #[must_use]
    pub const fn with_size(self, size: Size) -> Self {
        Self {
            origin: self.origin,
            size,
        }
    }

    /// Builds a rectangle from half-open edges, returning `None` when the
    /// result would be empty or does not fit the integer ranges.
    #[must_use]
    pub fn from_edges(x0: i64, y0: i64, x1: i64, y1: i64) -> Option<Self> {
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            origin: Point::new(i32::try_from(x0).ok()?, i32::try_from(y0).ok()?),
            size: Size::new(u32::try_from(x1 - x0).ok()?, u32::try_from(y1 - y0).ok()?),
        })
    }
}

/// Accumulates `rect` into an optional running union.
///
/// `None` is the identity, matching the "empty rect is absent" convention.
/// Empty inputs leave the accumulator unchanged.
#[must_use]
pub fn union_opt(acc: Option<Rect>, rect: Rect) -> Option<Rect> {
    if rect.is_empty() {
        return acc;
    }
    Some(match acc {
        Some(r) => r.union(&rect),
        None => rect,
    })
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rect({:?} {:?})", self.origin, self.size)
    }
}

impl From<Rect> for kurbo::Rect {
    fn from(r: Rect) -> Self {
        Self::new(
            r.min_x() as f64,
            r.min_y() as f64,
            r.max_x() as f64,
            r.max_y() as f64,
        )
    }
}
