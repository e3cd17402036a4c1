// SPDX-License-Identifier: MIT
//
// Geometry: points, sizes and rects in terminal cell units.
//
// Positions are signed: a drawable may sit partly left of or above its
// container in permissive mode, and its visible part is whatever survives
// clipping. Sizes are unsigned, so a negative width can only arrive through
// the checked constructors, which reject it.
//
// `Rect::intersection` returns `None` for disjoint (or merely touching)
// rects instead of an empty rect. Callers treat `None` as "nothing to draw"
// and never have to wonder whether a zero-area rect is meaningful.
//
// Edge arithmetic saturates at the i32 range rather than wrapping, so
// pathological coordinates degrade to clipped-away rects instead of panics.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use crate::error::{Error, Result};

// ─── Point ──────────────────────────────────────────────────────────────────

/// A cell position. Ordered row-major: `(y, x)` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// This point shifted by `(dx, dy)`.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        self.y.cmp(&other.y).then(self.x.cmp(&other.x))
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.offset(rhs.x, rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x.saturating_sub(rhs.x),
            y: self.y.saturating_sub(rhs.y),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ─── Size ───────────────────────────────────────────────────────────────────

/// Width and height in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

impl Size {
    pub const ZERO: Self = Self {
        width: 0,
        height: 0,
    };

    #[inline]
    #[must_use]
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Build a size from signed dimensions.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidGeometry`] if either dimension is negative or does
    /// not fit in a `u16`.
    pub fn checked(width: i32, height: i32) -> Result<Self> {
        match (u16::try_from(width), u16::try_from(height)) {
            (Ok(width), Ok(height)) => Ok(Self { width, height }),
            _ => Err(Error::InvalidGeometry(format!("size {width}x{height}"))),
        }
    }

    /// Total number of cells.
    #[inline]
    #[must_use]
    pub const fn area(self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<n_term::terminal::Size> for Size {
    fn from(size: n_term::terminal::Size) -> Self {
        Self::new(size.cols, size.rows)
    }
}

// ─── Rect ───────────────────────────────────────────────────────────────────

/// An origin plus a size. `max_x` / `max_y` are exclusive.
///
/// # Examples
///
/// ```
/// use n_comp::geometry::Rect;
///
/// let a = Rect::new(0, 0, 4, 2);
/// let b = Rect::new(1, 0, 2, 2);
/// assert_eq!(a.intersection(b), Some(b));
/// assert_eq!(a.intersection(Rect::new(4, 0, 1, 1)), None); // touching
/// assert_eq!(a.union(Rect::new(5, 5, 1, 1)), Rect::new(0, 0, 6, 6));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u16, height: u16) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// A rect at the origin covering `size`.
    #[inline]
    #[must_use]
    pub const fn from_size(size: Size) -> Self {
        Self {
            origin: Point::ORIGIN,
            size,
        }
    }

    /// Build a rect from signed dimensions.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidGeometry`] if either dimension is negative or does
    /// not fit in a `u16`.
    pub fn checked(x: i32, y: i32, width: i32, height: i32) -> Result<Self> {
        Ok(Self {
            origin: Point::new(x, y),
            size: Size::checked(width, height)?,
        })
    }

    #[inline]
    #[must_use]
    pub const fn width(self) -> u16 {
        self.size.width
    }

    #[inline]
    #[must_use]
    pub const fn height(self) -> u16 {
        self.size.height
    }

    #[inline]
    #[must_use]
    pub const fn min_x(self) -> i32 {
        self.origin.x
    }

    #[inline]
    #[must_use]
    pub const fn min_y(self) -> i32 {
        self.origin.y
    }

    /// Right edge (exclusive).
    #[inline]
    #[must_use]
    pub const fn max_x(self) -> i32 {
        self.origin.x.saturating_add(self.size.width as i32)
    }

    /// Bottom edge (exclusive).
    #[inline]
    #[must_use]
    pub const fn max_y(self) -> i32 {
        self.origin.y.saturating_add(self.size.height as i32)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.size.is_empty()
    }

    /// The same size, moved to the origin.
    #[inline]
    #[must_use]
    pub const fn zero_origin(self) -> Self {
        Self::from_size(self.size)
    }

    #[inline]
    #[must_use]
    pub const fn contains_point(self, p: Point) -> bool {
        p.x >= self.min_x() && p.x < self.max_x() && p.y >= self.min_y() && p.y < self.max_y()
    }

    /// Whether `other` lies entirely inside this rect. Empty rects are
    /// contained when their origin lies within the closed bounds.
    #[inline]
    #[must_use]
    pub const fn contains_rect(self, other: Self) -> bool {
        other.min_x() >= self.min_x()
            && other.min_y() >= self.min_y()
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Whether the two rects share at least one cell.
    #[inline]
    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.intersection(other).is_some()
    }

    /// The overlapping region, or `None` if the rects share no cell.
    #[must_use]
    pub fn intersection(self, other: Self) -> Option<Self> {
        let x1 = self.min_x().max(other.min_x());
        let y1 = self.min_y().max(other.min_y());
        let x2 = self.max_x().min(other.max_x());
        let y2 = self.max_y().min(other.max_y());

        if x2 > x1 && y2 > y1 {
            // Both spans are bounded by an input's u16 dimension.
            Some(Self::new(x1, y1, span(x1, x2), span(y1, y2)))
        } else {
            None
        }
    }

    /// The smallest rect covering both. An empty rect contributes nothing,
    /// and the union of two empty rects is `Rect::default()`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        if self.is_empty() {
            return if other.is_empty() { Self::default() } else { other };
        }
        if other.is_empty() {
            return self;
        }
        let x1 = self.min_x().min(other.min_x());
        let y1 = self.min_y().min(other.min_y());
        let x2 = self.max_x().max(other.max_x());
        let y2 = self.max_y().max(other.max_y());
        Self::new(x1, y1, span(x1, x2), span(y1, y2))
    }

    /// This rect moved by `by`.
    #[inline]
    #[must_use]
    pub const fn translate(self, by: Point) -> Self {
        Self {
            origin: self.origin.offset(by.x, by.y),
            size: self.size,
        }
    }

    /// Every position in the rect, row-major.
    pub fn positions(self) -> impl Iterator<Item = Point> {
        (self.min_y()..self.max_y())
            .flat_map(move |y| (self.min_x()..self.max_x()).map(move |x| Point::new(x, y)))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.size, self.origin)
    }
}

/// `hi - lo` clamped into `u16`.
fn span(lo: i32, hi: i32) -> u16 {
    let diff = i64::from(hi) - i64::from(lo);
    u16::try_from(diff.max(0)).unwrap_or(u16::MAX)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
