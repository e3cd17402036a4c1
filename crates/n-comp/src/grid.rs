// SPDX-License-Identifier: MIT
//
// Grid: a dense, row-major rectangle of cells.
//
// Drawables render into grids, the compositor's back and front buffers are
// grids, and `blit` is how content moves between them. Every in-bounds
// address always holds a cell.
//
// Wide-character integrity is the one invariant everything here protects:
// a double-width cell is always immediately followed by its continuation,
// and a continuation is always immediately preceded by its owner. Any write
// that would break a pair blanks the surviving half instead, whether the
// write is a single `set`, a `fill_rect`, or a `blit` whose clipped edge
// cuts through a pair in the source or in the destination.
//
// Addressing: single-cell accessors take buffer-local `u16` coordinates and
// return `None` / `false` out of bounds. Rect operations take signed rects
// and clip them, so callers can hand over partially off-grid regions.

use std::fmt;

use crate::cell::Cell;
use crate::geometry::{Point, Rect, Size};

/// A width × height rectangle of cells.
///
/// # Examples
///
/// ```
/// use n_comp::cell::Cell;
/// use n_comp::geometry::{Rect, Size};
/// use n_comp::grid::Grid;
///
/// let mut grid = Grid::new(Size::new(4, 1));
/// grid.fill_rect(Rect::new(1, 0, 2, 1), &Cell::from_char('#'));
/// assert_eq!(grid.to_lines(), vec![" ## "]);
///
/// grid.set(2, 0, Cell::from_char('中'));
/// assert_eq!(grid.to_lines(), vec![" #中"]);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Grid {
    size: Size,
    cells: Vec<Cell>,
}

impl Grid {
    // ─── Construction ───────────────────────────────────────────────────

    /// A grid of blank cells.
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self {
            size,
            cells: vec![Cell::blank(); size.area()],
        }
    }

    /// A grid covered by `cell`. A double-width filler is laid out in
    /// pairs; an odd trailing column is blank.
    #[must_use]
    pub fn filled(size: Size, cell: &Cell) -> Self {
        if cell.width() == 1 {
            return Self {
                size,
                cells: vec![cell.clone(); size.area()],
            };
        }
        let mut grid = Self::new(size);
        grid.fill_rect(grid.bounds(), cell);
        grid
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub const fn size(&self) -> Size {
        self.size
    }

    #[inline]
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.size.width
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.size.height
    }

    /// The grid's own zero-origin rect.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> Rect {
        Rect::from_size(self.size)
    }

    #[inline]
    #[must_use]
    pub const fn in_bounds(&self, x: u16, y: u16) -> bool {
        x < self.size.width && y < self.size.height
    }

    #[inline]
    const fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.size.width as usize + x as usize
    }

    /// The cell at `(x, y)`, or `None` out of bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, x: u16, y: u16) -> Option<&Cell> {
        if self.in_bounds(x, y) {
            Some(&self.cells[self.index(x, y)])
        } else {
            None
        }
    }

    /// Row `y` as a slice.
    #[inline]
    #[must_use]
    pub fn row(&self, y: u16) -> Option<&[Cell]> {
        if y < self.size.height {
            let start = self.index(0, y);
            Some(&self.cells[start..start + usize::from(self.size.width)])
        } else {
            None
        }
    }

    /// Every cell with its `(x, y)`, row-major.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16, &Cell)> {
        let w = usize::from(self.size.width).max(1);
        self.cells.iter().enumerate().map(move |(i, cell)| {
            // x < width and y < height, both u16.
            ((i % w) as u16, (i / w) as u16, cell)
        })
    }

    /// Rows rendered as strings, continuations skipped. For tests and logs.
    #[must_use]
    pub fn to_lines(&self) -> Vec<String> {
        (0..self.size.height)
            .filter_map(|y| self.row(y))
            .map(|row| row.iter().map(Cell::glyph).collect())
            .collect()
    }

    // ─── Writes ─────────────────────────────────────────────────────────

    /// Write one cell, keeping double-width pairs intact.
    ///
    /// - Overwriting either half of a pair blanks the other half.
    /// - A double-width cell also writes its continuation to `x + 1`.
    /// - A double-width cell in the last column is stored as a blank.
    ///
    /// Returns `false` if `(x, y)` is out of bounds.
    pub fn set(&mut self, x: u16, y: u16, cell: Cell) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        self.break_pair_at(x, y);
        let idx = self.index(x, y);

        if cell.is_continuation() {
            self.cells[idx] = Cell::blank();
        } else if cell.is_wide() {
            if x + 1 >= self.size.width {
                self.cells[idx] = Cell::blank();
            } else {
                self.break_pair_at(x + 1, y);
                self.cells[idx + 1] = cell.continuation();
                self.cells[idx] = cell;
            }
        } else {
            self.cells[idx] = cell;
        }
        true
    }

    /// Blank whichever partner `(x, y)` has.
    fn break_pair_at(&mut self, x: u16, y: u16) {
        let idx = self.index(x, y);
        if self.cells[idx].is_continuation() {
            if x > 0 {
                self.cells[idx - 1] = Cell::blank();
            }
        } else if self.cells[idx].is_wide() && x + 1 < self.size.width {
            self.cells[idx + 1] = Cell::blank();
        }
    }

    /// Cover `rect` (clipped to the grid) with `cell`. A double-width cell
    /// whose second column would fall outside `rect` becomes a blank.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn fill_rect(&mut self, rect: Rect, cell: &Cell) {
        let Some(clip) = rect.intersection(self.bounds()) else {
            return;
        };
        let step = i32::from(cell.width().max(1));
        for y in clip.min_y()..clip.max_y() {
            let mut x = clip.min_x();
            while x < clip.max_x() {
                // Clipped to the grid, so both fit in u16.
                if x + step > clip.max_x() {
                    self.set(x as u16, y as u16, Cell::blank());
                } else {
                    self.set(x as u16, y as u16, cell.clone());
                }
                x += step;
            }
        }
    }

    /// Blank every cell in `rect`.
    pub fn clear_rect(&mut self, rect: Rect) {
        self.fill_rect(rect, &Cell::blank());
    }

    /// Overwrite with `other`, reusing the allocation when sizes match.
    pub fn copy_from(&mut self, other: &Self) {
        if self.size == other.size {
            self.cells.clone_from_slice(&other.cells);
        } else {
            self.clone_from(other);
        }
    }

    // ─── Resize, Crop, Blit ─────────────────────────────────────────────

    /// Change dimensions, keeping the overlapping region at its original
    /// coordinates and covering new area with `filler`. A double-width cell
    /// whose trailing half is cut off becomes a blank.
    pub fn resize(&mut self, size: Size, filler: &Cell) {
        if size == self.size {
            return;
        }
        let mut next = Self::filled(size, filler);
        Self::blit(Point::ORIGIN, &mut next, self.bounds(), self);
        *self = next;
    }

    /// A grid of `rect.size` holding this grid's content under `rect`.
    /// Parts of `rect` outside this grid are blank.
    #[must_use]
    pub fn crop(&self, rect: Rect) -> Self {
        let mut out = Self::new(rect.size);
        Self::blit(Point::ORIGIN, &mut out, rect, self);
        out
    }

    /// Copy `src_rect` of `src` into `dst` so that `src_rect.origin` lands
    /// on `dst_offset`.
    ///
    /// The region is clipped to both grids. Where the clipped edge splits a
    /// double-width pair in `src`, the surviving half arrives as a blank;
    /// where writes split a pair already in `dst`, `set` blanks the partner.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn blit(dst_offset: Point, dst: &mut Self, src_rect: Rect, src: &Self) {
        let Some(from) = src_rect.intersection(src.bounds()) else {
            return;
        };
        // Where `from` lands in dst, then clip that to dst and map back.
        let shift = dst_offset - src_rect.origin;
        let Some(to) = from.translate(shift).intersection(dst.bounds()) else {
            return;
        };
        let from = to.translate(Point::ORIGIN - shift);

        for row in 0..i32::from(to.height()) {
            let (sy, dy) = ((from.min_y() + row) as u16, (to.min_y() + row) as u16);
            for col in 0..i32::from(to.width()) {
                let (sx, dx) = ((from.min_x() + col) as u16, (to.min_x() + col) as u16);
                let Some(cell) = src.get(sx, sy) else {
                    continue;
                };
                let first = col == 0;
                let last = col + 1 == i32::from(to.width());

                if cell.is_continuation() {
                    // Written together with its owner, unless the owner was cut.
                    if first {
                        dst.set(dx, dy, Cell::blank());
                    }
                } else if cell.is_wide() && last {
                    dst.set(dx, dy, Cell::blank());
                } else {
                    dst.set(dx, dy, cell.clone());
                }
            }
        }
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid({})", self.size)?;
        for line in self.to_lines() {
            write!(f, "\n  |{line}|")?;
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
