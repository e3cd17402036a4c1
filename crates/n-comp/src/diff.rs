// SPDX-License-Identifier: MIT
//
// Differential output: turning two frames into the fewest terminal writes.
//
// The compositor keeps the frame it last wrote (front) and the frame it
// wants (back). `changes` compares them cell by cell over the whole
// terminal and collects every differing position into a row-major map.
// `flush` replays that map through a sink while tracking the pen and the
// cursor, so it only moves when the next cell is not where the previous
// write left the cursor, and only emits color and style changes.
//
// Wide characters:
//
//   - A double-width back cell consumes its trailing column; the
//     continuation itself is never written.
//   - A double-width front cell replaced by a narrow back cell leaves its
//     trailing column orphaned on screen, so that column is scheduled as
//     an explicit write of whatever the back buffer holds there.
//
// Every flush starts from a reset pen, so what the terminal had before the
// frame never matters.

use std::collections::BTreeMap;
use std::io;

use n_term::{Attr, CellColor};

use crate::cell::Cell;
use crate::geometry::Point;
use crate::grid::Grid;
use crate::sink::TerminalSink;

/// Positions to write and what to write there, row-major.
pub type Changes = BTreeMap<Point, Cell>;

// ─── Diff ───────────────────────────────────────────────────────────────────

/// Every position where `back` differs from `front`. Both grids must be
/// the same size; a mismatch is treated as a full repaint.
#[must_use]
pub fn changes(back: &Grid, front: &Grid) -> Changes {
    if back.size() != front.size() {
        return all_cells(back);
    }
    let mut out = Changes::new();
    for y in 0..back.height() {
        let (Some(back_row), Some(front_row)) = (back.row(y), front.row(y)) else {
            continue;
        };
        if back_row == front_row {
            continue;
        }
        let width = back_row.len();
        let mut x = 0;
        while x < width {
            let cell = &back_row[x];
            if cell.is_continuation() {
                x += 1;
                continue;
            }
            if *cell != front_row[x] {
                out.insert(point(x, y), cell.clone());
            }
            if cell.is_wide() {
                x += 2;
                continue;
            }
            if front_row[x].is_wide() && x + 1 < width {
                out.insert(point(x + 1, y), back_row[x + 1].clone());
            }
            x += 1;
        }
    }
    out
}

/// Every writable cell of `grid`, for a repaint with no usable front.
#[must_use]
pub fn all_cells(grid: &Grid) -> Changes {
    grid.iter()
        .filter(|(_, _, cell)| !cell.is_continuation())
        .map(|(x, y, cell)| (Point::new(i32::from(x), i32::from(y)), cell.clone()))
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn point(x: usize, y: u16) -> Point {
    // x indexes a row of at most u16::MAX cells.
    Point::new(x as i32, y as i32)
}

// ─── Flush ──────────────────────────────────────────────────────────────────

/// What the terminal's cursor is known to be doing. `None` means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorState {
    pub at: Option<Point>,
    pub visible: Option<bool>,
}

impl CursorState {
    /// Forget everything, forcing the next update to be written.
    pub const fn invalidate(&mut self) {
        self.at = None;
        self.visible = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Pen {
    fg: CellColor,
    bg: CellColor,
    attrs: Attr,
}

/// Counts from one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushStats {
    pub cells_written: usize,
    pub cursor_moves: usize,
}

/// Write `changes` through `sink` in row-major order.
///
/// Hides the cursor, then seeds the pen with a reset at the first
/// position. Afterwards `cursor` holds where the terminal cursor ended up.
///
/// # Errors
///
/// The first I/O error from the sink. Nothing is retried.
pub fn flush(
    changes: &Changes,
    sink: &mut dyn TerminalSink,
    cursor: &mut CursorState,
) -> io::Result<FlushStats> {
    let mut stats = FlushStats::default();
    let Some((&first, _)) = changes.first_key_value() else {
        return Ok(stats);
    };

    if cursor.visible != Some(false) {
        sink.set_cursor_visible(false)?;
        cursor.visible = Some(false);
    }
    sink.set_cursor_position(first)?;
    stats.cursor_moves += 1;
    sink.reset_attributes()?;
    let mut pen = Pen::default();
    let mut at = first;

    for (&pos, cell) in changes {
        if pos != at {
            sink.set_cursor_position(pos)?;
            stats.cursor_moves += 1;
        }
        apply_pen(sink, &mut pen, cell)?;
        sink.write_glyph(cell.glyph())?;
        stats.cells_written += 1;
        at = pos.offset(i32::from(cell.width()), 0);
    }

    cursor.at = Some(at);
    Ok(stats)
}

/// Emit only the pen differences between `pen` and `cell`.
fn apply_pen(sink: &mut dyn TerminalSink, pen: &mut Pen, cell: &Cell) -> io::Result<()> {
    if cell.fg() != pen.fg {
        sink.set_foreground(cell.fg())?;
        pen.fg = cell.fg();
    }
    if cell.bg() != pen.bg {
        sink.set_background(cell.bg())?;
        pen.bg = cell.bg();
    }
    if cell.attrs() != pen.attrs {
        for flag in pen.attrs.difference(cell.attrs()).iter() {
            sink.disable_style(flag)?;
        }
        for flag in cell.attrs().difference(pen.attrs).iter() {
            sink.enable_style(flag)?;
        }
        pen.attrs = cell.attrs();
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────────────
