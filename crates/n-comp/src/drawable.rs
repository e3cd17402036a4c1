// SPDX-License-Identifier: MIT
//
// Drawables: the content side of the compositor.
//
// A drawable is anything that can produce a grid of a requested size. The
// compositor owns placement (rect, parent, z-order, focus) in its tree and
// only ever asks a drawable for pixels and cursor preferences. Drawables
// are shared as `Arc<dyn Drawable>` because their owner (a plugin, a shell
// session) keeps writing into them from its own thread while the
// compositor renders from another.
//
// Identity is a `DrawableId`: an opaque, copyable token handed out by the
// compositor. It carries no reference to the drawable itself; only the
// compositor can map it back.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::{Mutex, MutexGuard, PoisonError};

use unicode_segmentation::UnicodeSegmentation;

use crate::cell::Cell;
use crate::geometry::{Point, Rect, Size};
use crate::grid::Grid;

// ─── DrawableId ─────────────────────────────────────────────────────────────

/// Opaque handle to a node in a compositor's tree. Never reused within a
/// compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(NonZeroU64);

impl DrawableId {
    pub(crate) const fn from_raw(raw: NonZeroU64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for DrawableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─── Drawable ───────────────────────────────────────────────────────────────

/// How the hardware cursor behaves while a drawable holds focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorMode {
    /// No cursor.
    #[default]
    Hidden,
    /// The drawable paints its own cursor into its grid.
    AppManaged,
    /// The terminal's cursor is shown at the drawable's resting point.
    TerminalRendered,
}

/// Content contract between the compositor and whatever fills a region.
///
/// Callbacks run on the rendering thread with no compositor lock held
/// except the render lock, so a drawable may call back into the
/// compositor (attach, move, focus) from inside `render_grid`.
pub trait Drawable: Send + Sync {
    /// Produce the drawable's content. The grid must be exactly `size`;
    /// anything else detaches the drawable.
    fn render_grid(&self, size: Size) -> Grid;

    /// Where the hardware cursor rests, relative to the drawable.
    fn cursor_resting_point(&self) -> Point {
        Point::ORIGIN
    }

    fn cursor_mode(&self) -> CursorMode {
        CursorMode::Hidden
    }

    /// Whether attaching with focus-on-attach may focus this drawable.
    fn is_focusable(&self) -> bool {
        true
    }

    /// Called before the drawable's rect changes size, before anything is
    /// repainted.
    fn will_resize(&self, _old: Size, _new: Size) {}
}

// ─── Solid ──────────────────────────────────────────────────────────────────

/// A single cell repeated over the whole rect. Not focusable.
#[derive(Debug, Clone)]
pub struct Solid {
    cell: Cell,
}

impl Solid {
    #[must_use]
    pub const fn new(cell: Cell) -> Self {
        Self { cell }
    }
}

impl Drawable for Solid {
    fn render_grid(&self, size: Size) -> Grid {
        Grid::filled(size, &self.cell)
    }

    fn is_focusable(&self) -> bool {
        false
    }
}

// ─── Canvas ─────────────────────────────────────────────────────────────────

struct CanvasState {
    grid: Grid,
    filler: Cell,
    cursor: Point,
    cursor_mode: CursorMode,
}

/// A drawable backed by its own grid.
///
/// Writers draw into the canvas from any thread; the compositor reads a
/// copy at render time. Resizing the rect resizes the buffer first
/// (through `will_resize`), keeping what fits.
///
/// # Examples
///
/// ```
/// use n_comp::cell::Cell;
/// use n_comp::drawable::{Canvas, Drawable};
/// use n_comp::geometry::Size;
///
/// let canvas = Canvas::new(Size::new(6, 1));
/// canvas.print(1, 0, "hi 中", &Cell::blank());
/// assert_eq!(canvas.render_grid(Size::new(6, 1)).to_lines(), vec![" hi 中"]);
/// ```
pub struct Canvas {
    state: Mutex<CanvasState>,
    focusable: bool,
}

impl Canvas {
    /// A blank canvas.
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self::filled(size, Cell::blank())
    }

    /// A canvas covered with `filler`, which also fills any area gained
    /// by growing.
    #[must_use]
    pub fn filled(size: Size, filler: Cell) -> Self {
        Self {
            state: Mutex::new(CanvasState {
                grid: Grid::filled(size, &filler),
                filler,
                cursor: Point::ORIGIN,
                cursor_mode: CursorMode::Hidden,
            }),
            focusable: true,
        }
    }

    #[must_use]
    pub fn with_focusable(mut self, focusable: bool) -> Self {
        self.focusable = focusable;
        self
    }

    fn state(&self) -> MutexGuard<'_, CanvasState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the backing grid.
    pub fn draw<R>(&self, f: impl FnOnce(&mut Grid) -> R) -> R {
        f(&mut self.state().grid)
    }

    /// Write `text` starting at `(x, y)`, one grapheme per cell, taking
    /// colors and attributes from `template`. Graphemes that are not valid
    /// cells (controls) are skipped. Returns the column after the last
    /// written cell.
    pub fn print(&self, x: u16, y: u16, text: &str, template: &Cell) -> u16 {
        let mut state = self.state();
        let mut col = x;
        for grapheme in text.graphemes(true) {
            let Ok(cell) = Cell::new(grapheme) else {
                continue;
            };
            let cell = cell
                .with_fg(template.fg())
                .with_bg(template.bg())
                .with_attrs(template.attrs());
            let width = u16::from(cell.width());
            if !state.grid.set(col, y, cell) {
                break;
            }
            col = col.saturating_add(width);
        }
        col
    }

    /// Blank the whole canvas with its filler.
    pub fn clear(&self) {
        let mut state = self.state();
        let filler = state.filler.clone();
        let bounds = state.grid.bounds();
        state.grid.fill_rect(bounds, &filler);
    }

    pub fn set_cursor(&self, at: Point, mode: CursorMode) {
        let mut state = self.state();
        state.cursor = at;
        state.cursor_mode = mode;
    }

    #[must_use]
    pub fn size(&self) -> Size {
        self.state().grid.size()
    }
}

impl Drawable for Canvas {
    fn render_grid(&self, size: Size) -> Grid {
        let state = self.state();
        if state.grid.size() == size {
            state.grid.clone()
        } else {
            state.grid.crop(Rect::from_size(size))
        }
    }

    fn cursor_resting_point(&self) -> Point {
        self.state().cursor
    }

    fn cursor_mode(&self) -> CursorMode {
        self.state().cursor_mode
    }

    fn is_focusable(&self) -> bool {
        self.focusable
    }

    fn will_resize(&self, _old: Size, new: Size) {
        let mut state = self.state();
        let filler = state.filler.clone();
        state.grid.resize(new, &filler);
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Canvas({})", self.size())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use n_term::CellColor;

    #[test]
    fn id_display() {
        let id = DrawableId::from_raw(NonZeroU64::new(7).unwrap());
        assert_eq!(id.to_string(), "#7");
    }

    #[test]
    fn solid_fills_requested_size() {
        let solid = Solid::new(Cell::from_char('A'));
        let grid = solid.render_grid(Size::new(3, 2));
        assert_eq!(grid.to_lines(), vec!["AAA", "AAA"]);
        assert!(!solid.is_focusable());
    }

    #[test]
    fn canvas_print_uses_template_colors() {
        let canvas = Canvas::new(Size::new(4, 1));
        let end = canvas.print(0, 0, "ab", &Cell::blank().with_fg(CellColor::GREEN));
        assert_eq!(end, 2);
        let grid = canvas.render_grid(Size::new(4, 1));
        assert_eq!(grid.get(1, 0).unwrap().fg(), CellColor::GREEN);
        assert_eq!(grid.to_lines(), vec!["ab  "]);
    }

    #[test]
    fn canvas_print_stops_at_edge() {
        let canvas = Canvas::new(Size::new(3, 1));
        canvas.print(1, 0, "xyz", &Cell::blank());
        assert_eq!(canvas.render_grid(Size::new(3, 1)).to_lines(), vec![" xy"]);
    }

    #[test]
    fn canvas_will_resize_preserves_content() {
        let canvas = Canvas::filled(Size::new(2, 1), Cell::from_char('.'));
        canvas.print(0, 0, "a", &Cell::blank());
        canvas.will_resize(Size::new(2, 1), Size::new(4, 2));
        assert_eq!(canvas.size(), Size::new(4, 2));
        assert_eq!(
            canvas.render_grid(Size::new(4, 2)).to_lines(),
            vec!["a...", "...."]
        );
    }

    #[test]
    fn canvas_render_grid_matches_request_without_resize() {
        let canvas = Canvas::new(Size::new(2, 2));
        assert_eq!(canvas.render_grid(Size::new(5, 1)).size(), Size::new(5, 1));
    }

    #[test]
    fn canvas_clear_restores_filler() {
        let canvas = Canvas::filled(Size::new(2, 1), Cell::from_char('-'));
        canvas.print(0, 0, "ok", &Cell::blank());
        canvas.clear();
        assert_eq!(canvas.render_grid(Size::new(2, 1)).to_lines(), vec!["--"]);
    }

    #[test]
    fn canvas_cursor_settings() {
        let canvas = Canvas::new(Size::new(2, 2));
        assert_eq!(canvas.cursor_mode(), CursorMode::Hidden);
        canvas.set_cursor(Point::new(1, 1), CursorMode::TerminalRendered);
        assert_eq!(canvas.cursor_resting_point(), Point::new(1, 1));
        assert_eq!(canvas.cursor_mode(), CursorMode::TerminalRendered);
        assert!(!Canvas::new(Size::ZERO).with_focusable(false).is_focusable());
    }
}
