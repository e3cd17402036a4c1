// SPDX-License-Identifier: MIT
//
// Terminal sinks: where a frame's writes end up.
//
// The compositor speaks to a terminal only through `TerminalSink`: move
// the cursor, change the pen, write a glyph. It never assumes an encoding.
// Two implementations ship here:
//
//   AnsiSink         → ANSI escapes over any `io::Write`, buffered so a
//                      whole frame leaves in one write
//   VirtualTerminal  → an in-memory screen that applies every call the way
//                      an ideal terminal would, and logs it
//
// Styles are enabled and disabled one flag at a time. On a real terminal
// some flags share their reset code (SGR 22 turns off both bold and dim),
// so `AnsiSink` remembers the pen and re-enables whatever a shared reset
// took down with it. Callers can treat every flag as independent.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use n_term::output::OutputBuffer;
use n_term::{Attr, CellColor, ansi};

use crate::cell::Cell;
use crate::geometry::{Point, Size};
use crate::grid::Grid;

// ─── TerminalSink ───────────────────────────────────────────────────────────

/// The terminal capabilities the compositor needs.
///
/// Coordinates are absolute and 0-based. The compositor only asks for
/// positions inside `size()`.
pub trait TerminalSink: Send {
    /// Current terminal size. Read at the start of every render pass.
    fn size(&self) -> Size;

    fn set_cursor_position(&mut self, at: Point) -> io::Result<()>;

    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()>;

    /// Back to default colors and no styles.
    fn reset_attributes(&mut self) -> io::Result<()>;

    fn set_foreground(&mut self, color: CellColor) -> io::Result<()>;

    fn set_background(&mut self, color: CellColor) -> io::Result<()>;

    /// Turn on a single style flag.
    fn enable_style(&mut self, flag: Attr) -> io::Result<()>;

    /// Turn off a single style flag, leaving every other flag as it was.
    fn disable_style(&mut self, flag: Attr) -> io::Result<()>;

    /// Write one grapheme cluster at the cursor and advance it by the
    /// glyph's width.
    fn write_glyph(&mut self, glyph: &str) -> io::Result<()>;

    /// Start of a frame's writes.
    fn begin_frame(&mut self, _synchronized: bool) -> io::Result<()> {
        Ok(())
    }

    /// End of a frame's writes.
    fn end_frame(&mut self, _synchronized: bool) -> io::Result<()> {
        Ok(())
    }

    /// Push everything written so far to the terminal.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// The session layer learned of a new size. Sinks that cannot query
    /// their terminal record it here.
    fn resized(&mut self, _size: Size) {}

    /// Ring the terminal bell.
    fn bell(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn clamp_u16(v: i32) -> u16 {
    u16::try_from(v.max(0)).unwrap_or(u16::MAX)
}

// ─── AnsiSink ───────────────────────────────────────────────────────────────

/// ANSI-encoding sink over any writer.
///
/// Escapes accumulate in an [`OutputBuffer`] and reach the writer only on
/// [`flush`](TerminalSink::flush), once per frame.
///
/// # Examples
///
/// ```
/// use n_comp::geometry::{Point, Size};
/// use n_comp::sink::{AnsiSink, TerminalSink};
///
/// let mut sink = AnsiSink::new(Vec::new(), Size::new(80, 24));
/// sink.set_cursor_position(Point::new(2, 1)).unwrap();
/// sink.write_glyph("x").unwrap();
/// sink.flush().unwrap();
/// assert_eq!(sink.get_ref(), b"\x1b[2;3Hx");
/// ```
pub struct AnsiSink<W: Write + Send> {
    out: W,
    buf: OutputBuffer,
    size: Size,
    track_terminal: bool,
    attrs: Attr,
}

impl<W: Write + Send> AnsiSink<W> {
    /// A sink of a fixed size, updated only through `resized`.
    pub fn new(out: W, size: Size) -> Self {
        Self {
            out,
            buf: OutputBuffer::new(),
            size,
            track_terminal: false,
            attrs: Attr::empty(),
        }
    }

    /// A sink that asks the controlling terminal for its size, falling
    /// back to the last known size when the query fails.
    pub fn terminal(out: W, fallback: Size) -> Self {
        Self {
            track_terminal: true,
            ..Self::new(out, fallback)
        }
    }

    /// The underlying writer.
    pub const fn get_ref(&self) -> &W {
        &self.out
    }
}

impl<W: Write + Send> TerminalSink for AnsiSink<W> {
    fn size(&self) -> Size {
        if self.track_terminal {
            n_term::terminal::get_size().map_or(self.size, Size::from)
        } else {
            self.size
        }
    }

    fn set_cursor_position(&mut self, at: Point) -> io::Result<()> {
        ansi::cursor_to(&mut self.buf, clamp_u16(at.x), clamp_u16(at.y))
    }

    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()> {
        if visible {
            ansi::cursor_show(&mut self.buf)
        } else {
            ansi::cursor_hide(&mut self.buf)
        }
    }

    fn reset_attributes(&mut self) -> io::Result<()> {
        self.attrs = Attr::empty();
        ansi::reset(&mut self.buf)
    }

    fn set_foreground(&mut self, color: CellColor) -> io::Result<()> {
        ansi::fg(&mut self.buf, color)
    }

    fn set_background(&mut self, color: CellColor) -> io::Result<()> {
        ansi::bg(&mut self.buf, color)
    }

    fn enable_style(&mut self, flag: Attr) -> io::Result<()> {
        self.attrs.insert(flag);
        ansi::attr_on(&mut self.buf, flag)
    }

    fn disable_style(&mut self, flag: Attr) -> io::Result<()> {
        self.attrs.remove(flag);
        ansi::attr_off(&mut self.buf, flag)?;
        // The shared reset code also cleared these.
        let survivors = self.attrs & flag.shared_reset();
        for other in survivors.iter() {
            ansi::attr_on(&mut self.buf, other)?;
        }
        Ok(())
    }

    fn write_glyph(&mut self, glyph: &str) -> io::Result<()> {
        self.buf.write_str(glyph);
        Ok(())
    }

    fn begin_frame(&mut self, synchronized: bool) -> io::Result<()> {
        if synchronized {
            ansi::begin_sync(&mut self.buf)?;
        }
        Ok(())
    }

    fn end_frame(&mut self, synchronized: bool) -> io::Result<()> {
        // Leave the terminal's own pen clean between frames.
        self.attrs = Attr::empty();
        ansi::reset(&mut self.buf)?;
        if synchronized {
            ansi::end_sync(&mut self.buf)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buf.flush_to(&mut self.out)
    }

    fn resized(&mut self, size: Size) {
        self.size = size;
    }

    fn bell(&mut self) -> io::Result<()> {
        ansi::bell(&mut self.buf)
    }
}

// ─── VirtualTerminal ────────────────────────────────────────────────────────

/// One call received by a [`VirtualTerminal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    MoveTo(Point),
    CursorVisible(bool),
    Reset,
    Foreground(CellColor),
    Background(CellColor),
    StyleOn(Attr),
    StyleOff(Attr),
    Glyph(String),
    BeginFrame,
    EndFrame,
    Flush,
    Bell,
}

impl SinkOp {
    /// Whether the op changes what the terminal shows or where its cursor
    /// is, as opposed to framing.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        !matches!(self, Self::BeginFrame | Self::EndFrame | Self::Flush)
    }
}

struct VtState {
    screen: Grid,
    cursor: Point,
    cursor_visible: bool,
    fg: CellColor,
    bg: CellColor,
    attrs: Attr,
    ops: Vec<SinkOp>,
    failing: bool,
}

/// In-memory terminal for tests and headless sessions.
///
/// Clones share one screen, so a test can keep a handle while the
/// compositor owns another.
///
/// # Examples
///
/// ```
/// use n_comp::geometry::{Point, Size};
/// use n_comp::sink::{TerminalSink, VirtualTerminal};
///
/// let vt = VirtualTerminal::new(Size::new(4, 1));
/// let mut sink = vt.clone();
/// sink.set_cursor_position(Point::new(1, 0)).unwrap();
/// sink.write_glyph("中").unwrap();
/// assert_eq!(vt.screen_lines(), vec![" 中 "]);
/// assert_eq!(vt.cursor(), Point::new(3, 0));
/// ```
#[derive(Clone)]
pub struct VirtualTerminal {
    state: Arc<Mutex<VtState>>,
}

impl VirtualTerminal {
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self {
            state: Arc::new(Mutex::new(VtState {
                screen: Grid::new(size),
                cursor: Point::ORIGIN,
                cursor_visible: true,
                fg: CellColor::Default,
                bg: CellColor::Default,
                attrs: Attr::empty(),
                ops: Vec::new(),
                failing: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, VtState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the terminal size, keeping what fits, like a window resize.
    pub fn set_size(&self, size: Size) {
        self.state().screen.resize(size, &Cell::blank());
    }

    /// Every op received so far.
    #[must_use]
    pub fn ops(&self) -> Vec<SinkOp> {
        self.state().ops.clone()
    }

    /// Every op received so far, clearing the log.
    pub fn take_ops(&self) -> Vec<SinkOp> {
        std::mem::take(&mut self.state().ops)
    }

    /// A copy of the screen.
    #[must_use]
    pub fn screen(&self) -> Grid {
        self.state().screen.clone()
    }

    #[must_use]
    pub fn screen_lines(&self) -> Vec<String> {
        self.state().screen.to_lines()
    }

    #[must_use]
    pub fn cell_at(&self, x: u16, y: u16) -> Option<Cell> {
        self.state().screen.get(x, y).cloned()
    }

    #[must_use]
    pub fn cursor(&self) -> Point {
        self.state().cursor
    }

    #[must_use]
    pub fn cursor_visible(&self) -> bool {
        self.state().cursor_visible
    }

    /// Make every subsequent write fail with `BrokenPipe` (or stop failing).
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    fn apply(&self, op: SinkOp) -> io::Result<()> {
        let mut state = self.state();
        if state.failing && op.is_write() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "virtual terminal disconnected",
            ));
        }
        match &op {
            SinkOp::MoveTo(at) => state.cursor = *at,
            SinkOp::CursorVisible(visible) => state.cursor_visible = *visible,
            SinkOp::Reset => {
                state.fg = CellColor::Default;
                state.bg = CellColor::Default;
                state.attrs = Attr::empty();
            }
            SinkOp::Foreground(color) => state.fg = *color,
            SinkOp::Background(color) => state.bg = *color,
            SinkOp::StyleOn(flag) => state.attrs.insert(*flag),
            SinkOp::StyleOff(flag) => state.attrs.remove(*flag),
            SinkOp::Glyph(glyph) => {
                let cell = Cell::new(glyph)
                    .unwrap_or_else(|_| Cell::blank())
                    .with_fg(state.fg)
                    .with_bg(state.bg)
                    .with_attrs(state.attrs);
                let width = i32::from(cell.width());
                let at = state.cursor;
                if let (Ok(x), Ok(y)) = (u16::try_from(at.x), u16::try_from(at.y)) {
                    state.screen.set(x, y, cell);
                }
                state.cursor = at.offset(width, 0);
            }
            SinkOp::BeginFrame | SinkOp::EndFrame | SinkOp::Flush | SinkOp::Bell => {}
        }
        state.ops.push(op);
        Ok(())
    }
}

impl TerminalSink for VirtualTerminal {
    fn size(&self) -> Size {
        self.state().screen.size()
    }

    fn set_cursor_position(&mut self, at: Point) -> io::Result<()> {
        self.apply(SinkOp::MoveTo(at))
    }

    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()> {
        self.apply(SinkOp::CursorVisible(visible))
    }

    fn reset_attributes(&mut self) -> io::Result<()> {
        self.apply(SinkOp::Reset)
    }

    fn set_foreground(&mut self, color: CellColor) -> io::Result<()> {
        self.apply(SinkOp::Foreground(color))
    }

    fn set_background(&mut self, color: CellColor) -> io::Result<()> {
        self.apply(SinkOp::Background(color))
    }

    fn enable_style(&mut self, flag: Attr) -> io::Result<()> {
        self.apply(SinkOp::StyleOn(flag))
    }

    fn disable_style(&mut self, flag: Attr) -> io::Result<()> {
        self.apply(SinkOp::StyleOff(flag))
    }

    fn write_glyph(&mut self, glyph: &str) -> io::Result<()> {
        self.apply(SinkOp::Glyph(glyph.to_owned()))
    }

    fn begin_frame(&mut self, _synchronized: bool) -> io::Result<()> {
        self.apply(SinkOp::BeginFrame)
    }

    fn end_frame(&mut self, _synchronized: bool) -> io::Result<()> {
        self.apply(SinkOp::EndFrame)
    }

    fn flush(&mut self) -> io::Result<()> {
        let failing = self.state().failing;
        if failing {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "virtual terminal disconnected",
            ));
        }
        self.apply(SinkOp::Flush)
    }

    fn resized(&mut self, size: Size) {
        self.set_size(size);
    }

    fn bell(&mut self) -> io::Result<()> {
        self.apply(SinkOp::Bell)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
