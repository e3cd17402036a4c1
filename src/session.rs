// SPDX-License-Identifier: MIT
//
// Session: one interactive n-wm run.
//
// The screen is a desk container over every row but the last, and a status
// bar on the last row. Windows are canvases attached to the desk; the
// compositor keeps their stacking, focus and clipping. Input arrives as raw
// byte chunks from the stdin reader and is decoded into commands here.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use n_comp::{
    Attr, Canvas, Cell, CellColor, Compositor, ContainerPolicy, CursorMode, Drawable, DrawableId,
    Error, Point, Rect, Result, Size, Solid,
};

const WINDOW_SIZE: Size = Size::new(26, 7);
const MIN_WIDTH: u16 = 8;
const MIN_HEIGHT: u16 = 3;

const DESK: CellColor = CellColor::Ansi256(236);
const BODY: CellColor = CellColor::Ansi256(235);
const FOCUSED_EDGE: CellColor = CellColor::Ansi256(45);
const IDLE_EDGE: CellColor = CellColor::Ansi256(244);

// ─── Commands ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    FocusNext,
    Move(i32, i32),
    Grow(i32, i32),
    Open,
    Close,
    Redraw,
}

/// Decode one chunk of raw input. Escape sequences (arrows, mouse reports)
/// carry nothing the session uses, so everything from an ESC byte to the
/// end of its chunk is dropped.
pub fn decode(bytes: &[u8]) -> Vec<Command> {
    let mut commands = Vec::new();
    for &byte in bytes {
        let command = match byte {
            0x1b => break,
            b'q' | 0x03 => Command::Quit,
            b'\t' => Command::FocusNext,
            b'h' => Command::Move(-1, 0),
            b'j' => Command::Move(0, 1),
            b'k' => Command::Move(0, -1),
            b'l' => Command::Move(1, 0),
            b'H' => Command::Grow(-1, 0),
            b'J' => Command::Grow(0, 1),
            b'K' => Command::Grow(0, -1),
            b'L' => Command::Grow(1, 0),
            b'n' => Command::Open,
            b'x' => Command::Close,
            0x0c => Command::Redraw,
            _ => continue,
        };
        commands.push(command);
    }
    commands
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

// ─── Windows ────────────────────────────────────────────────────────────────

struct Window {
    id: DrawableId,
    canvas: Arc<Canvas>,
    number: usize,
    opened: Instant,
    shown_age: u64,
}

impl Window {
    fn age(&self) -> u64 {
        self.opened.elapsed().as_secs()
    }

    /// Repaint border, title and body for the canvas's current size.
    fn paint(&mut self, focused: bool) {
        let size = self.canvas.size();
        let (w, h) = (size.width, size.height);
        self.shown_age = self.age();
        self.canvas.clear();
        if w < 2 || h < 2 {
            return;
        }

        let edge = Cell::blank()
            .with_fg(if focused { FOCUSED_EDGE } else { IDLE_EDGE })
            .with_bg(BODY);
        let inner = usize::from(w - 2);
        self.canvas.print(0, 0, &format!("┌{}┐", "─".repeat(inner)), &edge);
        self.canvas.print(0, h - 1, &format!("└{}┘", "─".repeat(inner)), &edge);
        for y in 1..h - 1 {
            self.canvas.print(0, y, "│", &edge);
            self.canvas.print(w - 1, y, "│", &edge);
        }

        let title: String = format!(" win {} ", self.number)
            .chars()
            .take(usize::from(w.saturating_sub(4)))
            .collect();
        self.canvas.print(2, 0, &title, &edge.clone().with_attrs(Attr::BOLD));

        let text = Cell::blank().with_bg(BODY);
        let room = usize::from(w - 2);
        let mut line_end = 1;
        if h > 2 {
            let line: String = format!(" up {}s", self.shown_age).chars().take(room).collect();
            line_end = self.canvas.print(1, 1, &line, &text);
        }
        if h > 3 {
            // Wide glyphs exercise the double-width paths near the border.
            let line: String = format!(" 窗口 {}", self.number).chars().take(room / 2).collect();
            self.canvas.print(1, 2, &line, &text);
        }

        let mode = if focused {
            CursorMode::TerminalRendered
        } else {
            CursorMode::Hidden
        };
        self.canvas.set_cursor(Point::new(i32::from(line_end), 1), mode);
    }
}

// ─── Session ────────────────────────────────────────────────────────────────

pub struct Session {
    comp: Compositor,
    desk: DrawableId,
    status: DrawableId,
    status_canvas: Arc<Canvas>,
    windows: Vec<Window>,
    opened: usize,
}

fn desk_rect(size: Size) -> Rect {
    Rect::new(0, 0, size.width, size.height.saturating_sub(1))
}

fn status_rect(size: Size) -> Rect {
    Rect::new(0, i32::from(size.height) - 1, size.width, 1)
}

impl Session {
    /// Lay out the desk and status bar on `comp`, open two windows and draw
    /// the first frame.
    ///
    /// # Errors
    ///
    /// Any compositor error, including the first frame's I/O.
    pub fn open(comp: Compositor, size: Size) -> Result<Self> {
        let root = comp.root();

        let status_canvas = Arc::new(
            Canvas::filled(Size::new(size.width, 1), Cell::blank().with_attrs(Attr::INVERSE))
                .with_focusable(false),
        );
        let status = comp.create_leaf(status_rect(size), status_canvas.clone())?;
        comp.attach(root, status)?;

        let background: Arc<dyn Drawable> = Arc::new(Solid::new(
            Cell::from_char('·').with_fg(CellColor::Ansi256(239)).with_bg(DESK),
        ));
        let desk = comp.create_container(desk_rect(size), Some(background), ContainerPolicy::default())?;
        comp.attach(root, desk)?;
        comp.set_focus(desk)?;

        let mut session = Self {
            comp,
            desk,
            status,
            status_canvas,
            windows: Vec::new(),
            opened: 0,
        };
        session.open_window()?;
        session.open_window()?;
        session.comp.render_all()?;
        tracing::info!(%size, "session opened");
        Ok(session)
    }

    #[cfg(test)]
    const fn compositor(&self) -> &Compositor {
        &self.comp
    }

    #[cfg(test)]
    fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// The focused window on the desk.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after `close`.
    pub fn focused(&self) -> Result<Option<DrawableId>> {
        self.comp.focused(self.desk)
    }

    /// Pump input until quit, ticking the clock between chunks and
    /// following terminal resizes reported by `resized`.
    ///
    /// # Errors
    ///
    /// The first compositor error that is not a refused move.
    pub fn run(
        &mut self,
        input: &Receiver<Vec<u8>>,
        tick: Duration,
        mut resized: impl FnMut() -> Option<Size>,
    ) -> Result<()> {
        loop {
            match input.recv_timeout(tick) {
                Ok(bytes) => {
                    for command in decode(&bytes) {
                        if self.apply(command)? == Flow::Quit {
                            return Ok(());
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.tick()?,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("input closed");
                    return Ok(());
                }
            }
            if let Some(size) = resized() {
                self.follow_resize(size)?;
            }
        }
    }

    /// Carry out one command.
    ///
    /// # Errors
    ///
    /// Compositor errors. A move or resize refused by strict bounds rings
    /// the bell instead.
    pub fn apply(&mut self, command: Command) -> Result<Flow> {
        tracing::trace!(?command, "command");
        match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::FocusNext => self.focus_next()?,
            Command::Move(dx, dy) => self.nudge(dx, dy)?,
            Command::Grow(dw, dh) => self.grow(dw, dh)?,
            Command::Open => self.open_window()?,
            Command::Close => self.close_focused()?,
            Command::Redraw => self.comp.force_redraw()?,
        }
        Ok(Flow::Continue)
    }

    /// Refresh every window whose displayed age went stale.
    ///
    /// # Errors
    ///
    /// As [`Compositor::render`].
    pub fn tick(&mut self) -> Result<()> {
        let focused = self.focused()?;
        for i in 0..self.windows.len() {
            if self.windows[i].age() != self.windows[i].shown_age {
                let is_focused = focused == Some(self.windows[i].id);
                self.repaint(i, is_focused)?;
            }
        }
        Ok(())
    }

    /// Re-lay the desk and status bar for a new terminal size.
    ///
    /// # Errors
    ///
    /// Compositor errors from the layout or the full repaint.
    pub fn follow_resize(&mut self, size: Size) -> Result<()> {
        tracing::info!(%size, "terminal resized");
        self.comp.notify_resize(size)?;
        self.comp.set_rect(self.desk, desk_rect(size))?;
        self.comp.set_rect(self.status, status_rect(size))?;
        self.paint_status()?;
        self.comp.force_redraw()
    }

    /// Detach everything and shut the compositor.
    pub fn close(&mut self) {
        self.windows.clear();
        self.comp.close();
        tracing::info!("session closed");
    }

    // ─── Commands ───────────────────────────────────────────────────────

    fn open_window(&mut self) -> Result<()> {
        self.opened += 1;
        let desk = self.comp.rect(self.desk)?.size;
        let step = i32::try_from(self.opened % 8).unwrap_or(0);
        let origin = Point::new(2 + step * 4, 1 + step * 2);
        let rect = clamp_into(Rect { origin, size: WINDOW_SIZE }, desk);

        let canvas = Arc::new(Canvas::filled(rect.size, Cell::blank().with_bg(BODY)));
        let id = self.comp.create_leaf(rect, canvas.clone())?;
        self.windows.push(Window {
            id,
            canvas,
            number: self.opened,
            opened: Instant::now(),
            shown_age: 0,
        });
        let last = self.windows.len() - 1;
        self.windows[last].paint(true);
        self.comp.attach(self.desk, id)?;
        self.comp.set_focus(id)?;
        tracing::debug!(%id, %rect, number = self.opened, "window opened");
        self.repaint_all()
    }

    fn close_focused(&mut self) -> Result<()> {
        let Some(id) = self.focused()? else {
            return Ok(());
        };
        let Some(index) = self.index_of(id) else {
            return Ok(());
        };
        self.comp.detach(id)?;
        self.comp.forget(id)?;
        self.windows.remove(index);
        tracing::debug!(%id, "window closed");
        self.repaint_all()
    }

    /// Bring the bottom-most window to the top, cycling through them all.
    fn focus_next(&mut self) -> Result<()> {
        let children = self.comp.children(self.desk)?;
        if let Some(&bottom) = children.last() {
            self.comp.set_focus(bottom)?;
            self.repaint_all()?;
        }
        Ok(())
    }

    fn nudge(&mut self, dx: i32, dy: i32) -> Result<()> {
        let Some(id) = self.focused()? else {
            return Ok(());
        };
        let rect = self.comp.rect(id)?;
        let moved = self.comp.move_to(id, rect.origin.offset(dx, dy));
        self.refuse_quietly(moved)
    }

    fn grow(&mut self, dw: i32, dh: i32) -> Result<()> {
        let Some(id) = self.focused()? else {
            return Ok(());
        };
        let Some(index) = self.index_of(id) else {
            return Ok(());
        };
        let size = self.comp.rect(id)?.size;
        let width = (i32::from(size.width) + dw).clamp(i32::from(MIN_WIDTH), i32::from(u16::MAX));
        let height = (i32::from(size.height) + dh).clamp(i32::from(MIN_HEIGHT), i32::from(u16::MAX));
        let resized = self.comp.resize(id, Size::checked(width, height)?);
        self.refuse_quietly(resized)?;
        self.repaint(index, true)
    }

    fn refuse_quietly(&self, result: Result<()>) -> Result<()> {
        match result {
            Err(Error::OutOfBounds { rect, bounds }) => {
                tracing::info!(%rect, %bounds, "refused to leave the desk");
                self.comp.with_terminal(|term| term.bell())
            }
            other => other,
        }
    }

    // ─── Painting ───────────────────────────────────────────────────────

    fn index_of(&self, id: DrawableId) -> Option<usize> {
        self.windows.iter().position(|w| w.id == id)
    }

    fn repaint(&mut self, index: usize, focused: bool) -> Result<()> {
        let window = &mut self.windows[index];
        window.paint(focused);
        let area = self.comp.absolute_rect(window.id)?;
        self.comp.render(area)
    }

    fn repaint_all(&mut self) -> Result<()> {
        let focused = self.focused()?;
        for i in 0..self.windows.len() {
            let is_focused = focused == Some(self.windows[i].id);
            self.repaint(i, is_focused)?;
        }
        self.paint_status()
    }

    fn paint_status(&self) -> Result<()> {
        let bar = Cell::blank().with_attrs(Attr::INVERSE);
        self.status_canvas.clear();
        let count = self.windows.len();
        let plural = if count == 1 { "" } else { "s" };
        let text = format!(
            " n-wm │ {count} window{plural} │ Tab focus  hjkl move  HJKL size  n new  x close  q quit"
        );
        self.status_canvas.print(0, 0, &text, &bar);
        let area = self.comp.absolute_rect(self.status)?;
        self.comp.render(area)
    }
}

/// Shift and shrink `rect` so it fits inside `bounds`.
fn clamp_into(rect: Rect, bounds: Size) -> Rect {
    let width = rect.size.width.min(bounds.width);
    let height = rect.size.height.min(bounds.height);
    let max_x = i32::from(bounds.width - width);
    let max_y = i32::from(bounds.height - height);
    Rect::new(
        rect.origin.x.clamp(0, max_x),
        rect.origin.y.clamp(0, max_y),
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use n_comp::{CompositorConfig, NullEvents, SinkOp, VirtualTerminal};
    use pretty_assertions::assert_eq;

    fn session(size: Size, config: CompositorConfig) -> (Session, VirtualTerminal) {
        let vt = VirtualTerminal::new(size);
        let comp = Compositor::new(vt.clone(), NullEvents, config);
        (Session::open(comp, size).unwrap(), vt)
    }

    fn default_session() -> (Session, VirtualTerminal) {
        session(Size::new(60, 20), CompositorConfig::default())
    }

    // ── Decoding ──

    #[test]
    fn decode_keys() {
        assert_eq!(
            decode(b"q\tjL"),
            vec![Command::Quit, Command::FocusNext, Command::Move(0, 1), Command::Grow(1, 0)]
        );
        assert_eq!(decode(b"nx\x0c\x03"), vec![
            Command::Open,
            Command::Close,
            Command::Redraw,
            Command::Quit
        ]);
        assert!(decode(b"zZ9").is_empty());
    }

    #[test]
    fn decode_drops_escape_sequences() {
        assert_eq!(decode(b"n\x1b[Aq"), vec![Command::Open]);
    }

    // ── Layout ──

    #[test]
    fn opens_with_two_windows_and_a_status_bar() {
        let (s, vt) = default_session();
        assert_eq!(s.window_count(), 2);
        let screen = vt.screen().to_lines();
        assert!(screen[19].starts_with(" n-wm │ 2 windows"), "{:?}", screen[19]);
        assert!(screen[0].starts_with("··"));
        assert_eq!(s.compositor().snapshot().unwrap().to_lines(), screen);
    }

    #[test]
    fn newest_window_is_focused_and_on_top() {
        let (mut s, _vt) = default_session();
        s.apply(Command::Open).unwrap();
        let focused = s.focused().unwrap().unwrap();
        assert_eq!(s.compositor().depth(focused).unwrap(), 0);
        assert_eq!(s.compositor().focused_leaf().unwrap(), Some(focused));
        assert_eq!(s.window_count(), 3);
    }

    #[test]
    fn focused_window_parks_the_cursor() {
        let (s, vt) = default_session();
        let ops = vt.ops();
        let focused = s.focused().unwrap().unwrap();
        let origin = s.compositor().absolute_rect(focused).unwrap().origin;
        // " up 0s" written from column 1 ends at column 7.
        assert!(ops.contains(&SinkOp::MoveTo(origin.offset(7, 1))));
        assert_eq!(ops.iter().rev().find(|op| matches!(op, SinkOp::CursorVisible(_))), Some(&SinkOp::CursorVisible(true)));
    }

    // ── Commands ──

    #[test]
    fn tab_cycles_through_every_window() {
        let (mut s, _vt) = default_session();
        s.apply(Command::Open).unwrap();
        let first = s.focused().unwrap();
        let mut seen = vec![first];
        for _ in 0..2 {
            s.apply(Command::FocusNext).unwrap();
            seen.push(s.focused().unwrap());
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
        s.apply(Command::FocusNext).unwrap();
        assert_eq!(s.focused().unwrap(), first);
    }

    #[test]
    fn move_and_grow_the_focused_window() {
        let (mut s, vt) = default_session();
        let id = s.focused().unwrap().unwrap();
        let before = s.compositor().rect(id).unwrap();
        s.apply(Command::Move(1, 0)).unwrap();
        s.apply(Command::Move(0, 1)).unwrap();
        s.apply(Command::Grow(2, -1)).unwrap();
        let after = s.compositor().rect(id).unwrap();
        assert_eq!(after.origin, before.origin.offset(1, 1));
        assert_eq!(after.size, Size::new(before.size.width + 2, before.size.height - 1));
        assert_eq!(vt.screen(), s.compositor().snapshot().unwrap());
    }

    #[test]
    fn windows_never_shrink_below_the_minimum() {
        let (mut s, _vt) = default_session();
        let id = s.focused().unwrap().unwrap();
        for _ in 0..40 {
            s.apply(Command::Grow(-1, -1)).unwrap();
        }
        assert_eq!(s.compositor().rect(id).unwrap().size, Size::new(MIN_WIDTH, MIN_HEIGHT));
    }

    #[test]
    fn strict_desk_rings_the_bell_instead_of_moving() {
        let (mut s, vt) = session(
            Size::new(60, 20),
            CompositorConfig::default().with_bounds(n_comp::BoundsPolicy::Strict),
        );
        let id = s.focused().unwrap().unwrap();
        let start = s.compositor().rect(id).unwrap();
        for _ in 0..start.origin.x {
            s.apply(Command::Move(-1, 0)).unwrap();
        }
        vt.take_ops();
        s.apply(Command::Move(-1, 0)).unwrap();
        assert_eq!(s.compositor().rect(id).unwrap().origin.x, 0);
        assert!(vt.ops().contains(&SinkOp::Bell));
    }

    #[test]
    fn closing_windows_restores_the_desk() {
        let (mut s, vt) = default_session();
        s.apply(Command::Close).unwrap();
        s.apply(Command::Close).unwrap();
        assert_eq!(s.window_count(), 0);
        assert_eq!(s.focused().unwrap(), None);
        let screen = vt.screen().to_lines();
        assert!(screen[..19].iter().all(|line| line.chars().all(|c| c == '·')));
        assert!(screen[19].starts_with(" n-wm │ 0 windows"));
        // Nothing left to close.
        s.apply(Command::Close).unwrap();
    }

    #[test]
    fn quit_stops_the_loop() {
        let (mut s, _vt) = default_session();
        assert_eq!(s.apply(Command::Quit).unwrap(), Flow::Quit);
        assert_eq!(s.apply(Command::Redraw).unwrap(), Flow::Continue);
    }

    // ── Loop ──

    #[test]
    fn run_follows_input_and_resizes() {
        let (mut s, vt) = default_session();
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(b"n".to_vec()).unwrap();
        tx.send(b"n".to_vec()).unwrap();
        tx.send(b"q".to_vec()).unwrap();
        let mut pending = Some(Size::new(40, 12));
        let vt_resize = vt.clone();
        s.run(&rx, Duration::from_millis(5), || {
            let size = pending.take()?;
            vt_resize.set_size(size);
            Some(size)
        })
        .unwrap();

        assert_eq!(s.window_count(), 4);
        let screen = vt.screen();
        assert_eq!(screen.size(), Size::new(40, 12));
        assert_eq!(screen, s.compositor().snapshot().unwrap());
        assert!(screen.to_lines()[11].starts_with(" n-wm │ 4 windows"));
    }

    #[test]
    fn run_ends_when_input_closes() {
        let (mut s, _vt) = default_session();
        let (tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();
        drop(tx);
        s.run(&rx, Duration::from_millis(5), || None).unwrap();
        s.close();
        assert!(s.compositor().is_closed());
    }

    #[test]
    fn clamp_into_fits_small_desks() {
        let desk = Size::new(10, 4);
        assert_eq!(clamp_into(Rect::new(30, 30, 26, 7), desk), Rect::new(0, 0, 10, 4));
        assert_eq!(clamp_into(Rect::new(6, 2, 4, 2), desk), Rect::new(6, 2, 4, 2));
        assert_eq!(clamp_into(Rect::new(8, -3, 4, 2), desk), Rect::new(6, 0, 4, 2));
    }
}
