// SPDX-License-Identifier: MIT
//
// Terminal control: raw mode, alternate screen, size, resize flag.
//
// Everything here talks to POSIX directly (termios, TIOCGWINSZ, isatty,
// sigaction, write(2)), so the module opts back into `unsafe`. Each block
// wraps exactly one libc call.
#![allow(unsafe_code)]
//
// A `Terminal` owns the session's screen state. `enter` puts stdin in raw
// mode and switches to the alternate screen; `leave` (or drop) undoes both.
// A process-wide panic hook repeats the undo with a raw write to fd 1 so a
// panic in the middle of a frame, with the stdout lock held, still leaves
// a usable shell behind.
//
// SIGWINCH only raises a flag. The session loop polls it with
// [`take_resize`] and asks the compositor to follow.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once, PoisonError};

use crate::ansi;

// ─── Size ───────────────────────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub cols: u16,
    pub rows: u16,
}

impl Size {
    /// Used when the OS cannot tell us (pipes, CI).
    pub const FALLBACK: Self = Self { cols: 80, rows: 24 };

    #[inline]
    #[must_use]
    pub const fn area(self) -> u32 {
        self.cols as u32 * self.rows as u32
    }
}

// ─── Queries ────────────────────────────────────────────────────────────────

/// Size of the terminal behind stdout, or `None` when stdout is not a
/// terminal or reports a zero dimension.
#[cfg(unix)]
#[must_use]
pub fn get_size() -> Option<Size> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let ok = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) } == 0;
    (ok && ws.ws_col > 0 && ws.ws_row > 0).then_some(Size {
        cols: ws.ws_col,
        rows: ws.ws_row,
    })
}

#[cfg(not(unix))]
#[must_use]
pub fn get_size() -> Option<Size> {
    None
}

/// Whether stdin is a terminal. Raw mode is skipped when it is not.
#[cfg(unix)]
#[must_use]
pub fn is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_tty() -> bool {
    false
}

// ─── Raw mode ───────────────────────────────────────────────────────────────

/// Saved line discipline of stdin, restored on drop.
#[cfg(unix)]
struct RawMode {
    original: libc::termios,
}

/// Copy of the saved termios for the panic hook, which cannot reach the
/// `Terminal` that owns the real one.
#[cfg(unix)]
static SAVED_TERMIOS: Mutex<Option<libc::termios>> = Mutex::new(None);

#[cfg(unix)]
impl RawMode {
    /// Switch stdin to raw mode. `Ok(None)` when stdin is not a terminal.
    fn enable() -> io::Result<Option<Self>> {
        if !is_tty() {
            return Ok(None);
        }
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(libc::STDIN_FILENO, &raw mut termios) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let original = termios;

        // Same flags as cfmakeraw(3).
        termios.c_iflag &= !(libc::IGNBRK
            | libc::BRKINT
            | libc::PARMRK
            | libc::ISTRIP
            | libc::INLCR
            | libc::IGNCR
            | libc::ICRNL
            | libc::IXON);
        termios.c_oflag &= !libc::OPOST;
        termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
        termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
        termios.c_cflag |= libc::CS8;
        termios.c_cc[libc::VMIN] = 1;
        termios.c_cc[libc::VTIME] = 0;

        set_termios(&termios)?;
        *SAVED_TERMIOS.lock().unwrap_or_else(PoisonError::into_inner) = Some(original);
        Ok(Some(Self { original }))
    }

    fn restore(&self) -> io::Result<()> {
        set_termios(&self.original)?;
        *SAVED_TERMIOS.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(unix)]
fn set_termios(termios: &libc::termios) -> io::Result<()> {
    if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, termios) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
struct RawMode;

#[cfg(not(unix))]
impl RawMode {
    #[allow(clippy::unnecessary_wraps)]
    const fn enable() -> io::Result<Option<Self>> {
        Ok(None)
    }

    #[allow(clippy::unnecessary_wraps, clippy::unused_self)]
    const fn restore(&self) -> io::Result<()> {
        Ok(())
    }
}

// ─── Panic restore ──────────────────────────────────────────────────────────

/// Undo of `enter`, in order: end any open synchronized frame, reset the
/// pen, show the cursor, leave the alternate screen.
#[rustfmt::skip]
const PANIC_RESTORE: &[u8] = b"\
    \x1b[?2026l\
    \x1b[0m\
    \x1b[?25h\
    \x1b[?1049l";

static PANIC_HOOK: Once = Once::new();

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            write_panic_restore();
            restore_saved_termios();
            previous(info);
        }));
    });
}

/// Best effort; a writer holding the lock mid-panic keeps it.
#[cfg(unix)]
fn restore_saved_termios() {
    let saved = SAVED_TERMIOS.try_lock().ok().and_then(|saved| *saved);
    if let Some(original) = saved {
        let _ = set_termios(&original);
    }
}

#[cfg(not(unix))]
const fn restore_saved_termios() {}

/// Write [`PANIC_RESTORE`] without touching the stdout lock.
fn write_panic_restore() {
    #[cfg(unix)]
    unsafe {
        let _ = libc::write(
            libc::STDOUT_FILENO,
            PANIC_RESTORE.as_ptr().cast::<libc::c_void>(),
            PANIC_RESTORE.len(),
        );
    }

    #[cfg(not(unix))]
    {
        let mut out = io::stdout();
        let _ = out.write_all(PANIC_RESTORE);
        let _ = out.flush();
    }
}

// ─── Resize flag ────────────────────────────────────────────────────────────

static RESIZED: AtomicBool = AtomicBool::new(false);

/// Route SIGWINCH to the resize flag. Repeatable.
#[cfg(unix)]
pub fn install_resize_handler() {
    extern "C" fn on_sigwinch(_sig: libc::c_int) {
        RESIZED.store(true, Ordering::Relaxed);
    }

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_sigwinch as *const () as usize;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&raw mut action.sa_mask);
        libc::sigaction(libc::SIGWINCH, &raw const action, std::ptr::null_mut());
    }
}

#[cfg(not(unix))]
pub fn install_resize_handler() {}

/// Whether the terminal was resized since the last call. Clears the flag.
#[must_use]
pub fn take_resize() -> bool {
    RESIZED.swap(false, Ordering::Relaxed)
}

// ─── Terminal ───────────────────────────────────────────────────────────────

/// The screen a compositor session runs on.
///
/// ```no_run
/// use n_term::terminal::Terminal;
///
/// let mut term = Terminal::new()?;
/// term.enter()?;
/// // hand stdout to a compositor sink, pump input ...
/// term.leave()?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct Terminal {
    raw: Option<RawMode>,
    size: Size,
    active: bool,
}

impl Terminal {
    /// A handle sized from the OS, [`Size::FALLBACK`] if it cannot say.
    /// Nothing is written until [`enter`](Self::enter).
    ///
    /// # Errors
    ///
    /// None today; kept fallible for platforms that need console setup.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            raw: None,
            size: get_size().unwrap_or(Size::FALLBACK),
            active: false,
        })
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> Size {
        self.size
    }

    /// Ask the OS again, keeping the last known size if it cannot answer.
    pub fn refresh_size(&mut self) -> Size {
        if let Some(size) = get_size() {
            self.size = size;
        }
        self.size
    }

    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Raw mode, alternate screen, hidden cursor, clear screen. A no-op if
    /// already entered.
    ///
    /// # Errors
    ///
    /// termios or stdout failures. Raw mode is undone if the screen switch
    /// fails.
    pub fn enter(&mut self) -> io::Result<()> {
        if self.active {
            return Ok(());
        }
        install_panic_hook();
        self.raw = RawMode::enable()?;

        if let Err(e) = switch_in() {
            if let Some(raw) = self.raw.take() {
                let _ = raw.restore();
            }
            return Err(e);
        }

        self.active = true;
        tracing::debug!(cols = self.size.cols, rows = self.size.rows, "terminal entered");
        Ok(())
    }

    /// Undo [`enter`](Self::enter). A no-op if not entered.
    ///
    /// # Errors
    ///
    /// stdout or termios failures. Raw mode is restored even if the
    /// screen switch could not be written.
    pub fn leave(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        let written = switch_out();
        let restored = self.raw.take().map_or(Ok(()), |raw| raw.restore());

        tracing::debug!("terminal left");
        written.and(restored)
    }
}

fn switch_in() -> io::Result<()> {
    let mut out = io::stdout().lock();
    ansi::enter_alt_screen(&mut out)?;
    ansi::cursor_hide(&mut out)?;
    ansi::clear_screen(&mut out)?;
    out.flush()
}

fn switch_out() -> io::Result<()> {
    let mut out = io::stdout().lock();
    ansi::end_sync(&mut out)?;
    ansi::reset(&mut out)?;
    ansi::cursor_show(&mut out)?;
    ansi::exit_alt_screen(&mut out)?;
    out.flush()
}

impl Drop for Terminal {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}
