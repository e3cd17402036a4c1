// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Stdin reader: the input producer of a compositor session.
//
// A named thread polls stdin and forwards each chunk of raw bytes over a
// channel. The session loop owns the receiver, decodes keys and mutates the
// compositor tree on its own thread. Polling with a short timeout lets the
// thread notice `stop` without being parked in `read()`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

const CHUNK: usize = 4096;

/// Upper bound on how long `stop` waits for the thread.
const POLL_MS: i32 = 50;

/// What one poll of the byte source produced.
enum Read {
    Bytes(usize),
    Idle,
    Closed,
}

/// Handle to the reader thread. Stops the thread when dropped.
///
/// ```no_run
/// use n_term::reader::StdinReader;
///
/// let (mut reader, input) = StdinReader::spawn()?;
/// if let Ok(chunk) = input.recv() {
///     println!("{} bytes", chunk.len());
/// }
/// reader.stop();
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct StdinReader {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl StdinReader {
    /// Start reading stdin. The receiver yields non-empty chunks and
    /// disconnects on EOF, read error, or [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// The OS refused to spawn the thread.
    pub fn spawn() -> io::Result<(Self, Receiver<Vec<u8>>)> {
        Self::spawn_with(poll_stdin)
    }

    fn spawn_with<F>(source: F) -> io::Result<(Self, Receiver<Vec<u8>>)>
    where
        F: FnMut(&mut [u8]) -> Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("n-wm-input".into())
            .spawn(move || {
                let chunks = pump(source, &tx, &flag);
                tracing::debug!(chunks, "input reader exited");
            })?;
        Ok((
            Self {
                handle: Some(handle),
                stop,
            },
            rx,
        ))
    }

    /// Ask the thread to finish and join it. Repeatable.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StdinReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Forward chunks from `source` until stopped, closed, or nobody listens.
/// Returns how many chunks were sent.
fn pump(mut source: impl FnMut(&mut [u8]) -> Read, tx: &Sender<Vec<u8>>, stop: &AtomicBool) -> usize {
    let mut buf = [0u8; CHUNK];
    let mut sent = 0;
    while !stop.load(Ordering::Relaxed) {
        match source(&mut buf) {
            Read::Idle => {}
            Read::Closed => break,
            Read::Bytes(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
                sent += 1;
            }
        }
    }
    sent
}

#[cfg(unix)]
fn poll_stdin(buf: &mut [u8]) -> Read {
    let mut pfd = libc::pollfd {
        fd: libc::STDIN_FILENO,
        events: libc::POLLIN,
        revents: 0,
    };
    if unsafe { libc::poll(&raw mut pfd, 1, POLL_MS) } <= 0 {
        return Read::Idle;
    }
    let n = unsafe { libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len()) };
    usize::try_from(n)
        .ok()
        .filter(|&n| n > 0)
        .map_or(Read::Closed, Read::Bytes)
}

/// Without poll(2) the thread blocks in `read` and only sees `stop` after
/// the next keystroke.
#[cfg(not(unix))]
fn poll_stdin(buf: &mut [u8]) -> Read {
    use std::io::Read as _;
    match io::stdin().lock().read(buf) {
        Ok(0) | Err(_) => Read::Closed,
        Ok(n) => Read::Bytes(n),
    }
}
