// SPDX-License-Identifier: MIT
//
// Frame buffer for escape output.
//
// A compositor frame is many tiny writes: cursor moves, SGR changes,
// single glyphs. They collect here and leave in one `write_all` when the
// frame ends, so the terminal never parses half a frame.

use std::io::{self, Write};

/// Room for a full repaint of a large terminal without growing.
const FRAME_CAPACITY: usize = 16 * 1024;

/// Bytes of the frame being built.
#[derive(Debug)]
pub struct OutputBuffer {
    buf: Vec<u8>,
    /// Largest frame flushed so far, for diagnostics.
    peak: usize,
}

impl OutputBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(FRAME_CAPACITY),
            peak: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Size in bytes of the largest frame flushed so far.
    #[inline]
    #[must_use]
    pub const fn peak(&self) -> usize {
        self.peak
    }

    /// Append a glyph verbatim.
    #[inline]
    pub fn write_str(&mut self, glyph: &str) {
        self.buf.extend_from_slice(glyph.as_bytes());
    }

    /// Drop the pending frame, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Send the pending frame to `w` and flush it. The frame is discarded
    /// whether or not the write succeeds; a torn frame is not resumable.
    ///
    /// # Errors
    ///
    /// Whatever `w` reports.
    pub fn flush_to(&mut self, w: &mut impl Write) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.peak = self.peak.max(self.buf.len());
        tracing::trace!(bytes = self.buf.len(), peak = self.peak, "frame flushed");
        let written = w.write_all(&self.buf).and_then(|()| w.flush());
        self.buf.clear();
        if let Err(e) = &written {
            tracing::debug!(error = %e, "frame write failed");
        }
        written
    }
}

impl Write for OutputBuffer {
    #[inline]
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Buffering only; frames leave through [`OutputBuffer::flush_to`].
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}
