// SPDX-License-Identifier: MIT
//
// n-term: the terminal layer underneath the n-wm compositor.
//
// Everything here is about talking to a real terminal: the compact color
// and style types a cell carries, the byte-level ANSI encoding of every
// command the compositor emits, a frame-sized output buffer so one frame
// costs one write() syscall, raw mode with RAII and panic-safe restore,
// the SIGWINCH resize flag, and a background stdin reader thread.
//
// Nothing in this crate knows about drawables, z-order, or diffing. The
// compositor (n-comp) decides *what* to write; n-term knows *how*.

pub mod ansi;
pub mod color;
pub mod output;
pub mod reader;
pub mod style;
pub mod terminal;

pub use color::CellColor;
pub use style::Attr;
