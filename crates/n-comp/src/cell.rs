// SPDX-License-Identifier: MIT
//
// Cell: the atomic unit of composition.
//
// Every position of every grid is a Cell: one grapheme cluster, a foreground
// and background color, a style set, and a derived display width. Cells are
// immutable values; a grid changes by replacing them.
//
// Storage:
//
//   Inline   → clusters up to four UTF-8 bytes (every single scalar) live
//              in the cell itself, no allocation
//   Cluster  → longer clusters (combining marks, ZWJ emoji) sit behind an
//              `Arc<str>`, so cloning a cell never copies string data
//
// Wide characters (CJK, most emoji) occupy two columns. The grid stores the
// glyph in the leading column and a continuation marker (width 0, empty
// glyph, same colors) in the trailing one. Only the grid creates
// continuations; callers can observe them but never construct them.

use std::fmt;
use std::sync::Arc;

use n_term::{Attr, CellColor};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::error::{Error, Result};

// ─── Glyph storage ──────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq, Hash)]
enum Glyph {
    Inline { bytes: [u8; 4], len: u8 },
    Cluster(Arc<str>),
    Continuation,
}

impl Glyph {
    fn from_char(ch: char) -> Self {
        let mut bytes = [0u8; 4];
        let len = ch.encode_utf8(&mut bytes).len();
        // A char encodes to at most four bytes.
        #[allow(clippy::cast_possible_truncation)]
        let len = len as u8;
        Self::Inline { bytes, len }
    }

    fn from_cluster(s: &str) -> Self {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => Self::from_char(ch),
            _ => Self::Cluster(Arc::from(s)),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Inline { bytes, len } => {
                std::str::from_utf8(&bytes[..usize::from(*len)]).unwrap_or_default()
            }
            Self::Cluster(s) => s,
            Self::Continuation => "",
        }
    }
}

// ─── Cell ───────────────────────────────────────────────────────────────────

/// One grid position: a grapheme cluster with colors and style.
///
/// # Examples
///
/// ```
/// use n_comp::cell::Cell;
/// use n_term::{Attr, CellColor};
///
/// let cell = Cell::new("中").unwrap().with_fg(CellColor::RED).with_attrs(Attr::BOLD);
/// assert_eq!(cell.glyph(), "中");
/// assert_eq!(cell.width(), 2);
///
/// assert!(Cell::new("ab").is_err()); // two clusters
/// assert!(Cell::new("\t").is_err()); // control character
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Cell {
    glyph: Glyph,
    fg: CellColor,
    bg: CellColor,
    attrs: Attr,
    width: u8,
}

impl Cell {
    /// Build a cell from exactly one printable grapheme cluster.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidGlyph`] for empty input, more than one cluster,
    /// control characters, or a cluster with no display width.
    pub fn new(glyph: &str) -> Result<Self> {
        let mut clusters = glyph.graphemes(true);
        let single = clusters.next().is_some() && clusters.next().is_none();
        if !single || glyph.chars().any(char::is_control) {
            return Err(Error::InvalidGlyph(glyph.to_owned()));
        }

        let width = glyph.width().min(2);
        if width == 0 {
            return Err(Error::InvalidGlyph(glyph.to_owned()));
        }

        Ok(Self {
            glyph: Glyph::from_cluster(glyph),
            width: u8::try_from(width).unwrap_or(1),
            ..Self::blank()
        })
    }

    /// Build a cell from a single character. Control and zero-width
    /// characters become a blank.
    #[must_use]
    pub fn from_char(ch: char) -> Self {
        match ch.width() {
            Some(w) if w > 0 && !ch.is_control() => Self {
                glyph: Glyph::from_char(ch),
                width: if w >= 2 { 2 } else { 1 },
                ..Self::blank()
            },
            _ => Self::blank(),
        }
    }

    /// A space with default colors and no styles.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            glyph: Glyph::from_char(' '),
            fg: CellColor::Default,
            bg: CellColor::Default,
            attrs: Attr::empty(),
            width: 1,
        }
    }

    /// The trailing half of this (double-width) cell.
    pub(crate) fn continuation(&self) -> Self {
        Self {
            glyph: Glyph::Continuation,
            fg: self.fg,
            bg: self.bg,
            attrs: self.attrs,
            width: 0,
        }
    }

    #[must_use]
    pub const fn with_fg(mut self, fg: CellColor) -> Self {
        self.fg = fg;
        self
    }

    #[must_use]
    pub const fn with_bg(mut self, bg: CellColor) -> Self {
        self.bg = bg;
        self
    }

    #[must_use]
    pub const fn with_attrs(mut self, attrs: Attr) -> Self {
        self.attrs = attrs;
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    /// The grapheme cluster. Empty for a continuation.
    #[inline]
    #[must_use]
    pub fn glyph(&self) -> &str {
        self.glyph.as_str()
    }

    #[inline]
    #[must_use]
    pub const fn fg(&self) -> CellColor {
        self.fg
    }

    #[inline]
    #[must_use]
    pub const fn bg(&self) -> CellColor {
        self.bg
    }

    #[inline]
    #[must_use]
    pub const fn attrs(&self) -> Attr {
        self.attrs
    }

    /// Display width in columns: 1 or 2, or 0 for a continuation.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u8 {
        self.width
    }

    #[inline]
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        self.width == 2
    }

    /// Whether this is the trailing half of a double-width cell.
    #[inline]
    #[must_use]
    pub const fn is_continuation(&self) -> bool {
        matches!(self.glyph, Glyph::Continuation)
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_continuation() {
            return write!(f, "Cell(<cont> {} on {})", self.fg, self.bg);
        }
        write!(f, "Cell({:?} {} on {}", self.glyph(), self.fg, self.bg)?;
        if !self.attrs.is_empty() {
            write!(f, " {:?}", self.attrs)?;
        }
        write!(f, ")")
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
