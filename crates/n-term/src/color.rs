// SPDX-License-Identifier: MIT
//
// Cell colors: the compact, fully resolved color a terminal cell carries.
//
// The compositor never blends: drawables are opaque overlays, so a cell's
// color is always final by the time it reaches a grid. That keeps this type
// tiny (4 bytes, `Copy`, `Eq`, `Hash`) and makes the diff loop's equality
// check a plain comparison.
//
// Three encodings cover every terminal we care about:
//
//   Default  → SGR 39 / 49, inherits the user's terminal theme
//   Ansi256  → palette index (compact 30–37 / 90–97 codes for 0–15)
//   Rgb      → 24-bit TrueColor

use std::fmt;

/// Compact color for terminal cell storage.
///
/// This is what the compositor stores in every cell and what the terminal
/// sink converts into SGR escape sequences.
///
/// # Examples
///
/// ```
/// use n_term::color::CellColor;
///
/// let red = CellColor::Rgb(255, 0, 0);
/// assert_eq!(CellColor::from_hex("#ff0000"), Some(red));
/// assert!(CellColor::Default.is_default());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellColor {
    /// 24-bit `TrueColor` (the standard for modern terminals).
    Rgb(u8, u8, u8),

    /// ANSI 256-color palette index.
    Ansi256(u8),

    /// Terminal default color (inherits from terminal settings).
    #[default]
    Default,
}

impl CellColor {
    pub const BLACK: Self = Self::Ansi256(0);
    pub const RED: Self = Self::Ansi256(1);
    pub const GREEN: Self = Self::Ansi256(2);
    pub const YELLOW: Self = Self::Ansi256(3);
    pub const BLUE: Self = Self::Ansi256(4);
    pub const MAGENTA: Self = Self::Ansi256(5);
    pub const CYAN: Self = Self::Ansi256(6);
    pub const WHITE: Self = Self::Ansi256(7);
    pub const BRIGHT_BLACK: Self = Self::Ansi256(8);
    pub const BRIGHT_WHITE: Self = Self::Ansi256(15);

    /// Whether this is the terminal default color.
    #[inline]
    #[must_use]
    pub const fn is_default(self) -> bool {
        matches!(self, Self::Default)
    }

    /// Parse `#RGB` or `#RRGGBB` (the `#` is optional).
    ///
    /// Returns `None` for anything else.
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if !hex.is_ascii() {
            return None;
        }
        match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (slot, digit) in rgb.iter_mut().zip(hex.chars()) {
                    let v = u8::try_from(digit.to_digit(16)?).ok()?;
                    *slot = v * 17;
                }
                Some(Self::Rgb(rgb[0], rgb[1], rgb[2]))
            }
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some(Self::Rgb(r, g, b))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for CellColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgb(r, g, b) => write!(f, "#{r:02x}{g:02x}{b:02x}"),
            Self::Ansi256(idx) => write!(f, "ansi({idx})"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl fmt::Display for CellColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
