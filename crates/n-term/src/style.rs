// SPDX-License-Identifier: MIT
//
// Style flags: the set of SGR text attributes a cell can carry.
//
// A cell's styles are a set, not a list: the terminal sink enables and
// disables individual flags as the running pen state drifts from one cell
// to the next. Iterating the set yields one single-flag `Attr` per active
// attribute, which is exactly the granularity `enable_style` /
// `disable_style` work at.

bitflags::bitflags! {
    /// Text attributes stored as a compact bitfield.
    ///
    /// These map directly to SGR (Select Graphic Rendition) parameters
    /// in the ANSI escape sequence standard. Combine with bitwise OR:
    ///
    /// ```
    /// use n_term::style::Attr;
    ///
    /// let style = Attr::BOLD | Attr::UNDERLINE;
    /// assert!(style.contains(Attr::BOLD));
    /// assert!(style.contains(Attr::UNDERLINE));
    /// assert!(!style.contains(Attr::DIM));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Attr: u16 {
        /// SGR 1: increased intensity.
        const BOLD          = 1 << 0;
        /// SGR 2: decreased intensity (faint).
        const DIM           = 1 << 1;
        /// SGR 3: italic or oblique.
        const ITALIC        = 1 << 2;
        /// SGR 4: single straight underline.
        const UNDERLINE     = 1 << 3;
        /// SGR 5: slow blink (< 150 per minute).
        const SLOW_BLINK    = 1 << 4;
        /// SGR 6: rapid blink (≥ 150 per minute). Rarely supported.
        const RAPID_BLINK   = 1 << 5;
        /// SGR 7: swap foreground and background.
        const INVERSE       = 1 << 6;
        /// SGR 8: invisible text (not widely supported).
        const HIDDEN        = 1 << 7;
        /// SGR 9: crossed-out text.
        const STRIKETHROUGH = 1 << 8;
    }
}

/// `(flag, on, off)` SGR parameters for every single flag.
///
/// BOLD and DIM share SGR 22, and both blink rates share SGR 25.
const SGR_CODES: [(Attr, u8, u8); 9] = [
    (Attr::BOLD, 1, 22),
    (Attr::DIM, 2, 22),
    (Attr::ITALIC, 3, 23),
    (Attr::UNDERLINE, 4, 24),
    (Attr::SLOW_BLINK, 5, 25),
    (Attr::RAPID_BLINK, 6, 25),
    (Attr::INVERSE, 7, 27),
    (Attr::HIDDEN, 8, 28),
    (Attr::STRIKETHROUGH, 9, 29),
];

impl Attr {
    /// The SGR parameter that turns this single flag on.
    ///
    /// Returns `None` for the empty set or a combination of flags.
    #[must_use]
    pub fn sgr_on(self) -> Option<u8> {
        SGR_CODES
            .iter()
            .find(|(flag, _, _)| *flag == self)
            .map(|&(_, on, _)| on)
    }

    /// The SGR parameter that turns this single flag off.
    ///
    /// Callers that track pen state must re-enable a sibling flag that is
    /// still wanted after emitting a shared reset (see [`shared_reset`]).
    ///
    /// [`shared_reset`]: Self::shared_reset
    #[must_use]
    pub fn sgr_off(self) -> Option<u8> {
        SGR_CODES
            .iter()
            .find(|(flag, _, _)| *flag == self)
            .map(|&(_, _, off)| off)
    }

    /// Every flag that the off code of this single flag clears on the
    /// terminal, including the flag itself.
    #[must_use]
    pub fn shared_reset(self) -> Self {
        let Some(off) = self.sgr_off() else {
            return self;
        };
        SGR_CODES
            .iter()
            .filter(|&&(_, _, code)| code == off)
            .fold(Self::empty(), |acc, &(flag, _, _)| acc | flag)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
