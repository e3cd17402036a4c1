// SPDX-License-Identifier: MIT
//
// Compositor errors.
//
// Bounds errors only surface in strict mode. Tree consistency errors
// (double attach, detaching a stranger, focusing something that isn't
// attached) always surface. Terminal I/O failures pass through untouched;
// reconnecting is the session layer's call.

use std::io;

use crate::drawable::DrawableId;
use crate::geometry::{Rect, Size};

/// Everything that can go wrong in the compositor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A size or rect with negative or overflowing dimensions.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A cell glyph that is not exactly one printable grapheme cluster.
    #[error("invalid glyph {0:?}: expected exactly one printable grapheme cluster")]
    InvalidGlyph(String),

    /// A rect that does not fit inside its container (strict mode), or a
    /// render request entirely outside the terminal (strict mode).
    #[error("{rect:?} is out of bounds of {bounds:?}")]
    OutOfBounds { rect: Rect, bounds: Rect },

    /// The drawable already has a parent.
    #[error("drawable {0} is already attached")]
    AlreadyAttached(DrawableId),

    /// The drawable is not in any container's child list.
    #[error("drawable {0} is not attached")]
    NotAttached(DrawableId),

    /// Only detached drawables can be forgotten.
    #[error("drawable {0} is still attached")]
    StillAttached(DrawableId),

    /// Children can only be attached to containers.
    #[error("drawable {0} is not a container")]
    NotAContainer(DrawableId),

    /// Attaching a container beneath itself.
    #[error("attaching {child} to {parent} would create a cycle")]
    CycleDetected { parent: DrawableId, child: DrawableId },

    /// The id was never issued by this compositor, or was forgotten.
    #[error("unknown drawable {0}")]
    UnknownDrawable(DrawableId),

    /// A drawable produced a grid whose size differs from its rect.
    /// The drawable has been detached.
    #[error("drawable {id} rendered {actual:?}, expected {expected:?}; detached")]
    RenderContract {
        id: DrawableId,
        expected: Size,
        actual: Size,
    },

    /// The compositor has been closed.
    #[error("compositor is closed")]
    Closed,

    /// Terminal I/O failed while flushing a frame.
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for compositor operations.
pub type Result<T> = std::result::Result<T, Error>;
