// SPDX-License-Identifier: MIT
//
// n-comp: a terminal window compositor.
//
// Applications hand the compositor rectangular drawables. It keeps them in
// a tree of containers with z-order and focus, composites their cell grids
// into a back buffer, and writes only the cells that differ from what the
// terminal already shows.
//
//   geometry  → Point, Size, Rect
//   cell      → one terminal cell: glyph, colors, attributes, width
//   grid      → a rectangle of cells, with wide-character repair
//   drawable  → the Drawable trait, ids, Solid and Canvas
//   tree      → the arena of nodes (private)
//   diff      → back/front diff and the sink writer
//   sink      → TerminalSink, the ANSI sink, the virtual terminal
//   events    → EventSink for register/unregister/focus notifications
//   config    → bounds policy, container policy, output options
//   compositor → the public face: locks, render pipeline, API

pub mod cell;
pub mod compositor;
pub mod config;
pub mod diff;
pub mod drawable;
pub mod error;
pub mod events;
pub mod geometry;
pub mod grid;
pub mod sink;
mod tree;

pub use cell::Cell;
pub use compositor::{Compositor, RenderStats};
pub use config::{BoundsPolicy, CompositorConfig, ContainerPolicy};
pub use drawable::{Canvas, CursorMode, Drawable, DrawableId, Solid};
pub use error::{Error, Result};
pub use events::{ChannelEvents, CompositorEvent, EventSink, NullEvents};
pub use geometry::{Point, Rect, Size};
pub use grid::Grid;
pub use sink::{AnsiSink, SinkOp, TerminalSink, VirtualTerminal};

pub use n_term::{Attr, CellColor};
