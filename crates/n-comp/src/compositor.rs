// SPDX-License-Identifier: MIT
//
// Compositor: the drawable tree bound to one terminal.
//
// The compositor owns a root container the size of the terminal, a back
// buffer (the frame being built) and a front buffer (the frame last
// written). A render pass over a rect:
//
//   1. takes the render lock for the whole pass
//   2. follows a terminal resize, widening the pass to the whole screen
//   3. clips the request to the terminal
//   4. blanks that region of the back buffer
//   5. snapshots what paints there from the tree, under the tree lock
//   6. asks each drawable for its grid, bottom first, and blits it in
//   7. diffs back against front over the whole terminal
//   8. stops here if nothing changed
//   9. writes the changes through the sink
//  10. copies back over front
//  11. parks the hardware cursor for the focused drawable
//
// Locks, always taken in this order and never the other way round:
//
//   render  → sink, buffers, cursor state; held for a whole pass
//   tree    → the arena; held only to read or mutate it, never across a
//             call into a drawable or the event sink
//   events  → the event sink; independent of the other two. A render
//             broadcasts what it detached only after releasing the
//             render lock, and so does `close`
//
// A drawable may mutate the tree from inside `render_grid`. The mutation's
// render request finds the render lock already owned by its own thread,
// so it is queued as pending damage and the running render repaints it
// before returning.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::cell::Cell;
use crate::config::{CompositorConfig, ContainerPolicy};
use crate::diff::{self, CursorState};
use crate::drawable::{CursorMode, Drawable, DrawableId};
use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::geometry::{Point, Rect, Size};
use crate::grid::Grid;
use crate::sink::TerminalSink;
use crate::tree::{Outcome, Tree};

/// Upper bound on passes in one render call. Each pass beyond the first
/// is driven by damage queued during the previous one.
const MAX_PASSES: usize = 16;

/// A rect that covers any terminal.
const EVERYWHERE: Rect = Rect::new(0, 0, u16::MAX, u16::MAX);

// ─── RenderStats ────────────────────────────────────────────────────────────

/// Counts from the most recent render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    /// Cells written to the sink.
    pub cells_written: usize,
    /// Cells that matched the front buffer and were not written.
    pub cells_skipped: usize,
    /// Explicit cursor moves, including the one parking the cursor.
    pub cursor_moves: usize,
    /// Passes run, including repaints of queued damage.
    pub passes: usize,
}

// ─── State ──────────────────────────────────────────────────────────────────

struct RenderState {
    sink: Box<dyn TerminalSink>,
    size: Size,
    back: Grid,
    front: Grid,
    /// False until the first frame, after `force_redraw`, and after a
    /// failed flush: the terminal's contents are unknown.
    front_valid: bool,
    cursor: CursorState,
    stats: RenderStats,
}

#[derive(Default)]
struct Pending {
    /// Thread currently running a render.
    owner: Option<ThreadId>,
    damage: Vec<Rect>,
}

/// Clears the pending owner when a render ends, however it ends.
struct OwnerGuard<'a>(&'a Mutex<Pending>);

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        lock(self.0).owner = None;
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Violation {
    id: DrawableId,
    expected: Size,
    actual: Size,
}

/// Where the cursor should be after a pass. `None` hides it.
type WantedCursor = Option<Point>;

// ─── Compositor ─────────────────────────────────────────────────────────────

/// A drawable tree composited onto one terminal.
///
/// Every method takes `&self`; share the compositor between threads with
/// an `Arc`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use n_comp::cell::Cell;
/// use n_comp::compositor::Compositor;
/// use n_comp::config::CompositorConfig;
/// use n_comp::drawable::Solid;
/// use n_comp::events::NullEvents;
/// use n_comp::geometry::{Rect, Size};
/// use n_comp::sink::VirtualTerminal;
///
/// let vt = VirtualTerminal::new(Size::new(4, 2));
/// let comp = Compositor::new(vt.clone(), NullEvents, CompositorConfig::default());
///
/// let a = comp.create_leaf(Rect::new(0, 0, 4, 2), Arc::new(Solid::new(Cell::from_char('A')))).unwrap();
/// let b = comp.create_leaf(Rect::new(1, 0, 2, 2), Arc::new(Solid::new(Cell::from_char('B')))).unwrap();
/// comp.attach(comp.root(), a).unwrap();
/// comp.attach(comp.root(), b).unwrap();
///
/// assert_eq!(vt.screen_lines(), vec!["ABBA", "ABBA"]);
/// ```
pub struct Compositor {
    render: Mutex<RenderState>,
    tree: Mutex<Tree>,
    events: Mutex<Box<dyn EventSink>>,
    pending: Mutex<Pending>,
    closed: AtomicBool,
    root: DrawableId,
    config: CompositorConfig,
}

impl Compositor {
    /// Bind a new compositor to `sink`. Nothing is written until the first
    /// render.
    pub fn new(
        sink: impl TerminalSink + 'static,
        events: impl EventSink + 'static,
        config: CompositorConfig,
    ) -> Self {
        let size = sink.size();
        let tree = Tree::new(size, config.root);
        let root = tree.root();
        tracing::debug!(%size, ?config, "compositor created");
        Self {
            render: Mutex::new(RenderState {
                sink: Box::new(sink),
                size,
                back: Grid::new(size),
                front: Grid::new(size),
                front_valid: false,
                cursor: CursorState::default(),
                stats: RenderStats::default(),
            }),
            tree: Mutex::new(tree),
            events: Mutex::new(Box::new(events)),
            pending: Mutex::new(Pending::default()),
            closed: AtomicBool::new(false),
            root,
            config,
        }
    }

    /// The root container, always the size of the terminal.
    #[must_use]
    pub const fn root(&self) -> DrawableId {
        self.root
    }

    #[must_use]
    pub const fn config(&self) -> &CompositorConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        lock(&self.tree)
    }

    fn strict(&self) -> bool {
        self.config.bounds.is_strict()
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Register a detached leaf. It paints nothing until attached.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after `close`.
    pub fn create_leaf(&self, rect: Rect, content: Arc<dyn Drawable>) -> Result<DrawableId> {
        self.ensure_open()?;
        let id = self.tree().insert_leaf(rect, content);
        tracing::debug!(%id, %rect, "leaf created");
        Ok(id)
    }

    /// Register a detached container, optionally with background content
    /// painted beneath its children.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after `close`.
    pub fn create_container(
        &self,
        rect: Rect,
        background: Option<Arc<dyn Drawable>>,
        policy: ContainerPolicy,
    ) -> Result<DrawableId> {
        self.ensure_open()?;
        let id = self.tree().insert_container(rect, background, policy);
        tracing::debug!(%id, %rect, "container created");
        Ok(id)
    }

    /// Release a detached drawable. Its id is never issued again.
    ///
    /// # Errors
    ///
    /// [`Error::StillAttached`] if it has a parent.
    pub fn forget(&self, id: DrawableId) -> Result<()> {
        self.ensure_open()?;
        self.tree().forget(id)?;
        tracing::debug!(%id, "forgotten");
        Ok(())
    }

    /// Detach everything and refuse further calls. Waits for a render in
    /// progress. Calling it again does nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Inside a render on this thread the render lock is already ours.
        let owner = lock(&self.pending).owner;
        let ids = {
            let _render = (owner != Some(thread::current().id())).then(|| lock(&self.render));
            self.tree().detach_all()
        };
        let mut events = lock(&self.events);
        for &id in &ids {
            events.unregister(id);
        }
        tracing::debug!(detached = ids.len(), "compositor closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ─── Tree mutation ──────────────────────────────────────────────────

    /// Insert `drawable` into `container` per the container's policy and
    /// repaint its footprint.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyAttached`], [`Error::NotAContainer`],
    /// [`Error::CycleDetected`], [`Error::OutOfBounds`] (strict mode), or
    /// any render error.
    pub fn attach(&self, container: DrawableId, drawable: DrawableId) -> Result<()> {
        self.ensure_open()?;
        let content = self.tree().content(drawable)?;
        let focusable = content.is_none_or(|c| c.is_focusable());
        let outcome = self
            .tree()
            .attach(container, drawable, self.strict(), focusable)?;
        tracing::debug!(%container, %drawable, "attached");
        self.settle(outcome)
    }

    /// Remove `drawable` from its container and repaint where it was.
    ///
    /// # Errors
    ///
    /// [`Error::NotAttached`] if it has no parent, or any render error.
    pub fn detach(&self, drawable: DrawableId) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.tree().detach(drawable)?;
        tracing::debug!(%drawable, "detached");
        self.settle(outcome)
    }

    /// Bring `drawable` to the front of its container and focus it.
    ///
    /// # Errors
    ///
    /// [`Error::NotAttached`] if it has no parent, or any render error.
    pub fn set_focus(&self, drawable: DrawableId) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.tree().set_focus(drawable)?;
        tracing::debug!(%drawable, "focused");
        self.settle(outcome)
    }

    /// Leave `container` without a focused child.
    ///
    /// # Errors
    ///
    /// [`Error::NotAContainer`], or any render error.
    pub fn clear_focus(&self, container: DrawableId) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.tree().clear_focus(container)?;
        tracing::debug!(%container, "focus cleared");
        self.settle(outcome)
    }

    /// Move `drawable` to z-index `index` (clamped) in its container.
    ///
    /// # Errors
    ///
    /// [`Error::NotAttached`] if it has no parent, or any render error.
    pub fn set_depth(&self, drawable: DrawableId, index: usize) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.tree().set_depth(drawable, index)?;
        tracing::debug!(%drawable, index, "depth changed");
        self.settle(outcome)
    }

    /// Move `drawable` to the top of its container.
    ///
    /// # Errors
    ///
    /// As [`set_depth`](Self::set_depth).
    pub fn raise(&self, drawable: DrawableId) -> Result<()> {
        self.set_depth(drawable, 0)
    }

    /// Move `drawable` to the bottom of its container.
    ///
    /// # Errors
    ///
    /// As [`set_depth`](Self::set_depth).
    pub fn lower(&self, drawable: DrawableId) -> Result<()> {
        self.set_depth(drawable, usize::MAX)
    }

    /// Replace `drawable`'s rect, relative to its parent. A size change
    /// reaches the drawable's `will_resize` before anything is repainted.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfBounds`] in strict mode, or any render error.
    pub fn set_rect(&self, drawable: DrawableId, rect: Rect) -> Result<()> {
        self.ensure_open()?;
        let (old, content) = {
            let tree = self.tree();
            (
                tree.check_rect(drawable, rect, self.strict())?,
                tree.content(drawable)?,
            )
        };
        if old.size != rect.size {
            if let Some(content) = &content {
                content.will_resize(old.size, rect.size);
            }
        }
        let outcome = self.tree().set_rect(drawable, rect, self.strict())?;
        tracing::debug!(%drawable, from = %old, to = %rect, "rect changed");
        self.settle(outcome)
    }

    /// Move `drawable` to `origin`, keeping its size.
    ///
    /// # Errors
    ///
    /// As [`set_rect`](Self::set_rect).
    pub fn move_to(&self, drawable: DrawableId, origin: Point) -> Result<()> {
        let rect = self.rect(drawable)?;
        self.set_rect(drawable, Rect { origin, ..rect })
    }

    /// Resize `drawable`, keeping its origin.
    ///
    /// # Errors
    ///
    /// As [`set_rect`](Self::set_rect).
    pub fn resize(&self, drawable: DrawableId, size: Size) -> Result<()> {
        let rect = self.rect(drawable)?;
        self.set_rect(drawable, Rect { size, ..rect })
    }

    /// Tell sinks and drawables what a tree mutation changed, then repaint.
    fn settle(&self, outcome: Outcome) -> Result<()> {
        self.broadcast(&outcome);
        if outcome.damage.is_empty() && outcome.focus.is_some() {
            // Nothing to repaint, but the cursor may have a new owner.
            return self.render(Rect::default());
        }
        for rect in outcome.damage {
            self.render(rect)?;
        }
        Ok(())
    }

    fn broadcast(&self, outcome: &Outcome) {
        if outcome.registered.is_empty()
            && outcome.unregistered.is_empty()
            && outcome.focus.is_none()
        {
            return;
        }
        let recipients = if outcome.focus.is_some() {
            self.tree().live()
        } else {
            Vec::new()
        };
        let mut events = lock(&self.events);
        for &id in &outcome.unregistered {
            events.unregister(id);
        }
        for &id in &outcome.registered {
            events.register(id);
        }
        if let Some(change) = outcome.focus {
            events.focus_changed(change.target, &recipients);
        }
    }

    // ─── Queries ────────────────────────────────────────────────────────

    /// `drawable`'s rect relative to its parent.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownDrawable`].
    pub fn rect(&self, drawable: DrawableId) -> Result<Rect> {
        self.ensure_open()?;
        self.tree().rect(drawable)
    }

    /// `drawable`'s rect in terminal coordinates.
    ///
    /// # Errors
    ///
    /// [`Error::NotAttached`] if it is not reachable from the root.
    pub fn absolute_rect(&self, drawable: DrawableId) -> Result<Rect> {
        self.ensure_open()?;
        self.tree().absolute_rect(drawable)
    }

    /// A point relative to `drawable`, in terminal coordinates.
    ///
    /// # Errors
    ///
    /// As [`absolute_rect`](Self::absolute_rect).
    pub fn absolute_point(&self, drawable: DrawableId, p: Point) -> Result<Point> {
        Ok(self.absolute_rect(drawable)?.origin + p)
    }

    /// # Errors
    ///
    /// [`Error::UnknownDrawable`].
    pub fn parent(&self, drawable: DrawableId) -> Result<Option<DrawableId>> {
        self.ensure_open()?;
        self.tree().parent(drawable)
    }

    /// Children of `container`, topmost first.
    ///
    /// # Errors
    ///
    /// [`Error::NotAContainer`].
    pub fn children(&self, container: DrawableId) -> Result<Vec<DrawableId>> {
        self.ensure_open()?;
        self.tree().children(container)
    }

    /// Z-index within the parent; 0 is topmost.
    ///
    /// # Errors
    ///
    /// [`Error::NotAttached`].
    pub fn depth(&self, drawable: DrawableId) -> Result<usize> {
        self.ensure_open()?;
        self.tree().depth(drawable)
    }

    /// The focused child of `container`.
    ///
    /// # Errors
    ///
    /// [`Error::NotAContainer`].
    pub fn focused(&self, container: DrawableId) -> Result<Option<DrawableId>> {
        self.ensure_open()?;
        self.tree().focused(container)
    }

    /// The end of the focus path from the root: the drawable that owns the
    /// cursor.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`].
    pub fn focused_leaf(&self) -> Result<Option<DrawableId>> {
        self.ensure_open()?;
        Ok(self.tree().focused_leaf())
    }

    /// Whether `drawable` is reachable from the root.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`].
    pub fn is_attached(&self, drawable: DrawableId) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.tree().is_live(drawable))
    }

    /// The topmost drawable painting the terminal cell at `p`.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`].
    pub fn drawable_at(&self, p: Point) -> Result<Option<DrawableId>> {
        self.ensure_open()?;
        Ok(self.tree().drawable_at(p))
    }

    // ─── Rendering ──────────────────────────────────────────────────────

    /// Repaint everything under `rect` (terminal coordinates) and bring the
    /// terminal up to date.
    ///
    /// Called from inside a drawable's `render_grid`, the request is queued
    /// and handled by the render already running on this thread.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfBounds`] in strict mode when `rect` misses the
    ///   terminal.
    /// - [`Error::RenderContract`] when a drawable returned a grid of the
    ///   wrong size. It has been detached and the frame is still complete.
    /// - [`Error::Io`] when the sink fails. Nothing is retried.
    pub fn render(&self, rect: Rect) -> Result<()> {
        self.ensure_open()?;
        let me = thread::current().id();
        {
            let mut pending = lock(&self.pending);
            if pending.owner == Some(me) {
                pending.damage.push(rect);
                return Ok(());
            }
        }
        let mut detached = Vec::new();
        let rendered = {
            let mut state = lock(&self.render);
            lock(&self.pending).owner = Some(me);
            let _owner = OwnerGuard(&self.pending);
            self.render_locked(&mut state, rect, &mut detached)
        };
        for outcome in &detached {
            self.broadcast(outcome);
        }
        rendered
    }

    /// Repaint the whole terminal.
    ///
    /// # Errors
    ///
    /// As [`render`](Self::render).
    pub fn render_all(&self) -> Result<()> {
        self.render(EVERYWHERE)
    }

    /// Forget what the terminal shows and rewrite every cell.
    ///
    /// # Errors
    ///
    /// As [`render`](Self::render).
    pub fn force_redraw(&self) -> Result<()> {
        self.ensure_open()?;
        {
            let mut state = lock(&self.render);
            state.front_valid = false;
            state.cursor.invalidate();
        }
        self.render_all()
    }

    /// A copy of the front buffer: what the terminal shows.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`].
    pub fn snapshot(&self) -> Result<Grid> {
        self.ensure_open()?;
        Ok(lock(&self.render).front.clone())
    }

    /// Counts from the most recent render call.
    #[must_use]
    pub fn stats(&self) -> RenderStats {
        lock(&self.render).stats
    }

    /// Runs passes until no damage is left. Offenders detached along the
    /// way land in `detached`, to be broadcast once the render lock is free.
    fn render_locked(
        &self,
        state: &mut RenderState,
        rect: Rect,
        detached: &mut Vec<Outcome>,
    ) -> Result<()> {
        let mut stats = RenderStats::default();
        let mut violation = None;
        let mut request = Some(rect);

        if self.strict() && !rect.is_empty() {
            let bounds = Rect::from_size(state.sink.size());
            if !bounds.is_empty() && !rect.intersects(bounds) {
                return Err(Error::OutOfBounds { rect, bounds });
            }
        }

        while let Some(rect) = request.take() {
            if stats.passes == MAX_PASSES {
                tracing::warn!(%rect, "render kept producing damage; deferring the rest");
                lock(&self.pending).damage.push(rect);
                break;
            }
            stats.passes += 1;
            let violations = self.pass(state, rect, &mut stats)?;

            let mut damage = Vec::new();
            for v in violations {
                tracing::error!(
                    id = %v.id,
                    expected = %v.expected,
                    actual = %v.actual,
                    "drawable rendered the wrong size; detaching it"
                );
                let outcome = self.tree().detach(v.id);
                match outcome {
                    Ok(outcome) => {
                        damage.extend(outcome.damage.iter().copied());
                        detached.push(outcome);
                    }
                    Err(err) => tracing::debug!(id = %v.id, %err, "offender already gone"),
                }
                violation.get_or_insert(Error::RenderContract {
                    id: v.id,
                    expected: v.expected,
                    actual: v.actual,
                });
            }

            let queued = self.take_pending();
            request = damage.into_iter().chain(queued).reduce(Rect::union);
        }

        state.stats = stats;
        violation.map_or(Ok(()), Err)
    }

    fn take_pending(&self) -> Option<Rect> {
        let queued = std::mem::take(&mut lock(&self.pending).damage);
        queued.into_iter().reduce(Rect::union)
    }

    /// One pass over `request`: compose, diff, write. Returns the drawables
    /// that broke the size contract.
    fn pass(
        &self,
        state: &mut RenderState,
        request: Rect,
        stats: &mut RenderStats,
    ) -> Result<Vec<Violation>> {
        let size = state.sink.size();
        let mut request = request;
        if size != state.size {
            tracing::debug!(from = %state.size, to = %size, "terminal resized");
            state.back.resize(size, &Cell::blank());
            state.front.resize(size, &Cell::blank());
            state.size = size;
            self.tree().set_root_size(size);
            request = Rect::from_size(size);
        }
        if !state.front_valid {
            request = Rect::from_size(size);
        }

        let violations = match request.intersection(Rect::from_size(size)) {
            Some(target) => self.compose(state, target),
            None => Vec::new(),
        };

        let changes = if state.front_valid {
            diff::changes(&state.back, &state.front)
        } else {
            diff::all_cells(&state.back)
        };
        let wanted = self.wanted_cursor(size);
        tracing::trace!(%request, changed = changes.len(), "diffed");

        stats.cells_skipped += size.area().saturating_sub(changes.len());
        if changes.is_empty() && !cursor_outdated(&state.cursor, wanted) {
            return Ok(violations);
        }

        let sync = self.config.synchronized_output;
        let written = emit(state, &changes, wanted, sync);
        match written {
            Ok(flushed) => {
                stats.cells_written += flushed.cells_written;
                stats.cursor_moves += flushed.cursor_moves;
                state.front.copy_from(&state.back);
                state.front_valid = true;
                Ok(violations)
            }
            Err(err) => {
                state.front_valid = false;
                state.cursor.invalidate();
                Err(err.into())
            }
        }
    }

    /// Steps 4 to 6: repaint `target` of the back buffer from the tree.
    fn compose(&self, state: &mut RenderState, target: Rect) -> Vec<Violation> {
        // A layer change can break or restore a double-width pair one
        // column outside the request, so the update grows by a column. The
        // scratch carries two more columns of context on each side, so a
        // pair cut by the scratch edge never reaches the copy.
        let bounds = state.back.bounds();
        let update = grow_columns(target, bounds);
        let scratch_rect = grow_columns(grow_columns(update, bounds), bounds);
        let mut scratch = Grid::new(scratch_rect.size);

        let plan = self.tree().paint_plan(scratch_rect);
        let mut violations = Vec::new();
        for item in plan {
            let grid = item.content.render_grid(item.rect.size);
            if grid.size() != item.rect.size {
                violations.push(Violation {
                    id: item.id,
                    expected: item.rect.size,
                    actual: grid.size(),
                });
                continue;
            }
            let src = item.clip.translate(Point::ORIGIN - item.rect.origin);
            let at = item.clip.origin - scratch_rect.origin;
            Grid::blit(at, &mut scratch, src, &grid);
        }

        let local = update.translate(Point::ORIGIN - scratch_rect.origin);
        for row in pair_safe_rows(&scratch, local) {
            Grid::blit(row.origin + scratch_rect.origin, &mut state.back, row, &scratch);
        }
        violations
    }

    /// Where the focused drawable wants the cursor, if it wants it shown.
    fn wanted_cursor(&self, size: Size) -> WantedCursor {
        let focus = {
            let tree = self.tree();
            tree.focused_leaf().and_then(|id| {
                let rect = tree.absolute_rect(id).ok()?;
                let content = tree.content(id).ok()??;
                Some((rect, content))
            })
        };
        let (rect, content) = focus?;
        if content.cursor_mode() != CursorMode::TerminalRendered {
            return None;
        }
        let at = rect.origin + content.cursor_resting_point();
        Rect::from_size(size).contains_point(at).then_some(at)
    }

    // ─── Boundary glue ──────────────────────────────────────────────────

    /// The session layer saw the terminal change size. The sink's own
    /// report stays authoritative; this just repaints everything.
    ///
    /// # Errors
    ///
    /// As [`render`](Self::render).
    pub fn notify_resize(&self, size: Size) -> Result<()> {
        self.ensure_open()?;
        lock(&self.render).sink.resized(size);
        tracing::debug!(%size, "resize notified");
        self.render_all()
    }

    /// Write to the terminal directly, between frames. The cursor position
    /// is re-established by the next render.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] from `f` or the flush after it, including
    /// `WouldBlock` when called from inside a render on the same thread.
    pub fn with_terminal<R>(
        &self,
        f: impl FnOnce(&mut dyn TerminalSink) -> io::Result<R>,
    ) -> Result<R> {
        self.ensure_open()?;
        if lock(&self.pending).owner == Some(thread::current().id()) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                "terminal is busy with a render on this thread",
            )));
        }
        let mut state = lock(&self.render);
        let value = f(state.sink.as_mut());
        state.cursor.invalidate();
        let flushed = state.sink.flush();
        let value = value?;
        flushed?;
        Ok(value)
    }
}

// ─── Pass helpers ───────────────────────────────────────────────────────────

/// Steps 9 and 11: write the changes and park the cursor, in one frame.
fn emit(
    state: &mut RenderState,
    changes: &diff::Changes,
    wanted: WantedCursor,
    sync: bool,
) -> io::Result<diff::FlushStats> {
    let sink = state.sink.as_mut();
    sink.begin_frame(sync)?;
    let mut stats = diff::flush(changes, sink, &mut state.cursor)?;
    stats.cursor_moves += park_cursor(sink, &mut state.cursor, wanted)?;
    sink.end_frame(sync)?;
    sink.flush()?;
    Ok(stats)
}

fn cursor_outdated(cursor: &CursorState, wanted: WantedCursor) -> bool {
    match wanted {
        Some(at) => cursor.at != Some(at) || cursor.visible != Some(true),
        None => cursor.visible != Some(false),
    }
}

/// Returns the number of cursor moves written.
fn park_cursor(
    sink: &mut dyn TerminalSink,
    cursor: &mut CursorState,
    wanted: WantedCursor,
) -> io::Result<usize> {
    let mut moves = 0;
    match wanted {
        Some(at) => {
            if cursor.at != Some(at) {
                sink.set_cursor_position(at)?;
                cursor.at = Some(at);
                moves += 1;
            }
            if cursor.visible != Some(true) {
                sink.set_cursor_visible(true)?;
                cursor.visible = Some(true);
            }
        }
        None => {
            if cursor.visible != Some(false) {
                sink.set_cursor_visible(false)?;
                cursor.visible = Some(false);
            }
        }
    }
    Ok(moves)
}

/// `rect` plus one column on each side, within `bounds`.
fn grow_columns(rect: Rect, bounds: Rect) -> Rect {
    Rect::new(rect.min_x() - 1, rect.min_y(), rect.width().saturating_add(2), rect.height())
        .intersection(bounds)
        .unwrap_or(rect)
}

/// The rows of `rect`, each grown sideways on its own so it never splits
/// a double-width pair of `grid`. `rect` must lie inside `grid`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pair_safe_rows(grid: &Grid, rect: Rect) -> Vec<Rect> {
    if rect.is_empty() {
        return Vec::new();
    }
    let first = rect.min_x() as u16;
    let last = (rect.max_x() - 1) as u16;
    (rect.min_y()..rect.max_y())
        .map(|y| {
            let row = y as u16;
            let left = first > 0 && grid.get(first, row).is_some_and(Cell::is_continuation);
            let right =
                last + 1 < grid.width() && grid.get(last, row).is_some_and(Cell::is_wide);
            Rect::new(
                rect.min_x() - i32::from(left),
                y,
                rect.width() + u16::from(left) + u16::from(right),
                1,
            )
        })
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawable::{Canvas, Solid};
    use crate::events::{ChannelEvents, CompositorEvent, NullEvents};
    use crate::sink::{SinkOp, VirtualTerminal};
    use pretty_assertions::assert_eq;
    use std::sync::{OnceLock, Weak};

    fn solid(ch: char) -> Arc<dyn Drawable> {
        Arc::new(Solid::new(Cell::from_char(ch)))
    }

    fn setup(width: u16, height: u16) -> (Compositor, VirtualTerminal) {
        let vt = VirtualTerminal::new(Size::new(width, height));
        let comp = Compositor::new(vt.clone(), NullEvents, CompositorConfig::default());
        (comp, vt)
    }

    // ── Widening ────────────────────────────────────────────────────────

    #[test]
    fn rows_widen_only_where_a_pair_is_split() {
        let mut grid = Grid::new(Size::new(6, 3));
        grid.set(0, 0, Cell::from_char('中'));
        grid.set(3, 0, Cell::from_char('中'));
        grid.set(3, 2, Cell::from_char('中'));
        assert_eq!(
            pair_safe_rows(&grid, Rect::new(1, 0, 3, 3)),
            vec![Rect::new(0, 0, 5, 1), Rect::new(1, 1, 3, 1), Rect::new(1, 2, 4, 1)]
        );
        assert_eq!(pair_safe_rows(&grid, Rect::new(2, 0, 1, 1)), vec![Rect::new(2, 0, 1, 1)]);
        assert!(pair_safe_rows(&grid, Rect::new(2, 0, 0, 3)).is_empty());
    }

    // ── Pipeline ────────────────────────────────────────────────────────

    #[test]
    fn first_render_writes_every_cell() {
        let (comp, vt) = setup(3, 2);
        comp.render_all().unwrap();
        let glyphs = vt.ops().iter().filter(|op| matches!(op, SinkOp::Glyph(_))).count();
        assert_eq!(glyphs, 6);
        assert_eq!(comp.stats().cells_written, 6);
    }

    #[test]
    fn frame_is_wrapped_and_flushed_once() {
        let (comp, vt) = setup(2, 1);
        comp.render_all().unwrap();
        let ops = vt.ops();
        assert_eq!(ops.first(), Some(&SinkOp::BeginFrame));
        assert_eq!(&ops[ops.len() - 2..], &[SinkOp::EndFrame, SinkOp::Flush]);
        assert_eq!(ops.iter().filter(|op| **op == SinkOp::Flush).count(), 1);
    }

    #[test]
    fn stats_count_written_and_skipped() {
        let (comp, _vt) = setup(4, 2);
        comp.render_all().unwrap();
        let a = comp.create_leaf(Rect::new(0, 0, 2, 1), solid('a')).unwrap();
        comp.attach(comp.root(), a).unwrap();
        let stats = comp.stats();
        assert_eq!(stats.cells_written, 2);
        assert_eq!(stats.cells_skipped, 6);
        assert_eq!(stats.passes, 1);
    }

    #[test]
    fn nested_containers_clip_children() {
        let (comp, vt) = setup(6, 3);
        let c = comp
            .create_container(Rect::new(1, 1, 3, 2), Some(solid('.')), ContainerPolicy::default())
            .unwrap();
        let a = comp.create_leaf(Rect::new(1, 0, 5, 1), solid('#')).unwrap();
        comp.attach(c, a).unwrap();
        comp.attach(comp.root(), c).unwrap();
        assert_eq!(vt.screen_lines(), vec!["      ", " .##  ", " ...  "]);
    }

    #[test]
    fn resize_moves_content_and_repaints_union() {
        let (comp, vt) = setup(5, 1);
        let canvas = Arc::new(Canvas::filled(Size::new(2, 1), Cell::from_char('c')));
        let id = comp.create_leaf(Rect::new(0, 0, 2, 1), canvas.clone()).unwrap();
        comp.attach(comp.root(), id).unwrap();

        comp.set_rect(id, Rect::new(1, 0, 3, 1)).unwrap();
        assert_eq!(canvas.size(), Size::new(3, 1));
        assert_eq!(vt.screen_lines(), vec![" ccc "]);

        comp.move_to(id, Point::new(2, 0)).unwrap();
        assert_eq!(vt.screen_lines(), vec!["  ccc"]);
    }

    #[test]
    fn detach_restores_pair_beside_footprint() {
        let (comp, vt) = setup(4, 1);
        let lower = Arc::new(Canvas::new(Size::new(4, 1)));
        lower.print(1, 0, "中", &Cell::blank());
        let lower_id = comp.create_leaf(Rect::new(0, 0, 4, 1), lower).unwrap();
        let upper = comp.create_leaf(Rect::new(2, 0, 1, 1), solid('u')).unwrap();
        comp.attach(comp.root(), lower_id).unwrap();
        comp.attach(comp.root(), upper).unwrap();
        assert_eq!(vt.screen_lines(), vec!["  u "]);

        comp.detach(upper).unwrap();
        assert_eq!(vt.screen_lines(), vec![" 中 "]);
        assert_eq!(comp.snapshot().unwrap(), vt.screen());
    }

    #[test]
    fn focused_terminal_cursor_is_parked() {
        let (comp, vt) = setup(10, 5);
        let canvas = Arc::new(Canvas::new(Size::new(4, 2)));
        canvas.set_cursor(Point::new(1, 1), CursorMode::TerminalRendered);
        let id = comp.create_leaf(Rect::new(3, 2, 4, 2), canvas).unwrap();
        comp.attach(comp.root(), id).unwrap();
        assert_eq!(vt.cursor(), Point::new(4, 3));
        assert!(vt.cursor_visible());
    }

    #[test]
    fn hidden_cursor_mode_hides() {
        let (comp, vt) = setup(4, 2);
        let id = comp.create_leaf(Rect::new(0, 0, 1, 1), Arc::new(Canvas::new(Size::new(1, 1)))).unwrap();
        comp.attach(comp.root(), id).unwrap();
        assert!(!vt.cursor_visible());
    }

    #[test]
    fn cursor_only_change_still_renders() {
        let (comp, vt) = setup(6, 1);
        let left = Arc::new(Canvas::new(Size::new(3, 1)));
        let right = Arc::new(Canvas::new(Size::new(3, 1)));
        left.set_cursor(Point::new(0, 0), CursorMode::TerminalRendered);
        right.set_cursor(Point::new(2, 0), CursorMode::TerminalRendered);
        let l = comp.create_leaf(Rect::new(0, 0, 3, 1), left).unwrap();
        let r = comp.create_leaf(Rect::new(3, 0, 3, 1), right).unwrap();
        comp.attach(comp.root(), l).unwrap();
        comp.attach(comp.root(), r).unwrap();
        assert_eq!(vt.cursor(), Point::new(5, 0));

        vt.take_ops();
        comp.set_focus(l).unwrap();
        assert_eq!(vt.cursor(), Point::new(0, 0));
        assert!(!vt.ops().iter().any(|op| matches!(op, SinkOp::Glyph(_))));
    }

    // ── Events ──────────────────────────────────────────────────────────

    #[test]
    fn events_follow_live_subtrees() {
        let vt = VirtualTerminal::new(Size::new(4, 4));
        let (events, rx) = ChannelEvents::new();
        let comp = Compositor::new(vt, events, CompositorConfig::default());
        let a = comp.create_leaf(Rect::new(0, 0, 1, 1), Arc::new(Canvas::new(Size::new(1, 1)))).unwrap();
        comp.attach(comp.root(), a).unwrap();
        comp.detach(a).unwrap();

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                CompositorEvent::Registered(a),
                CompositorEvent::FocusChanged {
                    target: Some(a),
                    recipients: vec![a],
                },
                CompositorEvent::Unregistered(a),
                CompositorEvent::FocusChanged {
                    target: None,
                    recipients: vec![],
                },
            ]
        );
    }

    /// Notes, at each unregistration, whether the render lock was free.
    struct LockWitness {
        comp: Arc<OnceLock<Weak<Compositor>>>,
        free: Arc<Mutex<Vec<bool>>>,
    }

    fn render_lock_free(comp: &Compositor) -> bool {
        comp.render.try_lock().is_ok()
    }

    impl EventSink for LockWitness {
        fn register(&mut self, _id: DrawableId) {}

        fn unregister(&mut self, _id: DrawableId) {
            let comp = self.comp.get().and_then(Weak::upgrade);
            let free = comp.is_some_and(|c| render_lock_free(&c));
            lock(&self.free).push(free);
        }

        fn focus_changed(&mut self, _target: Option<DrawableId>, _recipients: &[DrawableId]) {}
    }

    fn witnessed(width: u16, height: u16) -> (Arc<Compositor>, Arc<Mutex<Vec<bool>>>) {
        let slot = Arc::new(OnceLock::new());
        let free = Arc::new(Mutex::new(Vec::new()));
        let witness = LockWitness {
            comp: Arc::clone(&slot),
            free: Arc::clone(&free),
        };
        let vt = VirtualTerminal::new(Size::new(width, height));
        let comp = Arc::new(Compositor::new(vt, witness, CompositorConfig::default()));
        assert!(slot.set(Arc::downgrade(&comp)).is_ok());
        (comp, free)
    }

    /// Always answers with a single cell.
    struct OneCell;

    impl Drawable for OneCell {
        fn render_grid(&self, _size: Size) -> Grid {
            Grid::new(Size::new(1, 1))
        }
    }

    #[test]
    fn offender_unregistered_after_render_lock_is_released() {
        let (comp, free) = witnessed(4, 2);
        let bad = comp.create_leaf(Rect::new(0, 0, 3, 2), Arc::new(OneCell)).unwrap();
        let err = comp.attach(comp.root(), bad).unwrap_err();
        assert!(matches!(err, Error::RenderContract { id, .. } if id == bad));
        assert!(!comp.is_attached(bad).unwrap());
        assert_eq!(*lock(&free), vec![true]);
    }

    #[test]
    fn close_unregisters_after_render_lock_is_released() {
        let (comp, free) = witnessed(4, 2);
        let a = comp.create_leaf(Rect::new(0, 0, 1, 1), solid('a')).unwrap();
        comp.attach(comp.root(), a).unwrap();
        comp.close();
        assert_eq!(*lock(&free), vec![true]);
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    #[test]
    fn closed_compositor_refuses_calls() {
        let (comp, _vt) = setup(4, 4);
        let a = comp.create_leaf(Rect::new(0, 0, 1, 1), solid('a')).unwrap();
        comp.attach(comp.root(), a).unwrap();
        comp.close();
        comp.close();
        assert!(comp.is_closed());
        assert!(matches!(comp.render_all(), Err(Error::Closed)));
        assert!(matches!(comp.attach(comp.root(), a), Err(Error::Closed)));
        assert!(matches!(comp.create_leaf(Rect::default(), solid('b')), Err(Error::Closed)));
        assert!(matches!(comp.with_terminal(|_| Ok(())), Err(Error::Closed)));
    }

    #[test]
    fn close_detaches_and_unregisters() {
        let vt = VirtualTerminal::new(Size::new(4, 4));
        let (events, rx) = ChannelEvents::new();
        let comp = Compositor::new(vt, events, CompositorConfig::default());
        let a = comp.create_leaf(Rect::new(0, 0, 1, 1), solid('a')).unwrap();
        comp.attach(comp.root(), a).unwrap();
        rx.try_iter().for_each(drop);

        comp.close();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![CompositorEvent::Unregistered(a)]);
    }

    #[test]
    fn with_terminal_writes_between_frames() {
        let (comp, vt) = setup(2, 1);
        comp.render_all().unwrap();
        vt.take_ops();
        comp.with_terminal(|sink| sink.bell()).unwrap();
        assert_eq!(vt.take_ops(), vec![SinkOp::Bell, SinkOp::Flush]);
    }

    #[test]
    fn io_failure_propagates_and_next_render_repaints() {
        let (comp, vt) = setup(3, 1);
        comp.render_all().unwrap();
        let a = comp.create_leaf(Rect::new(0, 0, 1, 1), solid('a')).unwrap();

        vt.set_failing(true);
        assert!(matches!(comp.attach(comp.root(), a), Err(Error::Io(_))));

        vt.set_failing(false);
        comp.render(Rect::new(2, 0, 1, 1)).unwrap();
        assert_eq!(comp.stats().cells_written, 3);
        assert_eq!(vt.screen_lines(), vec!["a  "]);
    }
}
