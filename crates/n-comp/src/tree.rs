// SPDX-License-Identifier: MIT
//
// Drawable tree: an arena of nodes keyed by `DrawableId`.
//
// Parents are ids, not pointers: a node knows its parent's id and a
// container knows its children's ids, and the arena owns every node. That
// keeps the tree free of reference cycles and lets a detached subtree sit
// in the arena, intact, until it is attached again or forgotten.
//
// Z-order is the position in the parent's child list: index 0 is topmost.
// A node's depth is therefore never stored; it is looked up.
//
// Nothing in this module renders, locks, or calls into a drawable. Each
// mutation reports what the compositor has to do next (which absolute rect
// to repaint, which ids to register or unregister, whether focus moved),
// and the compositor does it after releasing the tree lock.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use crate::config::ContainerPolicy;
use crate::drawable::{Drawable, DrawableId};
use crate::error::{Error, Result};
use crate::geometry::{Point, Rect, Size};

// ─── Nodes ──────────────────────────────────────────────────────────────────

pub(crate) enum NodeKind {
    Leaf(Arc<dyn Drawable>),
    Container(ContainerState),
}

pub(crate) struct ContainerState {
    /// Painted beneath the children, if any.
    background: Option<Arc<dyn Drawable>>,
    /// Index 0 is topmost.
    children: Vec<DrawableId>,
    focus: Option<DrawableId>,
    policy: ContainerPolicy,
}

pub(crate) struct Node {
    /// Relative to the parent's origin.
    rect: Rect,
    parent: Option<DrawableId>,
    kind: NodeKind,
}

impl Node {
    fn content(&self) -> Option<&Arc<dyn Drawable>> {
        match &self.kind {
            NodeKind::Leaf(content) => Some(content),
            NodeKind::Container(state) => state.background.as_ref(),
        }
    }
}

// ─── Mutation outcomes ──────────────────────────────────────────────────────

/// Focus moved inside a container; `target` is the new holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FocusChange {
    pub(crate) target: Option<DrawableId>,
}

/// Follow-up work after a tree mutation.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    /// Absolute rects to repaint. Empty when the subtree is not live.
    pub(crate) damage: Vec<Rect>,
    pub(crate) registered: Vec<DrawableId>,
    pub(crate) unregistered: Vec<DrawableId>,
    /// Only reported for live containers.
    pub(crate) focus: Option<FocusChange>,
}

/// One drawable to paint in a render pass, in painter's order.
pub(crate) struct PaintItem {
    pub(crate) id: DrawableId,
    pub(crate) content: Arc<dyn Drawable>,
    /// The drawable's absolute rect.
    pub(crate) rect: Rect,
    /// The part of `rect` this pass may touch. Never empty.
    pub(crate) clip: Rect,
}

// ─── Tree ───────────────────────────────────────────────────────────────────

pub(crate) struct Tree {
    nodes: HashMap<DrawableId, Node>,
    root: DrawableId,
    next: NonZeroU64,
}

impl Tree {
    pub(crate) fn new(size: Size, policy: ContainerPolicy) -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            root: DrawableId::from_raw(NonZeroU64::MIN),
            next: NonZeroU64::MIN,
        };
        tree.root = tree.insert_container(Rect::from_size(size), None, policy);
        tree
    }

    pub(crate) const fn root(&self) -> DrawableId {
        self.root
    }

    fn allocate(&mut self) -> DrawableId {
        let id = DrawableId::from_raw(self.next);
        self.next = self.next.saturating_add(1);
        id
    }

    /// Register a detached leaf.
    pub(crate) fn insert_leaf(&mut self, rect: Rect, content: Arc<dyn Drawable>) -> DrawableId {
        self.insert(rect, NodeKind::Leaf(content))
    }

    /// Register a detached container with optional background content.
    pub(crate) fn insert_container(
        &mut self,
        rect: Rect,
        background: Option<Arc<dyn Drawable>>,
        policy: ContainerPolicy,
    ) -> DrawableId {
        self.insert(
            rect,
            NodeKind::Container(ContainerState {
                background,
                children: Vec::new(),
                focus: None,
                policy,
            }),
        )
    }

    fn insert(&mut self, rect: Rect, kind: NodeKind) -> DrawableId {
        let id = self.allocate();
        self.nodes.insert(id, Node { rect, parent: None, kind });
        id
    }

    /// Drop a detached node. A forgotten container's children become
    /// detached roots of their own subtrees.
    pub(crate) fn forget(&mut self, id: DrawableId) -> Result<()> {
        let node = self.node(id)?;
        if node.parent.is_some() || id == self.root {
            return Err(Error::StillAttached(id));
        }
        if let Some(Node {
            kind: NodeKind::Container(state),
            ..
        }) = self.nodes.remove(&id)
        {
            for child in state.children {
                if let Some(node) = self.nodes.get_mut(&child) {
                    node.parent = None;
                }
            }
        }
        Ok(())
    }

    // ─── Lookups ────────────────────────────────────────────────────────

    fn node(&self, id: DrawableId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(Error::UnknownDrawable(id))
    }

    fn node_mut(&mut self, id: DrawableId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(Error::UnknownDrawable(id))
    }

    fn container(&self, id: DrawableId) -> Result<&ContainerState> {
        match &self.node(id)?.kind {
            NodeKind::Container(state) => Ok(state),
            NodeKind::Leaf(_) => Err(Error::NotAContainer(id)),
        }
    }

    fn container_mut(&mut self, id: DrawableId) -> Result<&mut ContainerState> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Container(state) => Ok(state),
            NodeKind::Leaf(_) => Err(Error::NotAContainer(id)),
        }
    }

    /// The parent of an attached node.
    fn attached_parent(&self, id: DrawableId) -> Result<DrawableId> {
        self.node(id)?.parent.ok_or(Error::NotAttached(id))
    }

    pub(crate) fn rect(&self, id: DrawableId) -> Result<Rect> {
        Ok(self.node(id)?.rect)
    }

    pub(crate) fn content(&self, id: DrawableId) -> Result<Option<Arc<dyn Drawable>>> {
        Ok(self.node(id)?.content().cloned())
    }

    pub(crate) fn parent(&self, id: DrawableId) -> Result<Option<DrawableId>> {
        Ok(self.node(id)?.parent)
    }

    pub(crate) fn children(&self, id: DrawableId) -> Result<Vec<DrawableId>> {
        Ok(self.container(id)?.children.clone())
    }

    pub(crate) fn focused(&self, id: DrawableId) -> Result<Option<DrawableId>> {
        Ok(self.container(id)?.focus)
    }

    /// Index in the parent's child list; 0 is topmost.
    pub(crate) fn depth(&self, id: DrawableId) -> Result<usize> {
        let parent = self.attached_parent(id)?;
        self.container(parent)?
            .children
            .iter()
            .position(|&c| c == id)
            .ok_or(Error::NotAttached(id))
    }

    /// Whether `id`'s parent chain reaches the root.
    pub(crate) fn is_live(&self, id: DrawableId) -> bool {
        let mut cur = Some(id);
        while let Some(node_id) = cur {
            if node_id == self.root {
                return true;
            }
            cur = self.nodes.get(&node_id).and_then(|n| n.parent);
        }
        false
    }

    /// Absolute rect: the sum of origins up the parent chain.
    pub(crate) fn absolute_rect(&self, id: DrawableId) -> Result<Rect> {
        let node = self.node(id)?;
        let mut rect = node.rect;
        let mut cur = node.parent;
        if id == self.root {
            return Ok(rect);
        }
        while let Some(parent_id) = cur {
            let parent = self.node(parent_id)?;
            rect = rect.translate(parent.rect.origin);
            if parent_id == self.root {
                return Ok(rect);
            }
            cur = parent.parent;
        }
        Err(Error::NotAttached(id))
    }

    /// `id` and everything beneath it, parents before children.
    pub(crate) fn subtree(&self, id: DrawableId) -> Vec<DrawableId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            if let Some(Node {
                kind: NodeKind::Container(state),
                ..
            }) = self.nodes.get(&cur)
            {
                stack.extend(state.children.iter().rev());
            }
        }
        out
    }

    /// Every attached drawable, root excluded.
    pub(crate) fn live(&self) -> Vec<DrawableId> {
        let mut ids = self.subtree(self.root);
        ids.retain(|&id| id != self.root);
        ids
    }

    /// The deepest node on the focus path from the root.
    pub(crate) fn focused_leaf(&self) -> Option<DrawableId> {
        let mut cur = self.root;
        let mut found = None;
        while let Ok(state) = self.container(cur) {
            match state.focus {
                Some(next) => {
                    found = Some(next);
                    cur = next;
                }
                None => break,
            }
        }
        found
    }

    /// Topmost drawable with content under an absolute point.
    pub(crate) fn drawable_at(&self, p: Point) -> Option<DrawableId> {
        let root = self.node(self.root).ok()?;
        self.hit(self.root, root.rect.origin, root.rect, p)
    }

    fn hit(&self, id: DrawableId, origin: Point, clip: Rect, p: Point) -> Option<DrawableId> {
        let state = self.container(id).ok()?;
        for &child in &state.children {
            let Some(node) = self.nodes.get(&child) else {
                continue;
            };
            let abs = node.rect.translate(origin);
            let Some(visible) = abs.intersection(clip) else {
                continue;
            };
            if !visible.contains_point(p) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(_) => return Some(child),
                NodeKind::Container(inner) => {
                    if let Some(hit) = self.hit(child, abs.origin, visible, p) {
                        return Some(hit);
                    }
                    if inner.background.is_some() {
                        return Some(child);
                    }
                }
            }
        }
        None
    }

    // ─── Render plan ────────────────────────────────────────────────────

    /// Everything that paints inside `target`, bottom first. Each item is
    /// clipped to `target` and to all of its ancestors.
    pub(crate) fn paint_plan(&self, target: Rect) -> Vec<PaintItem> {
        let mut out = Vec::new();
        if let Ok(root) = self.node(self.root) {
            if let Some(clip) = target.intersection(root.rect) {
                self.plan_into(self.root, root.rect, clip, &mut out);
            }
        }
        out
    }

    fn plan_into(&self, id: DrawableId, abs: Rect, clip: Rect, out: &mut Vec<PaintItem>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let NodeKind::Container(state) = &node.kind else {
            return;
        };
        if let Some(background) = &state.background {
            out.push(PaintItem {
                id,
                content: Arc::clone(background),
                rect: abs,
                clip,
            });
        }
        for &child in state.children.iter().rev() {
            let Some(child_node) = self.nodes.get(&child) else {
                continue;
            };
            let child_abs = child_node.rect.translate(abs.origin);
            let Some(child_clip) = child_abs.intersection(clip) else {
                continue;
            };
            match &child_node.kind {
                NodeKind::Leaf(content) => out.push(PaintItem {
                    id: child,
                    content: Arc::clone(content),
                    rect: child_abs,
                    clip: child_clip,
                }),
                NodeKind::Container(_) => self.plan_into(child, child_abs, child_clip, out),
            }
        }
    }

    // ─── Mutations ──────────────────────────────────────────────────────

    /// Insert `child` into `container` per the container's policy.
    /// `focusable` is the child's answer to `is_focusable`, asked by the
    /// caller outside the tree lock.
    pub(crate) fn attach(
        &mut self,
        container: DrawableId,
        child: DrawableId,
        strict: bool,
        focusable: bool,
    ) -> Result<Outcome> {
        let child_node = self.node(child)?;
        let child_rect = child_node.rect;
        let bounds = self.node(container)?.rect.zero_origin();
        let policy = self.container(container)?.policy;

        if child_node.parent.is_some() {
            return Err(Error::AlreadyAttached(child));
        }
        if child == self.root || self.is_ancestor(child, container) {
            return Err(Error::CycleDetected {
                parent: container,
                child,
            });
        }
        if !bounds.contains_rect(child_rect) {
            if strict {
                return Err(Error::OutOfBounds {
                    rect: child_rect,
                    bounds,
                });
            }
            tracing::warn!(%child, rect = %child_rect, %bounds, "attached beyond its container; excess is clipped");
        }

        let take_focus = policy.focus_on_attach && focusable;
        let state = self.container_mut(container)?;
        let on_top = policy.insert_new_on_top || take_focus;
        if on_top {
            state.children.insert(0, child);
        } else {
            state.children.push(child);
        }
        // Focus sits on the front child; a focused container keeps it there
        // even when the newcomer would not have taken focus itself.
        let refocus = on_top && (take_focus || state.focus.is_some());
        if refocus {
            state.focus = Some(child);
        }
        self.node_mut(child)?.parent = Some(container);

        let mut outcome = Outcome::default();
        if self.is_live(container) {
            outcome.registered = self.subtree(child);
            outcome.damage.push(self.absolute_rect(child)?);
            if refocus {
                outcome.focus = Some(FocusChange {
                    target: Some(child),
                });
            }
        }
        Ok(outcome)
    }

    /// Whether `ancestor` is `id` or lies on `id`'s parent chain.
    fn is_ancestor(&self, ancestor: DrawableId, id: DrawableId) -> bool {
        let mut cur = Some(id);
        while let Some(node_id) = cur {
            if node_id == ancestor {
                return true;
            }
            cur = self.nodes.get(&node_id).and_then(|n| n.parent);
        }
        false
    }

    pub(crate) fn detach(&mut self, child: DrawableId) -> Result<Outcome> {
        let container = self.attached_parent(child)?;
        let live = self.is_live(child);
        let footprint = if live { Some(self.absolute_rect(child)?) } else { None };

        let state = self.container_mut(container)?;
        let Some(pos) = state.children.iter().position(|&c| c == child) else {
            return Err(Error::NotAttached(child));
        };
        state.children.remove(pos);
        let front = state.children.first().copied();
        let refocus = (state.focus != front).then(|| {
            state.focus = front;
            FocusChange { target: front }
        });
        self.node_mut(child)?.parent = None;

        let mut outcome = Outcome::default();
        if let Some(rect) = footprint {
            outcome.damage.push(rect);
            outcome.unregistered = self.subtree(child);
            outcome.focus = refocus;
        }
        Ok(outcome)
    }

    /// Move `child` to the front of its container and focus it.
    pub(crate) fn set_focus(&mut self, child: DrawableId) -> Result<Outcome> {
        let container = self.attached_parent(child)?;
        let state = self.container_mut(container)?;
        let pos = state
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(Error::NotAttached(child))?;
        if pos != 0 {
            state.children.remove(pos);
            state.children.insert(0, child);
        }
        state.focus = Some(child);

        let mut outcome = Outcome::default();
        if self.is_live(child) {
            if pos != 0 {
                outcome.damage.push(self.absolute_rect(child)?);
            }
            outcome.focus = Some(FocusChange {
                target: Some(child),
            });
        }
        Ok(outcome)
    }

    pub(crate) fn clear_focus(&mut self, container: DrawableId) -> Result<Outcome> {
        let state = self.container_mut(container)?;
        let had_focus = state.focus.take().is_some();
        let mut outcome = Outcome::default();
        if had_focus && self.is_live(container) {
            outcome.focus = Some(FocusChange { target: None });
        }
        Ok(outcome)
    }

    /// Move `child` to `index` (clamped) in its container's z-order. If the
    /// focused child is no longer in front, focus follows the front child.
    pub(crate) fn set_depth(&mut self, child: DrawableId, index: usize) -> Result<Outcome> {
        let container = self.attached_parent(child)?;
        let state = self.container_mut(container)?;
        let pos = state
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(Error::NotAttached(child))?;
        let index = index.min(state.children.len() - 1);
        if pos == index {
            return Ok(Outcome::default());
        }
        state.children.remove(pos);
        state.children.insert(index, child);

        let front = state.children.first().copied();
        let refocus = match state.focus {
            Some(focused) if Some(focused) != front => {
                state.focus = front;
                Some(FocusChange { target: front })
            }
            _ => None,
        };

        let mut outcome = Outcome::default();
        if self.is_live(child) {
            outcome.damage.push(self.absolute_rect(child)?);
            outcome.focus = refocus;
        }
        Ok(outcome)
    }

    /// Check that `rect` may become `id`'s relative rect. Returns the
    /// current rect.
    pub(crate) fn check_rect(&self, id: DrawableId, rect: Rect, strict: bool) -> Result<Rect> {
        match self.exceeded_bounds(id, rect)? {
            Some(bounds) if strict => Err(Error::OutOfBounds { rect, bounds }),
            _ => self.rect(id),
        }
    }

    /// The parent's bounds, if `rect` does not fit inside them.
    fn exceeded_bounds(&self, id: DrawableId, rect: Rect) -> Result<Option<Rect>> {
        if id == self.root {
            return Err(Error::InvalidGeometry(format!(
                "the root follows the terminal size; cannot set it to {rect}"
            )));
        }
        let Some(parent) = self.node(id)?.parent else {
            return Ok(None);
        };
        let bounds = self.node(parent)?.rect.zero_origin();
        Ok((!bounds.contains_rect(rect)).then_some(bounds))
    }

    /// Replace a node's relative rect. Returns the damage to repaint.
    pub(crate) fn set_rect(&mut self, id: DrawableId, rect: Rect, strict: bool) -> Result<Outcome> {
        if let Some(bounds) = self.exceeded_bounds(id, rect)? {
            if strict {
                return Err(Error::OutOfBounds { rect, bounds });
            }
            tracing::warn!(%id, %rect, %bounds, "rect exceeds its container; excess is clipped");
        }
        let before = self.absolute_rect(id).ok();
        self.node_mut(id)?.rect = rect;
        let after = self.absolute_rect(id).ok();

        let mut outcome = Outcome::default();
        match (before, after) {
            (Some(old), Some(new)) if old.intersects(new) => outcome.damage.push(old.union(new)),
            (Some(old), Some(new)) => outcome.damage.extend([old, new]),
            _ => {}
        }
        Ok(outcome)
    }

    pub(crate) fn set_root_size(&mut self, size: Size) {
        if let Some(root) = self.nodes.get_mut(&self.root) {
            root.rect = Rect::from_size(size);
        }
    }

    /// Detach everything. Returns the ids that were live.
    pub(crate) fn detach_all(&mut self) -> Vec<DrawableId> {
        let live = self.live();
        for node in self.nodes.values_mut() {
            node.parent = None;
            if let NodeKind::Container(state) = &mut node.kind {
                state.children.clear();
                state.focus = None;
            }
        }
        live
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::drawable::Solid;

    fn solid() -> Arc<dyn Drawable> {
        Arc::new(Solid::new(Cell::from_char('x')))
    }

    struct Focusable;

    impl Drawable for Focusable {
        fn render_grid(&self, size: Size) -> crate::grid::Grid {
            crate::grid::Grid::new(size)
        }
    }

    fn tree() -> Tree {
        Tree::new(Size::new(20, 10), ContainerPolicy::default())
    }

    fn leaf(tree: &mut Tree, rect: Rect) -> DrawableId {
        tree.insert_leaf(rect, Arc::new(Focusable))
    }

    fn container(tree: &mut Tree, rect: Rect) -> DrawableId {
        tree.insert_container(rect, None, ContainerPolicy::default())
    }

    // ── Attach ──────────────────────────────────────────────────────────

    #[test]
    fn attach_on_top_and_focus() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 4, 2));
        let b = leaf(&mut t, Rect::new(1, 0, 2, 2));
        t.attach(root, a, false, true).unwrap();
        let out = t.attach(root, b, false, true).unwrap();
        assert_eq!(t.children(root).unwrap(), vec![b, a]);
        assert_eq!(t.focused(root).unwrap(), Some(b));
        assert_eq!(out.damage, vec![Rect::new(1, 0, 2, 2)]);
        assert_eq!(out.registered, vec![b]);
        assert_eq!(out.focus, Some(FocusChange { target: Some(b) }));
    }

    #[test]
    fn attach_at_bottom_without_focus() {
        let mut t = Tree::new(
            Size::new(10, 10),
            ContainerPolicy {
                insert_new_on_top: false,
                focus_on_attach: false,
            },
        );
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        let b = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(root, a, false, true).unwrap();
        let out = t.attach(root, b, false, true).unwrap();
        assert_eq!(t.children(root).unwrap(), vec![a, b]);
        assert_eq!(t.focused(root).unwrap(), None);
        assert!(out.focus.is_none());
    }

    #[test]
    fn unfocusable_child_does_not_take_focus() {
        let mut t = tree();
        let root = t.root();
        let s = t.insert_leaf(Rect::new(0, 0, 1, 1), solid());
        t.attach(root, s, false, false).unwrap();
        assert_eq!(t.focused(root).unwrap(), None);
    }

    #[test]
    fn unfocusable_on_top_carries_existing_focus() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 2, 2));
        t.attach(root, a, false, true).unwrap();
        let s = t.insert_leaf(Rect::new(0, 0, 1, 1), solid());
        let out = t.attach(root, s, false, false).unwrap();
        assert_eq!(t.children(root).unwrap(), vec![s, a]);
        assert_eq!(t.focused(root).unwrap(), Some(s));
        assert_eq!(out.focus, Some(FocusChange { target: Some(s) }));
    }

    #[test]
    fn double_attach_fails() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(root, a, false, true).unwrap();
        assert!(matches!(t.attach(root, a, false, true), Err(Error::AlreadyAttached(id)) if id == a));
    }

    #[test]
    fn attach_to_leaf_fails() {
        let mut t = tree();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        let b = leaf(&mut t, Rect::new(0, 0, 1, 1));
        assert!(matches!(t.attach(a, b, false, true), Err(Error::NotAContainer(id)) if id == a));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut t = tree();
        let outer = container(&mut t, Rect::new(0, 0, 5, 5));
        let inner = container(&mut t, Rect::new(0, 0, 2, 2));
        t.attach(outer, inner, false, true).unwrap();
        assert!(matches!(t.attach(inner, outer, false, true), Err(Error::CycleDetected { .. })));
        assert!(matches!(t.attach(outer, outer, false, true), Err(Error::CycleDetected { .. })));
        let root = t.root();
        assert!(matches!(t.attach(outer, root, false, true), Err(Error::CycleDetected { .. })));
    }

    #[test]
    fn strict_bounds() {
        let mut t = tree();
        let root = t.root();
        let big = leaf(&mut t, Rect::new(15, 0, 10, 2));
        let err = t.attach(root, big, true, true).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { bounds, .. } if bounds == Rect::new(0, 0, 20, 10)));
        t.attach(root, big, false, true).unwrap();
    }

    #[test]
    fn detached_container_attach_is_quiet() {
        let mut t = tree();
        let c = container(&mut t, Rect::new(2, 2, 5, 5));
        let a = leaf(&mut t, Rect::new(1, 1, 1, 1));
        let out = t.attach(c, a, false, true).unwrap();
        assert!(out.damage.is_empty() && out.registered.is_empty() && out.focus.is_none());

        let root = t.root();
        let out = t.attach(root, c, false, true).unwrap();
        assert_eq!(out.registered, vec![c, a]);
        assert_eq!(t.absolute_rect(a).unwrap(), Rect::new(3, 3, 1, 1));
    }

    // ── Detach ──────────────────────────────────────────────────────────

    #[test]
    fn detach_reports_footprint_and_refocuses() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 4, 2));
        let b = leaf(&mut t, Rect::new(1, 0, 2, 2));
        t.attach(root, a, false, true).unwrap();
        t.attach(root, b, false, true).unwrap();

        let out = t.detach(b).unwrap();
        assert_eq!(out.damage, vec![Rect::new(1, 0, 2, 2)]);
        assert_eq!(out.unregistered, vec![b]);
        assert_eq!(out.focus, Some(FocusChange { target: Some(a) }));
        assert_eq!(t.focused(root).unwrap(), Some(a));
        assert_eq!(t.parent(b).unwrap(), None);
        assert!(matches!(t.absolute_rect(b), Err(Error::NotAttached(_))));
    }

    #[test]
    fn detach_last_clears_focus() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(root, a, false, true).unwrap();
        let out = t.detach(a).unwrap();
        assert_eq!(out.focus, Some(FocusChange { target: None }));
        assert_eq!(t.focused(root).unwrap(), None);
    }

    #[test]
    fn detach_unfocused_keeps_focus() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        let b = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(root, a, false, true).unwrap();
        t.attach(root, b, false, true).unwrap();
        let out = t.detach(a).unwrap();
        assert!(out.focus.is_none());
        assert_eq!(t.focused(root).unwrap(), Some(b));
    }

    #[test]
    fn detach_refocuses_front_even_when_unfocused() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        let b = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(root, a, false, true).unwrap();
        t.attach(root, b, false, true).unwrap();
        t.clear_focus(root).unwrap();
        let out = t.detach(b).unwrap();
        assert_eq!(out.focus, Some(FocusChange { target: Some(a) }));
        assert_eq!(t.focused(root).unwrap(), Some(a));

        t.clear_focus(root).unwrap();
        let out = t.detach(a).unwrap();
        assert!(out.focus.is_none());
        assert_eq!(t.focused(root).unwrap(), None);
    }

    #[test]
    fn detach_unattached_fails() {
        let mut t = tree();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        assert!(matches!(t.detach(a), Err(Error::NotAttached(_))));
    }

    // ── Focus & depth ───────────────────────────────────────────────────

    #[test]
    fn focus_moves_to_front() {
        let mut t = tree();
        let root = t.root();
        let ids: Vec<_> = (0..3).map(|_| leaf(&mut t, Rect::new(0, 0, 2, 2))).collect();
        for &id in &ids {
            t.attach(root, id, false, true).unwrap();
        }
        assert_eq!(t.children(root).unwrap(), vec![ids[2], ids[1], ids[0]]);
        t.set_focus(ids[0]).unwrap();
        assert_eq!(t.depth(ids[0]).unwrap(), 0);
        assert_eq!(t.children(root).unwrap(), vec![ids[0], ids[2], ids[1]]);
        assert_eq!(t.focused_leaf(), Some(ids[0]));
    }

    #[test]
    fn clear_focus_reports_none() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(root, a, false, true).unwrap();
        let out = t.clear_focus(root).unwrap();
        assert_eq!(out.focus, Some(FocusChange { target: None }));
        assert_eq!(t.focused_leaf(), None);
    }

    #[test]
    fn set_depth_clamps_and_moves_focus() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        let b = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(root, a, false, true).unwrap();
        t.attach(root, b, false, true).unwrap();
        let out = t.set_depth(b, 99).unwrap();
        assert_eq!(t.children(root).unwrap(), vec![a, b]);
        assert_eq!(out.focus, Some(FocusChange { target: Some(a) }));
        assert!(t.set_depth(a, 0).unwrap().damage.is_empty());
    }

    #[test]
    fn focused_leaf_follows_nested_focus() {
        let mut t = tree();
        let root = t.root();
        let c = container(&mut t, Rect::new(0, 0, 5, 5));
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(c, a, false, true).unwrap();
        t.attach(root, c, false, true).unwrap();
        assert_eq!(t.focused_leaf(), Some(a));
    }

    #[test]
    fn focus_stays_at_front_through_mutations() {
        fn check(t: &Tree, c: DrawableId) {
            let focus = t.focused(c).unwrap();
            assert!(focus.is_none() || focus == t.children(c).unwrap().first().copied());
        }

        for insert_new_on_top in [false, true] {
            for focus_on_attach in [false, true] {
                let policy = ContainerPolicy {
                    insert_new_on_top,
                    focus_on_attach,
                };
                let mut t = Tree::new(Size::new(20, 10), policy);
                let root = t.root();
                let a = leaf(&mut t, Rect::new(0, 0, 2, 2));
                let b = leaf(&mut t, Rect::new(1, 1, 2, 2));
                let s = t.insert_leaf(Rect::new(0, 0, 3, 1), solid());
                let c = leaf(&mut t, Rect::new(2, 0, 2, 2));

                t.attach(root, a, false, true).unwrap();
                check(&t, root);
                t.set_focus(a).unwrap();
                check(&t, root);
                t.attach(root, s, false, false).unwrap();
                check(&t, root);
                t.attach(root, b, false, true).unwrap();
                check(&t, root);
                let front = t.children(root).unwrap()[0];
                t.set_depth(front, 2).unwrap();
                check(&t, root);
                t.attach(root, c, false, true).unwrap();
                check(&t, root);
                t.clear_focus(root).unwrap();
                check(&t, root);
                for id in t.children(root).unwrap() {
                    t.detach(id).unwrap();
                    check(&t, root);
                }
            }
        }
    }

    // ── Geometry ────────────────────────────────────────────────────────

    #[test]
    fn absolute_rect_walks_parents() {
        let mut t = tree();
        let root = t.root();
        let outer = container(&mut t, Rect::new(5, 2, 10, 5));
        let inner = container(&mut t, Rect::new(1, 1, 5, 3));
        let a = leaf(&mut t, Rect::new(2, 0, 2, 1));
        t.attach(inner, a, false, true).unwrap();
        t.attach(outer, inner, false, true).unwrap();
        t.attach(root, outer, false, true).unwrap();
        assert_eq!(t.absolute_rect(a).unwrap(), Rect::new(8, 3, 2, 1));
        assert_eq!(t.absolute_rect(root).unwrap(), Rect::new(0, 0, 20, 10));
    }

    #[test]
    fn set_rect_strict_checks_parent() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 2, 2));
        t.attach(root, a, false, true).unwrap();
        assert!(matches!(t.set_rect(a, Rect::new(19, 0, 2, 2), true), Err(Error::OutOfBounds { .. })));
        assert_eq!(t.rect(a).unwrap(), Rect::new(0, 0, 2, 2));

        let out = t.set_rect(a, Rect::new(1, 1, 2, 2), false).unwrap();
        assert_eq!(out.damage, vec![Rect::new(0, 0, 3, 3)]);
        let out = t.set_rect(a, Rect::new(19, 0, 2, 2), false).unwrap();
        assert_eq!(out.damage, vec![Rect::new(1, 1, 2, 2), Rect::new(19, 0, 2, 2)]);
        assert!(t.set_rect(root, Rect::new(0, 0, 1, 1), false).is_err());
    }

    #[test]
    fn drawable_at_prefers_topmost_and_clips() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 4, 2));
        let c = container(&mut t, Rect::new(2, 0, 2, 2));
        let inner = leaf(&mut t, Rect::new(0, 0, 5, 1));
        t.attach(c, inner, false, true).unwrap();
        t.attach(root, a, false, true).unwrap();
        t.attach(root, c, false, true).unwrap();

        assert_eq!(t.drawable_at(Point::new(0, 0)), Some(a));
        assert_eq!(t.drawable_at(Point::new(3, 0)), Some(inner));
        // Container without background is transparent.
        assert_eq!(t.drawable_at(Point::new(3, 1)), Some(a));
        // Clipped by the container.
        assert_eq!(t.drawable_at(Point::new(5, 0)), None);
    }

    // ── Paint plan ──────────────────────────────────────────────────────

    #[test]
    fn paint_plan_is_bottom_first_and_clipped() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 4, 2));
        let b = leaf(&mut t, Rect::new(1, 0, 2, 2));
        let far = leaf(&mut t, Rect::new(10, 5, 2, 2));
        t.attach(root, far, false, true).unwrap();
        t.attach(root, a, false, true).unwrap();
        t.attach(root, b, false, true).unwrap();

        let plan = t.paint_plan(Rect::new(0, 0, 3, 1));
        let ids: Vec<_> = plan.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(plan[0].clip, Rect::new(0, 0, 3, 1));
        assert_eq!(plan[1].clip, Rect::new(1, 0, 2, 1));
    }

    #[test]
    fn paint_plan_background_before_children() {
        let mut t = tree();
        let root = t.root();
        let c = t.insert_container(Rect::new(0, 0, 4, 4), Some(solid()), ContainerPolicy::default());
        let a = leaf(&mut t, Rect::new(1, 1, 10, 1));
        t.attach(c, a, false, true).unwrap();
        t.attach(root, c, false, true).unwrap();

        let plan = t.paint_plan(Rect::new(0, 0, 20, 10));
        assert_eq!(plan.iter().map(|p| p.id).collect::<Vec<_>>(), vec![c, a]);
        assert_eq!(plan[1].rect, Rect::new(1, 1, 10, 1));
        assert_eq!(plan[1].clip, Rect::new(1, 1, 3, 1));
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    #[test]
    fn forget_requires_detached() {
        let mut t = tree();
        let root = t.root();
        let c = container(&mut t, Rect::new(0, 0, 5, 5));
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(c, a, false, true).unwrap();
        t.attach(root, c, false, true).unwrap();
        assert!(matches!(t.forget(c), Err(Error::StillAttached(_))));
        assert!(matches!(t.forget(root), Err(Error::StillAttached(_))));

        t.detach(c).unwrap();
        t.forget(c).unwrap();
        assert!(matches!(t.rect(c), Err(Error::UnknownDrawable(_))));
        assert_eq!(t.parent(a).unwrap(), None);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut t = tree();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.forget(a).unwrap();
        let b = leaf(&mut t, Rect::new(0, 0, 1, 1));
        assert_ne!(a, b);
    }

    #[test]
    fn detach_all_returns_live() {
        let mut t = tree();
        let root = t.root();
        let a = leaf(&mut t, Rect::new(0, 0, 1, 1));
        let loose = leaf(&mut t, Rect::new(0, 0, 1, 1));
        t.attach(root, a, false, true).unwrap();
        assert_eq!(t.detach_all(), vec![a]);
        assert!(!t.is_live(a));
        assert!(!t.is_live(loose));
        assert!(t.children(root).unwrap().is_empty());
    }
}
