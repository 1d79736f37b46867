//! Tree walker
//!
//! One traversal engine for every cascading operation. The callback gets
//! the runtime and the visited child and answers with a [`Visit`]:
//! `Abort` ends the whole walk, `Continue` goes on (descending first in
//! top-down walks), `Skip` goes on without descending.
//!
//! Sibling lists are snapshotted before the callbacks run, so a callback
//! may destroy the node it is visiting. Siblings destroyed meanwhile are
//! skipped.

use crate::runtime::Runtime;
use crate::types::GobjId;
use std::ops::ControlFlow;

/// Traversal order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// Parent before its subtree
    TopToBottom,
    /// Subtree before its parent
    BottomToTop,
    /// Every sibling of a level before any of their children
    ByLevel,
}

/// Sibling order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDirection {
    FirstToLast,
    LastToFirst,
}

/// A walk policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkType {
    pub order: WalkOrder,
    pub direction: WalkDirection,
}

impl WalkType {
    pub const fn new(order: WalkOrder, direction: WalkDirection) -> Self {
        Self { order, direction }
    }

    pub const fn top_to_bottom() -> Self {
        Self::new(WalkOrder::TopToBottom, WalkDirection::FirstToLast)
    }

    /// Leaves first, siblings from the last one
    pub const fn bottom_to_top() -> Self {
        Self::new(WalkOrder::BottomToTop, WalkDirection::LastToFirst)
    }

    pub const fn by_level() -> Self {
        Self::new(WalkOrder::ByLevel, WalkDirection::FirstToLast)
    }
}

impl Default for WalkType {
    fn default() -> Self {
        Self::top_to_bottom()
    }
}

/// Callback answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Skip,
    Abort,
}

impl Runtime {
    /// Visit the direct children of `id`
    pub fn walk_childs<F>(&mut self, id: GobjId, direction: WalkDirection, mut cb: F) -> ControlFlow<()>
    where
        F: FnMut(&mut Runtime, GobjId) -> Visit,
    {
        self.walk_list(id, direction, &mut cb)
    }

    /// Visit the whole subtree under `id` (not `id` itself)
    pub fn walk_childs_tree<F>(&mut self, id: GobjId, walk: WalkType, mut cb: F) -> ControlFlow<()>
    where
        F: FnMut(&mut Runtime, GobjId) -> Visit,
    {
        match walk.order {
            WalkOrder::ByLevel => self.walk_by_level(id, walk.direction, &mut cb),
            _ => self.walk_by_tree(id, walk, &mut cb),
        }
    }

    fn sibling_snapshot(&self, parent: GobjId, direction: WalkDirection) -> Vec<GobjId> {
        let mut children = self.children(parent).to_vec();
        if direction == WalkDirection::LastToFirst {
            children.reverse();
        }
        children
    }

    /// Still alive and still a child of `parent`
    fn still_attached(&self, parent: GobjId, child: GobjId) -> bool {
        self.gobj(child).is_some_and(|g| g.parent == Some(parent))
    }

    fn walk_list<F>(&mut self, parent: GobjId, direction: WalkDirection, cb: &mut F) -> ControlFlow<()>
    where
        F: FnMut(&mut Runtime, GobjId) -> Visit,
    {
        for child in self.sibling_snapshot(parent, direction) {
            if !self.still_attached(parent, child) {
                continue;
            }
            if cb(self, child) == Visit::Abort {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn walk_by_level<F>(&mut self, parent: GobjId, direction: WalkDirection, cb: &mut F) -> ControlFlow<()>
    where
        F: FnMut(&mut Runtime, GobjId) -> Visit,
    {
        self.walk_list(parent, direction, cb)?;

        for child in self.sibling_snapshot(parent, direction) {
            if !self.still_attached(parent, child) {
                continue;
            }
            self.walk_by_level(child, direction, cb)?;
        }
        ControlFlow::Continue(())
    }

    fn walk_by_tree<F>(&mut self, parent: GobjId, walk: WalkType, cb: &mut F) -> ControlFlow<()>
    where
        F: FnMut(&mut Runtime, GobjId) -> Visit,
    {
        for child in self.sibling_snapshot(parent, walk.direction) {
            if !self.still_attached(parent, child) {
                continue;
            }
            match walk.order {
                WalkOrder::BottomToTop => {
                    self.walk_by_tree(child, walk, cb)?;
                    if !self.still_attached(parent, child) {
                        continue;
                    }
                    if cb(self, child) == Visit::Abort {
                        return ControlFlow::Break(());
                    }
                }
                _ => match cb(self, child) {
                    Visit::Abort => return ControlFlow::Break(()),
                    Visit::Continue => self.walk_by_tree(child, walk, cb)?,
                    Visit::Skip => {}
                },
            }
        }
        ControlFlow::Continue(())
    }
}
