//! Child to parent mapping of the frames.
//!
//! Frames live in an index addressed arena; a parent link is just the index of
//! another slot. Readers work on an immutable [`TreeIndex`] snapshot, writers
//! publish a modified copy through [`SharedTreeIndex`].

use crate::error::{TransformError, TransformResult};
use crate::frames::FrameId;
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Slot of a frame in the arena. Only meaningful for the snapshot it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameIndex(u32);

impl FrameIndex {
    #[inline]
    fn slot(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct FrameNode {
    id: FrameId,
    parent: Option<FrameIndex>,
    children: usize,
}

/// What an accepted `update` did to the structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeChange {
    /// The child already had this parent.
    Unchanged,
    /// The child had no parent yet.
    Created,
    /// The child moved away from `previous`.
    Reparented { previous: FrameId },
}

#[derive(Clone, Debug, Default)]
pub struct TreeIndex {
    nodes: Vec<Option<FrameNode>>,
    free: Vec<FrameIndex>,
    indices: HashMap<FrameId, FrameIndex>,
    version: u64,
}

impl TreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every structural change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn index_of(&self, frame: &str) -> Option<FrameIndex> {
        let frame = FrameId::from(frame).ok()?;
        self.indices.get(&frame).copied()
    }

    pub fn contains(&self, frame: &str) -> bool {
        self.index_of(frame).is_some()
    }

    fn node(&self, idx: FrameIndex) -> Option<&FrameNode> {
        self.nodes.get(idx.slot()).and_then(|n| n.as_ref())
    }

    fn node_mut(&mut self, idx: FrameIndex) -> Option<&mut FrameNode> {
        self.nodes.get_mut(idx.slot()).and_then(|n| n.as_mut())
    }

    pub fn name(&self, idx: FrameIndex) -> Option<&FrameId> {
        self.node(idx).map(|n| &n.id)
    }

    pub fn parent(&self, idx: FrameIndex) -> Option<FrameIndex> {
        self.node(idx).and_then(|n| n.parent)
    }

    pub fn parent_of(&self, frame: &str) -> Option<FrameId> {
        let idx = self.index_of(frame)?;
        let parent = self.parent(idx)?;
        self.name(parent).copied()
    }

    pub fn child_count(&self, idx: FrameIndex) -> usize {
        self.node(idx).map(|n| n.children).unwrap_or(0)
    }

    pub fn frames(&self) -> impl Iterator<Item = &FrameId> {
        self.nodes.iter().flatten().map(|n| &n.id)
    }

    /// Frames from `idx` (included) up to its root, following parent links.
    pub fn path_to_root(&self, idx: FrameIndex) -> Vec<FrameIndex> {
        let mut path = Vec::new();
        let mut current = Some(idx);
        // The parent relation is acyclic, the bound only protects against a corrupted arena.
        while let Some(i) = current {
            if path.len() > self.nodes.len() {
                break;
            }
            path.push(i);
            current = self.parent(i);
        }
        path
    }

    /// Same as [`TreeIndex::path_to_root`] with frame names.
    pub fn path_to_root_by_name(&self, frame: &str) -> TransformResult<Vec<FrameId>> {
        let idx = self
            .index_of(frame)
            .ok_or_else(|| TransformError::UnknownFrame(frame.to_string()))?;
        Ok(self
            .path_to_root(idx)
            .into_iter()
            .filter_map(|i| self.name(i).copied())
            .collect())
    }

    /// Register a frame without parent if it is not known yet.
    pub fn ensure_frame(&mut self, frame: FrameId) -> FrameIndex {
        if let Some(idx) = self.indices.get(&frame) {
            return *idx;
        }
        let node = FrameNode {
            id: frame,
            parent: None,
            children: 0,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx.slot()] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                FrameIndex((self.nodes.len() - 1) as u32)
            }
        };
        self.indices.insert(frame, idx);
        self.version += 1;
        idx
    }

    /// Would linking `child` under `parent` close a loop?
    /// True when `child` is `parent` itself or one of its ancestors.
    pub fn would_create_cycle(&self, parent: &FrameId, child: &FrameId) -> bool {
        if parent == child {
            return true;
        }
        let (Some(parent_idx), Some(child_idx)) =
            (self.indices.get(parent), self.indices.get(child))
        else {
            // a frame that is not registered has no ancestry
            return false;
        };
        self.path_to_root(*parent_idx).contains(child_idx)
    }

    /// Make `parent` the parent of `child`, creating both frames as needed.
    /// A rejected update leaves the index untouched.
    pub fn update(&mut self, parent: FrameId, child: FrameId) -> TransformResult<EdgeChange> {
        if self.would_create_cycle(&parent, &child) {
            return Err(TransformError::CycleDetected {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        let parent_idx = self.ensure_frame(parent);
        let child_idx = self.ensure_frame(child);
        let previous = self.parent(child_idx);
        if previous == Some(parent_idx) {
            return Ok(EdgeChange::Unchanged);
        }

        if let Some(old) = previous.and_then(|p| self.node_mut(p)) {
            old.children -= 1;
        }
        if let Some(p) = self.node_mut(parent_idx) {
            p.children += 1;
        }
        if let Some(c) = self.node_mut(child_idx) {
            c.parent = Some(parent_idx);
        }
        self.version += 1;

        Ok(match previous.and_then(|p| self.name(p).copied()) {
            Some(previous) => EdgeChange::Reparented { previous },
            None => EdgeChange::Created,
        })
    }

    /// Remove a frame that has no children. Its own parent link is dropped.
    /// Returns false when the frame is unknown or still has children.
    pub fn remove_leaf(&mut self, frame: &FrameId) -> bool {
        let Some(idx) = self.indices.get(frame).copied() else {
            return false;
        };
        if self.child_count(idx) > 0 {
            return false;
        }
        if let Some(parent) = self.parent(idx).and_then(|p| self.node_mut(p)) {
            parent.children -= 1;
        }
        self.nodes[idx.slot()] = None;
        self.free.push(idx);
        self.indices.remove(frame);
        self.version += 1;
        true
    }
}

/// Copy on write holder of the published [`TreeIndex`].
///
/// Readers grab an `Arc` snapshot and never block writers for longer than the
/// pointer copy. Writers are serialized and publish a new version atomically.
#[derive(Default)]
pub struct SharedTreeIndex {
    published: RwLock<Arc<TreeIndex>>,
    writer: Mutex<()>,
}

impl SharedTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stable view of the structure.
    pub fn snapshot(&self) -> Arc<TreeIndex> {
        self.published.read().clone()
    }

    /// Apply a parent change. Publishing is skipped when nothing changes so
    /// that steady state publishers only pay for a snapshot read.
    pub fn update(&self, parent: FrameId, child: FrameId) -> TransformResult<EdgeChange> {
        let current = self.snapshot();
        if let (Some(p), Some(c)) = (current.index_of(&parent), current.index_of(&child)) {
            if current.parent(c) == Some(p) {
                return Ok(EdgeChange::Unchanged);
            }
        }

        let _guard = self.writer.lock();
        let mut next = TreeIndex::clone(&self.snapshot());
        let change = next.update(parent, child)?;
        if change != EdgeChange::Unchanged {
            debug!("Frame '{child}' is now attached to '{parent}' ({change:?})");
            *self.published.write() = Arc::new(next);
        }
        Ok(change)
    }

    /// Run a structural edit under the writer lock and publish the result.
    pub fn modify<R>(&self, edit: impl FnOnce(&mut TreeIndex) -> R) -> R {
        let _guard = self.writer.lock();
        let mut next = TreeIndex::clone(&self.snapshot());
        let version = next.version();
        let result = edit(&mut next);
        if next.version() != version {
            *self.published.write() = Arc::new(next);
        }
        result
    }

    pub fn reset(&self) {
        let _guard = self.writer.lock();
        *self.published.write() = Arc::new(TreeIndex::new());
    }
}
