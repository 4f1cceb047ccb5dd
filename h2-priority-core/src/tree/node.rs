//! Tree Nodes
//!
//! This module defines the per-stream node type and the arena that owns
//! every node of one connection's dependency tree.
//!
//! Parent and child links are stream ids into the arena rather than
//! references, so moving a subtree is a matter of editing two child lists
//! and one parent field.

use indexmap::IndexMap;
use serde::Serialize;
use smallvec::{smallvec, SmallVec};

use crate::error::{Error, Result};

/// HTTP/2 stream identifier.
pub type StreamId = u32;

/// Stream id of the synthetic root. It never writes.
pub const ROOT_STREAM_ID: StreamId = 0;

/// Sentinel weight reported for the root.
pub const ROOT_WEIGHT: i32 = -1;

/// Smallest weight a stream may carry.
pub const MIN_WEIGHT: u16 = 1;

/// Largest weight a stream may carry.
pub const MAX_WEIGHT: u16 = 256;

/// Weight given to streams that declare no priority (RFC 7540 Section 5.3.5).
pub const DEFAULT_WEIGHT: u16 = 16;

/// Largest valid stream id (2^31 - 1).
pub const MAX_STREAM_ID: StreamId = 0x7FFF_FFFF;

/// Check that `weight` lies in `MIN_WEIGHT..=MAX_WEIGHT`.
pub fn validate_weight(weight: u32) -> Result<u16> {
    if (MIN_WEIGHT as u32..=MAX_WEIGHT as u32).contains(&weight) {
        Ok(weight as u16)
    } else {
        Err(Error::InvalidWeight(weight))
    }
}

/// Write state of a stream as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    /// The stream has a frame queued and wants the next write slot.
    RequestingWrite,

    /// The stream was handed a write slot and has not released it yet.
    WriteLatched,

    /// The stream has nothing to send.
    NotRequesting,

    /// The stream is closed but still holds its place in the tree.
    Closed,
}

/// Status directive passed to `update`.
///
/// Only the wrapped `NodeStatus` values are ever stored on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Store the given status.
    Set(NodeStatus),

    /// Leave the status as it is.
    NoChange,

    /// Move `WriteLatched` to `NotRequesting`; any other status is kept.
    ResetIfLatched,
}

impl From<NodeStatus> for StatusUpdate {
    fn from(status: NodeStatus) -> Self {
        StatusUpdate::Set(status)
    }
}

/// Write accounting directive passed to `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteCountAction {
    /// Leave the counters alone.
    #[default]
    NoAction,

    /// Count one write against the stream and its parent.
    Increment,
}

/// One stream's position in the dependency tree.
#[derive(Debug, Clone)]
pub struct Node<P> {
    stream_id: StreamId,
    weight: u16,
    status: NodeStatus,
    parent: Option<StreamId>,

    /// Direct dependents, highest rank first.
    children: SmallVec<[StreamId; 4]>,

    write_count: u64,

    /// Sum of the children's `write_count` since the last reset.
    children_write_count: u64,

    ratio_positive: bool,
    payload: Option<P>,
}

impl<P> Node<P> {
    /// Create a detached node with the default weight.
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            weight: DEFAULT_WEIGHT,
            status: NodeStatus::NotRequesting,
            parent: None,
            children: SmallVec::new(),
            write_count: 0,
            children_write_count: 0,
            ratio_positive: false,
            payload: None,
        }
    }

    /// Create a detached node, rejecting the reserved root id and ids with
    /// the high bit set.
    pub fn try_new(stream_id: StreamId) -> Result<Self> {
        if stream_id == ROOT_STREAM_ID || stream_id > MAX_STREAM_ID {
            return Err(Error::InvalidStreamId(stream_id));
        }
        Ok(Self::new(stream_id))
    }

    fn root() -> Self {
        Self {
            weight: 0,
            ..Self::new(ROOT_STREAM_ID)
        }
    }

    /// Set the weight. Out-of-range weights are rejected when the node is
    /// added to a tree.
    pub fn with_weight(mut self, weight: u16) -> Self {
        self.weight = weight;
        self
    }

    /// Set the initial status.
    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach a write entry.
    pub fn with_payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Stream this node schedules.
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Weight among siblings.
    pub fn weight(&self) -> u16 {
        self.weight
    }

    /// Current write status.
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Attached write entry, if any.
    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    pub(crate) fn parent(&self) -> Option<StreamId> {
        self.parent
    }

    pub(crate) fn children(&self) -> &[StreamId] {
        &self.children
    }

    pub(crate) fn set_weight(&mut self, weight: u16) {
        self.weight = weight;
    }

    pub(crate) fn set_payload(&mut self, payload: P) {
        self.payload = Some(payload);
    }

    /// Apply a status directive. Returns true if the stored status changed.
    pub(crate) fn apply_status(&mut self, update: StatusUpdate) -> bool {
        let next = match update {
            StatusUpdate::Set(status) => status,
            StatusUpdate::NoChange => return false,
            StatusUpdate::ResetIfLatched if self.status == NodeStatus::WriteLatched => {
                NodeStatus::NotRequesting
            }
            StatusUpdate::ResetIfLatched => return false,
        };
        let changed = self.status != next;
        self.status = next;
        changed
    }

    fn is_root(&self) -> bool {
        self.stream_id == ROOT_STREAM_ID
    }

    /// Read-only copy of this node's scheduling state.
    pub(crate) fn info(&self) -> NodeInfo {
        NodeInfo {
            stream_id: self.stream_id,
            weight: if self.is_root() {
                ROOT_WEIGHT
            } else {
                self.weight as i32
            },
            status: self.status,
            parent: self.parent,
            children: self.children.to_vec(),
            write_count: self.write_count,
            children_write_count: self.children_write_count,
            ratio_positive: self.ratio_positive,
            has_payload: self.payload.is_some(),
        }
    }
}

/// Snapshot of one node, as returned by `PriorityTree::node_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub stream_id: StreamId,
    /// `ROOT_WEIGHT` for the root, 1..=256 otherwise.
    pub weight: i32,
    pub status: NodeStatus,
    pub parent: Option<StreamId>,
    /// Children in current rank order.
    pub children: Vec<StreamId>,
    pub write_count: u64,
    pub children_write_count: u64,
    pub ratio_positive: bool,
    pub has_payload: bool,
}

/// Owner of every node in one tree, indexed by stream id.
///
/// The arena only performs node-local work: structural edits of one link,
/// counter maintenance, ranking one sibling set, and the next-write search.
/// Keeping weights and counters consistent after a structural edit is the
/// caller's job.
#[derive(Debug)]
pub(crate) struct NodeArena<P> {
    nodes: IndexMap<StreamId, Node<P>>,
}

impl<P> NodeArena<P> {
    /// Create an arena holding only the root.
    pub fn new() -> Self {
        let mut nodes = IndexMap::new();
        nodes.insert(ROOT_STREAM_ID, Node::root());
        Self { nodes }
    }

    pub fn find(&self, id: StreamId) -> Option<&Node<P>> {
        self.nodes.get(&id)
    }

    pub fn find_mut(&mut self, id: StreamId) -> Option<&mut Node<P>> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of streams, root excluded.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Store a detached node. It is unreachable until `add_child` links it.
    pub fn insert(&mut self, mut node: Node<P>) {
        node.parent = None;
        node.children.clear();
        self.nodes.insert(node.stream_id, node);
    }

    /// Drop a node from the arena. Its links must already be gone.
    pub fn discard(&mut self, id: StreamId) -> Option<Node<P>> {
        if id == ROOT_STREAM_ID {
            return None;
        }
        self.nodes.swap_remove(&id)
    }

    /// True if `ancestor` lies on the parent chain of `id`.
    pub fn is_descendant(&self, id: StreamId, ancestor: StreamId) -> bool {
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent_id) = current {
            if parent_id == ancestor {
                return true;
            }
            current = self.nodes.get(&parent_id).and_then(|n| n.parent);
        }
        false
    }

    /// Link `child` under `parent`, appended at the lowest rank.
    pub fn add_child(&mut self, parent: StreamId, child: StreamId) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            if !node.children.contains(&child) {
                node.children.push(child);
            }
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
    }

    /// Unlink `child` from `parent`.
    pub fn remove_child(&mut self, parent: StreamId, child: StreamId) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            if node.parent == Some(parent) {
                node.parent = None;
            }
        }
    }

    /// Move `id` from its current parent's child list to `new_parent`'s.
    pub fn set_parent(&mut self, id: StreamId, new_parent: StreamId) {
        let old_parent = match self.nodes.get(&id) {
            Some(node) => node.parent,
            None => return,
        };
        if old_parent == Some(new_parent) {
            return;
        }
        if let Some(old) = old_parent {
            self.remove_child(old, id);
        }
        self.add_child(new_parent, id);
    }

    /// Reset the fairness accounting of `id`'s children.
    pub fn clear_children_write_counts(&mut self, id: StreamId) {
        let children = match self.nodes.get_mut(&id) {
            Some(node) => {
                node.children_write_count = 0;
                node.children.clone()
            }
            None => return,
        };
        for child in children {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.write_count = 0;
            }
        }
    }

    /// Set `children_write_count` of `id` to the sum of its children's
    /// current write counts.
    pub fn recount_children_writes(&mut self, id: StreamId) {
        let total = match self.nodes.get(&id) {
            Some(node) => node
                .children
                .iter()
                .filter_map(|c| self.nodes.get(c))
                .map(|c| c.write_count)
                .sum(),
            None => return,
        };
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children_write_count = total;
        }
    }

    /// Count one write against `id` and, in lockstep, its parent.
    pub fn increment_write_count(&mut self, id: StreamId) {
        let parent = match self.nodes.get_mut(&id) {
            Some(node) => {
                node.write_count += 1;
                node.parent
            }
            None => return,
        };
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children_write_count += 1;
        }
    }

    /// Clear and re-rank one sibling set.
    pub fn reset_level(&mut self, id: StreamId) {
        self.clear_children_write_counts(id);
        self.sort_children(id);
    }

    /// Re-rank the children of `id`.
    ///
    /// A child is ratio positive when its share of the level's writes is
    /// below its share of the level's weight:
    /// `weight * children_write_count > write_count * priority_sum`.
    /// Ratio positive children rank first, then heavier ones, then lower
    /// stream ids.
    pub fn sort_children(&mut self, id: StreamId) {
        let (level_writes, mut ranked) = match self.nodes.get(&id) {
            Some(node) => (node.children_write_count, node.children.clone()),
            None => return,
        };
        if ranked.is_empty() {
            return;
        }

        let priority_sum: u64 = ranked
            .iter()
            .filter_map(|c| self.nodes.get(c))
            .map(|c| c.weight as u64)
            .sum();
        let only_child = ranked.len() == 1;
        for child in &ranked {
            if let Some(node) = self.nodes.get_mut(child) {
                node.ratio_positive = only_child
                    || level_writes == 0
                    || node.weight as u64 * level_writes > node.write_count * priority_sum;
            }
        }
        if only_child {
            return;
        }

        // Adjacent-pair passes until a pass makes no swap.
        let mut swapped = true;
        while swapped {
            swapped = false;
            for i in 0..ranked.len() - 1 {
                if self.rank_key(ranked[i + 1]) > self.rank_key(ranked[i]) {
                    ranked.swap(i, i + 1);
                    swapped = true;
                }
            }
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = ranked;
        }
    }

    fn rank_key(&self, id: StreamId) -> (bool, u16, std::cmp::Reverse<StreamId>) {
        match self.nodes.get(&id) {
            Some(node) => (node.ratio_positive, node.weight, std::cmp::Reverse(id)),
            None => (false, 0, std::cmp::Reverse(id)),
        }
    }

    /// Find the first stream under `from` that requests a write.
    ///
    /// Pre-order walk in rank order: a requesting node wins over its whole
    /// subtree, and a sibling is only visited once every higher ranked
    /// sibling's subtree came up empty. The root never qualifies.
    pub fn find_next_write(&self, from: StreamId) -> Option<StreamId> {
        let mut stack: SmallVec<[StreamId; 16]> = smallvec![from];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !node.is_root() && node.status == NodeStatus::RequestingWrite {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    /// Pre-order walk of the whole tree, children in rank order.
    pub fn walk(&self) -> Vec<&Node<P>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<StreamId> = vec![ROOT_STREAM_ID];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                out.push(node);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }
}

impl<P> Default for NodeArena<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with(children: &[(StreamId, u16)]) -> NodeArena<()> {
        let mut arena = NodeArena::new();
        for &(id, weight) in children {
            arena.insert(Node::new(id).with_weight(weight));
            arena.add_child(ROOT_STREAM_ID, id);
        }
        arena
    }

    fn child_order(arena: &NodeArena<()>, id: StreamId) -> Vec<StreamId> {
        arena.find(id).unwrap().children().to_vec()
    }

    #[test]
    fn new_node_defaults() {
        let node: Node<()> = Node::new(5);
        assert_eq!(node.weight(), DEFAULT_WEIGHT);
        assert_eq!(node.status(), NodeStatus::NotRequesting);
        assert!(node.payload().is_none());
        assert!(node.children().is_empty());
    }

    #[test]
    fn try_new_rejects_reserved_ids() {
        assert_eq!(
            Node::<()>::try_new(0).unwrap_err(),
            Error::InvalidStreamId(0)
        );
        assert!(Node::<()>::try_new(0x8000_0001).is_err());
        assert!(Node::<()>::try_new(1).is_ok());
    }

    #[test]
    fn weight_validation() {
        assert_eq!(validate_weight(1), Ok(1));
        assert_eq!(validate_weight(256), Ok(256));
        assert_eq!(validate_weight(0), Err(Error::InvalidWeight(0)));
        assert_eq!(validate_weight(257), Err(Error::InvalidWeight(257)));
    }

    #[test]
    fn status_directives() {
        let mut node: Node<()> = Node::new(1);

        assert!(!node.apply_status(StatusUpdate::NoChange));
        assert_eq!(node.status(), NodeStatus::NotRequesting);

        assert!(node.apply_status(NodeStatus::WriteLatched.into()));
        assert!(node.apply_status(StatusUpdate::ResetIfLatched));
        assert_eq!(node.status(), NodeStatus::NotRequesting);

        node.apply_status(NodeStatus::RequestingWrite.into());
        assert!(!node.apply_status(StatusUpdate::ResetIfLatched));
        assert_eq!(node.status(), NodeStatus::RequestingWrite);
    }

    #[test]
    fn set_parent_moves_between_child_lists() {
        let mut arena = arena_with(&[(1, 16), (3, 16)]);
        arena.set_parent(3, 1);

        assert_eq!(child_order(&arena, ROOT_STREAM_ID), vec![1]);
        assert_eq!(child_order(&arena, 1), vec![3]);
        assert_eq!(arena.find(3).unwrap().parent(), Some(1));
        assert!(arena.is_descendant(3, 1));
        assert!(arena.is_descendant(3, ROOT_STREAM_ID));
        assert!(!arena.is_descendant(1, 3));
    }

    #[test]
    fn increment_keeps_parent_in_lockstep() {
        let mut arena = arena_with(&[(1, 16), (3, 16)]);
        arena.increment_write_count(1);
        arena.increment_write_count(1);
        arena.increment_write_count(3);

        assert_eq!(arena.find(1).unwrap().write_count, 2);
        assert_eq!(arena.find(3).unwrap().write_count, 1);
        assert_eq!(arena.find(ROOT_STREAM_ID).unwrap().children_write_count, 3);

        arena.clear_children_write_counts(ROOT_STREAM_ID);
        assert_eq!(arena.find(1).unwrap().write_count, 0);
        assert_eq!(arena.find(ROOT_STREAM_ID).unwrap().children_write_count, 0);
    }

    #[test]
    fn sort_prefers_weight_then_lower_id() {
        let mut arena = arena_with(&[(7, 16), (5, 32), (3, 16)]);
        arena.sort_children(ROOT_STREAM_ID);
        assert_eq!(child_order(&arena, ROOT_STREAM_ID), vec![5, 3, 7]);
    }

    #[test]
    fn sort_promotes_underserved_child() {
        let mut arena = arena_with(&[(1, 4), (3, 1)]);
        arena.sort_children(ROOT_STREAM_ID);
        assert_eq!(child_order(&arena, ROOT_STREAM_ID), vec![1, 3]);

        // 4 * 1 > 1 * 5 fails for stream 1, 1 * 1 > 0 * 5 holds for stream 3.
        arena.increment_write_count(1);
        arena.sort_children(ROOT_STREAM_ID);
        assert_eq!(child_order(&arena, ROOT_STREAM_ID), vec![3, 1]);
        assert!(arena.find(3).unwrap().ratio_positive);
        assert!(!arena.find(1).unwrap().ratio_positive);
    }

    #[test]
    fn single_child_is_ratio_positive() {
        let mut arena = arena_with(&[(1, 16)]);
        arena.increment_write_count(1);
        arena.sort_children(ROOT_STREAM_ID);
        assert!(arena.find(1).unwrap().ratio_positive);
    }

    #[test]
    fn next_write_exhausts_subtree_before_sibling() {
        let mut arena = arena_with(&[(1, 32), (3, 16)]);
        arena.insert(Node::new(5));
        arena.add_child(1, 5);
        arena.sort_children(ROOT_STREAM_ID);

        arena.find_mut(3).unwrap().apply_status(NodeStatus::RequestingWrite.into());
        arena.find_mut(5).unwrap().apply_status(NodeStatus::RequestingWrite.into());
        assert_eq!(arena.find_next_write(ROOT_STREAM_ID), Some(5));

        arena.find_mut(1).unwrap().apply_status(NodeStatus::RequestingWrite.into());
        assert_eq!(arena.find_next_write(ROOT_STREAM_ID), Some(1));

        arena.find_mut(1).unwrap().apply_status(NodeStatus::Closed.into());
        arena.find_mut(5).unwrap().apply_status(NodeStatus::WriteLatched.into());
        assert_eq!(arena.find_next_write(ROOT_STREAM_ID), Some(3));
    }

    #[test]
    fn root_is_never_selected() {
        let mut arena: NodeArena<()> = NodeArena::new();
        arena
            .find_mut(ROOT_STREAM_ID)
            .unwrap()
            .apply_status(NodeStatus::RequestingWrite.into());
        assert_eq!(arena.find_next_write(ROOT_STREAM_ID), None);
    }

    #[test]
    fn walk_is_preorder_in_rank_order() {
        let mut arena = arena_with(&[(1, 16), (3, 64)]);
        arena.insert(Node::new(5));
        arena.add_child(1, 5);
        arena.sort_children(ROOT_STREAM_ID);

        let order: Vec<StreamId> = arena.walk().iter().map(|n| n.stream_id()).collect();
        assert_eq!(order, vec![0, 3, 1, 5]);
    }
}
