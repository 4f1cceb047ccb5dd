//! Priority Tree
//!
//! The tree is the only mutator of the node graph. Every public operation
//! takes the tree lock for its whole duration, so one connection's frame
//! handlers and write loop may call in from different threads as long as
//! they take turns.
//!
//! # Algorithm
//!
//! Each sibling set keeps its own fairness accounting: the writes of every
//! child and their sum. After a write, the parent's children are re-ranked
//! so that a child whose share of writes has fallen below its share of the
//! weight moves to the front. Selection walks the tree in rank order and
//! picks the first stream that requests a write.
//!
//! Structural changes (new sibling, removed sibling, new weight, moved
//! subtree) reset the accounting of every sibling set they touch.
//!
//! Operations report "not found" or rejected input with `false`. The reason
//! is logged at debug level and never escalated; a stream that raced to
//! closure simply no longer needs prioritization.

use parking_lot::Mutex;
use serde::Serialize;

use super::event::{EventSink, TracingSink, TreeEvent};
use super::node::{
    validate_weight, Node, NodeArena, NodeInfo, StatusUpdate, StreamId, WriteCountAction,
    MAX_STREAM_ID, ROOT_STREAM_ID,
};
use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::priority::PrioritySpec;

/// Pre-order dump of a tree, children in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeSnapshot {
    pub nodes: Vec<NodeInfo>,
}

/// The stream dependency tree of one HTTP/2 connection.
///
/// `P` is the write entry handed back by [`next_write_entry`]; the tree
/// stores it and clones it out, nothing more.
///
/// [`next_write_entry`]: PriorityTree::next_write_entry
pub struct PriorityTree<P> {
    inner: Mutex<Inner<P>>,
}

struct Inner<P> {
    arena: NodeArena<P>,
    config: TreeConfig,
    sink: Box<dyn EventSink>,
}

impl<P> PriorityTree<P> {
    /// Create a tree holding only the root, with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create a tree holding only the root.
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                arena: NodeArena::new(),
                config,
                sink: Box::new(TracingSink),
            }),
        }
    }

    /// Replace the event sink (a [`TracingSink`] by default).
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.inner.get_mut().sink = Box::new(sink);
        self
    }

    /// Check whether a stream is in the tree.
    pub fn find(&self, stream_id: StreamId) -> bool {
        self.inner.lock().arena.contains(stream_id)
    }

    /// Number of streams in the tree, root excluded.
    pub fn len(&self) -> usize {
        self.inner.lock().arena.len()
    }

    /// True when only the root is left.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a stream under `parent_id`.
    ///
    /// Fails for the root id, ids already in the tree, out-of-range weights
    /// and unknown parents.
    pub fn add(&self, node: Node<P>, parent_id: StreamId, exclusive: bool) -> bool {
        let stream_id = node.stream_id();
        report("add", stream_id, self.inner.lock().add(node, parent_id, exclusive))
    }

    /// Make `dep_id` the only child of `parent_id`; the parent's other
    /// children become children of `dep_id`.
    pub fn make_exclusive(&self, dep_id: StreamId, parent_id: StreamId) -> bool {
        report(
            "make_exclusive",
            dep_id,
            self.inner.lock().make_exclusive(dep_id, parent_id),
        )
    }

    /// Apply a status directive, optionally count a write, and optionally
    /// attach a new write entry.
    pub fn update(
        &self,
        stream_id: StreamId,
        status: StatusUpdate,
        count_action: WriteCountAction,
        payload: Option<P>,
    ) -> bool {
        report(
            "update",
            stream_id,
            self.inner
                .lock()
                .update(stream_id, status, count_action, payload),
        )
    }

    /// Change a stream's weight in place.
    pub fn change_priority(&self, stream_id: StreamId, new_weight: u16) -> bool {
        report(
            "change_priority",
            stream_id,
            self.inner.lock().change_priority(stream_id, new_weight),
        )
    }

    /// Move a stream (with its subtree) under `new_parent_id`.
    ///
    /// If the new parent lies in the stream's own subtree, the new parent
    /// first takes the stream's old place (RFC 7540 Section 5.3.3).
    pub fn change_parent(
        &self,
        dep_id: StreamId,
        new_weight: u16,
        new_parent_id: StreamId,
        exclusive: bool,
    ) -> bool {
        report(
            "change_parent",
            dep_id,
            self.inner
                .lock()
                .change_parent(dep_id, new_weight, new_parent_id, exclusive),
        )
    }

    /// Remove a stream. Its children move to its parent and share its
    /// weight in proportion to their own.
    pub fn remove(&self, stream_id: StreamId) -> bool {
        report("remove", stream_id, self.inner.lock().remove(stream_id))
    }

    /// Apply the fields of a PRIORITY frame (or a HEADERS priority block).
    ///
    /// Only reparents when the parent or the exclusive flag asks for it.
    pub fn update_frame_parameters(
        &self,
        stream_id: StreamId,
        new_weight: u16,
        new_parent_id: StreamId,
        exclusive: bool,
    ) -> bool {
        report(
            "update_frame_parameters",
            stream_id,
            self.inner
                .lock()
                .update_frame_parameters(stream_id, new_weight, new_parent_id, exclusive),
        )
    }

    /// Apply a decoded priority block, adding the stream if needed.
    ///
    /// A dependency on a stream that is not in the tree falls back to the
    /// default priority when the configuration allows it.
    pub fn apply_priority(&self, stream_id: StreamId, spec: &PrioritySpec) -> bool {
        report(
            "apply_priority",
            stream_id,
            self.inner.lock().apply_priority(stream_id, spec),
        )
    }

    /// Stream that would be picked by the next call to `next_write_entry`.
    pub fn next_write_stream(&self) -> Option<StreamId> {
        self.inner.lock().arena.find_next_write(ROOT_STREAM_ID)
    }

    /// Scheduling state of one stream.
    pub fn node_info(&self, stream_id: StreamId) -> Option<NodeInfo> {
        self.inner.lock().arena.find(stream_id).map(Node::info)
    }

    /// Scheduling state of the whole tree.
    pub fn snapshot(&self) -> TreeSnapshot {
        let inner = self.inner.lock();
        TreeSnapshot {
            nodes: inner.arena.walk().into_iter().map(Node::info).collect(),
        }
    }
}

impl<P: Clone> PriorityTree<P> {
    /// Write entry of the stream that should write next.
    pub fn next_write_entry(&self) -> Option<P> {
        self.inner.lock().next_write_entry()
    }
}

impl<P> Default for PriorityTree<P> {
    fn default() -> Self {
        Self::new()
    }
}

fn report(op: &'static str, stream_id: StreamId, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(op, stream_id, error = %err, "priority tree operation rejected");
            false
        }
    }
}

impl<P> Inner<P> {
    fn require(&self, stream_id: StreamId) -> Result<&Node<P>> {
        self.arena
            .find(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))
    }

    /// Like `require`, but the root is not acceptable.
    fn require_stream(&self, stream_id: StreamId) -> Result<&Node<P>> {
        if stream_id == ROOT_STREAM_ID {
            return Err(Error::InvalidStreamId(stream_id));
        }
        self.require(stream_id)
    }

    fn parent_of(&self, stream_id: StreamId) -> Result<StreamId> {
        Ok(self
            .require(stream_id)?
            .parent()
            .unwrap_or(ROOT_STREAM_ID))
    }

    fn add(&mut self, node: Node<P>, parent_id: StreamId, exclusive: bool) -> Result<()> {
        let stream_id = node.stream_id();
        if stream_id == ROOT_STREAM_ID || stream_id > MAX_STREAM_ID {
            return Err(Error::InvalidStreamId(stream_id));
        }
        if self.arena.contains(stream_id) {
            return Err(Error::DuplicateStream(stream_id));
        }
        let weight = validate_weight(node.weight() as u32)?;
        self.require(parent_id)?;

        self.arena.insert(node);
        self.arena.add_child(parent_id, stream_id);
        self.sink.record(TreeEvent::Added {
            stream_id,
            parent: parent_id,
            weight,
            exclusive,
        });

        if exclusive {
            self.make_exclusive(stream_id, parent_id)
        } else {
            self.arena.reset_level(parent_id);
            Ok(())
        }
    }

    fn make_exclusive(&mut self, dep_id: StreamId, parent_id: StreamId) -> Result<()> {
        self.require_stream(dep_id)?;
        self.require(parent_id)?;
        if dep_id == parent_id {
            return Err(Error::SelfDependency(dep_id));
        }
        if self.arena.is_descendant(parent_id, dep_id) {
            return Err(Error::DependencyCycle {
                stream_id: dep_id,
                parent: parent_id,
            });
        }

        let old_parent = self.parent_of(dep_id)?;
        if old_parent != parent_id {
            self.arena.set_parent(dep_id, parent_id);
            self.arena.reset_level(old_parent);
        }

        let adopted: Vec<StreamId> = self
            .require(parent_id)?
            .children()
            .iter()
            .copied()
            .filter(|id| *id != dep_id)
            .collect();
        for sibling in &adopted {
            self.arena.set_parent(*sibling, dep_id);
        }

        // Adopted children keep their counts; the level they joined is
        // recounted so the sum stays exact.
        self.arena.reset_level(parent_id);
        self.arena.recount_children_writes(dep_id);
        self.arena.sort_children(dep_id);

        self.sink.record(TreeEvent::MadeExclusive {
            stream_id: dep_id,
            parent: parent_id,
            adopted: adopted.len(),
        });
        Ok(())
    }

    fn update(
        &mut self,
        stream_id: StreamId,
        status: StatusUpdate,
        count_action: WriteCountAction,
        payload: Option<P>,
    ) -> Result<()> {
        self.require_stream(stream_id)?;
        let node = self
            .arena
            .find_mut(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?;

        node.apply_status(status);
        if let Some(payload) = payload {
            node.set_payload(payload);
        }
        let parent = node.parent().unwrap_or(ROOT_STREAM_ID);

        if count_action == WriteCountAction::Increment {
            self.arena.increment_write_count(stream_id);
            self.arena.sort_children(parent);
        }
        Ok(())
    }

    fn change_priority(&mut self, stream_id: StreamId, new_weight: u16) -> Result<()> {
        let weight = validate_weight(new_weight as u32)?;
        self.require_stream(stream_id)?;
        let parent = self.parent_of(stream_id)?;
        self.require(parent)?;

        if let Some(node) = self.arena.find_mut(stream_id) {
            node.set_weight(weight);
        }
        self.arena.reset_level(parent);

        self.sink.record(TreeEvent::Reprioritized { stream_id, weight });
        Ok(())
    }

    fn change_parent(
        &mut self,
        dep_id: StreamId,
        new_weight: u16,
        new_parent_id: StreamId,
        exclusive: bool,
    ) -> Result<()> {
        let weight = validate_weight(new_weight as u32)?;
        self.require_stream(dep_id)?;
        self.require(new_parent_id)?;
        if dep_id == new_parent_id {
            return Err(Error::SelfDependency(dep_id));
        }
        let old_parent = self.parent_of(dep_id)?;

        if self.arena.is_descendant(new_parent_id, dep_id) {
            // The new parent is lifted into the slot `dep_id` is leaving,
            // keeping its weight, before `dep_id` moves beneath it.
            let lifted_from = self.parent_of(new_parent_id)?;
            self.arena.set_parent(new_parent_id, old_parent);
            self.arena.set_parent(dep_id, new_parent_id);
            self.set_weight(dep_id, weight);

            self.arena.reset_level(old_parent);
            self.arena.reset_level(new_parent_id);
            self.arena.reset_level(lifted_from);

            let lifted_weight = self.require(new_parent_id)?.weight();
            self.sink.record(TreeEvent::Reparented {
                stream_id: new_parent_id,
                old_parent: lifted_from,
                new_parent: old_parent,
                weight: lifted_weight,
            });
        } else {
            self.arena.set_parent(dep_id, new_parent_id);
            self.set_weight(dep_id, weight);

            self.arena.reset_level(old_parent);
            if new_parent_id != old_parent {
                self.arena.reset_level(new_parent_id);
            }
        }

        self.sink.record(TreeEvent::Reparented {
            stream_id: dep_id,
            old_parent,
            new_parent: new_parent_id,
            weight,
        });

        if exclusive {
            self.make_exclusive(dep_id, new_parent_id)?;
        }
        Ok(())
    }

    fn set_weight(&mut self, stream_id: StreamId, weight: u16) {
        if let Some(node) = self.arena.find_mut(stream_id) {
            node.set_weight(weight);
        }
    }

    fn remove(&mut self, stream_id: StreamId) -> Result<()> {
        let node = self.require_stream(stream_id)?;
        let removed_weight = node.weight() as u64;
        let parent = node.parent().unwrap_or(ROOT_STREAM_ID);
        let orphans = node.children().to_vec();

        let priority_sum: u64 = orphans
            .iter()
            .filter_map(|id| self.arena.find(*id))
            .map(|child| child.weight() as u64)
            .sum();

        for child in &orphans {
            self.arena.set_parent(*child, parent);
            if priority_sum == 0 {
                continue;
            }
            if let Some(node) = self.arena.find_mut(*child) {
                let share = removed_weight * node.weight() as u64 / priority_sum;
                node.set_weight(share.max(1) as u16);
            }
        }

        self.arena.remove_child(parent, stream_id);
        self.arena.discard(stream_id);
        self.arena.reset_level(parent);

        self.sink.record(TreeEvent::Removed {
            stream_id,
            parent,
            orphans: orphans.len(),
        });
        Ok(())
    }

    fn update_frame_parameters(
        &mut self,
        stream_id: StreamId,
        new_weight: u16,
        new_parent_id: StreamId,
        exclusive: bool,
    ) -> Result<()> {
        let node = self.require_stream(stream_id)?;
        let parent = node.parent().unwrap_or(ROOT_STREAM_ID);
        let weight = node.weight();

        if parent != new_parent_id || exclusive {
            self.change_parent(stream_id, new_weight, new_parent_id, exclusive)
        } else if weight != new_weight {
            self.change_priority(stream_id, new_weight)
        } else {
            Ok(())
        }
    }

    fn apply_priority(&mut self, stream_id: StreamId, spec: &PrioritySpec) -> Result<()> {
        spec.validate(stream_id)?;

        let (parent, weight, exclusive) = if self.arena.contains(spec.dependency) {
            (spec.dependency, spec.weight, spec.exclusive)
        } else if self.config.default_priority_on_unknown_parent() {
            tracing::debug!(
                stream_id,
                dependency = spec.dependency,
                "unknown dependency, using default priority"
            );
            (ROOT_STREAM_ID, self.config.default_weight(), false)
        } else {
            return Err(Error::StreamNotFound(spec.dependency));
        };

        if self.arena.contains(stream_id) {
            self.update_frame_parameters(stream_id, weight, parent, exclusive)
        } else {
            let node = Node::try_new(stream_id)?.with_weight(weight);
            self.add(node, parent, exclusive)
        }
    }
}

impl<P: Clone> Inner<P> {
    fn next_write_entry(&mut self) -> Option<P> {
        let stream_id = self.arena.find_next_write(ROOT_STREAM_ID)?;
        tracing::trace!(stream_id, "next write selected");
        if self.config.emit_selection_events() {
            self.sink.record(TreeEvent::Selected { stream_id });
        }
        self.arena.find(stream_id)?.payload().cloned()
    }
}
