//! Tree Events
//!
//! Structural changes and write selections can be reported to an
//! [`EventSink`]. Scheduling never reads anything back from the sink.

use super::node::StreamId;

/// Something that happened to the dependency tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// A stream joined the tree.
    Added {
        stream_id: StreamId,
        parent: StreamId,
        weight: u16,
        exclusive: bool,
    },

    /// A stream left the tree; `orphans` children moved up to `parent`.
    Removed {
        stream_id: StreamId,
        parent: StreamId,
        orphans: usize,
    },

    /// A stream's weight changed without a move.
    Reprioritized { stream_id: StreamId, weight: u16 },

    /// A stream moved under a new parent.
    Reparented {
        stream_id: StreamId,
        old_parent: StreamId,
        new_parent: StreamId,
        weight: u16,
    },

    /// A stream became the only child of `parent`, adopting `adopted`
    /// former siblings.
    MadeExclusive {
        stream_id: StreamId,
        parent: StreamId,
        adopted: usize,
    },

    /// A stream was picked for the next write.
    Selected { stream_id: StreamId },
}

/// Receiver for [`TreeEvent`]s.
///
/// Called with the tree lock held; implementations must not call back
/// into the tree.
pub trait EventSink: Send {
    fn record(&mut self, event: TreeEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&mut self, _event: TreeEvent) {}
}

/// Forwards events to `tracing` under the `h2_priority::events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&mut self, event: TreeEvent) {
        match event {
            TreeEvent::Added {
                stream_id,
                parent,
                weight,
                exclusive,
            } => tracing::debug!(
                target: "h2_priority::events",
                stream_id,
                parent,
                weight,
                exclusive,
                "stream added"
            ),
            TreeEvent::Removed {
                stream_id,
                parent,
                orphans,
            } => tracing::debug!(
                target: "h2_priority::events",
                stream_id,
                parent,
                orphans,
                "stream removed"
            ),
            TreeEvent::Reprioritized { stream_id, weight } => tracing::debug!(
                target: "h2_priority::events",
                stream_id,
                weight,
                "stream reprioritized"
            ),
            TreeEvent::Reparented {
                stream_id,
                old_parent,
                new_parent,
                weight,
            } => tracing::debug!(
                target: "h2_priority::events",
                stream_id,
                old_parent,
                new_parent,
                weight,
                "stream reparented"
            ),
            TreeEvent::MadeExclusive {
                stream_id,
                parent,
                adopted,
            } => tracing::debug!(
                target: "h2_priority::events",
                stream_id,
                parent,
                adopted,
                "exclusive dependency"
            ),
            TreeEvent::Selected { stream_id } => tracing::trace!(
                target: "h2_priority::events",
                stream_id,
                "selected for write"
            ),
        }
    }
}

impl<F> EventSink for F
where
    F: FnMut(TreeEvent) + Send,
{
    fn record(&mut self, event: TreeEvent) {
        self(event)
    }
}
