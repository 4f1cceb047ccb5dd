//! Stream Dependency Tree
//!
//! This module implements the HTTP/2 priority tree (RFC 7540 Section 5.3)
//! that decides which stream writes next on a connection.
//!
//! # Overview
//!
//! The tree is rooted at a synthetic stream 0. Every other node is one
//! stream, carrying:
//!
//! - A weight in 1..=256 that sets its share among its siblings
//! - A status telling whether it currently wants to write
//! - Write counters used to rank it against its siblings
//! - An opaque write entry returned to the write loop when it is picked
//!
//! A node's children are only considered once the node itself has nothing
//! to write.
//!
//! # Design Decisions
//!
//! 1. Nodes live in an arena indexed by stream id, and links are ids. A
//!    subtree moves by editing two child lists; cycles and dangling links
//!    cannot be expressed through the public API.
//!
//! 2. A single lock guards the whole tree. Structural operations touch
//!    several levels at once, so finer locking would not be sound.
//!
//! 3. Ties between equally due, equally weighted siblings go to the lower
//!    stream id.

mod event;
mod node;
mod scheduler;

pub use event::{EventSink, NoopSink, TracingSink, TreeEvent};
pub use node::{
    validate_weight, Node, NodeInfo, NodeStatus, StatusUpdate, StreamId, WriteCountAction,
    DEFAULT_WEIGHT, MAX_STREAM_ID, MAX_WEIGHT, MIN_WEIGHT, ROOT_STREAM_ID, ROOT_WEIGHT,
};
pub use scheduler::{PriorityTree, TreeSnapshot};
