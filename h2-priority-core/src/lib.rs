//! H2 Priority Core
//!
//! This crate provides the stream prioritization scheduler of an HTTP/2
//! connection. It implements:
//!
//! - The weighted stream dependency tree (RFC 7540 Section 5.3)
//! - Weight-proportional write selection among sibling streams
//! - Reprioritization, including exclusive dependencies and moves into a
//!   stream's own subtree
//! - Weight redistribution when a stream leaves the tree
//!
//! Frame parsing, flow control and socket I/O belong to the surrounding
//! connection; the tree only consumes stream ids, weights and write
//! readiness, and hands back the write entry that should go out next.
//!
//! # Architecture
//!
//! - `tree`: nodes, the priority tree and its event sink
//! - `priority`: mapping of PRIORITY / HEADERS priority fields
//! - `config`: per-connection settings
//! - `error`: validation errors
//!
//! # Example
//!
//! ```rust
//! use h2_priority_core::tree::{Node, NodeStatus, PriorityTree, WriteCountAction};
//!
//! let tree = PriorityTree::new();
//! tree.add(Node::new(1).with_payload("stream 1 frame"), 0, false);
//! tree.add(Node::new(3).with_weight(64).with_payload("stream 3 frame"), 0, false);
//!
//! tree.update(1, NodeStatus::RequestingWrite.into(), WriteCountAction::NoAction, None);
//! tree.update(3, NodeStatus::RequestingWrite.into(), WriteCountAction::NoAction, None);
//!
//! // The heavier stream goes first.
//! assert_eq!(tree.next_write_entry(), Some("stream 3 frame"));
//! ```

pub mod config;
pub mod error;
pub mod priority;
pub mod tree;

pub use config::{TreeConfig, TreeConfigBuilder};
pub use error::{Error, Result};
pub use priority::PrioritySpec;
pub use tree::{PriorityTree, StreamId};
