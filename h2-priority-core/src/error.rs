//! Error types
//!
//! Tree operations report "not found" with a plain `false`; these errors
//! describe why a value was rejected at the public boundary.

use crate::tree::StreamId;

/// Prioritization errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Weight outside the 1..=256 range
    #[error("Invalid weight: {0} (must be between 1 and 256)")]
    InvalidWeight(u32),

    /// Stream ID that cannot name a prioritized stream
    #[error("Invalid stream ID: {0}")]
    InvalidStreamId(u32),

    /// A stream declared a dependency on itself (RFC 7540 Section 5.3.1)
    #[error("Stream {0} cannot depend on itself")]
    SelfDependency(StreamId),

    /// Stream not present in the tree
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Stream already present in the tree
    #[error("Stream already in tree: {0}")]
    DuplicateStream(StreamId),

    /// The requested parent sits inside the stream's own subtree
    #[error("Stream {parent} is a descendant of stream {stream_id}")]
    DependencyCycle { stream_id: StreamId, parent: StreamId },
}

/// Result type for prioritization operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            Error::InvalidWeight(0).to_string(),
            "Invalid weight: 0 (must be between 1 and 256)"
        );
        assert_eq!(
            Error::SelfDependency(7).to_string(),
            "Stream 7 cannot depend on itself"
        );
        assert_eq!(Error::StreamNotFound(3).to_string(), "Stream not found: 3");
    }
}
