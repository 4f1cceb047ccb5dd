//! Priority blocks from PRIORITY and HEADERS frames
//!
//! Frame decoding happens elsewhere; this module only maps the decoded
//! fields (RFC 7540 Section 6.3) onto tree terms.

use crate::error::{Error, Result};
use crate::tree::{StreamId, MAX_STREAM_ID};

/// Dependency, weight and exclusive flag of one priority block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySpec {
    /// Stream this stream depends on; 0 for the root.
    pub dependency: StreamId,
    /// Weight in 1..=256.
    pub weight: u16,
    pub exclusive: bool,
}

impl PrioritySpec {
    pub fn new(dependency: StreamId, weight: u16, exclusive: bool) -> Self {
        Self {
            dependency,
            weight,
            exclusive,
        }
    }

    /// Build from frame fields. The weight octet carries `weight - 1`.
    pub fn from_frame_fields(dependency: StreamId, weight_octet: u8, exclusive: bool) -> Self {
        Self::new(dependency, weight_octet as u16 + 1, exclusive)
    }

    /// Build from the 32-bit dependency word, whose high bit is the
    /// exclusive flag.
    pub fn from_dependency_word(word: u32, weight_octet: u8) -> Self {
        Self::from_frame_fields(word & MAX_STREAM_ID, weight_octet, word & !MAX_STREAM_ID != 0)
    }

    /// Check the block against the stream it was received on.
    ///
    /// A self dependency is a stream error of type PROTOCOL_ERROR for the
    /// caller to raise.
    pub fn validate(&self, stream_id: StreamId) -> Result<()> {
        if self.dependency > MAX_STREAM_ID {
            return Err(Error::InvalidStreamId(self.dependency));
        }
        if self.dependency == stream_id {
            return Err(Error::SelfDependency(stream_id));
        }
        crate::tree::validate_weight(self.weight as u32)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_octet_is_offset_by_one() {
        assert_eq!(PrioritySpec::from_frame_fields(0, 0, false).weight, 1);
        assert_eq!(PrioritySpec::from_frame_fields(0, 15, false).weight, 16);
        assert_eq!(PrioritySpec::from_frame_fields(0, 255, false).weight, 256);
    }

    #[test]
    fn dependency_word_splits_exclusive_bit() {
        let spec = PrioritySpec::from_dependency_word(0x8000_0003, 31);
        assert_eq!(spec, PrioritySpec::new(3, 32, true));

        let spec = PrioritySpec::from_dependency_word(5, 0);
        assert_eq!(spec, PrioritySpec::new(5, 1, false));
    }

    #[test]
    fn validate_rejects_self_dependency() {
        let spec = PrioritySpec::new(3, 16, false);
        assert_eq!(spec.validate(3), Err(Error::SelfDependency(3)));
        assert_eq!(spec.validate(5), Ok(()));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert_eq!(
            PrioritySpec::new(0x8000_0000, 16, false).validate(1),
            Err(Error::InvalidStreamId(0x8000_0000))
        );
        assert_eq!(
            PrioritySpec::new(0, 0, false).validate(1),
            Err(Error::InvalidWeight(0))
        );
    }
}
