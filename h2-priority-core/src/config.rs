//! Tree configuration

use crate::error::Result;
use crate::tree::{validate_weight, DEFAULT_WEIGHT};

/// Per-connection scheduler settings.
///
/// Only obtainable through [`TreeConfig::default`] or a validated
/// [`TreeConfigBuilder`], so `default_weight` is always in 1..=256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    default_weight: u16,
    default_priority_on_unknown_parent: bool,
    emit_selection_events: bool,
}

impl TreeConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> TreeConfigBuilder {
        TreeConfigBuilder::new()
    }

    /// Weight given to a stream that falls back to the default priority.
    pub fn default_weight(&self) -> u16 {
        self.default_weight
    }

    /// Whether a stream naming a parent that is not in the tree gets the
    /// default priority (RFC 7540 Section 5.3.1). When off, such updates fail.
    pub fn default_priority_on_unknown_parent(&self) -> bool {
        self.default_priority_on_unknown_parent
    }

    /// Whether every write selection is reported to the event sink.
    pub fn emit_selection_events(&self) -> bool {
        self.emit_selection_events
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            default_weight: DEFAULT_WEIGHT,
            default_priority_on_unknown_parent: true,
            emit_selection_events: false,
        }
    }
}

/// Builder for [`TreeConfig`].
#[derive(Debug, Clone)]
pub struct TreeConfigBuilder {
    default_weight: u32,
    default_priority_on_unknown_parent: bool,
    emit_selection_events: bool,
}

impl TreeConfigBuilder {
    /// Create a builder holding the default settings.
    pub fn new() -> Self {
        let defaults = TreeConfig::default();
        Self {
            default_weight: defaults.default_weight as u32,
            default_priority_on_unknown_parent: defaults.default_priority_on_unknown_parent,
            emit_selection_events: defaults.emit_selection_events,
        }
    }

    /// Weight for the default priority fallback; checked by `build`.
    pub fn default_weight(mut self, weight: u32) -> Self {
        self.default_weight = weight;
        self
    }

    /// Enable or disable the unknown-parent fallback.
    pub fn default_priority_on_unknown_parent(mut self, enabled: bool) -> Self {
        self.default_priority_on_unknown_parent = enabled;
        self
    }

    /// Enable or disable `Selected` events.
    pub fn emit_selection_events(mut self, enabled: bool) -> Self {
        self.emit_selection_events = enabled;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<TreeConfig> {
        Ok(TreeConfig {
            default_weight: validate_weight(self.default_weight)?,
            default_priority_on_unknown_parent: self.default_priority_on_unknown_parent,
            emit_selection_events: self.emit_selection_events,
        })
    }
}

impl Default for TreeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn defaults() {
        let config = TreeConfig::builder().build().unwrap();
        assert_eq!(config, TreeConfig::default());
        assert_eq!(config.default_weight(), 16);
        assert!(config.default_priority_on_unknown_parent());
        assert!(!config.emit_selection_events());
    }

    #[test]
    fn builder_overrides() {
        let config = TreeConfig::builder()
            .default_weight(200)
            .default_priority_on_unknown_parent(false)
            .emit_selection_events(true)
            .build()
            .unwrap();
        assert_eq!(config.default_weight(), 200);
        assert!(!config.default_priority_on_unknown_parent());
        assert!(config.emit_selection_events());
    }

    #[test]
    fn builder_rejects_bad_weight() {
        let err = TreeConfig::builder().default_weight(0).build().unwrap_err();
        assert_eq!(err, Error::InvalidWeight(0));

        let err = TreeConfig::builder().default_weight(257).build().unwrap_err();
        assert_eq!(err, Error::InvalidWeight(257));
    }

    #[test]
    fn every_built_config_has_a_usable_weight() {
        for weight in 0..=300u32 {
            if let Ok(config) = TreeConfig::builder().default_weight(weight).build() {
                assert_eq!(validate_weight(config.default_weight() as u32), Ok(weight as u16));
            }
        }
        assert!(validate_weight(TreeConfig::default().default_weight() as u32).is_ok());
    }
}
