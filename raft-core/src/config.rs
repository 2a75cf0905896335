//! Pure-core tunables.
//!
//! Mirrors the teacher crate's `Config`/builder pair, narrowed to the handful of knobs
//! that are decided purely from in-memory state and therefore belong in the core rather
//! than in the driver (which owns timers, transport, and persistence).

/// Runtime configuration for a [`crate::state::ReplicaState`].
///
/// Cheap to clone; typically constructed once per replica and shared behind an `Arc` by
/// the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaftCoreConfig {
    /// Maximum number of entries placed in a single `AppendEntries`/heartbeat send. Caps
    /// memory and message size when a peer is far behind; the remainder goes out on
    /// subsequent heartbeats.
    pub max_payload_entries: usize,
}

impl Default for RaftCoreConfig {
    fn default() -> Self {
        Self { max_payload_entries: 300 }
    }
}

impl RaftCoreConfig {
    pub fn builder() -> RaftCoreConfigBuilder {
        RaftCoreConfigBuilder::default()
    }
}

/// Builder for [`RaftCoreConfig`], following the teacher crate's `ConfigBuilder` pattern.
#[derive(Clone, Debug, Default)]
pub struct RaftCoreConfigBuilder {
    max_payload_entries: Option<usize>,
}

impl RaftCoreConfigBuilder {
    pub fn max_payload_entries(mut self, n: usize) -> Self {
        self.max_payload_entries = Some(n);
        self
    }

    pub fn build(self) -> RaftCoreConfig {
        let defaults = RaftCoreConfig::default();
        RaftCoreConfig { max_payload_entries: self.max_payload_entries.unwrap_or(defaults.max_payload_entries) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_falls_back_to_defaults() {
        let cfg = RaftCoreConfig::builder().build();
        assert_eq!(cfg, RaftCoreConfig::default());
    }

    #[test]
    fn builder_overrides_batch_size() {
        let cfg = RaftCoreConfig::builder().max_payload_entries(16).build();
        assert_eq!(cfg.max_payload_entries, 16);
    }
}
