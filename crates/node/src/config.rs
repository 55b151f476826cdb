//! Node configuration.

use std::time::Duration;

use rivulet_dedup::DEFAULT_FINGERPRINT_CAPACITY;

/// Default maximum neighbors per stream-partition.
pub const DEFAULT_MAX_NEIGHBORS_PER_NODE: usize = 4;

/// Default low-water mark below which a partition self-heals without
/// waiting for the tracker.
pub const DEFAULT_NEIGHBOR_LOW_WATERMARK: usize = 2;

/// Default interval between status reports to the tracker.
pub const DEFAULT_STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval for housekeeping (idle chain eviction).
pub const DEFAULT_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// Default idle timeout after which a chain's ordering state is dropped.
pub const DEFAULT_CHAIN_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default initial backoff for bootstrap tracker connection attempts.
pub const DEFAULT_BOOTSTRAP_BACKOFF: Duration = Duration::from_secs(1);

/// Default number of bootstrap attempts before giving up.
pub const DEFAULT_BOOTSTRAP_MAX_ATTEMPTS: usize = 8;

/// Configuration for a network node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Maximum neighbors to hold per stream-partition.
    pub max_neighbors_per_node: usize,

    /// When a partition's neighbor count falls below this, the node
    /// eagerly dials candidates from its distance index instead of
    /// waiting for the next tracker instruction.
    pub neighbor_low_watermark: usize,

    /// Cadence of status reports to the tracker. Reports are also sent
    /// immediately on membership changes.
    pub status_report_interval: Duration,

    /// Cadence of idle-state housekeeping.
    pub housekeeping_interval: Duration,

    /// Chains with no traffic for this long have their ordering state
    /// dropped.
    pub chain_idle_timeout: Duration,

    /// Capacity of the per-chain duplicate fingerprint cache.
    pub fingerprint_capacity: usize,

    /// Initial backoff between bootstrap tracker connection attempts
    /// (doubles per attempt). Peer-to-peer dials are never retried — the
    /// tracker supplies replacements.
    pub bootstrap_backoff: Duration,

    /// Bootstrap attempts before startup fails.
    pub bootstrap_max_attempts: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            max_neighbors_per_node: DEFAULT_MAX_NEIGHBORS_PER_NODE,
            neighbor_low_watermark: DEFAULT_NEIGHBOR_LOW_WATERMARK,
            status_report_interval: DEFAULT_STATUS_REPORT_INTERVAL,
            housekeeping_interval: DEFAULT_HOUSEKEEPING_INTERVAL,
            chain_idle_timeout: DEFAULT_CHAIN_IDLE_TIMEOUT,
            fingerprint_capacity: DEFAULT_FINGERPRINT_CAPACITY,
            bootstrap_backoff: DEFAULT_BOOTSTRAP_BACKOFF,
            bootstrap_max_attempts: DEFAULT_BOOTSTRAP_MAX_ATTEMPTS,
        }
    }
}

impl NodeConfig {
    /// Set the maximum neighbors per partition.
    pub fn with_max_neighbors_per_node(mut self, count: usize) -> Self {
        self.max_neighbors_per_node = count;
        self
    }

    /// Set the self-heal low-water mark.
    pub fn with_neighbor_low_watermark(mut self, count: usize) -> Self {
        self.neighbor_low_watermark = count;
        self
    }

    /// Set the status report interval.
    pub fn with_status_report_interval(mut self, interval: Duration) -> Self {
        self.status_report_interval = interval;
        self
    }

    /// Set the per-chain fingerprint cache capacity.
    pub fn with_fingerprint_capacity(mut self, capacity: usize) -> Self {
        self.fingerprint_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.max_neighbors_per_node, DEFAULT_MAX_NEIGHBORS_PER_NODE);
        assert_eq!(config.neighbor_low_watermark, DEFAULT_NEIGHBOR_LOW_WATERMARK);
        assert!(config.neighbor_low_watermark <= config.max_neighbors_per_node);
    }

    #[test]
    fn test_builders() {
        let config = NodeConfig::default()
            .with_max_neighbors_per_node(2)
            .with_neighbor_low_watermark(1)
            .with_status_report_interval(Duration::from_secs(5));
        assert_eq!(config.max_neighbors_per_node, 2);
        assert_eq!(config.neighbor_low_watermark, 1);
        assert_eq!(config.status_report_interval, Duration::from_secs(5));
    }
}
