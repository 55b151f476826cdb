//! Tracker configuration.
//!
//! # Stabilization timing
//!
//! Status reports mark partitions dirty; recomputation is debounced so a
//! burst of near-simultaneous reports (typically at startup) collapses
//! into one recompute per partition:
//!
//! - **Debounce wait** (`debounce_wait`, default 100ms): quiet period that
//!   must follow the last dirtying report before recomputing.
//! - **Max wait** (`max_wait`, default 2s): hard bound on staleness — a
//!   partition is recomputed at most this long after the first report that
//!   dirtied it, however busy the reports keep coming.

use std::time::Duration;

/// Default maximum neighbors assigned per node per partition.
pub const DEFAULT_MAX_NEIGHBORS_PER_NODE: usize = 4;

/// Default debounce quiet period before a recompute.
pub const DEFAULT_DEBOUNCE_WAIT: Duration = Duration::from_millis(100);

/// Default cap on how long a dirty partition may wait for recomputation.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2);

/// Default silence after which a node is evicted from the tracker view.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(90);

/// Default interval of the eviction sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Default k-bucket capacity of the tracker's per-partition indexes.
///
/// Generous compared to a node's index: the tracker ranks whole
/// partitions' memberships, not a neighborhood.
pub const DEFAULT_BUCKET_CAPACITY: usize = 128;

/// Configuration for a tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum neighbors assigned per node per partition.
    pub max_neighbors_per_node: usize,

    /// Quiet period after the last dirtying report before recomputing.
    pub debounce_wait: Duration,

    /// Upper bound on recomputation delay after the first dirtying report.
    pub max_wait: Duration,

    /// A node reporting nothing for this long is evicted and its
    /// partitions recomputed without it.
    pub node_timeout: Duration,

    /// Cadence of the timeout-eviction sweep.
    pub sweep_interval: Duration,

    /// K-bucket capacity of the per-partition distance indexes.
    pub bucket_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_neighbors_per_node: DEFAULT_MAX_NEIGHBORS_PER_NODE,
            debounce_wait: DEFAULT_DEBOUNCE_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
            node_timeout: DEFAULT_NODE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
        }
    }
}

impl TrackerConfig {
    /// Set the maximum neighbors assigned per node.
    pub fn with_max_neighbors_per_node(mut self, count: usize) -> Self {
        self.max_neighbors_per_node = count;
        self
    }

    /// Set the stabilization debounce window.
    pub fn with_debounce_wait(mut self, wait: Duration) -> Self {
        self.debounce_wait = wait;
        self
    }

    /// Set the stabilization staleness bound.
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Set the node liveness timeout.
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }
}
