//! Topology-assignment tracker.
//!
//! Nodes report which stream-partitions they serve; the tracker treats
//! each partition's participants as a point set under the XOR metric,
//! computes a bounded-degree, approximately mutual topology for it, and
//! pushes generation-stamped instructions to the affected nodes.
//! Recomputation is debounced to absorb report bursts, and silent nodes
//! are evicted on a timeout sweep.

mod config;
mod metrics;
mod topology;
mod tracker;
mod view;

pub use config::{
    DEFAULT_BUCKET_CAPACITY, DEFAULT_DEBOUNCE_WAIT, DEFAULT_MAX_NEIGHBORS_PER_NODE,
    DEFAULT_MAX_WAIT, DEFAULT_NODE_TIMEOUT, DEFAULT_SWEEP_INTERVAL, TrackerConfig,
};
pub use topology::compute_topology;
pub use tracker::{Tracker, TrackerHandle};
