//! Tracker metrics.

use metrics::Counter;

/// Counters for topology maintenance activity.
#[derive(Clone, Debug)]
pub(crate) struct TrackerMetrics {
    /// Status reports processed.
    pub(crate) reports_total: Counter,
    /// Partition topology recomputations.
    pub(crate) recomputations_total: Counter,
    /// Topology instructions pushed to nodes.
    pub(crate) instructions_sent_total: Counter,
    /// Nodes evicted for missing their report deadline.
    pub(crate) nodes_evicted_total: Counter,
    /// Peer discovery requests answered.
    pub(crate) discovery_requests_total: Counter,
}

impl Default for TrackerMetrics {
    fn default() -> Self {
        Self {
            reports_total: metrics::counter!("tracker.reports_total"),
            recomputations_total: metrics::counter!("tracker.recomputations_total"),
            instructions_sent_total: metrics::counter!("tracker.instructions_sent_total"),
            nodes_evicted_total: metrics::counter!("tracker.nodes_evicted_total"),
            discovery_requests_total: metrics::counter!("tracker.discovery_requests_total"),
        }
    }
}
