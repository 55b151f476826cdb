//! Node metrics.

use metrics::Counter;

/// Counters for message dissemination and membership churn.
#[derive(Clone, Debug)]
pub(crate) struct NodeMetrics {
    /// Messages published through the local API.
    pub(crate) published_total: Counter,
    /// Messages forwarded to neighbors.
    pub(crate) forwarded_total: Counter,
    /// Duplicate broadcasts dropped.
    pub(crate) duplicates_dropped_total: Counter,
    /// Sequence gaps observed.
    pub(crate) gaps_total: Counter,
    /// Envelopes that failed to decode.
    pub(crate) decode_errors_total: Counter,
    /// Neighbor additions and removals.
    pub(crate) neighbor_churn_total: Counter,
    /// Topology instructions discarded as stale.
    pub(crate) stale_instructions_total: Counter,
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self {
            published_total: metrics::counter!("node.publish.messages_total"),
            forwarded_total: metrics::counter!("node.broadcast.forwarded_total"),
            duplicates_dropped_total: metrics::counter!("node.broadcast.duplicates_dropped_total"),
            gaps_total: metrics::counter!("node.broadcast.gaps_total"),
            decode_errors_total: metrics::counter!("node.wire.decode_errors_total"),
            neighbor_churn_total: metrics::counter!("node.neighbors.churn_total"),
            stale_instructions_total: metrics::counter!("node.topology.stale_instructions_total"),
        }
    }
}
