//! Per-partition membership state.

use std::collections::BTreeSet;

use rivulet_primitives::{Generation, NodeId};

/// Lifecycle of a node's participation in one stream-partition.
///
/// `Inactive` is represented by absence from the node's partition map; a
/// partition enters the map as `Joining` when local interest first appears
/// and leaves it again at the end of `Leaving`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionLifecycle {
    /// Announced to the tracker; neighbors being seeded.
    Joining,
    /// Steady state: connections maintained, messages forwarded.
    Active,
    /// Local interest gone; draining before teardown.
    Leaving,
}

/// State a node holds for one stream-partition it participates in.
#[derive(Debug)]
pub(crate) struct PartitionState {
    pub(crate) lifecycle: PartitionLifecycle,
    /// Current neighbors. Ordered for deterministic iteration and status
    /// reports.
    pub(crate) neighbors: BTreeSet<NodeId>,
    /// Generation of the last applied topology instruction.
    pub(crate) applied_generation: Option<Generation>,
    /// Local subscribers (and publishers) keeping this partition alive.
    pub(crate) interest: usize,
}

impl PartitionState {
    pub(crate) fn joining(interest: usize) -> Self {
        Self {
            lifecycle: PartitionLifecycle::Joining,
            neighbors: BTreeSet::new(),
            applied_generation: None,
            interest,
        }
    }

    /// Whether the partition accepts new neighbors.
    pub(crate) fn accepts_neighbors(&self) -> bool {
        self.lifecycle != PartitionLifecycle::Leaving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_partition_is_joining() {
        let state = PartitionState::joining(1);
        assert_eq!(state.lifecycle, PartitionLifecycle::Joining);
        assert!(state.neighbors.is_empty());
        assert_eq!(state.applied_generation, None);
        assert!(state.accepts_neighbors());
    }

    #[test]
    fn test_leaving_rejects_neighbors() {
        let mut state = PartitionState::joining(0);
        state.lifecycle = PartitionLifecycle::Leaving;
        assert!(!state.accepts_neighbors());
    }
}
