//! The tracker's view of partition membership.

use std::collections::{BTreeMap, BTreeSet};

use rivulet_distance::DistanceIndex;
use rivulet_primitives::{Generation, NodeId};
use tokio::time::Instant;

/// Last reported status of one participant in one partition.
#[derive(Debug)]
pub(crate) struct ParticipantStatus {
    /// When the participant last reported.
    pub(crate) last_seen: Instant,
    /// The neighbor set the participant declared.
    pub(crate) declared_neighbors: Vec<NodeId>,
    /// Self-reported load figure.
    pub(crate) load: u32,
    /// The target set last pushed to this participant; instructions are
    /// only re-sent when the computed target differs.
    pub(crate) last_instructed: Option<BTreeSet<NodeId>>,
}

/// Everything the tracker knows about one stream-partition.
///
/// Mutated only by status reports and participant timeout eviction.
#[derive(Debug)]
pub(crate) struct PartitionView {
    /// Participants and their last reported status.
    pub(crate) participants: BTreeMap<NodeId, ParticipantStatus>,
    /// Distance ranking over the participants.
    pub(crate) index: DistanceIndex,
    /// Generation of the most recent topology computation.
    pub(crate) generation: Generation,
}

impl PartitionView {
    pub(crate) fn new(base: NodeId, bucket_capacity: usize) -> Self {
        Self {
            participants: BTreeMap::new(),
            index: DistanceIndex::with_bucket_capacity(base, bucket_capacity),
            generation: Generation::default(),
        }
    }

    /// Record a status report from `node`.
    pub(crate) fn upsert(&mut self, node: NodeId, declared_neighbors: Vec<NodeId>, load: u32) {
        use std::collections::btree_map::Entry;

        self.index.insert(node);
        match self.participants.entry(node) {
            Entry::Occupied(mut entry) => {
                let status = entry.get_mut();
                status.last_seen = Instant::now();
                status.declared_neighbors = declared_neighbors;
                status.load = load;
            }
            Entry::Vacant(entry) => {
                entry.insert(ParticipantStatus {
                    last_seen: Instant::now(),
                    declared_neighbors,
                    load,
                    last_instructed: None,
                });
            }
        }
    }

    /// Remove a participant. Returns `true` if it was present.
    pub(crate) fn remove(&mut self, node: &NodeId) -> bool {
        self.index.remove(node);
        self.participants.remove(node).is_some()
    }

    /// Ids of all current participants.
    pub(crate) fn participant_ids(&self) -> BTreeSet<NodeId> {
        self.participants.keys().copied().collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
