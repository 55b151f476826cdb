//! Per-partition topology computation.
//!
//! Participants are treated as a point set under the XOR metric. Each node
//! ranks the others by distance and edges are admitted mutually, nearest
//! first, while both endpoints have capacity. The result approximates a
//! navigable small-world graph — small diameter, bounded degree — without
//! any coordination beyond the tracker.

use std::collections::{BTreeMap, BTreeSet};

use rivulet_distance::DistanceIndex;
use rivulet_primitives::NodeId;

/// Compute target neighbor sets for every participant of a partition.
///
/// `index` must hold exactly the participants. Nodes are processed in id
/// order and each node's candidates in nearest-first order, so the result
/// is deterministic; ties in the underlying ranking break by id.
///
/// An edge is only kept when it fits both endpoints' capacity, so a node
/// whose nearest candidates are all saturated ends up under-connected (or
/// isolated) until churn frees capacity — the tracker prefers that over
/// violating the degree bound.
pub fn compute_topology(
    index: &DistanceIndex,
    participants: &BTreeSet<NodeId>,
    max_neighbors: usize,
) -> BTreeMap<NodeId, BTreeSet<NodeId>> {
    let mut targets: BTreeMap<NodeId, BTreeSet<NodeId>> = participants
        .iter()
        .map(|node| (*node, BTreeSet::new()))
        .collect();
    if max_neighbors == 0 || participants.len() < 2 {
        return targets;
    }

    // Rank more candidates than the degree bound so saturated picks can
    // fall through to the next-nearest.
    let lookup = max_neighbors * 2 + 1;

    for node in participants {
        let preferences = index.nearest(node, lookup);
        for peer in preferences {
            if peer == *node || !participants.contains(&peer) {
                continue;
            }
            let node_full = targets.get(node).is_none_or(|set| set.len() >= max_neighbors);
            if node_full {
                break;
            }
            let peer_full = targets.get(&peer).is_none_or(|set| set.len() >= max_neighbors);
            if peer_full {
                continue;
            }
            // Admit the edge mutually.
            if let Some(set) = targets.get_mut(node) {
                set.insert(peer);
            }
            if let Some(set) = targets.get_mut(&peer) {
                set.insert(*node);
            }
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use rivulet_primitives::NODE_ID_LENGTH;

    use super::*;

    fn id_from_byte(b: u8) -> NodeId {
        let mut bytes = [0u8; NODE_ID_LENGTH];
        bytes[0] = b;
        NodeId::new(bytes)
    }

    fn setup(ids: &[u8]) -> (DistanceIndex, BTreeSet<NodeId>) {
        let mut index = DistanceIndex::new(NodeId::new([0xee; NODE_ID_LENGTH]));
        let mut participants = BTreeSet::new();
        for &b in ids {
            let id = id_from_byte(b);
            index.insert(id);
            participants.insert(id);
        }
        (index, participants)
    }

    #[test]
    fn test_mutual_nearest_pair_with_degree_one() {
        // A=0x00 and B=0x01 are each other's nearest; C=0xff is left
        // isolated because B has no capacity to reciprocate.
        let (index, participants) = setup(&[0x00, 0x01, 0xff]);
        let targets = compute_topology(&index, &participants, 1);

        let a = id_from_byte(0x00);
        let b = id_from_byte(0x01);
        let c = id_from_byte(0xff);

        assert_eq!(targets[&a], BTreeSet::from([b]));
        assert_eq!(targets[&b], BTreeSet::from([a]));
        assert!(targets[&c].is_empty());
    }

    #[test]
    fn test_degree_bound_is_respected() {
        let (index, participants) = setup(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        let targets = compute_topology(&index, &participants, 2);

        for (node, neighbors) in &targets {
            assert!(neighbors.len() <= 2, "{node} exceeds degree bound");
            assert!(!neighbors.contains(node), "{node} neighbors itself");
        }
    }

    #[test]
    fn test_edges_are_symmetric() {
        let (index, participants) = setup(&[0x00, 0x10, 0x20, 0x80, 0x90, 0xa0]);
        let targets = compute_topology(&index, &participants, 3);

        for (node, neighbors) in &targets {
            for peer in neighbors {
                assert!(
                    targets[peer].contains(node),
                    "edge {node} -> {peer} not reciprocated"
                );
            }
        }
    }

    #[test]
    fn test_two_nodes_pair_up() {
        let (index, participants) = setup(&[0x11, 0x99]);
        let targets = compute_topology(&index, &participants, 4);
        assert_eq!(targets[&id_from_byte(0x11)], BTreeSet::from([id_from_byte(0x99)]));
        assert_eq!(targets[&id_from_byte(0x99)], BTreeSet::from([id_from_byte(0x11)]));
    }

    #[test]
    fn test_single_node_gets_empty_set() {
        let (index, participants) = setup(&[0x42]);
        let targets = compute_topology(&index, &participants, 4);
        assert!(targets[&id_from_byte(0x42)].is_empty());
    }

    #[test]
    fn test_connected_cluster_with_enough_capacity() {
        // With degree bound >= n-1 every pair connects.
        let (index, participants) = setup(&[0x00, 0x01, 0x02, 0x03]);
        let targets = compute_topology(&index, &participants, 3);
        for neighbors in targets.values() {
            assert_eq!(neighbors.len(), 3);
        }
    }
}
