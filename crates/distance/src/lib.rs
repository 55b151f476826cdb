//! Distance-ranked peer index.
//!
//! Maintains a bounded set of known peer ids organized into Kademlia-style
//! k-buckets keyed by proximity order to the index's own reference id.
//! Lookups scan the handful of buckets nearest the target's prefix, so cost
//! is bounded by bucket capacity rather than the total number of known
//! peers.
//!
//! The index knows nothing about topology or messages; the node uses it to
//! self-select candidate neighbors when no tracker instruction is
//! available, and the tracker uses the same distance metric to compute
//! target topologies.

use rivulet_primitives::{MAX_PO, NodeId, distance_cmp, proximity};
use tracing::trace;

/// Number of buckets (one per possible proximity order).
const NUM_BUCKETS: usize = MAX_PO as usize + 1;

/// Default per-bucket capacity.
pub const DEFAULT_BUCKET_CAPACITY: usize = 16;

/// Bounded set of known peer ids, ranked by XOR distance.
///
/// Each bucket holds peers sharing a proximity order to the reference id.
/// A full bucket evicts its furthest entry only when the newcomer is
/// strictly closer to the reference id, so steady churn cannot degrade the
/// locality of the kept set.
pub struct DistanceIndex {
    /// The id distances are anchored to (the owning node's own id).
    base: NodeId,
    /// Maximum entries per bucket.
    bucket_capacity: usize,
    /// Peers bucketed by proximity order to `base`.
    buckets: Vec<Vec<NodeId>>,
    /// Total entries across all buckets.
    len: usize,
}

impl DistanceIndex {
    /// Create an empty index anchored at `base`.
    pub fn new(base: NodeId) -> Self {
        Self::with_bucket_capacity(base, DEFAULT_BUCKET_CAPACITY)
    }

    /// Create an empty index with a custom bucket capacity.
    pub fn with_bucket_capacity(base: NodeId, bucket_capacity: usize) -> Self {
        Self {
            base,
            bucket_capacity,
            buckets: vec![Vec::new(); NUM_BUCKETS],
            len: 0,
        }
    }

    /// The reference id the index is anchored to.
    pub fn base(&self) -> &NodeId {
        &self.base
    }

    /// Total number of indexed peers.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index holds no peers.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `id` is currently indexed.
    pub fn contains(&self, id: &NodeId) -> bool {
        let po = proximity(&self.base, id) as usize;
        self.buckets[po].iter().any(|p| p == id)
    }

    /// Insert a peer id.
    ///
    /// Returns `true` if the id was added. The reference id itself is never
    /// indexed. When the target bucket is full, the furthest entry is
    /// evicted only if the newcomer is strictly closer to the reference id;
    /// otherwise the insert is rejected.
    pub fn insert(&mut self, id: NodeId) -> bool {
        if id == self.base {
            return false;
        }
        let po = proximity(&self.base, &id) as usize;
        let capacity = self.bucket_capacity;
        let base = self.base;
        let bucket = &mut self.buckets[po];

        if bucket.iter().any(|p| *p == id) {
            return false;
        }

        if bucket.len() < capacity {
            bucket.push(id);
            self.len += 1;
            trace!(peer = %id, po, "indexed peer");
            return true;
        }

        // Bucket full: replace the furthest entry only if the newcomer is
        // strictly closer to the reference id.
        let mut furthest = 0;
        for i in 1..bucket.len() {
            if distance_cmp(&base, &bucket[i], &bucket[furthest]).is_gt() {
                furthest = i;
            }
        }
        if distance_cmp(&base, &id, &bucket[furthest]).is_lt() {
            let evicted = std::mem::replace(&mut bucket[furthest], id);
            trace!(peer = %id, evicted = %evicted, po, "replaced furthest bucket entry");
            true
        } else {
            false
        }
    }

    /// Remove a peer id. Returns `true` if it was present.
    pub fn remove(&mut self, id: &NodeId) -> bool {
        let po = proximity(&self.base, id) as usize;
        let bucket = &mut self.buckets[po];
        if let Some(pos) = bucket.iter().position(|p| p == id) {
            bucket.swap_remove(pos);
            self.len -= 1;
            true
        } else {
            false
        }
    }

    /// The `k` indexed peers nearest to `target`, ascending by distance,
    /// ties broken by id.
    ///
    /// Scans the bucket matching the target's prefix and widens to adjacent
    /// buckets until `k` candidates are collected, then orders the pool by
    /// distance to the target. Returns fewer than `k` ids when the index
    /// holds fewer — not an error.
    pub fn nearest(&self, target: &NodeId, k: usize) -> Vec<NodeId> {
        if k == 0 || self.len == 0 {
            return Vec::new();
        }

        let center = proximity(&self.base, target) as usize;
        let mut candidates: Vec<NodeId> = Vec::new();

        // Widen symmetrically around the target's bucket until enough
        // candidates are pooled or every bucket has been scanned.
        for offset in 0..NUM_BUCKETS {
            if center + offset < NUM_BUCKETS {
                candidates.extend_from_slice(&self.buckets[center + offset]);
            }
            if offset > 0 && center >= offset {
                candidates.extend_from_slice(&self.buckets[center - offset]);
            }
            if candidates.len() >= k {
                break;
            }
        }

        candidates.sort_by(|a, b| distance_cmp(target, a, b).then_with(|| a.cmp(b)));
        candidates.truncate(k);
        candidates
    }

    /// Iterate over every indexed peer (bucket order, not distance order).
    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.buckets.iter().flatten()
    }

    /// Occupancy of each bucket, for status logging.
    pub fn bucket_sizes(&self) -> Vec<usize> {
        self.buckets.iter().map(Vec::len).collect()
    }
}

impl std::fmt::Debug for DistanceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistanceIndex")
            .field("base", &self.base)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rivulet_primitives::{NODE_ID_LENGTH, distance};

    use super::*;

    fn id_from_byte(b: u8) -> NodeId {
        let mut bytes = [0u8; NODE_ID_LENGTH];
        bytes[0] = b;
        NodeId::new(bytes)
    }

    #[test]
    fn test_insert_remove_contains() {
        let mut index = DistanceIndex::new(id_from_byte(0x00));
        let peer = id_from_byte(0x80);

        assert!(index.insert(peer));
        assert!(!index.insert(peer)); // already present
        assert!(index.contains(&peer));
        assert_eq!(index.len(), 1);

        assert!(index.remove(&peer));
        assert!(!index.remove(&peer)); // already removed
        assert!(index.is_empty());
    }

    #[test]
    fn test_never_indexes_self() {
        let base = id_from_byte(0x42);
        let mut index = DistanceIndex::new(base);
        assert!(!index.insert(base));
        assert!(index.is_empty());
    }

    #[test]
    fn test_full_bucket_keeps_closer_entry() {
        let base = id_from_byte(0x00);
        let mut index = DistanceIndex::with_bucket_capacity(base, 2);

        // All of these land in the PO-0 bucket; with base 0x00… the first
        // byte is the distance.
        assert!(index.insert(id_from_byte(0x80)));
        assert!(index.insert(id_from_byte(0xc0)));

        // Further than both kept entries: rejected.
        assert!(!index.insert(id_from_byte(0xff)));
        assert!(!index.contains(&id_from_byte(0xff)));

        // Strictly closer than the furthest (0xc0): evicts it.
        assert!(index.insert(id_from_byte(0xa0)));
        assert!(index.contains(&id_from_byte(0xa0)));
        assert!(!index.contains(&id_from_byte(0xc0)));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let base = id_from_byte(0x00);
        let mut index = DistanceIndex::new(base);
        for b in [0x80, 0x40, 0x20, 0x10, 0x08] {
            index.insert(id_from_byte(b));
        }

        let target = id_from_byte(0x08);
        let nearest = index.nearest(&target, 3);
        assert_eq!(nearest.len(), 3);
        assert_eq!(nearest[0], id_from_byte(0x08)); // distance zero
        for pair in nearest.windows(2) {
            assert!(distance(&target, &pair[0]) <= distance(&target, &pair[1]));
        }
    }

    #[test]
    fn test_nearest_returns_fewer_than_k() {
        let base = id_from_byte(0x00);
        let mut index = DistanceIndex::new(base);
        index.insert(id_from_byte(0x01));
        index.insert(id_from_byte(0x02));

        assert_eq!(index.nearest(&id_from_byte(0xf0), 10).len(), 2);
        assert!(index.nearest(&id_from_byte(0xf0), 0).is_empty());
    }

    #[test]
    fn test_bucket_sizes() {
        let base = id_from_byte(0x00);
        let mut index = DistanceIndex::new(base);
        index.insert(id_from_byte(0x80)); // PO 0
        index.insert(id_from_byte(0xc0)); // PO 0
        index.insert(id_from_byte(0x40)); // PO 1

        let sizes = index.bucket_sizes();
        assert_eq!(sizes[0], 2);
        assert_eq!(sizes[1], 1);
        assert_eq!(sizes[2], 0);
    }

    proptest! {
        #[test]
        fn prop_nearest_sorted_and_bounded(
            seeds in proptest::collection::vec(any::<[u8; NODE_ID_LENGTH]>(), 1..64),
            target: [u8; NODE_ID_LENGTH],
            k in 0usize..16,
        ) {
            let base = NodeId::new([0u8; NODE_ID_LENGTH]);
            let mut index = DistanceIndex::new(base);
            for seed in seeds {
                index.insert(NodeId::new(seed));
            }
            let target = NodeId::new(target);

            let nearest = index.nearest(&target, k);
            prop_assert!(nearest.len() <= k);
            for pair in nearest.windows(2) {
                prop_assert!(distance(&target, &pair[0]) <= distance(&target, &pair[1]));
            }
        }
    }
}
