//! Duplicate suppression and per-publisher ordering.
//!
//! For every (stream, partition, publisher, chain) key the tracker keeps
//! the highest delivered sequence number and a bounded cache of recent
//! message fingerprints, and classifies each incoming message as new, a
//! duplicate, or a gap. Gap detection is diagnostic — flood dissemination
//! does not stall on gaps, so a gapped message is still accepted for
//! forwarding.
//!
//! The fingerprint cache bounds memory against unbounded publisher chains;
//! its capacity is sized so that normal out-of-order arrival windows do
//! not misclassify as duplicates.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::{Duration, Instant},
};

use rivulet_primitives::{ChainKey, MessageRef, StreamPartition};
use tracing::trace;

/// Default capacity of the per-chain fingerprint cache.
pub const DEFAULT_FINGERPRINT_CAPACITY: usize = 128;

/// Outcome of classifying an incoming message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// First sighting; deliver and forward.
    New,
    /// Already delivered (or too old to tell apart); drop.
    Duplicate,
    /// New, but the chain skipped ahead. Deliver and forward anyway; the
    /// gap is surfaced for diagnostics only.
    Gap {
        /// The sequence number that was expected next.
        expected: u64,
        /// The sequence number that actually arrived.
        actual: u64,
    },
}

impl Classification {
    /// Whether a message with this classification is accepted for
    /// delivery and forwarding.
    pub fn is_deliverable(self) -> bool {
        !matches!(self, Classification::Duplicate)
    }
}

/// Fingerprint of a message within one chain.
type Fingerprint = (u64, u64); // (timestamp, sequence_no)

/// Ordering state for a single message chain.
#[derive(Debug)]
struct ChainState {
    /// Highest sequence number accepted for delivery.
    last_delivered_seq: Option<u64>,
    /// Recently delivered fingerprints, FIFO-evicted at capacity.
    recent: HashSet<Fingerprint>,
    /// Insertion order backing `recent`.
    order: VecDeque<Fingerprint>,
    /// Last time this chain was touched, for idle eviction.
    last_seen: Instant,
}

impl ChainState {
    fn new() -> Self {
        Self {
            last_delivered_seq: None,
            recent: HashSet::new(),
            order: VecDeque::new(),
            last_seen: Instant::now(),
        }
    }

    fn remember(&mut self, fingerprint: Fingerprint, capacity: usize) {
        if !self.recent.insert(fingerprint) {
            return;
        }
        self.order.push_back(fingerprint);
        while self.order.len() > capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.recent.remove(&evicted);
            }
        }
    }
}

/// Per-chain duplicate and ordering tracker.
///
/// `classify` is read-only; callers that accept a message for forwarding
/// must follow up with [`DedupTracker::record_delivered`]. Under
/// concurrent execution the classify→record pair for one chain must not
/// interleave, which the owning reactor guarantees by processing one event
/// at a time.
#[derive(Debug)]
pub struct DedupTracker {
    fingerprint_capacity: usize,
    chains: HashMap<ChainKey, ChainState>,
}

impl Default for DedupTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupTracker {
    /// Create a tracker with the default fingerprint capacity.
    pub fn new() -> Self {
        Self::with_fingerprint_capacity(DEFAULT_FINGERPRINT_CAPACITY)
    }

    /// Create a tracker with a custom per-chain fingerprint capacity.
    pub fn with_fingerprint_capacity(fingerprint_capacity: usize) -> Self {
        Self {
            fingerprint_capacity,
            chains: HashMap::new(),
        }
    }

    /// Classify an incoming message against its chain's state.
    pub fn classify(&self, reference: &MessageRef) -> Classification {
        let Some(state) = self.chains.get(&reference.chain) else {
            // First message on this chain — order cannot yet be judged.
            return Classification::New;
        };

        if state
            .recent
            .contains(&(reference.timestamp, reference.sequence_no))
        {
            return Classification::Duplicate;
        }

        match state.last_delivered_seq {
            None => Classification::New,
            Some(last) if reference.sequence_no == last + 1 => Classification::New,
            Some(last) if reference.sequence_no > last + 1 => Classification::Gap {
                expected: last + 1,
                actual: reference.sequence_no,
            },
            // At or below the delivered watermark with no fingerprint left:
            // a late duplicate whose fingerprint was already evicted.
            Some(_) => Classification::Duplicate,
        }
    }

    /// Record that a message was accepted for delivery and forwarding.
    ///
    /// Advances the chain's delivered watermark (never backwards) and
    /// remembers the fingerprint.
    pub fn record_delivered(&mut self, reference: &MessageRef) {
        let capacity = self.fingerprint_capacity;
        let state = self
            .chains
            .entry(reference.chain.clone())
            .or_insert_with(ChainState::new);
        state.remember((reference.timestamp, reference.sequence_no), capacity);
        state.last_delivered_seq = Some(
            state
                .last_delivered_seq
                .map_or(reference.sequence_no, |last| last.max(reference.sequence_no)),
        );
        state.last_seen = Instant::now();
    }

    /// Drop all chain state scoped to a partition (local interest gone).
    pub fn drop_partition(&mut self, partition: &StreamPartition) {
        self.chains
            .retain(|key, _| &key.stream_partition != partition);
    }

    /// Evict chains idle for longer than `max_idle`. Returns how many were
    /// dropped.
    pub fn evict_idle(&mut self, max_idle: Duration) -> usize {
        let before = self.chains.len();
        self.chains
            .retain(|_, state| state.last_seen.elapsed() <= max_idle);
        let evicted = before - self.chains.len();
        if evicted > 0 {
            trace!(evicted, "evicted idle chains");
        }
        evicted
    }

    /// Number of chains currently tracked.
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rivulet_primitives::StreamPartition;

    use super::*;

    fn make_ref(seq: u64) -> MessageRef {
        make_ref_on("s", 0, seq)
    }

    fn make_ref_on(stream: &str, partition: u32, seq: u64) -> MessageRef {
        MessageRef::new(
            ChainKey {
                stream_partition: StreamPartition::new(stream, partition),
                publisher_id: "p".into(),
                msg_chain_id: "c1".into(),
            },
            // Timestamps track sequence numbers in these tests.
            1_000 + seq,
            seq,
        )
    }

    #[test]
    fn test_first_message_is_new() {
        let tracker = DedupTracker::new();
        assert_eq!(tracker.classify(&make_ref(42)), Classification::New);
    }

    #[test]
    fn test_recorded_message_is_duplicate_forever() {
        let mut tracker = DedupTracker::new();
        let reference = make_ref(1);

        assert_eq!(tracker.classify(&reference), Classification::New);
        tracker.record_delivered(&reference);

        for _ in 0..3 {
            assert_eq!(tracker.classify(&reference), Classification::Duplicate);
        }
    }

    #[test]
    fn test_in_order_gap_and_late_arrival() {
        let mut tracker = DedupTracker::new();
        for seq in 1..=5 {
            let reference = make_ref(seq);
            tracker.record_delivered(&reference);
        }

        // In-order successor.
        assert_eq!(tracker.classify(&make_ref(6)), Classification::New);

        // Skip ahead: gap diagnosed, watermark advances on record.
        assert_eq!(
            tracker.classify(&make_ref(9)),
            Classification::Gap {
                expected: 6,
                actual: 9
            }
        );
        tracker.record_delivered(&make_ref(9));

        // Now at or below the watermark without a fingerprint: duplicate.
        assert_eq!(tracker.classify(&make_ref(7)), Classification::Duplicate);
    }

    #[test]
    fn test_watermark_never_regresses() {
        let mut tracker = DedupTracker::new();
        tracker.record_delivered(&make_ref(9));
        tracker.record_delivered(&make_ref(3));

        // 10 is the successor of the high watermark.
        assert_eq!(tracker.classify(&make_ref(10)), Classification::New);
    }

    #[test]
    fn test_fingerprint_eviction_is_fifo() {
        let mut tracker = DedupTracker::with_fingerprint_capacity(2);
        for seq in 1..=3 {
            tracker.record_delivered(&make_ref(seq));
        }

        // Fingerprint for seq 1 was evicted, but the watermark still
        // classifies it defensively as a duplicate.
        assert_eq!(tracker.classify(&make_ref(1)), Classification::Duplicate);
        // The two retained fingerprints hit the cache directly.
        assert_eq!(tracker.classify(&make_ref(2)), Classification::Duplicate);
        assert_eq!(tracker.classify(&make_ref(3)), Classification::Duplicate);
    }

    #[test]
    fn test_gap_is_deliverable() {
        assert!(Classification::New.is_deliverable());
        assert!(
            Classification::Gap {
                expected: 1,
                actual: 5
            }
            .is_deliverable()
        );
        assert!(!Classification::Duplicate.is_deliverable());
    }

    #[test]
    fn test_drop_partition_clears_chains() {
        let mut tracker = DedupTracker::new();
        tracker.record_delivered(&make_ref_on("a", 0, 1));
        tracker.record_delivered(&make_ref_on("a", 1, 1));
        tracker.record_delivered(&make_ref_on("b", 0, 1));
        assert_eq!(tracker.chain_count(), 3);

        tracker.drop_partition(&StreamPartition::new("a", 0));
        assert_eq!(tracker.chain_count(), 2);

        // State for the dropped partition restarts from scratch.
        assert_eq!(tracker.classify(&make_ref_on("a", 0, 1)), Classification::New);
    }

    #[test]
    fn test_evict_idle() {
        let mut tracker = DedupTracker::new();
        tracker.record_delivered(&make_ref(1));

        assert_eq!(tracker.evict_idle(Duration::from_secs(60)), 0);
        assert_eq!(tracker.evict_idle(Duration::ZERO), 1);
        assert_eq!(tracker.chain_count(), 0);
    }

    #[test]
    fn test_chains_are_independent() {
        let mut tracker = DedupTracker::new();
        tracker.record_delivered(&make_ref(5));

        let mut other_chain = make_ref(1);
        other_chain.chain.msg_chain_id = "c2".into();
        assert_matches!(tracker.classify(&other_chain), Classification::New);
    }
}
