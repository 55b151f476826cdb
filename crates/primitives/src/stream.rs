//! Stream, partition and message identity types.
//!
//! A stream is split into independently disseminated partitions. Within a
//! partition, each publisher orders its messages along one or more message
//! chains; a [`MessageRef`] pins a message to its position on such a chain.

use bytes::Bytes;
use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Identifier of a stream.
#[derive(
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    AsRef,
    Serialize,
    Deserialize,
)]
#[from(String, &str)]
pub struct StreamId(String);

/// Identifier of the publisher that produced a message.
#[derive(
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    AsRef,
    Serialize,
    Deserialize,
)]
#[from(String, &str)]
pub struct PublisherId(String);

/// Identifier of a publisher-defined message chain.
#[derive(
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    AsRef,
    Serialize,
    Deserialize,
)]
#[from(String, &str)]
pub struct MsgChainId(String);

/// A (stream, partition) pair: the unit of dissemination.
///
/// Topology, neighbor sets and ordering state are all scoped to one of
/// these.
#[derive(
    Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("{stream}#{partition}")]
pub struct StreamPartition {
    /// The stream this partition belongs to.
    pub stream: StreamId,
    /// Partition number within the stream.
    pub partition: u32,
}

impl StreamPartition {
    /// Create a stream-partition key.
    pub fn new(stream: impl Into<StreamId>, partition: u32) -> Self {
        Self {
            stream: stream.into(),
            partition,
        }
    }
}

/// The (stream, partition, publisher, chain) projection of a message
/// reference: the key that scopes per-publisher ordering state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainKey {
    /// The partition the chain lives in.
    pub stream_partition: StreamPartition,
    /// The publisher that owns the chain.
    pub publisher_id: PublisherId,
    /// The publisher-chosen chain identifier.
    pub msg_chain_id: MsgChainId,
}

/// Identifies a message's position in a publisher's logical stream.
///
/// For a fixed chain the sequence number is intended to be strictly
/// increasing with the timestamp, but messages may arrive out of order or
/// duplicated over the network — receivers must tolerate both.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// The chain the message belongs to.
    pub chain: ChainKey,
    /// Publisher timestamp in milliseconds since the epoch.
    pub timestamp: u64,
    /// Position on the chain.
    pub sequence_no: u64,
}

impl MessageRef {
    /// Create a message reference.
    pub fn new(chain: ChainKey, timestamp: u64, sequence_no: u64) -> Self {
        Self {
            chain,
            timestamp,
            sequence_no,
        }
    }
}

/// Reference to the previous message on the same chain, carried alongside a
/// message so subscribers can detect missing predecessors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrevRef {
    /// Timestamp of the preceding message.
    pub timestamp: u64,
    /// Sequence number of the preceding message.
    pub sequence_no: u64,
}

/// A stream message as it travels through the overlay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Position of this message on its chain.
    pub reference: MessageRef,
    /// Position of the chain's previous message, if any.
    pub prev: Option<PrevRef>,
    /// Opaque application payload.
    pub payload: Bytes,
}

impl StreamMessage {
    /// Create a stream message.
    pub fn new(reference: MessageRef, prev: Option<PrevRef>, payload: Bytes) -> Self {
        Self {
            reference,
            prev,
            payload,
        }
    }

    /// The partition this message disseminates in.
    pub fn stream_partition(&self) -> &StreamPartition {
        &self.reference.chain.stream_partition
    }
}

/// Monotonically increasing counter distinguishing successive topology
/// instructions for a partition. Nodes discard instructions whose
/// generation is not newer than the last one they applied.
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    Serialize,
    Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    /// The successor generation.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A topology instruction: the target neighbor set a tracker wants a node
/// to hold for one partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyInstruction {
    /// The partition the instruction applies to.
    pub stream_partition: StreamPartition,
    /// Ids the node should be neighbored with.
    pub target_neighbors: Vec<NodeId>,
    /// Ordering stamp; stale instructions are discarded.
    pub generation: Generation,
}

/// Stamps successive messages on one chain.
///
/// Producers that do not assign sequence numbers themselves run payloads
/// through one of these; the node only ever sees fully stamped messages.
#[derive(Debug)]
pub struct ChainStamper {
    chain: ChainKey,
    next_seq: u64,
    prev: Option<PrevRef>,
}

impl ChainStamper {
    /// Create a stamper for a fresh chain, starting at sequence number 1.
    pub fn new(chain: ChainKey) -> Self {
        Self {
            chain,
            next_seq: 1,
            prev: None,
        }
    }

    /// Stamp a payload with the next position on the chain.
    pub fn stamp(&mut self, timestamp: u64, payload: Bytes) -> StreamMessage {
        let reference = MessageRef::new(self.chain.clone(), timestamp, self.next_seq);
        let message = StreamMessage::new(reference, self.prev, payload);
        self.prev = Some(PrevRef {
            timestamp,
            sequence_no: self.next_seq,
        });
        self.next_seq += 1;
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ChainKey {
        ChainKey {
            stream_partition: StreamPartition::new("s", 0),
            publisher_id: "p".into(),
            msg_chain_id: "c1".into(),
        }
    }

    #[test]
    fn test_stream_partition_display() {
        assert_eq!(StreamPartition::new("metrics", 3).to_string(), "metrics#3");
    }

    #[test]
    fn test_message_partition_accessor() {
        let msg = StreamMessage::new(
            MessageRef::new(chain(), 1_000, 1),
            None,
            Bytes::from_static(b"hello"),
        );
        assert_eq!(msg.stream_partition(), &StreamPartition::new("s", 0));
    }

    #[test]
    fn test_generation_ordering() {
        let g = Generation::default();
        assert!(g.next() > g);
        assert_eq!(g.next(), Generation::from(1));
    }

    #[test]
    fn test_stamper_chains_prev_refs() {
        let mut stamper = ChainStamper::new(chain());

        let first = stamper.stamp(1_000, Bytes::from_static(b"a"));
        assert_eq!(first.reference.sequence_no, 1);
        assert_eq!(first.prev, None);

        let second = stamper.stamp(1_001, Bytes::from_static(b"b"));
        assert_eq!(second.reference.sequence_no, 2);
        assert_eq!(
            second.prev,
            Some(PrevRef {
                timestamp: 1_000,
                sequence_no: 1
            })
        );
    }
}
