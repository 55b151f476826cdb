//! Typed protocol messages and their kind tags.

use rivulet_primitives::{NodeId, StreamMessage, StreamPartition, TopologyInstruction};
use serde::{Deserialize, Serialize};

/// Per-partition slice of a node's status report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStatus {
    /// The partition being reported on.
    pub stream_partition: StreamPartition,
    /// The node's current neighbors for that partition.
    pub neighbors: Vec<NodeId>,
}

/// Periodic status report from a node to its tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// The reporting node.
    pub node_id: NodeId,
    /// One entry per partition the node currently serves.
    pub partitions: Vec<PartitionStatus>,
    /// Abstract load figure (queued events); trackers may use it to bias
    /// topology decisions.
    pub load: u32,
}

/// Request for the `k` known peers nearest to `target`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDiscoveryRequest {
    /// The id to measure distance against.
    pub target: NodeId,
    /// Maximum number of peers to return.
    pub k: u32,
}

/// Response to a [`PeerDiscoveryRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDiscoveryResponse {
    /// Peers ascending by distance to the requested target.
    pub peers: Vec<NodeId>,
}

/// The closed set of messages exchanged between nodes and trackers.
#[derive(Clone, Debug, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(
    name(MessageKind),
    derive(strum::Display, strum::IntoStaticStr, Hash),
    strum(serialize_all = "PascalCase")
)]
pub enum Message {
    /// Stream data flooding through the overlay.
    BroadcastData(StreamMessage),
    /// Node → tracker liveness and membership report.
    StatusReport(StatusReport),
    /// Tracker → node target neighbor set.
    TopologyInstruction(TopologyInstruction),
    /// Nearest-peer query.
    PeerDiscoveryRequest(PeerDiscoveryRequest),
    /// Nearest-peer reply.
    PeerDiscoveryResponse(PeerDiscoveryResponse),
}

impl Message {
    /// The kind of this message.
    pub fn kind(&self) -> MessageKind {
        self.into()
    }
}

impl MessageKind {
    /// Wire type tag for this kind.
    pub const fn type_tag(self) -> u8 {
        match self {
            MessageKind::BroadcastData => 0,
            MessageKind::StatusReport => 1,
            MessageKind::TopologyInstruction => 2,
            MessageKind::PeerDiscoveryRequest => 3,
            MessageKind::PeerDiscoveryResponse => 4,
        }
    }

    /// Resolve a wire type tag, if registered.
    pub const fn from_type_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::BroadcastData),
            1 => Some(MessageKind::StatusReport),
            2 => Some(MessageKind::TopologyInstruction),
            3 => Some(MessageKind::PeerDiscoveryRequest),
            4 => Some(MessageKind::PeerDiscoveryResponse),
            _ => None,
        }
    }

    /// Human-readable kind name for diagnostics.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Error encoding a message payload.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode {kind} payload: {source}")]
pub struct EncodeError {
    /// The kind being encoded.
    pub kind: MessageKind,
    /// Underlying serializer error.
    #[source]
    pub source: postcard::Error,
}

/// Error decoding an envelope.
///
/// Fatal to the single message only — the connection stays up, the
/// envelope is dropped and a metric incremented by the caller.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The envelope declared a newer major version than this decoder
    /// supports.
    #[error("unsupported protocol version {0} (supported: {max})", max = crate::WIRE_VERSION_MAJOR)]
    UnsupportedVersion(u8),
    /// The type tag is not registered.
    #[error("unknown message type tag {0}")]
    UnknownType(u8),
    /// The envelope or payload failed schema validation.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_roundtrip() {
        for kind in [
            MessageKind::BroadcastData,
            MessageKind::StatusReport,
            MessageKind::TopologyInstruction,
            MessageKind::PeerDiscoveryRequest,
            MessageKind::PeerDiscoveryResponse,
        ] {
            assert_eq!(MessageKind::from_type_tag(kind.type_tag()), Some(kind));
        }
        assert_eq!(MessageKind::from_type_tag(250), None);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(MessageKind::BroadcastData.name(), "BroadcastData");
        assert_eq!(MessageKind::TopologyInstruction.name(), "TopologyInstruction");
    }
}
