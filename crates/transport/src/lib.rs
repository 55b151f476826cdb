//! Transport seam.
//!
//! The core assumes a reliable, ordered, peer-addressable send primitive
//! and does not implement retransmission: a failed send is handled exactly
//! like a disconnect. Implementations deliver inbound traffic through a
//! [`TransportEvent`] channel handed to the consuming reactor at
//! construction. The wire protocol behind the trait (TCP, WebSocket, …) is
//! out of scope for the core.

use bytes::Bytes;
use rivulet_primitives::NodeId;

/// Failure to establish a connection to a peer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// The peer is not reachable at its known address.
    #[error("peer {0} unreachable")]
    Unreachable(NodeId),
    /// The connection attempt timed out.
    #[error("connection to {0} timed out")]
    Timeout(NodeId),
}

/// Failure to send a frame over an established connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    /// The connection is gone.
    #[error("connection to {0} closed")]
    Closed(NodeId),
}

/// Inbound events surfaced by a transport implementation.
#[derive(Debug)]
pub enum TransportEvent {
    /// A frame arrived from a connected peer.
    Frame {
        /// The sending peer.
        from: NodeId,
        /// The raw envelope bytes.
        bytes: Bytes,
    },
    /// A connection closed (remote hangup or network failure).
    Disconnected {
        /// The peer the connection belonged to.
        peer: NodeId,
    },
}

/// A reliable, ordered, peer-addressable transport.
///
/// Frames sent to one peer are delivered in send order; there is no
/// cross-peer ordering.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish a connection to `peer`.
    ///
    /// Idempotent: connecting to an already-connected peer succeeds.
    async fn connect(&self, peer: NodeId) -> Result<(), ConnectError>;

    /// Send an envelope frame to a connected peer.
    async fn send(&self, peer: NodeId, frame: Bytes) -> Result<(), SendError>;

    /// Tear down the connection to `peer`, if any. Frames already accepted
    /// for sending are delivered first (drain before teardown).
    async fn disconnect(&self, peer: NodeId);
}
