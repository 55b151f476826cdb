//! In-memory transport.
//!
//! Connects node and tracker reactors through tokio channels: frames sent
//! to a registered endpoint land in its inbound queue in send order, which
//! is exactly the reliable-ordered contract the core assumes from a real
//! transport. Used by the local-network binary mode and by integration
//! tests.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rivulet_primitives::NodeId;
use rivulet_transport::{ConnectError, SendError, Transport, TransportEvent};
use tokio::sync::mpsc;

/// Per-endpoint inbound queue depth.
const INBOX_CAPACITY: usize = 1024;

type Endpoints = Arc<Mutex<HashMap<NodeId, mpsc::Sender<TransportEvent>>>>;

/// A switchboard of in-memory endpoints.
///
/// Clone freely; all clones share the same endpoint table.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Endpoints,
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint for `id`.
    ///
    /// Returns the transport to hand to the reactor and the inbound event
    /// receiver the reactor consumes. Re-registering an id replaces the
    /// previous endpoint.
    pub fn endpoint(&self, id: NodeId) -> (MemoryTransport, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.endpoints.lock().insert(id, tx);
        (
            MemoryTransport {
                id,
                endpoints: self.endpoints.clone(),
            },
            rx,
        )
    }

    /// Drop an endpoint. Peers discover the loss through failing sends,
    /// the same way a crashed process surfaces on a real network.
    pub fn kill(&self, id: &NodeId) {
        self.endpoints.lock().remove(id);
    }

    /// Whether an endpoint is registered.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.endpoints.lock().contains_key(id)
    }
}

/// One endpoint's sending half.
pub struct MemoryTransport {
    id: NodeId,
    endpoints: Endpoints,
}

impl MemoryTransport {
    fn sender_for(&self, peer: &NodeId) -> Option<mpsc::Sender<TransportEvent>> {
        // Clone out of the lock: sends must not hold it across an await.
        self.endpoints.lock().get(peer).cloned()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, peer: NodeId) -> Result<(), ConnectError> {
        if self.endpoints.lock().contains_key(&peer) {
            Ok(())
        } else {
            Err(ConnectError::Unreachable(peer))
        }
    }

    async fn send(&self, peer: NodeId, frame: Bytes) -> Result<(), SendError> {
        let Some(sender) = self.sender_for(&peer) else {
            return Err(SendError::Closed(peer));
        };
        sender
            .send(TransportEvent::Frame {
                from: self.id,
                bytes: frame,
            })
            .await
            .map_err(|_| SendError::Closed(peer))
    }

    async fn disconnect(&self, peer: NodeId) {
        // Tell the remote we hung up; frames already queued ahead of this
        // event are delivered first, which is the drain guarantee.
        if let Some(sender) = self.sender_for(&peer) {
            let _ = sender
                .send(TransportEvent::Disconnected { peer: self.id })
                .await;
        }
    }
}
