//! Overlay network node.
//!
//! Owns active peer connections per stream-partition, applies topology
//! instructions from a tracker, floods broadcasts with duplicate
//! suppression, and self-heals when connection failures drop a partition
//! below its neighbor low-water mark.
//!
//! # Architecture
//!
//! The node is one reactor (see [`Node::run`]) over four inputs: local API
//! commands from a [`NodeHandle`], inbound [`TransportEvent`]s, outcomes of
//! spawned connection attempts, and timers. All overlay state is owned by
//! the reactor; the only structure shared with handles is the listener
//! registry.

mod config;
mod error;
mod metrics;
mod node;
mod partition;

pub use config::{
    DEFAULT_BOOTSTRAP_BACKOFF, DEFAULT_BOOTSTRAP_MAX_ATTEMPTS, DEFAULT_CHAIN_IDLE_TIMEOUT,
    DEFAULT_HOUSEKEEPING_INTERVAL, DEFAULT_MAX_NEIGHBORS_PER_NODE,
    DEFAULT_NEIGHBOR_LOW_WATERMARK, DEFAULT_STATUS_REPORT_INTERVAL, NodeConfig,
};
pub use error::NodeError;
pub use node::{MessageListener, Node, NodeHandle};
pub use partition::PartitionLifecycle;
// Re-exported so node consumers get the transport seam without a separate
// dependency.
pub use rivulet_transport::{ConnectError, SendError, Transport, TransportEvent};
