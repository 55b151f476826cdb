//! Core primitive types for the rivulet stream network.
//!
//! This crate provides the identifier, distance and message identity types
//! shared across the network stack, kept separate to avoid circular
//! dependencies between the higher-level crates.

mod distance;
mod node_id;
mod stream;

pub use distance::{Distance, MAX_PO, distance, distance_cmp, proximity};
pub use node_id::{NODE_ID_LENGTH, NodeId, ParseNodeIdError};
pub use stream::{
    ChainKey, ChainStamper, Generation, MessageRef, MsgChainId, PrevRef, PublisherId, StreamId,
    StreamMessage, StreamPartition, TopologyInstruction,
};
