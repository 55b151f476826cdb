//! Wire protocol for the rivulet network.
//!
//! Every frame on the wire is an envelope: a three-byte header carrying the
//! protocol version (major, minor) and a message type tag, followed by a
//! postcard-serialized payload body. The set of message kinds is closed —
//! adding one is a variant addition resolved at compile time, not a runtime
//! registry mutation.
//!
//! Decoding never silently drops or mutates an envelope: an unknown tag, a
//! payload that fails deserialization, or an unsupported major version each
//! fail with the corresponding [`DecodeError`]. Minor-version payload
//! extensions (trailing bytes after a known payload) are ignored.

mod envelope;
mod message;

pub use envelope::{WIRE_VERSION_MAJOR, WIRE_VERSION_MINOR, decode, encode};
pub use message::{
    DecodeError, EncodeError, Message, MessageKind, PartitionStatus, PeerDiscoveryRequest,
    PeerDiscoveryResponse, StatusReport,
};
