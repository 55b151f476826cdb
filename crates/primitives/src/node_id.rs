//! Node identifiers.

use std::{fmt, str::FromStr};

/// Length of a node identifier in bytes.
pub const NODE_ID_LENGTH: usize = 20;

/// Opaque identifier of a network participant.
///
/// A real deployment derives this from a cryptographic key at startup; the
/// network layers only ever compare ids and measure XOR distance between
/// them, so the origin of the bytes is irrelevant here.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId([u8; NODE_ID_LENGTH]);

impl NodeId {
    /// Create a node id from raw bytes.
    pub const fn new(bytes: [u8; NODE_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Generate a random node id (ephemeral identities and tests).
    pub fn random() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; NODE_ID_LENGTH];
        rand::rng().fill(&mut bytes);
        Self(bytes)
    }

    /// View the id as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Consume the id, returning the raw bytes.
    pub const fn into_inner(self) -> [u8; NODE_ID_LENGTH] {
        self.0
    }
}

impl From<[u8; NODE_ID_LENGTH]> for NodeId {
    fn from(bytes: [u8; NODE_ID_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

/// Error parsing a node id from its hex representation.
#[derive(Debug, thiserror::Error)]
pub enum ParseNodeIdError {
    /// The input was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    /// The decoded byte string had the wrong length.
    #[error("invalid length: expected {NODE_ID_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let decoded = hex::decode(s)?;
        let bytes: [u8; NODE_ID_LENGTH] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| ParseNodeIdError::InvalidLength(v.len()))?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let id = NodeId::new([0xab; NODE_ID_LENGTH]);
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_without_prefix() {
        let id: NodeId = "cc".repeat(NODE_ID_LENGTH).parse().unwrap();
        assert_eq!(id, NodeId::new([0xcc; NODE_ID_LENGTH]));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let err = "0xabcd".parse::<NodeId>().unwrap_err();
        assert!(matches!(err, ParseNodeIdError::InvalidLength(2)));
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(NodeId::random(), NodeId::random());
    }
}
