//! Envelope framing: version header + type tag + payload body.

use bytes::{BufMut, Bytes, BytesMut};

use crate::message::{
    DecodeError, EncodeError, Message, MessageKind, PeerDiscoveryRequest, PeerDiscoveryResponse,
    StatusReport,
};

/// Major protocol version. A decoder presented with a higher major fails
/// with [`DecodeError::UnsupportedVersion`].
pub const WIRE_VERSION_MAJOR: u8 = 1;

/// Minor protocol version. Minor bumps may append payload fields; decoders
/// ignore what they do not understand.
pub const WIRE_VERSION_MINOR: u8 = 0;

/// Bytes of envelope header preceding the payload body.
const HEADER_LEN: usize = 3;

/// Encode a message into an envelope frame.
pub fn encode(message: &Message) -> Result<Bytes, EncodeError> {
    let kind = message.kind();
    let body = match message {
        Message::BroadcastData(payload) => postcard::to_allocvec(payload),
        Message::StatusReport(payload) => postcard::to_allocvec(payload),
        Message::TopologyInstruction(payload) => postcard::to_allocvec(payload),
        Message::PeerDiscoveryRequest(payload) => postcard::to_allocvec(payload),
        Message::PeerDiscoveryResponse(payload) => postcard::to_allocvec(payload),
    }
    .map_err(|source| EncodeError { kind, source })?;

    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u8(WIRE_VERSION_MAJOR);
    frame.put_u8(WIRE_VERSION_MINOR);
    frame.put_u8(kind.type_tag());
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Decode an envelope frame into a message.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let (header, body) = match bytes.split_at_checked(HEADER_LEN) {
        Some(parts) => parts,
        None => {
            return Err(DecodeError::MalformedPayload(format!(
                "envelope shorter than header: {} bytes",
                bytes.len()
            )));
        }
    };
    let (major, tag) = (header[0], header[2]);

    if major > WIRE_VERSION_MAJOR {
        return Err(DecodeError::UnsupportedVersion(major));
    }
    let kind = MessageKind::from_type_tag(tag).ok_or(DecodeError::UnknownType(tag))?;

    // take_from_bytes tolerates trailing bytes: minor-version payload
    // extensions decode cleanly and the remainder is discarded.
    fn body_of<'a, T: serde::Deserialize<'a>>(
        kind: MessageKind,
        body: &'a [u8],
    ) -> Result<T, DecodeError> {
        postcard::take_from_bytes(body)
            .map(|(payload, _rest)| payload)
            .map_err(|e| DecodeError::MalformedPayload(format!("{}: {e}", kind.name())))
    }

    Ok(match kind {
        MessageKind::BroadcastData => Message::BroadcastData(body_of(kind, body)?),
        MessageKind::StatusReport => Message::StatusReport(body_of::<StatusReport>(kind, body)?),
        MessageKind::TopologyInstruction => Message::TopologyInstruction(body_of(kind, body)?),
        MessageKind::PeerDiscoveryRequest => {
            Message::PeerDiscoveryRequest(body_of::<PeerDiscoveryRequest>(kind, body)?)
        }
        MessageKind::PeerDiscoveryResponse => {
            Message::PeerDiscoveryResponse(body_of::<PeerDiscoveryResponse>(kind, body)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use rivulet_primitives::{
        ChainKey, Generation, MessageRef, NodeId, StreamMessage, StreamPartition,
        TopologyInstruction,
    };

    use super::*;
    use crate::message::PartitionStatus;

    fn sample_broadcast() -> Message {
        let chain = ChainKey {
            stream_partition: StreamPartition::new("s", 0),
            publisher_id: "p".into(),
            msg_chain_id: "c1".into(),
        };
        Message::BroadcastData(StreamMessage::new(
            MessageRef::new(chain, 1_700_000_000_000, 1),
            None,
            Bytes::from_static(b"payload"),
        ))
    }

    #[test]
    fn test_broadcast_roundtrip() {
        let message = sample_broadcast();
        let frame = encode(&message).unwrap();
        assert_eq!(decode(&frame).unwrap(), message);
    }

    #[test]
    fn test_instruction_roundtrip() {
        let message = Message::TopologyInstruction(TopologyInstruction {
            stream_partition: StreamPartition::new("s", 2),
            target_neighbors: vec![NodeId::random(), NodeId::random()],
            generation: Generation::from(7),
        });
        let frame = encode(&message).unwrap();
        assert_eq!(decode(&frame).unwrap(), message);
    }

    #[test]
    fn test_status_report_roundtrip() {
        let message = Message::StatusReport(StatusReport {
            node_id: NodeId::random(),
            partitions: vec![PartitionStatus {
                stream_partition: StreamPartition::new("s", 0),
                neighbors: vec![NodeId::random()],
            }],
            load: 3,
        });
        let frame = encode(&message).unwrap();
        assert_eq!(decode(&frame).unwrap(), message);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let frame = [WIRE_VERSION_MAJOR, WIRE_VERSION_MINOR, 0xee];
        assert_matches!(decode(&frame), Err(DecodeError::UnknownType(0xee)));
    }

    #[test]
    fn test_newer_major_rejected() {
        let frame = [WIRE_VERSION_MAJOR + 1, 0, 0];
        assert_matches!(
            decode(&frame),
            Err(DecodeError::UnsupportedVersion(v)) if v == WIRE_VERSION_MAJOR + 1
        );
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        assert_matches!(decode(&[1]), Err(DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let frame = [WIRE_VERSION_MAJOR, 0, 2, 0xff];
        assert_matches!(decode(&frame), Err(DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn test_minor_extension_ignored() {
        // A future minor version appends fields; the decoder reads the
        // payload it knows and discards the tail.
        let frame = encode(&sample_broadcast()).unwrap();
        let mut extended = frame.to_vec();
        extended.extend_from_slice(&[0xaa, 0xbb, 0xcc]);
        extended[1] = WIRE_VERSION_MINOR + 1;
        assert_eq!(decode(&extended).unwrap(), sample_broadcast());
    }
}
