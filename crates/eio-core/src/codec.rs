//! Frame codec.
//!
//! Two shapes of wire data exist:
//!
//! - **Frames**: one packet per websocket message. Text packets are a type tag
//!   followed by the text; binary messages travel as binary frames (raw bytes for
//!   `EIO=4`, type byte + bytes for `EIO=3`).
//! - **Payloads**: polling bodies that batch several packets.
//!   `EIO=4` joins packets with the record separator `0x1e`; `EIO=3` prefixes
//!   every packet with its ASCII decimal byte length and `:`. Binary packets
//!   inside a payload are base64-encoded behind a `b` marker.
//!
//! ```text
//! EIO=4:  4hello<0x1e>2<0x1e>bAQID
//! EIO=3:  6:4hello1:28:b4AQID
//! ```
//!
//! Some packets have no `EIO=4` wire form: binary data on anything but a
//! message, and (inside a polling batch) text containing `0x1e`. The encoders
//! refuse those with an [`EncodeError`]; [`check_frame`] and [`check_payload`]
//! let callers reject them before queueing.

use std::fmt::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::errors::{DecodeError, EncodeError};
use crate::packet::{Packet, PacketType, Payload};
use crate::protocol::ProtocolVersion;

/// Separator between packets of an `EIO=4` polling payload.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Marker that introduces a base64 binary packet inside a text payload.
const BINARY_MARKER: char = 'b';

/// One websocket message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

/// Whether `packet` can travel as a websocket frame.
pub fn check_frame(packet: &Packet, version: ProtocolVersion) -> Result<(), EncodeError> {
    match (&packet.data, version) {
        (Some(Payload::Binary(_)), ProtocolVersion::V4)
            if packet.packet_type != PacketType::Message =>
        {
            Err(EncodeError::BinaryControlPacket(packet.packet_type))
        }
        _ => Ok(()),
    }
}

/// Whether `packet` can travel inside a polling batch.
pub fn check_payload(packet: &Packet, version: ProtocolVersion) -> Result<(), EncodeError> {
    check_frame(packet, version)?;
    match (&packet.data, version) {
        (Some(Payload::Text(text)), ProtocolVersion::V4) if text.contains(RECORD_SEPARATOR) => {
            Err(EncodeError::SeparatorInText)
        }
        _ => Ok(()),
    }
}

/// Encode a packet as a single websocket frame.
pub fn encode_frame(packet: &Packet, version: ProtocolVersion) -> Result<Frame, EncodeError> {
    check_frame(packet, version)?;
    let frame = match &packet.data {
        Some(Payload::Binary(bytes)) => match version {
            ProtocolVersion::V4 => Frame::Binary(bytes.clone()),
            ProtocolVersion::V3 => {
                let mut buf = Vec::with_capacity(bytes.len() + 1);
                buf.push(packet.packet_type.as_u8());
                buf.extend_from_slice(bytes);
                Frame::Binary(Bytes::from(buf))
            }
        },
        _ => Frame::Text(encode_packet_text(packet, version)),
    };
    Ok(frame)
}

/// Decode a single websocket frame.
pub fn decode_frame(frame: Frame, version: ProtocolVersion) -> Result<Packet, DecodeError> {
    match frame {
        Frame::Text(text) => decode_packet_text(&text, version),
        Frame::Binary(bytes) => match version {
            ProtocolVersion::V4 => Ok(Packet::message(bytes)),
            ProtocolVersion::V3 => {
                let (&tag, _) = bytes.split_first().ok_or(DecodeError::Empty)?;
                let packet_type = PacketType::from_u8(tag)?;
                Ok(Packet::with_data(packet_type, bytes.slice(1..)))
            }
        },
    }
}

/// Encode a batch of packets into one polling body.
///
/// Fails without output if any packet fails [`check_payload`].
pub fn encode_payload(packets: &[Packet], version: ProtocolVersion) -> Result<String, EncodeError> {
    let mut out = String::new();
    for (index, packet) in packets.iter().enumerate() {
        check_payload(packet, version)?;
        let encoded = encode_packet_text(packet, version);
        match version {
            ProtocolVersion::V4 => {
                if index > 0 {
                    out.push(RECORD_SEPARATOR);
                }
                out.push_str(&encoded);
            }
            ProtocolVersion::V3 => {
                let _ = write!(out, "{}:{encoded}", encoded.len());
            }
        }
    }
    Ok(out)
}

/// Decode a polling body into its ordered packets.
pub fn decode_payload(body: &str, version: ProtocolVersion) -> Result<Vec<Packet>, DecodeError> {
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    match version {
        ProtocolVersion::V4 => body
            .split(RECORD_SEPARATOR)
            .map(|part| decode_packet_text(part, version))
            .collect(),
        ProtocolVersion::V3 => decode_length_prefixed(body, version),
    }
}

/// Decode a raw polling body, rejecting invalid UTF-8.
pub fn decode_payload_bytes(
    body: &[u8],
    version: ProtocolVersion,
) -> Result<Vec<Packet>, DecodeError> {
    let text = std::str::from_utf8(body).map_err(|_| DecodeError::InvalidUtf8)?;
    decode_payload(text, version)
}

fn decode_length_prefixed(
    body: &str,
    version: ProtocolVersion,
) -> Result<Vec<Packet>, DecodeError> {
    let mut packets = Vec::new();
    let mut rest = body;

    while !rest.is_empty() {
        let Some(colon) = rest.find(':') else {
            return Err(DecodeError::InvalidLengthPrefix(rest.to_owned()));
        };
        let prefix = &rest[..colon];
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecodeError::InvalidLengthPrefix(prefix.to_owned()));
        }
        let len: usize = prefix
            .parse()
            .map_err(|_| DecodeError::InvalidLengthPrefix(prefix.to_owned()))?;

        let remaining = &rest[colon + 1..];
        if len > remaining.len() || !remaining.is_char_boundary(len) {
            return Err(DecodeError::LengthMismatch {
                expected: len,
                available: remaining.len(),
            });
        }

        packets.push(decode_packet_text(&remaining[..len], version)?);
        rest = &remaining[len..];
    }

    Ok(packets)
}

/// Text form of one packet (used in polling payloads and text frames).
fn encode_packet_text(packet: &Packet, version: ProtocolVersion) -> String {
    match &packet.data {
        None => packet.packet_type.as_char().to_string(),
        Some(Payload::Text(text)) => {
            let mut out = String::with_capacity(text.len() + 1);
            out.push(packet.packet_type.as_char());
            out.push_str(text);
            out
        }
        Some(Payload::Binary(bytes)) => {
            let mut out = String::from(BINARY_MARKER);
            if version == ProtocolVersion::V3 {
                out.push(packet.packet_type.as_char());
            }
            STANDARD.encode_string(bytes, &mut out);
            out
        }
    }
}

fn decode_packet_text(text: &str, version: ProtocolVersion) -> Result<Packet, DecodeError> {
    let mut chars = text.chars();
    let tag = chars.next().ok_or(DecodeError::Empty)?;
    let rest = chars.as_str();

    if tag == BINARY_MARKER {
        let (packet_type, encoded) = match version {
            ProtocolVersion::V4 => (PacketType::Message, rest),
            ProtocolVersion::V3 => {
                let mut inner = rest.chars();
                let ty = inner.next().ok_or(DecodeError::Empty)?;
                (PacketType::from_char(ty)?, inner.as_str())
            }
        };
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
        return Ok(Packet::with_data(packet_type, Bytes::from(bytes)));
    }

    let packet_type = PacketType::from_char(tag)?;
    if rest.is_empty() {
        Ok(Packet::new(packet_type))
    } else {
        Ok(Packet::with_data(packet_type, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    const BOTH: [ProtocolVersion; 2] = [ProtocolVersion::V3, ProtocolVersion::V4];

    fn frame_roundtrip(packet: &Packet, version: ProtocolVersion) -> Packet {
        decode_frame(encode_frame(packet, version).unwrap(), version).unwrap()
    }

    #[test]
    fn message_encodes_as_tagged_text() {
        let frame = encode_frame(&Packet::message("test"), ProtocolVersion::V4).unwrap();
        assert_eq!(frame, Frame::Text("4test".into()));
    }

    #[test]
    fn packet_without_data_is_single_digit() {
        let frame = encode_frame(&Packet::new(PacketType::Message), ProtocolVersion::V4).unwrap();
        assert_eq!(frame, Frame::Text("4".into()));
        assert_eq!(
            frame_roundtrip(&Packet::new(PacketType::Message), ProtocolVersion::V4).data,
            None
        );
    }

    #[test]
    fn empty_text_message_roundtrips() {
        let packet = Packet::message("");
        for version in BOTH {
            assert_eq!(frame_roundtrip(&packet, version), packet);
            let body = encode_payload(&[packet.clone(), Packet::message("x")], version).unwrap();
            assert_eq!(
                decode_payload(&body, version).unwrap(),
                vec![packet.clone(), Packet::message("x")]
            );
        }
    }

    #[test]
    fn open_packet_keeps_json() {
        let packet = Packet::open(r#"{"some":"json"}"#.into());
        for version in BOTH {
            assert_eq!(frame_roundtrip(&packet, version), packet);
        }
    }

    #[test]
    fn heartbeat_and_control_packets_roundtrip() {
        let packets = [
            Packet::close(),
            Packet::with_data(PacketType::Ping, "1"),
            Packet::pong(Some("1".into())),
            Packet::upgrade(),
            Packet::noop(),
        ];
        for version in BOTH {
            for packet in &packets {
                assert_eq!(&frame_roundtrip(packet, version), packet);
            }
        }
    }

    #[test]
    fn utf8_text_survives() {
        let packet = Packet::message("utf8 ✓ string");
        for version in BOTH {
            assert_eq!(frame_roundtrip(&packet, version), packet);
        }
    }

    #[test]
    fn binary_message_v4_is_raw_frame() {
        let packet = Packet::message(vec![0u8, 1, 2, 3, 4]);
        let frame = encode_frame(&packet, ProtocolVersion::V4).unwrap();
        assert_eq!(frame, Frame::Binary(Bytes::from_static(&[0, 1, 2, 3, 4])));
        assert_eq!(decode_frame(frame, ProtocolVersion::V4).unwrap(), packet);
    }

    #[test]
    fn binary_message_v3_has_type_byte() {
        let packet = Packet::message(vec![9u8, 8]);
        let frame = encode_frame(&packet, ProtocolVersion::V3).unwrap();
        assert_eq!(frame, Frame::Binary(Bytes::from_static(&[4, 9, 8])));
        assert_eq!(decode_frame(frame, ProtocolVersion::V3).unwrap(), packet);
    }

    #[test]
    fn binary_control_packet_has_no_v4_form() {
        let ping = Packet::with_data(PacketType::Ping, vec![1u8, 2]);
        assert_matches!(
            encode_frame(&ping, ProtocolVersion::V4),
            Err(EncodeError::BinaryControlPacket(PacketType::Ping))
        );
        assert_matches!(
            encode_payload(&[Packet::message("a"), ping.clone()], ProtocolVersion::V4),
            Err(EncodeError::BinaryControlPacket(PacketType::Ping))
        );
        // EIO=3 carries the type byte, so the same packet survives
        assert_eq!(frame_roundtrip(&ping, ProtocolVersion::V3), ping);
    }

    #[test]
    fn decode_rejects_bad_input() {
        for version in BOTH {
            assert_matches!(
                decode_frame(Frame::Text(String::new()), version),
                Err(DecodeError::Empty)
            );
            assert_matches!(
                decode_frame(Frame::Text(":::".into()), version),
                Err(DecodeError::UnknownPacketType(':'))
            );
            assert_matches!(
                decode_frame(Frame::Text("94103".into()), version),
                Err(DecodeError::UnknownPacketType('9'))
            );
        }
        assert_matches!(
            decode_frame(Frame::Binary(Bytes::new()), ProtocolVersion::V3),
            Err(DecodeError::Empty)
        );
        assert_matches!(
            decode_frame(Frame::Binary(Bytes::from_static(&[42, 1])), ProtocolVersion::V3),
            Err(DecodeError::UnknownBinaryType(42))
        );
    }

    #[test]
    fn v4_payload_uses_record_separator() {
        let body = encode_payload(
            &[Packet::message("€€€"), Packet::message("α")],
            ProtocolVersion::V4,
        )
        .unwrap();
        assert_eq!(body, "4€€€\u{1e}4α");
    }

    #[test]
    fn separator_in_text_cannot_be_batched_on_v4() {
        let injected = Packet::message("a\u{1e}4injected");
        assert_matches!(
            check_payload(&injected, ProtocolVersion::V4),
            Err(EncodeError::SeparatorInText)
        );
        assert_matches!(
            encode_payload(&[injected.clone(), Packet::message("b")], ProtocolVersion::V4),
            Err(EncodeError::SeparatorInText)
        );
        assert_matches!(
            encode_payload(&[Packet::message("x\u{1e}1")], ProtocolVersion::V4),
            Err(EncodeError::SeparatorInText)
        );

        // a websocket frame and an EIO=3 batch carry it unchanged
        assert_eq!(frame_roundtrip(&injected, ProtocolVersion::V4), injected);
        let body = encode_payload(&[injected.clone(), Packet::message("b")], ProtocolVersion::V3)
            .unwrap();
        assert_eq!(
            decode_payload(&body, ProtocolVersion::V3).unwrap(),
            vec![injected, Packet::message("b")]
        );
    }

    #[test]
    fn v3_payload_uses_byte_length_prefix() {
        let body = encode_payload(
            &[Packet::message("€"), Packet::ping()],
            ProtocolVersion::V3,
        )
        .unwrap();
        // "4€" is four bytes
        assert_eq!(body, "4:4€1:2");
        let decoded = decode_payload(&body, ProtocolVersion::V3).unwrap();
        assert_eq!(decoded, vec![Packet::message("€"), Packet::ping()]);
    }

    #[test]
    fn binary_inside_payload_is_base64() {
        let packets = [Packet::message(vec![1u8, 2, 3]), Packet::message("hello")];
        let v4 = encode_payload(&packets, ProtocolVersion::V4).unwrap();
        assert_eq!(v4, "bAQID\u{1e}4hello");
        let v3 = encode_payload(&packets, ProtocolVersion::V3).unwrap();
        assert_eq!(v3, "6:b4AQID6:4hello");
        for version in BOTH {
            let body = encode_payload(&packets, version).unwrap();
            assert_eq!(decode_payload(&body, version).unwrap(), packets.to_vec());
        }
    }

    #[test]
    fn mixed_binary_text_and_close() {
        let blob: Vec<u8> = (0..123).collect();
        let packets = vec![
            Packet::message(blob),
            Packet::message("hello"),
            Packet::close(),
        ];
        for version in BOTH {
            let body = encode_payload(&packets, version).unwrap();
            assert_eq!(decode_payload(&body, version).unwrap(), packets);
        }
    }

    #[test]
    fn empty_payload_rejected() {
        for version in BOTH {
            assert_matches!(decode_payload("", version), Err(DecodeError::Empty));
        }
    }

    #[test]
    fn malformed_length_prefixes_rejected() {
        let v3 = ProtocolVersion::V3;
        assert_matches!(
            decode_payload("))", v3),
            Err(DecodeError::InvalidLengthPrefix(_))
        );
        assert_matches!(
            decode_payload("aa", v3),
            Err(DecodeError::InvalidLengthPrefix(_))
        );
        assert_matches!(
            decode_payload(":4hi", v3),
            Err(DecodeError::InvalidLengthPrefix(_))
        );
        assert_matches!(
            decode_payload("-1:4", v3),
            Err(DecodeError::InvalidLengthPrefix(_))
        );
        assert_matches!(
            decode_payload("99999999999999999999999:4", v3),
            Err(DecodeError::InvalidLengthPrefix(_))
        );
        assert_matches!(
            decode_payload("99:", v3),
            Err(DecodeError::LengthMismatch {
                expected: 99,
                available: 0
            })
        );
    }

    #[test]
    fn length_prefix_must_land_on_char_boundary() {
        // "4€" is 4 bytes; a prefix of 2 would split the euro sign
        assert_matches!(
            decode_payload("2:4€", ProtocolVersion::V3),
            Err(DecodeError::LengthMismatch { expected: 2, .. })
        );
    }

    #[test]
    fn trailing_garbage_after_v3_packet_rejected() {
        assert_matches!(
            decode_payload("1:4xx", ProtocolVersion::V3),
            Err(DecodeError::InvalidLengthPrefix(_))
        );
    }

    #[test]
    fn empty_segment_in_v4_payload_rejected() {
        assert_matches!(
            decode_payload("4a\u{1e}\u{1e}4b", ProtocolVersion::V4),
            Err(DecodeError::Empty)
        );
    }

    #[test]
    fn invalid_base64_rejected() {
        assert_matches!(
            decode_payload("b!!!", ProtocolVersion::V4),
            Err(DecodeError::InvalidBase64(_))
        );
    }

    #[test]
    fn non_utf8_body_rejected() {
        assert_matches!(
            decode_payload_bytes(&[0x34, 0xff, 0xfe], ProtocolVersion::V4),
            Err(DecodeError::InvalidUtf8)
        );
    }

    fn arb_packet() -> impl Strategy<Value = Packet> {
        let packet_type = (0u8..7).prop_map(|tag| PacketType::from_u8(tag).unwrap());
        let text = (
            packet_type.clone(),
            proptest::option::of("(\\PC|\\x{1e}){0,32}"),
        )
            .prop_map(|(packet_type, data)| match data {
                Some(data) => Packet::with_data(packet_type, data),
                None => Packet::new(packet_type),
            });
        let binary = (packet_type, proptest::collection::vec(any::<u8>(), 0..64))
            .prop_map(|(packet_type, bytes)| Packet::with_data(packet_type, bytes));
        prop_oneof![3 => text, 1 => binary]
    }

    fn arb_version() -> impl Strategy<Value = ProtocolVersion> {
        prop_oneof![Just(ProtocolVersion::V3), Just(ProtocolVersion::V4)]
    }

    proptest! {
        #[test]
        fn frame_decode_inverts_encode(packet in arb_packet(), version in arb_version()) {
            match encode_frame(&packet, version) {
                Ok(frame) => prop_assert_eq!(decode_frame(frame, version).unwrap(), packet),
                Err(error) => {
                    prop_assert_eq!(version, ProtocolVersion::V4);
                    prop_assert_ne!(packet.packet_type, PacketType::Message);
                    prop_assert_eq!(error, EncodeError::BinaryControlPacket(packet.packet_type));
                }
            }
        }

        #[test]
        fn payload_preserves_order(
            packets in proptest::collection::vec(arb_packet(), 1..16),
            version in arb_version(),
        ) {
            let encodable = packets.iter().all(|p| check_payload(p, version).is_ok());
            match encode_payload(&packets, version) {
                Ok(body) => {
                    prop_assert!(encodable);
                    prop_assert_eq!(decode_payload(&body, version).unwrap(), packets);
                }
                Err(_) => prop_assert!(!encodable),
            }
        }
    }
}
