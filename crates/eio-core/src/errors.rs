//! Error types for the frame codec.

use thiserror::Error;

use crate::packet::PacketType;

/// A frame or polling batch could not be decoded.
///
/// Decoding never drops bytes silently: every malformed input maps to one of
/// these variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input (or one packet inside a batch) was empty.
    #[error("empty packet")]
    Empty,

    /// The packet type tag is not one of `0`..=`6`.
    #[error("unknown packet type tag {0:?}")]
    UnknownPacketType(char),

    /// A binary frame started with a type byte outside `0..=6`.
    #[error("unknown binary packet type byte {0}")]
    UnknownBinaryType(u8),

    /// A length prefix was missing, non-numeric, or overflowed.
    #[error("malformed length prefix {0:?}")]
    InvalidLengthPrefix(String),

    /// A length prefix did not match the bytes that followed it.
    #[error("length prefix says {expected} bytes but {available} are available")]
    LengthMismatch {
        /// Byte length announced by the prefix.
        expected: usize,
        /// Bytes actually available (or usable) after the prefix.
        available: usize,
    },

    /// A base64-encoded binary payload could not be decoded.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    /// A polling body was not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// A packet has no representation in the requested wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// `EIO=4` polling batches are split on `0x1e`, so text carrying it
    /// would be read back as several packets.
    #[error("text contains the record separator and cannot be batched")]
    SeparatorInText,

    /// `EIO=4` binary frames and `b` payload entries are always messages.
    #[error("{0} packets cannot carry binary data on this protocol revision")]
    BinaryControlPacket(PacketType),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_display() {
        let err = DecodeError::UnknownPacketType('9');
        assert_eq!(err.to_string(), "unknown packet type tag '9'");
    }

    #[test]
    fn length_mismatch_display() {
        let err = DecodeError::LengthMismatch {
            expected: 99,
            available: 0,
        };
        assert_eq!(
            err.to_string(),
            "length prefix says 99 bytes but 0 are available"
        );
    }

    #[test]
    fn encode_error_display() {
        assert_eq!(
            EncodeError::BinaryControlPacket(PacketType::Ping).to_string(),
            "ping packets cannot carry binary data on this protocol revision"
        );
    }

    #[test]
    fn errors_are_comparable() {
        assert_eq!(DecodeError::Empty, DecodeError::Empty);
        assert_ne!(DecodeError::Empty, DecodeError::InvalidUtf8);
    }
}
