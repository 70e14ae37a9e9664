//! Packet model.

use std::fmt;

use bytes::Bytes;

use crate::errors::DecodeError;

/// The seven packet kinds of the wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Sent by the server once a session is created (`0`).
    Open,
    /// Requests closing the session (`1`).
    Close,
    /// Heartbeat / upgrade probe (`2`).
    Ping,
    /// Heartbeat / probe answer (`3`).
    Pong,
    /// Application message (`4`).
    Message,
    /// Completes a transport upgrade (`5`).
    Upgrade,
    /// Releases a suspended poll without data (`6`).
    Noop,
}

impl PacketType {
    /// All packet types in tag order.
    pub const ALL: [Self; 7] = [
        Self::Open,
        Self::Close,
        Self::Ping,
        Self::Pong,
        Self::Message,
        Self::Upgrade,
        Self::Noop,
    ];

    /// Numeric tag (`0`..=`6`).
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Close => 1,
            Self::Ping => 2,
            Self::Pong => 3,
            Self::Message => 4,
            Self::Upgrade => 5,
            Self::Noop => 6,
        }
    }

    /// ASCII tag character (`'0'`..=`'6'`).
    pub fn as_char(self) -> char {
        char::from(b'0' + self.as_u8())
    }

    /// Parse a numeric tag.
    pub fn from_u8(tag: u8) -> Result<Self, DecodeError> {
        Self::ALL
            .get(usize::from(tag))
            .copied()
            .ok_or(DecodeError::UnknownBinaryType(tag))
    }

    /// Parse an ASCII tag character.
    pub fn from_char(tag: char) -> Result<Self, DecodeError> {
        match tag {
            '0'..='6' => Ok(Self::ALL[tag as usize - '0' as usize]),
            other => Err(DecodeError::UnknownPacketType(other)),
        }
    }

    /// Lowercase name, as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Message => "message",
            Self::Upgrade => "upgrade",
            Self::Noop => "noop",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data carried by a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Bytes),
}

impl Payload {
    /// Text content, if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a binary payload.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Binary(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(bytes))
    }
}

/// One unit of framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Packet kind.
    pub packet_type: PacketType,
    /// Optional data.
    pub data: Option<Payload>,
}

impl Packet {
    /// Create a packet of the given type without data.
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            data: None,
        }
    }

    /// Create a packet with data.
    ///
    /// Empty text is indistinguishable from no data on the wire and is stored
    /// as `None`.
    pub fn with_data(packet_type: PacketType, data: impl Into<Payload>) -> Self {
        Self {
            packet_type,
            data: non_empty(Some(data.into())),
        }
    }

    /// `open` packet carrying the serialized handshake record.
    pub fn open(handshake_json: String) -> Self {
        Self::with_data(PacketType::Open, handshake_json)
    }

    /// `close` packet.
    pub fn close() -> Self {
        Self::new(PacketType::Close)
    }

    /// `ping` packet without data.
    pub fn ping() -> Self {
        Self::new(PacketType::Ping)
    }

    /// `pong` packet echoing the data of a `ping`.
    pub fn pong(data: Option<Payload>) -> Self {
        Self {
            packet_type: PacketType::Pong,
            data: non_empty(data),
        }
    }

    /// `message` packet.
    pub fn message(data: impl Into<Payload>) -> Self {
        Self::with_data(PacketType::Message, data)
    }

    /// `upgrade` packet.
    pub fn upgrade() -> Self {
        Self::new(PacketType::Upgrade)
    }

    /// `noop` packet.
    pub fn noop() -> Self {
        Self::new(PacketType::Noop)
    }

    /// Whether this is a `ping`/`pong` carrying the `probe` marker.
    pub fn is_probe(&self) -> bool {
        matches!(self.packet_type, PacketType::Ping | PacketType::Pong)
            && self.data.as_ref().and_then(Payload::as_text) == Some("probe")
    }
}

fn non_empty(data: Option<Payload>) -> Option<Payload> {
    data.filter(|data| !matches!(data, Payload::Text(text) if text.is_empty()))
}
