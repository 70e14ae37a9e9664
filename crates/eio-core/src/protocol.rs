//! Protocol revisions and transport names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Protocol revision negotiated through the `EIO` query parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Length-prefixed polling batches; the client sends heartbeat pings.
    V3,
    /// Record-separated polling batches; the server sends heartbeat pings.
    V4,
}

impl ProtocolVersion {
    /// Parse the value of the `EIO` query parameter.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "3" => Some(Self::V3),
            "4" => Some(Self::V4),
            _ => None,
        }
    }

    /// Whether the server drives the heartbeat by sending `ping`.
    pub fn server_pings(self) -> bool {
        matches!(self, Self::V4)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V3 => f.write_str("3"),
            Self::V4 => f.write_str("4"),
        }
    }
}

/// Concrete byte-transfer mechanism carrying a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// HTTP long-polling.
    Polling,
    /// Persistent websocket channel.
    Websocket,
}

impl TransportKind {
    /// Wire name (`polling` / `websocket`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::Websocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" => Ok(Self::Polling),
            "websocket" => Ok(Self::Websocket),
            other => Err(other.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_versions() {
        assert_eq!(ProtocolVersion::parse("3"), Some(ProtocolVersion::V3));
        assert_eq!(ProtocolVersion::parse("4"), Some(ProtocolVersion::V4));
        assert_eq!(ProtocolVersion::parse("5"), None);
        assert_eq!(ProtocolVersion::parse(""), None);
    }

    #[test]
    fn heartbeat_direction() {
        assert!(ProtocolVersion::V4.server_pings());
        assert!(!ProtocolVersion::V3.server_pings());
    }

    #[test]
    fn transport_names() {
        assert_eq!("polling".parse::<TransportKind>(), Ok(TransportKind::Polling));
        assert_eq!(
            "websocket".parse::<TransportKind>(),
            Ok(TransportKind::Websocket)
        );
        assert_eq!(
            "flashsocket".parse::<TransportKind>(),
            Err("flashsocket".to_owned())
        );
        assert_eq!(TransportKind::Websocket.to_string(), "websocket");
    }

    #[test]
    fn transport_serde_lowercase() {
        let json = serde_json::to_string(&TransportKind::Polling).unwrap();
        assert_eq!(json, "\"polling\"");
        let back: TransportKind = serde_json::from_str("\"websocket\"").unwrap();
        assert_eq!(back, TransportKind::Websocket);
    }
}
