//! Session lifecycle states and close reasons.

use std::fmt;

/// Lifecycle of a session.
///
/// ```text
/// Opening ─► Open ◄─► Upgrading
///              │          │
///              ▼          ▼
///           Closing ─► Closed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// Session created, `open` packet not yet queued.
    Opening,
    /// Normal bidirectional traffic.
    Open,
    /// A websocket is being probed to replace the polling transport.
    Upgrading,
    /// Tearing down.
    Closing,
    /// Terminal.
    Closed,
}

impl ReadyState {
    /// Whether the session accepts application sends.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Opening | Self::Open | Self::Upgrading)
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Upgrading => "upgrading",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Closed by the application.
    ForcedClose,
    /// The client sent `close` or its transport went away.
    TransportClose,
    /// The active transport failed.
    TransportError,
    /// No heartbeat within `pingInterval + pingTimeout`.
    PingTimeout,
    /// Decode-error budget exhausted.
    ParseError,
    /// The server is shutting down.
    ServerShutdown,
}

impl CloseReason {
    /// Wire-compatible reason string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForcedClose => "forced close",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::PingTimeout => "ping timeout",
            Self::ParseError => "parse error",
            Self::ServerShutdown => "server shutting down",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_states() {
        assert!(ReadyState::Opening.is_live());
        assert!(ReadyState::Open.is_live());
        assert!(ReadyState::Upgrading.is_live());
        assert!(!ReadyState::Closing.is_live());
        assert!(!ReadyState::Closed.is_live());
    }

    #[test]
    fn reason_strings() {
        assert_eq!(CloseReason::PingTimeout.to_string(), "ping timeout");
        assert_eq!(CloseReason::ParseError.to_string(), "parse error");
        assert_eq!(CloseReason::ServerShutdown.to_string(), "server shutting down");
        assert_eq!(CloseReason::TransportClose.as_str(), "transport close");
    }
}
