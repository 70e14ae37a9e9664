//! Engine error type and its HTTP mapping.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use eio_core::{DecodeError, EncodeError};
use serde_json::json;
use thiserror::Error;

/// Everything that can go wrong while serving a session.
///
/// Errors raised while handling an HTTP exchange become a `400`/`403` response
/// with an engine.io error body; errors raised inside a live session are
/// published on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed packet, frame or polling body.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Packet has no wire form on the session's current transport.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Reading from or writing to the client failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No session with this id is registered.
    #[error("unknown session id {0:?}")]
    UnknownSession(String),

    /// Transport missing, unknown, or not enabled.
    #[error("transport {0:?} is unknown or not allowed")]
    UnknownTransport(String),

    /// Request conflicts with the session's transport state.
    #[error("transport mismatch: {0}")]
    TransportMismatch(String),

    /// `EIO` query parameter missing or not a supported revision.
    #[error("unsupported protocol version {0:?}")]
    UnsupportedProtocol(String),

    /// Handshake attempted with a method other than `GET`.
    #[error("bad handshake method")]
    BadHandshakeMethod,

    /// No heartbeat within `pingInterval + pingTimeout`.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// The upgrade probe did not complete in time.
    #[error("upgrade probe timed out after {0:?}")]
    UpgradeProbeTimeout(Duration),

    /// Request body larger than `maxPayload`.
    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: u64,
    },

    /// The session is closing or closed.
    #[error("session closed")]
    SessionClosed,

    /// Rejected by a request hook.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl EngineError {
    /// engine.io error code sent in HTTP error bodies.
    pub fn code(&self) -> u8 {
        match self {
            Self::UnknownTransport(_) => 0,
            Self::UnknownSession(_) => 1,
            Self::BadHandshakeMethod => 2,
            Self::Decode(_)
            | Self::Encode(_)
            | Self::Transport(_)
            | Self::TransportMismatch(_)
            | Self::HeartbeatTimeout
            | Self::UpgradeProbeTimeout(_)
            | Self::PayloadTooLarge { .. }
            | Self::SessionClosed => 3,
            Self::Forbidden(_) => 4,
            Self::UnsupportedProtocol(_) => 5,
        }
    }

    /// Standard message for [`code`](Self::code).
    pub fn code_message(&self) -> &'static str {
        match self.code() {
            0 => "Transport unknown",
            1 => "Session ID unknown",
            2 => "Bad handshake method",
            4 => "Forbidden",
            5 => "Unsupported protocol version",
            _ => "Bad request",
        }
    }

    /// HTTP status for this error.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable snake_case label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Encode(_) => "encode",
            Self::Transport(_) => "transport",
            Self::UnknownSession(_) => "unknown_session",
            Self::UnknownTransport(_) => "unknown_transport",
            Self::TransportMismatch(_) => "transport_mismatch",
            Self::UnsupportedProtocol(_) => "unsupported_protocol",
            Self::BadHandshakeMethod => "bad_handshake_method",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::UpgradeProbeTimeout(_) => "upgrade_probe_timeout",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::SessionClosed => "session_closed",
            Self::Forbidden(_) => "forbidden",
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.code(),
            "message": self.code_message(),
        });
        (self.http_status(), Json(body)).into_response()
    }
}
