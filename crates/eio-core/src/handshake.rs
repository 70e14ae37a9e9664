//! Handshake record carried by the `open` packet.

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::packet::Packet;

/// Session parameters announced to the client right after a session is created.
///
/// Serialized as `{"sid":..,"upgrades":[..],"pingInterval":..,"pingTimeout":..,"maxPayload":..}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    /// Session identifier.
    pub sid: SessionId,
    /// Transports the client may upgrade to from the current one.
    pub upgrades: Vec<String>,
    /// Heartbeat interval in milliseconds.
    pub ping_interval: u64,
    /// Heartbeat grace period in milliseconds.
    pub ping_timeout: u64,
    /// Largest accepted polling body in bytes (omitted for `EIO=3`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenPacket {
    /// Serialize to the JSON text placed in the `open` packet.
    pub fn to_json(&self) -> String {
        // Only strings and integers: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Build the `open` packet.
    pub fn to_packet(&self) -> Packet {
        Packet::open(self.to_json())
    }
}
