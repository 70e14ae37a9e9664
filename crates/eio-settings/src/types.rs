//! Settings types.
//!
//! All structs use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file only needs the keys it changes.

use std::str::FromStr;

use eio_core::TransportKind;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Transport, heartbeat and payload settings.
    pub engine: TransportSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Route serving both transports.
    pub path: String,
    /// Attach a permissive CORS layer.
    pub cors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            path: "/engine.io/".to_string(),
            cors: false,
        }
    }
}

/// Session and transport tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Heartbeat interval in milliseconds.
    pub ping_interval_ms: u64,
    /// Heartbeat grace period in milliseconds.
    pub ping_timeout_ms: u64,
    /// How long a pending upgrade may take to complete its probe.
    pub upgrade_timeout_ms: u64,
    /// How long a polling GET is held before it is released with `noop`.
    pub poll_timeout_ms: u64,
    /// Largest accepted request body in bytes.
    pub max_payload: u64,
    /// Allowed transport names (`polling`, `websocket`).
    pub transports: Vec<String>,
    /// Whether polling sessions may upgrade to websocket.
    pub allow_upgrades: bool,
    /// Consecutive malformed POST bodies tolerated before the session closes.
    pub max_decode_errors: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            ping_interval_ms: 25_000,
            ping_timeout_ms: 20_000,
            upgrade_timeout_ms: 10_000,
            poll_timeout_ms: 25_000,
            max_payload: 1_000_000,
            transports: vec!["polling".to_string(), "websocket".to_string()],
            allow_upgrades: true,
            max_decode_errors: 3,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`RUST_LOG` wins when set).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl TransportSettings {
    /// Parse the transport list into typed kinds.
    pub fn transport_kinds(&self) -> Result<Vec<TransportKind>> {
        self.transports
            .iter()
            .map(|name| {
                TransportKind::from_str(name).map_err(|unknown| {
                    SettingsError::InvalidValue(format!("unknown transport {unknown:?}"))
                })
            })
            .collect()
    }
}

impl EngineSettings {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        for (name, value) in [
            ("pingIntervalMs", engine.ping_interval_ms),
            ("pingTimeoutMs", engine.ping_timeout_ms),
            ("upgradeTimeoutMs", engine.upgrade_timeout_ms),
            ("pollTimeoutMs", engine.poll_timeout_ms),
            ("maxPayload", engine.max_payload),
        ] {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        if engine.transport_kinds()?.is_empty() {
            return Err(SettingsError::InvalidValue(
                "at least one transport must be enabled".to_string(),
            ));
        }

        if !self.server.path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "path {:?} must start with '/'",
                self.server.path
            )));
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.path, "/engine.io/");
        assert_eq!(settings.engine.ping_interval_ms, 25_000);
        assert_eq!(settings.engine.ping_timeout_ms, 20_000);
        assert_eq!(settings.engine.upgrade_timeout_ms, 10_000);
        assert_eq!(settings.engine.poll_timeout_ms, 25_000);
        assert_eq!(settings.engine.max_payload, 1_000_000);
        assert!(settings.engine.allow_upgrades);
        assert_eq!(settings.engine.max_decode_errors, 3);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn defaults_validate() {
        assert!(EngineSettings::default().validate().is_ok());
    }

    #[test]
    fn serde_camel_case() {
        let json = serde_json::to_value(EngineSettings::default()).unwrap();
        assert_eq!(json["engine"]["pingIntervalMs"], 25_000);
        assert_eq!(json["engine"]["allowUpgrades"], true);
        assert_eq!(json["server"]["path"], "/engine.io/");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"engine": {"pingIntervalMs": 500}}"#).unwrap();
        assert_eq!(settings.engine.ping_interval_ms, 500);
        assert_eq!(settings.engine.ping_timeout_ms, 20_000);
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn transport_kinds_parse() {
        let kinds = TransportSettings::default().transport_kinds().unwrap();
        assert_eq!(kinds, vec![TransportKind::Polling, TransportKind::Websocket]);
    }

    #[test]
    fn zero_interval_rejected() {
        let mut settings = EngineSettings::default();
        settings.engine.ping_interval_ms = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("pingIntervalMs"));
    }

    #[test]
    fn zero_payload_rejected() {
        let mut settings = EngineSettings::default();
        settings.engine.max_payload = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn empty_transports_rejected() {
        let mut settings = EngineSettings::default();
        settings.engine.transports.clear();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn unknown_transport_rejected() {
        let mut settings = EngineSettings::default();
        settings.engine.transports = vec!["flashsocket".to_string()];
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("flashsocket"));
    }

    #[test]
    fn relative_path_rejected() {
        let mut settings = EngineSettings::default();
        settings.server.path = "engine.io".to_string();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }
}
