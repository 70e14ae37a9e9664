//! Runtime configuration.
//!
//! [`EngineConfig`] is what the engine reads while serving sessions;
//! [`ServerConfig`] is what the HTTP wrapper binds with. Both are built from
//! [`EngineSettings`] and passed explicitly to their constructors.

use std::time::Duration;

use eio_core::TransportKind;
use eio_settings::{EngineSettings, ServerSettings, SettingsError};

/// Engine-wide session and transport configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Heartbeat interval announced in the handshake.
    pub ping_interval: Duration,
    /// Heartbeat grace period announced in the handshake.
    pub ping_timeout: Duration,
    /// Bound on the upgrade probe exchange.
    pub upgrade_timeout: Duration,
    /// How long a polling GET is held before it is released with `noop`.
    pub poll_timeout: Duration,
    /// Largest accepted request body / websocket message in bytes.
    pub max_payload: u64,
    /// Allowed transports.
    pub transports: Vec<TransportKind>,
    /// Whether polling sessions may upgrade to websocket.
    pub allow_upgrades: bool,
    /// Consecutive decode failures tolerated before a session is closed.
    pub max_decode_errors: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(20_000),
            upgrade_timeout: Duration::from_millis(10_000),
            poll_timeout: Duration::from_millis(25_000),
            max_payload: 1_000_000,
            transports: vec![TransportKind::Polling, TransportKind::Websocket],
            allow_upgrades: true,
            max_decode_errors: 3,
        }
    }
}

impl EngineConfig {
    /// Whether `kind` is in the allowed transport list.
    pub fn allows(&self, kind: TransportKind) -> bool {
        self.transports.contains(&kind)
    }

    /// Transport names a session opened on `kind` may upgrade to.
    pub fn upgrades_for(&self, kind: TransportKind) -> Vec<String> {
        if kind == TransportKind::Polling
            && self.allow_upgrades
            && self.allows(TransportKind::Websocket)
        {
            vec![TransportKind::Websocket.as_str().to_string()]
        } else {
            Vec::new()
        }
    }

    /// Longest silence tolerated between two heartbeat packets.
    pub fn heartbeat_deadline(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }

    /// `max_payload` as a `usize`, saturating on narrow targets.
    pub fn max_payload_bytes(&self) -> usize {
        usize::try_from(self.max_payload).unwrap_or(usize::MAX)
    }
}

impl TryFrom<&EngineSettings> for EngineConfig {
    type Error = SettingsError;

    fn try_from(settings: &EngineSettings) -> Result<Self, Self::Error> {
        settings.validate()?;
        let engine = &settings.engine;
        Ok(Self {
            ping_interval: Duration::from_millis(engine.ping_interval_ms),
            ping_timeout: Duration::from_millis(engine.ping_timeout_ms),
            upgrade_timeout: Duration::from_millis(engine.upgrade_timeout_ms),
            poll_timeout: Duration::from_millis(engine.poll_timeout_ms),
            max_payload: engine.max_payload,
            transports: engine.transport_kinds()?,
            allow_upgrades: engine.allow_upgrades,
            max_decode_errors: engine.max_decode_errors,
        })
    }
}

/// Listener configuration for [`EngineServer`](crate::server::EngineServer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Route serving both transports.
    pub path: String,
    /// Attach a permissive CORS layer.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            path: "/engine.io/".into(),
            cors: false,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            path: settings.path.clone(),
            cors: settings.cors,
        }
    }
}
