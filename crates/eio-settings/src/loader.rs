//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EngineSettings::default()`] (or a caller's base,
//!    see [`load_settings_over`])
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use eio_core::TransportKind;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::EngineSettings;

/// Default settings file, relative to the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "eio.json";

/// Resolve the settings file path (`$EIO_CONFIG`, else `./eio.json`).
pub fn settings_path() -> PathBuf {
    std::env::var("EIO_CONFIG")
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EngineSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, defaults are used. Invalid JSON or a
/// configuration that fails [`EngineSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<EngineSettings> {
    load_settings_with(path, env_lookup)
}

/// Like [`load_settings_from_path`], reading overrides through `lookup`.
pub fn load_settings_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<EngineSettings> {
    layer_settings(&EngineSettings::default(), path, lookup)
}

/// Like [`load_settings_from_path`], with `base` in place of the compiled
/// defaults. The file and the environment still win over `base`.
pub fn load_settings_over(base: &EngineSettings, path: &Path) -> Result<EngineSettings> {
    layer_settings(base, path, env_lookup)
}

/// Deep-merge the file at `path` over `base`, then apply `lookup` overrides
/// and validate.
pub fn layer_settings(
    base: &EngineSettings,
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<EngineSettings> {
    let defaults = serde_json::to_value(base)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: EngineSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut EngineSettings) {
    apply_overrides(settings, env_lookup);
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_overrides(settings: &mut EngineSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Reader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    // EIO_PORT wins over the conventional PORT.
    if let Some(v) = env.u16("PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u16("EIO_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("EIO_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.string("EIO_PATH") {
        settings.server.path = v;
    }

    // ── Engine ──────────────────────────────────────────────────────
    if let Some(v) = env.u64("EIO_PING_INTERVAL", 1, 3_600_000) {
        settings.engine.ping_interval_ms = v;
    }
    if let Some(v) = env.u64("EIO_PING_TIMEOUT", 1, 3_600_000) {
        settings.engine.ping_timeout_ms = v;
    }
    if let Some(v) = env.u64("EIO_UPGRADE_TIMEOUT", 1, 3_600_000) {
        settings.engine.upgrade_timeout_ms = v;
    }
    if let Some(v) = env.u64("EIO_POLL_TIMEOUT", 1, 3_600_000) {
        settings.engine.poll_timeout_ms = v;
    }
    if let Some(v) = env.u64("EIO_MAX_PAYLOAD", 1, 1_073_741_824) {
        settings.engine.max_payload = v;
    }
    if let Some(v) = env.transports("EIO_TRANSPORTS") {
        settings.engine.transports = v;
    }
    if let Some(v) = env.bool("EIO_ALLOW_UPGRADES") {
        settings.engine.allow_upgrades = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("EIO_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("EIO_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a comma-separated transport list; every entry must be known.
pub fn parse_transports(val: &str) -> Option<Vec<String>> {
    let names: Vec<String> = val
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() || names.iter().any(|n| TransportKind::from_str(n).is_err()) {
        return None;
    }
    Some(names)
}

// ── Override readers (thin wrappers) ────────────────────────────────────────

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

struct Reader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Reader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid {kind} env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "boolean", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn transports(&self, name: &str) -> Option<Vec<String>> {
        self.parsed(name, "transport list", parse_transports)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
