//! # eio-settings
//!
//! Layered configuration for the engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`EngineSettings::default()`]
//! 2. **Settings file**: `$EIO_CONFIG` or `./eio.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PORT` / `EIO_*` overrides (highest priority)
//!
//! The result is an explicit value handed to the engine; there is no global
//! settings instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, layer_settings, load_settings,
    load_settings_from_path, load_settings_over, load_settings_with, settings_path,
};
pub use types::{EngineSettings, LoggingSettings, ServerSettings, TransportSettings};
