//! # chatpush-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** - [`ChatpushSettings::default()`]
//! 2. **User file** - `~/.chatpush/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** - `CHATPUSH_*` overrides (highest priority)
//!
//! The binary loads settings once at startup and hands the relevant parts to
//! the server and telemetry crates; there is no global settings instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, settings_path, LoadedSettings,
    RejectedOverride,
};
pub use types::{ChatpushSettings, LoggingSettings, ServerSettings};
