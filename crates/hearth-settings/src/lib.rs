//! # hearth-settings
//!
//! Configuration for the Hearth realtime gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HearthSettings::default()`]
//! 2. **Settings file**: `~/.hearth/settings.json`, or the path in
//!    `HEARTH_SETTINGS` (deep-merged over defaults)
//! 3. **Environment variables**: `HEARTH_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{HearthSettings, LoggingSettings, RealtimeSettings, ServerSettings};
