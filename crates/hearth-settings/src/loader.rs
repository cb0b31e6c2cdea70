//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use hearth_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::HearthSettings;

/// Resolve the settings file path.
///
/// `HEARTH_SETTINGS` wins; otherwise `~/.hearth/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string("HEARTH_SETTINGS") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hearth").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HearthSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid combination of
/// values is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HearthSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<HearthSettings> {
    let defaults = serde_json::to_value(HearthSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply `HEARTH_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut HearthSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Invalid values are ignored with a warning, keeping the file/default value.
pub fn apply_overrides(settings: &mut HearthSettings, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = get("HEARTH_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = get("HEARTH_PORT").and_then(|v| checked("HEARTH_PORT", &v, parse_u16)) {
        settings.server.port = v;
    }
    if let Some(v) = get("HEARTH_MAX_CONNECTIONS")
        .and_then(|v| checked("HEARTH_MAX_CONNECTIONS", &v, |s| parse_usize_range(s, 1, 100_000)))
    {
        settings.server.max_connections = v;
    }
    if let Some(v) = get("HEARTH_MAX_MESSAGE_SIZE").and_then(|v| {
        checked("HEARTH_MAX_MESSAGE_SIZE", &v, |s| {
            parse_usize_range(s, 1_024, 16 * 1024 * 1024)
        })
    }) {
        settings.server.max_message_size = v;
    }

    // ── Realtime ────────────────────────────────────────────────────
    if let Some(v) = get("HEARTH_HEARTBEAT_INTERVAL_MS").and_then(|v| {
        checked("HEARTH_HEARTBEAT_INTERVAL_MS", &v, |s| {
            parse_u64_range(s, 1_000, 600_000)
        })
    }) {
        settings.realtime.heartbeat_interval_ms = v;
    }
    if let Some(v) = get("HEARTH_HEARTBEAT_TIMEOUT_MS").and_then(|v| {
        checked("HEARTH_HEARTBEAT_TIMEOUT_MS", &v, |s| {
            parse_u64_range(s, 1_000, 3_600_000)
        })
    }) {
        settings.realtime.heartbeat_timeout_ms = v;
    }
    if let Some(v) = get("HEARTH_SEND_QUEUE_CAPACITY").and_then(|v| {
        checked("HEARTH_SEND_QUEUE_CAPACITY", &v, |s| {
            parse_usize_range(s, 1, 65_536)
        })
    }) {
        settings.realtime.send_queue_capacity = v;
    }
    if let Some(v) = get("HEARTH_MAX_DROPPED_MESSAGES").and_then(|v| {
        checked("HEARTH_MAX_DROPPED_MESSAGES", &v, |s| {
            parse_u64_range(s, 1, 100_000)
        })
    }) {
        settings.realtime.max_dropped_messages = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = get("HEARTH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = get("HEARTH_LOG_FORMAT").and_then(|v| checked("HEARTH_LOG_FORMAT", &v, LogFormat::parse)) {
        settings.logging.format = v;
    }
}

fn checked<T>(name: &str, val: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let result = parse(val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a port number (1..=65535).
pub fn parse_u16(val: &str) -> Option<u16> {
    val.parse().ok().filter(|n| *n >= 1)
}

/// Parse a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
