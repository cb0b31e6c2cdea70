//! Settings types.

use hearth_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HearthSettings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Household channels, heartbeat and outbound queues.
    pub realtime: RealtimeSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl HearthSettings {
    /// Reject combinations the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.realtime.heartbeat_timeout_ms < self.realtime.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "realtime.heartbeatTimeoutMs ({}) must be >= realtime.heartbeatIntervalMs ({})",
                self.realtime.heartbeat_timeout_ms, self.realtime.heartbeat_interval_ms
            )));
        }
        if self.realtime.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "realtime.sendQueueCapacity must be > 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port (0 picks a free port).
    pub port: u16,
    /// Maximum concurrent websocket sessions across all households.
    pub max_connections: usize,
    /// Maximum inbound websocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8787,
            max_connections: 500,
            max_message_size: 64 * 1024,
        }
    }
}

/// Channel and delivery settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Interval between server pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a session counts as disconnected, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Capacity of each session's outbound queue.
    pub send_queue_capacity: usize,
    /// Dropped frames after which a slow session is evicted.
    pub max_dropped_messages: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            send_queue_capacity: 256,
            max_dropped_messages: 100,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}
