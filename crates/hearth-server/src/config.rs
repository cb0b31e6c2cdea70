//! Server configuration.

use std::time::Duration;

use hearth_settings::HearthSettings;
use serde::{Deserialize, Serialize};

use crate::websocket::session::SessionOptions;

/// Runtime configuration of the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Maximum concurrent websocket sessions.
    pub max_connections: usize,
    /// Max inbound websocket message size in bytes.
    pub max_message_size: usize,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence tolerated before a session is dropped, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Capacity of each session's outbound queue.
    pub send_queue_capacity: usize,
    /// Dropped frames after which a slow session is evicted.
    pub max_dropped_messages: u64,
}

impl ServerConfig {
    /// Per-session options derived from this config.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            send_queue_capacity: self.send_queue_capacity.max(1),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms.max(1)),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms.max(1)),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&HearthSettings::default())
    }
}

impl From<&HearthSettings> for ServerConfig {
    fn from(settings: &HearthSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            heartbeat_interval_ms: settings.realtime.heartbeat_interval_ms,
            heartbeat_timeout_ms: settings.realtime.heartbeat_timeout_ms,
            send_queue_capacity: settings.realtime.send_queue_capacity,
            max_dropped_messages: settings.realtime.max_dropped_messages,
        }
    }
}
