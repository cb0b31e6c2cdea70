//! Cache and client errors.

use thiserror::Error;

/// Errors from the query cache and the realtime client.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing fetch failed; nothing was cached.
    #[error("fetch failed for {key}: {message}")]
    Fetch {
        /// Rendered query key.
        key: String,
        /// Fetcher's error message.
        message: String,
    },
    /// The gateway URL could not be built.
    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),
    /// Connecting to the gateway failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
