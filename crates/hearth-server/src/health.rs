//! `/health` endpoint.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server runs.
    pub status: String,
    /// Seconds since start.
    pub uptime_secs: u64,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    /// Live websocket sessions.
    pub connections: usize,
    /// Households with at least one session.
    pub households: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    started_at: DateTime<Utc>,
    connections: usize,
    households: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        started_at,
        connections,
        households,
    }
}
