//! Liveness monitoring.
//!
//! The outbound task pings every interval; any inbound frame (pong
//! included) marks the session alive. A session silent for the whole
//! timeout window is reported as timed out.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client went silent for the timeout window.
    TimedOut,
    /// Stopped by the session or by server shutdown.
    Cancelled,
}

/// Number of consecutive silent ticks tolerated: `timeout / interval`,
/// at least 1.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Watch a session until it goes silent or `cancel` fires.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    // First tick completes immediately.
    let _ = ticker.tick().await;
    let max_missed = max_missed(interval, timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::Identity;
    use tokio::sync::mpsc;

    fn make_connection() -> Arc<ClientConnection> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(ClientConnection::new(
            "hh1".into(),
            Identity::new("u1", "Ada"),
            tx,
        ))
    }

    #[test]
    fn max_missed_from_timeout_and_interval() {
        assert_eq!(
            max_missed(Duration::from_secs(30), Duration::from_secs(90)),
            3
        );
        assert_eq!(
            max_missed(Duration::from_millis(100), Duration::from_millis(250)),
            2
        );
        assert_eq!(
            max_missed(Duration::from_secs(10), Duration::from_secs(1)),
            1
        );
    }

    #[tokio::test]
    async fn cancelled_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_heartbeat(
            make_connection(),
            Duration::from_secs(100),
            Duration::from_secs(300),
            cancel,
        )
        .await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let conn = make_connection();
        let _ = conn.check_alive();
        let result = run_heartbeat(
            conn,
            Duration::from_millis(100),
            Duration::from_millis(300),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, HeartbeatResult::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn active_client_stays_alive() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Duration::from_millis(100),
            Duration::from_millis(200),
            cancel.clone(),
        ));

        for _ in 0..10 {
            time::sleep(Duration::from_millis(50)).await;
            conn.mark_alive();
        }

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }
}
