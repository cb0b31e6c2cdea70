//! Per-connection session state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hearth_core::{ConnectionId, HouseholdId, Identity};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Lifecycle of a session. `Disconnected` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, not yet registered with its channel.
    Connecting,
    /// Member of its household channel.
    Subscribed,
    /// Gone; a reconnect creates a new session.
    Disconnected,
}

/// Result of enqueueing a frame for a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Enqueued.
    Sent,
    /// Queue full; frame dropped.
    Full,
    /// Writer task is gone; the transport is dead.
    Closed,
}

/// A connected client session.
///
/// Frames are pushed into a bounded queue drained by the session's single
/// writer task, so a session sees frames in the order they were enqueued.
pub struct ClientConnection {
    /// Unique connection id.
    pub id: ConnectionId,
    /// Household channel this session belongs to.
    pub household_id: HouseholdId,
    /// Resolved identity of the user.
    pub identity: Identity,
    tx: mpsc::Sender<Arc<str>>,
    state: Mutex<SessionState>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client showed activity since the last heartbeat tick.
    pub is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
    closing: CancellationToken,
}

impl ClientConnection {
    /// Create a session in the `Connecting` state.
    pub fn new(
        household_id: HouseholdId,
        identity: Identity,
        tx: mpsc::Sender<Arc<str>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            household_id,
            identity,
            tx,
            state: Mutex::new(SessionState::Connecting),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closing: CancellationToken::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to `state`. Returns `false` if the session is already
    /// `Disconnected`.
    pub fn transition(&self, state: SessionState) -> bool {
        let mut current = self.state.lock();
        if *current == SessionState::Disconnected {
            return false;
        }
        *current = state;
        true
    }

    /// Enqueue a frame without waiting.
    pub fn send(&self, frame: Arc<str>) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Full
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Total frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record client activity (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag. Returns `true` if the client was
    /// active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last client activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Ask the session's tasks to tear the transport down.
    pub fn close(&self) {
        self.closing.cancel();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) is called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closing.cancelled()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(cap: usize) -> (ClientConnection, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(cap);
        let conn = ClientConnection::new("hh1".into(), Identity::new("u1", "Ada"), tx);
        (conn, rx)
    }

    #[test]
    fn starts_connecting() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.state(), SessionState::Connecting);
        assert_eq!(conn.household_id.as_str(), "hh1");
        assert!(conn.is_alive.load(Ordering::Relaxed));
    }

    #[test]
    fn disconnected_is_terminal() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.transition(SessionState::Subscribed));
        assert!(conn.transition(SessionState::Disconnected));
        assert!(!conn.transition(SessionState::Subscribed));
        assert_eq!(conn.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let (conn, mut rx) = make_connection(8);
        for i in 0..5 {
            assert_eq!(conn.send(Arc::from(format!("m{i}"))), SendOutcome::Sent);
        }
        for i in 0..5 {
            assert_eq!(&*rx.recv().await.unwrap(), format!("m{i}"));
        }
    }

    #[test]
    fn full_queue_counts_drop() {
        let (conn, _rx) = make_connection(1);
        assert_eq!(conn.send(Arc::from("a")), SendOutcome::Sent);
        assert_eq!(conn.send(Arc::from("b")), SendOutcome::Full);
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn closed_queue_reported() {
        let (conn, rx) = make_connection(1);
        drop(rx);
        assert_eq!(conn.send(Arc::from("a")), SendOutcome::Closed);
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn alive_flag_resets() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[tokio::test]
    async fn close_resolves_closed() {
        let (conn, _rx) = make_connection(1);
        assert!(!conn.is_closing());
        conn.close();
        conn.closed().await;
        assert!(conn.is_closing());
    }

    #[test]
    fn ids_are_unique_per_connection() {
        let (a, _ra) = make_connection(1);
        let (b, _rb) = make_connection(1);
        assert_ne!(a.id, b.id);
    }
}
