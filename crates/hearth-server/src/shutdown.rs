//! Gateway shutdown: stop accepting, close every live session, then wait
//! for the registry to empty.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;

/// Default time allowed for sessions to drain.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the registry is checked while draining.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// How a drain ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every session unsubscribed and the listener returned.
    Drained,
    /// The deadline passed first.
    TimedOut {
        /// Sessions still registered at the deadline.
        remaining_sessions: usize,
    },
}

/// Owns the shutdown token shared by the listener and every session, and
/// drains the [`ConnectionRegistry`] when the gateway stops.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registry: Arc<ConnectionRegistry>,
}

impl ShutdownCoordinator {
    /// Coordinator for the sessions of `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
        }
    }

    /// A clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown was signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, close every live session and wait up to `timeout`
    /// for the registry to empty and `listener` to return.
    pub async fn drain(&self, listener: JoinHandle<()>, timeout: Option<Duration>) -> DrainOutcome {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        let signalled = self.registry.close_all();
        info!(sessions = signalled, ?timeout, "draining sessions");

        let registry = &self.registry;
        let drained = async {
            while registry.session_count() > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
            let _ = listener.await;
        };

        if tokio::time::timeout(timeout, drained).await.is_ok() {
            info!("all sessions drained");
            DrainOutcome::Drained
        } else {
            let remaining_sessions = self.registry.session_count();
            warn!(remaining_sessions, ?timeout, "shutdown timed out before sessions drained");
            DrainOutcome::TimedOut { remaining_sessions }
        }
    }
}
