//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use hearth_core::{HouseholdId, Identity};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::connection::{ClientConnection, SessionState};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::registry::ConnectionRegistry;

/// Per-session tuning taken from the server config.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before the session is dropped.
    pub heartbeat_timeout: Duration,
}

/// Run a session for an upgraded socket.
///
/// 1. Spawns the writer task that drains the outbound queue and pings
/// 2. Subscribes to the household channel (presence goes out from here)
/// 3. Reads inbound frames only for liveness; clients never send commands
/// 4. Unsubscribes on close, transport error, heartbeat timeout, eviction
///    or server shutdown
#[instrument(skip_all, fields(household_id = %household_id, user_id = %identity.user_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    household_id: HouseholdId,
    identity: Identity,
    registry: Arc<ConnectionRegistry>,
    options: SessionOptions,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<str>>(options.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(household_id, identity, send_tx));
    let connection_id = connection.id.clone();

    counter!("ws_connections_total").increment(1);
    info!(%connection_id, "client connected");

    // Writer: the only task touching the sink, so frames leave in queue order.
    let outbound_conn = Arc::clone(&connection);
    let ping_every = options.heartbeat_interval;
    let outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_every);
        let _ = ping.tick().await;
        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_conn.closed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        outbound_conn.close();
    });

    let heartbeat_cancel = shutdown.child_token();
    let heartbeat_conn = Arc::clone(&connection);
    let heartbeat = tokio::spawn({
        let cancel = heartbeat_cancel.clone();
        async move {
            let result = run_heartbeat(
                Arc::clone(&heartbeat_conn),
                options.heartbeat_interval,
                options.heartbeat_timeout,
                cancel,
            )
            .await;
            if result == HeartbeatResult::TimedOut {
                info!(
                    connection_id = %heartbeat_conn.id,
                    silent_for = ?heartbeat_conn.last_seen_elapsed(),
                    "heartbeat timed out"
                );
                heartbeat_conn.close();
            }
        }
    });

    let handle = registry.subscribe(Arc::clone(&connection));

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) => {
                        debug!(%connection_id, "client sent close frame");
                        break;
                    }
                    Some(Ok(_)) => connection.mark_alive(),
                    Some(Err(e)) => {
                        debug!(%connection_id, error = %e, "transport error");
                        break;
                    }
                    None => break,
                }
            }
            () = connection.closed() => break,
            () = shutdown.cancelled() => {
                connection.close();
                break;
            }
        }
    }

    let _ = registry.unsubscribe(handle);
    let _ = connection.transition(SessionState::Disconnected);
    heartbeat_cancel.cancel();
    heartbeat.abort();
    // Let the writer flush its close frame before tearing it down.
    let writer = outbound.abort_handle();
    if tokio::time::timeout(Duration::from_secs(1), outbound).await.is_err() {
        debug!(%connection_id, "writer did not finish in time");
        writer.abort();
    }

    histogram!("ws_connection_duration_seconds").record(connection.age().as_secs_f64());
    info!(%connection_id, "client disconnected");
}
