//! Realtime client: keeps a [`QueryCache`] in step with a household channel.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use hearth_core::{DataUpdated, HouseholdId, Identity, PresenceEntry, ServerMessage};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{CacheError, Result};
use crate::invalidator::Invalidator;
use crate::store::QueryCache;

const CHANGE_BUFFER: usize = 64;

/// Build the `/ws` handshake URL for `base` (`ws://host:port`).
pub fn handshake_url(base: &str, household_id: &HouseholdId, identity: &Identity) -> Result<String> {
    let base = base.trim_end_matches('/');
    if !(base.starts_with("ws://") || base.starts_with("wss://")) {
        return Err(CacheError::InvalidUrl(base.to_owned()));
    }
    let enc = |s: &str| utf8_percent_encode(s, NON_ALPHANUMERIC).to_string();
    let mut url = format!(
        "{base}/ws?householdId={}&userId={}&displayName={}",
        enc(household_id.as_str()),
        enc(identity.user_id.as_str()),
        enc(&identity.display_name),
    );
    if let Some(avatar) = &identity.avatar {
        url.push_str("&avatar=");
        url.push_str(&enc(avatar));
    }
    Ok(url)
}

/// A live subscription to one household channel.
///
/// Every `DATA_UPDATED` invalidates the cache before it is re-broadcast to
/// [`subscribe_changes`](Self::subscribe_changes) listeners. Losing the
/// connection marks the whole household stale.
pub struct RealtimeClient {
    invalidator: Invalidator,
    presence: watch::Receiver<Vec<PresenceEntry>>,
    connected: watch::Receiver<bool>,
    changes: broadcast::Sender<DataUpdated>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RealtimeClient {
    /// Connect to the gateway at `base_url` as `identity`.
    pub async fn connect(
        base_url: &str,
        household_id: HouseholdId,
        identity: &Identity,
        cache: Arc<QueryCache>,
    ) -> Result<Self> {
        let url = handshake_url(base_url, &household_id, identity)?;
        let (ws, _) = connect_async(url.as_str()).await?;
        info!(%household_id, user_id = %identity.user_id, "connected to realtime gateway");

        let invalidator = Invalidator::new(household_id, cache);
        let (presence_tx, presence) = watch::channel(Vec::new());
        let (connected_tx, connected) = watch::channel(true);
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_reader(
            ws,
            invalidator.clone(),
            presence_tx,
            connected_tx,
            changes.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            invalidator,
            presence,
            connected,
            changes,
            cancel,
            task,
        })
    }

    /// Household this client follows.
    pub fn household_id(&self) -> &HouseholdId {
        self.invalidator.household_id()
    }

    /// Latest presence list; replaced wholesale on every update.
    pub fn presence(&self) -> watch::Receiver<Vec<PresenceEntry>> {
        self.presence.clone()
    }

    /// `true` while the connection is up.
    pub fn connection_state(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Change events, delivered after the cache was invalidated.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<DataUpdated> {
        self.changes.subscribe()
    }

    /// Close the connection cleanly.
    pub async fn close(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn run_reader(
    mut ws: WsStream,
    invalidator: Invalidator,
    presence: watch::Sender<Vec<PresenceEntry>>,
    connected: watch::Sender<bool>,
    changes: broadcast::Sender<DataUpdated>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => match invalidator.handle_frame(&text) {
                    Some(ServerMessage::PresenceUpdate(list)) => {
                        let _ = presence.send(list);
                    }
                    Some(ServerMessage::DataUpdated(update)) => {
                        let _ = changes.send(update);
                    }
                    None => {}
                },
                Some(Ok(Message::Close(_)) | Err(_)) | None => {
                    let _ = invalidator.apply_connection_lost();
                    info!(household_id = %invalidator.household_id(), "realtime connection lost");
                    break;
                }
                Some(Ok(_)) => {}
            },
            () = cancel.cancelled() => {
                let _ = ws.close(None).await;
                debug!(household_id = %invalidator.household_id(), "realtime connection closed");
                break;
            }
        }
    }
    let _ = connected.send(false);
}
