//! Household channel registry.
//!
//! The registry owns every live session, grouped into one [`Channel`] per
//! household. A channel exists only while it has members: it is created by
//! the first `subscribe` and discarded by the last departure.
//!
//! Mutations go through exactly three entry points: [`ConnectionRegistry::subscribe`],
//! [`ConnectionRegistry::unsubscribe`] and [`ConnectionRegistry::publish`].
//! Each channel is only touched under its `DashMap` shard guard, so membership
//! changes on a channel are applied one at a time and the presence broadcast
//! that follows a change is computed from exactly that membership.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use hearth_core::{
    ChangeEvent, ConnectionId, DataUpdated, HouseholdId, PresenceEntry, ServerMessage,
};
use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::presence;
use crate::websocket::connection::{ClientConnection, SendOutcome, SessionState};

/// Dropped frames after which a slow session is evicted.
pub const DEFAULT_MAX_DROPPED: u64 = 100;

/// Why a session left its channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LeaveReason {
    Unsubscribe,
    TransportDrop,
    Evicted,
}

impl LeaveReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Unsubscribe => "unsubscribe",
            Self::TransportDrop => "transport_drop",
            Self::Evicted => "evicted",
        }
    }
}

/// Live sessions of one household, in join order.
pub struct Channel {
    sessions: Vec<Arc<ClientConnection>>,
    presence: Vec<PresenceEntry>,
}

impl Channel {
    fn new() -> Self {
        Self {
            sessions: Vec::new(),
            presence: Vec::new(),
        }
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the channel has no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn remove(&mut self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let idx = self.sessions.iter().position(|c| &c.id == connection_id)?;
        Some(self.sessions.remove(idx))
    }

    /// Recompute presence; returns whether it changed.
    fn recompute_presence(&mut self) -> bool {
        let next = presence::project(self.sessions.iter().map(|c| &c.identity));
        if next == self.presence {
            return false;
        }
        self.presence = next;
        true
    }

    fn presence_frame(&self) -> Option<Arc<str>> {
        match ServerMessage::PresenceUpdate(self.presence.clone()).encode() {
            Ok(json) => Some(Arc::from(json)),
            Err(e) => {
                warn!(error = %e, "failed to encode presence update");
                None
            }
        }
    }

    /// Send the current presence to every member.
    fn broadcast_presence(&self, max_dropped: u64) -> Vec<ConnectionId> {
        counter!("presence_updates_total").increment(1);
        match self.presence_frame() {
            Some(frame) => self.fan_out(&frame, max_dropped).1,
            None => Vec::new(),
        }
    }

    /// Enqueue `frame` for every member.
    ///
    /// Returns how many sessions accepted it and which sessions must be
    /// evicted (transport gone, or too many drops).
    fn fan_out(&self, frame: &Arc<str>, max_dropped: u64) -> (usize, Vec<ConnectionId>) {
        let mut delivered = 0;
        let mut evict = Vec::new();
        for conn in &self.sessions {
            if let Some(id) = deliver(conn, frame, max_dropped) {
                evict.push(id);
            } else {
                delivered += 1;
            }
        }
        (delivered, evict)
    }
}

/// Enqueue one frame; returns the connection id if it must be evicted.
fn deliver(conn: &ClientConnection, frame: &Arc<str>, max_dropped: u64) -> Option<ConnectionId> {
    match conn.send(Arc::clone(frame)) {
        SendOutcome::Sent => None,
        SendOutcome::Full => {
            counter!("ws_broadcast_drops_total").increment(1);
            let drops = conn.drop_count();
            if drops >= max_dropped {
                warn!(connection_id = %conn.id, drops, "evicting slow session");
                Some(conn.id.clone())
            } else {
                warn!(connection_id = %conn.id, drops, "outbound queue full, frame dropped");
                None
            }
        }
        SendOutcome::Closed => {
            debug!(connection_id = %conn.id, "outbound queue closed, evicting session");
            Some(conn.id.clone())
        }
    }
}

/// Registry of household channels.
pub struct ConnectionRegistry {
    channels: DashMap<HouseholdId, Channel>,
    session_count: AtomicUsize,
    max_dropped: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new(max_dropped: u64) -> Self {
        Self {
            channels: DashMap::new(),
            session_count: AtomicUsize::new(0),
            max_dropped: max_dropped.max(1),
        }
    }

    /// Register `connection` with its household channel.
    ///
    /// The channel is created if absent. Presence is recomputed; if it
    /// changed every member (including the new one) receives it, otherwise
    /// only the new session does.
    ///
    /// The returned handle unsubscribes when dropped.
    pub fn subscribe(self: &Arc<Self>, connection: Arc<ClientConnection>) -> SessionHandle {
        let household_id = connection.household_id.clone();
        let connection_id = connection.id.clone();

        if !connection.transition(SessionState::Subscribed) {
            debug!(%household_id, %connection_id, "session already disconnected, not subscribing");
            return SessionHandle {
                registry: Arc::clone(self),
                household_id,
                connection_id,
                released: true,
            };
        }

        let evicted = {
            let mut channel = self
                .channels
                .entry(household_id.clone())
                .or_insert_with(Channel::new);
            let _ = self.session_count.fetch_add(1, Ordering::Relaxed);
            channel.sessions.push(Arc::clone(&connection));
            if channel.recompute_presence() {
                channel.broadcast_presence(self.max_dropped)
            } else {
                channel
                    .presence_frame()
                    .and_then(|frame| deliver(&connection, &frame, self.max_dropped))
                    .into_iter()
                    .collect()
            }
        };

        self.record_gauges();
        info!(
            %household_id,
            %connection_id,
            user_id = %connection.identity.user_id,
            "session subscribed"
        );

        for id in evicted {
            let _ = self.leave(&household_id, &id, LeaveReason::Evicted);
        }

        SessionHandle {
            registry: Arc::clone(self),
            household_id,
            connection_id,
            released: false,
        }
    }

    /// Remove the session behind `handle`.
    ///
    /// Returns `false` if it had already left (for example, evicted).
    pub fn unsubscribe(&self, mut handle: SessionHandle) -> bool {
        handle.released = true;
        self.leave(
            &handle.household_id,
            &handle.connection_id,
            LeaveReason::Unsubscribe,
        )
    }

    /// Fan a change event out to every session of its household.
    ///
    /// Fire-and-forget: returns how many sessions the frame was enqueued for.
    /// Sessions whose transport is gone are evicted along the way.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        let frame: Arc<str> =
            match ServerMessage::DataUpdated(DataUpdated::from(event)).encode() {
                Ok(json) => Arc::from(json),
                Err(e) => {
                    warn!(entity_type = %event.entity_type, error = %e, "failed to encode change event");
                    return 0;
                }
            };

        let (recipients, evicted) = match self.channels.get(&event.household_id) {
            Some(channel) => channel.fan_out(&frame, self.max_dropped),
            None => (0, Vec::new()),
        };

        counter!("change_events_published_total").increment(1);
        debug!(
            household_id = %event.household_id,
            entity_type = %event.entity_type,
            recipients,
            "published change event"
        );

        for id in evicted {
            let _ = self.leave(&event.household_id, &id, LeaveReason::Evicted);
        }
        recipients
    }

    /// Presence of a household: distinct users with a live session, in
    /// order of their earliest session.
    pub fn compute_presence(&self, household_id: &HouseholdId) -> Vec<PresenceEntry> {
        self.channels
            .get(household_id)
            .map(|channel| presence::project(channel.sessions.iter().map(|c| &c.identity)))
            .unwrap_or_default()
    }

    /// Ask every live session to close. Sessions unsubscribe themselves as
    /// their connection tasks wind down.
    ///
    /// Returns how many sessions were signalled.
    pub fn close_all(&self) -> usize {
        let mut signalled = 0;
        for channel in &self.channels {
            for conn in &channel.sessions {
                conn.close();
                signalled += 1;
            }
        }
        signalled
    }

    /// Number of live sessions across all households.
    pub fn session_count(&self) -> usize {
        self.session_count.load(Ordering::Relaxed)
    }

    /// Number of households with at least one session.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sessions in a household.
    pub fn member_count(&self, household_id: &HouseholdId) -> usize {
        self.channels.get(household_id).map_or(0, |c| c.len())
    }

    /// Whether a household currently has a channel.
    pub fn has_channel(&self, household_id: &HouseholdId) -> bool {
        self.channels.contains_key(household_id)
    }

    /// Remove a session, then settle the channel: discard it when empty,
    /// otherwise broadcast presence if it changed. Evictions triggered by
    /// that broadcast are processed in the same call.
    fn leave(
        &self,
        household_id: &HouseholdId,
        connection_id: &ConnectionId,
        reason: LeaveReason,
    ) -> bool {
        let mut removed_requested = false;
        let mut pending = vec![(connection_id.clone(), reason)];

        while let Some((id, reason)) = pending.pop() {
            let Some(mut channel) = self.channels.get_mut(household_id) else {
                break;
            };
            let Some(conn) = channel.remove(&id) else {
                continue;
            };
            if &id == connection_id {
                removed_requested = true;
            }

            let _ = conn.transition(SessionState::Disconnected);
            conn.close();
            let _ = self.session_count.fetch_sub(1, Ordering::Relaxed);
            info!(
                %household_id,
                connection_id = %id,
                user_id = %conn.identity.user_id,
                reason = reason.as_str(),
                "session left"
            );

            if channel.is_empty() {
                drop(channel);
                if self
                    .channels
                    .remove_if(household_id, |_, c| c.is_empty())
                    .is_some()
                {
                    debug!(%household_id, "channel discarded");
                }
            } else if channel.recompute_presence() {
                let evicted = channel.broadcast_presence(self.max_dropped);
                pending.extend(evicted.into_iter().map(|id| (id, LeaveReason::Evicted)));
            }
        }

        self.record_gauges();
        removed_requested
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_gauges(&self) {
        gauge!("ws_connections_active").set(self.session_count() as f64);
        gauge!("households_active").set(self.channel_count() as f64);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DROPPED)
    }
}

/// Proof of a subscription.
///
/// Dropping the handle without calling [`ConnectionRegistry::unsubscribe`]
/// is treated as a transport drop and removes the session.
#[must_use = "dropping a SessionHandle unsubscribes the session"]
pub struct SessionHandle {
    registry: Arc<ConnectionRegistry>,
    household_id: HouseholdId,
    connection_id: ConnectionId,
    released: bool,
}

impl SessionHandle {
    /// Household of the session.
    pub fn household_id(&self) -> &HouseholdId {
        &self.household_id
    }

    /// Connection id of the session.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.registry.leave(
                &self.household_id,
                &self.connection_id,
                LeaveReason::TransportDrop,
            );
        }
    }
}
