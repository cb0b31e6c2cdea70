//! # hearth-core
//!
//! Shared vocabulary for the Hearth realtime layer.
//!
//! - **Branded IDs**: `HouseholdId`, `UserId`, `ConnectionId` as newtypes
//! - **Identity**: the resolved `{userId, displayName, avatar}` of a session
//!   and its presence projection
//! - **Change events**: the closed `EntityType` tag and `ChangeEvent`
//! - **Wire messages**: `presence_update` / `DATA_UPDATED` envelopes
//! - **Logging**: `tracing` subscriber setup and a capture helper for tests

#![deny(unsafe_code)]

pub mod events;
pub mod identity;
pub mod ids;
pub mod logging;
pub mod wire;

pub use events::{ChangeEvent, EntityType, UnknownEntityType};
pub use identity::{Identity, PresenceEntry};
pub use ids::{ConnectionId, HouseholdId, UserId};
pub use wire::{DataUpdated, ServerMessage, WireError};
