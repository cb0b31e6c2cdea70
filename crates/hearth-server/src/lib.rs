//! # hearth-server
//!
//! Realtime gateway for household apps.
//!
//! - Household channels: one per household, created on first subscribe and
//!   discarded with the last session
//! - Presence: deduplicated user list broadcast whenever it changes
//! - Change notification: `DATA_UPDATED` fan-out after committed writes,
//!   in process through [`ChangeNotifier`] or over HTTP
//! - Liveness: server pings, silent sessions dropped after a timeout
//! - Graceful shutdown: live sessions are closed and drained from the
//!   registry before the process exits

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod notifier;
pub mod presence;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use notifier::{ChangeNotifier, ChangePublisher, publish_after_commit};
pub use registry::{ConnectionRegistry, SessionHandle};
pub use server::HearthServer;
pub use shutdown::{DrainOutcome, ShutdownCoordinator};
