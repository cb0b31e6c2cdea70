//! # hearth-cache
//!
//! Client side of the Hearth realtime layer.
//!
//! - [`QueryCache`]: cached reads keyed by `[prefix, householdId, ...]`,
//!   refetched once stale
//! - [`prefixes_for`]: which query families depend on each entity type
//! - [`Invalidator`]: turns `DATA_UPDATED` frames into invalidations
//! - [`RealtimeClient`]: WebSocket connection to the gateway feeding both

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod invalidator;
pub mod key;
pub mod store;
pub mod table;

pub use client::{RealtimeClient, handshake_url};
pub use errors::{CacheError, Result};
pub use invalidator::Invalidator;
pub use key::{QueryKey, QueryPrefix};
pub use store::{CacheEntry, QueryCache, QueryFetcher};
pub use table::prefixes_for;
