//! Query cache with staleness tracking.
//!
//! Invalidation only flags entries; it never evicts. A stale or missing
//! entry is refetched on the next [`QueryCache::read`]. Each
//! `(household, prefix)` pair carries a generation bumped by every
//! invalidation, so a fetch that raced an invalidation stores its result
//! stale instead of masking the change.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use hearth_core::HouseholdId;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::key::{QueryKey, QueryPrefix};

/// Loads the current value of a query from the application's backend.
#[async_trait]
pub trait QueryFetcher: Send + Sync {
    /// Fetch `key`.
    async fn fetch(&self, key: &QueryKey) -> Result<Value>;
}

/// A cached read.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    /// Last fetched value.
    pub value: Value,
    /// Never served while set.
    pub stale: bool,
    /// When `value` was fetched.
    pub fetched_at: Instant,
}

/// In-memory query cache.
#[derive(Default)]
pub struct QueryCache {
    inner: RwLock<Inner>,
}

/// Entries and generations share one lock: comparing a generation and
/// storing a fetched value happen as one step, as do bumping a generation
/// and flagging its entries.
#[derive(Default)]
struct Inner {
    entries: HashMap<QueryKey, CacheEntry>,
    generations: HashMap<(HouseholdId, QueryPrefix), u64>,
}

impl Inner {
    fn generation(&self, household_id: &HouseholdId, prefix: QueryPrefix) -> u64 {
        self.generations
            .get(&(household_id.clone(), prefix))
            .copied()
            .unwrap_or(0)
    }
}

impl QueryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `key`, fetching through `fetcher` when the entry is stale or
    /// missing.
    ///
    /// A fetch error leaves the cache untouched.
    pub async fn read(&self, key: &QueryKey, fetcher: &dyn QueryFetcher) -> Result<Value> {
        let generation = {
            let inner = self.inner.read();
            if let Some(entry) = inner.entries.get(key).filter(|e| !e.stale) {
                return Ok(entry.value.clone());
            }
            inner.generation(&key.household_id, key.prefix)
        };

        let value = fetcher.fetch(key).await?;

        let mut inner = self.inner.write();
        let stale = inner.generation(&key.household_id, key.prefix) != generation;
        if stale {
            debug!(%key, "invalidated while fetching, storing stale");
        }
        let _ = inner.entries.insert(
            key.clone(),
            CacheEntry {
                value: value.clone(),
                stale,
                fetched_at: Instant::now(),
            },
        );
        Ok(value)
    }

    /// Seed a fresh entry (for example from a mutation response).
    pub fn insert(&self, key: QueryKey, value: Value) {
        let _ = self.inner.write().entries.insert(
            key,
            CacheEntry {
                value,
                stale: false,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Peek at an entry without fetching.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner.read().entries.get(key).cloned()
    }

    /// Whether `key` is cached and stale. `None` when not cached.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.inner.read().entries.get(key).map(|e| e.stale)
    }

    /// Mark stale every entry of `household_id` under one of `prefixes`.
    ///
    /// Returns how many entries matched. Idempotent.
    pub fn invalidate(&self, household_id: &HouseholdId, prefixes: &[QueryPrefix]) -> usize {
        let mut inner = self.inner.write();
        for prefix in prefixes {
            *inner
                .generations
                .entry((household_id.clone(), *prefix))
                .or_insert(0) += 1;
        }

        let mut matched = 0;
        for (key, entry) in &mut inner.entries {
            if &key.household_id == household_id && prefixes.contains(&key.prefix) {
                entry.stale = true;
                matched += 1;
            }
        }
        matched
    }

    /// Mark stale every entry of a household.
    pub fn invalidate_household(&self, household_id: &HouseholdId) -> usize {
        self.invalidate(household_id, &QueryPrefix::ALL)
    }

    /// Number of cached entries, stale included.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}
