//! Applies change events to the query cache.

use std::sync::Arc;

use hearth_core::{DataUpdated, EntityType, HouseholdId, ServerMessage, WireError};
use tracing::{debug, warn};

use crate::store::QueryCache;
use crate::table::prefixes_for;

/// Maps incoming change events onto cache invalidations for one household.
#[derive(Clone)]
pub struct Invalidator {
    household_id: HouseholdId,
    cache: Arc<QueryCache>,
}

impl Invalidator {
    /// Invalidator bound to a household's cache.
    pub fn new(household_id: HouseholdId, cache: Arc<QueryCache>) -> Self {
        Self {
            household_id,
            cache,
        }
    }

    /// Household this invalidator serves.
    pub fn household_id(&self) -> &HouseholdId {
        &self.household_id
    }

    /// Mark stale everything that depends on `entity_type`.
    pub fn apply(&self, entity_type: EntityType) -> usize {
        let prefixes = prefixes_for(entity_type);
        let matched = self.cache.invalidate(&self.household_id, prefixes);
        debug!(
            household_id = %self.household_id,
            %entity_type,
            matched,
            "invalidated cached queries"
        );
        matched
    }

    /// Connection lost: nothing received since can be trusted.
    pub fn apply_connection_lost(&self) -> usize {
        let matched = self.cache.invalidate_household(&self.household_id);
        debug!(household_id = %self.household_id, matched, "connection lost, household cache stale");
        matched
    }

    /// Decode a text frame from the gateway and apply it.
    ///
    /// Frames that cannot be understood are logged and dropped; they never
    /// surface as errors.
    pub fn handle_frame(&self, text: &str) -> Option<ServerMessage> {
        match ServerMessage::decode(text) {
            Ok(message) => {
                if let ServerMessage::DataUpdated(DataUpdated { entity_type, .. }) = &message {
                    let _ = self.apply(*entity_type);
                }
                Some(message)
            }
            Err(WireError::UnknownEntityType(e)) => {
                warn!(household_id = %self.household_id, entity_type = %e.0, "ignoring change event for unknown entity type");
                None
            }
            Err(e) => {
                warn!(household_id = %self.household_id, error = %e, "ignoring undecodable frame");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{QueryKey, QueryPrefix};
    use hearth_core::logging::capture_logs;
    use serde_json::json;
    use tracing::Level;

    fn seeded() -> (Arc<QueryCache>, Invalidator) {
        let cache = Arc::new(QueryCache::new());
        for household in ["hh1", "hh2"] {
            for prefix in QueryPrefix::ALL {
                cache.insert(QueryKey::new(prefix, household), json!(0));
            }
        }
        let invalidator = Invalidator::new("hh1".into(), Arc::clone(&cache));
        (cache, invalidator)
    }

    fn stale_prefixes(cache: &QueryCache, household: &str) -> Vec<&'static str> {
        QueryPrefix::ALL
            .into_iter()
            .filter(|p| cache.is_stale(&QueryKey::new(*p, household)) == Some(true))
            .map(QueryPrefix::as_str)
            .collect()
    }

    #[test]
    fn member_change_marks_members_and_summary() {
        let (cache, invalidator) = seeded();
        assert_eq!(invalidator.apply(EntityType::Member), 2);
        assert_eq!(stale_prefixes(&cache, "hh1"), vec!["members", "finance-summary"]);
        assert!(stale_prefixes(&cache, "hh2").is_empty());
    }

    #[test]
    fn frame_applies_data_updated() {
        let (cache, invalidator) = seeded();
        let msg = invalidator
            .handle_frame(r#"{"type":"DATA_UPDATED","data":{"entityType":"chore"}}"#)
            .unwrap();
        assert!(matches!(msg, ServerMessage::DataUpdated(_)));
        assert_eq!(stale_prefixes(&cache, "hh1"), vec!["chores"]);
    }

    #[test]
    fn presence_frame_invalidates_nothing() {
        let (cache, invalidator) = seeded();
        let msg = invalidator
            .handle_frame(r#"{"type":"presence_update","data":[]}"#)
            .unwrap();
        assert_eq!(msg, ServerMessage::PresenceUpdate(vec![]));
        assert!(stale_prefixes(&cache, "hh1").is_empty());
    }

    #[test]
    fn unknown_entity_is_ignored_with_warning() {
        let (logs, _guard) = capture_logs();
        let (cache, invalidator) = seeded();

        let msg = invalidator.handle_frame(r#"{"type":"DATA_UPDATED","data":{"entityType":"pet"}}"#);

        assert!(msg.is_none());
        assert!(stale_prefixes(&cache, "hh1").is_empty());
        assert!(logs.has_event(Level::WARN, "unknown entity type"));
    }

    #[test]
    fn garbage_frame_is_ignored() {
        let (logs, _guard) = capture_logs();
        let (cache, invalidator) = seeded();
        assert!(invalidator.handle_frame("not json").is_none());
        assert!(invalidator.handle_frame(r#"{"type":"mystery"}"#).is_none());
        assert!(stale_prefixes(&cache, "hh1").is_empty());
        assert_eq!(logs.count_at_level(Level::WARN), 2);
    }

    #[test]
    fn connection_lost_marks_whole_household() {
        let (cache, invalidator) = seeded();
        assert_eq!(invalidator.apply_connection_lost(), QueryPrefix::ALL.len());
        assert_eq!(stale_prefixes(&cache, "hh1").len(), QueryPrefix::ALL.len());
        assert!(stale_prefixes(&cache, "hh2").is_empty());
    }
}
