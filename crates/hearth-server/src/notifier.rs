//! Change notifier: the publishing side used by persistence code.

use std::future::Future;
use std::sync::Arc;

use hearth_core::{ChangeEvent, EntityType, HouseholdId};
use serde_json::Value;
use tracing::debug;

use crate::registry::ConnectionRegistry;

/// Anything that can fan a change event out to a household.
#[cfg_attr(test, mockall::automock)]
pub trait ChangePublisher: Send + Sync {
    /// Publish `event`; returns the number of sessions it was enqueued for.
    fn publish(&self, event: ChangeEvent) -> usize;
}

/// Publisher backed by the live connection registry.
#[derive(Clone)]
pub struct ChangeNotifier {
    registry: Arc<ConnectionRegistry>,
}

impl ChangeNotifier {
    /// Wrap a registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Notify every session of `household_id` that `entity_type` changed.
    pub fn notify(
        &self,
        entity_type: EntityType,
        household_id: &HouseholdId,
        payload: Option<Value>,
    ) -> usize {
        let mut event = ChangeEvent::new(entity_type, household_id.clone());
        event.payload = payload;
        self.publish(event)
    }
}

impl ChangePublisher for ChangeNotifier {
    fn publish(&self, event: ChangeEvent) -> usize {
        self.registry.publish(&event)
    }
}

/// Await a persistence commit and publish only if it succeeded.
///
/// `payload` derives the optional event payload from the committed value.
/// A failed commit is returned unchanged and nothing is published.
pub async fn publish_after_commit<P, T, E, F>(
    publisher: &P,
    entity_type: EntityType,
    household_id: &HouseholdId,
    commit: F,
    payload: impl FnOnce(&T) -> Option<Value>,
) -> Result<T, E>
where
    P: ChangePublisher + ?Sized,
    F: Future<Output = Result<T, E>>,
{
    match commit.await {
        Ok(value) => {
            let mut event = ChangeEvent::new(entity_type, household_id.clone());
            event.payload = payload(&value);
            let _ = publisher.publish(event);
            Ok(value)
        }
        Err(e) => {
            debug!(%household_id, %entity_type, "commit failed, change not published");
            Err(e)
        }
    }
}
