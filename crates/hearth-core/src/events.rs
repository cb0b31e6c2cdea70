//! Change events published after a committed write.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::HouseholdId;

/// Kind of household entity a write touched.
///
/// Closed on purpose: client invalidation tables match on it exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Household record itself (name, settings).
    Household,
    /// Household membership.
    Member,
    /// Income or expense transaction.
    Transaction,
    /// Budget definition.
    Budget,
    /// Chore or chore assignment.
    Chore,
    /// Tracked asset.
    Asset,
    /// Calendar event.
    CalendarEvent,
}

impl EntityType {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Household,
        Self::Member,
        Self::Transaction,
        Self::Budget,
        Self::Chore,
        Self::Asset,
        Self::CalendarEvent,
    ];

    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Household => "household",
            Self::Member => "member",
            Self::Transaction => "transaction",
            Self::Budget => "budget",
            Self::Chore => "chore",
            Self::Asset => "asset",
            Self::CalendarEvent => "calendar_event",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wire tag that names no known entity type.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown entity type: {0}")]
pub struct UnknownEntityType(pub String);

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEntityType(s.to_owned()))
    }
}

/// Notification that `entity_type` changed inside `household_id`.
///
/// Built by a write handler once its commit succeeded and consumed by the
/// sessions subscribed at publish time. Never queued or persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    /// What changed.
    pub entity_type: EntityType,
    /// Household scope.
    pub household_id: HouseholdId,
    /// Opaque payload forwarded to clients.
    pub payload: Option<Value>,
}

impl ChangeEvent {
    /// Event without payload.
    pub fn new(entity_type: EntityType, household_id: impl Into<HouseholdId>) -> Self {
        Self {
            entity_type,
            household_id: household_id.into(),
            payload: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn as_str_matches_serde() {
        for entity in EntityType::ALL {
            let json = serde_json::to_value(entity).unwrap();
            assert_eq!(json, entity.as_str());
        }
    }

    #[test]
    fn from_str_roundtrip() {
        for entity in EntityType::ALL {
            assert_eq!(entity.as_str().parse::<EntityType>().unwrap(), entity);
        }
    }

    #[test]
    fn from_str_unknown() {
        let err = "pet".parse::<EntityType>().unwrap_err();
        assert_matches!(err, UnknownEntityType(ref s) if s == "pet");
        assert_eq!(err.to_string(), "unknown entity type: pet");
    }

    #[test]
    fn calendar_event_tag_is_snake_case() {
        assert_eq!(EntityType::CalendarEvent.to_string(), "calendar_event");
    }

    #[test]
    fn change_event_builder() {
        let ev = ChangeEvent::new(EntityType::Chore, "hh1")
            .with_payload(serde_json::json!({"id": 7}));
        assert_eq!(ev.household_id.as_str(), "hh1");
        assert_eq!(ev.payload.unwrap()["id"], 7);
    }
}
