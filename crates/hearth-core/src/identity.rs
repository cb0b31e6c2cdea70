//! Session identity and its presence projection.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Resolved identity of the user behind a session.
///
/// Authentication happens upstream; by the time a session subscribes this is
/// trusted input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Authenticated user id.
    pub user_id: UserId,
    /// Name shown to other household members.
    pub display_name: String,
    /// Avatar URL or token, if the user has one.
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Identity {
    /// Build an identity without an avatar.
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar: None,
        }
    }

    /// Attach an avatar.
    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// One user in a household's presence list.
///
/// Serialized as `{userId, displayName, avatar}`; `avatar` is `null` when
/// absent so every entry has the same shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    /// User id (unique within a presence list).
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
    /// Avatar, if any.
    pub avatar: Option<String>,
}

impl From<&Identity> for PresenceEntry {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
            avatar: identity.avatar.clone(),
        }
    }
}
