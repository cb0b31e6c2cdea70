//! Connection handshake: household scope and identity from the upgrade
//! request's query string.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hearth_core::{HouseholdId, Identity};
use serde::Deserialize;

/// Longest accepted value for any handshake field.
pub const MAX_FIELD_LEN: usize = 256;

/// Raw `/ws` query parameters.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HandshakeParams {
    /// Household to join.
    pub household_id: Option<String>,
    /// Authenticated user id.
    pub user_id: Option<String>,
    /// Name shown in presence.
    pub display_name: Option<String>,
    /// Avatar URL.
    pub avatar: Option<String>,
}

/// Rejected handshake. Maps to `400 Bad Request`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// A required field is absent or blank.
    #[error("missing required parameter: {0}")]
    Missing(&'static str),
    /// A field exceeds [`MAX_FIELD_LEN`].
    #[error("parameter too long: {0}")]
    TooLong(&'static str),
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

impl HandshakeParams {
    /// Resolve the household and identity the session runs under.
    pub fn validate(self) -> Result<(HouseholdId, Identity), HandshakeError> {
        let household_id = required("householdId", self.household_id)?;
        let user_id = required("userId", self.user_id)?;
        let display_name = required("displayName", self.display_name)?;
        let avatar = optional("avatar", self.avatar)?;

        let mut identity = Identity::new(user_id, display_name);
        if let Some(avatar) = avatar {
            identity = identity.with_avatar(avatar);
        }
        Ok((HouseholdId::from(household_id), identity))
    }
}

fn required(name: &'static str, value: Option<String>) -> Result<String, HandshakeError> {
    optional(name, value)?.ok_or(HandshakeError::Missing(name))
}

fn optional(name: &'static str, value: Option<String>) -> Result<Option<String>, HandshakeError> {
    let Some(value) = value else { return Ok(None) };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.len() > MAX_FIELD_LEN {
        return Err(HandshakeError::TooLong(name));
    }
    Ok(Some(trimmed.to_owned()))
}
