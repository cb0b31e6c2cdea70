//! Messages carried over a household channel.
//!
//! Every frame is a JSON text message with a `{"type": .., "data": ..}`
//! envelope:
//!
//! | `type` | `data` |
//! |--------|--------|
//! | `presence_update` | `[{userId, displayName, avatar}, ..]` (full replacement) |
//! | `DATA_UPDATED` | `{entityType, payload?}` |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::events::{ChangeEvent, EntityType, UnknownEntityType};
use crate::identity::PresenceEntry;

const PRESENCE_UPDATE: &str = "presence_update";
const DATA_UPDATED: &str = "DATA_UPDATED";

/// Errors decoding a frame received from the gateway.
#[derive(Debug, Error)]
pub enum WireError {
    /// Not JSON, or the wrong shape for its `type`.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Envelope `type` is not one this protocol defines.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    /// `DATA_UPDATED` named an entity type this client does not know.
    #[error(transparent)]
    UnknownEntityType(#[from] UnknownEntityType),
}

/// Body of a `DATA_UPDATED` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataUpdated {
    /// What changed.
    pub entity_type: EntityType,
    /// Opaque payload from the write handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl From<&ChangeEvent> for DataUpdated {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            entity_type: event.entity_type,
            payload: event.payload.clone(),
        }
    }
}

/// A server-to-client message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Full replacement of the household's presence list.
    #[serde(rename = "presence_update")]
    PresenceUpdate(Vec<PresenceEntry>),
    /// Something in the household changed; refetch what depends on it.
    #[serde(rename = "DATA_UPDATED")]
    DataUpdated(DataUpdated),
}

impl ServerMessage {
    /// Serialize to the JSON text sent in a frame.
    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a frame.
    ///
    /// Unlike plain `serde_json::from_str`, an unknown `entityType` is
    /// reported as [`WireError::UnknownEntityType`] so receivers can log it
    /// and carry on.
    pub fn decode(text: &str) -> Result<Self, WireError> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            data: Value,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawDataUpdated {
            entity_type: String,
            #[serde(default)]
            payload: Option<Value>,
        }

        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.kind.as_str() {
            PRESENCE_UPDATE => Ok(Self::PresenceUpdate(serde_json::from_value(
                envelope.data,
            )?)),
            DATA_UPDATED => {
                let raw: RawDataUpdated = serde_json::from_value(envelope.data)?;
                Ok(Self::DataUpdated(DataUpdated {
                    entity_type: raw.entity_type.parse()?,
                    payload: raw.payload,
                }))
            }
            other => Err(WireError::UnknownMessageType(other.to_owned())),
        }
    }
}
