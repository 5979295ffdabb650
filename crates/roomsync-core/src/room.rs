use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// Longest accepted room identifier, in characters.
pub const MAX_ROOM_ID_LEN: usize = 50;

/// Value a room starts with before anyone changes it.
pub const DEFAULT_ROOM_VALUE: &str = "#007bff";

/// Validated room identifier: non-empty, at most [`MAX_ROOM_ID_LEN`] chars.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, SyncError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(SyncError::Validation("roomId must not be empty".into()));
        }
        let len = raw.chars().count();
        if len > MAX_ROOM_ID_LEN {
            return Err(SyncError::Validation(format!(
                "roomId is {len} chars, limit is {MAX_ROOM_ID_LEN}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The authoritative state record of one room, as stored and as pushed to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    /// Surrogate key assigned by the store; stable across updates.
    pub id: i64,
    pub room_id: RoomId,
    pub value: String,
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
    /// Carried for compatibility; nothing transitions it.
    pub active: bool,
}
