use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::room::{RoomId, RoomState};

/// Transient "someone interacted" signal. Never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub room_id: RoomId,
    pub subject_id: String,
    pub actor_identity: String,
    pub timestamp: DateTime<Utc>,
}

/// Messages pushed from the gateway to connected clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    StateChanged(RoomState),
    Interacted(Interaction),
}

impl ServerEvent {
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::StateChanged(state) => &state.room_id,
            Self::Interacted(interaction) => &interaction.room_id,
        }
    }

    /// Wire name, also used as a log field.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged(_) => "StateChanged",
            Self::Interacted(_) => "Interacted",
        }
    }
}
