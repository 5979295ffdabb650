use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use roomsync_core::room::{RoomId, RoomState};

use crate::error::StoreError;
use crate::store::StateStore;

/// Process-local store. State is lost on restart.
#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    rooms: HashMap<RoomId, RoomState>,
    next_id: i64,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_by_room(&self, room_id: &RoomId) -> Result<Option<RoomState>, StoreError> {
        Ok(self.inner.lock().rooms.get(room_id).cloned())
    }

    async fn upsert(&self, room_id: &RoomId, value: &str, actor: &str) -> Result<RoomState, StoreError> {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        if let Some(state) = inner.rooms.get_mut(room_id) {
            state.value = value.to_owned();
            state.last_modified_by = actor.to_owned();
            state.last_modified_at = now;
            return Ok(state.clone());
        }

        inner.next_id += 1;
        let state = RoomState {
            id: inner.next_id,
            room_id: room_id.clone(),
            value: value.to_owned(),
            last_modified_by: actor.to_owned(),
            last_modified_at: now,
            active: true,
        };
        inner.rooms.insert(room_id.clone(), state.clone());
        Ok(state)
    }
}
