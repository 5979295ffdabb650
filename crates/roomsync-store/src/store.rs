use async_trait::async_trait;

use roomsync_core::room::{RoomId, RoomState};

use crate::database::Database;
use crate::error::StoreError;
use crate::rooms::RoomStateRepo;

/// Persistence seam for room state.
///
/// `upsert` must be atomic per room: callers may issue it concurrently for
/// the same room and must never observe two records or a torn update.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_by_room(&self, room_id: &RoomId) -> Result<Option<RoomState>, StoreError>;

    async fn upsert(&self, room_id: &RoomId, value: &str, actor: &str) -> Result<RoomState, StoreError>;
}

/// SQLite-backed store. Blocking calls run on the blocking pool.
#[derive(Clone)]
pub struct SqliteStateStore {
    repo: RoomStateRepo,
}

impl SqliteStateStore {
    pub fn new(db: Database) -> Self {
        Self {
            repo: RoomStateRepo::new(db),
        }
    }

    pub fn repo(&self) -> &RoomStateRepo {
        &self.repo
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get_by_room(&self, room_id: &RoomId) -> Result<Option<RoomState>, StoreError> {
        let repo = self.repo.clone();
        let room_id = room_id.clone();
        tokio::task::spawn_blocking(move || repo.get_by_room(&room_id)).await?
    }

    async fn upsert(&self, room_id: &RoomId, value: &str, actor: &str) -> Result<RoomState, StoreError> {
        let repo = self.repo.clone();
        let room_id = room_id.clone();
        let value = value.to_owned();
        let actor = actor.to_owned();
        tokio::task::spawn_blocking(move || repo.upsert(&room_id, &value, &actor)).await?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn sqlite_store_get_and_upsert() {
        let store = SqliteStateStore::new(Database::in_memory().unwrap());
        assert!(store.get_by_room(&room("r1")).await.unwrap().is_none());

        let created = store.upsert(&room("r1"), "#ff0000", "alice").await.unwrap();
        let updated = store.upsert(&room("r1"), "#00ff00", "bob").await.unwrap();
        assert_eq!(created.id, updated.id);

        let fetched = store.get_by_room(&room("r1")).await.unwrap().unwrap();
        assert_eq!(fetched.value, "#00ff00");
        assert_eq!(fetched.last_modified_by, "bob");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_writes_create_one_row() {
        let store = Arc::new(SqliteStateStore::new(Database::in_memory().unwrap()));
        let writes = (0..16).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .upsert(&room("fresh"), &format!("#{i:06}"), &format!("user{i}"))
                    .await
                    .unwrap()
            })
        });
        let results = futures::future::join_all(writes).await;

        let ids: Vec<i64> = results.into_iter().map(|r| r.unwrap().id).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]), "ids diverged: {ids:?}");
        assert_eq!(store.repo().count().unwrap(), 1);

        // Stored fields all come from the same write
        let state = store.get_by_room(&room("fresh")).await.unwrap().unwrap();
        let n = state.last_modified_by.trim_start_matches("user");
        assert_eq!(state.value, format!("#{:06}", n.parse::<u32>().unwrap()));
    }
}
