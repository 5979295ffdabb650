use chrono::Utc;
use tracing::instrument;

use roomsync_core::room::{RoomId, RoomState, DEFAULT_ROOM_VALUE};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "room_states";

const SELECT_COLUMNS: &str = "id, room_id, value, last_modified_by, last_modified_at, active";

/// Room created on first start so clients have something to join.
pub const SEED_ROOM_ID: &str = "demo-room";
pub const SEED_ACTOR: &str = "system";

/// Synchronous repository over the `room_states` table.
#[derive(Clone)]
pub struct RoomStateRepo {
    db: Database,
}

impl RoomStateRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch the state for a room, if one was ever written.
    #[instrument(skip(self), fields(room_id = %room_id))]
    pub fn get_by_room(&self, room_id: &RoomId) -> Result<Option<RoomState>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM {TABLE} WHERE room_id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([room_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(map_row(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Create the room's record or overwrite its value in place.
    ///
    /// Single statement keyed on the unique `room_id` index, so two writers
    /// racing on a brand-new room still end up with one row.
    #[instrument(skip(self, value), fields(room_id = %room_id))]
    pub fn upsert(&self, room_id: &RoomId, value: &str, actor: &str) -> Result<RoomState, StoreError> {
        let now = row_helpers::format_timestamp(&Utc::now());
        self.db.with_conn(|conn| {
            let sql = format!(
                "INSERT INTO {TABLE} (room_id, value, last_modified_by, last_modified_at, active)
                 VALUES (?1, ?2, ?3, ?4, 1)
                 ON CONFLICT(room_id) DO UPDATE SET
                     value = excluded.value,
                     last_modified_by = excluded.last_modified_by,
                     last_modified_at = excluded.last_modified_at
                 RETURNING {SELECT_COLUMNS}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params![room_id.as_str(), value, actor, now])?;
            let row = rows
                .next()?
                .ok_or_else(|| StoreError::Database("upsert returned no row".into()))?;
            map_row(row)
        })
    }

    /// Insert the demo room unless it already exists. Returns true when a row was added.
    #[instrument(skip(self))]
    pub fn seed_defaults(&self) -> Result<bool, StoreError> {
        let now = row_helpers::format_timestamp(&Utc::now());
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {TABLE} (room_id, value, last_modified_by, last_modified_at, active)
                     VALUES (?1, ?2, ?3, ?4, 1)"
                ),
                rusqlite::params![SEED_ROOM_ID, DEFAULT_ROOM_VALUE, SEED_ACTOR, now],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Number of stored rooms.
    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))?)
        })
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> Result<RoomState, StoreError> {
    let raw_room: String = row_helpers::get(row, 1, TABLE, "room_id")?;
    let room_id = RoomId::parse(raw_room).map_err(|e| StoreError::CorruptRow {
        table: TABLE,
        column: "room_id",
        detail: e.to_string(),
    })?;
    let raw_ts: String = row_helpers::get(row, 4, TABLE, "last_modified_at")?;

    Ok(RoomState {
        id: row_helpers::get(row, 0, TABLE, "id")?,
        room_id,
        value: row_helpers::get(row, 2, TABLE, "value")?,
        last_modified_by: row_helpers::get(row, 3, TABLE, "last_modified_by")?,
        last_modified_at: row_helpers::parse_timestamp(&raw_ts, TABLE, "last_modified_at")?,
        active: row_helpers::get(row, 5, TABLE, "active")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RoomStateRepo {
        RoomStateRepo::new(Database::in_memory().unwrap())
    }

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    #[test]
    fn get_missing_room_is_none() {
        let repo = repo();
        assert!(repo.get_by_room(&room("r1")).unwrap().is_none());
    }

    #[test]
    fn first_upsert_creates_record() {
        let repo = repo();
        let state = repo.upsert(&room("r1"), "#ff0000", "alice").unwrap();
        assert_eq!(state.room_id.as_str(), "r1");
        assert_eq!(state.value, "#ff0000");
        assert_eq!(state.last_modified_by, "alice");
        assert!(state.active);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn second_upsert_updates_same_record() {
        let repo = repo();
        let first = repo.upsert(&room("r1"), "#ff0000", "alice").unwrap();
        let second = repo.upsert(&room("r1"), "#00ff00", "bob").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.value, "#00ff00");
        assert_eq!(second.last_modified_by, "bob");
        assert!(second.last_modified_at >= first.last_modified_at);
        assert_eq!(repo.count().unwrap(), 1);

        let fetched = repo.get_by_room(&room("r1")).unwrap().unwrap();
        assert_eq!(fetched, second);
    }

    #[test]
    fn upsert_leaves_active_untouched() {
        let repo = repo();
        let created = repo.upsert(&room("r1"), "#ff0000", "alice").unwrap();
        repo.db
            .with_conn(|conn| {
                conn.execute("UPDATE room_states SET active = 0 WHERE id = ?1", [created.id])?;
                Ok(())
            })
            .unwrap();
        let updated = repo.upsert(&room("r1"), "#0000ff", "bob").unwrap();
        assert!(!updated.active);
    }

    #[test]
    fn rooms_are_independent() {
        let repo = repo();
        let a = repo.upsert(&room("a"), "#111111", "alice").unwrap();
        let b = repo.upsert(&room("b"), "#222222", "bob").unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(repo.get_by_room(&room("a")).unwrap().unwrap().value, "#111111");
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn oversized_value_is_stored_verbatim() {
        let repo = repo();
        let long = "x".repeat(64);
        let state = repo.upsert(&room("r1"), &long, "alice").unwrap();
        assert_eq!(state.value, long);
    }

    #[test]
    fn seed_is_idempotent() {
        let repo = repo();
        assert!(repo.seed_defaults().unwrap());
        assert!(!repo.seed_defaults().unwrap());
        let seeded = repo.get_by_room(&room(SEED_ROOM_ID)).unwrap().unwrap();
        assert_eq!(seeded.value, DEFAULT_ROOM_VALUE);
        assert_eq!(seeded.last_modified_by, SEED_ACTOR);
    }

    #[test]
    fn seed_does_not_overwrite_existing_room() {
        let repo = repo();
        repo.upsert(&room(SEED_ROOM_ID), "#abcdef", "alice").unwrap();
        assert!(!repo.seed_defaults().unwrap());
        let state = repo.get_by_room(&room(SEED_ROOM_ID)).unwrap().unwrap();
        assert_eq!(state.value, "#abcdef");
    }

    #[test]
    fn corrupt_timestamp_is_reported() {
        let repo = repo();
        repo.db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO room_states (room_id, value, last_modified_by, last_modified_at) VALUES ('r1', 'v', 'a', 'garbage')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let err = repo.get_by_room(&room("r1")).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { column: "last_modified_at", .. }));
    }
}
