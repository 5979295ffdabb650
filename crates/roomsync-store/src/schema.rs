/// SQL DDL for the room state database.
/// Stored in `PRAGMA user_version`; a newer file is refused on open.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS room_states (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    room_id TEXT NOT NULL,
    value TEXT NOT NULL DEFAULT '#007bff',
    last_modified_by TEXT NOT NULL DEFAULT '',
    last_modified_at TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_room_states_room ON room_states(room_id);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
