use roomsync_core::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(String),

    #[error("store task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

/// Every store failure reaches callers as a transient, retryable error.
impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::StorageUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_become_storage_unavailable() {
        let err: SyncError = StoreError::Database("database is locked".into()).into();
        assert!(matches!(err, SyncError::StorageUnavailable(ref m) if m.contains("locked")));
        assert!(err.is_retryable());
    }

    #[test]
    fn corrupt_row_display() {
        let err = StoreError::CorruptRow {
            table: "room_states",
            column: "last_modified_at",
            detail: "bad timestamp".into(),
        };
        assert_eq!(
            err.to_string(),
            "corrupt row in room_states.last_modified_at: bad timestamp"
        );
    }
}
