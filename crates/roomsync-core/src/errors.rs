/// Failure of a single gateway operation.
///
/// Every variant is local to the operation that produced it: none of them
/// tears down the connection or touches other rooms.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SyncError {
    /// Empty or oversized identifier, or a missing parameter.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The state store could not complete the call. Nothing changed; retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The target connection is gone. Broadcast paths swallow this.
    #[error("connection gone: {0}")]
    ConnectionGone(String),

    /// Raised only at the transport boundary.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// A server-side fault the caller cannot fix by retrying or by
    /// changing its request.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// Wire error code sent back in RPC responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID_PARAMS",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::ConnectionGone(_) => "CONNECTION_GONE",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
