// Error taxonomy for the task registry

use thiserror::Error;

/// Errors surfaced by [`crate::TaskStore`] operations.
///
/// Three classes matter to callers: validation failures (never worth
/// retrying), missing entities (not a system failure), and storage
/// failures (possibly transient, see [`StoreError::is_retryable`]).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Caller-supplied input violates a contract (empty title, unknown
    /// status value, malformed metadata JSON).
    #[error("validation error: {0}")]
    Validation(String),

    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("attachment {0} not found")]
    AttachmentNotFound(i64),

    /// Underlying SQLite failure, including corrupt persisted values
    /// surfaced as column conversion errors.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem failure while opening the store (storage-class).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True for lock-contention storage errors where the caller may
    /// simply retry the operation. Validation and not-found errors are
    /// never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// True for either not-found variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::TaskNotFound(_) | StoreError::AttachmentNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(StoreError::TaskNotFound(1).is_not_found());
        assert!(StoreError::AttachmentNotFound(1).is_not_found());
        assert!(!StoreError::Validation("bad".to_string()).is_not_found());
    }

    #[test]
    fn test_validation_never_retryable() {
        assert!(!StoreError::Validation("bad".to_string()).is_retryable());
        assert!(!StoreError::TaskNotFound(7).is_retryable());
    }

    #[test]
    fn test_busy_is_retryable() {
        let inner = rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY);
        let err = StoreError::Storage(rusqlite::Error::SqliteFailure(inner, None));
        assert!(err.is_retryable());
    }
}
