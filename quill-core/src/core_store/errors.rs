/*
    errors.rs - Error types for the access store

    Covers:
    - Missing rows
    - Uniqueness and serialization conflicts
    - Backend (SQLite / pool) failures
    - Rows that cannot be decoded
*/

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the store subsystem
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation, or the backend could not serialize a transaction
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage I/O or connection pool error
    #[error("Storage error: {0}")]
    Backend(String),

    /// A persisted row could not be decoded
    #[error("Corrupted data: {0}")]
    Corrupted(String),
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Backend(format!("connection pool: {}", e))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &e {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    StoreError::Conflict(format!("database busy: {}", e))
                }
                ErrorCode::ConstraintViolation => {
                    StoreError::Conflict(format!("constraint violation: {}", e))
                }
                _ => StoreError::Backend(e.to_string()),
            },
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(e.to_string()),
            _ => StoreError::Backend(e.to_string()),
        }
    }
}
