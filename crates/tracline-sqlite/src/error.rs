//! Error types for SQLite storage

use rusqlite::ErrorCode;
use thiserror::Error;
use tracline_core::StorageError;

/// SQLite storage error type
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// A stored value could not be decoded
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for SQLite operations
pub type SqliteResult<T> = Result<T, SqliteError>;

impl From<SqliteError> for StorageError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Connection(msg) => Self::Connection(msg),
            SqliteError::Schema(msg) => Self::Internal(msg),
            SqliteError::Decode(msg) => Self::Serialization(msg),
            SqliteError::Serialization(e) => Self::Serialization(e.to_string()),
            SqliteError::Rusqlite(e) => match e.sqlite_error_code() {
                Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                    Self::Busy(e.to_string())
                }
                Some(ErrorCode::ConstraintViolation) => Self::Constraint(e.to_string()),
                Some(ErrorCode::SystemIoFailure) => Self::Io(e.to_string()),
                _ => Self::Query(e.to_string()),
            },
        }
    }
}
