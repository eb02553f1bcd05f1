//! Error types shared across the workspace.

use std::path::PathBuf;
use thiserror::Error;
use tracline_config::ConfigError;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result alias for repository calls.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors surfaced synchronously to monitor and trace callers.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Project root {} is not usable: {reason}", path.display())]
    RootUnavailable { path: PathBuf, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Monitor for project '{project}' is already running (PID {pid})")]
    AlreadyRunning { project: String, pid: u32 },

    #[error("Monitor for project '{0}' is not running")]
    NotRunning(String),

    #[error("Project '{0}' has no monitor settings")]
    ProjectNotFound(String),

    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Configuration and concurrency failures are the caller's to fix.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::RootUnavailable { .. }
                | Self::InvalidInput(_)
                | Self::AlreadyRunning { .. }
                | Self::NotRunning(_)
                | Self::ProjectNotFound(_)
                | Self::TaskNotFound(_)
        )
    }
}

/// Errors reported by repository implementations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database is busy: {0}")]
    Busy(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::Io(_) | Self::Timeout(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(StorageError::Busy("locked".to_string()).is_retryable());
        assert!(StorageError::Io("interrupted".to_string()).is_retryable());
        assert!(!StorageError::Constraint("unique".to_string()).is_retryable());
        assert!(!StorageError::Query("syntax".to_string()).is_retryable());
    }

    #[test]
    fn already_running_names_the_pid() {
        let err = CoreError::AlreadyRunning {
            project: "demo".to_string(),
            pid: 4242,
        };
        let msg = err.to_string();
        assert!(msg.contains("demo"));
        assert!(msg.contains("4242"));
        assert!(err.is_user_error());
    }

    #[test]
    fn storage_errors_are_not_user_errors() {
        let err: CoreError = StorageError::Busy("x".into()).into();
        assert!(!err.is_user_error());
    }
}
