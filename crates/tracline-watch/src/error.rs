//! Error types for the file watching system.

use std::path::PathBuf;
use thiserror::Error;
use tracline_core::CoreError;

/// Errors that can occur while starting or running a watch.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The project root does not exist.
    #[error("Root path {} does not exist", .0.display())]
    RootMissing(PathBuf),

    /// The project root is a file, not a directory.
    #[error("Root path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The project root cannot be listed.
    #[error("Root path {} is not readable: {reason}", path.display())]
    RootUnreadable {
        /// Offending root.
        path: PathBuf,
        /// OS error text.
        reason: String,
    },

    /// The adapter is already watching a root.
    #[error("Watcher is already running on {}", .0.display())]
    AlreadyWatching(PathBuf),

    /// Error reported by the notification backend.
    #[error("File watching error: {0}")]
    Backend(String),

    /// Invalid exclusion pattern.
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for file watching operations.
pub type Result<T> = std::result::Result<T, WatchError>;

impl From<notify::Error> for WatchError {
    fn from(err: notify::Error) -> Self {
        WatchError::Backend(err.to_string())
    }
}

impl From<globset::Error> for WatchError {
    fn from(err: globset::Error) -> Self {
        WatchError::Pattern(err.to_string())
    }
}

impl From<WatchError> for CoreError {
    fn from(err: WatchError) -> Self {
        match err {
            WatchError::RootMissing(path) => CoreError::RootUnavailable {
                path,
                reason: "does not exist".to_string(),
            },
            WatchError::NotADirectory(path) => CoreError::RootUnavailable {
                path,
                reason: "is not a directory".to_string(),
            },
            WatchError::RootUnreadable { path, reason } => {
                CoreError::RootUnavailable { path, reason }
            }
            WatchError::Pattern(msg) => CoreError::InvalidInput(msg),
            other => CoreError::Watch(other.to_string()),
        }
    }
}
