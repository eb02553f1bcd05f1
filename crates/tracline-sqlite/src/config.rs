//! Connection settings.

use std::path::{Path, PathBuf};
use tracline_config::StorageConfig;

/// SQLite connection configuration
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    /// Enable write-ahead logging
    pub wal_mode: bool,
    /// Enforce foreign keys
    pub foreign_keys: bool,
    /// Milliseconds to wait on a locked database
    pub busy_timeout_ms: u64,
    /// Page cache size (negative values are KiB)
    pub cache_size: i64,
}

impl SqliteConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_ms: 5000,
            cache_size: -8000,
        }
    }

    /// In-memory database for tests.
    pub fn memory() -> Self {
        Self {
            wal_mode: false,
            ..Self::new(":memory:")
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.to_str() == Some(":memory:")
    }
}

impl From<&StorageConfig> for SqliteConfig {
    fn from(storage: &StorageConfig) -> Self {
        Self {
            busy_timeout_ms: storage.busy_timeout_ms,
            ..Self::new(&storage.database_path)
        }
    }
}
