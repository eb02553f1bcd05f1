//! SQLite storage backend for TracLine
//!
//! Implements every repository trait from `tracline-core` on top of a single
//! SQLite database:
//!
//! - **file_associations**: file/task links with reference counts
//! - **file_access_log**: append-only access history, ordered by
//!   `(timestamp, sequence)`
//! - **daemon_records**: per-project monitor state with compare-and-swap
//! - **project_settings**: stored watch root and extension filter
//! - **tasks**: the task tracker's rows, read through [`SqliteTaskDirectory`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tracline_sqlite::{SqliteConfig, SqlitePool, SqliteAccessLog};
//! use tracline_core::{AccessLogRepository, HistoryQuery};
//!
//! let pool = SqlitePool::new(SqliteConfig::new("./tracline.db"))?;
//! let log = SqliteAccessLog::new(pool);
//! let recent = log.query("my-project", &HistoryQuery::new(20, 0)).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod repositories;
pub mod schema;

// Re-exports
pub use config::SqliteConfig;
pub use connection::SqlitePool;
pub use error::{SqliteError, SqliteResult};
pub use repositories::{
    RetentionPolicy, SqliteAccessLog, SqliteAssociationRepository, SqliteDaemonRecords,
    SqliteProjectSettings, SqliteTaskDirectory,
};
