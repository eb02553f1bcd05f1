//! # TracLine Core
//!
//! Domain model and storage boundary for the TracLine monitoring and
//! traceability subsystem.
//!
//! This crate defines *what* is stored (file events, file/task associations,
//! access log entries, daemon records, watched project settings) and the
//! repository traits through which the rest of the workspace reads and writes
//! it. Physical storage lives in `tracline-sqlite`; runtime behaviour lives in
//! `tracline-daemon`.

pub mod error;
pub mod paths;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use error::{CoreError, Result, StorageError, StorageResult};
pub use paths::{file_extension, normalize_path, resolve_path};
pub use traits::{
    AccessLogRepository, AssociationRepository, DaemonRecordRepository,
    ProjectSettingsRepository, TaskDirectory,
};
pub use types::{
    AccessLogEntry, AssociationChanges, DaemonRecord, DaemonState, FileAction, FileAssociation,
    FileEvent, HistoryQuery, NewAccessLogEntry, TaskFilter, TaskSummary, WatchedProject,
};
