use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::StorageResult;
use crate::types::{
    AccessLogEntry, AssociationChanges, DaemonRecord, FileAction, FileAssociation, HistoryQuery,
    NewAccessLogEntry, TaskFilter, TaskSummary, WatchedProject,
};

/// Persistent file/task associations, partitioned by project.
#[async_trait]
pub trait AssociationRepository: Send + Sync {
    /// Every row for the project, active or not. Used to build the in-memory index.
    async fn load_project(&self, project_id: &str) -> StorageResult<Vec<FileAssociation>>;

    /// Current rows for the given paths only. Writers call this before
    /// computing changes so rows written by another process are not lost.
    async fn load_paths(
        &self,
        project_id: &str,
        paths: &[PathBuf],
    ) -> StorageResult<Vec<FileAssociation>>;

    /// Apply all upserts and removals in one transaction. Either every change
    /// lands or none does.
    async fn apply_changes(&self, project_id: &str, changes: &AssociationChanges) -> StorageResult<()>;
}

/// Append-only access history.
#[async_trait]
pub trait AccessLogRepository: Send + Sync {
    /// Append an entry and return its sequence number.
    async fn append(&self, entry: &NewAccessLogEntry) -> StorageResult<i64>;

    /// Newest first, ordered by `(timestamp DESC, sequence DESC)`.
    async fn query(&self, project_id: &str, query: &HistoryQuery) -> StorageResult<Vec<AccessLogEntry>>;

    async fn count(&self, project_id: &str, action: Option<FileAction>) -> StorageResult<u64>;
}

/// One [`DaemonRecord`] per project.
#[async_trait]
pub trait DaemonRecordRepository: Send + Sync {
    async fn get(&self, project_id: &str) -> StorageResult<Option<DaemonRecord>>;

    async fn list(&self) -> StorageResult<Vec<DaemonRecord>>;

    /// Write `next` only if the stored record still matches `expected` on
    /// state and PID (`None` means no record exists). Returns whether the
    /// write happened.
    async fn compare_and_swap(
        &self,
        expected: Option<&DaemonRecord>,
        next: &DaemonRecord,
    ) -> StorageResult<bool>;

    /// Unconditional write.
    async fn put(&self, record: &DaemonRecord) -> StorageResult<()>;
}

/// Stored monitor settings.
#[async_trait]
pub trait ProjectSettingsRepository: Send + Sync {
    async fn get(&self, project_id: &str) -> StorageResult<Option<WatchedProject>>;

    async fn upsert(&self, project: &WatchedProject) -> StorageResult<()>;

    /// Returns `false` when the project has no settings row.
    async fn set_monitor_enabled(&self, project_id: &str, enabled: bool) -> StorageResult<bool>;

    async fn list(&self) -> StorageResult<Vec<WatchedProject>>;
}

/// Read access to the task tracker.
#[async_trait]
pub trait TaskDirectory: Send + Sync {
    async fn get_task(&self, task_id: &str) -> StorageResult<Option<TaskSummary>>;

    async fn task_exists(&self, task_id: &str) -> StorageResult<bool> {
        Ok(self.get_task(task_id).await?.is_some())
    }

    /// Matching tasks ordered by id.
    async fn list_tasks(&self, filter: &TaskFilter) -> StorageResult<Vec<TaskSummary>>;
}
