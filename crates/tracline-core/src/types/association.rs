use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A confirmed link between one file and one task.
///
/// Rows are only ever created by an explicit association command. The monitor
/// updates `last_modified_at` and `active`, and re-keys rows on rename, but
/// never creates or erases them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAssociation {
    pub file_path: PathBuf,
    pub task_id: String,
    /// Number of times this pairing has been confirmed active.
    pub reference_count: u32,
    pub active: bool,
    pub first_associated_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

impl FileAssociation {
    pub fn new(file_path: impl Into<PathBuf>, task_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            file_path: file_path.into(),
            task_id: task_id.into(),
            reference_count: 1,
            active: true,
            first_associated_at: now,
            last_modified_at: now,
        }
    }

    /// Composite key.
    pub fn key(&self) -> (&PathBuf, &str) {
        (&self.file_path, &self.task_id)
    }
}

/// A batch of row changes that a repository must apply in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationChanges {
    /// Rows to insert or overwrite, keyed by `(file_path, task_id)`.
    pub upserts: Vec<FileAssociation>,
    /// `(file_path, task_id)` rows to delete outright. Only renames use this.
    pub removed: Vec<(PathBuf, String)>,
}

impl AssociationChanges {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removed.is_empty()
    }
}
