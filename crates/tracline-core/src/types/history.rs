//! Access log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::event::{FileAction, FileEvent};

/// An access log record before the repository assigns its sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccessLogEntry {
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: FileAction,
    pub file_path: PathBuf,
    pub prior_path: Option<PathBuf>,
    /// Set when exactly one active association covered the path.
    pub task_id: Option<String>,
}

impl NewAccessLogEntry {
    pub fn from_event(project_id: impl Into<String>, event: &FileEvent, task_id: Option<String>) -> Self {
        Self {
            project_id: project_id.into(),
            timestamp: event.timestamp,
            action: event.action,
            file_path: event.path.clone(),
            prior_path: event.prior_path.clone(),
            task_id,
        }
    }
}

/// Immutable, ordered audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// Insertion order, unique per store. Breaks timestamp ties.
    pub sequence: i64,
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: FileAction,
    pub file_path: PathBuf,
    pub prior_path: Option<PathBuf>,
    pub task_id: Option<String>,
}

impl AccessLogEntry {
    pub fn from_new(sequence: i64, entry: NewAccessLogEntry) -> Self {
        Self {
            sequence,
            project_id: entry.project_id,
            timestamp: entry.timestamp,
            action: entry.action,
            file_path: entry.file_path,
            prior_path: entry.prior_path,
            task_id: entry.task_id,
        }
    }
}

/// Pagination and filtering for history queries. Results are newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: usize,
    pub offset: usize,
    pub action: Option<FileAction>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            action: None,
        }
    }
}

impl HistoryQuery {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            action: None,
        }
    }

    pub fn with_action(mut self, action: FileAction) -> Self {
        self.action = Some(action);
        self
    }
}
