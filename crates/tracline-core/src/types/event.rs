//! Normalized file events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::CoreError;

/// Net effect of a burst of raw changes on one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl FileAction {
    pub const ALL: [FileAction; 4] = [
        FileAction::Created,
        FileAction::Modified,
        FileAction::Deleted,
        FileAction::Renamed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Created => "created",
            FileAction::Modified => "modified",
            FileAction::Deleted => "deleted",
            FileAction::Renamed => "renamed",
        }
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(FileAction::Created),
            "modified" => Ok(FileAction::Modified),
            "deleted" => Ok(FileAction::Deleted),
            "renamed" | "moved" => Ok(FileAction::Renamed),
            other => Err(CoreError::invalid_input(format!(
                "unknown file action '{}'",
                other
            ))),
        }
    }
}

/// One normalized event, produced by the normalizer and consumed once by the
/// association store and the access log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub action: FileAction,
    pub path: PathBuf,
    /// Source path for renames.
    pub prior_path: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    pub fn new(action: FileAction, path: impl Into<PathBuf>) -> Self {
        Self {
            action,
            path: path.into(),
            prior_path: None,
            timestamp: Utc::now(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(FileAction::Created, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(FileAction::Modified, path)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(FileAction::Deleted, path)
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        let mut event = Self::new(FileAction::Renamed, to);
        event.prior_path = Some(from.into());
        event
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
