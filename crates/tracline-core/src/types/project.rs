use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths::file_extension;

/// Stored monitor settings for a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedProject {
    pub project_id: String,
    pub root: PathBuf,
    /// Normalised extensions (`.py`). Empty means every extension.
    pub extensions: Vec<String>,
    pub monitor_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl WatchedProject {
    pub fn new(project_id: impl Into<String>, root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            project_id: project_id.into(),
            root: root.into(),
            extensions,
            monitor_enabled: true,
            updated_at: Utc::now(),
        }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match file_extension(path) {
            Some(ext) => self.extensions.iter().any(|e| *e == ext),
            None => false,
        }
    }

    /// Human readable extension list, `All` when unfiltered.
    pub fn extensions_label(&self) -> String {
        if self.extensions.is_empty() {
            "All".to_string()
        } else {
            self.extensions.join(", ")
        }
    }
}
