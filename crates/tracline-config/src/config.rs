//! Configuration model.
//!
//! Every section derives `Default`, and `#[serde(default)]` lets a partial file
//! fill in only the values it cares about.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraclineConfig {
    /// Database location and connection tuning.
    pub storage: StorageConfig,
    /// File monitor behaviour.
    pub monitor: MonitorConfig,
    /// Access log retention policy.
    pub history: HistoryConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. `~` is expanded on load.
    pub database_path: PathBuf,
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: crate::loader::default_data_dir().join("tracline.db"),
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    /// Busy timeout as a [`Duration`].
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// How delete and create pairs are interpreted by the normalizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameDetection {
    /// Emit raw `deleted` and `created` events.
    Off,
    /// Pair a delete and a create with matching content into a `renamed` event.
    #[default]
    BestEffort,
}

/// Which notification backend the watch adapter uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchBackend {
    /// The platform's native notification API (inotify, FSEvents, ReadDirectoryChangesW).
    #[default]
    Native,
    /// Periodic directory scanning. Useful on network mounts.
    Polling,
}

/// Monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Quiet period per path before a normalized event is emitted.
    pub debounce_ms: u64,
    /// Extensions watched when neither the command line nor stored settings name any.
    pub default_extensions: Vec<String>,
    /// Directory names skipped at any depth under the project root.
    pub excluded_dirs: Vec<String>,
    /// Upper bound for a graceful stop before the worker is forced down.
    pub stop_timeout_ms: u64,
    /// Upper bound for a detached monitor to report `running`.
    pub start_timeout_ms: u64,
    /// Rename pairing strategy.
    pub rename_detection: RenameDetection,
    /// Notification backend.
    pub backend: WatchBackend,
    /// Scan interval for the polling backend.
    pub poll_interval_ms: u64,
    /// Attempts for a store write that fails with a transient error.
    pub max_retries: u32,
    /// Base delay between retries; doubles on each attempt.
    pub retry_backoff_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            default_extensions: [".py", ".js", ".ts", ".java", ".c", ".cpp", ".h", ".go", ".rs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            excluded_dirs: [
                ".git",
                ".hg",
                ".svn",
                "node_modules",
                "target",
                "build",
                "dist",
                "__pycache__",
                ".venv",
                ".tox",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            stop_timeout_ms: 5000,
            start_timeout_ms: 5000,
            rename_detection: RenameDetection::default(),
            backend: WatchBackend::default(),
            poll_interval_ms: 1000,
            max_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl MonitorConfig {
    /// Debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Graceful stop timeout.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Detached start timeout.
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// Polling backend interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Base retry delay.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Access log retention. Zero means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Keep at most this many entries per project.
    pub max_entries_per_project: u64,
    /// Drop entries older than this many days.
    pub max_age_days: u64,
    /// Prune after every graceful stop.
    pub prune_on_stop: bool,
}

impl HistoryConfig {
    /// True when neither limit is set.
    pub fn is_unbounded(&self) -> bool {
        self.max_entries_per_project == 0 && self.max_age_days == 0
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, e.g. `info` or `tracline_daemon=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
