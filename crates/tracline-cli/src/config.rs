//! Resolved configuration and storage handles for one CLI invocation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracline_config::{default_data_dir, ConfigLoader, TraclineConfig};
use tracline_daemon::{Repositories, Supervisor, TraceService};
use tracline_sqlite::{RetentionPolicy, SqliteAccessLog, SqliteConfig, SqlitePool};

/// Configuration plus an open database.
pub struct CliContext {
    pub config: TraclineConfig,
    pub pool: SqlitePool,
    pub repos: Repositories,
}

impl CliContext {
    /// Open the database named by `config`.
    pub fn open(config: TraclineConfig) -> Result<Self> {
        let pool = SqlitePool::new(SqliteConfig::from(&config.storage)).with_context(|| {
            format!(
                "Failed to open database at {}",
                config.storage.database_path.display()
            )
        })?;
        let repos = Repositories::sqlite(pool.clone());
        Ok(Self { config, pool, repos })
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(self.repos.clone(), self.config.monitor.clone())
    }

    pub fn trace(&self) -> TraceService {
        TraceService::new(self.repos.clone())
    }

    pub fn access_log(&self) -> SqliteAccessLog {
        SqliteAccessLog::new(self.pool.clone())
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::from(&self.config.history)
    }

    /// Log file of a detached monitor.
    pub fn monitor_log_path(&self, project_id: &str) -> PathBuf {
        monitor_log_path(&self.data_dir(), project_id)
    }

    /// Directory holding monitor logs: next to the database, or the default data dir.
    pub fn data_dir(&self) -> PathBuf {
        self.config
            .storage
            .database_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(default_data_dir)
    }
}

/// Read the config file and apply the `--db-path` override.
pub fn load_config(config_path: Option<&Path>, db_path: Option<&Path>) -> Result<TraclineConfig> {
    let loader = match config_path {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load().context("Failed to load configuration")?;
    if let Some(db) = db_path {
        config.storage.database_path = db.to_path_buf();
    }
    Ok(config)
}

/// `<data_dir>/logs/monitor-<project>.log`
pub fn monitor_log_path(data_dir: &Path, project_id: &str) -> PathBuf {
    let safe: String = project_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    data_dir.join("logs").join(format!("monitor-{}.log", safe))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn db_override_and_log_location() {
        let dir = TempDir::new().unwrap();
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, "[monitor]\ndebounce_ms = 120\n").unwrap();
        let db = dir.path().join("data").join("t.db");

        let config = load_config(Some(&config_file), Some(&db)).unwrap();
        assert_eq!(config.monitor.debounce_ms, 120);
        assert_eq!(config.storage.database_path, db);

        let ctx = CliContext::open(config).unwrap();
        assert_eq!(
            ctx.monitor_log_path("web/app"),
            dir.path().join("data").join("logs").join("monitor-web_app.log")
        );
    }
}
