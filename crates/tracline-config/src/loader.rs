//! Locating, reading and post-processing the configuration file.

use crate::config::TraclineConfig;
use crate::error::ConfigError;
use crate::extensions::normalize_extensions;
use crate::validation::ConfigValidator;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "TRACLINE_CONFIG";

/// Environment variable overriding `storage.database_path`.
pub const DB_PATH_ENV: &str = "TRACLINE_DB_PATH";

/// `~/.config/tracline/config.toml`, or `./tracline.toml` when no config dir exists.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("tracline").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("tracline.toml"))
}

/// `~/.local/share/tracline`, holding the database and monitor logs.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("tracline"))
        .unwrap_or_else(|| PathBuf::from(".tracline"))
}

/// Loads [`TraclineConfig`] with file, environment and validation steps applied.
#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigLoader {
    /// Loader using the default search order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read this file instead of the default location. A missing explicit file is an error.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// Ignore environment overrides. Used by tests.
    pub fn without_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Resolve, read, normalise and validate the configuration.
    pub fn load(&self) -> Result<TraclineConfig, ConfigError> {
        let env_path = if self.skip_env {
            None
        } else {
            std::env::var_os(CONFIG_ENV).map(PathBuf::from)
        };

        let mut config = match (&self.explicit_path, env_path) {
            (Some(path), _) => Self::read_file(path)?,
            (None, Some(path)) => Self::read_file(&path)?,
            (None, None) => {
                let path = default_config_path();
                if path.exists() {
                    Self::read_file(&path)?
                } else {
                    debug!(path = %path.display(), "no config file, using defaults");
                    TraclineConfig::default()
                }
            }
        };

        if !self.skip_env {
            if let Some(db) = std::env::var_os(DB_PATH_ENV) {
                config.storage.database_path = PathBuf::from(db);
            }
        }

        Self::finish(config)
    }

    /// Parse configuration from a TOML string and apply the same post-processing as [`load`](Self::load).
    pub fn from_toml_str(contents: &str) -> Result<TraclineConfig, ConfigError> {
        let config: TraclineConfig =
            toml::from_str(contents).map_err(|e| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                message: e.to_string(),
            })?;
        Self::finish(config)
    }

    fn read_file(path: &Path) -> Result<TraclineConfig, ConfigError> {
        debug!(path = %path.display(), "loading config");
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn finish(mut config: TraclineConfig) -> Result<TraclineConfig, ConfigError> {
        config.storage.database_path = expand_tilde(&config.storage.database_path);
        config.monitor.default_extensions =
            normalize_extensions(&config.monitor.default_extensions)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
