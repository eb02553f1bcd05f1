//! Range checks that serde cannot express.

use crate::config::TraclineConfig;
use crate::error::ConfigError;
use crate::extensions::normalize_extension;

/// Validates a loaded [`TraclineConfig`].
pub struct ConfigValidator;

impl ConfigValidator {
    /// Return the first problem found, if any.
    pub fn validate(config: &TraclineConfig) -> Result<(), ConfigError> {
        let monitor = &config.monitor;

        if monitor.debounce_ms == 0 {
            return Err(invalid("monitor.debounce_ms", "must be greater than zero"));
        }
        if monitor.stop_timeout_ms == 0 {
            return Err(invalid("monitor.stop_timeout_ms", "must be greater than zero"));
        }
        if monitor.start_timeout_ms == 0 {
            return Err(invalid("monitor.start_timeout_ms", "must be greater than zero"));
        }
        if monitor.poll_interval_ms == 0 {
            return Err(invalid("monitor.poll_interval_ms", "must be greater than zero"));
        }
        for ext in &monitor.default_extensions {
            normalize_extension(ext)?;
        }
        for dir in &monitor.excluded_dirs {
            if dir.is_empty() || dir.contains('/') || dir.contains('\\') {
                return Err(invalid(
                    "monitor.excluded_dirs",
                    &format!("'{}' must be a single directory name", dir),
                ));
            }
        }
        if config.logging.level.trim().is_empty() {
            return Err(invalid("logging.level", "must not be empty"));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ConfigValidator::validate(&TraclineConfig::default()).is_ok());
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let mut config = TraclineConfig::default();
        config.monitor.debounce_ms = 0;
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("monitor.debounce_ms"));
    }

    #[test]
    fn nested_excluded_dir_is_rejected() {
        let mut config = TraclineConfig::default();
        config.monitor.excluded_dirs.push("a/b".into());
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
