//! Error types for configuration loading and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected shape.
    #[error("Failed to parse config file {path}: {message}")]
    Parse {
        /// Path that was being parsed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A field holds a value outside its allowed range or syntax.
    #[error("Invalid value for {field}: {value}")]
    InvalidValue {
        /// Dotted field name, e.g. `monitor.debounce_ms`.
        field: String,
        /// Human readable description of the problem.
        value: String,
    },

    /// A file extension does not have valid syntax.
    #[error("Invalid extension '{extension}': {reason}")]
    InvalidExtension {
        /// The extension as given by the user.
        extension: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}
