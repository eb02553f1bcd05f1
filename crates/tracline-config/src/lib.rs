//! # TracLine Configuration Library
//!
//! Type-safe configuration for the TracLine file monitor and traceability core.
//!
//! Configuration is read from a single TOML file (by default
//! `~/.config/tracline/config.toml`). Every field has a default, so a missing
//! file is a valid configuration. A handful of environment variables override
//! file values; see [`ConfigLoader`].
//!
//! ```rust,no_run
//! use tracline_config::ConfigLoader;
//!
//! let config = ConfigLoader::new().load()?;
//! println!("debounce window: {:?}", config.monitor.debounce());
//! # Ok::<(), tracline_config::ConfigError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod extensions;
mod loader;
mod validation;

pub use config::*;
pub use error::ConfigError;
pub use extensions::{normalize_extension, normalize_extensions};
pub use loader::{default_config_path, default_data_dir, ConfigLoader, CONFIG_ENV, DB_PATH_ENV};
pub use validation::ConfigValidator;
