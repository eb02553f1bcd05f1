//! tracing-subscriber setup.

use std::io::IsTerminal;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Precedence: command-line level, then `RUST_LOG`, then the config file's
/// `[logging] level`. Output goes to stderr so command output stays clean.
pub fn init(requested: Option<LevelFilter>, config_level: &str) {
    let filter = match requested {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config_level))
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}
