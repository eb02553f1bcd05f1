//! Watch adapter backends.

mod notify_backend;

pub use notify_backend::{validate_root, NotifyWatcher};

use crate::traits::WatchAdapter;
use tracline_config::MonitorConfig;

/// Build the adapter selected by `monitor.backend`.
pub fn create_adapter(config: &MonitorConfig) -> Box<dyn WatchAdapter> {
    Box::new(NotifyWatcher::new(config.backend, config.poll_interval()))
}
