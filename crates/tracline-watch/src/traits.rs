//! Platform watch adapter contract.

use crate::{error::Result, events::EventFilter, events::RawEvent};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// A swappable file notification backend.
///
/// Implementations watch `root` recursively, skip excluded directories and
/// drop files the filter rejects. They do not deduplicate bursts.
#[async_trait]
pub trait WatchAdapter: Send {
    /// Backend identifier for logs.
    fn backend_type(&self) -> &'static str;

    /// Begin watching. Fails fast if `root` is missing, not a directory or
    /// unreadable, leaving no watches behind.
    async fn start(
        &mut self,
        root: &Path,
        filter: EventFilter,
    ) -> Result<mpsc::UnboundedReceiver<RawEvent>>;

    /// Release every watch descriptor. The event channel closes once the
    /// adapter's forwarding task has drained. Calling `stop` on a stopped
    /// adapter is a no-op.
    async fn stop(&mut self) -> Result<()>;

    /// Number of directories currently under watch.
    fn watched_directories(&self) -> usize;
}
