//! Notify-based watch adapter.
//!
//! Every non-excluded directory under the root gets its own non-recursive
//! watch, so excluded trees such as `node_modules` never consume watch
//! descriptors. Directories created or moved in after start are picked up by
//! the forwarding task.

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracline_config::WatchBackend;
use walkdir::WalkDir;

use crate::{
    error::{Result, WatchError},
    events::{EventFilter, RawEvent},
    traits::WatchAdapter,
};

type SharedWatcher = Arc<Mutex<Option<Box<dyn Watcher + Send>>>>;

const WATCH_RETRIES: u32 = 3;
const WATCH_RETRY_BASE: Duration = Duration::from_millis(20);
const FORWARDER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// File watcher backed by `notify`, using either the platform's native API or
/// periodic polling.
pub struct NotifyWatcher {
    backend: WatchBackend,
    poll_interval: Duration,
    active: Option<ActiveWatch>,
}

struct ActiveWatch {
    root: PathBuf,
    watcher: SharedWatcher,
    watched: Arc<Mutex<HashSet<PathBuf>>>,
    forwarder: JoinHandle<()>,
}

impl NotifyWatcher {
    /// Create an idle watcher.
    pub fn new(backend: WatchBackend, poll_interval: Duration) -> Self {
        Self {
            backend,
            poll_interval,
            active: None,
        }
    }

    /// Native backend with default settings.
    pub fn native() -> Self {
        Self::new(WatchBackend::Native, Duration::from_secs(1))
    }

    /// Root currently being watched.
    pub fn root(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.root.as_path())
    }

    fn build_watcher(
        &self,
        tx: mpsc::UnboundedSender<notify::Result<Event>>,
    ) -> Result<Box<dyn Watcher + Send>> {
        let handler = move |res: notify::Result<Event>| {
            // The receiver is gone only while stopping
            let _ = tx.send(res);
        };
        let watcher: Box<dyn Watcher + Send> = match self.backend {
            WatchBackend::Native => {
                Box::new(RecommendedWatcher::new(handler, notify::Config::default())?)
            }
            WatchBackend::Polling => Box::new(PollWatcher::new(
                handler,
                notify::Config::default().with_poll_interval(self.poll_interval),
            )?),
        };
        Ok(watcher)
    }
}

/// Check that `root` exists, is a directory and can be listed.
pub fn validate_root(root: &Path) -> Result<()> {
    let meta = match std::fs::metadata(root) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WatchError::RootMissing(root.to_path_buf()))
        }
        Err(e) => {
            return Err(WatchError::RootUnreadable {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };
    if !meta.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|e| WatchError::RootUnreadable {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// State shared between the adapter and its forwarding task.
#[derive(Clone)]
struct ForwardContext {
    root: PathBuf,
    filter: Arc<EventFilter>,
    watcher: SharedWatcher,
    watched: Arc<Mutex<HashSet<PathBuf>>>,
    /// Accepted files currently known to exist under the root.
    files: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ForwardContext {
    fn watch_dir(&self, dir: &Path) -> Result<bool> {
        if self.watched.lock().contains(dir) {
            return Ok(false);
        }
        let mut guard = self.watcher.lock();
        let Some(watcher) = guard.as_mut() else {
            return Ok(false);
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        self.watched.lock().insert(dir.to_path_buf());
        Ok(true)
    }

    /// Directories and files below `dir`, skipping excluded subtrees.
    fn scan(&self, dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.filter.is_excluded(&self.root, e.path()));
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => dirs.push(entry.into_path()),
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "skipping unreadable entry"),
            }
        }
        (dirs, files)
    }

    /// Watch a directory that appeared after start, retrying transient
    /// failures. Returns files already inside it.
    async fn register_new_tree(&self, dir: &Path) -> Vec<PathBuf> {
        if self.filter.is_excluded(&self.root, dir) {
            return Vec::new();
        }
        let (dirs, files) = self.scan(dir);
        for d in dirs {
            let mut attempt = 0;
            loop {
                match self.watch_dir(&d) {
                    Ok(_) => break,
                    Err(e) if attempt + 1 < WATCH_RETRIES => {
                        attempt += 1;
                        debug!(path = %d.display(), error = %e, attempt, "retrying watch");
                        tokio::time::sleep(WATCH_RETRY_BASE * 2u32.pow(attempt)).await;
                    }
                    Err(e) => {
                        warn!(path = %d.display(), error = %e, "giving up on directory watch");
                        break;
                    }
                }
            }
        }
        files
    }

    /// Forget a removed or moved-out directory and everything below it.
    ///
    /// Returns `None` when `dir` was not a watched directory, otherwise the
    /// known files that disappeared with it.
    fn unregister_tree(&self, dir: &Path) -> Option<Vec<PathBuf>> {
        let removed: Vec<PathBuf> = {
            let mut watched = self.watched.lock();
            let gone: Vec<PathBuf> = watched
                .iter()
                .filter(|p| p.starts_with(dir))
                .cloned()
                .collect();
            for p in &gone {
                watched.remove(p);
            }
            gone
        };
        if let Some(watcher) = self.watcher.lock().as_mut() {
            for p in &removed {
                // The kernel usually dropped the watch already
                let _ = watcher.unwatch(p);
            }
        }
        if removed.is_empty() {
            return None;
        }

        let mut files = self.files.lock();
        let mut gone: Vec<PathBuf> = files.iter().filter(|p| p.starts_with(dir)).cloned().collect();
        for p in &gone {
            files.remove(p);
        }
        gone.sort();
        Some(gone)
    }

    fn track(&self, raw: &RawEvent) {
        let mut files = self.files.lock();
        match raw {
            RawEvent::Created(p) | RawEvent::Modified(p) => {
                files.insert(p.clone());
            }
            RawEvent::Removed(p) => {
                files.remove(p);
            }
            RawEvent::Renamed { from, to } => {
                files.remove(from);
                files.insert(to.clone());
            }
        }
    }

    fn filtered(&self, raw: RawEvent) -> Option<RawEvent> {
        match raw {
            RawEvent::Renamed { from, to } => {
                let keep_from = self.filter.accepts_file(&self.root, &from);
                let keep_to = self.filter.accepts_file(&self.root, &to);
                match (keep_from, keep_to) {
                    (true, true) => Some(RawEvent::Renamed { from, to }),
                    (false, true) => Some(RawEvent::Created(to)),
                    (true, false) => Some(RawEvent::Removed(from)),
                    (false, false) => None,
                }
            }
            other => {
                if self.filter.accepts_file(&self.root, other.path()) {
                    Some(other)
                } else {
                    None
                }
            }
        }
    }

    async fn translate(&self, event: Event) -> Vec<RawEvent> {
        let mut out = Vec::new();
        match event.kind {
            EventKind::Create(_) => {
                for path in event.paths {
                    if path.is_dir() {
                        out.extend(
                            self.register_new_tree(&path)
                                .await
                                .into_iter()
                                .map(RawEvent::Created),
                        );
                    } else {
                        out.push(RawEvent::Created(path));
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                let from = event.paths[0].clone();
                let to = event.paths[1].clone();
                if to.is_dir() {
                    self.unregister_tree(&from);
                    for file in self.register_new_tree(&to).await {
                        if let Ok(rel) = file.strip_prefix(&to) {
                            out.push(RawEvent::Renamed {
                                from: from.join(rel),
                                to: file,
                            });
                        }
                    }
                } else {
                    out.push(RawEvent::Renamed { from, to });
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => {
                for path in event.paths {
                    let appeared = match mode {
                        RenameMode::From => false,
                        RenameMode::To => true,
                        _ => path.exists(),
                    };
                    if appeared {
                        if path.is_dir() {
                            out.extend(
                                self.register_new_tree(&path)
                                    .await
                                    .into_iter()
                                    .map(RawEvent::Created),
                            );
                        } else {
                            out.push(RawEvent::Created(path));
                        }
                    } else {
                        match self.unregister_tree(&path) {
                            Some(files) => out.extend(files.into_iter().map(RawEvent::Removed)),
                            None => out.push(RawEvent::Removed(path)),
                        }
                    }
                }
            }
            EventKind::Modify(_) => {
                for path in event.paths {
                    if !path.is_dir() {
                        out.push(RawEvent::Modified(path));
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    match self.unregister_tree(&path) {
                        Some(files) => out.extend(files.into_iter().map(RawEvent::Removed)),
                        None => out.push(RawEvent::Removed(path)),
                    }
                }
            }
            _ => {}
        }
        let out: Vec<RawEvent> = out.into_iter().filter_map(|raw| self.filtered(raw)).collect();
        for raw in &out {
            self.track(raw);
        }
        out
    }
}

async fn forward_events(
    ctx: ForwardContext,
    mut notify_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    out_tx: mpsc::UnboundedSender<RawEvent>,
) {
    while let Some(result) = notify_rx.recv().await {
        match result {
            Ok(event) => {
                for raw in ctx.translate(event).await {
                    if out_tx.send(raw).is_err() {
                        debug!("raw event receiver dropped, forwarder exiting");
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, root = %ctx.root.display(), "notify error"),
        }
    }
    debug!(root = %ctx.root.display(), "notify channel closed");
}

#[async_trait]
impl WatchAdapter for NotifyWatcher {
    fn backend_type(&self) -> &'static str {
        match self.backend {
            WatchBackend::Native => "notify",
            WatchBackend::Polling => "poll",
        }
    }

    async fn start(
        &mut self,
        root: &Path,
        filter: EventFilter,
    ) -> Result<mpsc::UnboundedReceiver<RawEvent>> {
        if let Some(active) = &self.active {
            return Err(WatchError::AlreadyWatching(active.root.clone()));
        }
        validate_root(root)?;

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let watcher = self.build_watcher(notify_tx)?;

        let ctx = ForwardContext {
            root: root.to_path_buf(),
            filter: Arc::new(filter),
            watcher: Arc::new(Mutex::new(Some(watcher))),
            watched: Arc::new(Mutex::new(HashSet::new())),
            files: Arc::new(Mutex::new(HashSet::new())),
        };

        // The root itself must be watchable; subdirectories are best effort
        ctx.watch_dir(root)?;
        let (dirs, files) = ctx.scan(root);
        for dir in dirs.iter().filter(|d| d.as_path() != root) {
            if let Err(e) = ctx.watch_dir(dir) {
                warn!(path = %dir.display(), error = %e, "failed to watch directory");
            }
        }
        ctx.files.lock().extend(
            files
                .into_iter()
                .filter(|f| ctx.filter.accepts_file(root, f)),
        );

        let watched = ctx.watched.lock().len();
        info!(
            root = %root.display(),
            backend = self.backend_type(),
            directories = watched,
            "watch started"
        );

        let forwarder = tokio::spawn(forward_events(ctx.clone(), notify_rx, out_tx));
        self.active = Some(ActiveWatch {
            root: ctx.root,
            watcher: ctx.watcher,
            watched: ctx.watched,
            forwarder,
        });
        Ok(out_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        let dirs: Vec<PathBuf> = active.watched.lock().drain().collect();
        if let Some(mut watcher) = active.watcher.lock().take() {
            for dir in &dirs {
                let _ = watcher.unwatch(dir);
            }
            // Dropping the watcher closes the notify channel
            drop(watcher);
        }

        let mut forwarder = active.forwarder;
        if tokio::time::timeout(FORWARDER_JOIN_TIMEOUT, &mut forwarder)
            .await
            .is_err()
        {
            warn!(root = %active.root.display(), "forwarder did not finish, aborting");
            forwarder.abort();
        }

        info!(root = %active.root.display(), released = dirs.len(), "watch stopped");
        Ok(())
    }

    fn watched_directories(&self) -> usize {
        self.active
            .as_ref()
            .map(|a| a.watched.lock().len())
            .unwrap_or(0)
    }
}

impl Drop for NotifyWatcher {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.watcher.lock().take();
            active.forwarder.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn filter() -> EventFilter {
        EventFilter::new(vec![".py".into()], &["node_modules".to_string()]).unwrap()
    }

    #[tokio::test]
    async fn missing_root_fails_fast() {
        let temp = TempDir::new().unwrap();
        let mut watcher = NotifyWatcher::native();
        let err = watcher
            .start(&temp.path().join("absent"), filter())
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::RootMissing(_)));
        assert_eq!(watcher.watched_directories(), 0);
    }

    #[tokio::test]
    async fn file_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.py");
        fs::write(&file, "x").unwrap();
        let mut watcher = NotifyWatcher::native();
        let err = watcher.start(&file, filter()).await.unwrap_err();
        assert!(matches!(err, WatchError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn excluded_directories_are_not_watched() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/pkg")).unwrap();
        fs::create_dir_all(temp.path().join("node_modules/dep/lib")).unwrap();

        let mut watcher = NotifyWatcher::native();
        let _rx = watcher.start(temp.path(), filter()).await.unwrap();
        // root, src, src/pkg
        assert_eq!(watcher.watched_directories(), 3);

        watcher.stop().await.unwrap();
        assert_eq!(watcher.watched_directories(), 0);
    }

    #[tokio::test]
    async fn second_start_is_rejected_until_stopped() {
        let temp = TempDir::new().unwrap();
        let mut watcher = NotifyWatcher::native();
        let _rx = watcher.start(temp.path(), filter()).await.unwrap();
        assert!(matches!(
            watcher.start(temp.path(), filter()).await,
            Err(WatchError::AlreadyWatching(_))
        ));
        watcher.stop().await.unwrap();
        let _rx = watcher.start(temp.path(), filter()).await.unwrap();
        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_closes_the_event_channel() {
        let temp = TempDir::new().unwrap();
        let mut watcher = NotifyWatcher::native();
        let mut rx = watcher.start(temp.path(), filter()).await.unwrap();
        watcher.stop().await.unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(3), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}
