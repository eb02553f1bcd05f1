//! Per-project monitor worker
//!
//! ```text
//! WatchAdapter ──RawEvent──▶ normalizer task ──FileEvent──▶ apply task
//!                                                           ├─ AssociationStore
//!                                                           └─ AccessHistoryLog
//! ```
//!
//! Graceful stop closes the adapter first. Its channel closing makes the
//! normalizer flush pending events, which closes the apply channel, which
//! ends the apply task. If that chain does not finish within the stop
//! timeout the tasks are cancelled and aborted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracline_config::MonitorConfig;
use tracline_core::{CoreError, FileEvent, Result};
use tracline_watch::{
    spawn_normalizer, Blake3Fingerprinter, EventCoalescer, EventFilter, WatchAdapter,
};

use crate::history::AccessHistoryLog;
use crate::repositories::Repositories;
use crate::retry::RetryPolicy;
use crate::store::AssociationStore;

/// Buffer between the normalizer and the apply task.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What to watch.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub project_id: String,
    pub root: PathBuf,
    /// Normalised extensions; empty accepts everything.
    pub extensions: Vec<String>,
}

/// Counters reported when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub applied: u64,
    /// Events the store could not apply after retries.
    pub dropped: u64,
    pub logged: u64,
}

/// Result of [`MonitorWorker::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// False when the stop timeout elapsed and the tasks were aborted.
    pub graceful: bool,
    pub stats: PipelineStats,
}

/// A running watch/normalize/apply pipeline for one project.
pub struct MonitorWorker {
    spec: WorkerSpec,
    adapter: Mutex<Box<dyn WatchAdapter>>,
    store: Arc<AssociationStore>,
    normalizer: JoinHandle<()>,
    apply: JoinHandle<PipelineStats>,
    cancel: CancellationToken,
}

impl MonitorWorker {
    /// Start watching. Returns once the adapter has registered the root.
    ///
    /// Fails without side effects when the root is unusable or the filter
    /// is invalid.
    pub async fn start(
        spec: WorkerSpec,
        mut adapter: Box<dyn WatchAdapter>,
        repos: &Repositories,
        config: &MonitorConfig,
    ) -> Result<Self> {
        let filter = EventFilter::new(spec.extensions.clone(), &config.excluded_dirs)?;
        let retry = RetryPolicy::from(config);

        let raw_rx = adapter.start(&spec.root, filter.clone()).await?;

        let store = match AssociationStore::load(spec.project_id.clone(), repos.associations.clone()).await {
            Ok(store) => Arc::new(store.with_retry(retry)),
            Err(err) => {
                let _ = adapter.stop().await;
                return Err(err);
            }
        };
        let log = AccessHistoryLog::new(spec.project_id.clone(), repos.access_log.clone())
            .with_retry(retry);

        let mut coalescer = EventCoalescer::new(
            config.debounce(),
            config.rename_detection,
            Arc::new(Blake3Fingerprinter),
        );
        let prime_root = spec.root.clone();
        let coalescer = match tokio::task::spawn_blocking(move || {
            coalescer.prime(&prime_root, &filter);
            coalescer
        })
        .await
        {
            Ok(coalescer) => coalescer,
            Err(err) => {
                let _ = adapter.stop().await;
                return Err(CoreError::Watch(format!("failed to prime fingerprints: {}", err)));
            }
        };

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let normalizer = spawn_normalizer(coalescer, raw_rx, event_tx);

        let cancel = CancellationToken::new();
        let apply = tokio::spawn(apply_events(
            spec.project_id.clone(),
            store.clone(),
            log,
            event_rx,
            cancel.child_token(),
        ));

        info!(
            project = %spec.project_id,
            root = %spec.root.display(),
            backend = adapter.backend_type(),
            directories = adapter.watched_directories(),
            extensions = ?spec.extensions,
            "Monitor worker started"
        );

        Ok(Self {
            spec,
            adapter: Mutex::new(adapter),
            store,
            normalizer,
            apply,
            cancel,
        })
    }

    /// The live association store this worker writes through.
    pub fn store(&self) -> Arc<AssociationStore> {
        self.store.clone()
    }

    /// True once the apply task has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.apply.is_finished()
    }

    /// Release the watch, flush pending events and wait for the apply task,
    /// aborting after `timeout`. No event is applied after this returns.
    pub async fn stop(mut self, timeout: Duration) -> StopReport {
        if let Err(err) = self.adapter.get_mut().stop().await {
            warn!(project = %self.spec.project_id, error = %err, "Failed to stop watch adapter");
        }

        let normalizer = &mut self.normalizer;
        let apply = &mut self.apply;
        let drained = tokio::time::timeout(timeout, async move {
            if let Err(err) = normalizer.await {
                debug!(error = %err, "Normalizer task ended abnormally");
            }
            apply.await
        })
        .await;

        let report = match drained {
            Ok(Ok(stats)) => StopReport { graceful: true, stats },
            Ok(Err(err)) => {
                warn!(project = %self.spec.project_id, error = %err, "Apply task ended abnormally");
                StopReport {
                    graceful: false,
                    stats: PipelineStats::default(),
                }
            }
            Err(_) => {
                warn!(
                    project = %self.spec.project_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Monitor did not drain in time, aborting"
                );
                self.cancel.cancel();
                self.normalizer.abort();
                self.apply.abort();
                let stats = (&mut self.apply).await.unwrap_or_default();
                StopReport { graceful: false, stats }
            }
        };

        info!(
            project = %self.spec.project_id,
            graceful = report.graceful,
            applied = report.stats.applied,
            dropped = report.stats.dropped,
            "Monitor worker stopped"
        );
        report
    }
}

impl Drop for MonitorWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.normalizer.abort();
        self.apply.abort();
    }
}

/// Apply each normalized event to the store, then record it in the log.
///
/// Store failures that survive the retry policy drop the event from the
/// association update but it is still logged; the worker keeps running.
async fn apply_events(
    project_id: String,
    store: Arc<AssociationStore>,
    log: AccessHistoryLog,
    mut events: mpsc::Receiver<FileEvent>,
    cancel: CancellationToken,
) -> PipelineStats {
    let mut stats = PipelineStats::default();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(project = %project_id, "Apply task cancelled");
                break;
            }
            next = events.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };
        stats.received += 1;

        let correlated_task = match store.apply_event(&event).await {
            Ok(outcome) => {
                stats.applied += 1;
                outcome.correlated_task
            }
            Err(err) => {
                stats.dropped += 1;
                warn!(
                    project = %project_id,
                    action = %event.action,
                    path = %event.path.display(),
                    error = %err,
                    "Dropping association update"
                );
                None
            }
        };

        match log.append(&event, correlated_task).await {
            Ok(sequence) => {
                stats.logged += 1;
                debug!(
                    project = %project_id,
                    sequence,
                    action = %event.action,
                    path = %event.path.display(),
                    "Recorded file event"
                );
            }
            Err(err) => warn!(
                project = %project_id,
                action = %event.action,
                path = %event.path.display(),
                error = %err,
                "Failed to record file event"
            ),
        }
    }

    stats
}
