//! Daemon supervisor
//!
//! Owns the per-project lifecycle:
//!
//! ```text
//! STOPPED ──start──▶ STARTING ──adapter ready──▶ RUNNING ──stop──▶ STOPPED
//!    ▲                                              │
//!    └──────────── start ◀── CRASHED ◀── dead PID ──┘
//! ```
//!
//! Mutual exclusion comes from the stored [`DaemonRecord`]: a start claims the
//! record with a compare-and-swap, so two processes racing for the same
//! project cannot both win. A record that claims `starting` or `running` for
//! a dead PID is rewritten to `crashed` whenever it is read.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracline_config::{normalize_extensions, MonitorConfig};
use tracline_core::{
    resolve_path, AccessLogEntry, CoreError, DaemonRecord, DaemonState, HistoryQuery, Result,
    WatchedProject,
};
use tracline_watch::{create_adapter, validate_root, WatchAdapter};

use crate::history::AccessHistoryLog;
use crate::process::{ProcessProbe, SystemProbe};
use crate::repositories::Repositories;
use crate::store::AssociationStore;
use crate::worker::{MonitorWorker, StopReport, WorkerSpec};

/// Builds the watch backend for each new worker.
pub type AdapterFactory = Arc<dyn Fn(&MonitorConfig) -> Box<dyn WatchAdapter> + Send + Sync>;

/// Parameters for [`Supervisor::start`].
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub project_id: String,
    pub root: PathBuf,
    /// `None` falls back to the stored settings, then to the configured
    /// defaults. `Some(vec![])` watches every extension.
    pub extensions: Option<Vec<String>>,
}

/// Result of [`Supervisor::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// A worker in this process was stopped.
    Stopped(StopReport),
    /// The record pointed at a dead or stale process and was reset.
    Reclaimed,
    /// Another live process owns the monitor; it must be signalled.
    Remote { pid: u32 },
}

/// One row of `monitor status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStatus {
    pub record: DaemonRecord,
    pub settings: Option<WatchedProject>,
}

/// Runs and tracks monitor workers.
pub struct Supervisor {
    repos: Repositories,
    config: MonitorConfig,
    workers: DashMap<String, MonitorWorker>,
    pid: u32,
    probe: Arc<dyn ProcessProbe>,
    adapter_factory: AdapterFactory,
}

impl Supervisor {
    pub fn new(repos: Repositories, config: MonitorConfig) -> Self {
        Self {
            repos,
            config,
            workers: DashMap::new(),
            pid: std::process::id(),
            probe: Arc::new(SystemProbe),
            adapter_factory: Arc::new(create_adapter),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// PID written into records claimed by this supervisor.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_adapter_factory(mut self, factory: AdapterFactory) -> Self {
        self.adapter_factory = factory;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Start monitoring a project in this process.
    ///
    /// Configuration problems fail before anything is written. A live claim
    /// by another worker fails with [`CoreError::AlreadyRunning`].
    pub async fn start(&self, request: StartRequest) -> Result<DaemonRecord> {
        let (project_id, root, extensions) = self.validate(request).await?;

        let current = self.heal(&project_id).await?;
        if let Some(record) = current.as_ref().filter(|r| r.state.is_active()) {
            return Err(CoreError::AlreadyRunning {
                project: project_id,
                pid: record.pid.unwrap_or_default(),
            });
        }

        let claim = DaemonRecord::starting(&project_id, self.pid);
        if !self.repos.daemons.compare_and_swap(current.as_ref(), &claim).await? {
            return Err(self.conflict(&project_id).await);
        }
        debug!(project = %project_id, pid = self.pid, "Claimed daemon record");

        let spec = WorkerSpec {
            project_id: project_id.clone(),
            root: root.clone(),
            extensions: extensions.clone(),
        };
        let adapter = (self.adapter_factory)(&self.config);
        let start_timeout = self.config.start_timeout();
        let started = tokio::time::timeout(
            start_timeout,
            MonitorWorker::start(spec, adapter, &self.repos, &self.config),
        )
        .await;

        let worker = match started {
            Ok(Ok(worker)) => worker,
            Ok(Err(err)) => {
                self.release(&claim).await;
                return Err(err);
            }
            Err(_) => {
                self.release(&claim).await;
                return Err(CoreError::Timeout {
                    operation: format!("starting monitor for '{}'", project_id),
                    after_ms: start_timeout.as_millis() as u64,
                });
            }
        };

        let settings = WatchedProject::new(&project_id, &root, extensions);
        let running = claim.transitioned(DaemonState::Running);
        // Registered before promotion so a concurrent heal sees a live worker.
        self.workers.insert(project_id.clone(), worker);
        let promoted = async {
            self.repos.projects.upsert(&settings).await?;
            Ok::<_, CoreError>(self.repos.daemons.compare_and_swap(Some(&claim), &running).await?)
        }
        .await;

        if !matches!(promoted, Ok(true)) {
            if let Some((_, worker)) = self.workers.remove(&project_id) {
                worker.stop(self.config.stop_timeout()).await;
            }
            return Err(match promoted {
                Err(err) => {
                    self.release(&claim).await;
                    err
                }
                _ => self.conflict(&project_id).await,
            });
        }

        info!(
            project = %project_id,
            root = %root.display(),
            pid = self.pid,
            extensions = %settings.extensions_label(),
            "Monitor running"
        );
        Ok(running)
    }

    /// Validate a start request and store its settings without claiming the
    /// project. A detached monitor then starts from the stored settings.
    pub async fn configure(&self, request: StartRequest) -> Result<WatchedProject> {
        let (project_id, root, extensions) = self.validate(request).await?;
        if let Some(record) = self.heal(&project_id).await?.filter(|r| r.state.is_active()) {
            return Err(CoreError::AlreadyRunning {
                project: project_id,
                pid: record.pid.unwrap_or_default(),
            });
        }

        let mut settings = WatchedProject::new(&project_id, &root, extensions);
        settings.monitor_enabled = false;
        self.repos.projects.upsert(&settings).await?;
        debug!(project = %project_id, root = %root.display(), "Stored monitor settings");
        Ok(settings)
    }

    /// Stop a project's monitor.
    ///
    /// A local worker is drained within the stop timeout and then aborted.
    /// The record ends `stopped` either way.
    pub async fn stop(&self, project_id: &str) -> Result<StopOutcome> {
        if let Some((_, worker)) = self.workers.remove(project_id) {
            let report = worker.stop(self.config.stop_timeout()).await;
            self.finish_stop(project_id).await?;
            return Ok(StopOutcome::Stopped(report));
        }

        match self.heal(project_id).await? {
            Some(record) if record.state.is_active() && record.pid != Some(self.pid) => {
                Ok(StopOutcome::Remote {
                    pid: record.pid.unwrap_or_default(),
                })
            }
            Some(record) if record.state != DaemonState::Stopped => {
                self.finish_stop(project_id).await?;
                Ok(StopOutcome::Reclaimed)
            }
            _ => Err(CoreError::NotRunning(project_id.to_string())),
        }
    }

    /// Mark a project stopped after its owning process was killed.
    pub async fn reclaim(&self, project_id: &str) -> Result<()> {
        self.finish_stop(project_id).await
    }

    /// Current record for `project_id`, reclassifying a dead claim as crashed.
    pub async fn status(&self, project_id: &str) -> Result<Option<DaemonRecord>> {
        self.heal(project_id).await
    }

    /// Every record, healed, joined with its stored settings.
    pub async fn status_all(&self) -> Result<Vec<ProjectStatus>> {
        let records = self.repos.daemons.list().await?;
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            let project_id = record.project_id.clone();
            let Some(record) = self.heal(&project_id).await? else {
                continue;
            };
            let settings = self.repos.projects.get(&project_id).await?;
            statuses.push(ProjectStatus { record, settings });
        }
        Ok(statuses)
    }

    /// Access history, newest first.
    pub async fn history(&self, project_id: &str, query: &HistoryQuery) -> Result<Vec<AccessLogEntry>> {
        AccessHistoryLog::new(project_id, self.repos.access_log.clone())
            .query(query)
            .await
    }

    /// Poll the stored record until `done` accepts it or `timeout` passes.
    pub async fn wait_for<F>(
        &self,
        project_id: &str,
        timeout: Duration,
        poll: Duration,
        done: F,
    ) -> Result<Option<DaemonRecord>>
    where
        F: Fn(Option<&DaemonRecord>) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let record = self.heal(project_id).await?;
            if done(record.as_ref()) {
                return Ok(record);
            }
            if Instant::now() >= deadline {
                return Err(CoreError::Timeout {
                    operation: format!("waiting for monitor '{}'", project_id),
                    after_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Live association store of a worker running in this process.
    pub fn store(&self, project_id: &str) -> Option<Arc<AssociationStore>> {
        self.workers.get(project_id).map(|w| w.store())
    }

    pub fn running_projects(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.iter().map(|w| w.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Stop every local worker.
    pub async fn shutdown(&self) -> Vec<(String, Result<StopOutcome>)> {
        let ids = self.running_projects();
        let stops = ids.iter().map(|id| self.stop(id));
        let results = futures::future::join_all(stops).await;
        ids.into_iter().zip(results).collect()
    }

    async fn validate(&self, request: StartRequest) -> Result<(String, PathBuf, Vec<String>)> {
        let project_id = request.project_id.trim().to_string();
        if project_id.is_empty() {
            return Err(CoreError::invalid_input("project id must not be empty"));
        }
        let root = resolve_root(&request.root)?;
        let extensions = self.resolve_extensions(&project_id, request.extensions).await?;
        Ok((project_id, root, extensions))
    }

    async fn resolve_extensions(
        &self,
        project_id: &str,
        requested: Option<Vec<String>>,
    ) -> Result<Vec<String>> {
        let raw = match requested {
            Some(list) => list,
            None => match self.repos.projects.get(project_id).await? {
                Some(stored) => stored.extensions,
                None => self.config.default_extensions.clone(),
            },
        };
        Ok(normalize_extensions(raw)?)
    }

    fn is_alive(&self, record: &DaemonRecord) -> bool {
        let Some(pid) = record.pid else {
            return false;
        };
        if pid != self.pid {
            return self.probe.is_alive(pid);
        }
        // Our own PID: a running claim needs a live local worker. A starting
        // claim belongs to a start() still in flight.
        match record.state {
            DaemonState::Running => self
                .workers
                .get(&record.project_id)
                .is_some_and(|w| !w.is_finished()),
            _ => true,
        }
    }

    /// Read the record and rewrite a dead active claim to `crashed`.
    async fn heal(&self, project_id: &str) -> Result<Option<DaemonRecord>> {
        let Some(record) = self.repos.daemons.get(project_id).await? else {
            return Ok(None);
        };
        if !record.state.is_active() || self.is_alive(&record) {
            return Ok(Some(record));
        }

        let crashed = record.transitioned(DaemonState::Crashed);
        if self.repos.daemons.compare_and_swap(Some(&record), &crashed).await? {
            warn!(
                project = %project_id,
                pid = ?record.pid,
                previous = %record.state,
                "Monitor process is gone, marking crashed"
            );
            return Ok(Some(crashed));
        }
        Ok(self.repos.daemons.get(project_id).await?)
    }

    async fn finish_stop(&self, project_id: &str) -> Result<()> {
        if let Some(current) = self.repos.daemons.get(project_id).await? {
            if current.state != DaemonState::Stopped {
                let stopped = current.transitioned(DaemonState::Stopped);
                if !self.repos.daemons.compare_and_swap(Some(&current), &stopped).await? {
                    debug!(project = %project_id, "Record changed while stopping, leaving it");
                }
            }
        }
        self.repos.projects.set_monitor_enabled(project_id, false).await?;
        info!(project = %project_id, "Monitor stopped");
        Ok(())
    }

    /// Undo a claim after a failed start.
    async fn release(&self, claim: &DaemonRecord) {
        let stopped = claim.transitioned(DaemonState::Stopped);
        match self.repos.daemons.compare_and_swap(Some(claim), &stopped).await {
            Ok(true) => debug!(project = %claim.project_id, "Released daemon record"),
            Ok(false) => debug!(project = %claim.project_id, "Daemon record already changed"),
            Err(err) => warn!(project = %claim.project_id, error = %err, "Failed to release daemon record"),
        }
    }

    async fn conflict(&self, project_id: &str) -> CoreError {
        match self.repos.daemons.get(project_id).await {
            Ok(Some(record)) if record.state.is_active() => CoreError::AlreadyRunning {
                project: project_id.to_string(),
                pid: record.pid.unwrap_or_default(),
            },
            Ok(_) => CoreError::invalid_input(format!(
                "monitor state for '{}' changed during start, try again",
                project_id
            )),
            Err(err) => err.into(),
        }
    }
}

/// Absolute, symlink-resolved project root that the watcher can read.
fn resolve_root(root: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let resolved = resolve_path(root, &cwd);
    validate_root(&resolved)?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tests::FakeProbe;
    use std::fs;
    use tempfile::TempDir;
    use tracline_core::test_support::InMemoryStore;
    use tracline_core::DaemonRecordRepository;

    const SELF_PID: u32 = 1000;

    fn supervisor(backing: Arc<InMemoryStore>, probe: Arc<FakeProbe>) -> Supervisor {
        let config = MonitorConfig {
            backend: tracline_config::WatchBackend::Polling,
            poll_interval_ms: 50,
            debounce_ms: 50,
            stop_timeout_ms: 2000,
            ..MonitorConfig::default()
        };
        Supervisor::new(Repositories::in_memory(backing), config)
            .with_pid(SELF_PID)
            .with_probe(probe)
    }

    fn request(root: &Path) -> StartRequest {
        StartRequest {
            project_id: "proj".into(),
            root: root.to_path_buf(),
            extensions: Some(vec!["py".into()]),
        }
    }

    #[tokio::test]
    async fn second_start_reports_existing_pid() {
        let dir = TempDir::new().unwrap();
        let backing = Arc::new(InMemoryStore::new());
        let sup = supervisor(backing.clone(), Arc::new(FakeProbe::with_alive(&[SELF_PID])));

        let record = sup.start(request(dir.path())).await.unwrap();
        assert_eq!(record.state, DaemonState::Running);
        assert_eq!(record.pid, Some(SELF_PID));

        match sup.start(request(dir.path())).await {
            Err(CoreError::AlreadyRunning { project, pid }) => {
                assert_eq!(project, "proj");
                assert_eq!(pid, SELF_PID);
            }
            other => panic!("expected AlreadyRunning, got {:?}", other.map(|r| r.state)),
        }

        let stored = tracline_core::ProjectSettingsRepository::get(backing.as_ref(), "proj")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.extensions, vec![".py"]);
        assert!(stored.monitor_enabled);

        assert!(matches!(sup.stop("proj").await.unwrap(), StopOutcome::Stopped(_)));
    }

    #[tokio::test]
    async fn missing_root_leaves_no_record() {
        let dir = TempDir::new().unwrap();
        let backing = Arc::new(InMemoryStore::new());
        let sup = supervisor(backing.clone(), Arc::new(FakeProbe::with_alive(&[SELF_PID])));

        let err = sup.start(request(&dir.path().join("missing"))).await.unwrap_err();
        assert!(matches!(err, CoreError::RootUnavailable { .. }));
        assert!(DaemonRecordRepository::get(backing.as_ref(), "proj").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_extension_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let backing = Arc::new(InMemoryStore::new());
        let sup = supervisor(backing.clone(), Arc::new(FakeProbe::with_alive(&[SELF_PID])));

        let mut req = request(dir.path());
        req.extensions = Some(vec!["*.py".into()]);
        assert!(matches!(sup.start(req).await, Err(CoreError::Config(_))));
        assert!(DaemonRecordRepository::get(backing.as_ref(), "proj").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dead_pid_is_reported_crashed_and_restartable() {
        let dir = TempDir::new().unwrap();
        let backing = Arc::new(InMemoryStore::new());
        let probe = Arc::new(FakeProbe::with_alive(&[4242]));
        let stale = DaemonRecord::starting("proj", 4242).transitioned(DaemonState::Running);
        DaemonRecordRepository::put(backing.as_ref(), &stale).await.unwrap();

        let sup = supervisor(backing.clone(), probe.clone());
        assert!(matches!(
            sup.start(request(dir.path())).await,
            Err(CoreError::AlreadyRunning { pid: 4242, .. })
        ));

        probe.kill(4242);
        let status = sup.status("proj").await.unwrap().unwrap();
        assert_eq!(status.state, DaemonState::Crashed);
        assert_eq!(
            DaemonRecordRepository::get(backing.as_ref(), "proj")
                .await
                .unwrap()
                .unwrap()
                .state,
            DaemonState::Crashed
        );

        let record = sup.start(request(dir.path())).await.unwrap();
        assert_eq!(record.state, DaemonState::Running);
        sup.stop("proj").await.unwrap();
    }

    #[tokio::test]
    async fn stop_of_foreign_live_monitor_asks_for_signal() {
        let backing = Arc::new(InMemoryStore::new());
        let foreign = DaemonRecord::starting("proj", 777).transitioned(DaemonState::Running);
        DaemonRecordRepository::put(backing.as_ref(), &foreign).await.unwrap();
        let sup = supervisor(backing.clone(), Arc::new(FakeProbe::with_alive(&[777])));

        assert_eq!(sup.stop("proj").await.unwrap(), StopOutcome::Remote { pid: 777 });

        sup.reclaim("proj").await.unwrap();
        let record = sup.status("proj").await.unwrap().unwrap();
        assert_eq!(record.state, DaemonState::Stopped);
        assert_eq!(record.pid, None);
        assert!(matches!(sup.stop("proj").await, Err(CoreError::NotRunning(_))));
    }

    #[tokio::test]
    async fn configure_stores_settings_without_claiming() {
        let dir = TempDir::new().unwrap();
        let backing = Arc::new(InMemoryStore::new());
        let sup = supervisor(backing.clone(), Arc::new(FakeProbe::with_alive(&[SELF_PID])));

        let mut req = request(dir.path());
        req.extensions = Some(vec!["MD".into(), ".md".into()]);
        let settings = sup.configure(req).await.unwrap();
        assert_eq!(settings.extensions, vec![".md"]);
        assert!(!settings.monitor_enabled);
        assert!(DaemonRecordRepository::get(backing.as_ref(), "proj").await.unwrap().is_none());

        let mut from_settings = request(&settings.root);
        from_settings.extensions = None;
        sup.start(from_settings).await.unwrap();
        assert!(matches!(
            sup.configure(request(dir.path())).await,
            Err(CoreError::AlreadyRunning { .. })
        ));
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn stored_extensions_are_reused() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "x").unwrap();
        let backing = Arc::new(InMemoryStore::new());
        let sup = supervisor(backing.clone(), Arc::new(FakeProbe::with_alive(&[SELF_PID])));

        let mut first = request(dir.path());
        first.extensions = Some(vec![".md".into()]);
        sup.start(first).await.unwrap();
        sup.stop("proj").await.unwrap();

        let mut again = request(dir.path());
        again.extensions = None;
        sup.start(again).await.unwrap();
        let stored = tracline_core::ProjectSettingsRepository::get(backing.as_ref(), "proj")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.extensions, vec![".md"]);

        let statuses = sup.status_all().await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].record.state, DaemonState::Running);
        sup.shutdown().await;
        assert!(sup.running_projects().is_empty());
    }
}
