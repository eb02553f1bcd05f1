//! Mock repositories.
//!
//! [`InMemoryStore`] implements every repository trait over plain maps. It is
//! deterministic, keeps call counters for assertions and can inject transient
//! write failures to exercise retry paths.
//!
//! ```rust,ignore
//! use tracline_core::test_support::InMemoryStore;
//! use tracline_core::TaskDirectory;
//!
//! # async fn example() {
//! let store = InMemoryStore::new();
//! store.add_task("T1", "proj", "Write parser", "todo");
//! assert!(store.task_exists("T1").await.unwrap());
//! # }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    AccessLogRepository, AssociationRepository, DaemonRecordRepository,
    ProjectSettingsRepository, TaskDirectory,
};
use crate::types::{
    AccessLogEntry, AssociationChanges, DaemonRecord, FileAction, FileAssociation, HistoryQuery,
    NewAccessLogEntry, TaskFilter, TaskSummary, WatchedProject,
};

type AssociationKey = (String, PathBuf, String);

/// In-memory repository set.
#[derive(Default)]
pub struct InMemoryStore {
    associations: Mutex<BTreeMap<AssociationKey, FileAssociation>>,
    log: Mutex<Vec<AccessLogEntry>>,
    daemons: Mutex<HashMap<String, DaemonRecord>>,
    projects: Mutex<HashMap<String, WatchedProject>>,
    tasks: Mutex<BTreeMap<String, TaskSummary>>,
    fail_writes: AtomicU32,
    write_calls: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&self, id: &str, project_id: &str, title: &str, status: &str) {
        self.insert_task(TaskSummary {
            id: id.to_string(),
            project_id: project_id.to_string(),
            title: title.to_string(),
            status: status.to_string(),
            assignee: None,
            priority: None,
        });
    }

    pub fn insert_task(&self, task: TaskSummary) {
        self.tasks.lock().insert(task.id.clone(), task);
    }

    /// Fail the next `count` association or log writes with a retryable error.
    pub fn fail_next_writes(&self, count: u32) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Number of write calls seen, including failed ones.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Raw rows for a project, sorted by path then task.
    pub fn rows(&self, project_id: &str) -> Vec<FileAssociation> {
        self.associations
            .lock()
            .iter()
            .filter(|((p, _, _), _)| p == project_id)
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn log_entries(&self, project_id: &str) -> Vec<AccessLogEntry> {
        self.log
            .lock()
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect()
    }

    fn check_write(&self) -> StorageResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Busy("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AssociationRepository for InMemoryStore {
    async fn load_project(&self, project_id: &str) -> StorageResult<Vec<FileAssociation>> {
        Ok(self.rows(project_id))
    }

    async fn load_paths(
        &self,
        project_id: &str,
        paths: &[PathBuf],
    ) -> StorageResult<Vec<FileAssociation>> {
        Ok(self
            .rows(project_id)
            .into_iter()
            .filter(|row| paths.contains(&row.file_path))
            .collect())
    }

    async fn apply_changes(&self, project_id: &str, changes: &AssociationChanges) -> StorageResult<()> {
        self.check_write()?;
        let mut rows = self.associations.lock();
        for (path, task) in &changes.removed {
            rows.remove(&(project_id.to_string(), path.clone(), task.clone()));
        }
        for row in &changes.upserts {
            rows.insert(
                (
                    project_id.to_string(),
                    row.file_path.clone(),
                    row.task_id.clone(),
                ),
                row.clone(),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl AccessLogRepository for InMemoryStore {
    async fn append(&self, entry: &NewAccessLogEntry) -> StorageResult<i64> {
        self.check_write()?;
        let mut log = self.log.lock();
        let sequence = log.len() as i64 + 1;
        log.push(AccessLogEntry::from_new(sequence, entry.clone()));
        Ok(sequence)
    }

    async fn query(&self, project_id: &str, query: &HistoryQuery) -> StorageResult<Vec<AccessLogEntry>> {
        let mut entries: Vec<AccessLogEntry> = self
            .log_entries(project_id)
            .into_iter()
            .filter(|e| query.action.map_or(true, |a| a == e.action))
            .collect();
        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });
        Ok(entries
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn count(&self, project_id: &str, action: Option<FileAction>) -> StorageResult<u64> {
        Ok(self
            .log_entries(project_id)
            .iter()
            .filter(|e| action.map_or(true, |a| a == e.action))
            .count() as u64)
    }
}

#[async_trait]
impl DaemonRecordRepository for InMemoryStore {
    async fn get(&self, project_id: &str) -> StorageResult<Option<DaemonRecord>> {
        Ok(self.daemons.lock().get(project_id).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<DaemonRecord>> {
        let mut records: Vec<DaemonRecord> = self.daemons.lock().values().cloned().collect();
        records.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        Ok(records)
    }

    async fn compare_and_swap(
        &self,
        expected: Option<&DaemonRecord>,
        next: &DaemonRecord,
    ) -> StorageResult<bool> {
        let mut records = self.daemons.lock();
        let matches = match (records.get(&next.project_id), expected) {
            (None, None) => true,
            (Some(current), Some(expected)) => current.same_claim(expected),
            _ => false,
        };
        if matches {
            records.insert(next.project_id.clone(), next.clone());
        }
        Ok(matches)
    }

    async fn put(&self, record: &DaemonRecord) -> StorageResult<()> {
        self.daemons
            .lock()
            .insert(record.project_id.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl ProjectSettingsRepository for InMemoryStore {
    async fn get(&self, project_id: &str) -> StorageResult<Option<WatchedProject>> {
        Ok(self.projects.lock().get(project_id).cloned())
    }

    async fn upsert(&self, project: &WatchedProject) -> StorageResult<()> {
        self.projects
            .lock()
            .insert(project.project_id.clone(), project.clone());
        Ok(())
    }

    async fn set_monitor_enabled(&self, project_id: &str, enabled: bool) -> StorageResult<bool> {
        match self.projects.lock().get_mut(project_id) {
            Some(project) => {
                project.monitor_enabled = enabled;
                project.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self) -> StorageResult<Vec<WatchedProject>> {
        let mut projects: Vec<WatchedProject> = self.projects.lock().values().cloned().collect();
        projects.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        Ok(projects)
    }
}

#[async_trait]
impl TaskDirectory for InMemoryStore {
    async fn get_task(&self, task_id: &str) -> StorageResult<Option<TaskSummary>> {
        Ok(self.tasks.lock().get(task_id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StorageResult<Vec<TaskSummary>> {
        Ok(self
            .tasks
            .lock()
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DaemonState, FileEvent};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn history_orders_newest_first_with_sequence_tiebreak() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let first = FileEvent::modified("/p/a.py").with_timestamp(now);
        let second = FileEvent::modified("/p/b.py").with_timestamp(now);
        let older = FileEvent::created("/p/c.py").with_timestamp(now - Duration::seconds(5));

        for event in [&first, &second, &older] {
            store
                .append(&NewAccessLogEntry::from_event("p", event, None))
                .await
                .unwrap();
        }

        let entries = store.query("p", &HistoryQuery::new(10, 0)).await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.file_path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/p/b.py"),
                PathBuf::from("/p/a.py"),
                PathBuf::from("/p/c.py")
            ]
        );

        let created = store
            .query("p", &HistoryQuery::new(10, 0).with_action(FileAction::Created))
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
    }

    #[tokio::test]
    async fn compare_and_swap_checks_state_and_pid() {
        let store = InMemoryStore::new();
        let starting = DaemonRecord::starting("p", 1);
        assert!(store.compare_and_swap(None, &starting).await.unwrap());
        assert!(!store.compare_and_swap(None, &starting).await.unwrap());

        let running = starting.transitioned(DaemonState::Running);
        assert!(store
            .compare_and_swap(Some(&starting), &running)
            .await
            .unwrap());

        let other_pid = DaemonRecord::starting("p", 2).transitioned(DaemonState::Running);
        let crashed = other_pid.transitioned(DaemonState::Crashed);
        assert!(!store
            .compare_and_swap(Some(&other_pid), &crashed)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn injected_failures_are_retryable() {
        let store = InMemoryStore::new();
        store.fail_next_writes(1);
        let err = store
            .apply_changes("p", &AssociationChanges::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store
            .apply_changes("p", &AssociationChanges::default())
            .await
            .is_ok());
        assert_eq!(store.write_calls(), 2);
    }
}
