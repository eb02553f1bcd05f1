//! Association store
//!
//! Per-project, reference-counted file/task map. Writes are serialized by an
//! async gate and persisted through [`AssociationRepository::apply_changes`]
//! before the in-memory index changes, so the index never runs ahead of the
//! database. Reads take a short shared lock on the index and return owned
//! snapshots; they never wait on storage I/O.
//!
//! Each write first reloads the rows for the paths it touches. Another
//! process (a `trace add-file` while the monitor runs) may have written them.
//!
//! Rename merge policy: every row under the old path moves to the new path.
//! When a task is present at both, the merged row is active if either was,
//! keeps the earlier `first_associated_at` and the larger confirmation count.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use tracline_core::{
    AssociationChanges, AssociationRepository, FileAction, FileAssociation, FileEvent, Result,
};

use crate::retry::{with_retry, RetryPolicy};

/// Result of [`AssociationStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Reactivated,
    AlreadyActive,
}

/// Result of [`AssociationStore::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Deactivated,
    AlreadyInactive,
    NotAssociated,
}

/// What applying one [`FileEvent`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// Set when exactly one active association covered the event.
    pub correlated_task: Option<String>,
    pub rows_changed: usize,
}

#[derive(Default)]
struct AssociationIndex {
    by_path: HashMap<PathBuf, BTreeMap<String, FileAssociation>>,
    /// Active rows only.
    by_task: HashMap<String, BTreeSet<PathBuf>>,
    /// Active rows only. A path is absent rather than zero.
    active_counts: HashMap<PathBuf, usize>,
}

impl AssociationIndex {
    fn from_rows(rows: Vec<FileAssociation>) -> Self {
        let mut index = Self::default();
        for row in rows {
            index.put(row);
        }
        index
    }

    fn row(&self, path: &Path, task_id: &str) -> Option<&FileAssociation> {
        self.by_path.get(path).and_then(|rows| rows.get(task_id))
    }

    fn rows_at(&self, path: &Path) -> impl Iterator<Item = &FileAssociation> {
        self.by_path.get(path).into_iter().flat_map(|rows| rows.values())
    }

    fn active_at(&self, path: &Path) -> impl Iterator<Item = &FileAssociation> {
        self.rows_at(path).filter(|row| row.active)
    }

    fn put(&mut self, row: FileAssociation) {
        let path = row.file_path.clone();
        let task_id = row.task_id.clone();
        let now_active = row.active;
        let was_active = self
            .by_path
            .entry(path.clone())
            .or_default()
            .insert(task_id.clone(), row)
            .is_some_and(|old| old.active);
        self.adjust(&path, &task_id, was_active, now_active);
    }

    fn remove(&mut self, path: &Path, task_id: &str) {
        let mut was_active = false;
        let mut emptied = false;
        if let Some(rows) = self.by_path.get_mut(path) {
            if let Some(old) = rows.remove(task_id) {
                was_active = old.active;
            }
            emptied = rows.is_empty();
        }
        if emptied {
            self.by_path.remove(path);
        }
        self.adjust(path, task_id, was_active, false);
    }

    fn adjust(&mut self, path: &Path, task_id: &str, was_active: bool, now_active: bool) {
        match (was_active, now_active) {
            (false, true) => {
                *self.active_counts.entry(path.to_path_buf()).or_insert(0) += 1;
                self.by_task
                    .entry(task_id.to_string())
                    .or_default()
                    .insert(path.to_path_buf());
            }
            (true, false) => {
                if let Some(count) = self.active_counts.get_mut(path) {
                    *count -= 1;
                    if *count == 0 {
                        self.active_counts.remove(path);
                    }
                }
                if let Some(files) = self.by_task.get_mut(task_id) {
                    files.remove(path);
                    if files.is_empty() {
                        self.by_task.remove(task_id);
                    }
                }
            }
            _ => {}
        }
    }

    /// Swap the rows for `paths` with freshly loaded ones.
    fn refresh(&mut self, paths: &[PathBuf], fresh: Vec<FileAssociation>) {
        for path in paths {
            let tasks: Vec<String> = self.rows_at(path).map(|r| r.task_id.clone()).collect();
            for task_id in tasks {
                self.remove(path, &task_id);
            }
        }
        for row in fresh {
            self.put(row);
        }
    }

    fn apply(&mut self, changes: &AssociationChanges) {
        for (path, task_id) in &changes.removed {
            self.remove(path, task_id);
        }
        for row in &changes.upserts {
            self.put(row.clone());
        }
    }

    fn single_active_task(&self, path: &Path) -> Option<String> {
        let mut active = self.active_at(path);
        match (active.next(), active.next()) {
            (Some(only), None) => Some(only.task_id.clone()),
            _ => None,
        }
    }
}

/// Reference-counted file/task associations for one project.
pub struct AssociationStore {
    project_id: String,
    repo: Arc<dyn AssociationRepository>,
    index: RwLock<AssociationIndex>,
    writer: Mutex<()>,
    retry: RetryPolicy,
}

impl AssociationStore {
    /// Build the index from every stored row for the project.
    pub async fn load(project_id: impl Into<String>, repo: Arc<dyn AssociationRepository>) -> Result<Self> {
        let project_id = project_id.into();
        let rows = repo.load_project(&project_id).await?;
        info!(project = %project_id, rows = rows.len(), "Loaded association index");

        Ok(Self {
            project_id,
            repo,
            index: RwLock::new(AssociationIndex::from_rows(rows)),
            writer: Mutex::new(()),
            retry: RetryPolicy::none(),
        })
    }

    /// Retry transient storage failures on writes.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Reload the rows for `paths`, let `plan` compute a change set against
    /// the refreshed index, persist it, then apply it to the index.
    async fn commit<R>(
        &self,
        paths: &[PathBuf],
        plan: impl FnOnce(&AssociationIndex) -> (AssociationChanges, R),
    ) -> Result<R> {
        let _gate = self.writer.lock().await;

        let fresh = with_retry(self.retry, "load_paths", || {
            self.repo.load_paths(&self.project_id, paths)
        })
        .await?;
        self.index.write().refresh(paths, fresh);

        let (changes, result) = {
            let index = self.index.read();
            plan(&*index)
        };
        if !changes.is_empty() {
            with_retry(self.retry, "apply_changes", || {
                self.repo.apply_changes(&self.project_id, &changes)
            })
            .await?;
            self.index.write().apply(&changes);
        }
        Ok(result)
    }

    /// Link `file` to `task_id`. Idempotent for an active pairing; reactivates
    /// an inactive one.
    pub async fn add(&self, file: &Path, task_id: &str) -> Result<AddOutcome> {
        let now = Utc::now();
        let path = file.to_path_buf();

        let outcome = self
            .commit(&[path.clone()], |index| match index.row(&path, task_id) {
                Some(row) if row.active => (AssociationChanges::default(), AddOutcome::AlreadyActive),
                Some(row) => {
                    let mut next = row.clone();
                    next.active = true;
                    next.reference_count = next.reference_count.saturating_add(1);
                    next.last_modified_at = now;
                    (upsert(next), AddOutcome::Reactivated)
                }
                None => (
                    upsert(FileAssociation::new(path.clone(), task_id, now)),
                    AddOutcome::Inserted,
                ),
            })
            .await?;

        debug!(project = %self.project_id, path = %file.display(), task = task_id, ?outcome, "add association");
        Ok(outcome)
    }

    /// Soft-delete the pairing. The row stays for the audit trail.
    pub async fn remove(&self, file: &Path, task_id: &str) -> Result<RemoveOutcome> {
        let now = Utc::now();
        let path = file.to_path_buf();

        let outcome = self
            .commit(&[path.clone()], |index| match index.row(&path, task_id) {
                Some(row) if row.active => {
                    let mut next = row.clone();
                    next.active = false;
                    next.last_modified_at = now;
                    (upsert(next), RemoveOutcome::Deactivated)
                }
                Some(_) => (AssociationChanges::default(), RemoveOutcome::AlreadyInactive),
                None => (AssociationChanges::default(), RemoveOutcome::NotAssociated),
            })
            .await?;

        debug!(project = %self.project_id, path = %file.display(), task = task_id, ?outcome, "remove association");
        Ok(outcome)
    }

    /// Update association metadata for a normalized event. Never creates an
    /// association.
    pub async fn apply_event(&self, event: &FileEvent) -> Result<EventOutcome> {
        let ts = event.timestamp;
        match (event.action, event.prior_path.as_ref()) {
            (FileAction::Renamed, Some(from)) if from != &event.path => {
                self.rename(from, &event.path, ts).await
            }
            (FileAction::Deleted, _) => {
                let path = event.path.clone();
                self.commit(&[path.clone()], |index| {
                    let correlated_task = index.single_active_task(&path);
                    let changes = AssociationChanges {
                        upserts: index
                            .active_at(&path)
                            .map(|row| {
                                let mut next = row.clone();
                                next.active = false;
                                next.last_modified_at = ts;
                                next
                            })
                            .collect(),
                        removed: Vec::new(),
                    };
                    let rows_changed = changes.upserts.len();
                    (changes, EventOutcome { correlated_task, rows_changed })
                })
                .await
            }
            _ => {
                let path = event.path.clone();
                self.commit(&[path.clone()], |index| {
                    let correlated_task = index.single_active_task(&path);
                    let changes = AssociationChanges {
                        upserts: index
                            .active_at(&path)
                            .map(|row| {
                                let mut next = row.clone();
                                next.last_modified_at = ts;
                                next
                            })
                            .collect(),
                        removed: Vec::new(),
                    };
                    let rows_changed = changes.upserts.len();
                    (changes, EventOutcome { correlated_task, rows_changed })
                })
                .await
            }
        }
    }

    async fn rename(&self, from: &Path, to: &Path, ts: DateTime<Utc>) -> Result<EventOutcome> {
        let paths = [from.to_path_buf(), to.to_path_buf()];

        let outcome = self
            .commit(&paths, |index| {
                let mut changes = AssociationChanges::default();
                let mut merged: BTreeMap<String, FileAssociation> = index
                    .rows_at(to)
                    .map(|row| (row.task_id.clone(), row.clone()))
                    .collect();

                for source in index.rows_at(from) {
                    changes
                        .removed
                        .push((from.to_path_buf(), source.task_id.clone()));

                    let mut moved = source.clone();
                    moved.file_path = to.to_path_buf();
                    if moved.active {
                        moved.last_modified_at = ts;
                    }

                    let next = match merged.get(&source.task_id) {
                        Some(existing) => FileAssociation {
                            file_path: to.to_path_buf(),
                            task_id: source.task_id.clone(),
                            reference_count: existing.reference_count.max(moved.reference_count),
                            active: existing.active || moved.active,
                            first_associated_at: existing
                                .first_associated_at
                                .min(moved.first_associated_at),
                            last_modified_at: existing.last_modified_at.max(moved.last_modified_at),
                        },
                        None => moved,
                    };
                    merged.insert(next.task_id.clone(), next.clone());
                    changes.upserts.push(next);
                }

                let mut active = merged.values().filter(|row| row.active);
                let correlated_task = match (active.next(), active.next()) {
                    (Some(only), None) => Some(only.task_id.clone()),
                    _ => None,
                };
                let rows_changed = changes.upserts.len();
                (changes, EventOutcome { correlated_task, rows_changed })
            })
            .await?;

        if outcome.rows_changed > 0 {
            info!(
                project = %self.project_id,
                from = %from.display(),
                to = %to.display(),
                rows = outcome.rows_changed,
                "Migrated associations on rename"
            );
        }
        Ok(outcome)
    }

    /// Every row for `file`, active or not, ordered by task id.
    pub fn associations(&self, file: &Path) -> Vec<FileAssociation> {
        self.index.read().rows_at(file).cloned().collect()
    }

    /// Tasks actively linked to `file`, ordered by id.
    pub fn active_tasks(&self, file: &Path) -> Vec<String> {
        self.index
            .read()
            .active_at(file)
            .map(|row| row.task_id.clone())
            .collect()
    }

    /// Files actively linked to `task_id`, ordered by path.
    pub fn files_for_task(&self, task_id: &str) -> Vec<PathBuf> {
        self.index
            .read()
            .by_task
            .get(task_id)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of active associations for `file`.
    pub fn reference_count(&self, file: &Path) -> usize {
        self.index.read().active_counts.get(file).copied().unwrap_or(0)
    }

    /// Every file with at least one active association, with its active
    /// task ids. Ordered by path.
    pub fn active_files(&self) -> BTreeMap<PathBuf, Vec<String>> {
        let index = self.index.read();
        index
            .active_counts
            .keys()
            .map(|path| {
                let tasks = index.active_at(path).map(|row| row.task_id.clone()).collect();
                (path.clone(), tasks)
            })
            .collect()
    }
}

fn upsert(row: FileAssociation) -> AssociationChanges {
    AssociationChanges {
        upserts: vec![row],
        removed: Vec::new(),
    }
}
