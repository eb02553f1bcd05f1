//! Trace operations behind the `trace` CLI verbs.
//!
//! Each call loads the project's association index fresh, so results reflect
//! writes made by a monitor running in another process.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracline_core::{file_extension, resolve_path, CoreError, Result, TaskSummary};

use crate::query::{MatrixRequest, TraceabilityMatrix, TraceabilityQueryEngine};
use crate::repositories::Repositories;
use crate::store::{AddOutcome, AssociationStore, RemoveOutcome};

/// A task referencing a file, as listed by `ls-trace`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    #[serde(flatten)]
    pub task: TaskSummary,
    pub associated_at: DateTime<Utc>,
}

/// Result of [`TraceService::ls_trace`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTrace {
    pub project_id: String,
    pub path: PathBuf,
    /// Whether the path exists on disk right now.
    pub exists: bool,
    /// Newest association first.
    pub tasks: Vec<TraceEntry>,
}

/// One row of `trace stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub path: PathBuf,
    pub task_count: usize,
    pub assignee_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDetail {
    pub path: PathBuf,
    pub reference_count: usize,
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionStat {
    /// `(none)` for files without an extension.
    pub extension: String,
    pub files: usize,
    pub references: usize,
}

/// Result of [`TraceService::file_stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStatsReport {
    pub files: Vec<FileDetail>,
    pub extensions: Vec<ExtensionStat>,
}

/// Explicit association management and read-side reports.
#[derive(Clone)]
pub struct TraceService {
    repos: Repositories,
    base_dir: Option<PathBuf>,
}

impl TraceService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos, base_dir: None }
    }

    /// Resolve relative paths against `dir` instead of the working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Link `file` to `task_id` within the task's project.
    pub async fn add_file(&self, task_id: &str, file: &Path) -> Result<(TaskSummary, PathBuf, AddOutcome)> {
        let task = self.task(task_id).await?;
        let path = self.resolve(file)?;
        let outcome = self.store(&task.project_id).await?.add(&path, &task.id).await?;
        info!(project = %task.project_id, task = %task.id, path = %path.display(), ?outcome, "Associated file");
        Ok((task, path, outcome))
    }

    /// Deactivate the link between `file` and `task_id`.
    pub async fn remove_file(&self, task_id: &str, file: &Path) -> Result<(PathBuf, RemoveOutcome)> {
        let task = self.task(task_id).await?;
        let path = self.resolve(file)?;
        let outcome = self.store(&task.project_id).await?.remove(&path, &task.id).await?;
        info!(project = %task.project_id, task = %task.id, path = %path.display(), ?outcome, "Removed file association");
        Ok((path, outcome))
    }

    /// Tasks actively referencing `file`. Without `project_id`, the project
    /// whose monitored root contains the file is used.
    pub async fn ls_trace(
        &self,
        file: &Path,
        project_id: Option<&str>,
        status: Option<&str>,
    ) -> Result<FileTrace> {
        let path = self.resolve(file)?;
        let project_id = match project_id {
            Some(id) => id.to_string(),
            None => self.project_for(&path).await?,
        };

        let store = self.store(&project_id).await?;
        let mut rows: Vec<_> = store.associations(&path).into_iter().filter(|r| r.active).collect();
        rows.sort_by(|a, b| b.first_associated_at.cmp(&a.first_associated_at));

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(task) = self.repos.tasks.get_task(&row.task_id).await? else {
                debug!(task = %row.task_id, "Association references unknown task");
                continue;
            };
            if status.is_some_and(|s| !task.status.eq_ignore_ascii_case(s)) {
                continue;
            }
            tasks.push(TraceEntry {
                task,
                associated_at: row.first_associated_at,
            });
        }

        Ok(FileTrace {
            project_id,
            exists: path.exists(),
            path,
            tasks,
        })
    }

    /// The `top_n` most referenced files, most tasks first, ties by path.
    pub async fn stats(&self, project_id: &str, top_n: usize) -> Result<Vec<FileStat>> {
        let store = self.store(project_id).await?;
        let mut assignees: BTreeMap<String, Option<String>> = BTreeMap::new();

        let mut stats = Vec::new();
        for (path, task_ids) in store.active_files() {
            let mut distinct = BTreeSet::new();
            for id in &task_ids {
                if !assignees.contains_key(id) {
                    let assignee = self.repos.tasks.get_task(id).await?.and_then(|t| t.assignee);
                    assignees.insert(id.clone(), assignee);
                }
                if let Some(Some(name)) = assignees.get(id) {
                    distinct.insert(name.clone());
                }
            }
            stats.push(FileStat {
                path,
                task_count: task_ids.len(),
                assignee_count: distinct.len(),
            });
        }

        stats.sort_by(|a, b| b.task_count.cmp(&a.task_count).then_with(|| a.path.cmp(&b.path)));
        stats.truncate(top_n);
        Ok(stats)
    }

    /// Sorted distinct extensions among actively associated files.
    pub async fn extensions(&self, project_id: &str) -> Result<Vec<String>> {
        let store = self.store(project_id).await?;
        let extensions: BTreeSet<String> = store
            .active_files()
            .keys()
            .filter_map(|path| file_extension(path))
            .collect();
        Ok(extensions.into_iter().collect())
    }

    /// Reference counts per file and per extension.
    pub async fn file_stats(&self, project_id: &str) -> Result<FileStatsReport> {
        let store = self.store(project_id).await?;
        let mut by_extension: BTreeMap<String, (usize, usize)> = BTreeMap::new();

        let files: Vec<FileDetail> = store
            .active_files()
            .into_iter()
            .map(|(path, tasks)| {
                let ext = file_extension(&path).unwrap_or_else(|| "(none)".to_string());
                let entry = by_extension.entry(ext).or_default();
                entry.0 += 1;
                entry.1 += tasks.len();
                FileDetail {
                    reference_count: tasks.len(),
                    path,
                    tasks,
                }
            })
            .collect();

        let extensions = by_extension
            .into_iter()
            .map(|(extension, (files, references))| ExtensionStat {
                extension,
                files,
                references,
            })
            .collect();

        Ok(FileStatsReport { files, extensions })
    }

    pub async fn matrix(&self, request: &MatrixRequest) -> Result<TraceabilityMatrix> {
        let store = self.store(&request.project_id).await?;
        TraceabilityQueryEngine::new(store, self.repos.tasks.clone())
            .matrix(request)
            .await
    }

    async fn task(&self, task_id: &str) -> Result<TaskSummary> {
        self.repos
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::TaskNotFound(task_id.to_string()))
    }

    async fn store(&self, project_id: &str) -> Result<Arc<AssociationStore>> {
        Ok(Arc::new(
            AssociationStore::load(project_id, self.repos.associations.clone()).await?,
        ))
    }

    fn resolve(&self, file: &Path) -> Result<PathBuf> {
        let base = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(resolve_path(file, &base))
    }

    /// Project whose root is the longest prefix of `path`.
    async fn project_for(&self, path: &Path) -> Result<String> {
        self.repos
            .projects
            .list()
            .await?
            .into_iter()
            .filter(|p| path.starts_with(&p.root))
            .max_by_key(|p| p.root.components().count())
            .map(|p| p.project_id)
            .ok_or_else(|| CoreError::ProjectNotFound(path.display().to_string()))
    }
}
