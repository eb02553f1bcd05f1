//! Traceability matrix and summary statistics.
//!
//! The matrix is sparse: each file row lists the indices of the tasks that
//! actively reference it. Candidate files are reached from candidate tasks
//! through the store's task index, so building it costs
//! O(tasks + associations) rather than O(tasks x files).

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracline_core::{file_extension, Result, TaskDirectory, TaskFilter, TaskSummary};
use tracline_config::normalize_extension;

use crate::store::AssociationStore;

/// How many files `summary.most_referenced` lists when `top_k` is unset.
pub const DEFAULT_TOP_K: usize = 10;

/// Filters for [`TraceabilityQueryEngine::matrix`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatrixRequest {
    pub project_id: String,
    /// `.md` or `md`; compared case-insensitively.
    pub file_extension: Option<String>,
    /// Case-insensitive substring of the file path.
    pub file_name_contains: Option<String>,
    /// Case-insensitive substring of the task title.
    pub task_name_contains: Option<String>,
    /// Case-insensitive substring of the task status.
    pub task_status: Option<String>,
    #[serde(skip)]
    pub include_reference_counts: bool,
    #[serde(skip)]
    pub top_k: Option<usize>,
}

impl MatrixRequest {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReference {
    pub path: PathBuf,
    pub task_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixSummary {
    pub total_tasks: usize,
    pub total_files: usize,
    pub total_associations: usize,
    /// Zero when there are no candidate tasks.
    pub avg_files_per_task: f64,
    /// Highest task count first, ties by path.
    pub most_referenced: Vec<FileReference>,
}

/// Task x file grid. Absent cells are false.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceabilityMatrix {
    pub tasks: Vec<TaskSummary>,
    /// Lexical path order.
    pub files: Vec<PathBuf>,
    /// For each file, ascending indices into `tasks`.
    #[serde(skip)]
    pub cells: Vec<Vec<usize>>,
    pub filters: MatrixRequest,
    /// Active associations per file from the candidate tasks, the same
    /// figure as the file's marked cells.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_reference_counts: Option<BTreeMap<PathBuf, usize>>,
    pub summary: MatrixSummary,
}

impl TraceabilityMatrix {
    /// Whether `tasks[task]` references `files[file]`.
    pub fn get(&self, task: usize, file: usize) -> bool {
        self.cells
            .get(file)
            .is_some_and(|row| row.binary_search(&task).is_ok())
    }

    /// Dense `matrix[task][file]` for JSON output.
    pub fn dense(&self) -> Vec<Vec<bool>> {
        let mut grid = vec![vec![false; self.files.len()]; self.tasks.len()];
        for (file, row) in self.cells.iter().enumerate() {
            for &task in row {
                grid[task][file] = true;
            }
        }
        grid
    }

    /// JSON document with the dense matrix inlined.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(object) = value.as_object_mut() {
            object.insert("matrix".into(), serde_json::json!(self.dense()));
        }
        value
    }
}

/// Read-only queries over one project's associations and the task directory.
pub struct TraceabilityQueryEngine {
    store: Arc<AssociationStore>,
    tasks: Arc<dyn TaskDirectory>,
}

impl TraceabilityQueryEngine {
    pub fn new(store: Arc<AssociationStore>, tasks: Arc<dyn TaskDirectory>) -> Self {
        Self { store, tasks }
    }

    pub async fn matrix(&self, request: &MatrixRequest) -> Result<TraceabilityMatrix> {
        let extension = request
            .file_extension
            .as_deref()
            .map(normalize_extension)
            .transpose()?;

        let filter = TaskFilter {
            project_id: Some(request.project_id.clone()),
            title_contains: request.task_name_contains.clone(),
            status: request.task_status.clone(),
        };
        let tasks = self.tasks.list_tasks(&filter).await?;

        let needle = request.file_name_contains.as_deref().map(str::to_lowercase);
        let mut rows: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();
        for (index, task) in tasks.iter().enumerate() {
            for path in self.store.files_for_task(&task.id) {
                if !file_matches(&path, extension.as_deref(), needle.as_deref()) {
                    continue;
                }
                rows.entry(path).or_default().push(index);
            }
        }

        let total_associations = rows.values().map(Vec::len).sum::<usize>();
        let avg_files_per_task = if tasks.is_empty() {
            0.0
        } else {
            total_associations as f64 / tasks.len() as f64
        };

        let mut ranked: Vec<FileReference> = rows
            .iter()
            .map(|(path, row)| FileReference {
                path: path.clone(),
                task_count: row.len(),
            })
            .collect();
        ranked.sort_by(|a, b| b.task_count.cmp(&a.task_count).then_with(|| a.path.cmp(&b.path)));
        ranked.truncate(request.top_k.unwrap_or(DEFAULT_TOP_K));

        let file_reference_counts = request.include_reference_counts.then(|| {
            rows.iter()
                .map(|(path, row)| (path.clone(), row.len()))
                .collect()
        });

        let (files, cells): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        debug!(
            project = %request.project_id,
            tasks = tasks.len(),
            files = files.len(),
            associations = total_associations,
            "Built traceability matrix"
        );

        Ok(TraceabilityMatrix {
            summary: MatrixSummary {
                total_tasks: tasks.len(),
                total_files: files.len(),
                total_associations,
                avg_files_per_task,
                most_referenced: ranked,
            },
            tasks,
            files,
            cells,
            filters: MatrixRequest {
                file_extension: extension,
                ..request.clone()
            },
            file_reference_counts,
        })
    }
}

/// `contains` must already be lower-cased.
fn file_matches(path: &Path, extension: Option<&str>, contains: Option<&str>) -> bool {
    if let Some(ext) = extension {
        if file_extension(path).as_deref() != Some(ext) {
            return false;
        }
    }
    match contains {
        Some(needle) => path.to_string_lossy().to_lowercase().contains(needle),
        None => true,
    }
}
