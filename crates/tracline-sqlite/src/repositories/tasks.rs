//! Read access to the task tracker's `tasks` table

use crate::connection::SqlitePool;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use tracline_core::{StorageResult, TaskDirectory, TaskFilter, TaskSummary};

/// SQLite implementation of TaskDirectory
///
/// The task tracker owns these rows. [`SqliteTaskDirectory::upsert_task`]
/// exists so tests and the CLI can seed tasks without it.
#[derive(Clone)]
pub struct SqliteTaskDirectory {
    pool: SqlitePool,
}

impl SqliteTaskDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_task(&self, task: &TaskSummary) -> StorageResult<()> {
        let task = task.clone();

        self.pool
            .run(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO tasks (id, project_id, title, status, assignee, priority)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(id) DO UPDATE SET
                        project_id = excluded.project_id,
                        title = excluded.title,
                        status = excluded.status,
                        assignee = excluded.assignee,
                        priority = excluded.priority
                    "#,
                    params![
                        task.id,
                        task.project_id,
                        task.title,
                        task.status,
                        task.assignee,
                        task.priority
                    ],
                )?;
                Ok(())
            })
            .await
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskSummary> {
    Ok(TaskSummary {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        assignee: row.get(4)?,
        priority: row.get(5)?,
    })
}

#[async_trait]
impl TaskDirectory for SqliteTaskDirectory {
    async fn get_task(&self, task_id: &str) -> StorageResult<Option<TaskSummary>> {
        let task_id = task_id.to_string();

        self.pool
            .run(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, project_id, title, status, assignee, priority
                         FROM tasks WHERE id = ?1",
                        [&task_id],
                        row_to_task,
                    )
                    .optional()?)
            })
            .await
    }

    async fn task_exists(&self, task_id: &str) -> StorageResult<bool> {
        let task_id = task_id.to_string();

        self.pool
            .run(move |conn| {
                let found: Option<i64> = conn
                    .query_row("SELECT 1 FROM tasks WHERE id = ?1", [&task_id], |row| {
                        row.get(0)
                    })
                    .optional()?;
                Ok(found.is_some())
            })
            .await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StorageResult<Vec<TaskSummary>> {
        let filter = filter.clone();

        self.pool
            .run(move |conn| {
                // Project narrows through the index; title and status use the
                // same case rules as TaskFilter::matches.
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, project_id, title, status, assignee, priority
                    FROM tasks
                    WHERE (?1 IS NULL OR project_id = ?1)
                    ORDER BY id
                    "#,
                )?;
                let tasks = stmt
                    .query_map(params![filter.project_id], row_to_task)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(tasks.into_iter().filter(|t| filter.matches(t)).collect())
            })
            .await
    }
}
