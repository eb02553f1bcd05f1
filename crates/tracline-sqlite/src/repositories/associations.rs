//! AssociationRepository implementation for SQLite

use crate::connection::SqlitePool;
use crate::error::SqliteResult;
use async_trait::async_trait;
use rusqlite::{params, Row};
use std::path::PathBuf;
use tracline_core::{AssociationChanges, AssociationRepository, FileAssociation, StorageResult};

use super::{decode_path, decode_ts, encode_path, encode_ts};

/// SQLite implementation of AssociationRepository
#[derive(Clone)]
pub struct SqliteAssociationRepository {
    pool: SqlitePool,
}

impl SqliteAssociationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_ASSOCIATION: &str = "SELECT file_path, task_id, reference_count, active, \
     first_associated_at, last_modified_at FROM file_associations";

type RawAssociation = (String, String, u32, bool, String, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawAssociation> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_association(raw: RawAssociation) -> SqliteResult<FileAssociation> {
    let (path, task_id, reference_count, active, first, last) = raw;
    Ok(FileAssociation {
        file_path: decode_path(path),
        task_id,
        reference_count,
        active,
        first_associated_at: decode_ts(&first)?,
        last_modified_at: decode_ts(&last)?,
    })
}

#[async_trait]
impl AssociationRepository for SqliteAssociationRepository {
    async fn load_project(&self, project_id: &str) -> StorageResult<Vec<FileAssociation>> {
        let project_id = project_id.to_string();

        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE project_id = ?1 ORDER BY file_path, task_id",
                    SELECT_ASSOCIATION
                ))?;
                let raw = stmt
                    .query_map([&project_id], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                raw.into_iter().map(decode_association).collect()
            })
            .await
    }

    async fn load_paths(
        &self,
        project_id: &str,
        paths: &[PathBuf],
    ) -> StorageResult<Vec<FileAssociation>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let project_id = project_id.to_string();
        let paths = paths.to_vec();

        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare_cached(&format!(
                    "{} WHERE project_id = ?1 AND file_path = ?2 ORDER BY task_id",
                    SELECT_ASSOCIATION
                ))?;
                let mut rows = Vec::new();
                for path in &paths {
                    let raw = stmt
                        .query_map(params![project_id, encode_path(path)], read_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    for r in raw {
                        rows.push(decode_association(r)?);
                    }
                }
                Ok(rows)
            })
            .await
    }

    async fn apply_changes(&self, project_id: &str, changes: &AssociationChanges) -> StorageResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let project_id = project_id.to_string();
        let changes = changes.clone();

        self.pool
            .run(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut delete = tx.prepare(
                        "DELETE FROM file_associations
                         WHERE project_id = ?1 AND file_path = ?2 AND task_id = ?3",
                    )?;
                    for (path, task_id) in &changes.removed {
                        delete.execute(params![project_id, encode_path(path), task_id])?;
                    }

                    let mut upsert = tx.prepare(
                        r#"
                        INSERT INTO file_associations
                            (project_id, file_path, task_id, reference_count, active,
                             first_associated_at, last_modified_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        ON CONFLICT(project_id, file_path, task_id) DO UPDATE SET
                            reference_count = excluded.reference_count,
                            active = excluded.active,
                            first_associated_at = excluded.first_associated_at,
                            last_modified_at = excluded.last_modified_at
                        "#,
                    )?;
                    for row in &changes.upserts {
                        upsert.execute(params![
                            project_id,
                            encode_path(&row.file_path),
                            row.task_id,
                            row.reference_count,
                            row.active,
                            encode_ts(&row.first_associated_at),
                            encode_ts(&row.last_modified_at),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn upserts_and_removals_round_trip() {
        let repo = SqliteAssociationRepository::new(SqlitePool::memory().unwrap());
        let now = Utc::now();

        let a = FileAssociation::new("/p/a.py", "T1", now);
        let b = FileAssociation::new("/p/b.py", "T2", now);
        repo.apply_changes(
            "p",
            &AssociationChanges {
                upserts: vec![a.clone(), b.clone()],
                removed: vec![],
            },
        )
        .await
        .unwrap();

        let mut inactive = a.clone();
        inactive.active = false;
        repo.apply_changes(
            "p",
            &AssociationChanges {
                upserts: vec![inactive.clone()],
                removed: vec![(PathBuf::from("/p/b.py"), "T2".to_string())],
            },
        )
        .await
        .unwrap();

        let rows = repo.load_project("p").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_path, PathBuf::from("/p/a.py"));
        assert!(!rows[0].active);
        assert_eq!(rows[0].reference_count, 1);
        assert!(repo.load_project("other").await.unwrap().is_empty());

        let by_path = repo
            .load_paths("p", &[PathBuf::from("/p/a.py"), PathBuf::from("/p/missing")])
            .await
            .unwrap();
        assert_eq!(by_path, rows);
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_partial_state() {
        let pool = SqlitePool::memory().unwrap();
        let repo = SqliteAssociationRepository::new(pool.clone());
        let now = Utc::now();

        let good = FileAssociation::new("/p/a.py", "T1", now);
        let bad = FileAssociation::new("/p/b.py", "T1", now);
        pool.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_b BEFORE INSERT ON file_associations
                 WHEN NEW.file_path = '/p/b.py'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let result = repo
            .apply_changes(
                "p",
                &AssociationChanges {
                    upserts: vec![good, bad],
                    removed: vec![],
                },
            )
            .await;
        assert!(result.is_err());
        assert!(repo.load_project("p").await.unwrap().is_empty());
    }
}
