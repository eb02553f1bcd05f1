//! ProjectSettingsRepository implementation for SQLite

use crate::connection::SqlitePool;
use crate::error::SqliteResult;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracline_core::{ProjectSettingsRepository, StorageResult, WatchedProject};

use super::{decode_path, decode_ts, encode_path, encode_ts};

/// SQLite implementation of ProjectSettingsRepository
#[derive(Clone)]
pub struct SqliteProjectSettings {
    pool: SqlitePool,
}

impl SqliteProjectSettings {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_SETTINGS: &str =
    "SELECT project_id, root_path, extensions, monitor_enabled, updated_at FROM project_settings";

type RawSettings = (String, String, String, bool, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawSettings> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_settings(raw: RawSettings) -> SqliteResult<WatchedProject> {
    let (project_id, root, extensions, monitor_enabled, updated_at) = raw;
    Ok(WatchedProject {
        project_id,
        root: decode_path(root),
        extensions: serde_json::from_str(&extensions)?,
        monitor_enabled,
        updated_at: decode_ts(&updated_at)?,
    })
}

#[async_trait]
impl ProjectSettingsRepository for SqliteProjectSettings {
    async fn get(&self, project_id: &str) -> StorageResult<Option<WatchedProject>> {
        let project_id = project_id.to_string();

        self.pool
            .run(move |conn| {
                let raw = conn
                    .query_row(
                        &format!("{} WHERE project_id = ?1", SELECT_SETTINGS),
                        [&project_id],
                        read_row,
                    )
                    .optional()?;
                raw.map(decode_settings).transpose()
            })
            .await
    }

    async fn upsert(&self, project: &WatchedProject) -> StorageResult<()> {
        let project = project.clone();

        self.pool
            .run(move |conn| {
                let extensions = serde_json::to_string(&project.extensions)?;
                conn.execute(
                    r#"
                    INSERT INTO project_settings
                        (project_id, root_path, extensions, monitor_enabled, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(project_id) DO UPDATE SET
                        root_path = excluded.root_path,
                        extensions = excluded.extensions,
                        monitor_enabled = excluded.monitor_enabled,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        project.project_id,
                        encode_path(&project.root),
                        extensions,
                        project.monitor_enabled,
                        encode_ts(&project.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn set_monitor_enabled(&self, project_id: &str, enabled: bool) -> StorageResult<bool> {
        let project_id = project_id.to_string();

        self.pool
            .run(move |conn| {
                let changed = conn.execute(
                    "UPDATE project_settings SET monitor_enabled = ?2, updated_at = ?3
                     WHERE project_id = ?1",
                    params![project_id, enabled, encode_ts(&Utc::now())],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    async fn list(&self) -> StorageResult<Vec<WatchedProject>> {
        self.pool
            .run(|conn| {
                let mut stmt = conn.prepare(&format!("{} ORDER BY project_id", SELECT_SETTINGS))?;
                let raw = stmt
                    .query_map([], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                raw.into_iter().map(decode_settings).collect()
            })
            .await
    }
}
