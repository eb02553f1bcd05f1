//! Access log storage and retention
//!
//! The log is append-only through [`AccessLogRepository`]. Trimming lives
//! here, outside the trait, and only runs when a caller asks for it.

use crate::connection::SqlitePool;
use crate::error::{SqliteError, SqliteResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rusqlite::{params, Row};
use std::str::FromStr;
use tracing::{debug, info};
use tracline_config::HistoryConfig;
use tracline_core::{
    AccessLogEntry, AccessLogRepository, FileAction, HistoryQuery, NewAccessLogEntry,
    StorageResult,
};

use super::{decode_path, decode_ts, encode_path, encode_ts};

/// How much history to keep per project. `None` means no bound on that axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_entries: Option<u64>,
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    pub fn is_unbounded(&self) -> bool {
        self.max_entries.is_none() && self.max_age.is_none()
    }
}

impl From<&HistoryConfig> for RetentionPolicy {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            max_entries: (config.max_entries_per_project > 0)
                .then_some(config.max_entries_per_project),
            max_age: (config.max_age_days > 0)
                .then(|| Duration::days(config.max_age_days.min(i64::MAX as u64) as i64)),
        }
    }
}

/// SQLite implementation of AccessLogRepository
#[derive(Clone)]
pub struct SqliteAccessLog {
    pool: SqlitePool,
}

impl SqliteAccessLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete entries outside `policy` for one project. Returns the number of
    /// rows removed.
    pub async fn prune_access_log(
        &self,
        project_id: &str,
        policy: &RetentionPolicy,
    ) -> StorageResult<u64> {
        if policy.is_unbounded() {
            return Ok(0);
        }
        let project_id = project_id.to_string();
        let policy = *policy;

        let removed = self
            .pool
            .run(move |conn| {
                let tx = conn.transaction()?;
                let mut removed = 0usize;

                if let Some(max_age) = policy.max_age {
                    let cutoff = encode_ts(&(Utc::now() - max_age));
                    removed += tx.execute(
                        "DELETE FROM file_access_log WHERE project_id = ?1 AND timestamp < ?2",
                        params![project_id, cutoff],
                    )?;
                }

                if let Some(max_entries) = policy.max_entries {
                    let keep = i64::try_from(max_entries).unwrap_or(i64::MAX);
                    removed += tx.execute(
                        r#"
                        DELETE FROM file_access_log
                        WHERE project_id = ?1 AND sequence NOT IN (
                            SELECT sequence FROM file_access_log
                            WHERE project_id = ?1
                            ORDER BY timestamp DESC, sequence DESC
                            LIMIT ?2
                        )
                        "#,
                        params![project_id, keep],
                    )?;
                }

                tx.commit()?;
                Ok(removed as u64)
            })
            .await?;

        info!(removed, "Pruned access log");
        Ok(removed)
    }
}

type RawEntry = (i64, String, String, String, String, Option<String>, Option<String>);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_entry(raw: RawEntry) -> SqliteResult<AccessLogEntry> {
    let (sequence, project_id, timestamp, action, file_path, prior_path, task_id) = raw;
    Ok(AccessLogEntry {
        sequence,
        project_id,
        timestamp: decode_ts(&timestamp)?,
        action: FileAction::from_str(&action).map_err(|e| SqliteError::Decode(e.to_string()))?,
        file_path: decode_path(file_path),
        prior_path: prior_path.map(decode_path),
        task_id,
    })
}

#[async_trait]
impl AccessLogRepository for SqliteAccessLog {
    async fn append(&self, entry: &NewAccessLogEntry) -> StorageResult<i64> {
        let entry = entry.clone();

        self.pool
            .run(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO file_access_log
                        (project_id, timestamp, action, file_path, prior_path, task_id)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        entry.project_id,
                        encode_ts(&entry.timestamp),
                        entry.action.as_str(),
                        encode_path(&entry.file_path),
                        entry.prior_path.as_deref().map(encode_path),
                        entry.task_id,
                    ],
                )?;
                let sequence = conn.last_insert_rowid();
                debug!(sequence, action = %entry.action, "Appended access log entry");
                Ok(sequence)
            })
            .await
    }

    async fn query(&self, project_id: &str, query: &HistoryQuery) -> StorageResult<Vec<AccessLogEntry>> {
        let project_id = project_id.to_string();
        let query = *query;

        self.pool
            .run(move |conn| {
                let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
                let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
                let action = query.action.map(|a| a.as_str());

                let mut stmt = conn.prepare(
                    r#"
                    SELECT sequence, project_id, timestamp, action, file_path, prior_path, task_id
                    FROM file_access_log
                    WHERE project_id = ?1 AND (?2 IS NULL OR action = ?2)
                    ORDER BY timestamp DESC, sequence DESC
                    LIMIT ?3 OFFSET ?4
                    "#,
                )?;

                let raw = stmt
                    .query_map(params![project_id, action, limit, offset], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;

                raw.into_iter().map(decode_entry).collect()
            })
            .await
    }

    async fn count(&self, project_id: &str, action: Option<FileAction>) -> StorageResult<u64> {
        let project_id = project_id.to_string();

        self.pool
            .run(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM file_access_log
                     WHERE project_id = ?1 AND (?2 IS NULL OR action = ?2)",
                    params![project_id, action.map(|a| a.as_str())],
                    |row| row.get(0),
                )?;
                Ok(count.max(0) as u64)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use std::path::PathBuf;

    fn entry(ts: DateTime<Utc>, action: FileAction, path: &str) -> NewAccessLogEntry {
        NewAccessLogEntry {
            project_id: "p".into(),
            timestamp: ts,
            action,
            file_path: PathBuf::from(path),
            prior_path: None,
            task_id: None,
        }
    }

    #[tokio::test]
    async fn equal_timestamps_break_ties_by_sequence() {
        let log = SqliteAccessLog::new(SqlitePool::memory().unwrap());
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let first = log.append(&entry(ts, FileAction::Created, "/p/a")).await.unwrap();
        let second = log.append(&entry(ts, FileAction::Modified, "/p/a")).await.unwrap();
        assert!(second > first);

        let rows = log.query("p", &HistoryQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sequence, second);
        assert_eq!(rows[1].sequence, first);
    }

    #[tokio::test]
    async fn action_filter_and_count() {
        let log = SqliteAccessLog::new(SqlitePool::memory().unwrap());
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        for (i, action) in [FileAction::Modified, FileAction::Deleted, FileAction::Modified]
            .into_iter()
            .enumerate()
        {
            log.append(&entry(base + Duration::seconds(i as i64), action, "/p/a"))
                .await
                .unwrap();
        }

        assert_eq!(log.count("p", None).await.unwrap(), 3);
        assert_eq!(log.count("p", Some(FileAction::Modified)).await.unwrap(), 2);

        let deleted = log
            .query("p", &HistoryQuery::default().with_action(FileAction::Deleted))
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].action, FileAction::Deleted);
    }

    #[tokio::test]
    async fn renamed_entries_keep_prior_path() {
        let log = SqliteAccessLog::new(SqlitePool::memory().unwrap());
        let mut renamed = entry(Utc::now(), FileAction::Renamed, "/p/b.py");
        renamed.prior_path = Some(PathBuf::from("/p/a.py"));
        renamed.task_id = Some("T1".into());
        log.append(&renamed).await.unwrap();

        let rows = log.query("p", &HistoryQuery::default()).await.unwrap();
        assert_eq!(rows[0].prior_path.as_deref(), Some(PathBuf::from("/p/a.py").as_path()));
        assert_eq!(rows[0].task_id.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn prune_keeps_newest_entries() {
        let log = SqliteAccessLog::new(SqlitePool::memory().unwrap());
        let now = Utc::now();
        for i in 0..5 {
            log.append(&entry(now - Duration::minutes(5 - i), FileAction::Modified, "/p/a"))
                .await
                .unwrap();
        }
        log.append(&entry(now - Duration::days(30), FileAction::Created, "/p/old"))
            .await
            .unwrap();

        let policy = RetentionPolicy {
            max_entries: Some(3),
            max_age: Some(Duration::days(7)),
        };
        let removed = log.prune_access_log("p", &policy).await.unwrap();
        assert_eq!(removed, 3);

        let rows = log.query("p", &HistoryQuery::default()).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.file_path == PathBuf::from("/p/a")));
    }

    #[test]
    fn zero_config_values_are_unbounded() {
        let policy = RetentionPolicy::from(&HistoryConfig::default());
        assert!(policy.is_unbounded());
    }
}
