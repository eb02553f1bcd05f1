//! DaemonRecordRepository implementation for SQLite

use crate::connection::SqlitePool;
use crate::error::{SqliteError, SqliteResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::str::FromStr;
use tracing::debug;
use tracline_core::{DaemonRecord, DaemonRecordRepository, DaemonState, StorageResult};

use super::{decode_ts, encode_ts};

/// SQLite implementation of DaemonRecordRepository
///
/// `compare_and_swap` runs inside an IMMEDIATE transaction so the read and
/// the write hold the database write lock together. This is what keeps two
/// `monitor start` processes from both claiming the same project.
#[derive(Clone)]
pub struct SqliteDaemonRecords {
    pool: SqlitePool,
}

impl SqliteDaemonRecords {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_RECORD: &str =
    "SELECT project_id, pid, state, start_time, updated_at FROM daemon_records";

type RawRecord = (String, Option<u32>, String, Option<String>, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_record(raw: RawRecord) -> SqliteResult<DaemonRecord> {
    let (project_id, pid, state, start_time, updated_at) = raw;
    Ok(DaemonRecord {
        project_id,
        pid,
        state: DaemonState::from_str(&state).map_err(|e| SqliteError::Decode(e.to_string()))?,
        start_time: start_time.as_deref().map(decode_ts).transpose()?,
        updated_at: decode_ts(&updated_at)?,
    })
}

fn fetch(conn: &Connection, project_id: &str) -> SqliteResult<Option<DaemonRecord>> {
    let raw = conn
        .query_row(
            &format!("{} WHERE project_id = ?1", SELECT_RECORD),
            [project_id],
            read_row,
        )
        .optional()?;
    raw.map(decode_record).transpose()
}

fn write(conn: &Connection, record: &DaemonRecord) -> SqliteResult<()> {
    conn.execute(
        r#"
        INSERT INTO daemon_records (project_id, pid, state, start_time, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(project_id) DO UPDATE SET
            pid = excluded.pid,
            state = excluded.state,
            start_time = excluded.start_time,
            updated_at = excluded.updated_at
        "#,
        params![
            record.project_id,
            record.pid,
            record.state.as_str(),
            record.start_time.as_ref().map(encode_ts),
            encode_ts(&record.updated_at),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl DaemonRecordRepository for SqliteDaemonRecords {
    async fn get(&self, project_id: &str) -> StorageResult<Option<DaemonRecord>> {
        let project_id = project_id.to_string();
        self.pool.run(move |conn| fetch(conn, &project_id)).await
    }

    async fn list(&self) -> StorageResult<Vec<DaemonRecord>> {
        self.pool
            .run(|conn| {
                let mut stmt = conn.prepare(&format!("{} ORDER BY project_id", SELECT_RECORD))?;
                let raw = stmt
                    .query_map([], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                raw.into_iter().map(decode_record).collect()
            })
            .await
    }

    async fn compare_and_swap(
        &self,
        expected: Option<&DaemonRecord>,
        next: &DaemonRecord,
    ) -> StorageResult<bool> {
        let expected = expected.cloned();
        let next = next.clone();

        self.pool
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current = fetch(&tx, &next.project_id)?;

                let matches = match (&expected, &current) {
                    (None, None) => true,
                    (Some(want), Some(have)) => want.same_claim(have),
                    _ => false,
                };

                if !matches {
                    debug!(
                        project = %next.project_id,
                        current = ?current.as_ref().map(|r| r.state),
                        "Daemon record changed underneath compare-and-swap"
                    );
                    return Ok(false);
                }

                write(&tx, &next)?;
                tx.commit()?;
                Ok(true)
            })
            .await
    }

    async fn put(&self, record: &DaemonRecord) -> StorageResult<()> {
        let record = record.clone();
        self.pool.run(move |conn| write(conn, &record)).await
    }
}
