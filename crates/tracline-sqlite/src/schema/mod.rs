//! Schema management and migrations

use crate::error::{SqliteError, SqliteResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 1;

/// Apply all pending migrations
pub fn apply_migrations(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = get_current_version(conn)?;
    debug!(current_version, target_version = SCHEMA_VERSION, "Checking migrations");

    if current_version < 1 {
        info!(from = current_version, to = SCHEMA_VERSION, "Applying schema migrations");
        apply_migration_v1(conn)?;
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> SqliteResult<i32> {
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

fn record_migration(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("INSERT INTO schema_migrations (version) VALUES (?)", [version])?;
    Ok(())
}

/// Migration v1: monitor and traceability tables
fn apply_migration_v1(conn: &Connection) -> SqliteResult<()> {
    debug!("Applying migration v1: traceability schema");

    conn.execute_batch(SCHEMA_V1)
        .map_err(|e| SqliteError::Schema(format!("Failed to apply v1 schema: {}", e)))?;

    record_migration(conn, 1)?;
    info!("Migration v1 applied successfully");
    Ok(())
}

/// Initial schema SQL
///
/// Timestamps are RFC 3339 strings in UTC with fixed microsecond precision so
/// that text ordering equals time ordering.
const SCHEMA_V1: &str = r#"
-- ============================================================================
-- TABLE: tasks
-- ============================================================================
-- Owned by the task tracker; the monitor only reads it

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    project_id TEXT NOT NULL,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'todo',
    assignee TEXT,
    priority INTEGER
);

CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);

-- ============================================================================
-- TABLE: project_settings
-- ============================================================================

CREATE TABLE IF NOT EXISTS project_settings (
    project_id TEXT PRIMARY KEY NOT NULL,
    root_path TEXT NOT NULL,
    extensions TEXT NOT NULL DEFAULT '[]',  -- JSON array of ".ext"
    monitor_enabled INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

-- ============================================================================
-- TABLE: file_associations
-- ============================================================================
-- Rows are never deleted by the monitor; deletion flips active to 0

CREATE TABLE IF NOT EXISTS file_associations (
    project_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    task_id TEXT NOT NULL,
    reference_count INTEGER NOT NULL DEFAULT 1 CHECK (reference_count >= 0),
    active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1)),
    first_associated_at TEXT NOT NULL,
    last_modified_at TEXT NOT NULL,
    PRIMARY KEY (project_id, file_path, task_id)
);

CREATE INDEX IF NOT EXISTS idx_associations_task ON file_associations(project_id, task_id);

-- ============================================================================
-- TABLE: file_access_log
-- ============================================================================
-- Append-only; sequence breaks timestamp ties

CREATE TABLE IF NOT EXISTS file_access_log (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    action TEXT NOT NULL CHECK (action IN ('created', 'modified', 'deleted', 'renamed')),
    file_path TEXT NOT NULL,
    prior_path TEXT,
    task_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_access_log_order
    ON file_access_log(project_id, timestamp DESC, sequence DESC);
CREATE INDEX IF NOT EXISTS idx_access_log_path ON file_access_log(project_id, file_path);

-- ============================================================================
-- TABLE: daemon_records
-- ============================================================================

CREATE TABLE IF NOT EXISTS daemon_records (
    project_id TEXT PRIMARY KEY NOT NULL,
    pid INTEGER,
    state TEXT NOT NULL CHECK (state IN ('stopped', 'starting', 'running', 'crashed')),
    start_time TEXT,
    updated_at TEXT NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();
        assert_eq!(get_current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn invalid_action_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO file_access_log (project_id, timestamp, action, file_path)
             VALUES ('p', '2024-01-01T00:00:00.000000Z', 'touched', '/a')",
            [],
        );
        assert!(result.is_err());
    }
}
