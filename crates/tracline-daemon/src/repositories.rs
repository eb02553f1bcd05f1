//! Repository bundle shared by the supervisor and the trace service.

use std::sync::Arc;
use tracline_core::{
    AccessLogRepository, AssociationRepository, DaemonRecordRepository,
    ProjectSettingsRepository, TaskDirectory,
};

/// Handles to every storage collaborator the daemon needs.
#[derive(Clone)]
pub struct Repositories {
    pub associations: Arc<dyn AssociationRepository>,
    pub access_log: Arc<dyn AccessLogRepository>,
    pub daemons: Arc<dyn DaemonRecordRepository>,
    pub projects: Arc<dyn ProjectSettingsRepository>,
    pub tasks: Arc<dyn TaskDirectory>,
}

impl Repositories {
    /// All repositories backed by one SQLite database.
    #[cfg(feature = "storage-sqlite")]
    pub fn sqlite(pool: tracline_sqlite::SqlitePool) -> Self {
        use tracline_sqlite::{
            SqliteAccessLog, SqliteAssociationRepository, SqliteDaemonRecords,
            SqliteProjectSettings, SqliteTaskDirectory,
        };

        Self {
            associations: Arc::new(SqliteAssociationRepository::new(pool.clone())),
            access_log: Arc::new(SqliteAccessLog::new(pool.clone())),
            daemons: Arc::new(SqliteDaemonRecords::new(pool.clone())),
            projects: Arc::new(SqliteProjectSettings::new(pool.clone())),
            tasks: Arc::new(SqliteTaskDirectory::new(pool)),
        }
    }

    /// All repositories backed by one in-memory store.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory(store: Arc<tracline_core::test_support::InMemoryStore>) -> Self {
        Self {
            associations: store.clone(),
            access_log: store.clone(),
            daemons: store.clone(),
            projects: store.clone(),
            tasks: store,
        }
    }
}
