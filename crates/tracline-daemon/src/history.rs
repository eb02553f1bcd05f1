//! Access history log for one project.

use std::sync::Arc;
use tracline_core::{
    AccessLogEntry, AccessLogRepository, FileAction, FileEvent, HistoryQuery, NewAccessLogEntry,
    Result,
};

use crate::retry::{with_retry, RetryPolicy};

/// Append-only view of a project's access log.
///
/// Entries come back newest first, ties on timestamp broken by insertion
/// order, so paging with `offset` is stable.
#[derive(Clone)]
pub struct AccessHistoryLog {
    project_id: String,
    repo: Arc<dyn AccessLogRepository>,
    retry: RetryPolicy,
}

impl AccessHistoryLog {
    pub fn new(project_id: impl Into<String>, repo: Arc<dyn AccessLogRepository>) -> Self {
        Self {
            project_id: project_id.into(),
            repo,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Record `event`, returning its sequence number.
    pub async fn append(&self, event: &FileEvent, task_id: Option<String>) -> Result<i64> {
        let entry = NewAccessLogEntry::from_event(self.project_id.clone(), event, task_id);
        let sequence = with_retry(self.retry, "append_access_log", || self.repo.append(&entry)).await?;
        Ok(sequence)
    }

    pub async fn query(&self, query: &HistoryQuery) -> Result<Vec<AccessLogEntry>> {
        Ok(self.repo.query(&self.project_id, query).await?)
    }

    pub async fn count(&self, action: Option<FileAction>) -> Result<u64> {
        Ok(self.repo.count(&self.project_id, action).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;
    use tracline_core::test_support::InMemoryStore;

    #[tokio::test]
    async fn pages_newest_first_and_filters_by_action() {
        let log = AccessHistoryLog::new("p", Arc::new(InMemoryStore::new()));
        let ts = Utc::now();
        log.append(&FileEvent::created("/p/a.py").with_timestamp(ts), None)
            .await
            .unwrap();
        log.append(&FileEvent::modified("/p/a.py").with_timestamp(ts), Some("T1".into()))
            .await
            .unwrap();
        log.append(&FileEvent::deleted("/p/a.py").with_timestamp(ts), None)
            .await
            .unwrap();

        let page = log.query(&HistoryQuery::new(2, 0)).await.unwrap();
        let actions: Vec<_> = page.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![FileAction::Deleted, FileAction::Modified]);

        let rest = log.query(&HistoryQuery::new(2, 2)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].action, FileAction::Created);

        let modified = log
            .query(&HistoryQuery::default().with_action(FileAction::Modified))
            .await
            .unwrap();
        assert_eq!(modified[0].task_id.as_deref(), Some("T1"));
        assert_eq!(modified[0].file_path, PathBuf::from("/p/a.py"));
        assert_eq!(log.count(Some(FileAction::Deleted)).await.unwrap(), 1);
    }
}
