use serde::{Deserialize, Serialize};

/// The slice of a task the traceability core needs. Tasks themselves are
/// owned by the surrounding task tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub status: String,
    pub assignee: Option<String>,
    pub priority: Option<i32>,
}

/// Candidate task selection for matrix and listing queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub project_id: Option<String>,
    /// Case-insensitive substring of the title.
    pub title_contains: Option<String>,
    /// Case-insensitive substring of the status.
    pub status: Option<String>,
}

impl TaskFilter {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &TaskSummary) -> bool {
        if let Some(project) = &self.project_id {
            if &task.project_id != project {
                return false;
            }
        }
        if let Some(needle) = &self.title_contains {
            if !task.title.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if !task.status.to_lowercase().contains(&status.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(title: &str, status: &str) -> TaskSummary {
        TaskSummary {
            id: "T1".into(),
            project_id: "p".into(),
            title: title.into(),
            status: status.into(),
            assignee: None,
            priority: None,
        }
    }

    #[test]
    fn filter_combines_conditions() {
        let filter = TaskFilter {
            project_id: Some("p".into()),
            title_contains: Some("login".into()),
            status: Some("DONE".into()),
        };
        assert!(filter.matches(&task("Fix Login page", "done")));
        assert!(!filter.matches(&task("Fix Login page", "todo")));
        assert!(!filter.matches(&task("Signup", "done")));
    }

    #[test]
    fn status_matches_a_substring() {
        let filter = TaskFilter {
            status: Some("Progress".into()),
            ..TaskFilter::for_project("p")
        };
        assert!(filter.matches(&task("Parser", "in_progress")));
        assert!(!filter.matches(&task("Parser", "todo")));
    }
}
