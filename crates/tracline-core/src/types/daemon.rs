//! Per-project monitor lifecycle record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle state of a project's monitor.
///
/// `Stopped` and `Crashed` both accept a fresh start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    #[default]
    Stopped,
    Starting,
    Running,
    Crashed,
}

impl DaemonState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonState::Stopped => "stopped",
            DaemonState::Starting => "starting",
            DaemonState::Running => "running",
            DaemonState::Crashed => "crashed",
        }
    }

    /// States that hold the per-project mutual exclusion.
    pub fn is_active(&self) -> bool {
        matches!(self, DaemonState::Starting | DaemonState::Running)
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaemonState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(DaemonState::Stopped),
            "starting" => Ok(DaemonState::Starting),
            "running" => Ok(DaemonState::Running),
            "crashed" => Ok(DaemonState::Crashed),
            other => Err(CoreError::invalid_input(format!(
                "unknown daemon state '{}'",
                other
            ))),
        }
    }
}

/// One record per project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonRecord {
    pub project_id: String,
    pub pid: Option<u32>,
    pub state: DaemonState,
    pub start_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DaemonRecord {
    pub fn starting(project_id: impl Into<String>, pid: u32) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            pid: Some(pid),
            state: DaemonState::Starting,
            start_time: Some(now),
            updated_at: now,
        }
    }

    /// Copy of this record moved to `state`.
    pub fn transitioned(&self, state: DaemonState) -> Self {
        let mut next = self.clone();
        next.state = state;
        next.updated_at = Utc::now();
        if state == DaemonState::Stopped {
            next.pid = None;
        }
        next
    }

    /// True when `other` has the same state and PID, the fields a
    /// compare-and-swap checks.
    pub fn same_claim(&self, other: &DaemonRecord) -> bool {
        self.state == other.state && self.pid == other.pid
    }
}
