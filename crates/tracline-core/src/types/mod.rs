//! Domain types.

mod association;
mod daemon;
mod event;
mod history;
mod project;
mod task;

pub use association::{AssociationChanges, FileAssociation};
pub use daemon::{DaemonRecord, DaemonState};
pub use event::{FileAction, FileEvent};
pub use history::{AccessLogEntry, HistoryQuery, NewAccessLogEntry};
pub use project::WatchedProject;
pub use task::{TaskFilter, TaskSummary};
