//! Storage boundary.
//!
//! The core defines the semantic shape of persisted state; implementations
//! (SQLite in production, in-memory in tests) own the physical layout. All
//! traits are `Send + Sync` so they can be shared as `Arc<dyn ...>` across the
//! supervisor, pipeline workers and query callers.

mod repository;

pub use repository::{
    AccessLogRepository, AssociationRepository, DaemonRecordRepository,
    ProjectSettingsRepository, TaskDirectory,
};
