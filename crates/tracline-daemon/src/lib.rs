//! TracLine Monitor Daemon
//!
//! Runtime side of the file monitor: per-project watch workers, the
//! supervisor that claims and heals daemon records, the reference-counted
//! association store, the access history log and the traceability queries.
//!
//! ```text
//! Supervisor ──start──▶ MonitorWorker ──FileEvent──▶ AssociationStore ─┐
//!     │                                         └──▶ AccessHistoryLog  │
//!     └── DaemonRecord (CAS)                TraceService / Query ◀─────┘
//! ```

pub mod history;
pub mod process;
pub mod query;
pub mod repositories;
pub mod retry;
pub mod service;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use history::AccessHistoryLog;
pub use process::{send_signal, ProcessProbe, StopSignal, SystemProbe};
pub use query::{
    FileReference, MatrixRequest, MatrixSummary, TraceabilityMatrix, TraceabilityQueryEngine,
    DEFAULT_TOP_K,
};
pub use repositories::Repositories;
pub use retry::RetryPolicy;
pub use service::{ExtensionStat, FileDetail, FileStat, FileStatsReport, FileTrace, TraceEntry, TraceService};
pub use store::{AddOutcome, AssociationStore, EventOutcome, RemoveOutcome};
pub use supervisor::{AdapterFactory, ProjectStatus, StartRequest, StopOutcome, Supervisor};
pub use worker::{MonitorWorker, PipelineStats, StopReport, WorkerSpec};
