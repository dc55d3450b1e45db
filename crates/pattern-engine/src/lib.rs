//! Pattern lifecycle engine: the entity store with its approval state
//! machine, the history ledger, daily snapshots with trend detection, and
//! severity resolution with count-based escalation.

pub mod history;
pub mod severity;
pub mod snapshots;
pub mod store;
pub mod workspace;

pub use history::{
    HistoryLedger, HistoryQuery, HistoryQueryResult, HistoryStats, PruneReport, RecordOptions,
    RetentionPolicy,
};
pub use severity::{SeverityEngine, SeveritySummary, ViolationCounters};
pub use snapshots::{SnapshotEngine, TrendDirection, TrendReport, TrendSummary};
pub use store::{
    CandidateResult, Pagination, PatternFilter, PatternSort, PatternStore, PatternUpdate,
    QueryResult, SortDirection, SortField, StoreTransaction,
};
pub use workspace::{MaintenanceReport, PatternWorkspace};
