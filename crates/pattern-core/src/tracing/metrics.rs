//! Structured span field names shared across the storage and engine crates.

/// Storage: number of mutations in a committed batch.
pub const BATCH_SIZE: &str = "batch_size";

/// Storage: batch commit time in milliseconds.
pub const BATCH_WRITE_TIME: &str = "batch_write_time";

/// Storage: backend kind (`sqlite` or `json`).
pub const BACKEND: &str = "backend";

/// Store: pattern identifier.
pub const PATTERN_ID: &str = "pattern_id";

/// Store: index revision after a commit.
pub const STORE_REVISION: &str = "store_revision";

/// History: events removed by a prune pass.
pub const HISTORY_EVENTS_PRUNED: &str = "history_events_pruned";

/// History: query execution time in milliseconds.
pub const HISTORY_QUERY_TIME: &str = "history_query_time";

/// Snapshots: snapshot date.
pub const SNAPSHOT_DATE: &str = "snapshot_date";

/// Snapshots: trends detected between two captures.
pub const TREND_COUNT: &str = "trend_count";
