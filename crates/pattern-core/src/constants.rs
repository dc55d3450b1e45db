//! Shared constants for the pattern lifecycle engine.

/// Engine version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Project-relative directory holding the store and its configuration.
pub const DRIFT_DIR: &str = ".drift";

/// Database file name for the SQLite backend.
pub const PATTERNS_DB_FILE: &str = "patterns.db";

/// Project config file name inside `.drift/`.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";

/// User config file name inside `~/.drift/`.
pub const USER_CONFIG_FILE: &str = "patterns.toml";

/// Default busy timeout for write lock contention (milliseconds).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default number of read-only connections for file-backed databases.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// History events older than this are pruned.
pub const DEFAULT_HISTORY_MAX_AGE_DAYS: u32 = 90;

/// Maximum events kept per pattern history.
pub const DEFAULT_MAX_ENTRIES_PER_PATTERN: usize = 100;

/// Snapshots retained before the oldest are deleted.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 30;

/// Violation count used by escalation rules that omit `after_count`.
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 10;

/// Relative confidence change that classifies a trend.
pub const DEFAULT_CONFIDENCE_REGRESSION_THRESHOLD: f64 = 0.15;

/// Relative confidence drop at which a regression becomes critical.
pub const DEFAULT_CONFIDENCE_CRITICAL_DROP: f64 = 0.20;

/// Absolute compliance-rate rise that classifies an improvement.
pub const DEFAULT_COMPLIANCE_IMPROVEMENT_THRESHOLD: f64 = 0.10;

/// Absolute compliance-rate drop that classifies a regression.
pub const DEFAULT_COMPLIANCE_REGRESSION_THRESHOLD: f64 = 0.10;

/// Relative outlier increase that classifies a regression.
pub const DEFAULT_OUTLIER_INCREASE_RATIO: f64 = 0.5;

/// Absolute outlier increase that counts when the previous count was zero.
pub const DEFAULT_OUTLIER_MIN_INCREASE: u32 = 3;

/// Confidence level boundaries.
pub const CONFIDENCE_HIGH_THRESHOLD: f64 = 0.85;
pub const CONFIDENCE_MEDIUM_THRESHOLD: f64 = 0.70;
pub const CONFIDENCE_LOW_THRESHOLD: f64 = 0.50;

/// Days after which the age signal saturates in `ConfidenceScorer`.
pub const DEFAULT_CONFIDENCE_AGE_HORIZON_DAYS: f64 = 30.0;
