//! Domain types shared by the storage and engine crates.

pub mod change;
pub mod confidence;
pub mod history;
pub mod pattern;
pub mod severity;
pub mod snapshot;

pub use change::{ChangeOperation, ChangeRecord};
pub use confidence::{
    clamp_score, ConfidenceInfo, ConfidenceLevel, ConfidenceScorer, ConfidenceWeights,
};
pub use history::{HistoryEventType, PatternHistory, PatternHistoryEvent};
pub use pattern::{
    compliance_rate, derive_pattern_id, DetectorDescriptor, DetectorType, LocationKey, Pattern,
    PatternCandidate, PatternCategory, PatternLocation, PatternMetadata, PatternStatus,
};
pub use severity::{
    builtin_category_default, compare_severity, EscalationConfig, EscalationRule, Severity,
    SeverityConfig,
};
pub use snapshot::{
    CategorySummary, PatternSummary, PatternTrend, Snapshot, SnapshotSummary, TrendMetric,
    TrendSeverity, TrendType,
};
