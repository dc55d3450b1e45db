//! Event payload types.

use chrono::NaiveDate;

use crate::types::{HistoryEventType, PatternCategory, PatternStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct PatternCreatedEvent {
    pub pattern_id: String,
    pub category: PatternCategory,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternUpdatedEvent {
    pub pattern_id: String,
    pub category: PatternCategory,
    /// Names of the fields that changed, e.g. `confidence`, `locations`.
    pub changed_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternDeletedEvent {
    pub pattern_id: String,
    pub category: PatternCategory,
    pub location_count: u32,
    pub outlier_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternApprovedEvent {
    pub pattern_id: String,
    pub previous_status: PatternStatus,
    pub approved_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternIgnoredEvent {
    pub pattern_id: String,
    pub previous_status: PatternStatus,
    pub ignored_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecordedEvent {
    pub pattern_id: String,
    pub event_id: String,
    pub event_type: HistoryEventType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPrunedEvent {
    pub events_removed: usize,
    pub histories_removed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotCreatedEvent {
    pub date: NaiveDate,
    pub total_patterns: u32,
    pub overall_compliance_rate: f64,
    pub snapshots_evicted: usize,
}
