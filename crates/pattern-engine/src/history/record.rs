//! Event shapes for the ledger's standard recorders.

use chrono::{DateTime, Utc};
use pattern_core::types::{
    HistoryEventType, Pattern, PatternHistoryEvent, PatternStatus, Severity,
};
use serde_json::json;

/// Optional payload for [`HistoryLedger::record_event`](super::HistoryLedger::record_event).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordOptions {
    pub user: Option<String>,
    pub previous_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub details: Option<serde_json::Value>,
}

impl RecordOptions {
    pub fn by(user: Option<&str>) -> Self {
        Self {
            user: user.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn values(mut self, previous: serde_json::Value, new: serde_json::Value) -> Self {
        self.previous_value = Some(previous);
        self.new_value = Some(new);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

pub fn event(
    pattern_id: &str,
    event_type: HistoryEventType,
    at: DateTime<Utc>,
    options: RecordOptions,
) -> PatternHistoryEvent {
    let mut event = PatternHistoryEvent::new(pattern_id, event_type, at)
        .with_values(options.previous_value, options.new_value);
    event.user = options.user;
    event.details = options.details;
    event
}

pub fn created(pattern: &Pattern, user: Option<&str>, at: DateTime<Utc>) -> PatternHistoryEvent {
    let options = RecordOptions::by(user).details(json!({
        "name": pattern.name,
        "confidence": pattern.confidence.score,
        "severity": pattern.severity,
        "locations": pattern.location_count,
        "outliers": pattern.outlier_count,
    }));
    event(&pattern.id, HistoryEventType::Created, at, options)
}

pub fn updated(
    pattern_id: &str,
    changed_fields: &[&str],
    user: Option<&str>,
    at: DateTime<Utc>,
) -> PatternHistoryEvent {
    let options = RecordOptions::by(user).details(json!({ "changedFields": changed_fields }));
    event(pattern_id, HistoryEventType::Updated, at, options)
}

pub fn approved(
    pattern_id: &str,
    previous_status: PatternStatus,
    user: Option<&str>,
    at: DateTime<Utc>,
) -> PatternHistoryEvent {
    let options =
        RecordOptions::by(user).values(json!(previous_status), json!(PatternStatus::Approved));
    event(pattern_id, HistoryEventType::Approved, at, options)
}

pub fn ignored(
    pattern_id: &str,
    previous_status: PatternStatus,
    user: Option<&str>,
    at: DateTime<Utc>,
) -> PatternHistoryEvent {
    let options =
        RecordOptions::by(user).values(json!(previous_status), json!(PatternStatus::Ignored));
    event(pattern_id, HistoryEventType::Ignored, at, options)
}

/// The deleted pattern's last state goes into `previous_value`.
pub fn deleted(pattern: &Pattern, user: Option<&str>, at: DateTime<Utc>) -> PatternHistoryEvent {
    let mut options = RecordOptions::by(user);
    options.previous_value = Some(json!({
        "name": pattern.name,
        "status": pattern.status,
        "confidence": pattern.confidence.score,
        "locations": pattern.location_count,
        "outliers": pattern.outlier_count,
    }));
    event(&pattern.id, HistoryEventType::Deleted, at, options)
}

pub fn confidence_changed(
    pattern_id: &str,
    previous: f64,
    current: f64,
    user: Option<&str>,
    at: DateTime<Utc>,
) -> PatternHistoryEvent {
    let options = RecordOptions::by(user)
        .values(json!(previous), json!(current))
        .details(json!({ "delta": current - previous }));
    event(pattern_id, HistoryEventType::ConfidenceChanged, at, options)
}

pub fn locations_changed(
    pattern_id: &str,
    previous_count: u32,
    current_count: u32,
    user: Option<&str>,
    at: DateTime<Utc>,
) -> PatternHistoryEvent {
    let options = RecordOptions::by(user)
        .values(json!(previous_count), json!(current_count))
        .details(json!({
            "added": current_count.saturating_sub(previous_count),
            "removed": previous_count.saturating_sub(current_count),
        }));
    event(pattern_id, HistoryEventType::LocationsChanged, at, options)
}

pub fn severity_changed(
    pattern_id: &str,
    previous: Severity,
    current: Severity,
    user: Option<&str>,
    at: DateTime<Utc>,
) -> PatternHistoryEvent {
    let options = RecordOptions::by(user).values(json!(previous), json!(current));
    event(pattern_id, HistoryEventType::SeverityChanged, at, options)
}
