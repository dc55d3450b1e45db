//! History ledger records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pattern::PatternCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    Created,
    Updated,
    Approved,
    Ignored,
    Deleted,
    ConfidenceChanged,
    LocationsChanged,
    SeverityChanged,
}

impl HistoryEventType {
    pub const ALL: [HistoryEventType; 8] = [
        Self::Created,
        Self::Updated,
        Self::Approved,
        Self::Ignored,
        Self::Deleted,
        Self::ConfidenceChanged,
        Self::LocationsChanged,
        Self::SeverityChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Approved => "approved",
            Self::Ignored => "ignored",
            Self::Deleted => "deleted",
            Self::ConfidenceChanged => "confidence_changed",
            Self::LocationsChanged => "locations_changed",
            Self::SeverityChanged => "severity_changed",
        }
    }
}

impl fmt::Display for HistoryEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown history event type: {s}"))
    }
}

/// One immutable entry in a pattern's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternHistoryEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub pattern_id: String,
    #[serde(rename = "type")]
    pub event_type: HistoryEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl PatternHistoryEvent {
    pub fn new(
        pattern_id: impl Into<String>,
        event_type: HistoryEventType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp,
            pattern_id: pattern_id.into(),
            event_type,
            user: None,
            previous_value: None,
            new_value: None,
            details: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_values(
        mut self,
        previous: Option<serde_json::Value>,
        new: Option<serde_json::Value>,
    ) -> Self {
        self.previous_value = previous;
        self.new_value = new;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The audit trail for one pattern id. Outlives the pattern itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternHistory {
    pub pattern_id: String,
    pub category: PatternCategory,
    pub events: Vec<PatternHistoryEvent>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl PatternHistory {
    pub fn new(
        pattern_id: impl Into<String>,
        category: PatternCategory,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            category,
            events: Vec::new(),
            created_at: now,
            last_modified: now,
        }
    }
}
