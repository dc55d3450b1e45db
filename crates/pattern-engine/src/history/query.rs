//! History event queries.

use chrono::{DateTime, Utc};
use pattern_core::types::{HistoryEventType, PatternCategory, PatternHistoryEvent};
use serde::{Deserialize, Serialize};

/// Event filter. List fields match any of their values; `after` and
/// `before` are exclusive bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryQuery {
    pub pattern_ids: Vec<String>,
    pub event_types: Vec<HistoryEventType>,
    pub categories: Vec<PatternCategory>,
    pub user: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn pattern(mut self, id: impl Into<String>) -> Self {
        self.pattern_ids.push(id.into());
        self
    }

    pub fn event_type(mut self, event_type: HistoryEventType) -> Self {
        self.event_types.push(event_type);
        self
    }

    pub fn category(mut self, category: PatternCategory) -> Self {
        self.categories.push(category);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn after(mut self, after: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self
    }

    pub fn before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, category: PatternCategory, event: &PatternHistoryEvent) -> bool {
        (self.pattern_ids.is_empty() || self.pattern_ids.contains(&event.pattern_id))
            && (self.event_types.is_empty() || self.event_types.contains(&event.event_type))
            && (self.categories.is_empty() || self.categories.contains(&category))
            && self
                .user
                .as_ref()
                .map_or(true, |u| event.user.as_ref() == Some(u))
            && self.after.map_or(true, |t| event.timestamp > t)
            && self.before.map_or(true, |t| event.timestamp < t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQueryResult {
    /// Newest first.
    pub events: Vec<PatternHistoryEvent>,
    pub total: usize,
    pub has_more: bool,
    pub execution_time_ms: u64,
}
