//! History ledger retention.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_HISTORY_MAX_AGE_DAYS, DEFAULT_MAX_ENTRIES_PER_PATTERN};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Record lifecycle events at all. Default: true.
    pub enabled: Option<bool>,
    pub max_age_days: Option<u32>,
    pub max_entries_per_pattern: Option<usize>,
}

impl HistoryConfig {
    pub fn effective_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn effective_max_age_days(&self) -> u32 {
        self.max_age_days.unwrap_or(DEFAULT_HISTORY_MAX_AGE_DAYS)
    }

    pub fn effective_max_entries_per_pattern(&self) -> usize {
        self.max_entries_per_pattern
            .unwrap_or(DEFAULT_MAX_ENTRIES_PER_PATTERN)
    }
}
