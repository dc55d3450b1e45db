//! Retention for history events.

use chrono::{DateTime, Duration, Utc};
use pattern_core::config::HistoryConfig;
use pattern_core::types::PatternHistory;

/// Resolved retention limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age_days: u32,
    pub max_entries_per_pattern: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

impl From<&HistoryConfig> for RetentionPolicy {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            max_age_days: config.effective_max_age_days(),
            max_entries_per_pattern: config.effective_max_entries_per_pattern(),
        }
    }
}

impl RetentionPolicy {
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.max_age_days))
    }
}

/// Drop events older than the age cutoff, then the oldest events beyond the
/// per-pattern cap. Returns the number of events removed.
pub fn prune_history(
    history: &mut PatternHistory,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> usize {
    let before = history.events.len();
    let cutoff = policy.cutoff(now);
    history.events.retain(|e| e.timestamp >= cutoff);

    if history.events.len() > policy.max_entries_per_pattern {
        history.events.sort_by_key(|e| e.timestamp);
        let excess = history.events.len() - policy.max_entries_per_pattern;
        history.events.drain(..excess);
    }
    before - history.events.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pattern_core::types::{HistoryEventType, PatternCategory, PatternHistoryEvent};

    fn history(ages_days: &[i64], now: DateTime<Utc>) -> PatternHistory {
        let mut h = PatternHistory::new("p1", PatternCategory::Api, now);
        for age in ages_days {
            h.events.push(PatternHistoryEvent::new(
                "p1",
                HistoryEventType::Updated,
                now - Duration::days(*age),
            ));
        }
        h
    }

    #[test]
    fn age_then_count() {
        let now = Utc::now();
        let policy = RetentionPolicy {
            max_age_days: 30,
            max_entries_per_pattern: 2,
        };
        let mut h = history(&[45, 20, 10, 5, 1], now);
        let keep: Vec<String> = h.events[3..].iter().map(|e| e.id.clone()).collect();

        assert_eq!(prune_history(&mut h, &policy, now), 3);
        let ids: Vec<String> = h.events.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, keep);
    }

    #[test]
    fn pruning_is_idempotent() {
        let now = Utc::now();
        let policy = RetentionPolicy {
            max_age_days: 7,
            max_entries_per_pattern: 10,
        };
        let mut h = history(&[9, 3], now);
        assert_eq!(prune_history(&mut h, &policy, now), 1);
        assert_eq!(prune_history(&mut h, &policy, now), 0);
        assert_eq!(h.events.len(), 1);
    }
}
