//! Append-only history ledger.
//!
//! Histories are held in memory and written through to the backend. Store
//! transactions stage their events into the same batch as the pattern
//! change (see [`PendingHistory`]); direct appends write on their own, and a
//! history whose write failed stays dirty until the next successful write
//! or [`HistoryLedger::flush`].

mod pending;
pub mod prune;
pub mod query;
pub mod record;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use pattern_core::errors::{HistoryError, StorageError};
use pattern_core::events::{EventDispatcher, HistoryPrunedEvent, HistoryRecordedEvent};
use pattern_core::tracing::metrics;
use pattern_core::types::{
    HistoryEventType, Pattern, PatternCategory, PatternHistory, PatternHistoryEvent,
    PatternStatus, Severity,
};
use pattern_storage::{Mutation, StorageBackend, WriteBatch};
use serde::Serialize;
use tokio::sync::Mutex;

pub(crate) use self::pending::PendingHistory;
pub use self::prune::{prune_history, RetentionPolicy};
pub use self::query::{HistoryQuery, HistoryQueryResult};
pub use self::record::RecordOptions;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub events_removed: usize,
    pub histories_removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub histories: usize,
    pub events: usize,
    pub by_event_type: BTreeMap<String, usize>,
    pub oldest_event: Option<DateTime<Utc>>,
    pub newest_event: Option<DateTime<Utc>>,
    pub dirty: usize,
}

#[derive(Default)]
struct LedgerState {
    histories: BTreeMap<String, PatternHistory>,
    /// Pattern ids whose in-memory history has not reached the backend.
    dirty: BTreeSet<String>,
}

pub struct HistoryLedger {
    backend: Arc<dyn StorageBackend>,
    policy: RetentionPolicy,
    events: Arc<EventDispatcher>,
    state: Mutex<LedgerState>,
}

impl HistoryLedger {
    /// Load every stored history.
    pub fn open(
        backend: Arc<dyn StorageBackend>,
        policy: RetentionPolicy,
        events: Arc<EventDispatcher>,
    ) -> Result<Self, HistoryError> {
        let histories = load(backend.as_ref())?;
        Ok(Self {
            backend,
            policy,
            events,
            state: Mutex::new(LedgerState {
                histories,
                dirty: BTreeSet::new(),
            }),
        })
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Append a new event stamped now.
    pub async fn record_event(
        &self,
        pattern_id: &str,
        category: PatternCategory,
        event_type: HistoryEventType,
        options: RecordOptions,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        let event = record::event(pattern_id, event_type, Utc::now(), options);
        self.append(category, event).await
    }

    /// Lock the ledger and start staging appends for a store transaction.
    pub(crate) async fn stage(&self, now: DateTime<Utc>) -> PendingHistory<'_> {
        PendingHistory::new(self, self.state.lock().await, now)
    }

    /// Append a pre-built event, keeping the history in timestamp order.
    ///
    /// The event is kept in memory even when the write fails; the history
    /// stays dirty and the storage error is returned.
    pub async fn append(
        &self,
        category: PatternCategory,
        event: PatternHistoryEvent,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        let now = Utc::now();
        let pattern_id = event.pattern_id.clone();
        let mut state = self.state.lock().await;

        let history = state
            .histories
            .entry(pattern_id.clone())
            .or_insert_with(|| PatternHistory::new(pattern_id.clone(), category, event.timestamp));
        let pruned = insert_event(history, event.clone(), &self.policy, now);
        let emptied = history.events.is_empty();
        if emptied {
            state.histories.remove(&pattern_id);
        }
        state.dirty.insert(pattern_id.clone());
        let persisted = self.persist(&mut state);
        drop(state);

        self.events.emit_history_recorded(&HistoryRecordedEvent {
            pattern_id,
            event_id: event.id.clone(),
            event_type: event.event_type,
        });
        if pruned > 0 {
            self.events.emit_history_pruned(&HistoryPrunedEvent {
                events_removed: pruned,
                histories_removed: usize::from(emptied),
            });
        }
        persisted?;
        Ok(event)
    }

    /// Write every dirty history in one batch. On success the dirty set is
    /// cleared; on failure it is left as is.
    fn persist(&self, state: &mut LedgerState) -> Result<usize, StorageError> {
        if state.dirty.is_empty() {
            return Ok(0);
        }
        let batch: WriteBatch = state
            .dirty
            .iter()
            .map(|id| match state.histories.get(id) {
                Some(history) => Mutation::PutHistory(history.clone()),
                None => Mutation::DeleteHistory {
                    pattern_id: id.clone(),
                },
            })
            .collect();
        match self.backend.apply(&batch) {
            Ok(()) => {
                let written = state.dirty.len();
                state.dirty.clear();
                Ok(written)
            }
            Err(e) => {
                tracing::warn!(
                    dirty = state.dirty.len(),
                    error = %e,
                    "history write deferred"
                );
                Err(e)
            }
        }
    }

    /// Retry persistence of dirty histories. Returns how many were written.
    pub async fn flush(&self) -> Result<usize, HistoryError> {
        let mut state = self.state.lock().await;
        Ok(self.persist(&mut state)?)
    }

    pub async fn is_dirty(&self) -> bool {
        !self.state.lock().await.dirty.is_empty()
    }

    /// Replace the in-memory ledger with what the backend holds. Unflushed
    /// changes are discarded.
    pub async fn reload(&self) -> Result<(), HistoryError> {
        let histories = load(self.backend.as_ref())?;
        let mut state = self.state.lock().await;
        state.histories = histories;
        state.dirty.clear();
        Ok(())
    }

    /// Apply retention to every history.
    pub async fn prune(&self) -> Result<PruneReport, HistoryError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let mut report = PruneReport::default();

        let LedgerState { histories, dirty } = &mut *state;
        histories.retain(|id, history| {
            let removed = prune_history(history, &self.policy, now);
            if removed > 0 {
                report.events_removed += removed;
                dirty.insert(id.clone());
            }
            if history.events.is_empty() {
                report.histories_removed += 1;
                dirty.insert(id.clone());
                false
            } else {
                true
            }
        });
        self.persist(&mut state)?;
        drop(state);

        if report.events_removed > 0 || report.histories_removed > 0 {
            tracing::info!(
                { metrics::HISTORY_EVENTS_PRUNED } = report.events_removed,
                histories_removed = report.histories_removed,
                "pruned history"
            );
            self.events.emit_history_pruned(&HistoryPrunedEvent {
                events_removed: report.events_removed,
                histories_removed: report.histories_removed,
            });
        }
        Ok(report)
    }

    pub async fn history(&self, pattern_id: &str) -> Result<PatternHistory, HistoryError> {
        self.state
            .lock()
            .await
            .histories
            .get(pattern_id)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound {
                pattern_id: pattern_id.to_string(),
            })
    }

    /// Remove a pattern's history entirely. Returns `false` when there was
    /// none.
    pub async fn delete_history(&self, pattern_id: &str) -> Result<bool, HistoryError> {
        let mut state = self.state.lock().await;
        if state.histories.remove(pattern_id).is_none() {
            return Ok(false);
        }
        state.dirty.insert(pattern_id.to_string());
        self.persist(&mut state)?;
        Ok(true)
    }

    pub async fn query(&self, query: &HistoryQuery) -> HistoryQueryResult {
        let start = Instant::now();
        let state = self.state.lock().await;
        let mut matched: Vec<&PatternHistoryEvent> = state
            .histories
            .values()
            .flat_map(|h| h.events.iter().map(move |e| (h.category, e)))
            .filter(|(category, e)| query.matches(*category, e))
            .map(|(_, e)| e)
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        let total = matched.len();
        let has_more = query
            .limit
            .is_some_and(|limit| query.offset.saturating_add(limit) < total);
        let events = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            total,
            { metrics::HISTORY_QUERY_TIME } = execution_time_ms,
            "history query"
        );
        HistoryQueryResult {
            events,
            total,
            has_more,
            execution_time_ms,
        }
    }

    /// The newest `limit` events across all patterns.
    pub async fn recent_events(&self, limit: usize) -> Vec<PatternHistoryEvent> {
        self.query(&HistoryQuery::default().page(0, limit)).await.events
    }

    pub async fn stats(&self) -> HistoryStats {
        let state = self.state.lock().await;
        let mut stats = HistoryStats {
            histories: state.histories.len(),
            dirty: state.dirty.len(),
            ..HistoryStats::default()
        };
        for event in state.histories.values().flat_map(|h| h.events.iter()) {
            stats.events += 1;
            *stats
                .by_event_type
                .entry(event.event_type.as_str().to_string())
                .or_default() += 1;
            let at = event.timestamp;
            stats.oldest_event = Some(stats.oldest_event.map_or(at, |t| t.min(at)));
            stats.newest_event = Some(stats.newest_event.map_or(at, |t| t.max(at)));
        }
        stats
    }

    // --- Recorders ---

    pub async fn record_created(
        &self,
        pattern: &Pattern,
        user: Option<&str>,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        self.append(pattern.category, record::created(pattern, user, Utc::now()))
            .await
    }

    pub async fn record_updated(
        &self,
        pattern_id: &str,
        category: PatternCategory,
        changed_fields: &[&str],
        user: Option<&str>,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        self.append(category, record::updated(pattern_id, changed_fields, user, Utc::now()))
            .await
    }

    pub async fn record_approved(
        &self,
        pattern_id: &str,
        category: PatternCategory,
        previous_status: PatternStatus,
        user: Option<&str>,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        self.append(category, record::approved(pattern_id, previous_status, user, Utc::now()))
            .await
    }

    pub async fn record_ignored(
        &self,
        pattern_id: &str,
        category: PatternCategory,
        previous_status: PatternStatus,
        user: Option<&str>,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        self.append(category, record::ignored(pattern_id, previous_status, user, Utc::now()))
            .await
    }

    pub async fn record_deleted(
        &self,
        pattern: &Pattern,
        user: Option<&str>,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        self.append(pattern.category, record::deleted(pattern, user, Utc::now()))
            .await
    }

    pub async fn record_confidence_changed(
        &self,
        pattern_id: &str,
        category: PatternCategory,
        previous: f64,
        current: f64,
        user: Option<&str>,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        let event = record::confidence_changed(pattern_id, previous, current, user, Utc::now());
        self.append(category, event).await
    }

    pub async fn record_locations_changed(
        &self,
        pattern_id: &str,
        category: PatternCategory,
        previous_count: u32,
        current_count: u32,
        user: Option<&str>,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        let event =
            record::locations_changed(pattern_id, previous_count, current_count, user, Utc::now());
        self.append(category, event).await
    }

    pub async fn record_severity_changed(
        &self,
        pattern_id: &str,
        category: PatternCategory,
        previous: Severity,
        current: Severity,
        user: Option<&str>,
    ) -> Result<PatternHistoryEvent, HistoryError> {
        let event = record::severity_changed(pattern_id, previous, current, user, Utc::now());
        self.append(category, event).await
    }
}

/// Insert `event` in timestamp order and apply retention. Returns how many
/// events retention removed.
fn insert_event(
    history: &mut PatternHistory,
    event: PatternHistoryEvent,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> usize {
    let at = history
        .events
        .partition_point(|e| e.timestamp <= event.timestamp);
    history.last_modified = history.last_modified.max(now).max(event.timestamp);
    history.created_at = history.created_at.min(event.timestamp);
    history.events.insert(at, event);
    prune_history(history, policy, now)
}

fn load(backend: &dyn StorageBackend) -> Result<BTreeMap<String, PatternHistory>, StorageError> {
    Ok(backend
        .load_histories()?
        .into_iter()
        .map(|h| (h.pattern_id.clone(), h))
        .collect())
}
