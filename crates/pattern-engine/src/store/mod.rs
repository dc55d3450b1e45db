//! The pattern entity store.
//!
//! An in-memory index over the storage backend. Writes run as
//! [`StoreTransaction`]s under the index write lock. The staged batch,
//! together with the history events it implies, is committed to the backend
//! in one write and only then folded into the index and the ledger, so a
//! failed commit leaves all three untouched. Observers are notified before
//! the write lock is released, in commit order.

pub mod query;
pub mod transaction;
pub mod update;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use pattern_core::errors::PatternError;
use pattern_core::events::{
    EventDispatcher, PatternApprovedEvent, PatternCreatedEvent, PatternDeletedEvent,
    PatternIgnoredEvent, PatternUpdatedEvent,
};
use pattern_core::tracing::metrics;
use pattern_core::types::{
    LocationKey, Pattern, PatternCandidate, PatternCategory, PatternHistoryEvent,
    PatternLocation, PatternStatus,
};
use pattern_storage::StorageBackend;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;

use crate::history::{record, HistoryLedger};

pub use self::query::{
    run_query, Pagination, PatternFilter, PatternSort, QueryResult, SortDirection, SortField,
};
pub use self::transaction::{CandidateResult, StoreTransaction};
pub use self::update::PatternUpdate;

use self::transaction::Effect;

pub struct PatternStore {
    backend: Arc<dyn StorageBackend>,
    index: RwLock<FxHashMap<String, Pattern>>,
    events: Arc<EventDispatcher>,
    history: Option<Arc<HistoryLedger>>,
    revision: AtomicU64,
}

impl PatternStore {
    /// Open a store over `backend`, loading every pattern into the index.
    pub fn open(
        backend: Arc<dyn StorageBackend>,
        events: Arc<EventDispatcher>,
        history: Option<Arc<HistoryLedger>>,
    ) -> Result<Self, PatternError> {
        let index = load_index(backend.as_ref())?;
        tracing::debug!(patterns = index.len(), "pattern index loaded");
        Ok(Self {
            backend,
            index: RwLock::new(index),
            events,
            history,
            revision: AtomicU64::new(0),
        })
    }

    /// A store with no observers and no history ledger.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Result<Self, PatternError> {
        Self::open(backend, Arc::new(EventDispatcher::new()), None)
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn history(&self) -> Option<&Arc<HistoryLedger>> {
        self.history.as_ref()
    }

    /// Number of committed non-empty batches since the store was opened.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Run `f` as one atomic unit of work.
    ///
    /// The pattern changes and their history events are written in a single
    /// batch. If `f` fails or the backend rejects the batch, nothing is
    /// written and neither the index nor the ledger changes.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, PatternError>
    where
        F: FnOnce(&mut StoreTransaction<'_>) -> Result<T, PatternError>,
    {
        let mut index = self.index.write().await;
        // Storage keeps microseconds; the index must match what a reload sees.
        let now = Utc::now().trunc_subsecs(6);
        let (value, mut changes) = {
            let mut tx = StoreTransaction::new(&index, now);
            let value = f(&mut tx)?;
            (value, tx.into_changes())
        };
        if changes.batch.is_empty() {
            return Ok(value);
        }

        let mut pending = match &self.history {
            Some(ledger) => Some(ledger.stage(now).await),
            None => None,
        };
        if let Some(pending) = pending.as_mut() {
            for effect in &changes.effects {
                for (category, event) in history_events(effect, now) {
                    pending.push(category, event);
                }
            }
            changes.batch.extend(pending.mutations());
        }

        let start = Instant::now();
        self.backend.apply(&changes.batch)?;
        for (id, staged) in changes.staged {
            match staged {
                Some(pattern) => {
                    index.insert(id, pattern);
                }
                None => {
                    index.remove(&id);
                }
            }
        }
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            { metrics::BATCH_SIZE } = changes.batch.len(),
            { metrics::BATCH_WRITE_TIME } = start.elapsed().as_millis() as u64,
            { metrics::STORE_REVISION } = revision,
            "store transaction committed"
        );

        for effect in &changes.effects {
            self.notify(effect);
        }
        if let Some(pending) = pending {
            pending.commit();
        }
        Ok(value)
    }

    fn notify(&self, effect: &Effect) {
        match effect {
            Effect::Created(p) => self.events.emit_pattern_created(&PatternCreatedEvent {
                pattern_id: p.id.clone(),
                category: p.category,
                name: p.name.clone(),
            }),
            Effect::Updated { after, changed, .. } => {
                self.events.emit_pattern_updated(&PatternUpdatedEvent {
                    pattern_id: after.id.clone(),
                    category: after.category,
                    changed_fields: changed.iter().map(|f| f.to_string()).collect(),
                })
            }
            Effect::Deleted(p) => self.events.emit_pattern_deleted(&PatternDeletedEvent {
                pattern_id: p.id.clone(),
                category: p.category,
                location_count: p.location_count,
                outlier_count: p.outlier_count,
            }),
            Effect::Approved { before, user, .. } => {
                self.events.emit_pattern_approved(&PatternApprovedEvent {
                    pattern_id: before.id.clone(),
                    previous_status: before.status,
                    approved_by: user.clone(),
                })
            }
            Effect::Ignored { before, user, .. } => {
                self.events.emit_pattern_ignored(&PatternIgnoredEvent {
                    pattern_id: before.id.clone(),
                    previous_status: before.status,
                    ignored_by: user.clone(),
                })
            }
        }
    }

    // --- Writes ---

    pub async fn add(&self, pattern: Pattern) -> Result<Pattern, PatternError> {
        self.transaction(|tx| tx.add(pattern)).await
    }

    pub async fn update(&self, id: &str, update: PatternUpdate) -> Result<Pattern, PatternError> {
        self.transaction(|tx| tx.update(id, update)).await
    }

    pub async fn delete(&self, id: &str) -> Result<Pattern, PatternError> {
        let removed = self.transaction(|tx| tx.delete(id)).await?;
        tracing::debug!({ metrics::PATTERN_ID } = id, "pattern deleted");
        Ok(removed)
    }

    pub async fn approve(&self, id: &str, user: Option<&str>) -> Result<Pattern, PatternError> {
        self.transaction(|tx| tx.approve(id, user)).await
    }

    pub async fn ignore(&self, id: &str, user: Option<&str>) -> Result<Pattern, PatternError> {
        self.transaction(|tx| tx.ignore(id, user)).await
    }

    pub async fn add_location(
        &self,
        id: &str,
        location: PatternLocation,
    ) -> Result<Pattern, PatternError> {
        self.transaction(|tx| tx.add_location(id, location)).await
    }

    pub async fn remove_location(
        &self,
        id: &str,
        key: &LocationKey,
    ) -> Result<Option<PatternLocation>, PatternError> {
        self.transaction(|tx| tx.remove_location(id, key)).await
    }

    pub async fn upsert_candidate(
        &self,
        candidate: PatternCandidate,
    ) -> Result<CandidateResult, PatternError> {
        self.transaction(|tx| tx.upsert_candidate(candidate)).await
    }

    // --- Reads ---

    pub async fn get(&self, id: &str) -> Option<Pattern> {
        self.index.read().await.get(id).cloned()
    }

    pub async fn get_or_err(&self, id: &str) -> Result<Pattern, PatternError> {
        self.get(id).await.ok_or_else(|| PatternError::not_found(id))
    }

    pub async fn locations(&self, id: &str) -> Result<Vec<PatternLocation>, PatternError> {
        Ok(self.get_or_err(id).await?.locations)
    }

    pub async fn outliers(&self, id: &str) -> Result<Vec<PatternLocation>, PatternError> {
        Ok(self.get_or_err(id).await?.outliers)
    }

    pub async fn query(
        &self,
        filter: &PatternFilter,
        sort: PatternSort,
        page: Pagination,
    ) -> QueryResult {
        let index = self.index.read().await;
        run_query(index.values(), filter, sort, page)
    }

    pub async fn count(&self) -> usize {
        self.index.read().await.len()
    }

    /// Every pattern, ordered by id.
    pub async fn all(&self) -> Vec<Pattern> {
        let index = self.index.read().await;
        let mut patterns: Vec<Pattern> = index.values().cloned().collect();
        patterns.sort_by(|a, b| a.id.cmp(&b.id));
        patterns
    }

    pub async fn by_category(&self, category: PatternCategory) -> Vec<Pattern> {
        self.query(
            &PatternFilter::default().category(category),
            PatternSort::default(),
            Pagination::default(),
        )
        .await
        .patterns
    }

    pub async fn by_status(&self, status: PatternStatus) -> Vec<Pattern> {
        self.query(
            &PatternFilter::default().status(status),
            PatternSort::default(),
            Pagination::default(),
        )
        .await
        .patterns
    }

    /// Rebuild the index from the backend.
    pub async fn reload(&self) -> Result<(), PatternError> {
        let loaded = load_index(self.backend.as_ref())?;
        let mut index = self.index.write().await;
        *index = loaded;
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn load_index(backend: &dyn StorageBackend) -> Result<FxHashMap<String, Pattern>, PatternError> {
    Ok(backend
        .load_patterns()?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect())
}

fn total_locations(p: &Pattern) -> u32 {
    p.location_count + p.outlier_count
}

/// The ledger entries for one committed effect, all stamped `at`.
/// Confidence, location and severity changes get their own event types; any
/// other changed fields are recorded as a single `updated` event.
fn history_events(
    effect: &Effect,
    at: DateTime<Utc>,
) -> Vec<(PatternCategory, PatternHistoryEvent)> {
    match effect {
        Effect::Created(p) => vec![(p.category, record::created(p, None, at))],
        Effect::Updated {
            before,
            after,
            changed,
        } => {
            let (id, category) = (after.id.as_str(), after.category);
            let score_moved = before.confidence.score != after.confidence.score;
            let mut events = Vec::new();
            if changed.contains(&"confidence") && score_moved {
                let (from, to) = (before.confidence.score, after.confidence.score);
                events.push(record::confidence_changed(id, from, to, None, at));
            }
            if changed.contains(&"locations") {
                let (from, to) = (total_locations(before), total_locations(after));
                events.push(record::locations_changed(id, from, to, None, at));
            }
            if changed.contains(&"severity") {
                let (from, to) = (before.severity, after.severity);
                events.push(record::severity_changed(id, from, to, None, at));
            }
            let rest: Vec<&str> = changed
                .iter()
                .copied()
                .filter(|f| match *f {
                    "confidence" => !score_moved,
                    "locations" | "severity" => false,
                    _ => true,
                })
                .collect();
            if !rest.is_empty() {
                events.push(record::updated(id, &rest, None, at));
            }
            events.into_iter().map(|e| (category, e)).collect()
        }
        Effect::Deleted(p) => vec![(p.category, record::deleted(p, None, at))],
        Effect::Approved { before, user, .. } => {
            let event = record::approved(&before.id, before.status, user.as_deref(), at);
            vec![(before.category, event)]
        }
        Effect::Ignored { before, user, .. } => {
            let event = record::ignored(&before.id, before.status, user.as_deref(), at);
            vec![(before.category, event)]
        }
    }
}
