//! History ledger: retention, queries, deferred persistence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use pattern_core::config::BackendKind;
use pattern_core::errors::{HistoryError, StorageError};
use pattern_core::events::{ChannelEventHandler, EventDispatcher, LifecycleEvent};
use pattern_core::types::{
    ChangeRecord, HistoryEventType, Pattern, PatternCategory, PatternHistory, PatternHistoryEvent,
    SeverityConfig, Snapshot,
};
use pattern_engine::history::{HistoryLedger, HistoryQuery, RecordOptions, RetentionPolicy};
use pattern_storage::{SqliteBackend, StorageBackend, WriteBatch};

fn backend() -> Arc<dyn StorageBackend> {
    Arc::new(SqliteBackend::open_in_memory().unwrap())
}

fn ledger(backend: Arc<dyn StorageBackend>, max_entries: usize) -> HistoryLedger {
    let policy = RetentionPolicy {
        max_age_days: 90,
        max_entries_per_pattern: max_entries,
    };
    HistoryLedger::open(backend, policy, Arc::new(EventDispatcher::new())).unwrap()
}

fn event(
    pattern_id: &str,
    event_type: HistoryEventType,
    at: DateTime<Utc>,
) -> PatternHistoryEvent {
    PatternHistoryEvent::new(pattern_id, event_type, at)
}

/// Delegates to SQLite but refuses writes while `failing` is set.
struct FlakyBackend {
    inner: SqliteBackend,
    failing: AtomicBool,
}

impl StorageBackend for FlakyBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }
    fn apply(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::DbBusy {
                operation: "apply".to_string(),
            });
        }
        self.inner.apply(batch)
    }
    fn load_patterns(&self) -> Result<Vec<Pattern>, StorageError> {
        self.inner.load_patterns()
    }
    fn load_pattern(&self, id: &str) -> Result<Option<Pattern>, StorageError> {
        self.inner.load_pattern(id)
    }
    fn load_histories(&self) -> Result<Vec<PatternHistory>, StorageError> {
        self.inner.load_histories()
    }
    fn load_snapshot(&self, date: NaiveDate) -> Result<Option<Snapshot>, StorageError> {
        self.inner.load_snapshot(date)
    }
    fn snapshot_dates(&self) -> Result<Vec<NaiveDate>, StorageError> {
        self.inner.snapshot_dates()
    }
    fn load_severity_config(&self) -> Result<Option<SeverityConfig>, StorageError> {
        self.inner.load_severity_config()
    }
    fn unsynced_changes(&self, limit: usize) -> Result<Vec<ChangeRecord>, StorageError> {
        self.inner.unsynced_changes(limit)
    }
    fn mark_synced(&self, ids: &[i64]) -> Result<usize, StorageError> {
        self.inner.mark_synced(ids)
    }
    fn prune_synced(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        self.inner.prune_synced(before)
    }
    fn schema_version(&self) -> Result<u32, StorageError> {
        self.inner.schema_version()
    }
    fn integrity_check(&self) -> Result<Vec<String>, StorageError> {
        self.inner.integrity_check()
    }
}

// ── Retention ───────────────────────────────────────────────────────────

#[tokio::test]
async fn pruning_to_three_keeps_the_most_recent() {
    let ledger = ledger(backend(), 3);
    let now = Utc::now();
    let mut ids = Vec::new();
    for minutes in [50, 40, 30, 20, 10] {
        let e = ledger
            .append(
                PatternCategory::Api,
                event("p1", HistoryEventType::Updated, now - Duration::minutes(minutes)),
            )
            .await
            .unwrap();
        ids.push(e.id);
    }

    let history = ledger.history("p1").await.unwrap();
    let kept: Vec<String> = history.events.iter().map(|e| e.id.clone()).collect();
    assert_eq!(kept, ids[2..].to_vec());
}

#[tokio::test]
async fn expired_events_are_pruned_and_empty_histories_removed() {
    let backend = backend();
    let ledger = ledger(backend.clone(), 100);
    let now = Utc::now();
    ledger
        .append(PatternCategory::Api, event("fresh", HistoryEventType::Created, now))
        .await
        .unwrap();

    // Appending an already expired event prunes it straight away, leaving
    // nothing behind.
    ledger
        .append(
            PatternCategory::Api,
            event("stale", HistoryEventType::Created, now - Duration::days(91)),
        )
        .await
        .unwrap();
    assert!(matches!(
        ledger.history("stale").await,
        Err(HistoryError::NotFound { .. })
    ));

    let report = ledger.prune().await.unwrap();
    assert_eq!(report.events_removed, 0);
    let stored: Vec<String> = backend
        .load_histories()
        .unwrap()
        .into_iter()
        .map(|h| h.pattern_id)
        .collect();
    assert_eq!(stored, vec!["fresh".to_string()]);
}

#[tokio::test]
async fn prune_on_demand_applies_to_stored_histories() {
    let backend = backend();
    let now = Utc::now();
    let mut old = PatternHistory::new("p1", PatternCategory::Auth, now - Duration::days(200));
    old.events.push(event("p1", HistoryEventType::Created, now - Duration::days(200)));
    old.events.push(event("p1", HistoryEventType::Approved, now - Duration::days(1)));
    let mut gone = PatternHistory::new("p2", PatternCategory::Auth, now - Duration::days(200));
    gone.events.push(event("p2", HistoryEventType::Created, now - Duration::days(150)));
    backend
        .apply(&WriteBatch::from(vec![
            pattern_storage::Mutation::PutHistory(old),
            pattern_storage::Mutation::PutHistory(gone),
        ]))
        .unwrap();

    let (handler, rx) = ChannelEventHandler::new();
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(Arc::new(handler));
    let ledger =
        HistoryLedger::open(backend.clone(), RetentionPolicy::default(), Arc::new(dispatcher))
            .unwrap();

    let report = ledger.prune().await.unwrap();
    assert_eq!(report.events_removed, 2);
    assert_eq!(report.histories_removed, 1);
    assert_eq!(ledger.prune().await.unwrap().events_removed, 0);

    let stored = backend.load_histories().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].events.len(), 1);
    assert!(rx
        .try_iter()
        .any(|e| matches!(e, LifecycleEvent::HistoryPruned(p) if p.histories_removed == 1)));
}

// ── Recording and queries ───────────────────────────────────────────────

#[tokio::test]
async fn locations_changed_reports_added_and_removed() {
    let ledger = ledger(backend(), 100);
    let grew = ledger
        .record_locations_changed("p1", PatternCategory::Api, 3, 7, None)
        .await
        .unwrap();
    let details = grew.details.unwrap();
    assert_eq!(details["added"], 4);
    assert_eq!(details["removed"], 0);

    let shrank = ledger
        .record_locations_changed("p1", PatternCategory::Api, 7, 2, Some("ci"))
        .await
        .unwrap();
    let details = shrank.details.unwrap();
    assert_eq!(details["added"], 0);
    assert_eq!(details["removed"], 5);
    assert_eq!(shrank.user.as_deref(), Some("ci"));
}

#[tokio::test]
async fn query_filters_sorts_newest_first_and_pages() {
    let ledger = ledger(backend(), 100);
    let now = Utc::now();
    for (i, (pid, category, event_type)) in [
        ("a", PatternCategory::Api, HistoryEventType::Created),
        ("b", PatternCategory::Auth, HistoryEventType::Created),
        ("a", PatternCategory::Api, HistoryEventType::Approved),
        ("b", PatternCategory::Auth, HistoryEventType::Ignored),
        ("a", PatternCategory::Api, HistoryEventType::ConfidenceChanged),
    ]
    .into_iter()
    .enumerate()
    {
        let mut e = event(pid, event_type, now - Duration::minutes(10 - i as i64));
        if pid == "b" {
            e = e.with_user("reviewer");
        }
        ledger.append(category, e).await.unwrap();
    }

    let all = ledger.query(&HistoryQuery::default()).await;
    assert_eq!(all.total, 5);
    assert_eq!(all.events[0].event_type, HistoryEventType::ConfidenceChanged);
    assert!(all.events.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

    let api = ledger.query(&HistoryQuery::default().category(PatternCategory::Api)).await;
    assert_eq!(api.total, 3);

    let reviewer = ledger.query(&HistoryQuery::default().user("reviewer")).await;
    assert_eq!(reviewer.total, 2);

    let transitions = ledger
        .query(
            &HistoryQuery::default()
                .event_type(HistoryEventType::Approved)
                .event_type(HistoryEventType::Ignored),
        )
        .await;
    assert_eq!(transitions.total, 2);

    let window = ledger
        .query(
            &HistoryQuery::default()
                .after(now - Duration::minutes(10))
                .before(now - Duration::minutes(6)),
        )
        .await;
    // Bounds are exclusive: minutes 9, 8 and 7 remain.
    assert_eq!(window.total, 3);

    let page = ledger.query(&HistoryQuery::default().page(1, 2)).await;
    assert_eq!(page.events.len(), 2);
    assert!(page.has_more);
    let rest = ledger.query(&HistoryQuery::default().page(1, usize::MAX)).await;
    assert_eq!(rest.events.len(), 4);
    assert!(!rest.has_more);
    assert_eq!(ledger.recent_events(1).await.len(), 1);

    let stats = ledger.stats().await;
    assert_eq!(stats.histories, 2);
    assert_eq!(stats.events, 5);
    assert_eq!(stats.by_event_type["created"], 2);
}

#[tokio::test]
async fn delete_history_is_idempotent() {
    let backend = backend();
    let ledger = ledger(backend.clone(), 100);
    ledger
        .record_event(
            "p1",
            PatternCategory::Api,
            HistoryEventType::Created,
            RecordOptions::default(),
        )
        .await
        .unwrap();
    assert!(ledger.delete_history("p1").await.unwrap());
    assert!(!ledger.delete_history("p1").await.unwrap());
    assert!(backend.load_histories().unwrap().is_empty());
}

// ── Deferred persistence ────────────────────────────────────────────────

#[tokio::test]
async fn failed_writes_stay_dirty_until_flushed() {
    let flaky = Arc::new(FlakyBackend {
        inner: SqliteBackend::open_in_memory().unwrap(),
        failing: AtomicBool::new(true),
    });
    let ledger = ledger(flaky.clone(), 100);

    let err = ledger
        .record_event(
            "p1",
            PatternCategory::Api,
            HistoryEventType::Created,
            RecordOptions::by(Some("alice")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Storage(StorageError::DbBusy { .. })));
    assert!(ledger.is_dirty().await);
    assert_eq!(ledger.history("p1").await.unwrap().events.len(), 1);
    assert!(flaky.load_histories().unwrap().is_empty());

    flaky.failing.store(false, Ordering::SeqCst);
    assert_eq!(ledger.flush().await.unwrap(), 1);
    assert!(!ledger.is_dirty().await);
    let stored = flaky.load_histories().unwrap();
    assert_eq!(stored[0].events[0].user.as_deref(), Some("alice"));
}
