//! Sharded JSON backend: layout, constraint parity with SQLite, journal
//! recovery, and cross-instance visibility.

use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use pattern_core::errors::StorageError;
use pattern_core::types::{
    ConfidenceInfo, ConfidenceLevel, DetectorDescriptor, DetectorType, EscalationRule,
    HistoryEventType, LocationKey, Pattern, PatternCategory, PatternHistory, PatternHistoryEvent,
    PatternLocation, PatternMetadata, PatternStatus, Severity, SeverityConfig, Snapshot,
};
use pattern_storage::backend::json::files::{Journal, ShardWrite, JOURNAL_FILE};
use pattern_storage::backend::BackendOptions;
use pattern_storage::{JsonShardBackend, Mutation, SqliteBackend, StorageBackend, WriteBatch};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn pattern(id: &str, category: PatternCategory) -> Pattern {
    let mut p = Pattern::new(
        id,
        category,
        format!("{id} name"),
        DetectorDescriptor::new(DetectorType::Regex),
        ConfidenceInfo::new(0.75, ConfidenceLevel::Medium),
        Severity::Info,
    );
    p.metadata = PatternMetadata::at(t0());
    p
}

fn open(dir: &Path) -> JsonShardBackend {
    JsonShardBackend::open(dir, BackendOptions::default()).unwrap()
}

fn apply(backend: &dyn StorageBackend, mutations: Vec<Mutation>) -> Result<(), StorageError> {
    backend.apply(&WriteBatch::from(mutations))
}

/// A batch touching every kind of stored entity.
fn mixed_batch() -> Vec<Mutation> {
    let mut approved = pattern("auth/guard", PatternCategory::Auth)
        .with_location(PatternLocation::new("src/routes.ts", 4, 2))
        .with_location(PatternLocation::new("src/admin.ts", 9, 0).outlier("no guard"));
    approved.status = PatternStatus::Approved;
    approved.metadata.approved_at = Some(t0());
    approved.metadata.approved_by = Some("reviewer".into());

    let mut history = PatternHistory::new("auth/guard", PatternCategory::Auth, t0());
    history.events.push(
        PatternHistoryEvent::new("auth/guard", HistoryEventType::Approved, t0())
            .with_user("reviewer"),
    );

    let mut severity = SeverityConfig::default();
    severity
        .pattern_overrides
        .insert("auth/guard".into(), Severity::Error);
    severity
        .escalation
        .rules
        .push(EscalationRule::new(Severity::Info, Severity::Warning, 3));

    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    vec![
        Mutation::InsertPattern(approved.clone()),
        Mutation::InsertPattern(pattern("api/rest", PatternCategory::Api)),
        Mutation::PutHistory(history),
        Mutation::PutSnapshot(Snapshot::capture(date, t0(), &[approved])),
        Mutation::PutSeverityConfig(severity),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
// Layout
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn shards_are_written_per_status_and_category() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open(dir.path());
    apply(&backend, mixed_batch()).unwrap();

    let root = dir.path();
    assert!(root.join("meta.json").exists());
    assert!(root.join("patterns/approved/auth.json").exists());
    assert!(root.join("patterns/discovered/api.json").exists());
    assert!(root.join("history/history.json").exists());
    assert!(root.join("history/snapshots/2024-05-01.json").exists());
    assert!(root.join("severity.json").exists());
    assert!(root.join("changelog.json").exists());
    assert!(!root.join(JOURNAL_FILE).exists());
}

#[test]
fn status_change_moves_pattern_between_shards() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open(dir.path());
    let p = pattern("api/rest", PatternCategory::Api);
    apply(&backend, vec![Mutation::InsertPattern(p.clone())]).unwrap();

    let mut ignored = p;
    ignored.status = PatternStatus::Ignored;
    apply(&backend, vec![Mutation::UpdatePattern(ignored)]).unwrap();

    assert!(!dir.path().join("patterns/discovered/api.json").exists());
    assert!(dir.path().join("patterns/ignored/api.json").exists());
}

// ═══════════════════════════════════════════════════════════════════════════
// Parity with SQLite
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn json_and_sqlite_hold_the_same_state_after_the_same_batches() {
    let dir = tempfile::tempdir().unwrap();
    let json = open(dir.path());
    let sqlite = SqliteBackend::open_in_memory().unwrap();

    let follow_up = vec![
        Mutation::UpsertLocation {
            pattern_id: "api/rest".into(),
            location: PatternLocation::new("src/api.ts", 1, 0),
        },
        Mutation::RemoveLocation {
            pattern_id: "auth/guard".into(),
            key: LocationKey::new("src/admin.ts", 9, 0),
        },
    ];
    for backend in [&json as &dyn StorageBackend, &sqlite] {
        apply(backend, mixed_batch()).unwrap();
        apply(backend, follow_up.clone()).unwrap();
    }

    assert_eq!(json.load_patterns().unwrap(), sqlite.load_patterns().unwrap());
    assert_eq!(json.load_histories().unwrap(), sqlite.load_histories().unwrap());
    assert_eq!(json.snapshot_dates().unwrap(), sqlite.snapshot_dates().unwrap());
    assert_eq!(
        json.load_severity_config().unwrap(),
        sqlite.load_severity_config().unwrap()
    );

    let tables = |backend: &dyn StorageBackend| -> Vec<(String, String)> {
        backend
            .unsynced_changes(1000)
            .unwrap()
            .into_iter()
            .filter(|c| c.table_name.starts_with("pattern"))
            .map(|c| (c.table_name, c.row_id))
            .collect()
    };
    assert_eq!(tables(&json), tables(&sqlite));
}

#[test]
fn constraint_errors_match_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open(dir.path());
    apply(&backend, vec![Mutation::InsertPattern(pattern("p1", PatternCategory::Api))]).unwrap();

    let dup = apply(&backend, vec![Mutation::InsertPattern(pattern("p1", PatternCategory::Api))]);
    assert!(dup.unwrap_err().is_constraint_violation());

    let orphan = apply(
        &backend,
        vec![Mutation::UpsertLocation {
            pattern_id: "ghost".into(),
            location: PatternLocation::new("a.ts", 1, 0),
        }],
    );
    assert!(orphan.unwrap_err().is_constraint_violation());

    let mut bad = pattern("p2", PatternCategory::Api);
    bad.confidence.score = -0.1;
    assert!(apply(&backend, vec![Mutation::InsertPattern(bad)])
        .unwrap_err()
        .is_constraint_violation());
}

#[test]
fn failed_batch_leaves_files_and_image_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open(dir.path());
    apply(&backend, vec![Mutation::InsertPattern(pattern("p1", PatternCategory::Api))]).unwrap();
    let shard = dir.path().join("patterns/discovered/api.json");
    let before = std::fs::read_to_string(&shard).unwrap();

    let err = apply(
        &backend,
        vec![
            Mutation::InsertPattern(pattern("p2", PatternCategory::Api)),
            Mutation::InsertPattern(pattern("p1", PatternCategory::Api)),
        ],
    )
    .unwrap_err();
    assert!(err.is_constraint_violation());
    assert_eq!(std::fs::read_to_string(&shard).unwrap(), before);
    assert!(backend.load_pattern("p2").unwrap().is_none());
}

#[test]
fn binary_image_is_not_supported() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open(dir.path());
    let err = backend.export_image(&dir.path().join("image.db")).unwrap_err();
    assert!(matches!(err, StorageError::NotSupported { .. }));
}

// ═══════════════════════════════════════════════════════════════════════════
// Durability
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn reopen_restores_everything() {
    let dir = tempfile::tempdir().unwrap();
    let expected = {
        let backend = open(dir.path());
        apply(&backend, mixed_batch()).unwrap();
        (
            backend.load_patterns().unwrap(),
            backend.load_histories().unwrap(),
            backend.load_severity_config().unwrap(),
            backend.unsynced_changes(1000).unwrap(),
        )
    };
    let backend = open(dir.path());
    assert_eq!(backend.load_patterns().unwrap(), expected.0);
    assert_eq!(backend.load_histories().unwrap(), expected.1);
    assert_eq!(backend.load_severity_config().unwrap(), expected.2);
    assert_eq!(backend.unsynced_changes(1000).unwrap(), expected.3);
    assert!(backend.integrity_check().unwrap().is_empty());
}

#[test]
fn interrupted_commit_is_rolled_forward_on_open() {
    let dir = tempfile::tempdir().unwrap();
    {
        let backend = open(dir.path());
        let seed = pattern("p1", PatternCategory::Api);
        apply(&backend, vec![Mutation::InsertPattern(seed)]).unwrap();
    }

    let mut renamed = pattern("p1", PatternCategory::Api);
    renamed.name = "renamed".into();
    renamed.location_count = 0;
    let journal = Journal {
        generation: 2,
        writes: vec![
            ShardWrite {
                path: "patterns/discovered/api.json".into(),
                content: Some(serde_json::to_string_pretty(&vec![renamed]).unwrap()),
            },
            ShardWrite {
                path: "meta.json".into(),
                content: Some(
                    r#"{ "formatVersion": 1, "backend": "json", "generation": 2 }"#.into(),
                ),
            },
        ],
        ..Journal::default()
    };
    std::fs::write(
        dir.path().join(JOURNAL_FILE),
        serde_json::to_string(&journal).unwrap(),
    )
    .unwrap();

    let backend = open(dir.path());
    assert!(!dir.path().join(JOURNAL_FILE).exists());
    assert_eq!(backend.load_pattern("p1").unwrap().unwrap().name, "renamed");
}

#[test]
fn failed_shard_write_is_rolled_back_not_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let backend = open(dir.path());
    let original = pattern("p1", PatternCategory::Api);
    apply(&backend, vec![Mutation::InsertPattern(original.clone())]).unwrap();
    let shard = dir.path().join("patterns/discovered/api.json");
    let before = std::fs::read_to_string(&shard).unwrap();

    // A directory squatting on the temp file makes the history write fail
    // after the pattern shard has already been replaced.
    let blocker = dir.path().join("history/history.json.tmp");
    std::fs::create_dir_all(blocker.join("keep")).unwrap();

    let mut renamed = original.clone();
    renamed.name = "renamed".into();
    let mut history = PatternHistory::new("p1", PatternCategory::Api, t0());
    history
        .events
        .push(PatternHistoryEvent::new("p1", HistoryEventType::Updated, t0()));
    let err = apply(
        &backend,
        vec![Mutation::UpdatePattern(renamed), Mutation::PutHistory(history)],
    )
    .unwrap_err();
    assert!(matches!(err, StorageError::Io { .. }));

    assert!(!dir.path().join(JOURNAL_FILE).exists());
    assert_eq!(std::fs::read_to_string(&shard).unwrap(), before);
    assert_eq!(backend.load_pattern("p1").unwrap().unwrap().name, original.name);

    backend.refresh().unwrap();
    let reopened = open(dir.path());
    assert_eq!(reopened.load_pattern("p1").unwrap().unwrap().name, original.name);
    assert!(reopened.load_histories().unwrap().is_empty());

    std::fs::remove_dir_all(&blocker).unwrap();
    let mut renamed = original;
    renamed.name = "renamed".into();
    apply(&backend, vec![Mutation::UpdatePattern(renamed)]).unwrap();
    assert_eq!(backend.load_pattern("p1").unwrap().unwrap().name, "renamed");
}

#[test]
fn newer_format_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("meta.json"),
        r#"{ "formatVersion": 7, "backend": "json", "generation": 0 }"#,
    )
    .unwrap();
    let err = JsonShardBackend::open(dir.path(), BackendOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, StorageError::SchemaMismatch { found: 7, .. }));
}

#[test]
fn writer_sees_commits_from_another_instance() {
    let dir = tempfile::tempdir().unwrap();
    let a = open(dir.path());
    let b = open(dir.path());

    apply(&a, vec![Mutation::InsertPattern(pattern("p1", PatternCategory::Api))]).unwrap();
    // b reloads before writing, so the duplicate is caught.
    let err = apply(&b, vec![Mutation::InsertPattern(pattern("p1", PatternCategory::Api))])
        .unwrap_err();
    assert!(err.is_constraint_violation());

    apply(&b, vec![Mutation::InsertPattern(pattern("p2", PatternCategory::Api))]).unwrap();
    a.refresh().unwrap();
    assert_eq!(a.load_patterns().unwrap().len(), 2);
}

#[test]
fn change_log_sync_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let backend = open(dir.path());
        let seed = pattern("p1", PatternCategory::Api);
        apply(&backend, vec![Mutation::InsertPattern(seed)]).unwrap();
        let ids: Vec<i64> = backend
            .unsynced_changes(10)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(backend.mark_synced(&ids).unwrap(), 1);
        assert_eq!(backend.mark_synced(&ids).unwrap(), 0);
    }
    let backend = open(dir.path());
    assert!(backend.unsynced_changes(10).unwrap().is_empty());

    apply(&backend, vec![Mutation::DeletePattern { id: "p1".into() }]).unwrap();
    let next = backend.unsynced_changes(10).unwrap();
    assert_eq!(next.len(), 1);
    assert!(next[0].id > 1, "change ids keep increasing after reopen");
}
