//! Portable export documents: round trips across backends, replace and
//! merge imports.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use pattern_core::config::BackendKind;
use pattern_core::errors::StorageError;
use pattern_core::types::{
    ConfidenceInfo, ConfidenceLevel, DetectorDescriptor, DetectorType, HistoryEventType, Pattern,
    PatternCategory, PatternHistory, PatternHistoryEvent, PatternLocation, PatternMetadata,
    Severity, SeverityConfig, Snapshot,
};
use pattern_storage::backend::BackendOptions;
use pattern_storage::export::{
    export_document, import_document, read_document, write_document, EXPORT_FORMAT_VERSION,
};
use pattern_storage::{
    ImportMode, JsonShardBackend, Mutation, SqliteBackend, StorageBackend, WriteBatch,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

fn pattern(id: &str, name: &str) -> Pattern {
    let mut p = Pattern::new(
        id,
        PatternCategory::Errors,
        name,
        DetectorDescriptor::new(DetectorType::Semantic),
        ConfidenceInfo::new(0.6, ConfidenceLevel::Low),
        Severity::Warning,
    )
    .with_location(PatternLocation::new("src/lib.rs", 10, 0));
    p.metadata = PatternMetadata::at(t0());
    p
}

fn history(id: &str, events: &[(HistoryEventType, i64)]) -> PatternHistory {
    let mut h = PatternHistory::new(id, PatternCategory::Errors, t0());
    for (event_type, offset) in events {
        h.events.push(PatternHistoryEvent::new(
            id,
            *event_type,
            t0() + Duration::seconds(*offset),
        ));
    }
    h.last_modified = t0() + Duration::seconds(events.iter().map(|e| e.1).max().unwrap_or(0));
    h
}

fn seed(backend: &dyn StorageBackend) {
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let mut severity = SeverityConfig::default();
    severity
        .category_overrides
        .insert(PatternCategory::Errors, Severity::Error);
    let patterns = vec![pattern("e1", "result propagation"), pattern("e2", "panic in lib")];
    backend
        .apply(&WriteBatch::from(vec![
            Mutation::InsertPattern(patterns[0].clone()),
            Mutation::InsertPattern(patterns[1].clone()),
            Mutation::PutHistory(history("e1", &[(HistoryEventType::Created, 0)])),
            Mutation::PutSnapshot(Snapshot::capture(date, t0(), &patterns)),
            Mutation::PutSeverityConfig(severity),
        ]))
        .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// Round trips
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn sqlite_to_json_round_trip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = SqliteBackend::open_in_memory().unwrap();
    seed(&source);

    let doc = export_document(&source).unwrap();
    assert_eq!(doc.format_version, EXPORT_FORMAT_VERSION);
    assert_eq!(doc.backend, BackendKind::Sqlite);
    assert_eq!(doc.patterns.len(), 2);

    let path = dir.path().join("export").join("patterns.json");
    write_document(&doc, &path).unwrap();
    let read_back = read_document(&path).unwrap();
    assert_eq!(read_back, doc);

    let target =
        JsonShardBackend::open(&dir.path().join("store"), BackendOptions::default()).unwrap();
    let report = import_document(&target, &read_back, ImportMode::Replace).unwrap();
    assert_eq!(report.patterns_inserted, 2);
    assert_eq!(report.snapshots_written, 1);
    assert!(report.severity_imported);

    assert_eq!(target.load_patterns().unwrap(), source.load_patterns().unwrap());
    assert_eq!(target.load_histories().unwrap(), source.load_histories().unwrap());
    assert_eq!(
        target.load_severity_config().unwrap(),
        source.load_severity_config().unwrap()
    );
}

#[test]
fn replace_clears_what_the_document_does_not_hold() {
    let source = SqliteBackend::open_in_memory().unwrap();
    seed(&source);
    let doc = export_document(&source).unwrap();

    let target = SqliteBackend::open_in_memory().unwrap();
    target
        .apply(&WriteBatch::from(vec![
            Mutation::InsertPattern(pattern("stale", "left over")),
            Mutation::PutHistory(history("stale", &[(HistoryEventType::Created, 0)])),
        ]))
        .unwrap();

    import_document(&target, &doc, ImportMode::Replace).unwrap();
    let ids: Vec<String> = target.load_patterns().unwrap().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["e1".to_string(), "e2".to_string()]);
    assert!(target
        .load_histories()
        .unwrap()
        .iter()
        .all(|h| h.pattern_id != "stale"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Merge
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn merge_updates_existing_and_unions_history() {
    let target = SqliteBackend::open_in_memory().unwrap();
    let existing_history = history("e1", &[(HistoryEventType::Created, 0)]);
    target
        .apply(&WriteBatch::from(vec![
            Mutation::InsertPattern(pattern("e1", "old name")),
            Mutation::InsertPattern(pattern("local", "only here")),
            Mutation::PutHistory(existing_history.clone()),
        ]))
        .unwrap();

    let source = SqliteBackend::open_in_memory().unwrap();
    let mut renamed = pattern("e1", "new name")
        .with_location(PatternLocation::new("src/main.rs", 3, 0).outlier("unwrap"));
    renamed.severity = Severity::Error;
    let incoming_history = {
        let mut h = existing_history.clone();
        h.events.push(PatternHistoryEvent::new(
            "e1",
            HistoryEventType::Updated,
            t0() + Duration::seconds(30),
        ));
        h.last_modified = t0() + Duration::seconds(30);
        h
    };
    source
        .apply(&WriteBatch::from(vec![
            Mutation::InsertPattern(renamed),
            Mutation::InsertPattern(pattern("e3", "brand new")),
            Mutation::PutHistory(incoming_history),
        ]))
        .unwrap();
    let doc = export_document(&source).unwrap();

    let report = import_document(&target, &doc, ImportMode::Merge).unwrap();
    assert_eq!(report.patterns_updated, 1);
    assert_eq!(report.patterns_inserted, 1);

    let e1 = target.load_pattern("e1").unwrap().unwrap();
    assert_eq!(e1.name, "new name");
    assert_eq!(e1.severity, Severity::Error);
    assert_eq!((e1.location_count, e1.outlier_count), (1, 1));
    assert!(target.load_pattern("local").unwrap().is_some());
    assert!(target.load_pattern("e3").unwrap().is_some());

    let histories = target.load_histories().unwrap();
    let merged = histories.iter().find(|h| h.pattern_id == "e1").unwrap();
    assert_eq!(merged.events.len(), 2, "shared event ids are not duplicated");
    assert_eq!(merged.last_modified, t0() + Duration::seconds(30));
}

#[test]
fn failed_import_changes_nothing() {
    let target = SqliteBackend::open_in_memory().unwrap();
    seed(&target);
    let before = target.load_patterns().unwrap();

    let mut doc = export_document(&target).unwrap();
    let mut bad = pattern("e9", "bad score");
    bad.confidence.score = 3.0;
    doc.patterns.push(bad);

    let err = import_document(&target, &doc, ImportMode::Replace).unwrap_err();
    assert!(err.is_constraint_violation());
    assert_eq!(target.load_patterns().unwrap(), before);
}

#[test]
fn newer_document_format_is_refused() {
    let target = SqliteBackend::open_in_memory().unwrap();
    let mut doc = export_document(&target).unwrap();
    doc.format_version = EXPORT_FORMAT_VERSION + 1;
    let err = import_document(&target, &doc, ImportMode::Merge).unwrap_err();
    assert!(matches!(err, StorageError::SchemaMismatch { .. }));
}
