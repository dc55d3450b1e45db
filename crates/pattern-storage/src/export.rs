//! Portable JSON export and import of a whole store.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use pattern_core::config::BackendKind;
use pattern_core::errors::StorageError;
use pattern_core::types::{Pattern, PatternHistory, PatternHistoryEvent, SeverityConfig, Snapshot};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::backend::json::files::write_atomic;
use crate::backend::StorageBackend;
use crate::batch::{Mutation, WriteBatch};

/// Version of the export document layout.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub schema_version: u32,
    pub backend: BackendKind,
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub histories: Vec<PatternHistory>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Clear the store, then load the document.
    Replace,
    /// Upsert patterns by id, union history events by id, overwrite
    /// snapshots with the same date.
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub mode: ImportMode,
    pub patterns_inserted: usize,
    pub patterns_updated: usize,
    pub histories_written: usize,
    pub snapshots_written: usize,
    pub severity_imported: bool,
}

/// Capture everything `backend` holds.
pub fn export_document(backend: &dyn StorageBackend) -> Result<ExportDocument, StorageError> {
    let snapshots = backend
        .snapshot_dates()?
        .into_iter()
        .filter_map(|date| backend.load_snapshot(date).transpose())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ExportDocument {
        format_version: EXPORT_FORMAT_VERSION,
        exported_at: Utc::now(),
        schema_version: backend.schema_version()?,
        backend: backend.kind(),
        patterns: backend.load_patterns()?,
        histories: backend.load_histories()?,
        snapshots,
        severity: backend.load_severity_config()?,
    })
}

/// Union two event lists by id. Events keep their timestamps; ties keep
/// existing events first.
fn merge_events(
    existing: &[PatternHistoryEvent],
    incoming: &[PatternHistoryEvent],
) -> Vec<PatternHistoryEvent> {
    let mut seen: FxHashSet<&str> = existing.iter().map(|e| e.id.as_str()).collect();
    let mut merged: Vec<PatternHistoryEvent> = existing.to_vec();
    for event in incoming {
        if seen.insert(event.id.as_str()) {
            merged.push(event.clone());
        }
    }
    merged.sort_by_key(|e| e.timestamp);
    merged
}

fn merge_history(existing: &PatternHistory, incoming: &PatternHistory) -> PatternHistory {
    PatternHistory {
        pattern_id: existing.pattern_id.clone(),
        category: incoming.category,
        events: merge_events(&existing.events, &incoming.events),
        created_at: existing.created_at.min(incoming.created_at),
        last_modified: existing.last_modified.max(incoming.last_modified),
    }
}

/// Load `doc` into `backend` as a single write batch.
pub fn import_document(
    backend: &dyn StorageBackend,
    doc: &ExportDocument,
    mode: ImportMode,
) -> Result<ImportReport, StorageError> {
    if doc.format_version > EXPORT_FORMAT_VERSION {
        return Err(StorageError::SchemaMismatch {
            found: doc.format_version,
            supported: EXPORT_FORMAT_VERSION,
        });
    }

    let mut batch = WriteBatch::new();
    let mut report = ImportReport {
        mode,
        patterns_inserted: 0,
        patterns_updated: 0,
        histories_written: 0,
        snapshots_written: 0,
        severity_imported: false,
    };

    match mode {
        ImportMode::Replace => {
            batch.push(Mutation::ClearAll);
            for pattern in &doc.patterns {
                batch.push(Mutation::InsertPattern(pattern.clone()));
                report.patterns_inserted += 1;
            }
            for history in &doc.histories {
                batch.push(Mutation::PutHistory(history.clone()));
                report.histories_written += 1;
            }
        }
        ImportMode::Merge => {
            let existing: FxHashSet<String> = backend
                .load_patterns()?
                .into_iter()
                .map(|p| p.id)
                .collect();
            for pattern in &doc.patterns {
                if existing.contains(&pattern.id) {
                    batch.push(Mutation::UpdatePattern(pattern.clone()));
                    batch.push(Mutation::ReplaceLocations(pattern.clone()));
                    report.patterns_updated += 1;
                } else {
                    batch.push(Mutation::InsertPattern(pattern.clone()));
                    report.patterns_inserted += 1;
                }
            }

            let histories: BTreeMap<String, PatternHistory> = backend
                .load_histories()?
                .into_iter()
                .map(|h| (h.pattern_id.clone(), h))
                .collect();
            for incoming in &doc.histories {
                let merged = match histories.get(&incoming.pattern_id) {
                    Some(existing) => merge_history(existing, incoming),
                    None => incoming.clone(),
                };
                batch.push(Mutation::PutHistory(merged));
                report.histories_written += 1;
            }
        }
    }

    for snapshot in &doc.snapshots {
        batch.push(Mutation::PutSnapshot(snapshot.clone()));
        report.snapshots_written += 1;
    }
    if let Some(severity) = &doc.severity {
        batch.push(Mutation::PutSeverityConfig(severity.clone()));
        report.severity_imported = true;
    }

    backend.apply(&batch)?;
    tracing::info!(
        mode = ?mode,
        patterns_inserted = report.patterns_inserted,
        patterns_updated = report.patterns_updated,
        histories = report.histories_written,
        snapshots = report.snapshots_written,
        "imported export document"
    );
    Ok(report)
}

pub fn write_document(doc: &ExportDocument, path: &Path) -> Result<(), StorageError> {
    let content = serde_json::to_string_pretty(doc).map_err(StorageError::serialization)?;
    write_atomic(path, &content)
}

pub fn read_document(path: &Path) -> Result<ExportDocument, StorageError> {
    let bytes = std::fs::read(path).map_err(|e| StorageError::io(path.display(), e))?;
    serde_json::from_slice(&bytes).map_err(StorageError::serialization)
}
