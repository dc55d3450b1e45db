//! Pattern location queries.
//!
//! Counters on `patterns` are maintained by triggers; nothing here touches
//! them directly.

use pattern_core::errors::StorageError;
use pattern_core::types::{LocationKey, Pattern, PatternLocation};
use rustc_hash::FxHashMap;
use rusqlite::{params, Connection};

use super::util::sqlite_err;

fn map_location_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, PatternLocation)> {
    Ok((
        row.get(0)?,
        PatternLocation {
            file: row.get(1)?,
            line: row.get(2)?,
            column: row.get(3)?,
            end_line: row.get(4)?,
            end_column: row.get(5)?,
            is_outlier: row.get(6)?,
            deviation_score: row.get(7)?,
            outlier_reason: row.get(8)?,
            confidence: row.get(9)?,
            snippet: row.get(10)?,
        },
    ))
}

const LOCATION_COLUMNS: &str = "pattern_id, file, line, column_num, end_line, end_column, is_outlier,
    deviation_score, outlier_reason, confidence, snippet";

/// Insert or replace the location keyed by `(pattern_id, file, line, column)`.
///
/// A replacement keeps its position unless the outlier flag flips, in which
/// case it moves to the end, mirroring [`Pattern::upsert_location`].
pub fn upsert_location(
    conn: &Connection,
    pattern_id: &str,
    loc: &PatternLocation,
) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO pattern_locations (
            pattern_id, file, line, column_num, end_line, end_column, is_outlier,
            deviation_score, outlier_reason, confidence, snippet, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
            (SELECT COALESCE(MAX(position) + 1, 0) FROM pattern_locations WHERE pattern_id = ?1))
         ON CONFLICT (pattern_id, file, line, column_num) DO UPDATE SET
            end_line = excluded.end_line,
            end_column = excluded.end_column,
            position = CASE WHEN is_outlier = excluded.is_outlier THEN position ELSE excluded.position END,
            is_outlier = excluded.is_outlier,
            deviation_score = excluded.deviation_score,
            outlier_reason = excluded.outlier_reason,
            confidence = excluded.confidence,
            snippet = excluded.snippet",
    )
    .map_err(sqlite_err)?
    .execute(params![
        pattern_id,
        loc.file,
        loc.line,
        loc.column,
        loc.end_line,
        loc.end_column,
        loc.is_outlier,
        loc.deviation_score,
        loc.outlier_reason,
        loc.confidence,
        loc.snippet,
    ])
    .map_err(sqlite_err)?;
    Ok(())
}

pub fn remove_location(
    conn: &Connection,
    pattern_id: &str,
    key: &LocationKey,
) -> Result<bool, StorageError> {
    let changed = conn
        .prepare_cached(
            "DELETE FROM pattern_locations
             WHERE pattern_id = ?1 AND file = ?2 AND line = ?3 AND column_num = ?4",
        )
        .map_err(sqlite_err)?
        .execute(params![pattern_id, key.file, key.line, key.column])
        .map_err(sqlite_err)?;
    Ok(changed > 0)
}

pub fn clear_locations(conn: &Connection, pattern_id: &str) -> Result<usize, StorageError> {
    conn.prepare_cached("DELETE FROM pattern_locations WHERE pattern_id = ?1")
        .map_err(sqlite_err)?
        .execute(params![pattern_id])
        .map_err(sqlite_err)
}

/// Replace all locations of a pattern: conforming ones first, then outliers.
pub fn replace_locations(conn: &Connection, pattern: &Pattern) -> Result<(), StorageError> {
    clear_locations(conn, &pattern.id)?;
    for loc in pattern.all_locations() {
        upsert_location(conn, &pattern.id, loc)?;
    }
    Ok(())
}

/// Locations of one pattern in stored order.
pub fn locations_for(
    conn: &Connection,
    pattern_id: &str,
) -> Result<Vec<PatternLocation>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {LOCATION_COLUMNS} FROM pattern_locations
             WHERE pattern_id = ?1 ORDER BY position, id"
        ))
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map(params![pattern_id], map_location_row)
        .map_err(sqlite_err)?;
    rows.map(|r| r.map(|(_, loc)| loc))
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)
}

/// Every location grouped by pattern id, each group in stored order.
pub fn all_locations(
    conn: &Connection,
) -> Result<FxHashMap<String, Vec<PatternLocation>>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {LOCATION_COLUMNS} FROM pattern_locations ORDER BY pattern_id, position, id"
        ))
        .map_err(sqlite_err)?;
    let rows = stmt.query_map([], map_location_row).map_err(sqlite_err)?;
    let mut grouped: FxHashMap<String, Vec<PatternLocation>> = FxHashMap::default();
    for row in rows {
        let (pattern_id, loc) = row.map_err(sqlite_err)?;
        grouped.entry(pattern_id).or_default().push(loc);
    }
    Ok(grouped)
}

/// Split a flat location list into `(locations, outliers)` by flag.
pub fn split_by_outlier(all: Vec<PatternLocation>) -> (Vec<PatternLocation>, Vec<PatternLocation>) {
    all.into_iter().partition(|l| !l.is_outlier)
}
