//! Change log reads and sync bookkeeping. Rows are written by triggers.

use chrono::{DateTime, Utc};
use pattern_core::errors::StorageError;
use pattern_core::types::ChangeRecord;
use rusqlite::{params, params_from_iter, Connection};

use super::util::{parse_enum, sqlite_err, ts_from_sql, ts_to_sql};

type RawChange = (i64, String, String, String, String, bool);

fn map_change_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawChange> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode(raw: RawChange) -> Result<ChangeRecord, StorageError> {
    let (id, table_name, row_id, operation, changed_at, synced) = raw;
    Ok(ChangeRecord {
        id,
        table_name,
        row_id,
        operation: parse_enum(&operation)?,
        changed_at: ts_from_sql(&changed_at)?,
        synced,
    })
}

/// Oldest unsynced changes first.
pub fn unsynced(conn: &Connection, limit: usize) -> Result<Vec<ChangeRecord>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT id, table_name, row_id, operation, changed_at, synced
             FROM change_log WHERE synced = 0 ORDER BY id LIMIT ?1",
        )
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map(params![limit as i64], map_change_row)
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;
    rows.into_iter().map(decode).collect()
}

/// Mark changes as synced. Already-synced and unknown ids are ignored, so
/// repeating a call is harmless. Returns how many rows flipped.
pub fn mark_synced(conn: &Connection, ids: &[i64]) -> Result<usize, StorageError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql =
        format!("UPDATE change_log SET synced = 1 WHERE synced = 0 AND id IN ({placeholders})");
    conn.execute(&sql, params_from_iter(ids.iter()))
        .map_err(sqlite_err)
}

/// Delete synced changes recorded before `before`.
pub fn prune_synced(conn: &Connection, before: &DateTime<Utc>) -> Result<usize, StorageError> {
    conn.execute(
        "DELETE FROM change_log WHERE synced = 1 AND changed_at < ?1",
        params![ts_to_sql(before)],
    )
    .map_err(sqlite_err)
}
