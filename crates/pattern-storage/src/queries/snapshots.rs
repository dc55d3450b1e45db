//! Snapshot persistence, one row per calendar day.

use chrono::NaiveDate;
use pattern_core::errors::StorageError;
use pattern_core::types::Snapshot;
use rusqlite::{params, Connection, OptionalExtension};

use super::util::{
    date_from_sql, date_to_sql, from_json, sqlite_err, to_json, ts_from_sql, ts_to_sql,
};

/// Insert or replace the snapshot for its date.
pub fn put_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO snapshots (snapshot_date, created_at, summary, patterns)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (snapshot_date) DO UPDATE SET
            created_at = excluded.created_at,
            summary = excluded.summary,
            patterns = excluded.patterns",
    )
    .map_err(sqlite_err)?
    .execute(params![
        date_to_sql(&snapshot.date),
        ts_to_sql(&snapshot.created_at),
        to_json(&snapshot.summary)?,
        to_json(&snapshot.patterns)?,
    ])
    .map_err(sqlite_err)?;
    Ok(())
}

pub fn get_snapshot(conn: &Connection, date: &NaiveDate) -> Result<Option<Snapshot>, StorageError> {
    let row = conn
        .prepare_cached(
            "SELECT snapshot_date, created_at, summary, patterns FROM snapshots WHERE snapshot_date = ?1",
        )
        .map_err(sqlite_err)?
        .query_row(params![date_to_sql(date)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .optional()
        .map_err(sqlite_err)?;

    row.map(|(date, created_at, summary, patterns)| {
        Ok(Snapshot {
            date: date_from_sql(&date)?,
            created_at: ts_from_sql(&created_at)?,
            summary: from_json(&summary)?,
            patterns: from_json(&patterns)?,
        })
    })
    .transpose()
}

/// Dates with a stored snapshot, oldest first.
pub fn snapshot_dates(conn: &Connection) -> Result<Vec<NaiveDate>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT snapshot_date FROM snapshots ORDER BY snapshot_date")
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;
    rows.iter().map(|s| date_from_sql(s)).collect()
}

pub fn delete_snapshot(conn: &Connection, date: &NaiveDate) -> Result<bool, StorageError> {
    let changed = conn
        .execute(
            "DELETE FROM snapshots WHERE snapshot_date = ?1",
            params![date_to_sql(date)],
        )
        .map_err(sqlite_err)?;
    Ok(changed > 0)
}

pub fn delete_all_snapshots(conn: &Connection) -> Result<usize, StorageError> {
    conn.execute("DELETE FROM snapshots", []).map_err(sqlite_err)
}
