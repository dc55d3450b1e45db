//! History ledger persistence. A history is written as a whole value.

use pattern_core::errors::StorageError;
use pattern_core::types::{PatternHistory, PatternHistoryEvent};
use rustc_hash::FxHashMap;
use rusqlite::{params, Connection};

use super::util::{from_json, parse_enum, sqlite_err, to_json, ts_from_sql, ts_to_sql};

/// Replace the stored history for `history.pattern_id`.
pub fn put_history(conn: &Connection, history: &PatternHistory) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO pattern_histories (pattern_id, category, created_at, last_modified)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (pattern_id) DO UPDATE SET
            category = excluded.category,
            last_modified = excluded.last_modified",
    )
    .map_err(sqlite_err)?
    .execute(params![
        history.pattern_id,
        history.category.as_str(),
        ts_to_sql(&history.created_at),
        ts_to_sql(&history.last_modified),
    ])
    .map_err(sqlite_err)?;

    conn.prepare_cached("DELETE FROM pattern_history_events WHERE pattern_id = ?1")
        .map_err(sqlite_err)?
        .execute(params![history.pattern_id])
        .map_err(sqlite_err)?;

    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO pattern_history_events
                (id, pattern_id, seq, timestamp, event_type, user, previous_value, new_value, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .map_err(sqlite_err)?;
    for (seq, event) in history.events.iter().enumerate() {
        stmt.execute(params![
            event.id,
            history.pattern_id,
            seq as i64,
            ts_to_sql(&event.timestamp),
            event.event_type.as_str(),
            event.user,
            event.previous_value.as_ref().map(to_json).transpose()?,
            event.new_value.as_ref().map(to_json).transpose()?,
            event.details.as_ref().map(to_json).transpose()?,
        ])
        .map_err(sqlite_err)?;
    }
    Ok(())
}

/// Remove the whole audit trail for a pattern id.
pub fn delete_history(conn: &Connection, pattern_id: &str) -> Result<bool, StorageError> {
    let changed = conn
        .execute(
            "DELETE FROM pattern_histories WHERE pattern_id = ?1",
            params![pattern_id],
        )
        .map_err(sqlite_err)?;
    Ok(changed > 0)
}

pub fn delete_all_histories(conn: &Connection) -> Result<usize, StorageError> {
    conn.execute("DELETE FROM pattern_histories", []).map_err(sqlite_err)
}

type RawEvent = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Every history with its events in append order, sorted by pattern id.
pub fn all_histories(conn: &Connection) -> Result<Vec<PatternHistory>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT pattern_id, category, created_at, last_modified
             FROM pattern_histories ORDER BY pattern_id",
        )
        .map_err(sqlite_err)?;
    let headers = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;

    let mut stmt = conn
        .prepare_cached(
            "SELECT id, pattern_id, timestamp, event_type, user, previous_value, new_value, details
             FROM pattern_history_events ORDER BY pattern_id, seq",
        )
        .map_err(sqlite_err)?;
    let raw_events: Vec<RawEvent> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;

    let mut events: FxHashMap<String, Vec<PatternHistoryEvent>> = FxHashMap::default();
    for (id, pattern_id, timestamp, event_type, user, prev, new, details) in raw_events {
        let event = PatternHistoryEvent {
            id,
            timestamp: ts_from_sql(&timestamp)?,
            pattern_id: pattern_id.clone(),
            event_type: parse_enum(&event_type)?,
            user,
            previous_value: prev.as_deref().map(from_json).transpose()?,
            new_value: new.as_deref().map(from_json).transpose()?,
            details: details.as_deref().map(from_json).transpose()?,
        };
        events.entry(pattern_id).or_default().push(event);
    }

    headers
        .into_iter()
        .map(|(pattern_id, category, created_at, last_modified)| {
            Ok(PatternHistory {
                events: events.remove(&pattern_id).unwrap_or_default(),
                category: parse_enum(&category)?,
                created_at: ts_from_sql(&created_at)?,
                last_modified: ts_from_sql(&last_modified)?,
                pattern_id,
            })
        })
        .collect()
}
