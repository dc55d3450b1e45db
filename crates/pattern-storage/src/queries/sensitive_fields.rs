//! Declared sensitive fields, keyed by `table.field`.

use pattern_core::errors::StorageError;
use rusqlite::{params, Connection};

use super::util::sqlite_err;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveFieldRow {
    pub table_name: String,
    pub field_name: String,
    /// One of `pii`, `credentials`, `financial`, `health`.
    pub sensitivity: String,
    pub reason: Option<String>,
}

pub fn upsert_sensitive_field(
    conn: &Connection,
    field: &SensitiveFieldRow,
) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO sensitive_fields (table_name, field_name, sensitivity, reason)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (table_name, field_name) DO UPDATE SET
            sensitivity = excluded.sensitivity,
            reason = excluded.reason",
    )
    .map_err(sqlite_err)?
    .execute(params![
        field.table_name,
        field.field_name,
        field.sensitivity,
        field.reason,
    ])
    .map_err(sqlite_err)?;
    Ok(())
}

pub fn list_sensitive_fields(conn: &Connection) -> Result<Vec<SensitiveFieldRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT table_name, field_name, sensitivity, reason
             FROM sensitive_fields ORDER BY table_name, field_name",
        )
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SensitiveFieldRow {
                table_name: row.get(0)?,
                field_name: row.get(1)?,
                sensitivity: row.get(2)?,
                reason: row.get(3)?,
            })
        })
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;
    Ok(rows)
}

pub fn delete_sensitive_field(
    conn: &Connection,
    table_name: &str,
    field_name: &str,
) -> Result<bool, StorageError> {
    let changed = conn
        .execute(
            "DELETE FROM sensitive_fields WHERE table_name = ?1 AND field_name = ?2",
            params![table_name, field_name],
        )
        .map_err(sqlite_err)?;
    Ok(changed > 0)
}
