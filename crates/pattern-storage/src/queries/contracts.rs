//! API contract rows. Discovery code upserts by `(method, normalized_endpoint)`.

use pattern_core::errors::StorageError;
use rusqlite::{params, Connection, OptionalExtension};

use super::util::sqlite_err;

#[derive(Debug, Clone, PartialEq)]
pub struct ContractRow {
    pub id: i64,
    pub method: String,
    pub endpoint: String,
    pub normalized_endpoint: String,
    pub status: String,
    pub confidence: f64,
    pub backend_file: Option<String>,
    pub frontend_file: Option<String>,
}

/// Insert values for a contract; `id` is assigned by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContract {
    pub method: String,
    pub endpoint: String,
    pub normalized_endpoint: String,
    pub status: String,
    pub confidence: f64,
    pub backend_file: Option<String>,
    pub frontend_file: Option<String>,
}

/// Normalize path parameters (`:id`, `{id}`, `[id]`) to `{}` and drop any
/// trailing slash, so `/users/:id/` and `/users/{userId}` compare equal.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|seg| {
            let is_param = seg.starts_with(':')
                || (seg.starts_with('{') && seg.ends_with('}'))
                || (seg.starts_with('[') && seg.ends_with(']'));
            if is_param {
                "{}".to_string()
            } else {
                seg.to_ascii_lowercase()
            }
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Insert or update the contract keyed by method and normalized endpoint.
/// Returns the row id.
pub fn upsert_contract(conn: &Connection, c: &NewContract) -> Result<i64, StorageError> {
    conn.prepare_cached(
        "INSERT INTO contracts
            (method, endpoint, normalized_endpoint, status, confidence, backend_file, frontend_file)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (method, normalized_endpoint) DO UPDATE SET
            endpoint = excluded.endpoint,
            status = excluded.status,
            confidence = excluded.confidence,
            backend_file = COALESCE(excluded.backend_file, backend_file),
            frontend_file = COALESCE(excluded.frontend_file, frontend_file)
         RETURNING id",
    )
    .map_err(sqlite_err)?
    .query_row(
        params![
            c.method,
            c.endpoint,
            c.normalized_endpoint,
            c.status,
            c.confidence,
            c.backend_file,
            c.frontend_file,
        ],
        |row| row.get(0),
    )
    .map_err(sqlite_err)
}

fn map_contract_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContractRow> {
    Ok(ContractRow {
        id: row.get(0)?,
        method: row.get(1)?,
        endpoint: row.get(2)?,
        normalized_endpoint: row.get(3)?,
        status: row.get(4)?,
        confidence: row.get(5)?,
        backend_file: row.get(6)?,
        frontend_file: row.get(7)?,
    })
}

const CONTRACT_COLUMNS: &str =
    "id, method, endpoint, normalized_endpoint, status, confidence, backend_file, frontend_file";

pub fn get_contract(
    conn: &Connection,
    method: &str,
    normalized_endpoint: &str,
) -> Result<Option<ContractRow>, StorageError> {
    conn.prepare_cached(&format!(
        "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE method = ?1 AND normalized_endpoint = ?2"
    ))
    .map_err(sqlite_err)?
    .query_row(params![method, normalized_endpoint], map_contract_row)
    .optional()
    .map_err(sqlite_err)
}

pub fn list_contracts(conn: &Connection) -> Result<Vec<ContractRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts ORDER BY normalized_endpoint, method"
        ))
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map([], map_contract_row)
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;
    Ok(rows)
}

pub fn delete_contract(conn: &Connection, id: i64) -> Result<bool, StorageError> {
    let changed = conn
        .execute("DELETE FROM contracts WHERE id = ?1", params![id])
        .map_err(sqlite_err)?;
    Ok(changed > 0)
}
