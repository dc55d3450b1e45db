//! PRAGMA configuration applied to every SQLite connection.
//!
//! WAL mode, NORMAL sync, 64MB page cache, foreign_keys ON, incremental
//! auto_vacuum, temp_store MEMORY. The busy timeout comes from config.

use std::time::Duration;

use pattern_core::errors::StorageError;
use rusqlite::Connection;

use crate::queries::util::sqlite_err;

/// Apply all performance and safety pragmas to the write connection.
pub fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -64000;
        PRAGMA temp_store = MEMORY;
        ",
    )
    .map_err(|e| StorageError::SqliteError {
        message: format!("failed to apply pragmas: {e}"),
    })?;
    conn.busy_timeout(busy_timeout).map_err(sqlite_err)?;

    // auto_vacuum can only change before any tables exist or through a
    // VACUUM rewrite.
    let current_av: i64 = conn
        .pragma_query_value(None, "auto_vacuum", |row| row.get(0))
        .unwrap_or(0);
    if current_av != 2 {
        conn.execute_batch("PRAGMA auto_vacuum = INCREMENTAL; VACUUM;")
            .map_err(|e| StorageError::SqliteError {
                message: format!("failed to enable incremental auto_vacuum: {e}"),
            })?;
    }

    Ok(())
}

/// Apply read-only pragmas to a read connection.
pub fn apply_read_pragmas(conn: &Connection, busy_timeout: Duration) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA query_only = ON;
        PRAGMA cache_size = -16000;
        PRAGMA temp_store = MEMORY;
        ",
    )
    .map_err(|e| StorageError::SqliteError {
        message: format!("failed to apply read pragmas: {e}"),
    })?;
    conn.busy_timeout(busy_timeout).map_err(sqlite_err)
}

/// Verify that WAL mode is active.
pub fn verify_wal_mode(conn: &Connection) -> Result<bool, StorageError> {
    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .map_err(sqlite_err)?;
    Ok(mode.eq_ignore_ascii_case("wal"))
}
