//! Schema migrations tracked through `PRAGMA user_version`.

pub mod v001_patterns;
pub mod v002_change_log;
pub mod v003_history;
pub mod v004_snapshots_severity;
pub mod v005_contracts;

use pattern_core::errors::StorageError;
use rusqlite::Connection;

use crate::queries::util::sqlite_err;

const MIGRATIONS: &[(&str, u32)] = &[
    (v001_patterns::MIGRATION_SQL, 1),
    (v002_change_log::MIGRATION_SQL, 2),
    (v003_history::MIGRATION_SQL, 3),
    (v004_snapshots_severity::MIGRATION_SQL, 4),
    (v005_contracts::MIGRATION_SQL, 5),
];

/// Highest schema version this build understands.
pub const SCHEMA_VERSION: u32 = 5;

/// Bring the schema up to `SCHEMA_VERSION`, one transaction per step.
///
/// A database written by a newer build is refused rather than opened.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let current = current_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(StorageError::SchemaMismatch {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    for (sql, version) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::MigrationFailed {
                version: *version,
                message: e.to_string(),
            })?;
        tx.execute_batch(sql)
            .map_err(|e| StorageError::MigrationFailed {
                version: *version,
                message: e.to_string(),
            })?;
        tx.pragma_update(None, "user_version", version)
            .map_err(|e| StorageError::MigrationFailed {
                version: *version,
                message: e.to_string(),
            })?;
        tx.commit().map_err(|e| StorageError::MigrationFailed {
            version: *version,
            message: e.to_string(),
        })?;
        tracing::info!(version, "applied migration");
    }
    Ok(())
}

/// Current schema version recorded in the database.
pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(sqlite_err)
}
