//! SQLite backend: WAL, triggers for counters and change capture, one
//! serialized writer plus a read pool.

use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use pattern_core::config::BackendKind;
use pattern_core::errors::StorageError;
use pattern_core::tracing::metrics;
use pattern_core::types::{ChangeRecord, Pattern, PatternHistory, SeverityConfig, Snapshot};
use rusqlite::{Connection, OpenFlags};

use super::{BackendOptions, StorageBackend};
use crate::batch::{Mutation, WriteBatch};
use crate::connection::writer::with_immediate_transaction;
use crate::connection::DatabaseManager;
use crate::migrations::{self, SCHEMA_VERSION};
use crate::queries::contracts::{self, ContractRow, NewContract};
use crate::queries::sensitive_fields::{self, SensitiveFieldRow};
use crate::queries::util::sqlite_err;
use crate::queries::{change_log, history, locations, patterns, severity, snapshots};

pub struct SqliteBackend {
    db: DatabaseManager,
}

impl SqliteBackend {
    pub fn open(path: &Path, options: BackendOptions) -> Result<Self, StorageError> {
        let db = DatabaseManager::open(path, options.busy_timeout, options.read_pool_size)?;
        Ok(Self { db })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            db: DatabaseManager::open_in_memory()?,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db.path()
    }

    // --- Contracts and sensitive fields ---

    pub fn upsert_contract(&self, contract: &NewContract) -> Result<i64, StorageError> {
        self.db.with_writer(|conn| {
            with_immediate_transaction(conn, |tx| contracts::upsert_contract(tx, contract))
        })
    }

    pub fn get_contract(
        &self,
        method: &str,
        endpoint: &str,
    ) -> Result<Option<ContractRow>, StorageError> {
        let normalized = contracts::normalize_endpoint(endpoint);
        self.db
            .with_reader(|conn| contracts::get_contract(conn, method, &normalized))
    }

    pub fn list_contracts(&self) -> Result<Vec<ContractRow>, StorageError> {
        self.db.with_reader(contracts::list_contracts)
    }

    pub fn delete_contract(&self, id: i64) -> Result<bool, StorageError> {
        self.db.with_writer(|conn| contracts::delete_contract(conn, id))
    }

    pub fn upsert_sensitive_field(&self, field: &SensitiveFieldRow) -> Result<(), StorageError> {
        self.db
            .with_writer(|conn| sensitive_fields::upsert_sensitive_field(conn, field))
    }

    pub fn list_sensitive_fields(&self) -> Result<Vec<SensitiveFieldRow>, StorageError> {
        self.db.with_reader(sensitive_fields::list_sensitive_fields)
    }

    pub fn delete_sensitive_field(&self, table: &str, field: &str) -> Result<bool, StorageError> {
        self.db
            .with_writer(|conn| sensitive_fields::delete_sensitive_field(conn, table, field))
    }
}

fn apply_mutation(conn: &Connection, mutation: &Mutation) -> Result<(), StorageError> {
    match mutation {
        Mutation::InsertPattern(p) => {
            patterns::insert_pattern(conn, p)?;
            for loc in p.all_locations() {
                locations::upsert_location(conn, &p.id, loc)?;
            }
        }
        Mutation::UpdatePattern(p) => {
            if !patterns::update_pattern(conn, p)? {
                return Err(StorageError::constraint(
                    "patterns",
                    format!("no pattern with id '{}' to update", p.id),
                ));
            }
        }
        Mutation::DeletePattern { id } => {
            patterns::delete_pattern(conn, id)?;
        }
        Mutation::UpsertLocation {
            pattern_id,
            location,
        } => locations::upsert_location(conn, pattern_id, location)?,
        Mutation::RemoveLocation { pattern_id, key } => {
            locations::remove_location(conn, pattern_id, key)?;
        }
        Mutation::ReplaceLocations(p) => locations::replace_locations(conn, p)?,
        Mutation::PutHistory(h) => history::put_history(conn, h)?,
        Mutation::DeleteHistory { pattern_id } => {
            history::delete_history(conn, pattern_id)?;
        }
        Mutation::PutSnapshot(s) => snapshots::put_snapshot(conn, s)?,
        Mutation::DeleteSnapshot { date } => {
            snapshots::delete_snapshot(conn, date)?;
        }
        Mutation::PutSeverityConfig(config) => severity::save_severity_config(conn, config)?,
        Mutation::ClearAll => {
            patterns::delete_all_patterns(conn)?;
            history::delete_all_histories(conn)?;
            snapshots::delete_all_snapshots(conn)?;
            severity::delete_severity_config(conn)?;
        }
    }
    Ok(())
}

/// Run a multi-statement read against one consistent snapshot of the file.
fn read_consistent<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let tx = conn.unchecked_transaction().map_err(sqlite_err)?;
    let out = f(&tx)?;
    tx.finish().map_err(sqlite_err)?;
    Ok(out)
}

/// Attach stored locations to a row-only pattern.
fn with_locations(mut pattern: Pattern, all: Vec<pattern_core::types::PatternLocation>) -> Pattern {
    let (conforming, outliers) = locations::split_by_outlier(all);
    pattern.locations = conforming;
    pattern.outliers = outliers;
    pattern
}

impl StorageBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        self.db.with_writer(|conn| {
            with_immediate_transaction(conn, |tx| {
                for mutation in batch.mutations() {
                    apply_mutation(tx, mutation).inspect_err(|e| {
                        tracing::debug!(
                            mutation = mutation.kind(),
                            error = %e,
                            "write batch rejected"
                        );
                    })?;
                }
                Ok(())
            })
        })?;
        tracing::debug!(
            { metrics::BACKEND } = "sqlite",
            { metrics::BATCH_SIZE } = batch.len(),
            { metrics::BATCH_WRITE_TIME } = start.elapsed().as_millis() as u64,
            "committed write batch"
        );
        Ok(())
    }

    fn load_patterns(&self) -> Result<Vec<Pattern>, StorageError> {
        self.db.with_reader(|conn| {
            read_consistent(conn, |conn| {
                let rows = patterns::all_pattern_rows(conn)?;
                let mut grouped = locations::all_locations(conn)?;
                Ok(rows
                    .into_iter()
                    .map(|p| {
                        let locs = grouped.remove(&p.id).unwrap_or_default();
                        with_locations(p, locs)
                    })
                    .collect())
            })
        })
    }

    fn load_pattern(&self, id: &str) -> Result<Option<Pattern>, StorageError> {
        self.db.with_reader(|conn| {
            read_consistent(conn, |conn| {
                let Some(p) = patterns::get_pattern_row(conn, id)? else {
                    return Ok(None);
                };
                let locs = locations::locations_for(conn, id)?;
                Ok(Some(with_locations(p, locs)))
            })
        })
    }

    fn load_histories(&self) -> Result<Vec<PatternHistory>, StorageError> {
        self.db
            .with_reader(|conn| read_consistent(conn, history::all_histories))
    }

    fn load_snapshot(&self, date: NaiveDate) -> Result<Option<Snapshot>, StorageError> {
        self.db
            .with_reader(|conn| snapshots::get_snapshot(conn, &date))
    }

    fn snapshot_dates(&self) -> Result<Vec<NaiveDate>, StorageError> {
        self.db.with_reader(snapshots::snapshot_dates)
    }

    fn load_severity_config(&self) -> Result<Option<SeverityConfig>, StorageError> {
        self.db.with_reader(severity::load_severity_config)
    }

    fn unsynced_changes(&self, limit: usize) -> Result<Vec<ChangeRecord>, StorageError> {
        self.db
            .with_reader(|conn| change_log::unsynced(conn, limit))
    }

    fn mark_synced(&self, ids: &[i64]) -> Result<usize, StorageError> {
        self.db
            .with_writer(|conn| change_log::mark_synced(conn, ids))
    }

    fn prune_synced(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        self.db
            .with_writer(|conn| change_log::prune_synced(conn, &before))
    }

    fn schema_version(&self) -> Result<u32, StorageError> {
        self.db.with_reader(migrations::current_version)
    }

    fn integrity_check(&self) -> Result<Vec<String>, StorageError> {
        self.db.with_reader(|conn| {
            let mut problems = Vec::new();

            let mut stmt = conn
                .prepare("PRAGMA integrity_check")
                .map_err(sqlite_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sqlite_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sqlite_err)?;
            problems.extend(rows.into_iter().filter(|r| r != "ok"));

            let mut stmt = conn
                .prepare("PRAGMA foreign_key_check")
                .map_err(sqlite_err)?;
            let fk = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sqlite_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sqlite_err)?;
            problems.extend(fk.into_iter().map(|t| format!("foreign key violation in {t}")));

            let mut stmt = conn
                .prepare(
                    "SELECT p.id FROM patterns p
                     WHERE p.location_count != (SELECT COUNT(*) FROM pattern_locations l
                                                WHERE l.pattern_id = p.id AND l.is_outlier = 0)
                        OR p.outlier_count != (SELECT COUNT(*) FROM pattern_locations l
                                               WHERE l.pattern_id = p.id AND l.is_outlier = 1)",
                )
                .map_err(sqlite_err)?;
            let drifted = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sqlite_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(sqlite_err)?;
            problems.extend(
                drifted
                    .into_iter()
                    .map(|id| format!("stale counters on pattern {id}")),
            );

            Ok(problems)
        })
    }

    fn checkpoint(&self) -> Result<(), StorageError> {
        self.db.checkpoint()
    }

    fn vacuum(&self) -> Result<(), StorageError> {
        self.db.vacuum()
    }

    /// Write a compacted copy of the database to `dest` via `VACUUM INTO`.
    fn export_image(&self, dest: &Path) -> Result<(), StorageError> {
        if dest.exists() {
            return Err(StorageError::io(dest.display(), "destination already exists"));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent.display(), e))?;
        }
        let dest_str = dest.to_string_lossy().to_string();
        self.db.with_writer(|conn| {
            conn.execute("VACUUM INTO ?1", [&dest_str])
                .map_err(sqlite_err)
        })?;

        let exported = Connection::open_with_flags(dest, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| StorageError::io(dest.display(), e))?;
        let check: String = exported
            .pragma_query_value(None, "integrity_check", |row| row.get(0))
            .map_err(sqlite_err)?;
        drop(exported);
        if check != "ok" {
            let _ = std::fs::remove_file(dest);
            return Err(StorageError::DbCorrupt { details: check });
        }
        tracing::info!(dest = %dest.display(), "exported database image");
        Ok(())
    }

    /// Replace the live database with the image at `src` through the backup
    /// API. The image is checked before anything is overwritten.
    fn import_image(&self, src: &Path) -> Result<(), StorageError> {
        {
            // No CREATE flag: a missing image must not become an empty database.
            let source = Connection::open_with_flags(
                src,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| StorageError::io(src.display(), e))?;
            let check: String = source
                .query_row("PRAGMA integrity_check", [], |row| row.get(0))
                .map_err(sqlite_err)?;
            if check != "ok" {
                return Err(StorageError::DbCorrupt { details: check });
            }
            let version = migrations::current_version(&source)?;
            if version > SCHEMA_VERSION {
                return Err(StorageError::SchemaMismatch {
                    found: version,
                    supported: SCHEMA_VERSION,
                });
            }
        }

        self.db.with_writer_mut(|conn| {
            conn.restore(
                rusqlite::DatabaseName::Main,
                src,
                None::<fn(rusqlite::backup::Progress)>,
            )
            .map_err(sqlite_err)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(sqlite_err)?;
            migrations::run_migrations(conn)
        })?;
        tracing::info!(src = %src.display(), "restored database image");
        Ok(())
    }
}
