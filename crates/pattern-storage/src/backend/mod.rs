//! The storage contract shared by the SQLite and sharded-JSON backends.

pub mod json;
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use pattern_core::config::{BackendKind, StorageConfig};
use pattern_core::constants::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_READ_POOL_SIZE, PATTERNS_DB_FILE};
use pattern_core::errors::StorageError;
use pattern_core::tracing::metrics;
use pattern_core::types::{ChangeRecord, Pattern, PatternHistory, SeverityConfig, Snapshot};

use crate::batch::WriteBatch;

use self::json::JsonShardBackend;
use self::sqlite::SqliteBackend;

/// Durable pattern storage.
///
/// Every write goes through [`StorageBackend::apply`], which commits the
/// whole batch or nothing. Both implementations enforce the same
/// constraints and record one change-log entry per affected row.
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    // --- Writes ---
    fn apply(&self, batch: &WriteBatch) -> Result<(), StorageError>;

    // --- Reads ---
    /// Every pattern with its locations, ordered by id.
    fn load_patterns(&self) -> Result<Vec<Pattern>, StorageError>;
    fn load_pattern(&self, id: &str) -> Result<Option<Pattern>, StorageError>;
    /// Every history, ordered by pattern id.
    fn load_histories(&self) -> Result<Vec<PatternHistory>, StorageError>;
    fn load_snapshot(&self, date: NaiveDate) -> Result<Option<Snapshot>, StorageError>;
    /// Stored snapshot dates, oldest first.
    fn snapshot_dates(&self) -> Result<Vec<NaiveDate>, StorageError>;
    fn load_severity_config(&self) -> Result<Option<SeverityConfig>, StorageError>;

    // --- Change log ---
    fn unsynced_changes(&self, limit: usize) -> Result<Vec<ChangeRecord>, StorageError>;
    fn mark_synced(&self, ids: &[i64]) -> Result<usize, StorageError>;
    fn prune_synced(&self, before: DateTime<Utc>) -> Result<usize, StorageError>;

    // --- Maintenance ---
    fn schema_version(&self) -> Result<u32, StorageError>;
    /// Problems found by a consistency check; empty when the store is sound.
    fn integrity_check(&self) -> Result<Vec<String>, StorageError>;
    fn checkpoint(&self) -> Result<(), StorageError> {
        Ok(())
    }
    fn vacuum(&self) -> Result<(), StorageError> {
        Ok(())
    }

    // --- Binary image ---
    fn export_image(&self, dest: &Path) -> Result<(), StorageError> {
        let _ = dest;
        Err(StorageError::NotSupported {
            operation: "export_image".to_string(),
            reason: format!("{} backend has no binary image", self.kind()),
        })
    }
    fn import_image(&self, src: &Path) -> Result<(), StorageError> {
        let _ = src;
        Err(StorageError::NotSupported {
            operation: "import_image".to_string(),
            reason: format!("{} backend has no binary image", self.kind()),
        })
    }
}

/// Lock and pool settings resolved from [`StorageConfig`].
#[derive(Debug, Clone, Copy)]
pub struct BackendOptions {
    pub busy_timeout: Duration,
    pub read_pool_size: usize,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }
}

impl From<&StorageConfig> for BackendOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            busy_timeout: config.effective_busy_timeout(),
            read_pool_size: config.effective_read_pool_size(),
        }
    }
}

/// Open the backend selected by `config` for the project at `root`.
pub fn open_backend(
    config: &StorageConfig,
    root: &Path,
) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let dir = config.effective_directory(root);
    let options = BackendOptions::from(config);
    let backend: Arc<dyn StorageBackend> = match config.effective_backend() {
        BackendKind::Sqlite => Arc::new(SqliteBackend::open(&dir.join(PATTERNS_DB_FILE), options)?),
        BackendKind::Json => Arc::new(JsonShardBackend::open(&dir, options)?),
    };
    tracing::info!(
        { metrics::BACKEND } = tracing::field::display(backend.kind()),
        dir = %dir.display(),
        "opened pattern store"
    );
    Ok(backend)
}
