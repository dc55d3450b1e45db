//! Sharded JSON backend.
//!
//! The whole store is held in memory as a [`StoreImage`]. A write batch is
//! applied to a clone of the image, the touched shards are rendered and
//! committed through `journal.json`, and only then is the clone swapped in.
//! A failed batch therefore leaves both the files and the image untouched.

pub mod files;
pub mod image;
pub mod lock;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use pattern_core::config::BackendKind;
use pattern_core::errors::StorageError;
use pattern_core::tracing::metrics;
use pattern_core::types::{ChangeRecord, Pattern, PatternHistory, SeverityConfig, Snapshot};

use self::files::{Journal, StoreMeta, JSON_FORMAT_VERSION, META_FILE};
use self::image::{Shard, StoreImage};
use self::lock::StoreLock;
use super::{BackendOptions, StorageBackend};
use crate::batch::WriteBatch;

pub struct JsonShardBackend {
    dir: PathBuf,
    busy_timeout: Duration,
    lock: Mutex<StoreLock>,
    image: RwLock<StoreImage>,
}

fn poisoned(dir: &Path) -> StorageError {
    StorageError::io(dir.display(), "store lock poisoned")
}

impl JsonShardBackend {
    /// Open (or create) a store rooted at `dir`, rolling forward any
    /// interrupted commit first.
    pub fn open(dir: &Path, options: BackendOptions) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir).map_err(|e| StorageError::io(dir.display(), e))?;

        if let Some(meta) = files::read_meta(dir)? {
            if meta.format_version > JSON_FORMAT_VERSION {
                return Err(StorageError::SchemaMismatch {
                    found: meta.format_version,
                    supported: JSON_FORMAT_VERSION,
                });
            }
        }

        let mut lock = StoreLock::open(dir)?;
        let image = lock.with_write(options.busy_timeout, || {
            files::replay_journal(dir)?;
            if files::read_meta(dir)?.is_none() {
                let meta = StoreMeta {
                    format_version: JSON_FORMAT_VERSION,
                    backend: BackendKind::Json.as_str().to_string(),
                    generation: 0,
                };
                let content =
                    serde_json::to_string_pretty(&meta).map_err(StorageError::serialization)?;
                files::write_atomic(&dir.join(META_FILE), &content)?;
            }
            files::load_image(dir)
        })?;

        tracing::debug!(
            dir = %dir.display(),
            patterns = image.patterns.len(),
            generation = image.generation,
            "loaded json store"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            busy_timeout: options.busy_timeout,
            lock: Mutex::new(lock),
            image: RwLock::new(image),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reload the image from disk, picking up commits made by another process.
    pub fn refresh(&self) -> Result<(), StorageError> {
        let mut lock = self.lock.lock().map_err(|_| poisoned(&self.dir))?;
        let fresh = lock.with_write(self.busy_timeout, || {
            files::replay_journal(&self.dir)?;
            files::load_image(&self.dir)
        })?;
        *self.image.write().map_err(|_| poisoned(&self.dir))? = fresh;
        Ok(())
    }

    fn read_image(&self) -> Result<RwLockReadGuard<'_, StoreImage>, StorageError> {
        self.image.read().map_err(|_| poisoned(&self.dir))
    }

    /// Run `f` against a private copy of the image and commit the shards
    /// it dirtied. The live image is replaced only after the files are
    /// durable.
    fn commit<T>(
        &self,
        f: impl FnOnce(&mut StoreImage, &mut BTreeSet<Shard>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut lock = self.lock.lock().map_err(|_| poisoned(&self.dir))?;
        lock.with_write(self.busy_timeout, || {
            files::replay_journal(&self.dir)?;
            let on_disk = files::read_meta(&self.dir)?
                .map(|m| m.generation)
                .unwrap_or(0);

            let mut next = {
                let current = self.read_image()?;
                if current.generation == on_disk {
                    current.clone()
                } else {
                    tracing::debug!(
                        cached = current.generation,
                        on_disk,
                        "json store changed on disk, reloading"
                    );
                    files::load_image(&self.dir)?
                }
            };

            let mut dirty = BTreeSet::new();
            let out = f(&mut next, &mut dirty)?;

            if !dirty.is_empty() {
                next.generation += 1;
                let writes = files::render_shards(&next, &dirty)?;
                let journal = Journal::prepare(&self.dir, next.generation, writes)?;
                files::commit(&self.dir, &journal)?;
            }
            *self.image.write().map_err(|_| poisoned(&self.dir))? = next;
            Ok(out)
        })
    }
}

impl StorageBackend for JsonShardBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Json
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        let shards = self.commit(|image, dirty| {
            let now = Utc::now();
            for mutation in batch.mutations() {
                image.apply(mutation, now, dirty).inspect_err(|e| {
                    tracing::debug!(mutation = mutation.kind(), error = %e, "write batch rejected");
                })?;
            }
            Ok(dirty.len())
        })?;
        tracing::debug!(
            { metrics::BACKEND } = "json",
            { metrics::BATCH_SIZE } = batch.len(),
            shards,
            { metrics::BATCH_WRITE_TIME } = start.elapsed().as_millis() as u64,
            "committed write batch"
        );
        Ok(())
    }

    fn load_patterns(&self) -> Result<Vec<Pattern>, StorageError> {
        Ok(self.read_image()?.patterns.values().cloned().collect())
    }

    fn load_pattern(&self, id: &str) -> Result<Option<Pattern>, StorageError> {
        Ok(self.read_image()?.patterns.get(id).cloned())
    }

    fn load_histories(&self) -> Result<Vec<PatternHistory>, StorageError> {
        Ok(self.read_image()?.histories.values().cloned().collect())
    }

    fn load_snapshot(&self, date: NaiveDate) -> Result<Option<Snapshot>, StorageError> {
        Ok(self.read_image()?.snapshots.get(&date).cloned())
    }

    fn snapshot_dates(&self) -> Result<Vec<NaiveDate>, StorageError> {
        Ok(self.read_image()?.snapshots.keys().copied().collect())
    }

    fn load_severity_config(&self) -> Result<Option<SeverityConfig>, StorageError> {
        Ok(self.read_image()?.severity.clone())
    }

    fn unsynced_changes(&self, limit: usize) -> Result<Vec<ChangeRecord>, StorageError> {
        Ok(self
            .read_image()?
            .changes
            .records
            .iter()
            .filter(|r| !r.synced)
            .take(limit)
            .cloned()
            .collect())
    }

    fn mark_synced(&self, ids: &[i64]) -> Result<usize, StorageError> {
        self.commit(|image, dirty| {
            let flipped = image.mark_synced(ids);
            if flipped > 0 {
                dirty.insert(Shard::ChangeLog);
            }
            Ok(flipped)
        })
    }

    fn prune_synced(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        self.commit(|image, dirty| {
            let removed = image.prune_synced(before);
            if removed > 0 {
                dirty.insert(Shard::ChangeLog);
            }
            Ok(removed)
        })
    }

    fn schema_version(&self) -> Result<u32, StorageError> {
        Ok(JSON_FORMAT_VERSION)
    }

    fn integrity_check(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read_image()?.problems())
    }
}
