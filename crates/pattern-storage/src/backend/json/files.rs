//! On-disk layout of a JSON store and the journaled shard writer.
//!
//! ```text
//! <dir>/
//!   meta.json
//!   patterns/{status}/{category}.json
//!   history/history.json
//!   history/snapshots/{YYYY-MM-DD}.json
//!   changelog.json
//!   severity.json
//!   journal.json      (present only while a commit is in flight)
//!   store.lock
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use pattern_core::errors::StorageError;
use pattern_core::types::{Pattern, PatternCategory, PatternHistory, PatternStatus, Snapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::image::{ChangeLogDoc, Shard, StoreImage};

pub const META_FILE: &str = "meta.json";
pub const JOURNAL_FILE: &str = "journal.json";
pub const LOCK_FILE: &str = "store.lock";
pub const CHANGELOG_FILE: &str = "changelog.json";
pub const SEVERITY_FILE: &str = "severity.json";
pub const PATTERNS_DIR: &str = "patterns";
pub const HISTORY_DIR: &str = "history";
pub const HISTORY_FILE: &str = "history.json";
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Layout version of the JSON store.
pub const JSON_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMeta {
    pub format_version: u32,
    pub backend: String,
    #[serde(default)]
    pub generation: u64,
}

/// One file replacement. `content: None` deletes the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardWrite {
    pub path: String,
    pub content: Option<String>,
}

/// Pending file writes, recorded before any shard is touched so an
/// interrupted commit can be rolled forward on the next open.
///
/// `undo` holds the prior content of every path in `writes`. A commit whose
/// shard writes fail is marked `aborted` and rolled back from it instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Journal {
    pub generation: u64,
    pub writes: Vec<ShardWrite>,
    #[serde(default)]
    pub undo: Vec<ShardWrite>,
    #[serde(default)]
    pub aborted: bool,
}

impl Journal {
    /// A journal for `writes`, capturing the current content of each target
    /// under `dir` for rollback.
    pub fn prepare(
        dir: &Path,
        generation: u64,
        writes: Vec<ShardWrite>,
    ) -> Result<Self, StorageError> {
        let undo = writes
            .iter()
            .map(|w| {
                Ok(ShardWrite {
                    path: w.path.clone(),
                    content: read_existing(&dir.join(&w.path))?,
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;
        Ok(Self {
            generation,
            writes,
            undo,
            aborted: false,
        })
    }
}

/// Path of a shard relative to the store directory.
pub fn shard_path(shard: Shard) -> PathBuf {
    match shard {
        Shard::Patterns(status, category) => Path::new(PATTERNS_DIR)
            .join(status.as_str())
            .join(format!("{}.json", category.as_str())),
        Shard::History => Path::new(HISTORY_DIR).join(HISTORY_FILE),
        Shard::Snapshot(date) => Path::new(HISTORY_DIR)
            .join(SNAPSHOTS_DIR)
            .join(format!("{}.json", date.format("%Y-%m-%d"))),
        Shard::Severity => PathBuf::from(SEVERITY_FILE),
        Shard::ChangeLog => PathBuf::from(CHANGELOG_FILE),
    }
}

fn to_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string_pretty(value).map_err(StorageError::serialization)
}

/// Render the dirty shards of `image`. Empty pattern shards, a missing
/// severity config, and deleted snapshots become file deletions.
pub fn render_shards(
    image: &StoreImage,
    dirty: &BTreeSet<Shard>,
) -> Result<Vec<ShardWrite>, StorageError> {
    let mut writes = Vec::with_capacity(dirty.len() + 1);
    for shard in dirty {
        let content = match *shard {
            Shard::Patterns(status, category) => {
                let patterns = image.shard_patterns(status, category);
                if patterns.is_empty() {
                    None
                } else {
                    Some(to_pretty(&patterns)?)
                }
            }
            Shard::History => {
                let histories: Vec<&PatternHistory> = image.histories.values().collect();
                Some(to_pretty(&histories)?)
            }
            Shard::Snapshot(date) => image.snapshots.get(&date).map(to_pretty).transpose()?,
            Shard::Severity => image.severity.as_ref().map(to_pretty).transpose()?,
            Shard::ChangeLog => Some(to_pretty(&image.changes)?),
        };
        writes.push(ShardWrite {
            path: shard_path(*shard).to_string_lossy().to_string(),
            content,
        });
    }
    writes.push(ShardWrite {
        path: META_FILE.to_string(),
        content: Some(to_pretty(&StoreMeta {
            format_version: JSON_FORMAT_VERSION,
            backend: "json".to_string(),
            generation: image.generation,
        })?),
    });
    Ok(writes)
}

/// Write `content` to `path` through a temp file and rename.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent.display(), e))?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp).map_err(|e| StorageError::io(tmp.display(), e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| StorageError::io(tmp.display(), e))?;
    file.sync_all().map_err(|e| StorageError::io(tmp.display(), e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| StorageError::io(path.display(), e))
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path.display(), e)),
    }
}

fn read_existing(path: &Path) -> Result<Option<String>, StorageError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path.display(), e)),
    }
}

fn apply_writes(dir: &Path, writes: &[ShardWrite]) -> Result<(), StorageError> {
    for write in writes {
        let path = dir.join(&write.path);
        match &write.content {
            Some(content) => write_atomic(&path, content)?,
            None => remove_if_exists(&path)?,
        }
    }
    Ok(())
}

/// Commit shard writes: journal first, then the shards, then drop the journal.
///
/// If a shard write fails the journal is marked aborted, the shards already
/// written are restored, and the write error is returned. An aborted journal
/// left behind by a failed restore is rolled back, never forward, on replay.
pub fn commit(dir: &Path, journal: &Journal) -> Result<(), StorageError> {
    let journal_path = dir.join(JOURNAL_FILE);
    write_atomic(&journal_path, &to_pretty(journal)?)?;
    if let Err(e) = apply_writes(dir, &journal.writes) {
        let aborted = Journal {
            aborted: true,
            ..journal.clone()
        };
        write_atomic(&journal_path, &to_pretty(&aborted)?)?;
        match apply_writes(dir, &journal.undo) {
            Ok(()) => remove_if_exists(&journal_path)?,
            Err(restore) => tracing::warn!(
                generation = journal.generation,
                error = %restore,
                "json store rollback incomplete, retrying on next open"
            ),
        }
        return Err(e);
    }
    remove_if_exists(&journal_path)
}

/// Finish an interrupted commit: roll it forward, or back when it was
/// aborted. Returns whether a journal was found.
pub fn replay_journal(dir: &Path) -> Result<bool, StorageError> {
    let journal_path = dir.join(JOURNAL_FILE);
    let Some(journal) = read_json::<Journal>(&journal_path)? else {
        return Ok(false);
    };
    let writes = if journal.aborted { &journal.undo } else { &journal.writes };
    apply_writes(dir, writes)?;
    remove_if_exists(&journal_path)?;
    tracing::warn!(
        generation = journal.generation,
        writes = writes.len(),
        rolled_back = journal.aborted,
        "replayed interrupted json store commit"
    );
    Ok(true)
}

/// Read and decode a JSON file, `None` if it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path.display(), e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StorageError::DbCorrupt {
            details: format!("{}: {e}", path.display()),
        })
}

pub fn read_meta(dir: &Path) -> Result<Option<StoreMeta>, StorageError> {
    read_json(&dir.join(META_FILE))
}

/// Load the full image from disk.
pub fn load_image(dir: &Path) -> Result<StoreImage, StorageError> {
    let mut image = StoreImage::default();

    for status in PatternStatus::ALL {
        for category in PatternCategory::ALL {
            let path = dir.join(shard_path(Shard::Patterns(status, category)));
            let Some(patterns) = read_json::<Vec<Pattern>>(&path)? else {
                continue;
            };
            for pattern in patterns {
                let id = pattern.id.clone();
                if image.patterns.insert(id.clone(), pattern).is_some() {
                    return Err(StorageError::DbCorrupt {
                        details: format!("pattern '{id}' is stored in more than one shard"),
                    });
                }
            }
        }
    }

    let history_path = dir.join(shard_path(Shard::History));
    if let Some(histories) = read_json::<Vec<PatternHistory>>(&history_path)? {
        image.histories = histories
            .into_iter()
            .map(|h| (h.pattern_id.clone(), h))
            .collect();
    }

    let snapshots_dir = dir.join(HISTORY_DIR).join(SNAPSHOTS_DIR);
    if snapshots_dir.is_dir() {
        let entries =
            fs::read_dir(&snapshots_dir).map_err(|e| StorageError::io(snapshots_dir.display(), e))?;
        for entry in entries {
            let path = entry
                .map_err(|e| StorageError::io(snapshots_dir.display(), e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(date) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            else {
                continue;
            };
            if let Some(snapshot) = read_json::<Snapshot>(&path)? {
                image.snapshots.insert(date, snapshot);
            }
        }
    }

    image.severity = read_json(&dir.join(SEVERITY_FILE))?;
    image.changes = read_json::<ChangeLogDoc>(&dir.join(CHANGELOG_FILE))?.unwrap_or_default();
    image.generation = read_meta(dir)?.map(|m| m.generation).unwrap_or(0);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_paths_follow_status_and_category() {
        assert_eq!(
            shard_path(Shard::Patterns(PatternStatus::Approved, PatternCategory::DataAccess)),
            Path::new("patterns").join("approved").join("data-access.json")
        );
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            shard_path(Shard::Snapshot(date)),
            Path::new("history").join("snapshots").join("2024-03-09.json")
        );
    }

    #[test]
    fn journal_is_replayed_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal {
            generation: 1,
            writes: vec![ShardWrite {
                path: SEVERITY_FILE.to_string(),
                content: Some("null".to_string()),
            }],
            ..Journal::default()
        };
        write_atomic(&dir.path().join(JOURNAL_FILE), &serde_json::to_string(&journal).unwrap())
            .unwrap();

        assert!(replay_journal(dir.path()).unwrap());
        assert!(dir.path().join(SEVERITY_FILE).exists());
        assert!(!dir.path().join(JOURNAL_FILE).exists());
        assert!(!replay_journal(dir.path()).unwrap());
    }

    #[test]
    fn aborted_journal_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        write_atomic(&dir.path().join(SEVERITY_FILE), "{}").unwrap();
        let journal = Journal::prepare(
            dir.path(),
            2,
            vec![
                ShardWrite {
                    path: SEVERITY_FILE.to_string(),
                    content: Some("null".to_string()),
                },
                ShardWrite {
                    path: CHANGELOG_FILE.to_string(),
                    content: Some("[]".to_string()),
                },
            ],
        )
        .unwrap();
        assert_eq!(journal.undo[0].content.as_deref(), Some("{}"));
        assert_eq!(journal.undo[1].content, None);

        // Simulate a crash after the first shard landed and the commit was
        // marked aborted.
        write_atomic(&dir.path().join(SEVERITY_FILE), "null").unwrap();
        let aborted = Journal {
            aborted: true,
            ..journal
        };
        write_atomic(&dir.path().join(JOURNAL_FILE), &serde_json::to_string(&aborted).unwrap())
            .unwrap();

        assert!(replay_journal(dir.path()).unwrap());
        assert_eq!(fs::read_to_string(dir.path().join(SEVERITY_FILE)).unwrap(), "{}");
        assert!(!dir.path().join(CHANGELOG_FILE).exists());
        assert!(!dir.path().join(JOURNAL_FILE).exists());
    }
}
