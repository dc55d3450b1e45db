//! Storage backend selection and lock-contention settings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_READ_POOL_SIZE, DRIFT_DIR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sqlite,
    Json,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `sqlite` (default) or `json`.
    pub backend: Option<BackendKind>,
    /// Store directory, relative to the project root. Default: `.drift`.
    pub directory: Option<String>,
    /// How long a writer waits on lock contention before failing.
    pub busy_timeout_ms: Option<u64>,
    /// Read-only connections for file-backed SQLite stores.
    pub read_pool_size: Option<usize>,
}

impl StorageConfig {
    pub fn effective_backend(&self) -> BackendKind {
        self.backend.unwrap_or(BackendKind::Sqlite)
    }

    pub fn effective_directory(&self, root: &Path) -> PathBuf {
        root.join(self.directory.as_deref().unwrap_or(DRIFT_DIR))
    }

    pub fn effective_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS))
    }

    pub fn effective_read_pool_size(&self) -> usize {
        self.read_pool_size.unwrap_or(DEFAULT_READ_POOL_SIZE)
    }
}
