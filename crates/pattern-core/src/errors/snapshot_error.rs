//! Snapshot errors.

use super::error_code::{self, ErrorCode};
use super::storage_error::StorageError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("No snapshot for {date}")]
    NotFound { date: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ErrorCode for SnapshotError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => error_code::SNAPSHOT_NOT_FOUND,
            Self::Storage(e) => e.error_code(),
        }
    }
}
