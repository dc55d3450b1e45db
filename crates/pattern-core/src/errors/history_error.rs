//! History ledger errors.

use super::error_code::{self, ErrorCode};
use super::storage_error::StorageError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistoryError {
    #[error("No history recorded for pattern {pattern_id}")]
    NotFound { pattern_id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ErrorCode for HistoryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => error_code::HISTORY_NOT_FOUND,
            Self::Storage(e) => e.error_code(),
        }
    }
}
