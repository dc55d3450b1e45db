//! Pattern store errors.

use super::error_code::{self, ErrorCode};
use super::storage_error::StorageError;
use crate::types::PatternStatus;

/// Errors raised by the pattern entity store.
///
/// `NotFound` and `InvalidStateTransition` are raised before any write is
/// attempted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Pattern not found: {id}")]
    NotFound { id: String },

    #[error("Invalid state transition for pattern {id}: {from} -> {to}")]
    InvalidStateTransition {
        id: String,
        from: PatternStatus,
        to: PatternStatus,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PatternError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_constraint_violation())
    }
}

impl ErrorCode for PatternError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => error_code::PATTERN_NOT_FOUND,
            Self::InvalidStateTransition { .. } => error_code::INVALID_STATE_TRANSITION,
            Self::Storage(e) => e.error_code(),
        }
    }
}
