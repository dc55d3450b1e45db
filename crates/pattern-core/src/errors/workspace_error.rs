//! Workspace errors: the union surfaced by the workspace facade.

use super::error_code::ErrorCode;
use super::{ConfigError, HistoryError, PatternError, SnapshotError, StorageError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl ErrorCode for WorkspaceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
            Self::Pattern(e) => e.error_code(),
            Self::History(e) => e.error_code(),
            Self::Snapshot(e) => e.error_code(),
        }
    }
}
