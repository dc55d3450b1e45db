//! Error handling for the pattern engine.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod config_error;
pub mod error_code;
pub mod history_error;
pub mod pattern_error;
pub mod snapshot_error;
pub mod storage_error;
pub mod workspace_error;

pub use config_error::ConfigError;
pub use error_code::ErrorCode;
pub use history_error::HistoryError;
pub use pattern_error::PatternError;
pub use snapshot_error::SnapshotError;
pub use storage_error::StorageError;
pub use workspace_error::WorkspaceError;
