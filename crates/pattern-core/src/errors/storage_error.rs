//! Storage errors.

use super::error_code::{self, ErrorCode};

/// Errors raised by the persistence layer. Any of these aborts and rolls
/// back the enclosing transaction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("Constraint violation on {entity}: {constraint}")]
    ConstraintViolation { entity: String, constraint: String },

    #[error("Store I/O error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("Migration failed at version {version}: {message}")]
    MigrationFailed { version: u32, message: String },

    #[error("Schema version {found} is newer than supported version {supported}")]
    SchemaMismatch { found: u32, supported: u32 },

    #[error("Database busy: {operation}")]
    DbBusy { operation: String },

    #[error("Database corrupt: {details}")]
    DbCorrupt { details: String },

    #[error("Disk full")]
    DiskFull,

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Operation '{operation}' not supported: {reason}")]
    NotSupported { operation: String, reason: String },
}

impl StorageError {
    pub fn constraint(entity: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            entity: entity.into(),
            constraint: constraint.into(),
        }
    }

    pub fn io(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

impl ErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConstraintViolation { .. } => error_code::CONSTRAINT_VIOLATION,
            Self::Io { .. } => error_code::STORE_IO_ERROR,
            Self::SqliteError { .. } => error_code::STORAGE_ERROR,
            Self::MigrationFailed { .. } => error_code::MIGRATION_FAILED,
            Self::SchemaMismatch { .. } => error_code::SCHEMA_MISMATCH,
            Self::DbBusy { .. } => error_code::DB_BUSY,
            Self::DbCorrupt { .. } => error_code::DB_CORRUPT,
            Self::DiskFull => error_code::DISK_FULL,
            Self::Serialization { .. } => error_code::SERIALIZATION_ERROR,
            Self::NotSupported { .. } => error_code::NOT_SUPPORTED,
        }
    }
}
