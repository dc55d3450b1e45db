//! ErrorCode trait for host-facing error reporting.

/// Every error enum implements this to provide a stable code string that a
/// hosting CLI can map to an exit status.
pub trait ErrorCode {
    /// Returns the error code string (e.g., "PATTERN_NOT_FOUND").
    fn error_code(&self) -> &'static str;

    /// Returns the formatted string: `[ERROR_CODE] message`.
    fn display_string(&self) -> String
    where
        Self: std::fmt::Display,
    {
        format!("[{}] {}", self.error_code(), self)
    }
}

pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const CONSTRAINT_VIOLATION: &str = "CONSTRAINT_VIOLATION";
pub const STORE_IO_ERROR: &str = "STORE_IO_ERROR";
pub const DB_BUSY: &str = "DB_BUSY";
pub const DB_CORRUPT: &str = "DB_CORRUPT";
pub const DISK_FULL: &str = "DISK_FULL";
pub const MIGRATION_FAILED: &str = "MIGRATION_FAILED";
pub const SCHEMA_MISMATCH: &str = "SCHEMA_MISMATCH";
pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
pub const NOT_SUPPORTED: &str = "NOT_SUPPORTED";
pub const PATTERN_NOT_FOUND: &str = "PATTERN_NOT_FOUND";
pub const INVALID_STATE_TRANSITION: &str = "INVALID_STATE_TRANSITION";
pub const HISTORY_NOT_FOUND: &str = "HISTORY_NOT_FOUND";
pub const SNAPSHOT_NOT_FOUND: &str = "SNAPSHOT_NOT_FOUND";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
