//! Write connection utilities: BEGIN IMMEDIATE transactions.

use pattern_core::errors::StorageError;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::queries::util::sqlite_err;

/// Execute a write operation inside a BEGIN IMMEDIATE transaction.
/// This acquires the write lock at transaction start, so contention is
/// resolved by the busy timeout instead of failing mid-transaction.
///
/// Any error returned by `f` rolls back every write made inside it,
/// including trigger side effects.
pub fn with_immediate_transaction<F, T>(conn: &Connection, f: F) -> Result<T, StorageError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
{
    // The writer is shared behind `&Connection`, so the checked
    // `Connection::transaction` (which needs `&mut`) is not available.
    // Dropping `tx` without commit rolls back.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate).map_err(|e| {
        StorageError::SqliteError {
            message: format!("failed to begin immediate transaction: {e}"),
        }
    })?;

    let result = f(&tx)?;
    tx.commit().map_err(sqlite_err)?;
    Ok(result)
}
