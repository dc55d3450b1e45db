//! Error mapping and column codecs shared by the query modules.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use pattern_core::errors::StorageError;
use rusqlite::ErrorCode;

/// Map a rusqlite error to the storage taxonomy.
///
/// Constraint failures keep SQLite's message, which names the violated
/// constraint (e.g. `UNIQUE constraint failed: patterns.id`).
pub fn sqlite_err(e: rusqlite::Error) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ref err, ref msg) = e {
        let detail = msg.clone().unwrap_or_else(|| err.to_string());
        return match err.code {
            ErrorCode::ConstraintViolation => StorageError::ConstraintViolation {
                entity: constraint_entity(&detail),
                constraint: detail,
            },
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                StorageError::DbBusy { operation: detail }
            }
            ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                StorageError::DbCorrupt { details: detail }
            }
            ErrorCode::DiskFull => StorageError::DiskFull,
            ErrorCode::CannotOpen | ErrorCode::SystemIoFailure => StorageError::Io {
                path: "<database>".to_string(),
                message: detail,
            },
            _ => StorageError::SqliteError { message: detail },
        };
    }
    StorageError::SqliteError {
        message: e.to_string(),
    }
}

/// Best-effort table name from messages like
/// `CHECK constraint failed: patterns` or `UNIQUE constraint failed: t.col`.
fn constraint_entity(detail: &str) -> String {
    detail
        .split_once(": ")
        .and_then(|(_, tail)| tail.split(['.', ',', ' ']).next())
        .filter(|s| !s.is_empty())
        .unwrap_or("database")
        .to_string()
}

pub fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn ts_from_sql(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::serialization(format!("bad timestamp '{s}': {e}")))
}

pub fn opt_ts_from_sql(s: Option<String>) -> Result<Option<DateTime<Utc>>, StorageError> {
    s.as_deref().map(ts_from_sql).transpose()
}

pub fn date_to_sql(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn date_from_sql(s: &str) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| StorageError::serialization(format!("bad date '{s}': {e}")))
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(StorageError::serialization)
}

pub fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, StorageError> {
    serde_json::from_str(s).map_err(StorageError::serialization)
}

/// Parse an enum column through its `FromStr` impl.
pub fn parse_enum<T>(s: &str) -> Result<T, StorageError>
where
    T: std::str::FromStr<Err = String>,
{
    s.parse::<T>().map_err(StorageError::serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_table_from_constraint_messages() {
        assert_eq!(
            constraint_entity("UNIQUE constraint failed: patterns.id"),
            "patterns"
        );
        assert_eq!(
            constraint_entity("UNIQUE constraint failed: contracts.method, contracts.normalized_endpoint"),
            "contracts"
        );
        assert_eq!(constraint_entity("FOREIGN KEY constraint failed"), "database");
    }

    #[test]
    fn timestamps_round_trip_at_microsecond_precision() {
        let now = Utc::now();
        let back = ts_from_sql(&ts_to_sql(&now)).unwrap();
        assert!((now - back).num_microseconds().unwrap().abs() < 1);
    }
}
