//! Query modules, one per table group. All functions take a borrowed
//! `Connection` (or `Transaction`, which derefs to one) and map SQLite
//! failures into `StorageError`.

pub mod change_log;
pub mod contracts;
pub mod history;
pub mod locations;
pub mod patterns;
pub mod sensitive_fields;
pub mod severity;
pub mod snapshots;
pub mod util;
