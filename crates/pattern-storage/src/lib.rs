//! Persistence layer for the pattern engine.
//!
//! Two backends implement [`StorageBackend`]: [`SqliteBackend`] (WAL,
//! triggers, single writer plus read pool) and [`JsonShardBackend`]
//! (sharded JSON documents committed through a journal). Both enforce the
//! same uniqueness, foreign-key, and check constraints and both append to a
//! change log for external sync.

pub mod backend;
pub mod batch;
pub mod connection;
pub mod export;
pub mod migrations;
pub mod queries;

pub use backend::json::JsonShardBackend;
pub use backend::sqlite::SqliteBackend;
pub use backend::{open_backend, BackendOptions, StorageBackend};
pub use batch::{Mutation, WriteBatch};
pub use export::{ExportDocument, ImportMode, ImportReport};
