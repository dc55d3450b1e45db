//! Configuration system: TOML files, environment overrides, CLI overrides.

pub mod history_config;
pub mod severity_settings;
pub mod snapshot_config;
pub mod storage_config;
pub mod store_config;

pub use history_config::HistoryConfig;
pub use severity_settings::{EscalationSettings, SeveritySettings};
pub use snapshot_config::{SnapshotConfig, TrendThresholds};
pub use storage_config::{BackendKind, StorageConfig};
pub use store_config::{CliOverrides, PatternStoreConfig};
