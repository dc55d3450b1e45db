//! Top-level store configuration with layered resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{BackendKind, HistoryConfig, SeveritySettings, SnapshotConfig, StorageConfig};
use crate::constants::{PROJECT_CONFIG_FILE, USER_CONFIG_FILE};
use crate::errors::ConfigError;
use crate::types::Severity;

/// Top-level configuration aggregating all sections.
///
/// Resolution order (highest priority first):
/// 1. CLI flags (applied via `apply_cli_overrides`)
/// 2. Environment variables (`DRIFT_*`)
/// 3. Project config (`.drift/config.toml` in project root)
/// 4. User config (`~/.drift/patterns.toml`)
/// 5. Compiled defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PatternStoreConfig {
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub snapshots: SnapshotConfig,
    pub severity: SeveritySettings,
}

/// CLI override arguments that can be applied to a config.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub backend: Option<BackendKind>,
    pub busy_timeout_ms: Option<u64>,
    pub history_max_age_days: Option<u32>,
    pub max_snapshots: Option<usize>,
    pub escalation_enabled: Option<bool>,
}

impl PatternStoreConfig {
    /// Load configuration with layered resolution rooted at the project `root`.
    pub fn load(root: &Path, cli_overrides: Option<&CliOverrides>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Layer 4 (lowest priority): user config
        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                match Self::merge_toml_file(&mut config, &user_config_path) {
                    Ok(()) => {}
                    Err(e @ ConfigError::ParseError { .. }) => return Err(e),
                    Err(e) => {
                        ::tracing::warn!(error = %e, "ignoring unreadable user config");
                    }
                }
            }
        }

        // Layer 3: project config
        let project_config_path = config
            .storage
            .effective_directory(root)
            .join(PROJECT_CONFIG_FILE);
        if project_config_path.exists() {
            Self::merge_toml_file(&mut config, &project_config_path)?;
        }

        // Layer 2: environment variables
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok());

        // Layer 1 (highest priority): CLI flags
        if let Some(cli) = cli_overrides {
            Self::apply_cli_overrides(&mut config, cli);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(0) = self.storage.busy_timeout_ms {
            return Err(invalid("storage.busy_timeout_ms", "must be greater than 0"));
        }
        if let Some(size) = self.storage.read_pool_size {
            if size == 0 || size > 8 {
                return Err(invalid("storage.read_pool_size", "must be between 1 and 8"));
            }
        }
        if let Some(0) = self.history.max_entries_per_pattern {
            return Err(invalid(
                "history.max_entries_per_pattern",
                "must be greater than 0",
            ));
        }
        if let Some(0) = self.snapshots.max_snapshots {
            return Err(invalid("snapshots.max_snapshots", "must be greater than 0"));
        }
        let ratios = [
            (
                "snapshots.confidence_regression_threshold",
                self.snapshots.confidence_regression_threshold,
            ),
            (
                "snapshots.confidence_critical_drop",
                self.snapshots.confidence_critical_drop,
            ),
            (
                "snapshots.compliance_improvement_threshold",
                self.snapshots.compliance_improvement_threshold,
            ),
            (
                "snapshots.compliance_regression_threshold",
                self.snapshots.compliance_regression_threshold,
            ),
        ];
        for (field, value) in ratios {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(invalid(field, "must be between 0.0 and 1.0"));
                }
            }
        }
        if let Some(ratio) = self.snapshots.outlier_increase_ratio {
            if ratio <= 0.0 {
                return Err(invalid(
                    "snapshots.outlier_increase_ratio",
                    "must be greater than 0.0",
                ));
            }
        }
        self.severity.to_severity_config().validate()
    }

    /// Returns the user config path: `~/.drift/patterns.toml`.
    fn user_config_path() -> Option<PathBuf> {
        dirs_path().map(|d| d.join(USER_CONFIG_FILE))
    }

    /// Merge a TOML file into the existing config.
    /// Unknown keys are silently ignored (forward-compatible).
    fn merge_toml_file(config: &mut Self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let file_config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::merge(config, &file_config);
        Ok(())
    }

    /// Merge `other` into `base`, where `other` values override `base` values
    /// only when `other` has a `Some` (or non-empty) value.
    pub fn merge(base: &mut Self, other: &Self) {
        // Storage
        if other.storage.backend.is_some() {
            base.storage.backend = other.storage.backend;
        }
        if other.storage.directory.is_some() {
            base.storage.directory = other.storage.directory.clone();
        }
        if other.storage.busy_timeout_ms.is_some() {
            base.storage.busy_timeout_ms = other.storage.busy_timeout_ms;
        }
        if other.storage.read_pool_size.is_some() {
            base.storage.read_pool_size = other.storage.read_pool_size;
        }

        // History
        if other.history.enabled.is_some() {
            base.history.enabled = other.history.enabled;
        }
        if other.history.max_age_days.is_some() {
            base.history.max_age_days = other.history.max_age_days;
        }
        if other.history.max_entries_per_pattern.is_some() {
            base.history.max_entries_per_pattern = other.history.max_entries_per_pattern;
        }

        // Snapshots
        let (b, o) = (&mut base.snapshots, &other.snapshots);
        if o.max_snapshots.is_some() {
            b.max_snapshots = o.max_snapshots;
        }
        if o.confidence_regression_threshold.is_some() {
            b.confidence_regression_threshold = o.confidence_regression_threshold;
        }
        if o.confidence_critical_drop.is_some() {
            b.confidence_critical_drop = o.confidence_critical_drop;
        }
        if o.compliance_improvement_threshold.is_some() {
            b.compliance_improvement_threshold = o.compliance_improvement_threshold;
        }
        if o.compliance_regression_threshold.is_some() {
            b.compliance_regression_threshold = o.compliance_regression_threshold;
        }
        if o.outlier_increase_ratio.is_some() {
            b.outlier_increase_ratio = o.outlier_increase_ratio;
        }
        if o.outlier_min_increase.is_some() {
            b.outlier_min_increase = o.outlier_min_increase;
        }

        // Severity: maps merge key by key, rules replace wholesale.
        if other.severity.default_severity.is_some() {
            base.severity.default_severity = other.severity.default_severity;
        }
        for (k, v) in &other.severity.pattern_overrides {
            base.severity.pattern_overrides.insert(k.clone(), *v);
        }
        for (k, v) in &other.severity.category_overrides {
            base.severity.category_overrides.insert(*k, *v);
        }
        for (k, v) in &other.severity.category_defaults {
            base.severity.category_defaults.insert(*k, *v);
        }
        if other.severity.escalation.enabled.is_some() {
            base.severity.escalation.enabled = other.severity.escalation.enabled;
        }
        if other.severity.escalation.threshold.is_some() {
            base.severity.escalation.threshold = other.severity.escalation.threshold;
        }
        if !other.severity.escalation.rules.is_empty() {
            base.severity.escalation.rules = other.severity.escalation.rules.clone();
        }
    }

    /// Apply `DRIFT_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(config: &mut Self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("DRIFT_STORAGE_BACKEND") {
            if let Ok(v) = val.parse::<BackendKind>() {
                config.storage.backend = Some(v);
            }
        }
        if let Some(val) = lookup("DRIFT_STORAGE_DIR") {
            config.storage.directory = Some(val);
        }
        if let Some(val) = lookup("DRIFT_BUSY_TIMEOUT_MS") {
            if let Ok(v) = val.parse::<u64>() {
                config.storage.busy_timeout_ms = Some(v);
            }
        }
        if let Some(val) = lookup("DRIFT_HISTORY_MAX_AGE_DAYS") {
            if let Ok(v) = val.parse::<u32>() {
                config.history.max_age_days = Some(v);
            }
        }
        if let Some(val) = lookup("DRIFT_HISTORY_MAX_ENTRIES") {
            if let Ok(v) = val.parse::<usize>() {
                config.history.max_entries_per_pattern = Some(v);
            }
        }
        if let Some(val) = lookup("DRIFT_MAX_SNAPSHOTS") {
            if let Ok(v) = val.parse::<usize>() {
                config.snapshots.max_snapshots = Some(v);
            }
        }
        if let Some(val) = lookup("DRIFT_DEFAULT_SEVERITY") {
            if let Ok(v) = val.parse::<Severity>() {
                config.severity.default_severity = Some(v);
            }
        }
        if let Some(val) = lookup("DRIFT_ESCALATION_ENABLED") {
            if let Ok(v) = val.parse::<bool>() {
                config.severity.escalation.enabled = Some(v);
            }
        }
    }

    /// Apply CLI overrides to the config.
    pub fn apply_cli_overrides(config: &mut Self, cli: &CliOverrides) {
        if let Some(v) = cli.backend {
            config.storage.backend = Some(v);
        }
        if let Some(v) = cli.busy_timeout_ms {
            config.storage.busy_timeout_ms = Some(v);
        }
        if let Some(v) = cli.history_max_age_days {
            config.history.max_age_days = Some(v);
        }
        if let Some(v) = cli.max_snapshots {
            config.snapshots.max_snapshots = Some(v);
        }
        if let Some(v) = cli.escalation_enabled {
            config.severity.escalation.enabled = Some(v);
        }
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationFailed {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Returns `~/.drift` if the home directory can be determined.
fn dirs_path() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".drift"))
}

/// Cross-platform home directory resolution.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
