//! Configuration resolution, validation, and TOML parsing.

use std::collections::HashMap;

use pattern_core::config::{BackendKind, CliOverrides, PatternStoreConfig};
use pattern_core::errors::{ConfigError, ErrorCode};
use pattern_core::types::{PatternCategory, Severity};

#[test]
fn defaults_resolve_to_compiled_constants() {
    let config = PatternStoreConfig::default();
    assert_eq!(config.storage.effective_backend(), BackendKind::Sqlite);
    assert_eq!(config.storage.effective_busy_timeout().as_millis(), 5_000);
    assert_eq!(config.history.effective_max_age_days(), 90);
    assert_eq!(config.history.effective_max_entries_per_pattern(), 100);
    assert_eq!(config.snapshots.effective_max_snapshots(), 30);

    let thresholds = config.snapshots.trend_thresholds();
    assert_eq!(thresholds.confidence_regression_threshold, 0.15);
    assert_eq!(thresholds.confidence_critical_drop, 0.20);
    assert_eq!(thresholds.outlier_min_increase, 3);
}

#[test]
fn parses_every_section() {
    let config = PatternStoreConfig::from_toml(
        r#"
        [storage]
        backend = "json"
        busy_timeout_ms = 250

        [history]
        max_age_days = 7
        max_entries_per_pattern = 3

        [snapshots]
        max_snapshots = 5
        confidence_critical_drop = 0.3

        [severity]
        default_severity = "info"

        [severity.category_overrides]
        styling = "warning"

        [severity.pattern_overrides]
        "api/0001" = "hint"

        [severity.escalation]
        enabled = true
        threshold = 4

        [[severity.escalation.rules]]
        from = "warning"
        to = "error"
        after_count = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.storage.effective_backend(), BackendKind::Json);
    assert_eq!(config.storage.effective_busy_timeout().as_millis(), 250);
    assert_eq!(config.history.effective_max_entries_per_pattern(), 3);
    assert_eq!(config.snapshots.trend_thresholds().confidence_critical_drop, 0.3);

    let severity = config.severity.to_severity_config();
    assert_eq!(severity.default_severity, Severity::Info);
    assert_eq!(
        severity.category_overrides[&PatternCategory::Styling],
        Severity::Warning
    );
    assert_eq!(severity.pattern_overrides["api/0001"], Severity::Hint);
    assert!(severity.escalation.enabled);
    assert_eq!(severity.escalation.threshold, 4);
    assert_eq!(severity.escalation.rules[0].after_count, Some(5));
    // Built-in defaults survive alongside overrides.
    assert_eq!(
        severity.category_defaults[&PatternCategory::Security],
        Severity::Error
    );
}

#[test]
fn rejects_escalation_from_error() {
    let err = PatternStoreConfig::from_toml(
        r#"
        [[severity.escalation.rules]]
        from = "error"
        to = "error"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::ValidationFailed { .. }));
    assert_eq!(err.error_code(), "CONFIG_ERROR");
}

#[test]
fn rejects_out_of_range_thresholds() {
    let err = PatternStoreConfig::from_toml(
        r#"
        [snapshots]
        compliance_regression_threshold = 1.5
        "#,
    )
    .unwrap_err();
    match err {
        ConfigError::ValidationFailed { field, .. } => {
            assert_eq!(field, "snapshots.compliance_regression_threshold")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let err = PatternStoreConfig::from_toml("[storage\nbackend = ").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

#[test]
fn env_overrides_beat_files_and_cli_beats_env() {
    let mut config = PatternStoreConfig::from_toml(
        r#"
        [history]
        max_age_days = 30
        "#,
    )
    .unwrap();

    let env: HashMap<&str, &str> = [
        ("DRIFT_HISTORY_MAX_AGE_DAYS", "14"),
        ("DRIFT_STORAGE_BACKEND", "JSON"),
        ("DRIFT_BUSY_TIMEOUT_MS", "not-a-number"),
    ]
    .into_iter()
    .collect();
    PatternStoreConfig::apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));
    assert_eq!(config.history.effective_max_age_days(), 14);
    assert_eq!(config.storage.effective_backend(), BackendKind::Json);
    // Unparseable values are ignored.
    assert_eq!(config.storage.busy_timeout_ms, None);

    let cli = CliOverrides {
        history_max_age_days: Some(1),
        backend: Some(BackendKind::Sqlite),
        ..Default::default()
    };
    PatternStoreConfig::apply_cli_overrides(&mut config, &cli);
    assert_eq!(config.history.effective_max_age_days(), 1);
    assert_eq!(config.storage.effective_backend(), BackendKind::Sqlite);
}

#[test]
fn merge_only_overrides_present_values() {
    let mut base = PatternStoreConfig::from_toml(
        r#"
        [storage]
        busy_timeout_ms = 100
        [history]
        max_age_days = 10
        "#,
    )
    .unwrap();
    let other = PatternStoreConfig::from_toml(
        r#"
        [history]
        max_entries_per_pattern = 7
        "#,
    )
    .unwrap();
    PatternStoreConfig::merge(&mut base, &other);
    assert_eq!(base.storage.busy_timeout_ms, Some(100));
    assert_eq!(base.history.max_age_days, Some(10));
    assert_eq!(base.history.max_entries_per_pattern, Some(7));
}

#[test]
fn load_reads_project_config_from_store_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".drift")).unwrap();
    std::fs::write(
        dir.path().join(".drift").join("config.toml"),
        "[snapshots]\nmax_snapshots = 9\n",
    )
    .unwrap();

    let cli = CliOverrides {
        busy_timeout_ms: Some(42),
        ..Default::default()
    };
    let config = PatternStoreConfig::load(dir.path(), Some(&cli)).unwrap();
    assert_eq!(config.snapshots.effective_max_snapshots(), 9);
    assert_eq!(config.storage.busy_timeout_ms, Some(42));
}

#[test]
fn toml_round_trip() {
    let config = PatternStoreConfig::from_toml(
        r#"
        [storage]
        backend = "json"
        [severity.escalation]
        enabled = true
        "#,
    )
    .unwrap();
    let text = config.to_toml().unwrap();
    let again = PatternStoreConfig::from_toml(&text).unwrap();
    assert_eq!(again.storage.backend, Some(BackendKind::Json));
    assert_eq!(again.severity.escalation.enabled, Some(true));
}
