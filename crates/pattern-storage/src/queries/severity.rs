//! Persisted severity configuration. Counters are never stored.

use std::collections::BTreeMap;

use pattern_core::errors::StorageError;
use pattern_core::types::{EscalationConfig, EscalationRule, SeverityConfig};
use rusqlite::{params, Connection, OptionalExtension};

use super::util::{parse_enum, sqlite_err};

const SCOPE_PATTERN: &str = "pattern";
const SCOPE_CATEGORY: &str = "category";
const SCOPE_CATEGORY_DEFAULT: &str = "category_default";

/// Replace the stored configuration with `config`.
pub fn save_severity_config(
    conn: &Connection,
    config: &SeverityConfig,
) -> Result<(), StorageError> {
    conn.execute_batch(
        "DELETE FROM severity_settings;
         DELETE FROM severity_overrides;
         DELETE FROM escalation_rules;",
    )
    .map_err(sqlite_err)?;

    conn.execute(
        "INSERT INTO severity_settings (id, default_severity, escalation_enabled, escalation_threshold)
         VALUES (1, ?1, ?2, ?3)",
        params![
            config.default_severity.as_str(),
            config.escalation.enabled,
            config.escalation.threshold,
        ],
    )
    .map_err(sqlite_err)?;

    let mut stmt = conn
        .prepare_cached("INSERT INTO severity_overrides (scope, target, severity) VALUES (?1, ?2, ?3)")
        .map_err(sqlite_err)?;
    for (id, sev) in &config.pattern_overrides {
        stmt.execute(params![SCOPE_PATTERN, id, sev.as_str()])
            .map_err(sqlite_err)?;
    }
    for (cat, sev) in &config.category_overrides {
        stmt.execute(params![SCOPE_CATEGORY, cat.as_str(), sev.as_str()])
            .map_err(sqlite_err)?;
    }
    for (cat, sev) in &config.category_defaults {
        stmt.execute(params![SCOPE_CATEGORY_DEFAULT, cat.as_str(), sev.as_str()])
            .map_err(sqlite_err)?;
    }

    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO escalation_rules (position, from_severity, to_severity, after_count)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(sqlite_err)?;
    for (position, rule) in config.escalation.rules.iter().enumerate() {
        stmt.execute(params![
            position as i64,
            rule.from.as_str(),
            rule.to.as_str(),
            rule.after_count,
        ])
        .map_err(sqlite_err)?;
    }
    Ok(())
}

/// Load the stored configuration, or `None` if it was never saved.
pub fn load_severity_config(conn: &Connection) -> Result<Option<SeverityConfig>, StorageError> {
    let settings = conn
        .query_row(
            "SELECT default_severity, escalation_enabled, escalation_threshold
             FROM severity_settings WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            },
        )
        .optional()
        .map_err(sqlite_err)?;
    let Some((default_severity, enabled, threshold)) = settings else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare_cached("SELECT scope, target, severity FROM severity_overrides ORDER BY scope, target")
        .map_err(sqlite_err)?;
    let overrides = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;

    let mut pattern_overrides = BTreeMap::new();
    let mut category_overrides = BTreeMap::new();
    let mut category_defaults = BTreeMap::new();
    for (scope, target, severity) in overrides {
        let severity = parse_enum(&severity)?;
        match scope.as_str() {
            SCOPE_PATTERN => {
                pattern_overrides.insert(target, severity);
            }
            SCOPE_CATEGORY => {
                category_overrides.insert(parse_enum(&target)?, severity);
            }
            SCOPE_CATEGORY_DEFAULT => {
                category_defaults.insert(parse_enum(&target)?, severity);
            }
            other => {
                return Err(StorageError::serialization(format!(
                    "unknown severity override scope: {other}"
                )))
            }
        }
    }

    let mut stmt = conn
        .prepare_cached(
            "SELECT from_severity, to_severity, after_count FROM escalation_rules ORDER BY position",
        )
        .map_err(sqlite_err)?;
    let raw_rules = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<u32>>(2)?,
            ))
        })
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;
    let rules = raw_rules
        .into_iter()
        .map(|(from, to, after_count)| {
            Ok(EscalationRule {
                from: parse_enum(&from)?,
                to: parse_enum(&to)?,
                after_count,
            })
        })
        .collect::<Result<Vec<_>, StorageError>>()?;

    Ok(Some(SeverityConfig {
        default_severity: parse_enum(&default_severity)?,
        pattern_overrides,
        category_overrides,
        category_defaults,
        escalation: EscalationConfig {
            enabled,
            threshold,
            rules,
        },
    }))
}

pub fn delete_severity_config(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "DELETE FROM severity_settings;
         DELETE FROM severity_overrides;
         DELETE FROM escalation_rules;",
    )
    .map_err(sqlite_err)
}
