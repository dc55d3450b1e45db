//! Severity resolution and count-based escalation.
//!
//! Resolution order for a pattern: pattern override, category override,
//! category default, global default. Escalation raises the resolved value
//! once a pattern (or its category) has accumulated enough violations.

pub mod compare;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use pattern_core::errors::{ConfigError, StorageError};
use pattern_core::types::{EscalationConfig, Pattern, PatternCategory, Severity, SeverityConfig};
use pattern_storage::{Mutation, StorageBackend, WriteBatch};
use rustc_hash::FxHashMap;
use serde::Serialize;

pub use self::compare::{filter_by_severity, group_by_severity, max_severity, sort_by_severity};

/// Violations seen since the last reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationCounters {
    pub total: u64,
    pub by_pattern: FxHashMap<String, u32>,
    pub by_category: BTreeMap<PatternCategory, u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeveritySummary {
    pub total: usize,
    pub blocking: usize,
    pub by_severity: BTreeMap<Severity, usize>,
}

pub struct SeverityEngine {
    backend: Option<Arc<dyn StorageBackend>>,
    config: RwLock<SeverityConfig>,
    counters: Mutex<ViolationCounters>,
}

impl SeverityEngine {
    /// An engine with no persistence.
    pub fn new(config: SeverityConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            backend: None,
            config: RwLock::new(config),
            counters: Mutex::new(ViolationCounters::default()),
        })
    }

    /// An engine that loads its configuration from `backend`, falling back
    /// to `fallback` when none has been saved.
    pub fn with_backend(
        backend: Arc<dyn StorageBackend>,
        fallback: SeverityConfig,
    ) -> Result<Self, ConfigError> {
        let config = match backend.load_severity_config() {
            Ok(Some(stored)) => stored,
            Ok(None) => fallback,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "stored severity config unreadable, using configured values"
                );
                fallback
            }
        };
        config.validate()?;
        Ok(Self {
            backend: Some(backend),
            config: RwLock::new(config),
            counters: Mutex::new(ViolationCounters::default()),
        })
    }

    pub fn config(&self) -> SeverityConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    // --- Resolution ---

    pub fn effective_severity(&self, pattern_id: &str, category: PatternCategory) -> Severity {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        resolve(&config, pattern_id, category)
    }

    /// Count one violation. Returns the pattern's new count.
    pub fn record_violation(&self, pattern_id: &str, category: PatternCategory) -> u32 {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.total += 1;
        *counters.by_category.entry(category).or_default() += 1;
        let count = counters.by_pattern.entry(pattern_id.to_string()).or_default();
        *count += 1;
        *count
    }

    /// Resolved severity, raised by the first matching escalation rule when
    /// escalation is enabled.
    pub fn effective_severity_with_escalation(
        &self,
        pattern_id: &str,
        category: PatternCategory,
    ) -> Severity {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        let base = resolve(&config, pattern_id, category);
        if !config.escalation.enabled {
            return base;
        }
        let count = {
            let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
            let by_pattern = counters.by_pattern.get(pattern_id).copied().unwrap_or(0);
            let by_category = counters.by_category.get(&category).copied().unwrap_or(0);
            by_pattern.max(by_category)
        };
        escalate(&config.escalation, base, count)
    }

    pub fn reset_counters(&self) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters = ViolationCounters::default();
    }

    pub fn counters(&self) -> ViolationCounters {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    // --- Overrides ---

    pub fn set_pattern_override(&self, pattern_id: &str, severity: Severity) {
        self.write(|c| {
            c.pattern_overrides.insert(pattern_id.to_string(), severity);
        });
    }

    /// Returns `false` when no override was set.
    pub fn clear_pattern_override(&self, pattern_id: &str) -> bool {
        self.write(|c| c.pattern_overrides.remove(pattern_id).is_some())
    }

    pub fn set_category_override(&self, category: PatternCategory, severity: Severity) {
        self.write(|c| {
            c.category_overrides.insert(category, severity);
        });
    }

    pub fn clear_category_override(&self, category: PatternCategory) -> bool {
        self.write(|c| c.category_overrides.remove(&category).is_some())
    }

    pub fn set_category_default(&self, category: PatternCategory, severity: Severity) {
        self.write(|c| {
            c.category_defaults.insert(category, severity);
        });
    }

    pub fn set_default_severity(&self, severity: Severity) {
        self.write(|c| c.default_severity = severity);
    }

    pub fn set_escalation(&self, escalation: EscalationConfig) -> Result<(), ConfigError> {
        escalation.validate()?;
        self.write(|c| c.escalation = escalation);
        Ok(())
    }

    pub fn replace_config(&self, config: SeverityConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.write(|c| *c = config);
        Ok(())
    }

    fn write<R>(&self, f: impl FnOnce(&mut SeverityConfig) -> R) -> R {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut config)
    }

    // --- Persistence ---

    /// Write the current configuration to the backend. A no-op without one.
    pub fn save(&self) -> Result<(), StorageError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        let batch = WriteBatch::from(vec![Mutation::PutSeverityConfig(self.config())]);
        backend.apply(&batch)?;
        tracing::debug!("severity config saved");
        Ok(())
    }

    /// Replace the in-memory configuration with the stored one. Returns
    /// `false` when nothing has been stored.
    pub fn reload(&self) -> Result<bool, StorageError> {
        let Some(backend) = &self.backend else {
            return Ok(false);
        };
        match backend.load_severity_config()? {
            Some(stored) => {
                self.write(|c| *c = stored);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- Reporting ---

    /// Count patterns by their escalated effective severity.
    pub fn severity_summary(&self, patterns: &[Pattern]) -> SeveritySummary {
        let mut summary = SeveritySummary {
            total: patterns.len(),
            ..SeveritySummary::default()
        };
        for p in patterns {
            let severity = self.effective_severity_with_escalation(&p.id, p.category);
            *summary.by_severity.entry(severity).or_default() += 1;
            if severity.is_blocking() {
                summary.blocking += 1;
            }
        }
        summary
    }
}

fn resolve(config: &SeverityConfig, pattern_id: &str, category: PatternCategory) -> Severity {
    config
        .pattern_overrides
        .get(pattern_id)
        .or_else(|| config.category_overrides.get(&category))
        .or_else(|| config.category_defaults.get(&category))
        .copied()
        .unwrap_or(config.default_severity)
}

fn escalate(escalation: &EscalationConfig, base: Severity, count: u32) -> Severity {
    escalation
        .rules
        .iter()
        .find(|rule| rule.from == base && rule.after_count.unwrap_or(escalation.threshold) <= count)
        .map_or(base, |rule| rule.to)
}
