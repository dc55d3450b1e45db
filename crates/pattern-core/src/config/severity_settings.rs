//! `[severity]` section: overrides and escalation as written in TOML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ESCALATION_THRESHOLD;
use crate::types::{EscalationConfig, EscalationRule, PatternCategory, Severity, SeverityConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeveritySettings {
    pub default_severity: Option<Severity>,
    pub pattern_overrides: BTreeMap<String, Severity>,
    pub category_overrides: BTreeMap<PatternCategory, Severity>,
    /// Replaces the built-in default for the listed categories only.
    pub category_defaults: BTreeMap<PatternCategory, Severity>,
    pub escalation: EscalationSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationSettings {
    pub enabled: Option<bool>,
    pub threshold: Option<u32>,
    pub rules: Vec<EscalationRule>,
}

impl SeveritySettings {
    /// Resolve into a full configuration seeded with built-in defaults.
    pub fn to_severity_config(&self) -> SeverityConfig {
        let mut config = SeverityConfig::default();
        if let Some(default) = self.default_severity {
            config.default_severity = default;
        }
        config.pattern_overrides = self.pattern_overrides.clone();
        config.category_overrides = self.category_overrides.clone();
        for (category, severity) in &self.category_defaults {
            config.category_defaults.insert(*category, *severity);
        }
        config.escalation = EscalationConfig {
            enabled: self.escalation.enabled.unwrap_or(false),
            threshold: self
                .escalation
                .threshold
                .unwrap_or(DEFAULT_ESCALATION_THRESHOLD),
            rules: self.escalation.rules.clone(),
        };
        config
    }
}
