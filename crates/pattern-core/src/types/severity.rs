//! Severity ordering and the persisted severity configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::pattern::PatternCategory;
use crate::constants::DEFAULT_ESCALATION_THRESHOLD;
use crate::errors::ConfigError;

/// Severity levels. Declaration order is the rank order, so the derived
/// `Ord` gives hint < info < warning < error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Error, Self::Warning, Self::Info, Self::Hint];

    /// 0 for hint through 3 for error.
    pub fn rank(&self) -> i32 {
        match self {
            Self::Hint => 0,
            Self::Info => 1,
            Self::Warning => 2,
            Self::Error => 3,
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hint => "hint",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| format!("unknown severity: {s}"))
    }
}

/// Signed rank difference `a - b`.
pub fn compare_severity(a: Severity, b: Severity) -> i32 {
    a.rank() - b.rank()
}

/// Built-in category defaults seeded into every new configuration.
pub fn builtin_category_default(category: PatternCategory) -> Severity {
    use PatternCategory::*;
    match category {
        Security | Auth => Severity::Error,
        Structural | Errors | Api | DataAccess | Config | Performance | Accessibility => {
            Severity::Warning
        }
        Testing | Logging | Components | Types => Severity::Info,
        Styling | Documentation => Severity::Hint,
    }
}

/// Raise `from` to `to` once the violation count reaches `after_count`
/// (or the configured escalation threshold when unset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRule {
    pub from: Severity,
    pub to: Severity,
    #[serde(default, alias = "after_count", skip_serializing_if = "Option::is_none")]
    pub after_count: Option<u32>,
}

impl EscalationRule {
    pub fn new(from: Severity, to: Severity, after_count: u32) -> Self {
        Self {
            from,
            to,
            after_count: Some(after_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationConfig {
    pub enabled: bool,
    pub threshold: u32,
    #[serde(default)]
    pub rules: Vec<EscalationRule>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_ESCALATION_THRESHOLD,
            rules: Vec::new(),
        }
    }
}

impl EscalationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "severity.escalation.threshold".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.from == Severity::Error {
                return Err(ConfigError::ValidationFailed {
                    field: format!("severity.escalation.rules[{i}].from"),
                    message: "error cannot escalate further".to_string(),
                });
            }
            if rule.to <= rule.from {
                return Err(ConfigError::ValidationFailed {
                    field: format!("severity.escalation.rules[{i}].to"),
                    message: format!("{} does not rank above {}", rule.to, rule.from),
                });
            }
            if rule.after_count == Some(0) {
                return Err(ConfigError::ValidationFailed {
                    field: format!("severity.escalation.rules[{i}].after_count"),
                    message: "must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Severity resolution inputs. Violation counters live with the engine and
/// are never part of this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityConfig {
    pub default_severity: Severity,
    #[serde(default)]
    pub pattern_overrides: BTreeMap<String, Severity>,
    #[serde(default)]
    pub category_overrides: BTreeMap<PatternCategory, Severity>,
    #[serde(default)]
    pub category_defaults: BTreeMap<PatternCategory, Severity>,
    #[serde(default)]
    pub escalation: EscalationConfig,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            default_severity: Severity::Warning,
            pattern_overrides: BTreeMap::new(),
            category_overrides: BTreeMap::new(),
            category_defaults: PatternCategory::ALL
                .iter()
                .map(|c| (*c, builtin_category_default(*c)))
                .collect(),
            escalation: EscalationConfig::default(),
        }
    }
}

impl SeverityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.escalation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_follow_declaration_order() {
        assert!(Severity::Hint < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(compare_severity(Severity::Error, Severity::Hint), 3);
        assert_eq!(compare_severity(Severity::Info, Severity::Warning), -1);
        assert!(Severity::Error.is_blocking());
        assert!(!Severity::Warning.is_blocking());
    }

    #[test]
    fn rules_from_error_are_rejected() {
        let escalation = EscalationConfig {
            enabled: true,
            threshold: 5,
            rules: vec![EscalationRule::new(Severity::Error, Severity::Error, 3)],
        };
        assert!(escalation.validate().is_err());
    }

    #[test]
    fn defaults_cover_every_category() {
        let config = SeverityConfig::default();
        assert_eq!(config.category_defaults.len(), PatternCategory::ALL.len());
        assert_eq!(
            config.category_defaults[&PatternCategory::Security],
            Severity::Error
        );
        assert_eq!(
            config.category_defaults[&PatternCategory::Structural],
            Severity::Warning
        );
    }
}
