//! Snapshot retention and trend classification thresholds.

use serde::{Deserialize, Serialize};

use crate::constants::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub max_snapshots: Option<usize>,
    pub confidence_regression_threshold: Option<f64>,
    pub confidence_critical_drop: Option<f64>,
    pub compliance_improvement_threshold: Option<f64>,
    pub compliance_regression_threshold: Option<f64>,
    pub outlier_increase_ratio: Option<f64>,
    pub outlier_min_increase: Option<u32>,
}

/// Resolved thresholds used by trend calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendThresholds {
    /// Relative confidence change (either direction) that yields a trend.
    pub confidence_regression_threshold: f64,
    /// Relative confidence drop at which a regression is critical.
    pub confidence_critical_drop: f64,
    pub compliance_improvement_threshold: f64,
    /// Absolute compliance drop that yields a regression; twice this is critical.
    pub compliance_regression_threshold: f64,
    pub outlier_increase_ratio: f64,
    pub outlier_min_increase: u32,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        SnapshotConfig::default().trend_thresholds()
    }
}

impl SnapshotConfig {
    pub fn effective_max_snapshots(&self) -> usize {
        self.max_snapshots.unwrap_or(DEFAULT_MAX_SNAPSHOTS)
    }

    pub fn trend_thresholds(&self) -> TrendThresholds {
        TrendThresholds {
            confidence_regression_threshold: self
                .confidence_regression_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_REGRESSION_THRESHOLD),
            confidence_critical_drop: self
                .confidence_critical_drop
                .unwrap_or(DEFAULT_CONFIDENCE_CRITICAL_DROP),
            compliance_improvement_threshold: self
                .compliance_improvement_threshold
                .unwrap_or(DEFAULT_COMPLIANCE_IMPROVEMENT_THRESHOLD),
            compliance_regression_threshold: self
                .compliance_regression_threshold
                .unwrap_or(DEFAULT_COMPLIANCE_REGRESSION_THRESHOLD),
            outlier_increase_ratio: self
                .outlier_increase_ratio
                .unwrap_or(DEFAULT_OUTLIER_INCREASE_RATIO),
            outlier_min_increase: self
                .outlier_min_increase
                .unwrap_or(DEFAULT_OUTLIER_MIN_INCREASE),
        }
    }
}
