//! Confidence scoring: evidence signals, score, and discrete level.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIDENCE_HIGH_THRESHOLD, CONFIDENCE_LOW_THRESHOLD, CONFIDENCE_MEDIUM_THRESHOLD,
    DEFAULT_CONFIDENCE_AGE_HORIZON_DAYS,
};

/// Discrete confidence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Uncertain,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub const ALL: [ConfidenceLevel; 4] = [Self::High, Self::Medium, Self::Low, Self::Uncertain];

    /// Bucket a score: High >= 0.85, Medium >= 0.70, Low >= 0.50.
    pub fn from_score(score: f64) -> Self {
        if score >= CONFIDENCE_HIGH_THRESHOLD {
            Self::High
        } else if score >= CONFIDENCE_MEDIUM_THRESHOLD {
            Self::Medium
        } else if score >= CONFIDENCE_LOW_THRESHOLD {
            Self::Low
        } else {
            Self::Uncertain
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Uncertain => "uncertain",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| format!("unknown confidence level: {s}"))
    }
}

/// Evidence signals plus the score/level pair supplied by the detector.
///
/// The store persists `score` and `level` as given and never re-buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInfo {
    #[serde(default)]
    pub frequency: f64,
    #[serde(default)]
    pub consistency: f64,
    #[serde(default)]
    pub age: f64,
    #[serde(default)]
    pub spread: f64,
    pub score: f64,
    pub level: ConfidenceLevel,
}

impl ConfidenceInfo {
    pub fn new(score: f64, level: ConfidenceLevel) -> Self {
        Self {
            frequency: 0.0,
            consistency: 0.0,
            age: 0.0,
            spread: 0.0,
            score: clamp_score(score),
            level,
        }
    }

    pub fn with_signals(mut self, frequency: f64, consistency: f64, age: f64, spread: f64) -> Self {
        self.frequency = frequency.max(0.0);
        self.consistency = consistency.max(0.0);
        self.age = age.max(0.0);
        self.spread = spread.max(0.0);
        self
    }

    /// Copy with the score clamped to [0, 1].
    pub fn clamped(mut self) -> Self {
        self.score = clamp_score(self.score);
        self
    }
}

/// Clamp to [0, 1]; NaN becomes 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub frequency: f64,
    pub consistency: f64,
    pub age: f64,
    pub spread: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            frequency: 0.40,
            consistency: 0.30,
            age: 0.15,
            spread: 0.15,
        }
    }
}

/// Weighted-sum scorer available to detectors that do not compute their own.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    weights: ConfidenceWeights,
    age_horizon_days: f64,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self {
            weights: ConfidenceWeights::default(),
            age_horizon_days: DEFAULT_CONFIDENCE_AGE_HORIZON_DAYS,
        }
    }
}

impl ConfidenceScorer {
    pub fn new(weights: ConfidenceWeights, age_horizon_days: f64) -> Self {
        Self {
            weights,
            age_horizon_days: age_horizon_days.max(1.0),
        }
    }

    /// `age` is in days; the other signals are expected in [0, 1] and are
    /// clamped to it.
    pub fn score(
        &self,
        frequency: f64,
        consistency: f64,
        age_days: f64,
        spread: f64,
    ) -> ConfidenceInfo {
        let age_norm = (age_days.max(0.0) / self.age_horizon_days).min(1.0);
        let w = &self.weights;
        let total = w.frequency + w.consistency + w.age + w.spread;
        let raw = w.frequency * clamp_score(frequency)
            + w.consistency * clamp_score(consistency)
            + w.age * age_norm
            + w.spread * clamp_score(spread);
        let score = if total > 0.0 { clamp_score(raw / total) } else { 0.0 };

        ConfidenceInfo {
            frequency,
            consistency,
            age: age_days,
            spread,
            score,
            level: ConfidenceLevel::from_score(score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_boundaries_are_inclusive() {
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.8499), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.70), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.50), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.49), ConfidenceLevel::Uncertain);
    }

    #[test]
    fn score_is_clamped_and_level_kept() {
        let info = ConfidenceInfo::new(1.7, ConfidenceLevel::Low);
        assert_eq!(info.score, 1.0);
        assert_eq!(info.level, ConfidenceLevel::Low);
        assert_eq!(ConfidenceInfo::new(f64::NAN, ConfidenceLevel::Low).score, 0.0);
        assert_eq!(ConfidenceInfo::new(-0.2, ConfidenceLevel::Low).score, 0.0);
    }

    #[test]
    fn scorer_saturates_age() {
        let scorer = ConfidenceScorer::default();
        let full = scorer.score(1.0, 1.0, 365.0, 1.0);
        assert!((full.score - 1.0).abs() < 1e-9);
        assert_eq!(full.level, ConfidenceLevel::High);

        let young = scorer.score(1.0, 1.0, 0.0, 1.0);
        assert!((young.score - 0.85).abs() < 1e-9);
    }
}
