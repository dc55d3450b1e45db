//! Daily snapshots and the trend records derived from comparing two of them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::pattern::{compliance_rate, Pattern, PatternCategory, PatternStatus};
use super::severity::Severity;

/// Per-pattern state captured in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSummary {
    pub id: String,
    pub name: String,
    pub category: PatternCategory,
    pub confidence: f64,
    pub location_count: u32,
    pub outlier_count: u32,
    pub compliance_rate: f64,
    pub status: PatternStatus,
    pub severity: Severity,
}

impl From<&Pattern> for PatternSummary {
    fn from(p: &Pattern) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            category: p.category,
            confidence: p.confidence.score,
            location_count: p.location_count,
            outlier_count: p.outlier_count,
            compliance_rate: compliance_rate(p.location_count, p.outlier_count),
            status: p.status,
            severity: p.severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub patterns: u32,
    pub avg_confidence: f64,
    pub compliance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub total_patterns: u32,
    pub avg_confidence: f64,
    pub total_locations: u64,
    pub total_outliers: u64,
    pub overall_compliance_rate: f64,
    pub by_category: BTreeMap<PatternCategory, CategorySummary>,
}

impl SnapshotSummary {
    pub fn from_patterns(patterns: &[PatternSummary]) -> Self {
        let total_patterns = patterns.len() as u32;
        let total_locations: u64 = patterns.iter().map(|p| u64::from(p.location_count)).sum();
        let total_outliers: u64 = patterns.iter().map(|p| u64::from(p.outlier_count)).sum();
        let avg_confidence = if patterns.is_empty() {
            0.0
        } else {
            patterns.iter().map(|p| p.confidence).sum::<f64>() / patterns.len() as f64
        };

        let mut grouped: BTreeMap<PatternCategory, (u32, f64, u64, u64)> = BTreeMap::new();
        for p in patterns {
            let entry = grouped.entry(p.category).or_default();
            entry.0 += 1;
            entry.1 += p.confidence;
            entry.2 += u64::from(p.location_count);
            entry.3 += u64::from(p.outlier_count);
        }
        let by_category = grouped
            .into_iter()
            .map(|(category, (count, conf, locs, outs))| {
                (
                    category,
                    CategorySummary {
                        patterns: count,
                        avg_confidence: conf / f64::from(count),
                        compliance_rate: ratio(locs, outs),
                    },
                )
            })
            .collect();

        Self {
            total_patterns,
            avg_confidence,
            total_locations,
            total_outliers,
            overall_compliance_rate: ratio(total_locations, total_outliers),
            by_category,
        }
    }
}

fn ratio(locations: u64, outliers: u64) -> f64 {
    let total = locations + outliers;
    if total == 0 {
        1.0
    } else {
        locations as f64 / total as f64
    }
}

/// One capture per calendar day. A later capture for the same date
/// replaces the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub patterns: Vec<PatternSummary>,
    pub summary: SnapshotSummary,
}

impl Snapshot {
    pub fn capture(date: NaiveDate, created_at: DateTime<Utc>, patterns: &[Pattern]) -> Self {
        let mut summaries: Vec<PatternSummary> =
            patterns.iter().map(PatternSummary::from).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        let summary = SnapshotSummary::from_patterns(&summaries);
        Self {
            date,
            created_at,
            patterns: summaries,
            summary,
        }
    }

    pub fn pattern(&self, id: &str) -> Option<&PatternSummary> {
        self.patterns.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendType {
    Regression,
    Improvement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendMetric {
    Confidence,
    Compliance,
    Outliers,
}

impl fmt::Display for TrendMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Confidence => "confidence",
            Self::Compliance => "compliance",
            Self::Outliers => "outliers",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendSeverity {
    Info,
    Warning,
    Critical,
}

/// A classified change in one metric of one pattern between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternTrend {
    pub pattern_id: String,
    pub pattern_name: String,
    pub category: PatternCategory,
    #[serde(rename = "type")]
    pub trend_type: TrendType,
    pub metric: TrendMetric,
    pub severity: TrendSeverity,
    pub previous_value: f64,
    pub current_value: f64,
    pub change: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(
        id: &str,
        category: PatternCategory,
        conf: f64,
        locs: u32,
        outs: u32,
    ) -> PatternSummary {
        PatternSummary {
            id: id.to_string(),
            name: id.to_string(),
            category,
            confidence: conf,
            location_count: locs,
            outlier_count: outs,
            compliance_rate: compliance_rate(locs, outs),
            status: PatternStatus::Discovered,
            severity: Severity::Warning,
        }
    }

    #[test]
    fn aggregates_by_category() {
        let s = SnapshotSummary::from_patterns(&[
            summary("a", PatternCategory::Api, 0.8, 3, 1),
            summary("b", PatternCategory::Api, 0.6, 1, 0),
            summary("c", PatternCategory::Auth, 1.0, 0, 0),
        ]);
        assert_eq!(s.total_patterns, 3);
        assert_eq!(s.total_locations, 4);
        assert_eq!(s.total_outliers, 1);
        assert!((s.avg_confidence - 0.8).abs() < 1e-9);
        assert!((s.overall_compliance_rate - 0.8).abs() < 1e-9);

        let api = &s.by_category[&PatternCategory::Api];
        assert_eq!(api.patterns, 2);
        assert!((api.avg_confidence - 0.7).abs() < 1e-9);
        assert!((api.compliance_rate - 0.8).abs() < 1e-9);
        assert_eq!(s.by_category[&PatternCategory::Auth].compliance_rate, 1.0);
    }

    #[test]
    fn empty_summary() {
        let s = SnapshotSummary::from_patterns(&[]);
        assert_eq!(s.total_patterns, 0);
        assert_eq!(s.avg_confidence, 0.0);
        assert_eq!(s.overall_compliance_rate, 1.0);
        assert!(s.by_category.is_empty());
    }
}
