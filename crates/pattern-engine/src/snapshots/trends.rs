//! Trend classification between two snapshots.

use pattern_core::config::TrendThresholds;
use pattern_core::types::{
    PatternSummary, PatternTrend, Snapshot, TrendMetric, TrendSeverity, TrendType,
};
use serde::Serialize;

/// Absorbs float error at threshold boundaries.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSummary {
    pub regressions: usize,
    pub improvements: usize,
    pub critical: usize,
    pub direction: TrendDirection,
}

/// Classify every metric change between `previous` and `current`.
///
/// Only patterns present in both snapshots are compared. Trends are
/// ordered by pattern id, then confidence, compliance, outliers.
pub fn calculate_trends(
    current: &Snapshot,
    previous: &Snapshot,
    thresholds: &TrendThresholds,
) -> Vec<PatternTrend> {
    let mut trends = Vec::new();
    for cur in &current.patterns {
        let Some(prev) = previous.pattern(&cur.id) else {
            continue;
        };
        trends.extend(confidence_trend(prev, cur, thresholds));
        trends.extend(compliance_trend(prev, cur, thresholds));
        trends.extend(outlier_trend(prev, cur, thresholds));
    }
    trends
}

pub fn summarize(trends: &[PatternTrend]) -> TrendSummary {
    let regressions = trends
        .iter()
        .filter(|t| t.trend_type == TrendType::Regression)
        .count();
    let improvements = trends.len() - regressions;
    let critical = trends
        .iter()
        .filter(|t| t.severity == TrendSeverity::Critical)
        .count();
    let direction = match improvements.cmp(&regressions) {
        std::cmp::Ordering::Greater => TrendDirection::Improving,
        std::cmp::Ordering::Less => TrendDirection::Declining,
        std::cmp::Ordering::Equal => TrendDirection::Stable,
    };
    TrendSummary {
        regressions,
        improvements,
        critical,
        direction,
    }
}

struct Change {
    trend_type: TrendType,
    metric: TrendMetric,
    severity: TrendSeverity,
    previous: f64,
    current: f64,
    change_percent: Option<f64>,
    details: String,
}

fn trend(summary: &PatternSummary, c: Change) -> PatternTrend {
    PatternTrend {
        pattern_id: summary.id.clone(),
        pattern_name: summary.name.clone(),
        category: summary.category,
        trend_type: c.trend_type,
        metric: c.metric,
        severity: c.severity,
        previous_value: c.previous,
        current_value: c.current,
        change: c.current - c.previous,
        change_percent: c.change_percent,
        details: c.details,
    }
}

/// Relative change. A zero baseline has no relative change and never
/// classifies.
fn confidence_trend(
    prev: &PatternSummary,
    cur: &PatternSummary,
    t: &TrendThresholds,
) -> Option<PatternTrend> {
    if prev.confidence <= 0.0 {
        return None;
    }
    let relative = (cur.confidence - prev.confidence) / prev.confidence;
    let (trend_type, severity) = if -relative + EPSILON >= t.confidence_regression_threshold {
        let severity = if -relative + EPSILON >= t.confidence_critical_drop {
            TrendSeverity::Critical
        } else {
            TrendSeverity::Warning
        };
        (TrendType::Regression, severity)
    } else if relative + EPSILON >= t.confidence_regression_threshold {
        (TrendType::Improvement, TrendSeverity::Info)
    } else {
        return None;
    };
    Some(trend(
        cur,
        Change {
            trend_type,
            metric: TrendMetric::Confidence,
            severity,
            previous: prev.confidence,
            current: cur.confidence,
            change_percent: Some(relative * 100.0),
            details: format!(
                "confidence {} {:.1}% ({:.2} -> {:.2})",
                verb(trend_type),
                relative.abs() * 100.0,
                prev.confidence,
                cur.confidence
            ),
        },
    ))
}

/// Absolute change in compliance rate.
fn compliance_trend(
    prev: &PatternSummary,
    cur: &PatternSummary,
    t: &TrendThresholds,
) -> Option<PatternTrend> {
    let delta = cur.compliance_rate - prev.compliance_rate;
    let (trend_type, severity) = if delta + EPSILON >= t.compliance_improvement_threshold {
        (TrendType::Improvement, TrendSeverity::Info)
    } else if -delta + EPSILON >= t.compliance_regression_threshold {
        let severity = if -delta + EPSILON >= 2.0 * t.compliance_regression_threshold {
            TrendSeverity::Critical
        } else {
            TrendSeverity::Warning
        };
        (TrendType::Regression, severity)
    } else {
        return None;
    };
    let change_percent = (prev.compliance_rate > 0.0).then(|| delta / prev.compliance_rate * 100.0);
    Some(trend(
        cur,
        Change {
            trend_type,
            metric: TrendMetric::Compliance,
            severity,
            previous: prev.compliance_rate,
            current: cur.compliance_rate,
            change_percent,
            details: format!(
                "compliance {} {:.1} points ({:.1}% -> {:.1}%)",
                verb(trend_type),
                delta.abs() * 100.0,
                prev.compliance_rate * 100.0,
                cur.compliance_rate * 100.0
            ),
        },
    ))
}

/// Outlier growth only ever regresses.
fn outlier_trend(
    prev: &PatternSummary,
    cur: &PatternSummary,
    t: &TrendThresholds,
) -> Option<PatternTrend> {
    if cur.outlier_count <= prev.outlier_count {
        return None;
    }
    let increase = cur.outlier_count - prev.outlier_count;
    let severity = if prev.outlier_count == 0 {
        if increase < t.outlier_min_increase {
            return None;
        }
        TrendSeverity::Warning
    } else {
        let needed = t.outlier_increase_ratio * f64::from(prev.outlier_count);
        if f64::from(increase) + EPSILON < needed {
            return None;
        }
        if cur.outlier_count >= 2 * prev.outlier_count {
            TrendSeverity::Critical
        } else {
            TrendSeverity::Warning
        }
    };
    let change_percent = (prev.outlier_count > 0)
        .then(|| f64::from(increase) / f64::from(prev.outlier_count) * 100.0);
    Some(trend(
        cur,
        Change {
            trend_type: TrendType::Regression,
            metric: TrendMetric::Outliers,
            severity,
            previous: f64::from(prev.outlier_count),
            current: f64::from(cur.outlier_count),
            change_percent,
            details: format!(
                "outliers grew by {increase} ({} -> {})",
                prev.outlier_count, cur.outlier_count
            ),
        },
    ))
}

fn verb(trend_type: TrendType) -> &'static str {
    match trend_type {
        TrendType::Regression => "dropped",
        TrendType::Improvement => "rose",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use pattern_core::types::{compliance_rate, PatternCategory, PatternStatus, Severity};

    fn summary(id: &str, confidence: f64, locations: u32, outliers: u32) -> PatternSummary {
        PatternSummary {
            id: id.to_string(),
            name: id.to_string(),
            category: PatternCategory::Api,
            confidence,
            location_count: locations,
            outlier_count: outliers,
            compliance_rate: compliance_rate(locations, outliers),
            status: PatternStatus::Discovered,
            severity: Severity::Warning,
        }
    }

    fn snapshot(day: u32, patterns: Vec<PatternSummary>) -> Snapshot {
        let summary = pattern_core::types::SnapshotSummary::from_patterns(&patterns);
        Snapshot {
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            created_at: Utc::now(),
            patterns,
            summary,
        }
    }

    fn classify(prev: PatternSummary, cur: PatternSummary) -> Vec<PatternTrend> {
        calculate_trends(
            &snapshot(2, vec![cur]),
            &snapshot(1, vec![prev]),
            &TrendThresholds::default(),
        )
    }

    #[test]
    fn confidence_boundaries() {
        // 0.15 relative drop is a warning, 0.20 is critical.
        let warn = classify(summary("p", 1.0, 10, 0), summary("p", 0.85, 10, 0));
        assert_eq!(warn.len(), 1);
        assert_eq!(warn[0].severity, TrendSeverity::Warning);

        let crit = classify(summary("p", 1.0, 10, 0), summary("p", 0.80, 10, 0));
        assert_eq!(crit[0].severity, TrendSeverity::Critical);

        let up = classify(summary("p", 0.6, 10, 0), summary("p", 0.7, 10, 0));
        assert_eq!(up[0].trend_type, TrendType::Improvement);
        assert_eq!(up[0].severity, TrendSeverity::Info);

        assert!(classify(summary("p", 0.8, 10, 0), summary("p", 0.75, 10, 0)).is_empty());
    }

    #[test]
    fn compliance_drop_doubles_to_critical() {
        // 10/10 -> 8/10 located, 2 outliers: compliance 1.0 -> 0.8.
        let trends = classify(summary("p", 0.8, 10, 0), summary("p", 0.8, 8, 2));
        let compliance: Vec<_> = trends
            .iter()
            .filter(|t| t.metric == TrendMetric::Compliance)
            .collect();
        assert_eq!(compliance.len(), 1);
        assert_eq!(compliance[0].trend_type, TrendType::Regression);
        assert_eq!(compliance[0].severity, TrendSeverity::Critical);
    }

    #[test]
    fn outliers_from_zero_need_min_increase() {
        let two = classify(summary("p", 0.8, 100, 0), summary("p", 0.8, 100, 2));
        assert!(two.iter().all(|t| t.metric != TrendMetric::Outliers));

        let three = classify(summary("p", 0.8, 100, 0), summary("p", 0.8, 100, 3));
        let outliers: Vec<_> = three.iter().filter(|t| t.metric == TrendMetric::Outliers).collect();
        assert_eq!(outliers.len(), 1);
        assert_eq!(outliers[0].severity, TrendSeverity::Warning);
        assert_eq!(outliers[0].change_percent, None);
    }

    #[test]
    fn outliers_doubling_is_critical() {
        let trends = classify(summary("p", 0.8, 100, 4), summary("p", 0.8, 100, 8));
        let outliers: Vec<_> =
            trends.iter().filter(|t| t.metric == TrendMetric::Outliers).collect();
        assert_eq!(outliers[0].severity, TrendSeverity::Critical);

        let trends = classify(summary("p", 0.8, 100, 4), summary("p", 0.8, 100, 6));
        let outliers: Vec<_> =
            trends.iter().filter(|t| t.metric == TrendMetric::Outliers).collect();
        assert_eq!(outliers[0].severity, TrendSeverity::Warning);
    }

    #[test]
    fn summary_direction() {
        let trends = classify(summary("p", 0.9, 10, 0), summary("p", 0.7, 10, 0));
        let s = summarize(&trends);
        assert_eq!(s.regressions, 1);
        assert_eq!(s.critical, 1);
        assert_eq!(s.direction, TrendDirection::Declining);
        assert_eq!(summarize(&[]).direction, TrendDirection::Stable);
    }
}
