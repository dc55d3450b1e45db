//! Partial pattern updates.

use chrono::{DateTime, Utc};
use pattern_core::types::{
    ConfidenceInfo, DetectorDescriptor, Pattern, PatternCandidate, PatternCategory,
    PatternLocation, Severity,
};

/// Fields a caller may change on an existing pattern.
///
/// There is no `id` field: identifiers never change. Status moves only
/// through `approve`/`ignore`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<PatternCategory>,
    pub subcategory: Option<String>,
    pub detector: Option<DetectorDescriptor>,
    pub confidence: Option<ConfidenceInfo>,
    pub severity: Option<Severity>,
    pub auto_fixable: Option<bool>,
    /// Replaces both location lists. Entries are sorted into conforming and
    /// outlier lists by their `is_outlier` flag.
    pub locations: Option<Vec<PatternLocation>>,
    pub tags: Option<Vec<String>>,
    pub source: Option<String>,
    pub extra: Option<serde_json::Value>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl PatternUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn confidence(mut self, confidence: ConfidenceInfo) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn locations(mut self, locations: Vec<PatternLocation>) -> Self {
        self.locations = Some(locations);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// The refresh applied when a detector re-observes an existing pattern.
    /// Status, approval stamps, and `first_seen` are left alone.
    pub fn from_candidate(candidate: &PatternCandidate, now: DateTime<Utc>) -> Self {
        let locations = candidate
            .locations
            .iter()
            .cloned()
            .map(|mut l| {
                l.is_outlier = false;
                l
            })
            .chain(candidate.outliers.iter().cloned().map(|mut l| {
                l.is_outlier = true;
                l
            }))
            .collect();
        Self {
            name: Some(candidate.name.clone()),
            description: Some(candidate.description.clone()),
            category: Some(candidate.category),
            subcategory: Some(candidate.subcategory.clone()),
            detector: Some(candidate.detector.clone()),
            confidence: Some(candidate.confidence.clone()),
            severity: Some(candidate.severity),
            auto_fixable: Some(candidate.auto_fixable),
            locations: Some(locations),
            tags: (!candidate.tags.is_empty()).then(|| candidate.tags.clone()),
            source: candidate.source.clone(),
            last_seen: Some(now),
            ..Self::default()
        }
    }

    /// Merge into `pattern`, returning the names of the fields whose value
    /// actually changed.
    pub fn apply_to(&self, pattern: &mut Pattern) -> Vec<&'static str> {
        let mut changed = Vec::new();

        merge(&self.name, &mut pattern.name, "name", &mut changed);
        merge(&self.description, &mut pattern.description, "description", &mut changed);
        merge(&self.category, &mut pattern.category, "category", &mut changed);
        merge(&self.subcategory, &mut pattern.subcategory, "subcategory", &mut changed);
        merge(&self.detector, &mut pattern.detector, "detector", &mut changed);
        merge(&self.severity, &mut pattern.severity, "severity", &mut changed);
        merge(&self.auto_fixable, &mut pattern.auto_fixable, "auto_fixable", &mut changed);
        merge(&self.tags, &mut pattern.metadata.tags, "tags", &mut changed);
        merge(&self.last_seen, &mut pattern.metadata.last_seen, "last_seen", &mut changed);

        if let Some(confidence) = &self.confidence {
            let confidence = confidence.clone().clamped();
            if pattern.confidence != confidence {
                pattern.confidence = confidence;
                changed.push("confidence");
            }
        }
        if let Some(source) = &self.source {
            if pattern.metadata.source.as_ref() != Some(source) {
                pattern.metadata.source = Some(source.clone());
                changed.push("source");
            }
        }
        if let Some(extra) = &self.extra {
            if pattern.metadata.extra.as_ref() != Some(extra) {
                pattern.metadata.extra = Some(extra.clone());
                changed.push("extra");
            }
        }
        if let Some(locations) = &self.locations {
            let mut replaced = pattern.clone();
            replaced.locations = locations.iter().filter(|l| !l.is_outlier).cloned().collect();
            replaced.outliers = locations.iter().filter(|l| l.is_outlier).cloned().collect();
            replaced.normalize();
            if replaced.locations != pattern.locations || replaced.outliers != pattern.outliers {
                pattern.locations = replaced.locations;
                pattern.outliers = replaced.outliers;
                pattern.refresh_counts();
                changed.push("locations");
            }
        }
        changed
    }
}

fn merge<T: PartialEq + Clone>(
    value: &Option<T>,
    target: &mut T,
    field: &'static str,
    changed: &mut Vec<&'static str>,
) {
    if let Some(value) = value {
        if target != value {
            *target = value.clone();
            changed.push(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pattern_core::types::{ConfidenceLevel, DetectorType};

    fn pattern() -> Pattern {
        Pattern::new(
            "p1",
            PatternCategory::Api,
            "rest naming",
            DetectorDescriptor::new(DetectorType::Ast),
            ConfidenceInfo::new(0.8, ConfidenceLevel::Medium),
            Severity::Warning,
        )
        .with_location(PatternLocation::new("a.ts", 1, 0))
    }

    #[test]
    fn reports_only_fields_that_changed() {
        let mut p = pattern();
        let update = PatternUpdate::default()
            .name("rest naming")
            .severity(Severity::Error);
        assert_eq!(update.apply_to(&mut p), vec!["severity"]);
        assert_eq!(p.severity, Severity::Error);
    }

    #[test]
    fn location_replacement_splits_outliers_and_recounts() {
        let mut p = pattern();
        let update = PatternUpdate::default().locations(vec![
            PatternLocation::new("a.ts", 1, 0),
            PatternLocation::new("b.ts", 2, 0).outlier("drift"),
            PatternLocation::new("b.ts", 2, 0).outlier("drift again"),
        ]);
        assert_eq!(update.apply_to(&mut p), vec!["locations"]);
        assert_eq!((p.location_count, p.outlier_count), (1, 1));
        assert_eq!(p.outliers[0].outlier_reason.as_deref(), Some("drift again"));
    }

    #[test]
    fn confidence_is_clamped() {
        let mut p = pattern();
        let mut confidence = ConfidenceInfo::new(0.5, ConfidenceLevel::Low);
        confidence.score = 1.7;
        PatternUpdate::default().confidence(confidence).apply_to(&mut p);
        assert_eq!(p.confidence.score, 1.0);
    }

    #[test]
    fn candidate_refresh_carries_identity_fields() {
        let mut p = pattern();
        p.metadata.first_seen = Utc::now() - chrono::Duration::days(3);
        let first_seen = p.metadata.first_seen;
        let candidate = PatternCandidate {
            id: Some("p1".into()),
            name: "rest resource naming".into(),
            description: String::new(),
            category: PatternCategory::Structural,
            subcategory: "routes".into(),
            detector: p.detector.clone(),
            confidence: p.confidence.clone(),
            severity: p.severity,
            auto_fixable: false,
            locations: vec![PatternLocation::new("a.ts", 1, 0)],
            outliers: Vec::new(),
            tags: Vec::new(),
            source: None,
        };
        let changed = PatternUpdate::from_candidate(&candidate, Utc::now()).apply_to(&mut p);
        assert!(changed.contains(&"name"));
        assert!(changed.contains(&"category"));
        assert!(changed.contains(&"subcategory"));
        assert_eq!(p.name, "rest resource naming");
        assert_eq!(p.category, PatternCategory::Structural);
        assert_eq!(p.subcategory, "routes");
        assert_eq!(p.metadata.first_seen, first_seen);
    }

    #[test]
    fn empty_update_changes_nothing() {
        let mut p = pattern();
        let before = p.clone();
        assert!(PatternUpdate::default().is_empty());
        assert!(PatternUpdate::default().apply_to(&mut p).is_empty());
        assert_eq!(p, before);
    }
}
