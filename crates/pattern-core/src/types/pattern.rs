//! Pattern entity: category, status, detector descriptor, locations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use super::confidence::ConfidenceInfo;
use super::severity::Severity;

/// Pattern categories recognised by detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    Api,
    Auth,
    Security,
    Errors,
    Logging,
    DataAccess,
    Config,
    Testing,
    Performance,
    Components,
    Styling,
    Structural,
    Types,
    Accessibility,
    Documentation,
}

impl PatternCategory {
    pub const ALL: [PatternCategory; 15] = [
        Self::Api,
        Self::Auth,
        Self::Security,
        Self::Errors,
        Self::Logging,
        Self::DataAccess,
        Self::Config,
        Self::Testing,
        Self::Performance,
        Self::Components,
        Self::Styling,
        Self::Structural,
        Self::Types,
        Self::Accessibility,
        Self::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Auth => "auth",
            Self::Security => "security",
            Self::Errors => "errors",
            Self::Logging => "logging",
            Self::DataAccess => "data-access",
            Self::Config => "config",
            Self::Testing => "testing",
            Self::Performance => "performance",
            Self::Components => "components",
            Self::Styling => "styling",
            Self::Structural => "structural",
            Self::Types => "types",
            Self::Accessibility => "accessibility",
            Self::Documentation => "documentation",
        }
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown pattern category: {s}"))
    }
}

/// Approval status. Transitions are enforced by the pattern store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    Discovered,
    Approved,
    Ignored,
}

impl PatternStatus {
    pub const ALL: [PatternStatus; 3] = [Self::Discovered, Self::Approved, Self::Ignored];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Approved => "approved",
            Self::Ignored => "ignored",
        }
    }

    /// Whether moving from `self` to `to` is a permitted transition.
    ///
    /// `discovered -> approved|ignored`, `approved <-> ignored`. Re-entering
    /// the current state and returning to `discovered` are rejected.
    pub fn can_transition_to(&self, to: PatternStatus) -> bool {
        matches!(
            (self, to),
            (Self::Discovered, Self::Approved)
                | (Self::Discovered, Self::Ignored)
                | (Self::Approved, Self::Ignored)
                | (Self::Ignored, Self::Approved)
        )
    }
}

impl fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown pattern status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorType {
    Regex,
    Ast,
    Semantic,
    Structural,
    Custom,
}

impl DetectorType {
    pub const ALL: [DetectorType; 5] = [
        Self::Regex,
        Self::Ast,
        Self::Semantic,
        Self::Structural,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Ast => "ast",
            Self::Semantic => "semantic",
            Self::Structural => "structural",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for DetectorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown detector type: {s}"))
    }
}

/// Which detector produced a pattern. `config` is opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorDescriptor {
    #[serde(rename = "type")]
    pub detector_type: DetectorType,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl DetectorDescriptor {
    pub fn new(detector_type: DetectorType) -> Self {
        Self {
            detector_type,
            config: serde_json::Value::Object(Default::default()),
        }
    }
}

/// Identity of a location within its pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl LocationKey {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One occurrence of a pattern in a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
    #[serde(default)]
    pub is_outlier: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlier_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl PatternLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            end_line: None,
            end_column: None,
            is_outlier: false,
            deviation_score: None,
            outlier_reason: None,
            confidence: None,
            snippet: None,
        }
    }

    /// Mark this location as an outlier.
    pub fn outlier(mut self, reason: impl Into<String>) -> Self {
        self.is_outlier = true;
        self.outlier_reason = Some(reason.into());
        self
    }

    pub fn with_end(mut self, end_line: u32, end_column: u32) -> Self {
        self.end_line = Some(end_line);
        self.end_column = Some(end_column);
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn key(&self) -> LocationKey {
        LocationKey::new(self.file.clone(), self.line, self.column)
    }

    pub fn matches_key(&self, key: &LocationKey) -> bool {
        self.file == key.file && self.line == key.line && self.column == key.column
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMetadata {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Detector-specific data the store carries without interpreting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl PatternMetadata {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            approved_at: None,
            approved_by: None,
            tags: Vec::new(),
            source: None,
            extra: None,
        }
    }
}

/// A discovered recurring code convention or violation.
///
/// `locations` holds conforming occurrences and `outliers` the deviating
/// ones. A location key appears in at most one of the two lists, and
/// `location_count`/`outlier_count` always equal their lengths once
/// [`Pattern::refresh_counts`] has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: String,
    pub category: PatternCategory,
    #[serde(default)]
    pub subcategory: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub detector: DetectorDescriptor,
    pub confidence: ConfidenceInfo,
    pub severity: Severity,
    #[serde(default)]
    pub auto_fixable: bool,
    pub status: PatternStatus,
    #[serde(default)]
    pub locations: Vec<PatternLocation>,
    #[serde(default)]
    pub outliers: Vec<PatternLocation>,
    pub metadata: PatternMetadata,
    #[serde(default)]
    pub location_count: u32,
    #[serde(default)]
    pub outlier_count: u32,
}

impl Pattern {
    pub fn new(
        id: impl Into<String>,
        category: PatternCategory,
        name: impl Into<String>,
        detector: DetectorDescriptor,
        confidence: ConfidenceInfo,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            subcategory: String::new(),
            name: name.into(),
            description: String::new(),
            detector,
            confidence,
            severity,
            auto_fixable: false,
            status: PatternStatus::Discovered,
            locations: Vec::new(),
            outliers: Vec::new(),
            metadata: PatternMetadata::at(Utc::now()),
            location_count: 0,
            outlier_count: 0,
        }
    }

    pub fn with_location(mut self, location: PatternLocation) -> Self {
        self.upsert_location(location);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Insert a location, replacing any existing one with the same key.
    ///
    /// A replacement that keeps the outlier flag keeps its position; one
    /// that flips the flag moves to the end of the other list. Returns
    /// `true` when an existing location was replaced.
    pub fn upsert_location(&mut self, location: PatternLocation) -> bool {
        let key = location.key();
        let target = if location.is_outlier {
            &mut self.outliers
        } else {
            &mut self.locations
        };
        if let Some(slot) = target.iter_mut().find(|l| l.matches_key(&key)) {
            *slot = location;
            self.refresh_counts();
            return true;
        }
        let other = if location.is_outlier {
            &mut self.locations
        } else {
            &mut self.outliers
        };
        let before = other.len();
        other.retain(|l| !l.matches_key(&key));
        let replaced = other.len() != before;
        if location.is_outlier {
            self.outliers.push(location);
        } else {
            self.locations.push(location);
        }
        self.refresh_counts();
        replaced
    }

    /// Remove the location with `key` from either list.
    pub fn remove_location(&mut self, key: &LocationKey) -> Option<PatternLocation> {
        let removed = if let Some(pos) = self.locations.iter().position(|l| l.matches_key(key)) {
            Some(self.locations.remove(pos))
        } else if let Some(pos) = self.outliers.iter().position(|l| l.matches_key(key)) {
            Some(self.outliers.remove(pos))
        } else {
            None
        };
        self.refresh_counts();
        removed
    }

    /// Force list membership to agree with each location's outlier flag,
    /// drop duplicate keys (last occurrence wins), and recount.
    pub fn normalize(&mut self) {
        let all: Vec<PatternLocation> = self
            .locations
            .drain(..)
            .map(|mut l| {
                l.is_outlier = false;
                l
            })
            .chain(self.outliers.drain(..).map(|mut l| {
                l.is_outlier = true;
                l
            }))
            .collect();
        for location in all {
            self.upsert_location(location);
        }
        self.refresh_counts();
    }

    pub fn refresh_counts(&mut self) {
        self.location_count = self.locations.len() as u32;
        self.outlier_count = self.outliers.len() as u32;
    }

    /// All locations, conforming first, then outliers.
    pub fn all_locations(&self) -> impl Iterator<Item = &PatternLocation> {
        self.locations.iter().chain(self.outliers.iter())
    }

    pub fn touches_file(&self, file: &str) -> bool {
        self.all_locations().any(|l| l.file == file)
    }

    /// `locations / (locations + outliers)`, 1.0 when both are zero.
    pub fn compliance_rate(&self) -> f64 {
        compliance_rate(self.location_count, self.outlier_count)
    }
}

pub fn compliance_rate(locations: u32, outliers: u32) -> f64 {
    let total = locations + outliers;
    if total == 0 {
        1.0
    } else {
        f64::from(locations) / f64::from(total)
    }
}

/// Stable identifier for a detector candidate that carries no explicit id.
pub fn derive_pattern_id(
    category: PatternCategory,
    subcategory: &str,
    detector_type: DetectorType,
    name: &str,
) -> String {
    let key = format!(
        "{}\0{}\0{}\0{}",
        category.as_str(),
        subcategory,
        detector_type.as_str(),
        name
    );
    format!("{}/{:016x}", category.as_str(), xxh3_64(key.as_bytes()))
}

/// A raw record emitted by a detector on each scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: PatternCategory,
    #[serde(default)]
    pub subcategory: String,
    pub detector: DetectorDescriptor,
    pub confidence: ConfidenceInfo,
    pub severity: Severity,
    #[serde(default)]
    pub auto_fixable: bool,
    #[serde(default)]
    pub locations: Vec<PatternLocation>,
    #[serde(default)]
    pub outliers: Vec<PatternLocation>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl PatternCandidate {
    /// The explicit id, or one derived from the candidate's identity fields.
    pub fn resolved_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| {
            derive_pattern_id(
                self.category,
                &self.subcategory,
                self.detector.detector_type,
                &self.name,
            )
        })
    }

    /// Build a fresh `discovered` pattern observed at `now`.
    pub fn into_pattern(self, now: DateTime<Utc>) -> Pattern {
        let id = self.resolved_id();
        let mut pattern = Pattern {
            id,
            category: self.category,
            subcategory: self.subcategory,
            name: self.name,
            description: self.description,
            detector: self.detector,
            confidence: self.confidence.clamped(),
            severity: self.severity,
            auto_fixable: self.auto_fixable,
            status: PatternStatus::Discovered,
            locations: self.locations,
            outliers: self.outliers,
            metadata: PatternMetadata {
                tags: self.tags,
                source: self.source,
                ..PatternMetadata::at(now)
            },
            location_count: 0,
            outlier_count: 0,
        };
        pattern.normalize();
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConfidenceLevel;

    fn pattern() -> Pattern {
        Pattern::new(
            "p1",
            PatternCategory::Api,
            "REST naming",
            DetectorDescriptor::new(DetectorType::Regex),
            ConfidenceInfo::new(0.8, ConfidenceLevel::Medium),
            Severity::Warning,
        )
    }

    #[test]
    fn upsert_flips_outlier_between_lists() {
        let mut p = pattern().with_location(PatternLocation::new("a.ts", 1, 0));
        assert_eq!((p.location_count, p.outlier_count), (1, 0));

        let replaced = p.upsert_location(PatternLocation::new("a.ts", 1, 0).outlier("naming"));
        assert!(replaced);
        assert_eq!((p.location_count, p.outlier_count), (0, 1));
        assert!(p.locations.is_empty());
    }

    #[test]
    fn normalize_moves_flagged_locations_and_dedups() {
        let mut p = pattern();
        p.locations.push(PatternLocation::new("a.ts", 1, 0));
        p.locations.push(PatternLocation::new("a.ts", 1, 0));
        p.outliers.push(PatternLocation::new("b.ts", 2, 0));
        p.normalize();
        assert_eq!(p.location_count, 1);
        assert_eq!(p.outlier_count, 1);
        assert!(p.outliers[0].is_outlier);
    }

    #[test]
    fn status_transitions() {
        use PatternStatus::*;
        assert!(Discovered.can_transition_to(Approved));
        assert!(Discovered.can_transition_to(Ignored));
        assert!(Approved.can_transition_to(Ignored));
        assert!(Ignored.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Approved));
        assert!(!Ignored.can_transition_to(Ignored));
        assert!(!Approved.can_transition_to(Discovered));
    }

    #[test]
    fn derived_ids_are_stable_and_prefixed() {
        let a = derive_pattern_id(PatternCategory::Auth, "jwt", DetectorType::Ast, "token check");
        let b = derive_pattern_id(PatternCategory::Auth, "jwt", DetectorType::Ast, "token check");
        let c = derive_pattern_id(PatternCategory::Auth, "jwt", DetectorType::Ast, "token checks");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("auth/"));
    }

    #[test]
    fn compliance_rate_of_empty_pattern_is_one() {
        assert_eq!(compliance_rate(0, 0), 1.0);
        assert_eq!(compliance_rate(3, 1), 0.75);
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in PatternCategory::ALL {
            assert_eq!(c.as_str().parse::<PatternCategory>().unwrap(), c);
        }
        assert!("nope".parse::<PatternCategory>().is_err());
    }
}
