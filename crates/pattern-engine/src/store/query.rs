//! Pattern filtering, sorting, and pagination over the in-memory index.

use std::cmp::Ordering;

use pattern_core::types::{ConfidenceLevel, Pattern, PatternCategory, PatternStatus, Severity};
use serde::{Deserialize, Serialize};

/// Pattern filter. Each list field matches any of its values (empty means
/// unconstrained); all populated fields must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PatternFilter {
    pub ids: Vec<String>,
    pub categories: Vec<PatternCategory>,
    pub statuses: Vec<PatternStatus>,
    pub severities: Vec<Severity>,
    /// Matches patterns carrying any of these tags.
    pub tags: Vec<String>,
    /// Matches patterns with a location or outlier in any of these files.
    pub files: Vec<String>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub confidence_levels: Vec<ConfidenceLevel>,
    pub has_outliers: Option<bool>,
    /// Case-insensitive substring over id, name, description, and tags.
    pub search: Option<String>,
}

impl PatternFilter {
    pub fn category(mut self, category: PatternCategory) -> Self {
        self.categories.push(category);
        self
    }

    pub fn status(mut self, status: PatternStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severities.push(severity);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn confidence_range(mut self, min: f64, max: f64) -> Self {
        self.min_confidence = Some(min);
        self.max_confidence = Some(max);
        self
    }

    pub fn confidence_level(mut self, level: ConfidenceLevel) -> Self {
        self.confidence_levels.push(level);
        self
    }

    pub fn has_outliers(mut self, has_outliers: bool) -> Self {
        self.has_outliers = Some(has_outliers);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn matches(&self, p: &Pattern) -> bool {
        fn any_of<T: PartialEq>(set: &[T], value: &T) -> bool {
            set.is_empty() || set.contains(value)
        }

        if !self.ids.is_empty() && !self.ids.iter().any(|id| *id == p.id) {
            return false;
        }
        if !any_of(&self.categories, &p.category)
            || !any_of(&self.statuses, &p.status)
            || !any_of(&self.severities, &p.severity)
            || !any_of(&self.confidence_levels, &p.confidence.level)
        {
            return false;
        }
        if !self.tags.is_empty() && !p.metadata.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        if !self.files.is_empty() && !self.files.iter().any(|f| p.touches_file(f)) {
            return false;
        }
        if self.min_confidence.is_some_and(|min| p.confidence.score < min)
            || self.max_confidence.is_some_and(|max| p.confidence.score > max)
        {
            return false;
        }
        if let Some(want) = self.has_outliers {
            if (p.outlier_count > 0) != want {
                return false;
            }
        }
        if let Some(text) = self.search.as_deref().filter(|t| !t.is_empty()) {
            let needle = text.to_lowercase();
            let hit = p.id.to_lowercase().contains(&needle)
                || p.name.to_lowercase().contains(&needle)
                || p.description.to_lowercase().contains(&needle)
                || p.metadata.tags.iter().any(|t| t.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Name,
    Confidence,
    Severity,
    FirstSeen,
    LastSeen,
    OutlierCount,
    LocationCount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl PatternSort {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    /// Order by the sort field in the requested direction, then by id
    /// ascending regardless of direction.
    pub fn compare(&self, a: &Pattern, b: &Pattern) -> Ordering {
        let primary = match self.field {
            SortField::Name => a.name.cmp(&b.name),
            SortField::Confidence => a.confidence.score.total_cmp(&b.confidence.score),
            SortField::Severity => a.severity.cmp(&b.severity),
            SortField::FirstSeen => a.metadata.first_seen.cmp(&b.metadata.first_seen),
            SortField::LastSeen => a.metadata.last_seen.cmp(&b.metadata.last_seen),
            SortField::OutlierCount => a.outlier_count.cmp(&b.outlier_count),
            SortField::LocationCount => a.location_count.cmp(&b.location_count),
        };
        let primary = match self.direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    /// `None` returns everything after `offset`.
    pub limit: Option<usize>,
}

impl Pagination {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub patterns: Vec<Pattern>,
    /// Matches before pagination.
    pub total: usize,
    pub has_more: bool,
}

/// Filter, sort, and page `patterns`.
pub fn run_query<'a>(
    patterns: impl Iterator<Item = &'a Pattern>,
    filter: &PatternFilter,
    sort: PatternSort,
    page: Pagination,
) -> QueryResult {
    let mut matched: Vec<&Pattern> = patterns.filter(|p| filter.matches(p)).collect();
    matched.sort_by(|a, b| sort.compare(a, b));
    let total = matched.len();
    let has_more = page
        .limit
        .is_some_and(|limit| page.offset.saturating_add(limit) < total);
    let patterns = matched
        .into_iter()
        .skip(page.offset)
        .take(page.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();
    QueryResult {
        patterns,
        total,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pattern_core::types::{ConfidenceInfo, DetectorDescriptor, DetectorType, PatternLocation};

    fn pattern(id: &str, name: &str, score: f64, severity: Severity) -> Pattern {
        Pattern::new(
            id,
            PatternCategory::Api,
            name,
            DetectorDescriptor::new(DetectorType::Ast),
            ConfidenceInfo::new(score, ConfidenceLevel::from_score(score)),
            severity,
        )
    }

    fn ids(result: &QueryResult) -> Vec<&str> {
        result.patterns.iter().map(|p| p.id.as_str()).collect()
    }

    fn query(patterns: &[&Pattern], filter: &PatternFilter, sort: PatternSort) -> QueryResult {
        run_query(patterns.iter().copied(), filter, sort, Pagination::default())
    }

    #[test]
    fn or_within_a_field_and_across_fields() {
        let mut a = pattern("a", "alpha", 0.9, Severity::Error);
        a.metadata.tags = vec!["rest".into()];
        let mut b = pattern("b", "beta", 0.6, Severity::Warning);
        b.metadata.tags = vec!["graphql".into()];
        let c = pattern("c", "gamma", 0.9, Severity::Hint);

        let filter = PatternFilter::default()
            .severity(Severity::Error)
            .severity(Severity::Warning)
            .confidence_range(0.7, 1.0);
        let result = query(&[&a, &b, &c], &filter, PatternSort::default());
        assert_eq!(ids(&result), vec!["a"]);

        let filter = PatternFilter::default().tag("graphql").tag("rest");
        let result = query(&[&a, &b, &c], &filter, PatternSort::default());
        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[test]
    fn ties_break_by_id_in_both_directions() {
        let a = pattern("a", "same", 0.5, Severity::Info);
        let b = pattern("b", "same", 0.5, Severity::Info);
        let c = pattern("c", "other", 0.9, Severity::Info);
        let all = [&c, &b, &a];
        let any = PatternFilter::default();

        let asc = query(&all, &any, PatternSort::asc(SortField::Confidence));
        assert_eq!(ids(&asc), vec!["a", "b", "c"]);
        let desc = query(&all, &any, PatternSort::desc(SortField::Confidence));
        assert_eq!(ids(&desc), vec!["c", "a", "b"]);
    }

    #[test]
    fn pagination_reports_has_more() {
        let patterns: Vec<Pattern> = (0..5)
            .map(|i| pattern(&format!("p{i}"), &format!("n{i}"), 0.5, Severity::Info))
            .collect();
        let any = PatternFilter::default();
        let page = run_query(patterns.iter(), &any, PatternSort::default(), Pagination::new(2, 2));
        assert_eq!(page.total, 5);
        assert_eq!(ids(&page), vec!["p2", "p3"]);
        assert!(page.has_more);

        let last = run_query(patterns.iter(), &any, PatternSort::default(), Pagination::new(3, 2));
        assert!(!last.has_more);
    }

    #[test]
    fn unbounded_page_size_does_not_overflow() {
        let patterns: Vec<Pattern> = (0..3)
            .map(|i| pattern(&format!("p{i}"), &format!("n{i}"), 0.5, Severity::Info))
            .collect();
        let page = run_query(
            patterns.iter(),
            &PatternFilter::default(),
            PatternSort::default(),
            Pagination::new(1, usize::MAX),
        );
        assert_eq!(ids(&page), vec!["p1", "p2"]);
        assert!(!page.has_more);
    }

    #[test]
    fn outlier_and_file_filters() {
        let with_outlier = pattern("a", "a", 0.5, Severity::Info)
            .with_location(PatternLocation::new("x.ts", 1, 0).outlier("off"));
        let clean = pattern("b", "b", 0.5, Severity::Info)
            .with_location(PatternLocation::new("y.ts", 1, 0));

        let filter = PatternFilter::default().has_outliers(false);
        let result = query(&[&with_outlier, &clean], &filter, PatternSort::default());
        assert_eq!(ids(&result), vec!["b"]);

        let filter = PatternFilter::default().file("x.ts");
        let result = query(&[&with_outlier, &clean], &filter, PatternSort::default());
        assert_eq!(ids(&result), vec!["a"]);
    }
}
