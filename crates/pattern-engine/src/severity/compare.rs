//! Ordering helpers over anything that carries a severity.

use std::collections::BTreeMap;

use pattern_core::types::Severity;

/// Sort most severe first. Items of equal severity keep their order.
pub fn sort_by_severity<T>(items: &mut [T], severity: impl Fn(&T) -> Severity) {
    items.sort_by(|a, b| severity(b).cmp(&severity(a)));
}

/// Group items by severity, preserving input order within each group.
pub fn group_by_severity<T>(
    items: impl IntoIterator<Item = T>,
    severity: impl Fn(&T) -> Severity,
) -> BTreeMap<Severity, Vec<T>> {
    let mut groups: BTreeMap<Severity, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(severity(&item)).or_default().push(item);
    }
    groups
}

/// Keep items whose severity lies in `[min, max]`. Either bound may be
/// open.
pub fn filter_by_severity<T>(
    items: impl IntoIterator<Item = T>,
    min: Option<Severity>,
    max: Option<Severity>,
    severity: impl Fn(&T) -> Severity,
) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| {
            let s = severity(item);
            min.map_or(true, |m| s >= m) && max.map_or(true, |m| s <= m)
        })
        .collect()
}

pub fn max_severity(severities: impl IntoIterator<Item = Severity>) -> Option<Severity> {
    severities.into_iter().max()
}
