//! Severity resolution, escalation, persistence, and ordering properties.

use std::sync::Arc;

use pattern_core::types::{
    compare_severity, EscalationConfig, EscalationRule, PatternCategory, Severity, SeverityConfig,
};
use pattern_engine::severity::{max_severity, sort_by_severity, SeverityEngine};
use pattern_storage::{SqliteBackend, StorageBackend};
use proptest::prelude::*;

fn escalating(threshold: u32, rules: Vec<EscalationRule>) -> SeverityConfig {
    SeverityConfig {
        escalation: EscalationConfig {
            enabled: true,
            threshold,
            rules,
        },
        ..SeverityConfig::default()
    }
}

#[test]
fn security_defaults_to_error_and_override_wins() {
    let engine = SeverityEngine::new(SeverityConfig::default()).unwrap();
    assert_eq!(engine.effective_severity("p1", PatternCategory::Security), Severity::Error);

    engine.set_pattern_override("p1", Severity::Hint);
    assert_eq!(engine.effective_severity("p1", PatternCategory::Security), Severity::Hint);
}

#[test]
fn escalation_after_five_not_four() {
    let engine = SeverityEngine::new(escalating(
        10,
        vec![EscalationRule::new(Severity::Warning, Severity::Error, 5)],
    ))
    .unwrap();

    for _ in 0..4 {
        engine.record_violation("p1", PatternCategory::Structural);
    }
    assert_eq!(
        engine.effective_severity_with_escalation("p1", PatternCategory::Structural),
        Severity::Warning
    );

    engine.record_violation("p1", PatternCategory::Structural);
    assert_eq!(
        engine.effective_severity_with_escalation("p1", PatternCategory::Structural),
        Severity::Error
    );
    // Non-escalated resolution is unaffected.
    assert_eq!(engine.effective_severity("p1", PatternCategory::Structural), Severity::Warning);
}

#[test]
fn category_count_escalates_every_pattern_in_it() {
    let engine = SeverityEngine::new(escalating(
        3,
        vec![EscalationRule {
            from: Severity::Warning,
            to: Severity::Error,
            after_count: None,
        }],
    ))
    .unwrap();
    engine.record_violation("a", PatternCategory::Api);
    engine.record_violation("b", PatternCategory::Api);
    engine.record_violation("c", PatternCategory::Api);

    assert_eq!(
        engine.effective_severity_with_escalation("fresh", PatternCategory::Api),
        Severity::Error
    );
    let counters = engine.counters();
    assert_eq!(counters.total, 3);
    assert_eq!(counters.by_category[&PatternCategory::Api], 3);

    engine.reset_counters();
    assert_eq!(
        engine.effective_severity_with_escalation("fresh", PatternCategory::Api),
        Severity::Warning
    );
}

#[test]
fn disabled_escalation_ignores_counters() {
    let rule = EscalationRule::new(Severity::Warning, Severity::Error, 1);
    let mut config = escalating(1, vec![rule]);
    config.escalation.enabled = false;
    let engine = SeverityEngine::new(config).unwrap();
    engine.record_violation("p1", PatternCategory::Api);
    assert_eq!(
        engine.effective_severity_with_escalation("p1", PatternCategory::Api),
        Severity::Warning
    );
}

#[test]
fn config_round_trips_through_the_backend() {
    let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let engine = SeverityEngine::with_backend(backend.clone(), SeverityConfig::default()).unwrap();
    engine.set_category_override(PatternCategory::Testing, Severity::Error);
    engine
        .set_escalation(EscalationConfig {
            enabled: true,
            threshold: 4,
            rules: vec![EscalationRule::new(Severity::Info, Severity::Warning, 2)],
        })
        .unwrap();
    engine.save().unwrap();

    let reopened = SeverityEngine::with_backend(backend, SeverityConfig::default()).unwrap();
    assert_eq!(reopened.config(), engine.config());
    assert_eq!(reopened.effective_severity("t", PatternCategory::Testing), Severity::Error);
}

#[test]
fn summary_counts_blocking() {
    let engine = SeverityEngine::new(SeverityConfig::default()).unwrap();
    let make = |id: &str, category| {
        pattern_core::types::Pattern::new(
            id,
            category,
            id,
            pattern_core::types::DetectorDescriptor::new(pattern_core::types::DetectorType::Regex),
            pattern_core::types::ConfidenceInfo::new(
                0.9,
                pattern_core::types::ConfidenceLevel::High,
            ),
            Severity::Info,
        )
    };
    let patterns = vec![
        make("a", PatternCategory::Security),
        make("b", PatternCategory::Auth),
        make("c", PatternCategory::Styling),
    ];
    let summary = engine.severity_summary(&patterns);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.blocking, 2);
    assert_eq!(summary.by_severity[&Severity::Hint], 1);
}

fn any_severity() -> impl Strategy<Value = Severity> {
    prop::sample::select(Severity::ALL.to_vec())
}

proptest! {
    #[test]
    fn compare_agrees_with_ord(a in any_severity(), b in any_severity()) {
        prop_assert_eq!(compare_severity(a, b).signum(), a.cmp(&b) as i32);
        prop_assert_eq!(compare_severity(a, b), -compare_severity(b, a));
    }

    #[test]
    fn sort_is_descending_and_max_is_first(items in prop::collection::vec(any_severity(), 0..32)) {
        let mut sorted = items.clone();
        sort_by_severity(&mut sorted, |s| *s);
        prop_assert!(sorted.windows(2).all(|w| w[0] >= w[1]));
        prop_assert_eq!(sorted.first().copied(), max_severity(items));
    }
}
