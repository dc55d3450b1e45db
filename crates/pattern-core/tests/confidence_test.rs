//! Property tests for confidence scoring.

use pattern_core::types::{clamp_score, ConfidenceLevel, ConfidenceScorer};
use proptest::prelude::*;

proptest! {
    #[test]
    fn level_is_monotone_in_score(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(ConfidenceLevel::from_score(lo) <= ConfidenceLevel::from_score(hi));
    }

    #[test]
    fn scorer_stays_in_unit_range(
        frequency in -1.0f64..2.0,
        consistency in -1.0f64..2.0,
        age in -10.0f64..1000.0,
        spread in -1.0f64..2.0,
    ) {
        let info = ConfidenceScorer::default().score(frequency, consistency, age, spread);
        prop_assert!((0.0..=1.0).contains(&info.score));
        prop_assert_eq!(info.level, ConfidenceLevel::from_score(info.score));
    }

    #[test]
    fn clamp_is_idempotent(x in proptest::num::f64::ANY) {
        let once = clamp_score(x);
        prop_assert_eq!(clamp_score(once), once);
    }
}
