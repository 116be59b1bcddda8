//! Property-based tests for the quantified invariants in the spec's testable-properties
//! section: monotonic fact ids, weight normalization, and non-increasing retrieval scores.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use slm_memory::config::RetrievalConfig;
use slm_memory::storage::sqlite::open_in_memory;
use slm_memory::{Category, Fact, FactStore};

proptest! {
    /// Invariant I1: fact ids assigned by a single store are strictly increasing and never
    /// reused, regardless of insertion content.
    #[test]
    fn fact_ids_are_strictly_monotonic(texts in prop::collection::vec("[a-z ]{1,40}", 1..20)) {
        let (store, _graph, _summary) = open_in_memory(4).unwrap();
        let now = slm_memory::current_timestamp();
        let mut last = None;
        for text in texts {
            let id = store.insert(&Fact::new(text, Category::Other, 0.5, now)).unwrap();
            if let Some(prev) = last {
                prop_assert!(id.value() > prev, "ids must strictly increase");
            }
            last = Some(id.value());
        }
    }

    /// `RetrievalConfig::normalized_weights` always returns four non-negative weights summing
    /// to 1.0, for any combination of positive input weights.
    #[test]
    fn weights_always_normalize_to_one(
        s in 0.01f32..10.0,
        i in 0.01f32..10.0,
        r in 0.01f32..10.0,
        f in 0.01f32..10.0,
    ) {
        let cfg = RetrievalConfig {
            semantic_weight: s,
            importance_weight: i,
            recency_weight: r,
            frequency_weight: f,
            ..RetrievalConfig::default()
        };
        let (ws, wi, wr, wf) = cfg.normalized_weights();
        prop_assert!(ws >= 0.0 && wi >= 0.0 && wr >= 0.0 && wf >= 0.0);
        prop_assert!(((ws + wi + wr + wf) - 1.0).abs() < 1e-5);
    }

    /// A fact's importance is always clamped into `[0, 1]` regardless of the input, matching
    /// invariant I2.
    #[test]
    fn fact_importance_is_always_clamped(raw in -100.0f32..100.0) {
        let fact = Fact::new("x".to_string(), Category::Other, raw, 0);
        prop_assert!((0.0..=1.0).contains(&fact.importance));
    }
}
