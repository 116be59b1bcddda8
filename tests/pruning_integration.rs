//! Pruning integration test (scenario S4): `PruneOld` keeps the highest-importance,
//! most-recently-accessed facts once the active count exceeds the configured threshold.

#![allow(clippy::unwrap_used)]

use slm_memory::storage::sqlite::open_in_memory;
use slm_memory::{Category, Fact, FactStore};

#[test]
fn prune_old_keeps_exactly_the_configured_number_of_facts() {
    let (store, _graph, _summary) = open_in_memory(4).unwrap();
    let now = slm_memory::current_timestamp();

    // 13 facts with varying importance and last-accessed times; none near the default dimension
    // mismatch since no embeddings are involved in pruning.
    for i in 0..13u64 {
        let mut fact = Fact::new(format!("fact {i}"), Category::Other, (i as f32) / 13.0, now - i * 60);
        fact.last_accessed = now - i * 60;
        store.insert(&fact).unwrap();
    }

    let before = store.stats().unwrap();
    assert_eq!(before.active, 13);

    let removed = store.prune_old(12, 8).unwrap();
    assert_eq!(removed, 5, "13 active facts over a threshold of 12 should prune down to 8");

    let after = store.stats().unwrap();
    assert_eq!(after.active, 8, "PruneFacts should leave exactly pruneKeepRecent facts active");

    // The five lowest-importance, least-recently-accessed facts (0..5) should be the ones
    // removed; the eight most valuable (8..13, plus the highest-importance survivors) remain.
    let survivors = store.recent(20, false).unwrap();
    assert_eq!(survivors.len(), 8);
    assert!(
        survivors.iter().all(|f| f.importance >= 5.0 / 13.0 - f32::EPSILON),
        "pruning should not remove a fact more important than one that survived"
    );
}

#[test]
fn prune_is_a_no_op_below_the_threshold() {
    let (store, _graph, _summary) = open_in_memory(4).unwrap();
    let now = slm_memory::current_timestamp();
    for i in 0..5u64 {
        store.insert(&Fact::new(format!("fact {i}"), Category::Other, 0.5, now)).unwrap();
    }
    let removed = store.prune_old(12, 8).unwrap();
    assert_eq!(removed, 0);
    assert_eq!(store.stats().unwrap().active, 5);
}
