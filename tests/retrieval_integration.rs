//! Hybrid Retriever integration tests against a `SQLite`-backed store (scenarios S3, S6).

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use slm_memory::config::{GraphConfig, RetrievalConfig};
use slm_memory::services::retriever::RetrievalQuery;
use slm_memory::storage::sqlite::open_in_memory;
use slm_memory::{Category, Embedder, Fact, FactStore, HybridRetriever, Result};

struct ConstantEmbedder(Vec<f32>);

impl Embedder for ConstantEmbedder {
    fn dimensions(&self) -> usize {
        self.0.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

fn fact_at(text: &str, importance: f32, created_at: u64) -> Fact {
    Fact::new(text.to_string(), Category::Other, importance, created_at)
}

#[tokio::test]
async fn recency_decay_ranks_the_one_hour_old_fact_above_the_thirty_day_old_one() {
    let (store, graph, _summary) = open_in_memory(4).unwrap();
    let store = Arc::new(store);
    let now = slm_memory::current_timestamp();

    // Scenario S3: both facts are equally irrelevant to the query semantically (no embedding),
    // equally important, and never yet accessed — recency alone must break the tie.
    let old_id = store.insert(&fact_at("fact A", 0.5, now - 30 * 24 * 3600)).unwrap();
    let new_id = store.insert(&fact_at("fact B", 0.5, now - 3600)).unwrap();

    let retriever = HybridRetriever::new(
        store,
        Arc::new(graph),
        Arc::new(ConstantEmbedder(vec![0.0, 0.0, 0.0, 0.0])),
        RetrievalConfig {
            include_graph: false,
            ..RetrievalConfig::default()
        },
        GraphConfig::default(),
    );

    let results = retriever
        .retrieve(&RetrievalQuery::text("irrelevant query").with_max_results(10))
        .await
        .unwrap();

    let new_pos = results.iter().position(|r| r.fact.id == new_id).unwrap();
    let old_pos = results.iter().position(|r| r.fact.id == old_id).unwrap();
    assert!(new_pos < old_pos, "the 1-hour-old fact should outrank the 30-day-old fact");
}

#[tokio::test]
async fn repeated_retrieval_is_deterministic_for_a_fixed_store() {
    let (store, graph, _summary) = open_in_memory(4).unwrap();
    let store = Arc::new(store);
    let now = slm_memory::current_timestamp();

    for i in 0..6u64 {
        let embedding = vec![1.0, (i % 3) as f32, 0.0, 0.0];
        let fact = fact_at(&format!("fact {i}"), 0.1 * i as f32, now - i * 3600).with_embedding(embedding);
        store.insert(&fact).unwrap();
    }

    let retriever = HybridRetriever::new(
        store,
        Arc::new(graph),
        Arc::new(ConstantEmbedder(vec![1.0, 0.0, 0.0, 0.0])),
        RetrievalConfig {
            include_graph: false,
            ..RetrievalConfig::default()
        },
        GraphConfig::default(),
    );

    let query = RetrievalQuery::text("same query every time").with_max_results(10);
    let first = retriever.retrieve(&query).await.unwrap();
    let second = retriever.retrieve(&query).await.unwrap();

    let first_ids: Vec<_> = first.iter().map(|sf| sf.fact.id).collect();
    let second_ids: Vec<_> = second.iter().map(|sf| sf.fact.id).collect();
    assert_eq!(
        first_ids, second_ids,
        "two retrievals of the same query against an unchanged store must return the same order"
    );
}
