//! Hybrid Retriever (C5): produces a ranked, filtered, deduplicated list of facts for a query
//! by combining semantic similarity, importance, recency, access frequency, and an optional
//! entity-graph boost.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::collaborators::Embedder;
use crate::config::{GraphConfig, RetrievalConfig};
use crate::models::{Category, Fact, FactId};
use crate::observability::{counters, logging};
use crate::storage::traits::{EntityGraphStore, FactStore};
use crate::{Result, current_timestamp};

/// A query against the Hybrid Retriever.
///
/// `max_results`, `min_score`, and `include_graph` fall back to the retriever's configured
/// defaults when left `None`, letting a caller override only what it needs to.
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    /// Free text to embed (if `embedding` is absent) and to seed the graph pass with.
    pub text: Option<String>,
    /// A precomputed query embedding; takes precedence over embedding `text`.
    pub embedding: Option<Vec<f32>>,
    /// Restricts results to these categories, if given.
    pub categories: Option<Vec<Category>>,
    /// Overrides the configured result-count cap.
    pub max_results: Option<usize>,
    /// Overrides the configured minimum score.
    pub min_score: Option<f32>,
    /// Overrides whether the graph pass runs for this query.
    pub include_graph: Option<bool>,
}

impl RetrievalQuery {
    /// A text query, embedded at retrieval time if no embedding is supplied separately.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Overrides the result-count cap, consuming and returning `self`.
    #[must_use]
    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Restricts results to the given categories, consuming and returning `self`.
    #[must_use]
    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = Some(categories);
        self
    }
}

/// One fact with its composed relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFact {
    /// The retrieved fact.
    pub fact: Fact,
    /// The composed score this fact ranked by.
    pub score: f32,
}

struct Candidate {
    fact: Fact,
    semantic: f32,
    graph_boost: f32,
}

/// Combines semantic search, the entity graph, importance, recency, and access frequency into
/// a single ranked result list.
///
/// Generic over its collaborators, the same way [`crate::services::extractor::FactExtractor`]
/// is, rather than boxed as trait objects.
pub struct HybridRetriever<F, Gr, E>
where
    F: FactStore,
    Gr: EntityGraphStore,
    E: Embedder,
{
    fact_store: Arc<F>,
    entity_graph: Arc<Gr>,
    embedder: Arc<E>,
    config: RetrievalConfig,
    graph_config: GraphConfig,
}

impl<F, Gr, E> HybridRetriever<F, Gr, E>
where
    F: FactStore,
    Gr: EntityGraphStore,
    E: Embedder,
{
    /// Builds a retriever over the given stores, embedder, and configuration.
    pub const fn new(
        fact_store: Arc<F>,
        entity_graph: Arc<Gr>,
        embedder: Arc<E>,
        config: RetrievalConfig,
        graph_config: GraphConfig,
    ) -> Self {
        Self {
            fact_store,
            entity_graph,
            embedder,
            config,
            graph_config,
        }
    }

    /// Runs the full retrieval pipeline: embed, semantic pass, graph pass, recency fallback,
    /// category filter, score composition, sort/truncate, and access-count bookkeeping.
    #[tracing::instrument(skip(self, query), fields(has_text = query.text.is_some()))]
    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<ScoredFact>> {
        let start = std::time::Instant::now();
        let result = self.retrieve_inner(query).await;
        metrics::histogram!(counters::RETRIEVAL_LATENCY).record(start.elapsed().as_secs_f64());
        result
    }

    async fn retrieve_inner(&self, query: &RetrievalQuery) -> Result<Vec<ScoredFact>> {
        let max_results = query.max_results.unwrap_or(self.config.max_results).max(1);
        let min_score = query.min_score.unwrap_or(self.config.min_score);
        let include_graph = query.include_graph.unwrap_or(self.config.include_graph);

        let embedding = self.resolve_embedding(query).await;

        let mut candidates: HashMap<FactId, Candidate> = HashMap::new();

        if let Some(ref vec) = embedding {
            let hits = self.fact_store.search_similar(vec, max_results * 2, false)?;
            for (fact, sim) in hits {
                candidates
                    .entry(fact.id)
                    .and_modify(|c| c.semantic = c.semantic.max(sim))
                    .or_insert(Candidate {
                        fact,
                        semantic: sim,
                        graph_boost: 0.0,
                    });
            }
        }

        let text_is_present = query.text.as_ref().is_some_and(|t| !t.trim().is_empty());
        if include_graph && self.graph_config.enabled && text_is_present {
            self.run_graph_pass(query.text.as_ref().unwrap_or(&String::new()), &mut candidates)?;
        }

        if candidates.is_empty() {
            for fact in self.fact_store.recent(max_results, false)? {
                candidates.entry(fact.id).or_insert(Candidate {
                    fact,
                    semantic: 0.0,
                    graph_boost: 0.0,
                });
            }
        }

        if let Some(categories) = &query.categories {
            candidates.retain(|_, c| categories.contains(&c.fact.category));
        }

        let mut scored = self.score_candidates(candidates);

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.fact.id.cmp(&a.fact.id))
        });
        scored.retain(|sf| sf.score >= min_score);
        scored.truncate(max_results);

        for sf in &scored {
            if let Err(e) = self.fact_store.update_access(sf.fact.id) {
                logging::log_recovered_failure("retriever", "update_access", &e);
            }
        }

        Ok(scored)
    }

    async fn resolve_embedding(&self, query: &RetrievalQuery) -> Option<Vec<f32>> {
        if let Some(embedding) = &query.embedding {
            return Some(embedding.clone());
        }
        let text = query.text.as_ref()?;
        if text.trim().is_empty() {
            return None;
        }
        match self.embedder.embed(text).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                logging::log_recovered_failure("retriever", "embed_query", &e);
                None
            },
        }
    }

    fn run_graph_pass(&self, text: &str, candidates: &mut HashMap<FactId, Candidate>) -> Result<()> {
        let seeds = self.entity_graph.search_by_name(text, 5)?;
        for seed in seeds {
            for fact_id in self.entity_graph.facts_for_entity(seed.id)? {
                self.apply_graph_boost(fact_id, self.config.graph_results_weight, candidates)?;
            }
            for path in self.entity_graph.traverse(seed.id, self.graph_config.max_hops)? {
                let Some(endpoint) = path.steps.last() else {
                    continue;
                };
                let boost = self.config.graph_results_weight / (path.total_hops as f32 + 1.0);
                for fact_id in self.entity_graph.facts_for_entity(endpoint.entity.id)? {
                    self.apply_graph_boost(fact_id, boost, candidates)?;
                }
            }
        }
        Ok(())
    }

    fn apply_graph_boost(
        &self,
        fact_id: FactId,
        boost: f32,
        candidates: &mut HashMap<FactId, Candidate>,
    ) -> Result<()> {
        if let Some(existing) = candidates.get_mut(&fact_id) {
            existing.graph_boost = existing.graph_boost.max(boost);
            return Ok(());
        }
        if let Some(fact) = self.fact_store.get(fact_id)? {
            if !fact.is_obsolete {
                candidates.insert(
                    fact_id,
                    Candidate {
                        fact,
                        semantic: 0.0,
                        graph_boost: boost,
                    },
                );
            }
        }
        Ok(())
    }

    fn score_candidates(&self, candidates: HashMap<FactId, Candidate>) -> Vec<ScoredFact> {
        let (w_sem, w_imp, w_rec, w_freq) = self.config.normalized_weights();
        let half_life = self.config.recency_half_life_hours.max(f32::MIN_POSITIVE);
        let now = current_timestamp();
        let max_access = candidates.values().map(|c| c.fact.access_count).max().unwrap_or(0);

        candidates
            .into_values()
            .map(|c| {
                let age_hours = now.saturating_sub(c.fact.created_at) as f32 / 3600.0;
                let recency = 0.5_f32.powf(age_hours / half_life);
                let frequency = if max_access == 0 {
                    0.0
                } else {
                    c.fact.access_count as f32 / max_access as f32
                };
                let base = w_sem * c.semantic.clamp(0.0, 1.0)
                    + w_imp * c.fact.importance
                    + w_rec * recency
                    + w_freq * frequency;
                let score = if c.graph_boost > 0.0 {
                    base.mul_add(1.0 - c.graph_boost, c.graph_boost)
                } else {
                    base
                };
                ScoredFact { fact: c.fact, score }
            })
            .collect()
    }
}

/// Advisory query-complexity estimate, scaling `default_top_k` toward `max_top_k` for longer or
/// more entity-dense queries. The caller may always override via [`RetrievalQuery::max_results`]
/// — this is a convenience, not a requirement.
#[must_use]
pub fn estimate_complexity_top_k(query_text: &str, default_top_k: usize, max_top_k: usize) -> usize {
    let word_count = query_text.split_whitespace().count();
    let question_markers = query_text.matches('?').count();
    let capitalized_words = query_text
        .split_whitespace()
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .count();

    let complexity = (word_count as f32).mul_add(0.05, question_markers as f32 * 1.5)
        + capitalized_words as f32 * 0.5;
    let scaled = default_top_k as f32 + complexity;
    scaled.round().clamp(default_top_k as f32, max_top_k as f32) as usize
}
