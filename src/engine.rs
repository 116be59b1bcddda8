//! [`MemoryEngine`]: the host-facing facade wiring the six components (C1-C7) together over a
//! `SQLite`-backed store.
//!
//! The turn log itself is the host's responsibility (see the crate-level docs' external
//! collaborator boundary); this facade keeps a small bounded in-process buffer of recent turns
//! purely as a convenience source for [`MemoryEngine::build_context`], not as a durable log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::collaborators::{Embedder, Generator};
use crate::config::MemoryConfig;
use crate::models::{Role, Turn};
use crate::observability::{counters, logging};
use crate::services::context::ContextBuilder;
use crate::services::extractor::{ExtractionOutcome, ExtractionQueue, FactExtractor};
use crate::services::retriever::{HybridRetriever, RetrievalQuery, ScoredFact};
use crate::services::summary::SummaryService;
use crate::services::updater::{MemoryUpdater, UpdateOutcome};
use crate::storage::sqlite::{self, SqliteEntityGraph, SqliteFactStore, SqliteSummaryStore};
use crate::storage::traits::{FactStats, FactStore};
use crate::{Result, current_timestamp};

/// Recent turns kept in-process are capped well above any reasonable `turnsToUse`, so normal
/// configurations never see truncation during a single session.
const RECENT_TURNS_CAPACITY: usize = 256;

const EXTRACTION_QUEUE_CAPACITY: usize = 100;
const EXTRACTION_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Wires the Fact Store, Entity Graph, Fact Extractor, Memory Updater, Hybrid Retriever,
/// Rolling Summary, and Context Builder together into the single entry point a host process
/// uses.
///
/// Generic over the host's `Generator`/`Embedder` collaborators, the same way every individual
/// service is.
pub struct MemoryEngine<G, E>
where
    G: Generator + 'static,
    E: Embedder + 'static,
{
    fact_store: Arc<SqliteFactStore>,
    extractor: Arc<FactExtractor<G, E>>,
    extraction_queue: Option<ExtractionQueue>,
    updater: Arc<MemoryUpdater<SqliteFactStore, SqliteEntityGraph, G, E>>,
    retriever: HybridRetriever<SqliteFactStore, SqliteEntityGraph, E>,
    summary: Arc<SummaryService<SqliteFactStore, SqliteSummaryStore, G, E>>,
    context_builder: ContextBuilder,
    recent_turns: Mutex<VecDeque<Turn>>,
    config: MemoryConfig,
    ticker: Option<tokio::task::JoinHandle<()>>,
}

impl<G, E> MemoryEngine<G, E>
where
    G: Generator + 'static,
    E: Embedder + 'static,
{
    /// Opens (or creates) the `SQLite`-backed store at `config.storage.db_path` and wires every
    /// service over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or its schema cannot be bootstrapped —
    /// per the error-handling policy this is fatal and the host should refuse to start.
    pub fn new(config: MemoryConfig, generator: G, embedder: E) -> Result<Self> {
        let (fact_store, entity_graph, summary_store) =
            sqlite::open(&config.storage.db_path, config.storage.embedding_dim)?;
        Self::build(config, fact_store, entity_graph, summary_store, generator, embedder)
    }

    /// Opens an in-memory store, for tests and ephemeral sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory store cannot be opened.
    pub fn new_in_memory(config: MemoryConfig, generator: G, embedder: E) -> Result<Self> {
        let (fact_store, entity_graph, summary_store) =
            sqlite::open_in_memory(config.storage.embedding_dim)?;
        Self::build(config, fact_store, entity_graph, summary_store, generator, embedder)
    }

    fn build(
        config: MemoryConfig,
        fact_store: SqliteFactStore,
        entity_graph: SqliteEntityGraph,
        summary_store: SqliteSummaryStore,
        generator: G,
        embedder: E,
    ) -> Result<Self> {
        let fact_store = Arc::new(fact_store);
        let entity_graph = Arc::new(entity_graph);
        let generator = Arc::new(generator);
        let embedder = Arc::new(embedder);

        let extractor = Arc::new(FactExtractor::new(
            Arc::clone(&generator),
            Arc::clone(&embedder),
            config.extraction,
        ));
        let extraction_queue = config.extraction.r#async.then(|| {
            ExtractionQueue::spawn(Arc::clone(&extractor), EXTRACTION_QUEUE_CAPACITY, EXTRACTION_JOB_TIMEOUT)
        });

        let updater = Arc::new(MemoryUpdater::new(
            Arc::clone(&fact_store),
            Arc::clone(&entity_graph),
            Arc::clone(&generator),
            Arc::clone(&embedder),
            config.update,
        ));

        let retriever = HybridRetriever::new(
            Arc::clone(&fact_store),
            Arc::clone(&entity_graph),
            Arc::clone(&embedder),
            config.retrieval,
            config.graph,
        );

        let summary = Arc::new(SummaryService::new(
            Arc::clone(&fact_store),
            Arc::new(summary_store),
            Arc::clone(&generator),
            Arc::clone(&embedder),
            config.summary,
        )?);

        let ticker = config
            .summary
            .enabled
            .then(|| crate::services::summary::spawn_ticker(Arc::clone(&summary)));

        let context_builder = ContextBuilder::new(config.context.clone());

        Ok(Self {
            fact_store,
            extractor,
            extraction_queue,
            updater,
            retriever,
            summary,
            context_builder,
            recent_turns: Mutex::new(VecDeque::with_capacity(RECENT_TURNS_CAPACITY)),
            config,
            ticker,
        })
    }

    /// Ingests one exchange: records it in the in-process recent-turns buffer and runs
    /// extraction + reconciliation, inline or via the bounded async queue per
    /// `config.extraction.async`.
    ///
    /// Storage failures from the Updater's mutating calls propagate; generator/embedder
    /// failures inside extraction are recovered locally and this call returns `Ok(())` having
    /// learned nothing new this turn.
    ///
    /// # Errors
    ///
    /// Returns an error if a Fact Store or Entity Graph mutation fails while reconciling
    /// extracted facts.
    pub async fn process_turn(
        &self,
        user_text: &str,
        assistant_text: &str,
        turn_id: Option<String>,
    ) -> Result<()> {
        let now = current_timestamp();
        // The host may not assign its own turn ids; mint one so facts extracted from this
        // exchange still carry distinguishable provenance (source_turn_ids).
        let id = turn_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let user_turn = Turn::new(Role::User, user_text, now).with_turn_id(id.clone());
        let assistant_turn = Turn::new(Role::Assistant, assistant_text, now).with_turn_id(id);

        self.push_recent_turns([user_turn.clone(), assistant_turn.clone()]);

        if !self.config.extraction.enabled {
            return Ok(());
        }

        let turns = vec![user_turn, assistant_turn];

        if let Some(queue) = &self.extraction_queue {
            match queue.enqueue(turns) {
                Ok(receiver) => {
                    let updater = Arc::clone(&self.updater);
                    let summary = Arc::clone(&self.summary);
                    tokio::spawn(async move {
                        match receiver.await {
                            Ok(Ok(outcome)) => {
                                if let Err(e) = updater.process_extraction(&outcome, summary.as_ref()).await {
                                    logging::log_recovered_failure("engine", "process_extraction", &e);
                                }
                            },
                            Ok(Err(e)) => logging::log_recovered_failure("engine", "extract", &e),
                            Err(e) => logging::log_recovered_failure("engine", "extraction_job", &e),
                        }
                    });
                    Ok(())
                },
                Err(e) => {
                    logging::log_recovered_failure("engine", "enqueue_extraction", &e);
                    Ok(())
                },
            }
        } else {
            let outcome = match self.extractor.extract(&turns).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    logging::log_recovered_failure("engine", "extract", &e);
                    return Ok(());
                },
            };
            self.apply_extraction(&outcome).await?;
            Ok(())
        }
    }

    /// Reconciles an already-produced extraction outcome. Exposed directly for hosts that run
    /// extraction on their own schedule and only want the Updater + dirty-marking behavior.
    ///
    /// # Errors
    ///
    /// Returns an error if a Fact Store or Entity Graph mutation fails.
    pub async fn apply_extraction(&self, outcome: &ExtractionOutcome) -> Result<Vec<UpdateOutcome>> {
        self.updater.process_extraction(outcome, self.summary.as_ref()).await
    }

    /// Assembles a prompt within `max_context_tokens` from the system message, the Rolling
    /// Summary, facts retrieved for `user_query`, the buffered recent turns, and `user_query`
    /// itself.
    ///
    /// Retrieval failures degrade gracefully: the context is still built, just without the
    /// facts section.
    pub async fn build_context(&self, user_query: &str, max_context_tokens: u32) -> String {
        let summary = self.summary.get().await;

        let facts = match self
            .retriever
            .retrieve(&RetrievalQuery::text(user_query))
            .await
        {
            Ok(facts) => facts,
            Err(e) => {
                logging::log_recovered_failure("engine", "build_context_retrieve", &e);
                Vec::new()
            },
        };

        let turns = self.lock_recent_turns().iter().cloned().collect::<Vec<_>>();

        self.context_builder.build(user_query, max_context_tokens, &summary, &facts, &turns)
    }

    /// Returns the current Rolling Summary, per its cache policy.
    pub async fn get_summary(&self) -> crate::models::RollingSummary {
        self.summary.get().await
    }

    /// Runs the Hybrid Retriever directly for `query_text`, bounded to `k` results.
    ///
    /// # Errors
    ///
    /// Propagates a `SQLite` failure in the semantic, graph, or recency-fallback pass.
    pub async fn retrieve_facts(&self, query_text: &str, k: usize) -> Result<Vec<ScoredFact>> {
        self.retriever
            .retrieve(&RetrievalQuery::text(query_text).with_max_results(k))
            .await
    }

    /// Returns aggregate Fact Store counts.
    ///
    /// # Errors
    ///
    /// Propagates a `SQLite` failure.
    pub fn stats(&self) -> Result<FactStats> {
        self.fact_store.stats()
    }

    /// Synchronously regenerates the Rolling Summary regardless of dirtiness.
    ///
    /// # Errors
    ///
    /// Propagates a `SQLite` failure persisting the refreshed summary.
    pub async fn force_summary_refresh(&self) -> Result<crate::models::RollingSummary> {
        self.summary.force_refresh().await
    }

    /// Runs `PruneOld` with the configured thresholds, returning the number of facts removed.
    ///
    /// # Errors
    ///
    /// Propagates a `SQLite` failure.
    pub fn prune_facts(&self) -> Result<u64> {
        let removed = self
            .fact_store
            .prune_old(self.config.storage.prune_threshold, self.config.storage.prune_keep_recent)?;
        if removed > 0 {
            metrics::counter!(counters::PRUNE_REMOVED).increment(removed);
        }
        Ok(removed)
    }

    /// Stops the background summary ticker. The underlying store closes when the last `Arc`
    /// to it is dropped; this only tears down the engine's own background task.
    pub fn close(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn push_recent_turns(&self, turns: impl IntoIterator<Item = Turn>) {
        let mut buffer = self.lock_recent_turns();
        for turn in turns {
            if buffer.len() >= RECENT_TURNS_CAPACITY {
                buffer.pop_front();
            }
            buffer.push_back(turn);
        }
    }

    fn lock_recent_turns(&self) -> std::sync::MutexGuard<'_, VecDeque<Turn>> {
        self.recent_turns.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<G, E> Drop for MemoryEngine<G, E>
where
    G: Generator + 'static,
    E: Embedder + 'static,
{
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collaborators::{GenerationOptions, GenerationOutcome};

    struct EchoGenerator;
    impl Generator for EchoGenerator {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationOutcome> {
            Ok(GenerationOutcome {
                text: "FACT|biographical|0.6|Lives in Berlin".to_string(),
                tokens_generated: None,
                duration: None,
            })
        }
    }

    struct ZeroEmbedder(usize);
    impl Embedder for ZeroEmbedder {
        fn dimensions(&self) -> usize {
            self.0
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; self.0])
        }
    }

    fn test_config() -> MemoryConfig {
        let mut config = MemoryConfig::default().with_embedding_dim(4);
        config.extraction.r#async = false;
        config
    }

    #[tokio::test]
    async fn process_turn_learns_a_fact_inline() {
        let engine = MemoryEngine::new_in_memory(test_config(), EchoGenerator, ZeroEmbedder(4)).unwrap();
        engine
            .process_turn("I live in Berlin now.", "Got it, noted!", None)
            .await
            .unwrap();
        let stats = engine.stats().unwrap();
        assert_eq!(stats.active, 1);
    }

    #[tokio::test]
    async fn build_context_includes_user_query() {
        let engine = MemoryEngine::new_in_memory(test_config(), EchoGenerator, ZeroEmbedder(4)).unwrap();
        let context = engine.build_context("What do you know about me?", 500).await;
        assert!(context.contains("What do you know about me?"));
    }

    #[tokio::test]
    async fn retrieve_facts_finds_learned_fact() {
        let engine = MemoryEngine::new_in_memory(test_config(), EchoGenerator, ZeroEmbedder(4)).unwrap();
        engine.process_turn("I live in Berlin now.", "Noted.", None).await.unwrap();
        let results = engine.retrieve_facts("Berlin", 5).await.unwrap();
        assert!(!results.is_empty());
    }
}
