//! Rolling Summary (C6): a single, dense second-person condensation of the top facts,
//! refreshed asynchronously and never on the critical path of a caller waiting on the LLM.

use std::sync::{Arc, Mutex};

use crate::collaborators::{Embedder, GenerationOptions, Generator};
use crate::config::SummaryConfig;
use crate::models::RollingSummary;
use crate::observability::{counters, logging};
use crate::storage::traits::{FactStore, SummaryStore};
use crate::{Result, current_timestamp};

struct CacheState {
    cached: RollingSummary,
    dirty: bool,
    cached_at: u64,
}

/// Maintains the singleton [`RollingSummary`], regenerating it from the top active facts on a
/// background ticker, on explicit dirty-marking, or synchronously via [`SummaryService::force_refresh`].
///
/// Generic over its collaborators for the same reason as the other services in this module:
/// `Generator`/`Embedder` cannot be boxed as trait objects.
pub struct SummaryService<F, S, G, E>
where
    F: FactStore,
    S: SummaryStore,
    G: Generator,
    E: Embedder,
{
    fact_store: Arc<F>,
    summary_store: Arc<S>,
    generator: Arc<G>,
    embedder: Arc<E>,
    config: SummaryConfig,
    state: Mutex<CacheState>,
}

impl<F, S, G, E> SummaryService<F, S, G, E>
where
    F: FactStore,
    S: SummaryStore,
    G: Generator,
    E: Embedder,
{
    /// Builds a summary service, loading whatever summary is currently persisted (or
    /// [`RollingSummary::empty`]) as the initial cache.
    pub fn new(
        fact_store: Arc<F>,
        summary_store: Arc<S>,
        generator: Arc<G>,
        embedder: Arc<E>,
        config: SummaryConfig,
    ) -> Result<Self> {
        let cached = summary_store.load()?;
        Ok(Self {
            fact_store,
            summary_store,
            generator,
            embedder,
            config,
            state: Mutex::new(CacheState {
                cached,
                dirty: false,
                cached_at: current_timestamp(),
            }),
        })
    }

    /// Returns the summary to show the caller right now, per the crate's cache policy: the
    /// in-memory cache if it is fresh, a reload from the store if the cache has aged past
    /// `2 * refreshIntervalSecs`, or (if the reloaded value is itself stale) a best-effort
    /// refresh kick followed by the prior value. Never blocks on generator latency.
    pub async fn get(&self) -> RollingSummary {
        let stale_after = self.config.refresh_interval_secs.saturating_mul(2);
        let now = current_timestamp();

        let needs_reload = {
            let state = self.lock_state();
            now.saturating_sub(state.cached_at) >= stale_after
        };

        if !needs_reload {
            return self.lock_state().cached.clone();
        }

        match self.summary_store.load() {
            Ok(reloaded) => {
                let mut state = self.lock_state();
                state.cached_at = current_timestamp();
                state.cached = reloaded;
            },
            Err(e) => logging::log_recovered_failure("summary", "reload", &e),
        }

        let still_stale = {
            let state = self.lock_state();
            now.saturating_sub(state.cached_at) >= stale_after
        };
        if still_stale {
            // Kick a refresh for the ticker (or a future `ForceRefresh`) to pick up; never
            // await the generator here, regardless of `config.async` — the caller gets the
            // prior value either way, per the never-block-on-LLM-latency cache policy.
            self.mark_dirty();
        }

        self.lock_state().cached.clone()
    }

    /// Marks the summary dirty, so the background ticker (or the next explicit refresh) picks
    /// up a regeneration. Never blocks and never fails.
    pub fn mark_dirty(&self) {
        self.lock_state().dirty = true;
    }

    /// Synchronously regenerates the summary regardless of dirtiness, per `ForceRefresh`.
    pub async fn force_refresh(&self) -> Result<RollingSummary> {
        self.refresh().await
    }

    /// Regenerates the summary if dirty and summary generation is enabled; otherwise a no-op
    /// that returns the current cache. Intended to be called from the background ticker.
    pub async fn tick(&self) -> Result<RollingSummary> {
        if !self.config.enabled {
            return Ok(self.lock_state().cached.clone());
        }
        let dirty = self.lock_state().dirty;
        if !dirty {
            return Ok(self.lock_state().cached.clone());
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<RollingSummary> {
        let facts = self.fact_store.recent(self.config.max_facts, false)?;
        let prior = self.lock_state().cached.clone();

        let new_fact_count = facts
            .iter()
            .filter(|f| !prior.source_fact_ids.contains(&f.id))
            .count();
        let incremental = !prior.is_empty()
            && !facts.is_empty()
            && (new_fact_count as f32) < (facts.len() as f32) * 0.5;

        let prompt = if incremental {
            incremental_prompt(&prior.summary_text, &facts)
        } else {
            full_prompt(&facts)
        };

        let outcome = self
            .generator
            .generate(&prompt, &GenerationOptions::summary())
            .await;

        let summary_text = match outcome {
            Ok(outcome) => {
                let text = outcome.text.trim().to_string();
                if text.is_empty() { prior.summary_text.clone() } else { text }
            },
            Err(e) => {
                logging::log_recovered_failure("summary", "generate", &e);
                let mut state = self.lock_state();
                state.dirty = false;
                return Ok(state.cached.clone());
            },
        };

        let embedding = match self.embedder.embed(&summary_text).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                logging::log_recovered_failure("summary", "embed", &e);
                None
            },
        };

        let refreshed = RollingSummary {
            summary_text,
            updated_at: current_timestamp(),
            source_fact_ids: facts.iter().map(|f| f.id).collect(),
            fact_count: facts.len(),
            embedding,
        };

        self.summary_store.save(&refreshed)?;

        metrics::counter!(
            counters::SUMMARY_REFRESHES,
            "mode" => if incremental { "incremental" } else { "full" }
        )
        .increment(1);

        let mut state = self.lock_state();
        state.cached = refreshed.clone();
        state.dirty = false;
        state.cached_at = current_timestamp();
        Ok(refreshed)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<F, S, G, E> crate::services::updater::DirtyMarker for SummaryService<F, S, G, E>
where
    F: FactStore,
    S: SummaryStore,
    G: Generator,
    E: Embedder,
{
    fn mark_dirty(&self) {
        Self::mark_dirty(self);
    }
}

/// Spawns a background tokio task calling [`SummaryService::tick`] every
/// `refreshIntervalSecs`, logging rather than propagating failures (there is no caller to
/// surface them to).
pub fn spawn_ticker<F, S, G, E>(service: Arc<SummaryService<F, S, G, E>>) -> tokio::task::JoinHandle<()>
where
    F: FactStore + 'static,
    S: SummaryStore + 'static,
    G: Generator + 'static,
    E: Embedder + 'static,
{
    let interval = service.config.refresh_interval_secs.max(1);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval));
        loop {
            ticker.tick().await;
            if let Err(e) = service.tick().await {
                logging::log_recovered_failure("summary", "ticker", &e);
            }
        }
    })
}

fn full_prompt(facts: &[crate::models::Fact]) -> String {
    let mut prompt = String::from(
        "Write a short, dense second-person summary of what is known about the user, based on \
         the facts below. One or two sentences. Do not invent anything not supported by the \
         facts.\n\nFacts:\n",
    );
    for fact in facts {
        prompt.push_str("- ");
        prompt.push_str(&fact.text);
        prompt.push('\n');
    }
    prompt
}

fn incremental_prompt(prior_summary: &str, facts: &[crate::models::Fact]) -> String {
    let mut prompt = String::from(
        "Update the following second-person summary of the user to incorporate the facts \
         below, keeping it short and dense. Preserve anything still true; drop anything the new \
         facts contradict.\n\nCurrent summary:\n",
    );
    prompt.push_str(prior_summary);
    prompt.push_str("\n\nFacts:\n");
    for fact in facts {
        prompt.push_str("- ");
        prompt.push_str(&fact.text);
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::storage::sqlite::open_in_memory;
    use crate::Error;

    struct FixedGenerator(String);
    impl Generator for FixedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<crate::collaborators::GenerationOutcome> {
            Ok(crate::collaborators::GenerationOutcome {
                text: self.0.clone(),
                tokens_generated: None,
                duration: None,
            })
        }
    }

    struct FailingGenerator;
    impl Generator for FailingGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<crate::collaborators::GenerationOutcome> {
            Err(Error::GeneratorFailure("down".to_string()))
        }
    }

    struct FixedEmbedder(usize);
    impl Embedder for FixedEmbedder {
        fn dimensions(&self) -> usize {
            self.0
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; self.0])
        }
    }

    #[tokio::test]
    async fn refresh_from_empty_store_produces_empty_source_list() {
        let (store, _graph, summary_store) = open_in_memory(4).unwrap();
        let service = SummaryService::new(
            Arc::new(store),
            Arc::new(summary_store),
            Arc::new(FixedGenerator("You are new here.".to_string())),
            Arc::new(FixedEmbedder(4)),
            SummaryConfig::default(),
        )
        .unwrap();
        let refreshed = service.force_refresh().await.unwrap();
        assert_eq!(refreshed.fact_count, 0);
    }

    #[tokio::test]
    async fn incrementality_matches_scenario_s5() {
        let (store, _graph, summary_store) = open_in_memory(4).unwrap();
        let store = Arc::new(store);
        let now = current_timestamp();
        for i in 0..20 {
            let fact = crate::models::Fact::new(format!("old fact {i}"), Category::Other, 0.3, now);
            store.insert(&fact).unwrap();
        }

        let service = SummaryService::new(
            store.clone(),
            Arc::new(summary_store),
            Arc::new(FixedGenerator("You like many things.".to_string())),
            Arc::new(FixedEmbedder(4)),
            SummaryConfig {
                max_facts: 100,
                ..SummaryConfig::default()
            },
        )
        .unwrap();
        let first = service.force_refresh().await.unwrap();
        assert_eq!(first.fact_count, 20);

        for i in 0..3 {
            let fact = crate::models::Fact::new(format!("new fact {i}"), Category::Other, 0.3, now);
            store.insert(&fact).unwrap();
        }

        let refreshed = service.force_refresh().await.unwrap();
        assert_eq!(refreshed.fact_count, 23);
    }

    #[tokio::test]
    async fn generator_failure_returns_prior_summary_without_error() {
        let (store, _graph, summary_store) = open_in_memory(4).unwrap();
        let service = SummaryService::new(
            Arc::new(store),
            Arc::new(summary_store),
            Arc::new(FailingGenerator),
            Arc::new(FixedEmbedder(4)),
            SummaryConfig::default(),
        )
        .unwrap();
        let refreshed = service.force_refresh().await.unwrap();
        assert!(refreshed.is_empty());
    }

    #[tokio::test]
    async fn get_returns_cached_value_when_fresh() {
        let (store, _graph, summary_store) = open_in_memory(4).unwrap();
        let service = SummaryService::new(
            Arc::new(store),
            Arc::new(summary_store),
            Arc::new(FixedGenerator("Fresh summary.".to_string())),
            Arc::new(FixedEmbedder(4)),
            SummaryConfig {
                refresh_interval_secs: 600,
                ..SummaryConfig::default()
            },
        )
        .unwrap();
        service.force_refresh().await.unwrap();
        let got = service.get().await;
        assert_eq!(got.summary_text, "Fresh summary.");
    }

    #[test]
    fn mark_dirty_sets_flag_for_next_tick() {
        let (store, _graph, summary_store) = open_in_memory(4).unwrap();
        let service = SummaryService::new(
            Arc::new(store),
            Arc::new(summary_store),
            Arc::new(FixedGenerator("x".to_string())),
            Arc::new(FixedEmbedder(4)),
            SummaryConfig::default(),
        )
        .unwrap();
        assert!(!service.lock_state().dirty);
        service.mark_dirty();
        assert!(service.lock_state().dirty);
    }
}
