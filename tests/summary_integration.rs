//! Rolling Summary incrementality integration test (scenario S5), driven through the
//! host-facing [`MemoryEngine`] facade rather than [`slm_memory::SummaryService`] directly.

#![allow(clippy::unwrap_used)]

use slm_memory::services::extractor::ExtractionOutcome;
use slm_memory::{Category, Fact, GenerationOptions, GenerationOutcome, Generator, MemoryConfig, MemoryEngine, Result};

struct FixedGenerator(String);

impl Generator for FixedGenerator {
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationOutcome> {
        Ok(GenerationOutcome {
            text: self.0.clone(),
            tokens_generated: None,
            duration: None,
        })
    }
}

struct ZeroEmbedder(usize);

impl slm_memory::Embedder for ZeroEmbedder {
    fn dimensions(&self) -> usize {
        self.0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0; self.0])
    }
}

fn facts_outcome(count: usize) -> ExtractionOutcome {
    let now = slm_memory::current_timestamp();
    ExtractionOutcome {
        facts: (0..count)
            .map(|i| Fact::new(format!("fact {i}"), Category::Other, 0.3, now))
            .collect(),
        entities: Vec::new(),
        relationships: Vec::new(),
    }
}

#[tokio::test]
async fn refresh_after_a_few_new_facts_takes_the_incremental_path() {
    let mut config = MemoryConfig::default().with_embedding_dim(4);
    config.extraction.r#async = false;
    let engine = MemoryEngine::new_in_memory(
        config,
        FixedGenerator("You know a lot about the user.".to_string()),
        ZeroEmbedder(4),
    )
    .unwrap();

    engine.apply_extraction(&facts_outcome(20)).await.unwrap();
    let first = engine.force_summary_refresh().await.unwrap();
    assert_eq!(first.fact_count, 20);

    engine.apply_extraction(&facts_outcome(3)).await.unwrap();
    let refreshed = engine.force_summary_refresh().await.unwrap();

    // 3 new facts out of 23 total is a ratio well under one half, so the refresh should have
    // taken the incremental path and the summary should now account for all 23 facts.
    assert_eq!(refreshed.fact_count, 23);
}
