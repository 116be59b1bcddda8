//! Context Builder integration test: assembles a full prompt from a live engine's summary,
//! retrieved facts, and recent turns within a token budget.
//!
//! Uses `tokio_test::block_on` rather than `#[tokio::test]`, for a plain synchronous test entry
//! point over the same async engine surface the other integration tests drive with the macro.

#![allow(clippy::unwrap_used)]

use slm_memory::{Embedder, GenerationOptions, GenerationOutcome, Generator, MemoryConfig, MemoryEngine, Result};

struct EchoGenerator;

impl Generator for EchoGenerator {
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationOutcome> {
        Ok(GenerationOutcome {
            text: "FACT|preference|0.7|Prefers tea over coffee".to_string(),
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
        Ok(vec![0.3; self.0])
    }
}

#[test]
fn build_context_assembles_summary_facts_and_the_user_message() {
    tokio_test::block_on(async {
        let mut config = MemoryConfig::default().with_embedding_dim(4);
        config.extraction.r#async = false;
        config.summary.r#async = false;

        let engine = MemoryEngine::new_in_memory(config, EchoGenerator, ZeroEmbedder(4)).unwrap();
        engine
            .process_turn("I prefer tea over coffee.", "Noted!", None)
            .await
            .unwrap();

        let context = engine.build_context("What do I like to drink?", 500).await;
        assert!(context.contains("What do I like to drink?"));
        assert!(context.contains("tea"));
    });
}
