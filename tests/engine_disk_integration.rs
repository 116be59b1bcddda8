//! Exercises [`MemoryEngine::new`] against a real on-disk `SQLite` file, as opposed to the
//! in-memory store every other integration test uses — the path a host process actually takes.

#![allow(clippy::unwrap_used)]

use slm_memory::{Embedder, GenerationOptions, GenerationOutcome, Generator, MemoryConfig, MemoryEngine, Result};
use tempfile::TempDir;

struct EchoGenerator;

impl Generator for EchoGenerator {
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationOutcome> {
        Ok(GenerationOutcome {
            text: "FACT|biographical|0.6|Owns a bicycle".to_string(),
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
        Ok(vec![0.2; self.0])
    }
}

#[tokio::test]
async fn facts_learned_on_disk_survive_a_fresh_engine_over_the_same_file() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("memory.sqlite3");
    let mut config = MemoryConfig::default()
        .with_db_path(db_path.to_str().unwrap())
        .with_embedding_dim(4);
    config.extraction.r#async = false;

    {
        let engine = MemoryEngine::new(config.clone(), EchoGenerator, ZeroEmbedder(4)).unwrap();
        engine
            .process_turn("I just bought a bicycle.", "Cool!", None)
            .await
            .unwrap();
        assert_eq!(engine.stats().unwrap().active, 1);
    }

    // Reopening the same file with a fresh engine should see the previously persisted fact.
    let reopened = MemoryEngine::new(config, EchoGenerator, ZeroEmbedder(4)).unwrap();
    assert_eq!(reopened.stats().unwrap().active, 1);
    let results = reopened.retrieve_facts("bicycle", 5).await.unwrap();
    assert!(results.iter().any(|sf| sf.fact.text.contains("bicycle")));
}
