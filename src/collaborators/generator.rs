//! The `Generator` capability: blocking and streaming completion from the generation backend.

use std::future::Future;

use crate::Result;

/// Parameters accepted by a single generation call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Top-k sampling cutoff, if the backend supports it.
    pub top_k: Option<u32>,
    /// Top-p (nucleus) sampling cutoff, if the backend supports it.
    pub top_p: Option<f32>,
    /// Strings that stop generation when produced.
    pub stop: Vec<String>,
}

impl GenerationOptions {
    /// Options tuned for the Fact Extractor's low-temperature, deterministic line output.
    #[must_use]
    pub fn extraction() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.3,
            top_k: None,
            top_p: None,
            stop: Vec::new(),
        }
    }

    /// Options tuned for the Memory Updater's decision prompt.
    #[must_use]
    pub fn decision() -> Self {
        Self {
            max_tokens: 128,
            temperature: 0.2,
            top_k: None,
            top_p: None,
            stop: Vec::new(),
        }
    }

    /// Options tuned for Rolling Summary regeneration.
    #[must_use]
    pub fn summary() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.5,
            top_k: None,
            top_p: None,
            stop: Vec::new(),
        }
    }
}

/// The result of a completed generation call.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// The generated text.
    pub text: String,
    /// Tokens actually produced, if the backend reports it.
    pub tokens_generated: Option<u32>,
    /// Wall-clock duration of the call, if the backend reports it.
    pub duration: Option<std::time::Duration>,
}

/// A sink for incrementally delivered tokens.
pub trait TokenSink: Send {
    /// Called once per token (or token chunk) as it is produced.
    fn push(&mut self, token: &str);
}

impl<F: FnMut(&str) + Send> TokenSink for F {
    fn push(&mut self, token: &str) {
        self(token);
    }
}

/// The generation backend, modeled as a small capability interface supplied by the host.
///
/// Both methods return `impl Future<Output = ...> + Send` rather than using `async fn` sugar
/// directly in the trait: a bare `async fn` in a trait desugars to a return type whose
/// `Send`-ness cannot be proven by generic callers, and every service here hands its
/// collaborator futures to `tokio::spawn`, which requires `Future: Send`. Spelling out the
/// bound here means `FactExtractor`, `MemoryUpdater`, and `SummaryService` get a provably-`Send`
/// future for free, generic over any `G: Generator`. Implementations may still use ordinary
/// `async fn`/`async move` bodies; the compiler checks the produced future against this bound.
pub trait Generator: Send + Sync {
    /// Blocking completion: returns the full text and generation stats.
    fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> impl Future<Output = Result<GenerationOutcome>> + Send;

    /// Incremental completion: pushes tokens to `sink` as they arrive.
    ///
    /// The default implementation falls back to [`Generator::generate`] and pushes the whole
    /// result as a single chunk, for hosts whose backend has no incremental delivery path.
    fn stream(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        sink: &mut dyn TokenSink,
    ) -> impl Future<Output = Result<GenerationOutcome>> + Send {
        async move {
            let outcome = self.generate(prompt, options).await?;
            sink.push(&outcome.text);
            Ok(outcome)
        }
    }
}
