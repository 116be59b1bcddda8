//! The `Embedder` capability: dense text embeddings of a fixed dimension.

use std::future::Future;

use crate::Result;

/// A dense embedding provider.
///
/// Implementations are expected to return vectors comparable under cosine similarity; the
/// store normalizes as needed and does not assume pre-normalized input.
///
/// Methods return `impl Future<Output = ...> + Send` instead of using bare `async fn` sugar in
/// the trait. A generic caller (`E: Embedder`) cannot otherwise prove the anonymous future a
/// bare `async fn` trait method returns is `Send`, and this crate's extraction queue and
/// summary ticker hand collaborator futures straight to `tokio::spawn`, which requires
/// `Future: Send`. Spelling out the bound here, once, means every service generic over `E`
/// gets a provably-`Send` future without each call site re-deriving it. Implementations may
/// still use ordinary `async fn`/`async move` bodies.
pub trait Embedder: Send + Sync {
    /// The fixed dimension `D` of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    /// Embeds a single piece of text.
    ///
    /// Callers that can tolerate a missing embedding (e.g. the Fact Extractor) should treat an
    /// `Err` here as recoverable: store the fact without an embedding rather than failing the
    /// whole operation.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Embeds a batch of texts, in input order.
    ///
    /// The default implementation calls [`Embedder::embed`] sequentially; implementations with
    /// a genuine batch API should override this for throughput.
    fn embed_batch(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
        async move {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }
}
