//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap a specific embedding backend behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use ragbench_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions().await?);
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Generate an embedding vector for a single document text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of document texts.
    ///
    /// The output has exactly one vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Generate the embedding for a search query.
    ///
    /// Backends that distinguish query and document tasks override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// Dimensionality of the produced vectors.
    ///
    /// Remote services often do not advertise it, so the default embeds a
    /// probe string and measures the result.
    async fn dimensions(&self) -> Result<usize> {
        let probe = self.embed("dimension probe").await?;
        if probe.is_empty() {
            return Err(RagError::EmbeddingError {
                provider: self.name().to_string(),
                message: "probe embedding was empty".to_string(),
            });
        }
        Ok(probe.len())
    }
}

/// Check that a batch response lines up with its request.
pub(crate) fn ensure_batch_len(
    provider: &str,
    expected: usize,
    embeddings: &[Vec<f32>],
) -> Result<()> {
    if embeddings.len() != expected {
        return Err(RagError::EmbeddingError {
            provider: provider.to_string(),
            message: format!("expected {expected} embeddings, got {}", embeddings.len()),
        });
    }
    Ok(())
}
