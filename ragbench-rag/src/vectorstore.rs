//! Vector store trait for storing and searching chunk embeddings.

use async_trait::async_trait;
use tracing::debug;

use crate::document::{Chunk, ScoredCandidate};
use crate::error::{RagError, Result};

/// A storage backend for chunk embeddings with similarity search.
///
/// Implementations manage named collections of [`Chunk`]s. A collection is
/// written once per indexing run and read many times afterwards.
///
/// # Example
///
/// ```rust,ignore
/// use ragbench_rag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.recreate_collection("docs", 384).await?;
/// store.upsert("docs", &chunks).await?;
/// let results = store.search("docs", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Whether a collection with this name exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Drop any existing collection with this name, then create it empty.
    async fn recreate_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            debug!(backend = self.name(), collection = name, "replacing existing collection");
            self.delete_collection(name).await?;
        }
        self.create_collection(name, dimensions).await
    }

    /// Upsert chunks into a collection. Chunks must have embeddings set.
    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()>;

    /// Return up to `limit` chunks nearest to `embedding`, best first.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>>;

    /// Return up to `limit` chunks ranked by a lexical signal, best first.
    ///
    /// Backends without a lexical index keep the default, which reports the
    /// capability as missing so callers can fall back to dense search.
    async fn lexical_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>> {
        let _ = (query, limit);
        Err(RagError::VectorStoreError {
            backend: self.name().to_string(),
            message: format!("lexical search is not supported (collection '{collection}')"),
        })
    }
}
