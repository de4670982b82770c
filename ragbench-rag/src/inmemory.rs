//! In-memory vector store using cosine similarity and BM25.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`, with a tantivy RAM index
//! per collection for lexical search. It is suitable for development,
//! testing, and the small corpora the CLI indexes.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Chunk, ScoredCandidate};
use crate::error::{RagError, Result};
use crate::lexical::LexicalIndex;
use crate::vectorstore::VectorStore;

const BACKEND: &str = "in-memory";

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    /// Insertion order; ties in search results keep this order.
    chunks: Vec<Chunk>,
    positions: HashMap<String, usize>,
    lexical: LexicalIndex,
}

impl Collection {
    fn new(dimensions: usize) -> Result<Self> {
        Ok(Self {
            dimensions,
            chunks: Vec::new(),
            positions: HashMap::new(),
            lexical: LexicalIndex::new()?,
        })
    }
}

/// An in-memory vector store.
///
/// Collections are stored as collection name → ordered chunks. Dense search
/// ranks by cosine similarity; lexical search ranks by BM25 over chunk text,
/// using an index maintained at upsert time.
/// All operations are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use ragbench_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks stored in `collection`, if it exists.
    pub async fn len(&self, collection: &str) -> Option<usize> {
        self.collections.read().await.get(collection).map(|c| c.chunks.len())
    }
}

fn missing(collection: &str) -> RagError {
    RagError::VectorStoreError {
        backend: BACKEND.to_string(),
        message: format!("collection '{collection}' does not exist"),
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn rank(mut scored: Vec<ScoredCandidate>, limit: usize) -> Vec<ScoredCandidate> {
    scored.sort_by(|a, b| {
        b.similarity_score.partial_cmp(&a.similarity_score).unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if !collections.contains_key(name) {
            collections.insert(name.to_string(), Collection::new(dimensions)?);
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        if let Some(chunk) = chunks.iter().find(|c| c.embedding.len() != store.dimensions) {
            return Err(RagError::VectorStoreError {
                backend: BACKEND.to_string(),
                message: format!(
                    "chunk '{}' has {} dimensions, collection '{collection}' expects {}",
                    chunk.id,
                    chunk.embedding.len(),
                    store.dimensions
                ),
            });
        }
        store.lexical.upsert(chunks)?;
        for chunk in chunks {
            match store.positions.get(&chunk.id) {
                Some(&pos) => store.chunks[pos] = chunk.clone(),
                None => {
                    store.positions.insert(chunk.id.clone(), store.chunks.len());
                    store.chunks.push(chunk.clone());
                }
            }
        }
        debug!(backend = BACKEND, collection, count = chunks.len(), "upserted chunks");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let scored = store
            .chunks
            .iter()
            .map(|chunk| {
                ScoredCandidate::new(chunk.clone(), cosine_similarity(&chunk.embedding, embedding))
            })
            .collect();
        Ok(rank(scored, limit))
    }

    async fn lexical_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let hits = store.lexical.search(query, limit)?;
        Ok(hits
            .into_iter()
            .filter_map(|(id, score)| {
                let &pos = store.positions.get(&id)?;
                Some(ScoredCandidate::new(store.chunks[pos].clone(), score))
            })
            .collect())
    }
}
