//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Each point carries two named vectors: `dense` (cosine) holds the
//! embedding and `sparse` holds hashed term frequencies from
//! [`sparse_vector`], weighted by IDF on the server. Dense search queries
//! `dense`; [`VectorStore::lexical_search`] queries `sparse`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragbench_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! store.recreate_collection("docs", 1024).await?;
//! store.upsert("docs", &chunks).await?;
//! let results = store.search("docs", &query_embedding, 15).await?;
//! ```

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, Modifier, NamedVectors, PointStruct, Query,
    QueryPointsBuilder, ScoredPoint, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
    UpsertPointsBuilder, Value as QdrantValue, Vector, VectorInput, VectorParamsBuilder,
    VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::document::{Chunk, DocumentId, ScoredCandidate};
use crate::error::{RagError, Result};
use crate::lexical::sparse_vector;
use crate::vectorstore::VectorStore;

/// Name of the dense named vector.
pub const DENSE_VECTOR: &str = "dense";
/// Name of the sparse named vector.
pub const SPARSE_VECTOR: &str = "sparse";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store with default URL (`http://localhost:6334`).
    pub fn default_url() -> Result<Self> {
        Self::new("http://localhost:6334")
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::VectorStoreError { backend: "qdrant".to_string(), message: e.to_string() }
    }

    /// Stable point id for a chunk id, so re-upserting a chunk replaces it.
    pub fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
    }

    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn extract_index(value: &QdrantValue) -> Option<usize> {
        match &value.kind {
            Some(Kind::IntegerValue(n)) => usize::try_from(*n).ok(),
            _ => None,
        }
    }

    fn point(chunk: &Chunk) -> Result<PointStruct> {
        let payload = Payload::try_from(json!({
            "text": chunk.text,
            "source": chunk.source.as_str(),
            "chunk_id": chunk.id,
            "sequence_index": chunk.sequence_index,
        }))
        .map_err(Self::map_err)?;
        let (indices, values) = sparse_vector(&chunk.text);
        let vectors = NamedVectors::default()
            .add_vector(DENSE_VECTOR, Vector::new_dense(chunk.embedding.clone()))
            .add_vector(SPARSE_VECTOR, Vector::new_sparse(indices, values));
        Ok(PointStruct::new(Self::point_id(&chunk.id), vectors, payload))
    }

    /// Rebuild a candidate from a scored point's payload; `None` when the
    /// payload lacks the chunk fields.
    fn candidate(point: ScoredPoint) -> Option<ScoredCandidate> {
        let payload = &point.payload;
        let id = payload.get("chunk_id").and_then(Self::extract_string)?;
        let text = payload.get("text").and_then(Self::extract_string)?;
        let source = payload.get("source").and_then(Self::extract_string).unwrap_or_default();
        let sequence_index =
            payload.get("sequence_index").and_then(Self::extract_index).unwrap_or_default();
        let chunk = Chunk {
            id,
            text,
            source: DocumentId::new(source),
            sequence_index,
            embedding: Vec::new(),
            metadata: Default::default(),
        };
        Some(ScoredCandidate::new(chunk, point.score))
    }

    async fn query(
        &self,
        collection: &str,
        query: Query,
        using: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>> {
        let response = self
            .client
            .query(
                QueryPointsBuilder::new(collection)
                    .query(query)
                    .using(using)
                    .limit(limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let total = response.result.len();
        let candidates: Vec<ScoredCandidate> =
            response.result.into_iter().filter_map(Self::candidate).collect();
        if candidates.len() < total {
            warn!(collection, dropped = total - candidates.len(), "points without chunk payload");
        }
        Ok(candidates)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        let mut dense = VectorsConfigBuilder::default();
        dense.add_named_vector_params(
            DENSE_VECTOR,
            VectorParamsBuilder::new(dimensions as u64, Distance::Cosine),
        );
        let mut sparse = SparseVectorsConfigBuilder::default();
        sparse.add_named_vector_params(
            SPARSE_VECTOR,
            SparseVectorParamsBuilder::default().modifier(Modifier::Idf),
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(dense)
                    .sparse_vectors_config(sparse),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.client.collection_exists(name).await.map_err(Self::map_err)
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let points = chunks.iter().map(Self::point).collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = chunks.len(), "upserted chunks to qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>> {
        self.query(collection, Query::new_nearest(embedding.to_vec()), DENSE_VECTOR, limit).await
    }

    async fn lexical_search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>> {
        let (indices, values) = sparse_vector(query);
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let input = VectorInput::new_sparse(indices, values);
        self.query(collection, Query::new_nearest(input), SPARSE_VECTOR, limit).await
    }
}
