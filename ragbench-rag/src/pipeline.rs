//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates indexing (chunk → embed → store) and
//! conversational querying (rewrite → embed → retrieve → rerank → answer →
//! history update). Collaborator failures never abort a query: each step
//! degrades and the degradation is reported on the returned outcome.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragbench_rag::{RagPipeline, RagConfig, InMemoryVectorStore};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .completion_model(Arc::new(my_model))
//!     .build()?;
//!
//! pipeline.index("docs", &documents).await?;
//! let outcome = pipeline.ask("docs", "conversation-1", "What is RAG?").await?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::answer::{AnswerGenerator, AnswerStatus};
use crate::cache::{AnswerCache, CachedAnswer};
use crate::chunking::Chunker;
use crate::completion::CompletionModel;
use crate::config::{RagConfig, SearchMode};
use crate::document::{Chunk, Document, DocumentId, ScoredCandidate};
use crate::embedding::{EmbeddingProvider, ensure_batch_len};
use crate::error::{RagError, Result};
use crate::guard::{ContentGuard, Verdict};
use crate::reranker::Reranker;
use crate::rewrite::QueryRewriter;
use crate::scoring::{reciprocal_rank_fusion, select_top_k, sort_by_final_score};
use crate::session::{ConversationTurn, History, SessionStore};
use crate::vectorstore::VectorStore;

/// Summary of one indexing run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexReport {
    /// Documents whose chunks were stored.
    pub documents_indexed: usize,
    /// Total chunks stored.
    pub chunks_indexed: usize,
    /// Documents that failed to embed or store, with the reason.
    pub skipped: Vec<(DocumentId, String)>,
    /// Documents withheld by the content guard, with the reason.
    pub withheld: Vec<(DocumentId, String)>,
}

/// Candidates selected for one query.
#[derive(Debug, Default, Clone)]
pub struct Retrieval {
    /// The selected chunks, best first, at most `top_k`.
    pub candidates: Vec<ScoredCandidate>,
    /// Steps that failed and were worked around.
    pub warnings: Vec<String>,
}

/// Result of answering one question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    /// The question as asked.
    pub question: String,
    /// The standalone query used for retrieval.
    pub search_query: String,
    /// The answer text.
    pub answer: String,
    /// Source of the top retrieved chunk, if any.
    pub retrieved_source: Option<DocumentId>,
    /// The retrieved context, best first.
    #[serde(skip)]
    pub contexts: Vec<ScoredCandidate>,
    /// How the answer came about.
    pub status: AnswerStatus,
    /// Steps that failed and were worked around.
    pub warnings: Vec<String>,
}

impl QueryOutcome {
    /// Whether any step failed along the way.
    pub fn is_degraded(&self) -> bool {
        self.status.is_degraded() || !self.warnings.is_empty()
    }
}

/// The RAG pipeline orchestrator.
///
/// Owns per-session history. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    reranker: Option<Arc<dyn Reranker>>,
    guard: Option<Arc<dyn ContentGuard>>,
    cache: Option<Arc<dyn AnswerCache>>,
    rewriter: QueryRewriter,
    answerer: AnswerGenerator,
    sessions: SessionStore,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Return the per-conversation session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Create (or replace) a named collection sized for the embedding provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the dimension probe or the
    /// vector store operation fails.
    pub async fn recreate_collection(&self, name: &str) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions().await.map_err(|e| {
            error!(collection = name, error = %e, "failed to determine embedding dimensions");
            RagError::PipelineError(format!("failed to probe embedding dimensions: {e}"))
        })?;
        self.vector_store.recreate_collection(name, dimensions).await.map_err(|e| {
            error!(collection = name, error = %e, "failed to create collection");
            RagError::PipelineError(format!("failed to create collection '{name}': {e}"))
        })?;
        info!(collection = name, dimensions, "collection ready");
        Ok(())
    }

    /// Ingest a single document: chunk → embed → store.
    ///
    /// Returns the chunks that were stored (with embeddings attached).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if embedding or storage fails,
    /// including the document ID in the error message.
    pub async fn ingest(&self, collection: &str, document: &Document) -> Result<Vec<Chunk>> {
        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(chunks);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self
            .embedding_provider
            .embed_batch(&texts)
            .await
            .and_then(|embeddings| {
                ensure_batch_len(self.embedding_provider.name(), texts.len(), &embeddings)?;
                Ok(embeddings)
            })
            .map_err(|e| {
                error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
                RagError::PipelineError(format!(
                    "embedding failed for document '{}': {e}",
                    document.id
                ))
            })?;

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        self.vector_store.upsert(collection, &chunks).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "upsert failed during ingestion");
            RagError::PipelineError(format!("upsert failed for document '{}': {e}", document.id))
        })?;

        let chunk_count = chunks.len();
        info!(document.id = %document.id, chunk_count, "ingested document");
        Ok(chunks)
    }

    /// Index `documents` into a freshly recreated collection.
    ///
    /// Documents rejected by the content guard are withheld; documents that
    /// fail to embed or store are skipped. Neither stops the run.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] only if the collection itself
    /// cannot be created.
    pub async fn index(&self, collection: &str, documents: &[Document]) -> Result<IndexReport> {
        self.recreate_collection(collection).await?;

        let mut report = IndexReport::default();
        for document in documents {
            if let Some(guard) = &self.guard {
                if let Verdict::Unsafe { reason } = guard.check(&document.text).await {
                    warn!(
                        document.id = %document.id,
                        guard = guard.name(),
                        reason = %reason,
                        "withholding document"
                    );
                    report.withheld.push((document.id.clone(), reason));
                    continue;
                }
            }
            match self.ingest(collection, document).await {
                Ok(chunks) => {
                    report.documents_indexed += 1;
                    report.chunks_indexed += chunks.len();
                }
                Err(e) => {
                    warn!(document.id = %document.id, error = %e, "skipping document");
                    report.skipped.push((document.id.clone(), e.to_string()));
                }
            }
        }

        info!(
            collection,
            documents = report.documents_indexed,
            chunks = report.chunks_indexed,
            skipped = report.skipped.len(),
            withheld = report.withheld.len(),
            "indexing finished"
        );
        Ok(report)
    }

    /// Retrieve the top-k candidates for `query`.
    ///
    /// Dense mode searches by embedding; hybrid mode also runs a lexical
    /// search and fuses both lists by reciprocal rank. The fused pool is
    /// reranked when a reranker is configured, then cut to `top_k`.
    ///
    /// `similarity_threshold` is a floor on dense cosine similarity and is
    /// applied before fusion, so it never compares against fused ranks.
    ///
    /// An embedding or search failure yields no candidates. A lexical or
    /// rerank failure keeps the dense or first-pass order. Each is recorded
    /// in [`Retrieval::warnings`].
    pub async fn retrieve(&self, collection: &str, query: &str) -> Retrieval {
        let mut warnings = Vec::new();
        let pool = self.config.candidate_pool;

        let query_embedding = match self.embedding_provider.embed_query(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "query embedding failed, continuing without context");
                warnings.push(format!("query embedding failed: {e}"));
                return Retrieval { candidates: Vec::new(), warnings };
            }
        };

        let dense = match self.vector_store.search(collection, &query_embedding, pool).await {
            Ok(results) => results,
            Err(e) => {
                warn!(collection, error = %e, "vector search failed, continuing without context");
                warnings.push(format!("vector search failed: {e}"));
                return Retrieval { candidates: Vec::new(), warnings };
            }
        };
        let threshold = self.config.similarity_threshold;
        let dense: Vec<ScoredCandidate> =
            dense.into_iter().filter(|c| c.similarity_score >= threshold).collect();

        let candidates = match self.config.search_mode {
            SearchMode::Dense => dense,
            SearchMode::Hybrid => {
                match self.vector_store.lexical_search(collection, query, pool).await {
                    Ok(lexical) => reciprocal_rank_fusion(&[dense, lexical], self.config.rrf_k),
                    Err(e) => {
                        warn!(collection, error = %e, "lexical search failed, using dense only");
                        warnings.push(format!("lexical search failed: {e}"));
                        dense
                    }
                }
            }
        };

        let candidates = match &self.reranker {
            Some(reranker) if !candidates.is_empty() => {
                match reranker.rerank(query, candidates.clone()).await {
                    Ok(reranked) => reranked,
                    Err(e) => {
                        warn!(error = %e, "reranking failed, keeping first-pass order");
                        warnings.push(format!("reranking failed: {e}"));
                        sort_by_final_score(candidates)
                    }
                }
            }
            _ => candidates,
        };

        let candidates = select_top_k(candidates, self.config.top_k, f32::NEG_INFINITY);
        info!(result_count = candidates.len(), "retrieval completed");
        Retrieval { candidates, warnings }
    }

    /// Answer `question` as the next turn of conversation `conversation_id`.
    ///
    /// The turn runs `Fresh → AwaitingAnswer → Fresh`; turns of one session
    /// are serialized, turns of different sessions are independent.
    ///
    /// # Errors
    ///
    /// Collaborator failures degrade the outcome instead of failing. An error
    /// is returned only if the session is in an inconsistent state.
    pub async fn ask(
        &self,
        collection: &str,
        conversation_id: &str,
        question: &str,
    ) -> Result<QueryOutcome> {
        let session = self.sessions.get_or_create(conversation_id).await;
        let mut session = session.lock().await;
        session.begin_turn()?;

        let outcome = self.run_turn(collection, question, session.history()).await;

        session.complete_turn(
            ConversationTurn {
                question: outcome.question.clone(),
                search_query: outcome.search_query.clone(),
                answer: outcome.answer.clone(),
                retrieved_source: outcome.retrieved_source.clone(),
            },
            self.config.history_answer_chars,
        );
        info!(
            conversation_id,
            turn = session.turns().len(),
            status = ?outcome.status,
            "turn completed"
        );
        Ok(outcome)
    }

    /// Answer `question` with no conversation history and no session.
    pub async fn ask_standalone(&self, collection: &str, question: &str) -> QueryOutcome {
        self.run_turn(collection, question, &History::empty()).await
    }

    async fn run_turn(&self, collection: &str, question: &str, history: &History) -> QueryOutcome {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(question).await {
                info!(question, "answer cache hit");
                return QueryOutcome {
                    question: question.to_string(),
                    search_query: hit.search_query,
                    answer: hit.answer,
                    retrieved_source: hit.source,
                    contexts: Vec::new(),
                    status: AnswerStatus::Cached,
                    warnings: Vec::new(),
                };
            }
        }

        let rewrite = self.rewriter.rewrite(question, history).await;
        let mut warnings = Vec::new();
        if rewrite.degraded {
            warnings.push("query rewrite failed, searched with the raw question".to_string());
        }

        let retrieval = self.retrieve(collection, &rewrite.search_query).await;
        warnings.extend(retrieval.warnings);

        let answer = self.answerer.generate(question, &retrieval.candidates).await;
        let retrieved_source = retrieval.candidates.first().map(|c| c.chunk.source.clone());

        if answer.status == AnswerStatus::Answered {
            if let Some(cache) = &self.cache {
                cache
                    .put(
                        question,
                        CachedAnswer {
                            answer: answer.text.clone(),
                            search_query: rewrite.search_query.clone(),
                            source: retrieved_source.clone(),
                        },
                    )
                    .await;
            }
        }

        QueryOutcome {
            question: question.to_string(),
            search_query: rewrite.search_query,
            answer: answer.text,
            retrieved_source,
            contexts: retrieval.candidates,
            status: answer.status,
            warnings,
        }
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider`, `vector_store` and `completion_model` are
/// required. The chunker defaults to the one described by the config.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    reranker: Option<Arc<dyn Reranker>>,
    completion_model: Option<Arc<dyn CompletionModel>>,
    guard: Option<Arc<dyn ContentGuard>>,
    cache: Option<Arc<dyn AnswerCache>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Override the chunker built from the config.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set an optional reranker for post-search reordering.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the completion model used for rewriting and answering.
    pub fn completion_model(mut self, model: Arc<dyn CompletionModel>) -> Self {
        self.completion_model = Some(model);
        self
    }

    /// Check documents with `guard` before indexing them.
    pub fn content_guard(mut self, guard: Arc<dyn ContentGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Consult and fill `cache` around each answer.
    pub fn answer_cache(mut self, cache: Arc<dyn AnswerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the [`RagPipeline`], validating the config and required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the config is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let completion_model = self
            .completion_model
            .ok_or_else(|| RagError::ConfigError("completion_model is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => config.chunking.build()?,
        };

        Ok(RagPipeline {
            rewriter: QueryRewriter::new(completion_model.clone(), config.rewrite_temperature),
            answerer: AnswerGenerator::new(completion_model, config.answer_temperature),
            config,
            embedding_provider,
            vector_store,
            chunker,
            reranker: self.reranker,
            guard: self.guard,
            cache: self.cache,
            sessions: SessionStore::new(),
        })
    }
}
