//! # ragbench-rag
//!
//! Retrieval core for ragbench: the pieces of a retrieval-augmented
//! question answering pipeline, each behind a trait so backends can be
//! swapped and the whole thing can be tested offline.
//!
//! ## Overview
//!
//! - Chunking: [`FixedSizeChunker`], [`SlidingWindowChunker`],
//!   [`SentenceChunker`], [`ParagraphChunker`], [`RecursiveChunker`], built
//!   from config through [`ChunkStrategy`]
//! - Storage: the [`VectorStore`] trait with [`InMemoryVectorStore`] and, with
//!   the `qdrant` feature, [`qdrant::QdrantVectorStore`]
//! - Ranking: dense search, BM25 or sparse lexical search fused with
//!   [`reciprocal_rank_fusion`], then an optional [`Reranker`]
//! - Conversation: [`QueryRewriter`] turns follow-up questions into
//!   standalone search queries using the [`Session`] history
//! - Orchestration: [`RagPipeline`] indexes documents and answers questions,
//!   degrading instead of failing when a collaborator is down
//!
//! Extras: an [`AnswerCache`], [`ContentGuard`]s for indexed documents, a
//! web [`ResearchAgent`], concurrent [`FanOut`] generation and an
//! [`LlmJudge`] for evaluation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragbench_rag::{InMemoryVectorStore, RagConfig, RagPipeline};
//! use ragbench_rag::testing::{HashEmbedder, ScriptedCompletionModel};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashEmbedder::new(64)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .completion_model(Arc::new(ScriptedCompletionModel::new(["..."])))
//!     .build()?;
//!
//! pipeline.recreate_collection("docs").await?;
//! pipeline.index("docs", &documents).await?;
//! let outcome = pipeline.ask("docs", "conversation-1", "What is RAG?").await?;
//! ```
//!
//! ## Features
//!
//! - `http`: HTTP clients for the embedding, similarity, chat and search
//!   services
//! - `qdrant`: the Qdrant vector store
//! - `full`: both
//! - `testing`: the offline collaborator doubles of the `testing` module

pub mod answer;
pub mod cache;
pub mod chunking;
pub mod completion;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod fanout;
pub mod guard;
pub mod inmemory;
pub mod lexical;
pub mod pipeline;
pub mod reranker;
pub mod research;
pub mod retry;
pub mod rewrite;
pub mod scoring;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod vectorstore;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use answer::{AnswerGenerator, AnswerStatus, GeneratedAnswer, NO_CONTEXT_ANSWER};
pub use cache::{
    AnswerCache, CachedAnswer, EvictionPolicy, InMemoryAnswerCache, MaxEntries, Unbounded,
};
pub use chunking::{
    ChunkStrategy, Chunker, FixedSizeChunker, ParagraphChunker, RecursiveChunker,
    SentenceChunker, SlidingWindowChunker,
};
pub use completion::{ChatMessage, CompletionModel, CompletionRequest, CompletionStream, Role};
pub use config::{RagConfig, RagConfigBuilder, SearchMode, ServiceConfig};
pub use document::{
    Chunk, Document, DocumentId, LoadReport, ScoredCandidate, discover_text_files, load_document,
    load_documents,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use evaluation::{Judgement, LlmJudge, MetricScores};
pub use fanout::{FanOut, FanOutEvent, FanOutResult};
pub use guard::{ContentGuard, InjectionPatternGuard, LlmContentGuard, Verdict};
pub use inmemory::{InMemoryVectorStore, cosine_similarity};
pub use lexical::{LexicalIndex, sparse_vector, tokenize};
pub use pipeline::{IndexReport, QueryOutcome, RagPipeline, RagPipelineBuilder, Retrieval};
pub use reranker::{NoOpReranker, Reranker, ScorerReranker};
pub use research::{ResearchAgent, ResearchOutcome, ResearchState, SearchHit, WebSearch};
pub use retry::{Backoff, RetryPolicy};
pub use rewrite::{QueryRewriter, Rewrite};
pub use scoring::{
    OverlapFormula, OverlapScorer, RelevanceScorer, best_match, reciprocal_rank_fusion,
    select_top_k,
};
pub use session::{ConversationTurn, History, Session, SessionState, SessionStore};
pub use vectorstore::VectorStore;
