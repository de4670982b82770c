//! Configuration for the retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::chunking::ChunkStrategy;
use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// How candidates are fetched from the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Nearest neighbours by embedding only.
    #[default]
    Dense,
    /// Dense and lexical result lists merged by reciprocal rank fusion.
    Hybrid,
}

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// How documents are split before embedding.
    pub chunking: ChunkStrategy,
    /// Number of chunks handed to the answer step.
    pub top_k: usize,
    /// Number of candidates fetched from the store before reranking.
    pub candidate_pool: usize,
    /// Dense-only or hybrid retrieval.
    pub search_mode: SearchMode,
    /// The `k` constant of reciprocal rank fusion.
    pub rrf_k: f32,
    /// Minimum dense similarity for first-pass candidates, applied before
    /// fusion and reranking.
    pub similarity_threshold: f32,
    /// Characters of the previous answer kept in the rolling history digest.
    pub history_answer_chars: usize,
    /// Sampling temperature for the answer step.
    pub answer_temperature: f32,
    /// Sampling temperature for query rewriting.
    pub rewrite_temperature: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkStrategy::default(),
            top_k: 3,
            candidate_pool: 15,
            search_mode: SearchMode::Dense,
            rrf_k: 60.0,
            similarity_threshold: 0.0,
            history_answer_chars: 15,
            answer_temperature: 0.1,
            rewrite_temperature: 0.1,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - the chunking strategy has a zero size or an overlap not below its size
    /// - `top_k == 0`
    /// - `candidate_pool < top_k`
    /// - `rrf_k` is not a positive finite number
    /// - a temperature is negative or not finite
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.candidate_pool < self.top_k {
            return Err(RagError::ConfigError(format!(
                "candidate_pool ({}) must be at least top_k ({})",
                self.candidate_pool, self.top_k
            )));
        }
        if !(self.rrf_k.is_finite() && self.rrf_k > 0.0) {
            return Err(RagError::ConfigError(format!(
                "rrf_k must be a positive number, got {}",
                self.rrf_k
            )));
        }
        for (name, value) in [
            ("answer_temperature", self.answer_temperature),
            ("rewrite_temperature", self.rewrite_temperature),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(RagError::ConfigError(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the chunking strategy.
    pub fn chunking(mut self, strategy: ChunkStrategy) -> Self {
        self.config.chunking = strategy;
        self
    }

    /// Set the number of chunks passed to the answer step.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the number of candidates fetched before reranking.
    pub fn candidate_pool(mut self, n: usize) -> Self {
        self.config.candidate_pool = n;
        self
    }

    /// Set dense-only or hybrid retrieval.
    pub fn search_mode(mut self, mode: SearchMode) -> Self {
        self.config.search_mode = mode;
        self
    }

    /// Set the reciprocal rank fusion constant.
    pub fn rrf_k(mut self, k: f32) -> Self {
        self.config.rrf_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set how many answer characters the history digest keeps.
    pub fn history_answer_chars(mut self, chars: usize) -> Self {
        self.config.history_answer_chars = chars;
        self
    }

    /// Set the answer-step temperature.
    pub fn answer_temperature(mut self, temperature: f32) -> Self {
        self.config.answer_temperature = temperature;
        self
    }

    /// Set the rewrite-step temperature.
    pub fn rewrite_temperature(mut self, temperature: f32) -> Self {
        self.config.rewrite_temperature = temperature;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Endpoints and credentials for the external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Batch embedding endpoint (`{texts, task_description, normalize}`).
    pub embed_url: String,
    /// Pairwise similarity endpoint used for reranking, if any.
    pub similarity_url: Option<String>,
    /// OpenAI-compatible chat completions endpoint.
    pub chat_url: String,
    /// Model name sent with every chat request.
    pub chat_model: String,
    /// Bearer token for the chat endpoint, if it needs one.
    pub api_key: Option<String>,
    /// Task description sent when embedding documents.
    pub document_task: String,
    /// Task description sent when embedding queries.
    pub query_task: String,
    /// Ask the embedding service for unit-length vectors.
    pub normalize: bool,
    /// SearXNG JSON search endpoint for the research loop.
    pub search_url: Option<String>,
    /// Qdrant gRPC endpoint; the in-memory store is used when unset.
    pub qdrant_url: Option<String>,
    /// Retry and timeout policy shared by every call.
    pub retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            embed_url: "http://localhost:8080/embed".to_string(),
            similarity_url: None,
            chat_url: "http://localhost:8000/v1/chat/completions".to_string(),
            chat_model: "google/gemma-3-27b-it".to_string(),
            api_key: None,
            document_task: "Retrieve documents".to_string(),
            query_task: "Query".to_string(),
            normalize: true,
            search_url: None,
            qdrant_url: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl ServiceConfig {
    /// Check that endpoints are present and the retry policy makes progress.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an empty endpoint or model name,
    /// or a retry policy with zero attempts or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("embed_url", self.embed_url.as_str()),
            ("chat_url", self.chat_url.as_str()),
            ("chat_model", self.chat_model.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(RagError::ConfigError(format!("{name} must not be empty")));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(RagError::ConfigError("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.timeout_secs == 0 {
            return Err(RagError::ConfigError("retry.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_with_custom_values() {
        let config = RagConfig::builder()
            .chunking(ChunkStrategy::SlidingWindow { size: 256, overlap: 50 })
            .top_k(5)
            .candidate_pool(20)
            .search_mode(SearchMode::Hybrid)
            .similarity_threshold(0.5)
            .build()
            .expect("valid config should build");

        assert_eq!(config.chunking, ChunkStrategy::SlidingWindow { size: 256, overlap: 50 });
        assert_eq!(config.top_k, 5);
        assert_eq!(config.candidate_pool, 20);
        assert_eq!(config.search_mode, SearchMode::Hybrid);
        assert!((config.similarity_threshold - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn default_config_is_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, 3);
        assert_eq!(config.candidate_pool, 15);
        assert_eq!(config.history_answer_chars, 15);
        assert!((config.rrf_k - 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_overlap_not_below_size() {
        let result = RagConfig::builder()
            .chunking(ChunkStrategy::SlidingWindow { size: 100, overlap: 100 })
            .build();
        assert!(matches!(result, Err(RagError::ConfigError(_))));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let result = RagConfig::builder().chunking(ChunkStrategy::FixedSize { size: 0 }).build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_top_k_and_small_pool() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().top_k(10).candidate_pool(5).build().is_err());
    }

    #[test]
    fn rejects_non_positive_rrf_k() {
        assert!(RagConfig::builder().rrf_k(0.0).build().is_err());
        assert!(RagConfig::builder().rrf_k(f32::NAN).build().is_err());
    }

    #[test]
    fn service_config_validation() {
        assert!(ServiceConfig::default().validate().is_ok());
        let empty_model = ServiceConfig { chat_model: " ".into(), ..ServiceConfig::default() };
        assert!(empty_model.validate().is_err());
        let mut no_attempts = ServiceConfig::default();
        no_attempts.retry.max_attempts = 0;
        assert!(no_attempts.validate().is_err());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"top_k": 4, "search_mode": "hybrid"}"#).unwrap();
        assert_eq!(config.top_k, 4);
        assert_eq!(config.search_mode, SearchMode::Hybrid);
        assert_eq!(config.candidate_pool, 15);
    }
}
