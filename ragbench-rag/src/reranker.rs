//! Reranker trait for re-scoring retrieved candidates.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::document::ScoredCandidate;
use crate::error::{RagError, Result};
use crate::scoring::{RelevanceScorer, sort_by_final_score};

/// A reranker that re-scores and reorders retrieved candidates.
///
/// Implementations can use cross-encoder models, pairwise similarity
/// services, or other strategies to improve precision beyond first-pass
/// retrieval.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank candidates given the search query.
    ///
    /// Returns candidates best first with `rerank_score` populated.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredCandidate>,
    ) -> Result<Vec<ScoredCandidate>>;
}

/// A no-op reranker that returns candidates unchanged.
///
/// Useful as a default when no reranking is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: Vec<ScoredCandidate>,
    ) -> Result<Vec<ScoredCandidate>> {
        Ok(candidates)
    }
}

/// Reranks with any [`RelevanceScorer`], scoring candidates in batches.
///
/// Scores are clamped to `[0, 1]` before being stored as `rerank_score`.
/// Small batches keep memory bounded for local cross-encoders.
pub struct ScorerReranker {
    scorer: Arc<dyn RelevanceScorer>,
    batch_size: usize,
}

impl ScorerReranker {
    /// Rerank with `scorer`, sending all candidates in one call.
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer, batch_size: usize::MAX }
    }

    /// Score at most `batch_size` candidates per call (minimum 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl Reranker for ScorerReranker {
    async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<ScoredCandidate>,
    ) -> Result<Vec<ScoredCandidate>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut scores = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.chunk.text.as_str()).collect();
            let batch_scores = self.scorer.score(query, &texts).await?;
            if batch_scores.len() != texts.len() {
                return Err(RagError::RerankerError {
                    reranker: self.scorer.name().to_string(),
                    message: format!(
                        "expected {} scores, got {}",
                        texts.len(),
                        batch_scores.len()
                    ),
                });
            }
            scores.extend(batch_scores);
        }

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.rerank_score = Some(if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) });
        }
        debug!(reranker = self.scorer.name(), count = candidates.len(), "reranked candidates");
        Ok(sort_by_final_score(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, Document};
    use crate::scoring::OverlapScorer;

    fn candidate(text: &str, similarity: f32) -> ScoredCandidate {
        let doc = Document::new(text, text);
        ScoredCandidate::new(Chunk::from_document(&doc, 0, text.to_string()), similarity)
    }

    struct FixedScores(Vec<f32>);

    #[async_trait]
    impl RelevanceScorer for FixedScores {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn score(&self, _query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
            Ok(self.0.iter().copied().take(candidates.len()).collect())
        }
    }

    #[tokio::test]
    async fn noop_preserves_order() {
        let input = vec![candidate("a", 0.1), candidate("b", 0.9)];
        let out = NoOpReranker.rerank("q", input).await.unwrap();
        assert_eq!(out[0].chunk.text, "a");
        assert!(out.iter().all(|c| c.rerank_score.is_none()));
    }

    #[tokio::test]
    async fn scorer_reranker_reorders_by_rerank_score() {
        let reranker = ScorerReranker::new(Arc::new(OverlapScorer::default())).with_batch_size(1);
        let input = vec![candidate("xyz", 0.9), candidate("cat", 0.1)];
        let out = reranker.rerank("cat", input).await.unwrap();
        assert_eq!(out[0].chunk.text, "cat");
        assert_eq!(out[0].rerank_score, Some(1.0));
        assert_eq!(out[1].rerank_score, Some(0.0));
    }

    #[tokio::test]
    async fn scores_are_clamped() {
        let reranker = ScorerReranker::new(Arc::new(FixedScores(vec![3.5, -2.0])));
        let pool = vec![candidate("a", 0.0), candidate("b", 0.0)];
        let out = reranker.rerank("q", pool).await.unwrap();
        assert_eq!(out[0].rerank_score, Some(1.0));
        assert_eq!(out[1].rerank_score, Some(0.0));
    }

    #[tokio::test]
    async fn short_score_list_is_an_error() {
        let reranker = ScorerReranker::new(Arc::new(FixedScores(vec![0.5])));
        let err = reranker.rerank("q", vec![candidate("a", 0.0), candidate("b", 0.0)]).await;
        assert!(matches!(err, Err(RagError::RerankerError { .. })));
    }
}
