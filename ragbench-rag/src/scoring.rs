//! Relevance scoring and the merge/selection policy around raw scores.
//!
//! Raw scores come from a dense store, a lexical index, a pairwise scoring
//! service or the character-overlap baseline here. This module fuses them by
//! rank, orders and truncates them. It never decides what a good score is.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, ScoredCandidate};
use crate::error::Result;

/// Scores each candidate text against a query.
///
/// Returns one score per candidate, in input order. Inputs are not modified.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Scorer name used in logs and errors.
    fn name(&self) -> &str;

    /// Score `candidates` against `query`.
    async fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>>;
}

#[async_trait]
impl<T: RelevanceScorer + ?Sized> RelevanceScorer for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        (**self).score(query, candidates).await
    }
}

/// Character-set overlap formula for the baseline scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapFormula {
    /// `|query ∩ candidate| / |query|`: how much of the query is covered.
    #[default]
    QueryCoverage,
    /// `|query ∩ candidate| / |query ∪ candidate|`.
    Jaccard,
}

impl OverlapFormula {
    /// Score `candidate` against `query` on their sets of characters.
    ///
    /// Returns 0.0 when the denominator would be empty.
    pub fn score(self, query: &str, candidate: &str) -> f32 {
        let q: HashSet<char> = query.chars().collect();
        let c: HashSet<char> = candidate.chars().collect();
        let shared = q.intersection(&c).count() as f32;
        let denominator = match self {
            Self::QueryCoverage => q.len(),
            Self::Jaccard => q.union(&c).count(),
        };
        if denominator == 0 { 0.0 } else { shared / denominator as f32 }
    }
}

/// Zero-dependency baseline scorer using [`OverlapFormula`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlapScorer {
    formula: OverlapFormula,
}

impl OverlapScorer {
    /// Create a scorer with the given formula.
    pub fn new(formula: OverlapFormula) -> Self {
        Self { formula }
    }
}

#[async_trait]
impl RelevanceScorer for OverlapScorer {
    fn name(&self) -> &str {
        match self.formula {
            OverlapFormula::QueryCoverage => "overlap-coverage",
            OverlapFormula::Jaccard => "overlap-jaccard",
        }
    }

    async fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        Ok(candidates.iter().map(|c| self.formula.score(query, c)).collect())
    }
}

/// Fuse ranked lists by reciprocal rank.
///
/// Each list is assumed best-first. A chunk at 1-based position `r` in a list
/// contributes `1 / (k + r)`; contributions are summed per chunk id across
/// lists. The result is ordered by fused score, ties keeping the order in
/// which chunks were first seen (walking the lists in order). The fused score
/// replaces `similarity_score`; any `rerank_score` is dropped.
pub fn reciprocal_rank_fusion(lists: &[Vec<ScoredCandidate>], k: f32) -> Vec<ScoredCandidate> {
    let mut order: Vec<Chunk> = Vec::new();
    let mut fused: HashMap<String, (usize, f32)> = HashMap::new();

    for list in lists {
        for (position, candidate) in list.iter().enumerate() {
            let contribution = 1.0 / (k + (position + 1) as f32);
            match fused.get_mut(&candidate.chunk.id) {
                Some((_, score)) => *score += contribution,
                None => {
                    fused.insert(candidate.chunk.id.clone(), (order.len(), contribution));
                    order.push(candidate.chunk.clone());
                }
            }
        }
    }

    let mut merged: Vec<(usize, ScoredCandidate)> = order
        .into_iter()
        .map(|chunk| {
            let (first_seen, score) = fused[&chunk.id];
            (first_seen, ScoredCandidate::new(chunk, score))
        })
        .collect();
    merged.sort_by_key(|(first_seen, _)| *first_seen);
    sort_by_final_score(merged.into_iter().map(|(_, c)| c).collect())
}

/// Stable sort, best first, by [`ScoredCandidate::final_score`].
pub fn sort_by_final_score(mut candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    candidates.sort_by(|a, b| {
        b.final_score().partial_cmp(&a.final_score()).unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

/// Order by final score, drop anything below `threshold`, keep `top_k`.
pub fn select_top_k(
    candidates: Vec<ScoredCandidate>,
    top_k: usize,
    threshold: f32,
) -> Vec<ScoredCandidate> {
    let mut selected: Vec<ScoredCandidate> = sort_by_final_score(candidates)
        .into_iter()
        .filter(|c| c.final_score() >= threshold)
        .collect();
    selected.truncate(top_k);
    selected
}

/// Pick the best-scoring chunk under `formula`.
///
/// Chunks with empty text are skipped; on ties the earliest chunk wins.
/// Returns the winner's index and score, or `None` if every chunk is empty.
pub fn best_match(query: &str, chunks: &[Chunk], formula: OverlapFormula) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.text.is_empty() {
            continue;
        }
        let score = formula.score(query, &chunk.text);
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((i, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn candidate(id: &str, score: f32) -> ScoredCandidate {
        let doc = Document::new(id, id);
        ScoredCandidate::new(Chunk::from_document(&doc, 0, id.to_string()), score)
    }

    fn ids(candidates: &[ScoredCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.chunk.source.as_str()).collect()
    }

    #[test]
    fn coverage_and_jaccard_differ() {
        let coverage = OverlapFormula::QueryCoverage.score("ab", "abcd");
        let jaccard = OverlapFormula::Jaccard.score("ab", "abcd");
        assert!((coverage - 1.0).abs() < f32::EPSILON);
        assert!((jaccard - 0.5).abs() < f32::EPSILON);
        assert_eq!(OverlapFormula::QueryCoverage.score("", "abc"), 0.0);
        assert_eq!(OverlapFormula::Jaccard.score("", ""), 0.0);
    }

    #[tokio::test]
    async fn overlap_scorer_returns_one_score_per_candidate_in_order() {
        let scorer = OverlapScorer::default();
        let scores = scorer.score("cat", &["dog", "cat", "act", ""]).await.unwrap();
        assert_eq!(scores.len(), 4);
        assert_eq!(scores[0], 0.0);
        assert!((scores[1] - 1.0).abs() < f32::EPSILON);
        assert!((scores[2] - 1.0).abs() < f32::EPSILON);
        assert_eq!(scores[3], 0.0);
    }

    #[test]
    fn rrf_rewards_agreement_between_signals() {
        let dense = vec![candidate("a", 0.9), candidate("b", 0.8), candidate("c", 0.7)];
        let lexical = vec![candidate("c", 12.0), candidate("b", 9.0)];
        let fused = reciprocal_rank_fusion(&[dense, lexical], 60.0);
        // b: 1/62 + 1/62, c: 1/63 + 1/61, a: 1/61
        assert_eq!(ids(&fused), vec!["c", "b", "a"]);
        let expected_a = 1.0 / 61.0;
        assert!((fused[2].similarity_score - expected_a).abs() < 1e-6);
    }

    #[test]
    fn rrf_ties_keep_first_seen_order() {
        let one = vec![candidate("x", 1.0)];
        let two = vec![candidate("y", 1.0)];
        let fused = reciprocal_rank_fusion(&[one, two], 60.0);
        assert_eq!(ids(&fused), vec!["x", "y"]);
    }

    #[test]
    fn rrf_of_nothing_is_empty() {
        assert!(reciprocal_rank_fusion(&[], 60.0).is_empty());
        assert!(reciprocal_rank_fusion(&[Vec::new(), Vec::new()], 60.0).is_empty());
    }

    #[test]
    fn select_top_k_orders_filters_and_truncates() {
        let mut reranked = candidate("r", 0.1);
        reranked.rerank_score = Some(0.95);
        let pool = vec![candidate("a", 0.5), candidate("b", 0.05), reranked, candidate("c", 0.7)];
        let top = select_top_k(pool, 2, 0.1);
        assert_eq!(ids(&top), vec!["r", "c"]);

        let pool = vec![candidate("a", 0.5), candidate("b", 0.05)];
        assert_eq!(ids(&select_top_k(pool, 5, 0.1)), vec!["a"]);
    }

    #[test]
    fn best_match_first_wins_on_ties_and_skips_empty() {
        let doc = Document::new("d", "");
        let chunks = vec![
            Chunk::from_document(&doc, 0, String::new()),
            Chunk::from_document(&doc, 1, "xyz".into()),
            Chunk::from_document(&doc, 2, "abc".into()),
            Chunk::from_document(&doc, 3, "cab".into()),
        ];
        assert_eq!(best_match("ab", &chunks, OverlapFormula::QueryCoverage), Some((2, 1.0)));
        assert_eq!(best_match("q", &chunks, OverlapFormula::QueryCoverage), Some((1, 0.0)));
        assert_eq!(best_match("ab", &chunks[..1], OverlapFormula::Jaccard), None);
    }
}
