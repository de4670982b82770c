//! Question → answer cache injected into the orchestrator.
//!
//! Keys are the verbatim question text. The eviction policy is pluggable;
//! [`Unbounded`] never evicts.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::document::DocumentId;

/// A cached answer and what produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnswer {
    /// The generated answer.
    pub answer: String,
    /// The query that was used for retrieval.
    pub search_query: String,
    /// Source of the top retrieved chunk, if any.
    pub source: Option<DocumentId>,
}

/// Storage for previously generated answers.
#[async_trait]
pub trait AnswerCache: Send + Sync {
    /// Look up the answer for exactly this question.
    async fn get(&self, question: &str) -> Option<CachedAnswer>;

    /// Store an answer for this question.
    async fn put(&self, question: &str, answer: CachedAnswer);

    /// Number of cached entries.
    async fn len(&self) -> usize;
}

/// Decides how many entries an [`InMemoryAnswerCache`] may hold.
pub trait EvictionPolicy: Send + Sync {
    /// Maximum number of entries, or `None` for no limit.
    fn capacity(&self) -> Option<usize>;
}

/// Never evict.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn capacity(&self) -> Option<usize> {
        None
    }
}

/// Keep at most `n` entries, evicting the oldest insertion first.
#[derive(Debug, Clone, Copy)]
pub struct MaxEntries(pub usize);

impl EvictionPolicy for MaxEntries {
    fn capacity(&self) -> Option<usize> {
        Some(self.0)
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, CachedAnswer>,
    order: VecDeque<String>,
}

/// A process-local [`AnswerCache`].
#[derive(Debug, Default)]
pub struct InMemoryAnswerCache<P = Unbounded> {
    policy: P,
    entries: Mutex<Entries>,
}

impl InMemoryAnswerCache<Unbounded> {
    /// A cache that never evicts.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: EvictionPolicy> InMemoryAnswerCache<P> {
    /// A cache governed by `policy`.
    pub fn with_policy(policy: P) -> Self {
        Self { policy, entries: Mutex::new(Entries::default()) }
    }
}

#[async_trait]
impl<P: EvictionPolicy> AnswerCache for InMemoryAnswerCache<P> {
    async fn get(&self, question: &str) -> Option<CachedAnswer> {
        self.entries.lock().await.map.get(question).cloned()
    }

    async fn put(&self, question: &str, answer: CachedAnswer) {
        let capacity = self.policy.capacity();
        if capacity == Some(0) {
            return;
        }
        let mut entries = self.entries.lock().await;
        if entries.map.insert(question.to_string(), answer).is_none() {
            entries.order.push_back(question.to_string());
        }
        if let Some(capacity) = capacity {
            while entries.map.len() > capacity {
                let Some(oldest) = entries.order.pop_front() else { break };
                entries.map.remove(&oldest);
                debug!(question = %oldest, "evicted cached answer");
            }
        }
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: &str) -> CachedAnswer {
        CachedAnswer { answer: text.into(), search_query: text.into(), source: None }
    }

    #[tokio::test]
    async fn unbounded_keeps_everything_keyed_verbatim() {
        let cache = InMemoryAnswerCache::new();
        cache.put("What is RAG?", answer("a")).await;
        cache.put("what is rag?", answer("b")).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("What is RAG?").await.unwrap().answer, "a");
        assert!(cache.get("What is RAG").await.is_none());
    }

    #[tokio::test]
    async fn max_entries_evicts_oldest_first() {
        let cache = InMemoryAnswerCache::with_policy(MaxEntries(2));
        cache.put("q1", answer("1")).await;
        cache.put("q2", answer("2")).await;
        cache.put("q1", answer("1b")).await;
        cache.put("q3", answer("3")).await;
        assert_eq!(cache.len().await, 2);
        assert!(cache.get("q1").await.is_none());
        assert_eq!(cache.get("q2").await.unwrap().answer, "2");
        assert_eq!(cache.get("q3").await.unwrap().answer, "3");
    }

    #[tokio::test]
    async fn zero_capacity_stores_nothing() {
        let cache = InMemoryAnswerCache::with_policy(MaxEntries(0));
        cache.put("q", answer("a")).await;
        assert_eq!(cache.len().await, 0);
    }
}
