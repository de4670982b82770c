//! Deterministic stand-ins for the external collaborators.
//!
//! Used by this crate's tests and by downstream crates that want to exercise
//! the pipeline offline.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::completion::{CompletionModel, CompletionRequest};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::lexical::{fnv1a, tokenize};

type Responder = Arc<dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<String>>),
    Function(Responder),
    Fail,
}

/// A completion model that replays canned responses and records requests.
pub struct ScriptedCompletionModel {
    script: Script,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletionModel {
    /// Answer successive calls with `responses`; fails once they run out.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = responses.into_iter().map(Into::into).collect();
        Self { script: Script::Queue(Mutex::new(queue)), calls: Mutex::new(Vec::new()) }
    }

    /// Compute each response from its request.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self { script: Script::Function(Arc::new(responder)), calls: Mutex::new(Vec::new()) }
    }

    /// Fail every call with a transport error.
    pub fn failing() -> Self {
        Self { script: Script::Fail, calls: Mutex::new(Vec::new()) }
    }

    /// Requests received so far.
    pub async fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedCompletionModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.calls.lock().await.push(request.clone());
        match &self.script {
            Script::Queue(queue) => queue.lock().await.pop_front().ok_or_else(|| {
                RagError::CompletionError {
                    provider: "scripted".to_string(),
                    message: "no scripted responses left".to_string(),
                }
            }),
            Script::Function(responder) => responder(&request),
            Script::Fail => Err(RagError::Transport {
                service: "scripted".to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// Bag-of-words embedder: each token is hashed into one of `dimensions`
/// buckets and the result is L2-normalized.
///
/// Texts sharing words get similar vectors, which is enough to make
/// retrieval tests meaningful without a model.
pub struct HashEmbedder {
    dimensions: usize,
    failing: AtomicBool,
}

impl HashEmbedder {
    /// Create an embedder producing vectors of `dimensions` entries.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1), failing: AtomicBool::new(false) }
    }

    /// Make subsequent calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            v[fnv1a(&token) as usize % self.dimensions] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingError {
                provider: "hash".to_string(),
                message: "embedding service unavailable".to_string(),
            });
        }
        Ok(self.vector(text))
    }

    async fn dimensions(&self) -> Result<usize> {
        Ok(self.dimensions)
    }
}
