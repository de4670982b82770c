//! Answer generation from retrieved context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::completion::{CompletionModel, CompletionRequest};
use crate::document::ScoredCandidate;

/// Returned instead of calling the model when retrieval found nothing.
pub const NO_CONTEXT_ANSWER: &str = "No relevant reference material was found for this question.";

const ANSWER_SYSTEM_PROMPT: &str = "You are a professional assistant. Answer the question \
briefly using the reference material. If the material does not mention it, say you don't know.";

/// How an answer came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Generated from retrieved context.
    Answered,
    /// Served from the answer cache.
    Cached,
    /// Retrieval returned nothing; the answer is [`NO_CONTEXT_ANSWER`].
    NoContext,
    /// The completion call failed; the answer is empty.
    GenerationFailed,
}

impl AnswerStatus {
    /// Whether this status reflects a failed or missing step.
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::NoContext | Self::GenerationFailed)
    }
}

/// An answer and its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAnswer {
    /// Answer text; empty when generation failed.
    pub text: String,
    /// How the answer came about.
    pub status: AnswerStatus,
}

/// Composes the answer prompt and calls the completion model.
pub struct AnswerGenerator {
    model: Arc<dyn CompletionModel>,
    temperature: f32,
}

impl AnswerGenerator {
    /// Create a generator backed by `model`.
    pub fn new(model: Arc<dyn CompletionModel>, temperature: f32) -> Self {
        Self { model, temperature }
    }

    /// The request sent for `question` over `contexts`, best context first.
    pub fn compose(&self, question: &str, contexts: &[ScoredCandidate]) -> CompletionRequest {
        let context = contexts.iter().map(|c| c.chunk.text.as_str()).collect::<Vec<_>>().join("\n");
        CompletionRequest::with_system(
            ANSWER_SYSTEM_PROMPT,
            format!("Reference material:\n{context}\n\nQuestion: {question}"),
            self.temperature,
        )
    }

    /// Answer `question` from `contexts`.
    ///
    /// Empty `contexts` yields [`AnswerStatus::NoContext`] without a model
    /// call. A failed or blank completion yields
    /// [`AnswerStatus::GenerationFailed`] with empty text.
    pub async fn generate(&self, question: &str, contexts: &[ScoredCandidate]) -> GeneratedAnswer {
        if contexts.is_empty() {
            return GeneratedAnswer {
                text: NO_CONTEXT_ANSWER.to_string(),
                status: AnswerStatus::NoContext,
            };
        }
        match self.model.complete(self.compose(question, contexts)).await {
            Ok(text) if !text.trim().is_empty() => {
                GeneratedAnswer { text: text.trim().to_string(), status: AnswerStatus::Answered }
            }
            Ok(_) => {
                warn!(model = self.model.name(), "completion returned an empty answer");
                GeneratedAnswer { text: String::new(), status: AnswerStatus::GenerationFailed }
            }
            Err(e) => {
                warn!(model = self.model.name(), error = %e, "answer generation failed");
                GeneratedAnswer { text: String::new(), status: AnswerStatus::GenerationFailed }
            }
        }
    }
}
