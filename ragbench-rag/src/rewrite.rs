//! Conversational query rewriting.
//!
//! Turns a follow-up question plus the session [`History`] into one
//! self-contained search query. The first turn of a session is passed through
//! unchanged without calling the model.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::completion::{CompletionModel, CompletionRequest};
use crate::error::Result;
use crate::session::History;

const REWRITE_SYSTEM_PROMPT: &str = "You rewrite search queries. Combine the conversation \
history and the latest question into one standalone sentence suitable for a vector database \
search. Output only that sentence, with no explanation.";

/// Characters stripped from both ends of a rewritten query.
const QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’', '「', '」', '『', '』', '`'];

/// Outcome of one rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// The query to retrieve with.
    pub search_query: String,
    /// Whether the completion model produced `search_query`.
    pub rewritten: bool,
    /// Whether the model call failed and the raw question was used instead.
    pub degraded: bool,
}

/// Rewrites follow-up questions into standalone search queries.
pub struct QueryRewriter {
    model: Arc<dyn CompletionModel>,
    temperature: f32,
}

impl QueryRewriter {
    /// Create a rewriter backed by `model`.
    pub fn new(model: Arc<dyn CompletionModel>, temperature: f32) -> Self {
        Self { model, temperature }
    }

    /// Rewrite `question` in the context of `history`.
    ///
    /// Empty history returns the question verbatim. A failed or empty model
    /// response also falls back to the question, flagged as degraded.
    pub async fn rewrite(&self, question: &str, history: &History) -> Rewrite {
        let verbatim = |degraded| Rewrite {
            search_query: question.to_string(),
            rewritten: false,
            degraded,
        };
        if history.is_empty() {
            return verbatim(false);
        }
        match self.try_rewrite(question, history).await {
            Ok(Some(search_query)) => {
                debug!(question, search_query = %search_query, "rewrote follow-up question");
                Rewrite { search_query, rewritten: true, degraded: false }
            }
            Ok(None) => {
                warn!(question, "rewrite returned nothing usable, searching with the raw question");
                verbatim(true)
            }
            Err(e) => {
                warn!(question, error = %e, "query rewrite failed, using the raw question");
                verbatim(true)
            }
        }
    }

    /// One model call; `Ok(None)` when the response has no usable first line.
    pub async fn try_rewrite(&self, question: &str, history: &History) -> Result<Option<String>> {
        let request = CompletionRequest::with_system(
            REWRITE_SYSTEM_PROMPT,
            format!("History: {history}\nLatest question: {question}"),
            self.temperature,
        );
        let raw = self.model.complete(request).await?;
        Ok(clean_rewrite(&raw))
    }
}

/// Keep only the first non-empty line of `raw`, without surrounding quotes.
pub fn clean_rewrite(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let cleaned = line.trim_matches(QUOTES).trim();
    if cleaned.is_empty() { None } else { Some(cleaned.to_string()) }
}
