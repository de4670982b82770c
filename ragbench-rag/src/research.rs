//! Iterative web research as an explicit state machine.
//!
//! ```text
//! CheckCache ──hit──▶ Done
//!     │miss
//!     ▼
//!   Plan ──sufficient or loop budget spent──▶ Answer ──▶ Done
//!     │insufficient
//!     ▼
//! GenerateQuery ──▶ Search ──▶ Plan
//! ```
//!
//! Every pass through `GenerateQuery` consumes one loop; once `max_loops`
//! are spent `Plan` always moves to `Answer`, so a run takes at most
//! `3 * max_loops + 3` transitions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{AnswerCache, CachedAnswer};
use crate::completion::{CompletionModel, CompletionRequest};
use crate::error::Result;

/// Default number of search rounds before answering regardless.
pub const DEFAULT_MAX_LOOPS: usize = 3;

/// One web search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result URL.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Search-engine snippet.
    pub snippet: String,
}

/// A web search collaborator.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Return at most `limit` results for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// States of a research run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchState {
    /// Look the question up in the answer cache.
    CheckCache,
    /// Decide whether the gathered knowledge suffices.
    Plan,
    /// Produce the next search query.
    GenerateQuery,
    /// Run the search and append what it found.
    Search,
    /// Write the final answer.
    Answer,
    /// Finished.
    Done,
}

/// Result of a research run.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    /// The question researched.
    pub question: String,
    /// The final answer; empty if the answer step failed.
    pub answer: String,
    /// Whether the answer came from the cache.
    pub from_cache: bool,
    /// Search queries issued, in order.
    pub queries: Vec<String>,
    /// Knowledge gathered from the searches.
    pub knowledge: String,
    /// States visited, in order.
    pub trace: Vec<ResearchState>,
}

/// Researches a question with web searches until it can answer.
pub struct ResearchAgent {
    model: Arc<dyn CompletionModel>,
    search: Arc<dyn WebSearch>,
    cache: Arc<dyn AnswerCache>,
    max_loops: usize,
    results_per_search: usize,
}

impl ResearchAgent {
    /// Create an agent with [`DEFAULT_MAX_LOOPS`] and one result per search.
    pub fn new(
        model: Arc<dyn CompletionModel>,
        search: Arc<dyn WebSearch>,
        cache: Arc<dyn AnswerCache>,
    ) -> Self {
        Self { model, search, cache, max_loops: DEFAULT_MAX_LOOPS, results_per_search: 1 }
    }

    /// Set the maximum number of search rounds.
    pub fn with_max_loops(mut self, max_loops: usize) -> Self {
        self.max_loops = max_loops;
        self
    }

    /// Set how many results each search keeps.
    pub fn with_results_per_search(mut self, n: usize) -> Self {
        self.results_per_search = n.max(1);
        self
    }

    /// Run the state machine for `question`.
    pub async fn run(&self, question: &str) -> ResearchOutcome {
        let mut outcome = ResearchOutcome {
            question: question.to_string(),
            answer: String::new(),
            from_cache: false,
            queries: Vec::new(),
            knowledge: String::new(),
            trace: Vec::new(),
        };
        let mut loops = 0;
        let mut state = ResearchState::CheckCache;

        while state != ResearchState::Done {
            outcome.trace.push(state);
            state = match state {
                ResearchState::CheckCache => match self.cache.get(question).await {
                    Some(hit) => {
                        info!(question, "research cache hit");
                        outcome.answer = hit.answer;
                        outcome.from_cache = true;
                        ResearchState::Done
                    }
                    None => ResearchState::Plan,
                },
                ResearchState::Plan => {
                    if loops >= self.max_loops {
                        warn!(question, loops, "loop budget spent, answering with what we have");
                        ResearchState::Answer
                    } else if outcome.knowledge.is_empty() {
                        ResearchState::GenerateQuery
                    } else if self.is_sufficient(question, &outcome.knowledge).await {
                        ResearchState::Answer
                    } else {
                        ResearchState::GenerateQuery
                    }
                }
                ResearchState::GenerateQuery => {
                    let query = self.next_query(question, &outcome.knowledge).await;
                    info!(question, query = %query, loop_index = loops, "generated search query");
                    outcome.queries.push(query);
                    loops += 1;
                    ResearchState::Search
                }
                ResearchState::Search => {
                    let query = outcome.queries.last().map(String::as_str).unwrap_or(question);
                    let found = self.search_once(query).await;
                    outcome.knowledge.push_str(&found);
                    ResearchState::Plan
                }
                ResearchState::Answer => {
                    outcome.answer = self.final_answer(question, &outcome.knowledge).await;
                    if !outcome.answer.is_empty() {
                        let search_query =
                            outcome.queries.last().cloned().unwrap_or_else(|| question.to_string());
                        self.cache
                            .put(
                                question,
                                CachedAnswer {
                                    answer: outcome.answer.clone(),
                                    search_query,
                                    source: None,
                                },
                            )
                            .await;
                    }
                    ResearchState::Done
                }
                ResearchState::Done => ResearchState::Done,
            };
        }
        outcome.trace.push(ResearchState::Done);
        outcome
    }

    async fn is_sufficient(&self, question: &str, knowledge: &str) -> bool {
        let prompt = format!(
            "You are a research planner.\nUser question: \"{question}\"\nInformation gathered \
             so far:\n---\n{knowledge}\n---\nIs this enough to answer the question in detail? \
             Answer only YES or NO."
        );
        match self.model.complete(CompletionRequest::user_only(prompt, 0.0)).await {
            Ok(reply) => reply.to_uppercase().contains("YES"),
            Err(e) => {
                warn!(error = %e, "planner call failed, continuing to search");
                false
            }
        }
    }

    async fn next_query(&self, question: &str, knowledge: &str) -> String {
        let prompt = format!(
            "User question: \"{question}\"\nKnown so far: \"{knowledge}\"\nGive one search \
             keyword phrase that would find the missing information. Output only the phrase."
        );
        match self.model.complete(CompletionRequest::user_only(prompt, 0.0)).await {
            Ok(reply) => match crate::rewrite::clean_rewrite(&reply) {
                Some(query) => query,
                None => question.to_string(),
            },
            Err(e) => {
                warn!(error = %e, "query generation failed, searching with the question");
                question.to_string()
            }
        }
    }

    async fn search_once(&self, query: &str) -> String {
        match self.search.search(query, self.results_per_search).await {
            Ok(hits) if !hits.is_empty() => hits
                .iter()
                .map(|hit| {
                    format!(
                        "\n[Source: {}]\nURL: {}\nSnippet: {}\n",
                        hit.title, hit.url, hit.snippet
                    )
                })
                .collect(),
            Ok(_) => format!("\n[Search failed] no results for '{query}'.\n"),
            Err(e) => {
                warn!(query, error = %e, "web search failed");
                format!("\n[Search failed] '{query}': {e}\n")
            }
        }
    }

    async fn final_answer(&self, question: &str, knowledge: &str) -> String {
        let prompt = format!(
            "Answer the user's question from the information collected below.\n\nQuestion: \
             {question}\n\nCollected information:\n{knowledge}\n\nAnswer professionally and \
             in a well-organised way."
        );
        match self.model.complete(CompletionRequest::user_only(prompt, 0.0)).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "final answer failed");
                String::new()
            }
        }
    }
}
