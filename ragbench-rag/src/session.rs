//! Conversation sessions and their rolling history digest.
//!
//! A [`Session`] records every completed [`ConversationTurn`] but the query
//! rewriter only ever sees its [`History`]: a short digest of the most recent
//! turn. Sessions are keyed by an external conversation id and never share
//! state with each other.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::document::DocumentId;
use crate::error::{RagError, Result};

/// Rolling digest of the previous turn, consumed by the query rewriter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(String);

impl History {
    /// An empty history, as at the start of a session.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Use `text` verbatim as the digest.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Digest of one completed turn: `Q:{question} A:{answer prefix}`.
    ///
    /// The answer is cut to `answer_chars` characters.
    pub fn digest(question: &str, answer: &str, answer_chars: usize) -> Self {
        let prefix: String = answer.chars().take(answer_chars).collect();
        Self(format!("Q:{question} A:{prefix}"))
    }

    /// Whether no turn has completed yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The digest text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// The question as the user asked it.
    pub question: String,
    /// The standalone query used for retrieval.
    pub search_query: String,
    /// The generated answer.
    pub answer: String,
    /// Source of the top retrieved chunk, if any.
    pub retrieved_source: Option<DocumentId>,
}

/// Where a session is in its turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Ready to accept a question.
    #[default]
    Fresh,
    /// A question is being processed.
    AwaitingAnswer,
}

/// The ordered turns and history of one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    id: String,
    turns: Vec<ConversationTurn>,
    history: History,
    state: SessionState,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    /// The conversation id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Completed turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The current history digest.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move `Fresh → AwaitingAnswer`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if a turn is already in progress.
    pub fn begin_turn(&mut self) -> Result<()> {
        match self.state {
            SessionState::Fresh => {
                self.state = SessionState::AwaitingAnswer;
                Ok(())
            }
            SessionState::AwaitingAnswer => Err(RagError::PipelineError(format!(
                "session '{}' already has a turn in progress",
                self.id
            ))),
        }
    }

    /// Record `turn`, replace the history with its digest and return to `Fresh`.
    pub fn complete_turn(&mut self, turn: ConversationTurn, answer_chars: usize) {
        self.history = History::digest(&turn.question, &turn.answer, answer_chars);
        self.turns.push(turn);
        self.state = SessionState::Fresh;
    }

    /// Return to `Fresh` without recording anything.
    pub fn abandon_turn(&mut self) {
        self.state = SessionState::Fresh;
    }
}

/// Sessions keyed by conversation id.
///
/// Each session sits behind its own lock, so turns in different sessions
/// proceed independently while turns within one session are serialized.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for `id`, created empty on first use.
    pub async fn get_or_create(&self, id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(id))));
        Arc::clone(session)
    }

    /// Start a new session under a random id and return the id.
    pub async fn open(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.get_or_create(&id).await;
        id
    }

    /// A copy of the session for `id`, if it exists.
    pub async fn snapshot(&self, id: &str) -> Option<Session> {
        let session = self.sessions.read().await.get(id).cloned()?;
        let guard = session.lock().await;
        Some(guard.clone())
    }

    /// Number of known sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(question: &str, answer: &str) -> ConversationTurn {
        ConversationTurn {
            question: question.into(),
            search_query: question.into(),
            answer: answer.into(),
            retrieved_source: None,
        }
    }

    #[test]
    fn digest_truncates_answer_by_characters() {
        let history = History::digest("What is RAG?", "檢索增強生成是一種結合檢索與生成的方法", 5);
        assert_eq!(history.as_str(), "Q:What is RAG? A:檢索增強生");
    }

    #[test]
    fn session_cycles_between_states() {
        let mut session = Session::new("c1");
        assert_eq!(session.state(), SessionState::Fresh);
        assert!(session.history().is_empty());

        session.begin_turn().unwrap();
        assert_eq!(session.state(), SessionState::AwaitingAnswer);
        assert!(session.begin_turn().is_err());

        session.complete_turn(turn("q1", "answer one"), 6);
        assert_eq!(session.state(), SessionState::Fresh);
        assert_eq!(session.history().as_str(), "Q:q1 A:answer");
        assert_eq!(session.turns().len(), 1);

        session.begin_turn().unwrap();
        session.abandon_turn();
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.state(), SessionState::Fresh);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let store = SessionStore::new();
        let a = store.get_or_create("a").await;
        a.lock().await.complete_turn(turn("qa", "aa"), 15);

        let b = store.get_or_create("b").await;
        assert!(b.lock().await.history().is_empty());
        assert_eq!(store.len().await, 2);

        let again = store.get_or_create("a").await;
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(store.snapshot("a").await.unwrap().turns().len(), 1);
        assert!(store.snapshot("missing").await.is_none());

        let opened = store.open().await;
        assert_ne!(opened, store.open().await);
        assert!(store.snapshot(&opened).await.unwrap().turns().is_empty());
    }
}
