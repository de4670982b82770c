//! Chat-completion collaborator: message types and the model trait.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// The end user.
    User,
    /// A previous model reply.
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// A request to a chat-completion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// A system prompt followed by one user message.
    pub fn with_system(
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self { messages: vec![ChatMessage::system(system), ChatMessage::user(user)], temperature }
    }

    /// A single user message.
    pub fn user_only(user: impl Into<String>, temperature: f32) -> Self {
        Self { messages: vec![ChatMessage::user(user)], temperature }
    }
}

/// A stream of text deltas from a completion model.
pub type CompletionStream = BoxStream<'static, Result<String>>;

/// A chat-completion model.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Model name used in logs and errors.
    fn name(&self) -> &str;

    /// Produce the full completion text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Produce the completion as a stream of text deltas.
    ///
    /// The default yields the whole [`complete`](CompletionModel::complete)
    /// output as a single delta.
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let text = self.complete(request).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}
