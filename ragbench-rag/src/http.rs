//! HTTP collaborators built on `reqwest`.
//!
//! Every request and response is a typed record. A response that does not
//! match its record is reported as [`RagError::MalformedResponse`]. Bodies
//! that fail to decode are retried like transport errors; once the budget is
//! spent the pipeline treats the error like any other unavailable
//! collaborator.
//!
//! This module is only available when the `http` feature is enabled.

use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::completion::{ChatMessage, CompletionModel, CompletionRequest, CompletionStream};
use crate::config::ServiceConfig;
use crate::embedding::{EmbeddingProvider, ensure_batch_len};
use crate::error::{RagError, Result};
use crate::research::{SearchHit, WebSearch};
use crate::retry::RetryPolicy;
use crate::scoring::RelevanceScorer;

const EMBED_SERVICE: &str = "embedding";
const SIMILARITY_SERVICE: &str = "similarity";
const CHAT_SERVICE: &str = "chat";
const SEARCH_SERVICE: &str = "searxng";

/// A `reqwest` client plus the shared retry policy.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Build a client whose request timeout comes from `retry`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the TLS backend cannot be initialized.
    pub fn new(retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(retry.timeout())
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, retry })
    }

    /// The retry policy applied to every call.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn check_response(service: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        error!(service, status = status.as_u16(), "collaborator returned an error status");
        Err(RagError::HttpStatus { service: service.to_string(), status: status.as_u16(), message })
    }

    async fn send(&self, service: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| RagError::Transport {
            service: service.to_string(),
            message: e.to_string(),
        })?;
        Self::check_response(service, response).await
    }

    async fn decode<R: DeserializeOwned>(service: &str, response: Response) -> Result<R> {
        let body = response.text().await.map_err(|e| RagError::Transport {
            service: service.to_string(),
            message: format!("failed to read response body: {e}"),
        })?;
        serde_json::from_str(&body).map_err(|e| RagError::malformed(service, e.to_string()))
    }

    /// POST `body` as JSON and decode the JSON reply, retrying per policy.
    pub async fn post_json<B, R>(
        &self,
        service: &str,
        url: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        self.retry
            .run(service, || async move {
                let mut request = self.client.post(url).json(body);
                if let Some(token) = bearer {
                    request = request.bearer_auth(token);
                }
                let response = self.send(service, request).await?;
                Self::decode(service, response).await
            })
            .await
    }

    /// GET `url` with `query` parameters and decode the JSON reply.
    pub async fn get_json<R: DeserializeOwned>(
        &self,
        service: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<R> {
        self.retry
            .run(service, || async move {
                let response = self.send(service, self.client.get(url).query(query)).await?;
                Self::decode(service, response).await
            })
            .await
    }
}

// ── Embedding service ──────────────────────────────────────────────

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [&'a str],
    task_description: &'a str,
    normalize: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// An [`EmbeddingProvider`] for a `{texts, task_description, normalize}` service.
///
/// Documents and queries are sent with different task descriptions. The
/// dimensionality is probed once and remembered.
pub struct EmbeddingServiceClient {
    transport: Arc<HttpTransport>,
    url: String,
    document_task: String,
    query_task: String,
    normalize: bool,
    dimensions: OnceCell<usize>,
}

impl EmbeddingServiceClient {
    /// Create a client for the embedding endpoint at `url`.
    pub fn new(transport: Arc<HttpTransport>, url: impl Into<String>) -> Self {
        let defaults = ServiceConfig::default();
        Self {
            transport,
            url: url.into(),
            document_task: defaults.document_task,
            query_task: defaults.query_task,
            normalize: defaults.normalize,
            dimensions: OnceCell::new(),
        }
    }

    /// Create a client from the service configuration.
    pub fn from_config(transport: Arc<HttpTransport>, config: &ServiceConfig) -> Self {
        Self {
            document_task: config.document_task.clone(),
            query_task: config.query_task.clone(),
            normalize: config.normalize,
            ..Self::new(transport, config.embed_url.clone())
        }
    }

    async fn request(&self, texts: &[&str], task: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = EMBED_SERVICE, batch_size = texts.len(), task, "embedding batch");
        let body = EmbedRequest { texts, task_description: task, normalize: self.normalize };
        let response: EmbedResponse =
            self.transport.post_json(EMBED_SERVICE, &self.url, None, &body).await?;
        ensure_batch_len(EMBED_SERVICE, texts.len(), &response.embeddings)?;
        Ok(response.embeddings)
    }

    async fn single(&self, text: &str, task: &str) -> Result<Vec<f32>> {
        self.request(&[text], task).await?.into_iter().next().ok_or_else(|| {
            RagError::malformed(EMBED_SERVICE, "no embedding returned for a single input")
        })
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingServiceClient {
    fn name(&self) -> &str {
        EMBED_SERVICE
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.single(text, &self.document_task).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.request(texts, &self.document_task).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.single(text, &self.query_task).await
    }

    async fn dimensions(&self) -> Result<usize> {
        self.dimensions
            .get_or_try_init(|| async {
                let probe = self.embed("dimension probe").await?;
                if probe.is_empty() {
                    return Err(RagError::malformed(EMBED_SERVICE, "probe embedding was empty"));
                }
                debug!(provider = EMBED_SERVICE, dimensions = probe.len(), "probed dimensions");
                Ok(probe.len())
            })
            .await
            .copied()
    }
}

// ── Similarity service ─────────────────────────────────────────────

#[derive(Serialize)]
struct SimilarityRequest<'a> {
    queries: [&'a str; 1],
    documents: &'a [&'a str],
}

#[derive(Deserialize)]
struct SimilarityResponse {
    similarity: Vec<Vec<f32>>,
}

/// A [`RelevanceScorer`] for a `{queries, documents}` → `{similarity}` service.
pub struct SimilarityServiceClient {
    transport: Arc<HttpTransport>,
    url: String,
}

impl SimilarityServiceClient {
    /// Create a client for the similarity endpoint at `url`.
    pub fn new(transport: Arc<HttpTransport>, url: impl Into<String>) -> Self {
        Self { transport, url: url.into() }
    }
}

#[async_trait]
impl RelevanceScorer for SimilarityServiceClient {
    fn name(&self) -> &str {
        SIMILARITY_SERVICE
    }

    async fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f32>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let body = SimilarityRequest { queries: [query], documents: candidates };
        let response: SimilarityResponse =
            self.transport.post_json(SIMILARITY_SERVICE, &self.url, None, &body).await?;
        let row = response
            .similarity
            .into_iter()
            .next()
            .ok_or_else(|| RagError::malformed(SIMILARITY_SERVICE, "empty similarity matrix"))?;
        if row.len() != candidates.len() {
            return Err(RagError::malformed(
                SIMILARITY_SERVICE,
                format!("expected {} scores, got {}", candidates.len(), row.len()),
            ));
        }
        Ok(row)
    }
}

// ── Chat completions ───────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChunkChoice>,
}

#[derive(Deserialize)]
struct ChatChunkChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Deserialize, Default)]
struct ChatDelta {
    content: Option<String>,
}

/// A [`CompletionModel`] for an OpenAI-compatible chat completions endpoint.
pub struct ChatCompletionClient {
    transport: Arc<HttpTransport>,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatCompletionClient {
    /// Create a client for `model` at `url`.
    pub fn new(
        transport: Arc<HttpTransport>,
        url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self { transport, url: url.into(), model: model.into(), api_key: None }
    }

    /// Create a client from the service configuration.
    pub fn from_config(transport: Arc<HttpTransport>, config: &ServiceConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            ..Self::new(transport, config.chat_url.clone(), config.chat_model.clone())
        }
    }

    /// Send `api_key` as a bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl CompletionModel for ChatCompletionClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            stream: false,
        };
        let response: ChatResponse = self
            .transport
            .post_json(CHAT_SERVICE, &self.url, self.api_key.as_deref(), &body)
            .await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::malformed(CHAT_SERVICE, "response has no message content"))?;
        Ok(content.trim().to_string())
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            stream: true,
        };
        let body = &body;
        let response = self
            .transport
            .retry()
            .run(CHAT_SERVICE, || async move {
                let mut builder = self.transport.client.post(&self.url).json(body);
                if let Some(token) = &self.api_key {
                    builder = builder.bearer_auth(token);
                }
                self.transport.send(CHAT_SERVICE, builder).await
            })
            .await?;

        let stream = async_stream::stream! {
            let mut events = response.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(RagError::Transport {
                            service: CHAT_SERVICE.to_string(),
                            message: e.to_string(),
                        });
                        break;
                    }
                };
                if event.data.trim() == "[DONE]" {
                    break;
                }
                match serde_json::from_str::<ChatChunk>(&event.data) {
                    Ok(chunk) => {
                        for choice in chunk.choices {
                            if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                                yield Ok(delta);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(RagError::malformed(CHAT_SERVICE, e.to_string()));
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

// ── SearXNG web search ─────────────────────────────────────────────

#[derive(Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Deserialize)]
struct SearxngResult {
    url: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// A [`WebSearch`] backed by a SearXNG instance's JSON API.
pub struct SearxngClient {
    transport: Arc<HttpTransport>,
    url: String,
    language: String,
}

impl SearxngClient {
    /// Create a client for the search endpoint at `url`.
    pub fn new(transport: Arc<HttpTransport>, url: impl Into<String>) -> Self {
        Self { transport, url: url.into(), language: "en".to_string() }
    }

    /// Set the result language (for example `zh-TW`).
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[async_trait]
impl WebSearch for SearxngClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let params = [("q", query), ("format", "json"), ("language", self.language.as_str())];
        let response: SearxngResponse =
            self.transport.get_json(SEARCH_SERVICE, &self.url, &params).await?;
        Ok(response
            .results
            .into_iter()
            .filter_map(|r| {
                r.url.map(|url| SearchHit { url, title: r.title, snippet: r.content })
            })
            .take(limit)
            .collect())
    }
}
