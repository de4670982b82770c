//! HTTP collaborators against a mock server.

#![cfg(feature = "http")]

use std::sync::Arc;

use futures::StreamExt;
use ragbench_rag::http::{
    ChatCompletionClient, EmbeddingServiceClient, HttpTransport, SearxngClient,
    SimilarityServiceClient,
};
use ragbench_rag::{
    Backoff, CompletionModel, CompletionRequest, EmbeddingProvider, RagError, RelevanceScorer,
    RetryPolicy, WebSearch,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> Arc<HttpTransport> {
    let retry = RetryPolicy {
        max_attempts: 3,
        backoff: Backoff::Fixed { delay_ms: 0 },
        timeout_secs: 5,
        retryable_statuses: Vec::new(),
    };
    Arc::new(HttpTransport::new(retry).unwrap())
}

#[tokio::test]
async fn embedding_client_uses_task_descriptions_and_probes_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .and(body_partial_json(json!({ "task_description": "Query", "normalize": true })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.6, 0.8]] })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .and(body_partial_json(json!({ "task_description": "Retrieve documents" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0, 0.0, 0.0]] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = EmbeddingServiceClient::new(transport(), format!("{}/embed", server.uri()));
    assert_eq!(client.embed_query("what is rag").await.unwrap(), vec![0.6, 0.8]);
    assert_eq!(client.dimensions().await.unwrap(), 3);
    assert_eq!(client.dimensions().await.unwrap(), 3);
}

#[tokio::test]
async fn embedding_count_mismatch_and_unknown_route_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0]] })))
        .mount(&server)
        .await;

    let client = EmbeddingServiceClient::new(transport(), format!("{}/embed", server.uri()));
    let err = client.embed_batch(&["a", "b"]).await.unwrap_err();
    assert!(err.is_collaborator_failure(), "unexpected error: {err}");

    let err = EmbeddingServiceClient::new(transport(), format!("{}/missing", server.uri()))
        .embed("a")
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn similarity_client_returns_first_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/similarity"))
        .and(body_partial_json(json!({ "queries": ["rag"], "documents": ["x", "y"] })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "similarity": [[0.25, 0.75]] })),
        )
        .mount(&server)
        .await;

    let client = SimilarityServiceClient::new(transport(), format!("{}/similarity", server.uri()));
    assert_eq!(client.score("rag", &["x", "y"]).await.unwrap(), vec![0.25, 0.75]);

    let err = client.score("rag", &["x"]).await.unwrap_err();
    assert!(matches!(err, RagError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn chat_client_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({ "model": "test-model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": "  RAG means retrieval.  " }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatCompletionClient::new(
        transport(),
        format!("{}/v1/chat/completions", server.uri()),
        "test-model",
    )
    .with_api_key("secret");
    let answer =
        client.complete(CompletionRequest::user_only("What is RAG?", 0.1)).await.unwrap();
    assert_eq!(answer, "RAG means retrieval.");
}

#[tokio::test]
async fn similarity_client_retries_undecodable_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/similarity"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>warming up</html>"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/similarity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "similarity": [[0.5]] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SimilarityServiceClient::new(transport(), format!("{}/similarity", server.uri()));
    assert_eq!(client.score("rag", &["x"]).await.unwrap(), vec![0.5]);
}

#[tokio::test]
async fn chat_client_does_not_retry_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("context length exceeded"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatCompletionClient::new(
        transport(),
        format!("{}/v1/chat/completions", server.uri()),
        "test-model",
    );
    let err = client.complete(CompletionRequest::user_only("long", 0.1)).await.unwrap_err();
    match err {
        RagError::HttpStatus { status, message, .. } => {
            assert_eq!(status, 400);
            assert!(message.contains("context length"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn chat_client_streams_server_sent_events() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = ChatCompletionClient::new(
        transport(),
        format!("{}/v1/chat/completions", server.uri()),
        "test-model",
    );
    let deltas: Vec<String> = client
        .stream(CompletionRequest::user_only("hi", 0.7))
        .await
        .unwrap()
        .map(|delta| delta.unwrap())
        .collect()
        .await;
    assert_eq!(deltas, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn searxng_client_maps_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "gtc 2026"))
        .and(query_param("format", "json"))
        .and(query_param("language", "zh-TW"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "url": "https://a.example", "title": "A", "content": "first" },
                { "title": "no url" },
                { "url": "https://b.example", "title": "B", "content": "second" }
            ]
        })))
        .mount(&server)
        .await;

    let client = SearxngClient::new(transport(), format!("{}/search", server.uri()))
        .with_language("zh-TW");
    let hits = client.search("gtc 2026", 5).await.unwrap();
    let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
    assert_eq!(urls, ["https://a.example", "https://b.example"]);
    assert_eq!(client.search("gtc 2026", 1).await.unwrap().len(), 1);
}
