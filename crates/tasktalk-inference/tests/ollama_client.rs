//! OllamaClient against a mocked model server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tasktalk_core::error::TasktalkError;
use tasktalk_dialog::CompletionService;
use tasktalk_inference::{InferenceError, OllamaClient};
use tasktalk_retrieval::EmbeddingService;

fn client(server: &MockServer) -> OllamaClient {
    OllamaClient::new(
        server.uri(),
        "llama3.1:8b",
        "mxbai-embed-large",
        3,
        Duration::from_secs(2),
    )
    .unwrap()
}

#[tokio::test]
async fn test_completion_requests_json_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.1:8b",
            "stream": false,
            "format": "json"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "message": {
                "role": "assistant",
                "content": "{\"current_flow\":\"IDLE\",\"intent_type\":\"SMALL_TALK\",\"confidence\":0.9}"
            },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server).complete("classify this").await.unwrap();
    assert!(reply.contains("SMALL_TALK"));
}

#[tokio::test]
async fn test_completion_error_status_maps_to_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let err = client(&server).complete("classify this").await.unwrap_err();
    match err {
        TasktalkError::Upstream(message) => assert!(message.contains("model not loaded")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_rate_limited_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client(&server).complete("classify this").await.unwrap_err();
    assert!(matches!(err, TasktalkError::RateLimited));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(json!({"message": {"role": "assistant", "content": "{}"}})),
        )
        .mount(&server)
        .await;

    let err = client(&server).chat_json("classify this").await.unwrap_err();
    assert!(matches!(err, InferenceError::Timeout(2)));
}

#[tokio::test]
async fn test_embedding_returns_first_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": "mxbai-embed-large",
            "input": ["write report"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "mxbai-embed-large",
            "embeddings": [[0.1, 0.2, 0.3]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let vector = client.embed("write report").await.unwrap();
    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    assert_eq!(EmbeddingService::dimensions(&client), 3);
}

#[tokio::test]
async fn test_empty_embedding_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": []})))
        .mount(&server)
        .await;

    let err = client(&server).embed("write report").await.unwrap_err();
    assert!(matches!(err, TasktalkError::Embedding(_)));
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server).chat_json("classify this").await.unwrap_err();
    assert!(matches!(err, InferenceError::Parse(_)));
}
