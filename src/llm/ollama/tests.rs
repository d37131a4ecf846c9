use super::*;
use crate::config::LlmProvider;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> LlmConfig {
    LlmConfig {
        base_url: base_url.to_string(),
        embedding_dimension: 64,
        batch_size: 2,
        timeout_secs: 5,
        retry_attempts: 1,
        ..LlmConfig::for_provider(LlmProvider::Ollama)
    }
}

#[test]
fn client_configuration() {
    let client = OllamaClient::new(&test_config("http://test-host:1234")).expect("client");

    assert_eq!(client.chat_model, "llama3.2");
    assert_eq!(client.embedding_model, "nomic-embed-text:latest");
    assert_eq!(client.batch_size, 2);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.model_name(), "llama3.2");
}

#[test]
fn latest_tag_is_optional() {
    assert!(same_model("llama3.2:latest", "llama3.2"));
    assert!(same_model("nomic-embed-text", "nomic-embed-text:latest"));
    assert!(!same_model("llama3.1:latest", "llama3.2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_batch_uses_input_array() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5]]})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&test_config(&server.uri())).expect("client");
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let vectors = tokio::task::spawn_blocking(move || {
        client.embed_batch(&texts, EmbeddingTask::RetrievalDocument)
    })
    .await
    .expect("task should join")
    .expect("batch should succeed");

    assert_eq!(vectors.len(), 3);
    assert!(vectors.iter().all(|v| v.len() == 64));
    assert_eq!(vectors[1][1], 1.0);
    assert_eq!(vectors[2][0], 0.5);
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_count_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": []})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&test_config(&server.uri())).expect("client");
    let result =
        tokio::task::spawn_blocking(move || client.embed("x", EmbeddingTask::RetrievalQuery))
            .await
            .expect("task should join");

    let error = result.expect_err("empty reply should fail");
    assert!(
        matches!(error.root_cause().downcast_ref::<ScoutError>(), Some(ScoutError::Embedding(_))),
        "unexpected error: {error:#}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_json_sets_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"format": "json", "stream": false})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "{\"a\":1}", "done": true})),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(&test_config(&server.uri())).expect("client");
    let text = tokio::task::spawn_blocking(move || client.generate("p", ResponseFormat::Json))
        .await
        .expect("task should join")
        .expect("generate should succeed");

    assert_eq!(text, "{\"a\":1}");
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3.2:latest"}]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&test_config(&server.uri())).expect("client");
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");

    let message = format!("{:#}", result.expect_err("embedding model is missing"));
    assert!(message.contains("nomic-embed-text"), "unexpected: {message}");
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_passes_with_models_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3.2:latest"}, {"name": "nomic-embed-text:latest", "size": 274}]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&test_config(&server.uri())).expect("client");
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");

    assert!(result.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_timeout_bounds_each_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"models": []}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(&LlmConfig {
        timeout_secs: 1,
        ..test_config(&server.uri())
    })
    .expect("client");
    let started = std::time::Instant::now();
    let result = tokio::task::spawn_blocking(move || client.ping())
        .await
        .expect("task should join");

    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(4));
}
