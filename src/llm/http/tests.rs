use super::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn backoff_doubles_each_attempt() {
    assert_eq!(backoff_delay(1), Duration::from_secs(1));
    assert_eq!(backoff_delay(2), Duration::from_secs(2));
    assert_eq!(backoff_delay(3), Duration::from_secs(4));
}

#[test]
fn retry_attempts_never_zero() {
    let transport = HttpTransport::new(Duration::from_secs(1), 0);
    assert_eq!(transport.retry_attempts(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_fail_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/missing", server.uri());
    let result = tokio::task::spawn_blocking(move || {
        HttpTransport::new(Duration::from_secs(5), 3).get(&url, &[])
    })
    .await
    .expect("task should join");

    let error = result.expect_err("404 should fail");
    assert!(
        matches!(error.downcast_ref::<ScoutError>(), Some(ScoutError::Network(_))),
        "unexpected error: {error:#}"
    );
    assert!(error.to_string().contains("404"), "unexpected error: {error}");
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/flaky"))
        .and(header("x-test", "yes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let url = format!("{}/flaky", server.uri());
    let body = tokio::task::spawn_blocking(move || {
        HttpTransport::new(Duration::from_secs(5), 2).post_json(&url, &[("x-test", "yes")], "{}")
    })
    .await
    .expect("task should join")
    .expect("second attempt should succeed");

    assert_eq!(body, "recovered");
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_report_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let url = format!("{}/down", server.uri());
    let result = tokio::task::spawn_blocking(move || {
        HttpTransport::new(Duration::from_secs(5), 2).get(&url, &[])
    })
    .await
    .expect("task should join");

    let error = result.expect_err("500 should fail after retries");
    assert!(matches!(
        error.downcast_ref::<ScoutError>(),
        Some(ScoutError::Network(message)) if message.contains("500")
    ));
}

#[test]
fn endpoints_join_below_the_base_path() {
    let join = |base: &str, path: &str| {
        join_endpoint(&Url::parse(base).expect("base url"), path)
            .expect("join")
            .to_string()
    };

    assert_eq!(join("http://localhost:11434", "api/tags"), "http://localhost:11434/api/tags");
    assert_eq!(
        join("https://proxy.example/ollama", "/api/embed"),
        "https://proxy.example/ollama/api/embed"
    );
    assert_eq!(
        join(
            "https://proxy.example/gemini/",
            "v1beta/models/text-embedding-004:embedContent"
        ),
        "https://proxy.example/gemini/v1beta/models/text-embedding-004:embedContent"
    );
}
