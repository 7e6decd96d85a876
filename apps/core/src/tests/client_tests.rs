//! Completion client behavior against a mock backend.

use tokio::sync::mpsc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::completion::{
    CompletionClient, CompletionError, CompletionOptions, StreamChunk, TextGenerator,
};
use crate::config::CompletionConfig;

fn test_config(endpoint: &str) -> CompletionConfig {
    CompletionConfig {
        endpoint: endpoint.to_string(),
        models: vec!["model-a".to_string(), "model-b".to_string()],
        timeout_secs: 5,
        max_retries: 3,
        max_model_rotations: 2,
        throttle_max_requests: 100,
        // Keep retry tests fast.
        backoff_base_ms: 1,
        ..CompletionConfig::default()
    }
}

#[tokio::test]
async fn test_successful_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": "hello"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    let text = client
        .complete("hi", &CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "hello");
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(3)
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    let err = client
        .complete("hi", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::TransientServer { status: 503, .. }));
    server.verify().await;
}

#[tokio::test]
async fn test_model_rotation_on_model_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .and(body_string_contains("model-a"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .and(body_string_contains("model-b"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": "from b"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    let text = client
        .complete("hi", &CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "from b");

    // The rotated-to model is sticky: the next call goes straight to it.
    assert_eq!(client.preferred_model(), "model-b");
    let text = client
        .complete("again", &CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "from b");
    server.verify().await;
}

#[tokio::test]
async fn test_pinned_model_never_rotates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    let options = CompletionOptions {
        model: Some("model-a".to_string()),
        ..CompletionOptions::default()
    };
    let err = client.complete("hi", &options).await.unwrap_err();
    assert!(matches!(err, CompletionError::ModelUnavailable { .. }));
    server.verify().await;
}

#[tokio::test]
async fn test_auth_failure_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    let err = client
        .complete("hi", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::AuthFailure { status: 401 }));
    server.verify().await;
}

#[tokio::test]
async fn test_rate_limit_sets_cooldown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "60")
                .set_body_string("slow down"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    // A 429 on the only attempt must still record the hint.
    config.max_retries = 1;
    let client = CompletionClient::new(config).unwrap();

    let err = client
        .complete("hi", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::RateLimited { .. }));

    // Both further calls and the probe fail fast inside the cooldown; the
    // single mounted expectation proves neither reached the network.
    let err = client
        .complete("again", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::RateLimited { .. }));
    assert!(!client.is_available().await);
    server.verify().await;
}

#[tokio::test]
async fn test_malformed_body_retried_then_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.max_retries = 2;
    let client = CompletionClient::new(config).unwrap();
    let err = client
        .complete("hi", &CompletionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CompletionError::MalformedResponse(_)));
    server.verify().await;
}

#[tokio::test]
async fn test_streaming_decodes_sse() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"content\":\"Hel\",\"stop\":false}\n\n",
        "data: {\"content\":\"lo\",\"stop\":true}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    let (tx, mut rx) = mpsc::channel::<StreamChunk>(16);
    client
        .stream_generate("hi", &CompletionOptions::default(), tx)
        .await
        .unwrap();

    let mut text = String::new();
    let mut saw_last = false;
    while let Some(chunk) = rx.recv().await {
        text.push_str(&chunk.text);
        saw_last = chunk.last;
    }
    assert_eq!(text, "Hello");
    assert!(saw_last);
}

#[tokio::test]
async fn test_streaming_done_sentinel() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"content\":\"all\",\"stop\":false}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    let (tx, mut rx) = mpsc::channel::<StreamChunk>(16);
    client
        .stream_generate("hi", &CompletionOptions::default(), tx)
        .await
        .unwrap();

    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    assert_eq!(chunks.last().map(|c| c.last), Some(true));
    assert_eq!(chunks.iter().map(|c| c.text.as_str()).collect::<String>(), "all");
}

#[tokio::test]
async fn test_streaming_flushes_unterminated_final_line() {
    let server = MockServer::start().await;
    // The last data line has no trailing newline; its fragment must still
    // be delivered when the stream closes.
    let body = concat!(
        "data: {\"content\":\"head \",\"stop\":false}\n\n",
        "data: {\"content\":\"tail\",\"stop\":false}",
    );
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    let (tx, mut rx) = mpsc::channel::<StreamChunk>(16);
    client
        .stream_generate("hi", &CompletionOptions::default(), tx)
        .await
        .unwrap();

    let mut text = String::new();
    let mut saw_last = false;
    while let Some(chunk) = rx.recv().await {
        text.push_str(&chunk.text);
        saw_last = chunk.last;
    }
    assert_eq!(text, "head tail");
    assert!(saw_last);
}

#[tokio::test]
async fn test_client_calls_spawn_on_worker_tasks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": "ok"})),
        )
        .mount(&server)
        .await;

    // tokio::spawn requires the futures to be Send; a lock held across an
    // await inside the client would fail to compile here.
    let client = std::sync::Arc::new(CompletionClient::new(test_config(&server.uri())).unwrap());
    let blocking = {
        let client = client.clone();
        tokio::spawn(async move { client.complete("hi", &CompletionOptions::default()).await })
    };
    assert_eq!(blocking.await.unwrap().unwrap(), "ok");

    let (tx, mut rx) = mpsc::channel::<StreamChunk>(16);
    let streaming = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .stream_generate("hi", &CompletionOptions::default(), tx)
                .await
        })
    };
    streaming.await.unwrap().unwrap();
    while rx.recv().await.is_some() {}
}

#[tokio::test]
async fn test_health_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    assert!(client.is_available().await);
}

#[tokio::test]
async fn test_probe_unreachable_backend() {
    let mut config = test_config("http://127.0.0.1:9");
    config.timeout_secs = 1;
    let client = CompletionClient::new(config).unwrap();
    assert!(!client.is_available().await);
}

#[tokio::test]
async fn test_system_prompt_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .and(body_string_contains("system_prompt"))
        .and(body_string_contains("be brief"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": "ok"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(test_config(&server.uri())).unwrap();
    let options = CompletionOptions {
        system_prompt: Some("be brief".to_string()),
        ..CompletionOptions::default()
    };
    let text = client.complete("hi", &options).await.unwrap();
    assert_eq!(text, "ok");
    server.verify().await;
}
