//! Integration tests for the Gemini-backed responder using wiremock

use std::time::Duration;

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use confession_booth::responder::{CredentialPool, GeminiProvider, Responder};
use confession_booth::Error;

const GENERATE_PATH: &str = "/models/test-model:generateContent";

fn create_responder(mock_server: &MockServer, keys: &[&str]) -> Responder<GeminiProvider> {
    let provider =
        GeminiProvider::new(&mock_server.uri(), "test-model", Duration::from_secs(5)).unwrap();
    let pool = CredentialPool::new(keys.iter().map(|k| (*k).to_string()).collect()).unwrap();
    Responder::new(provider, pool)
}

fn reply_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }], "role": "model" },
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_respond_success_keeps_cursor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "key-a"))
        .and(body_partial_json(serde_json::json!({
            "systemInstruction": { "parts": [{ "text": "Be brief." }] },
            "contents": [{ "role": "user", "parts": [{ "text": "Hello" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("Hi there.")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let responder = create_responder(&mock_server, &["key-a", "key-b"]);
    let text = responder.respond("Hello", "Be brief.").await.unwrap();

    assert_eq!(text, "Hi there.");
    assert_eq!(responder.pool().cursor(), 0);
}

#[tokio::test]
async fn test_rate_limited_rotates_to_next_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "key-a"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": { "code": 429, "message": "Resource has been exhausted" }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "key-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("Second key.")))
        .mount(&mock_server)
        .await;

    let responder = create_responder(&mock_server, &["key-a", "key-b"]);

    let err = responder.respond("Hello", "Be brief.").await.unwrap_err();
    assert!(matches!(err, Error::ProviderRateLimited { index: 0 }));
    assert_eq!(responder.pool().cursor(), 1);

    let text = responder.respond("Hello", "Be brief.").await.unwrap();
    assert_eq!(text, "Second key.");
    assert_eq!(responder.pool().cursor(), 1);
}

#[tokio::test]
async fn test_server_error_rotates_and_wraps() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let responder = create_responder(&mock_server, &["key-a", "key-b", "key-c"]);

    for expected in [1, 2, 0, 1] {
        let err = responder.respond("Hello", "Be brief.").await.unwrap_err();
        assert!(matches!(
            err,
            Error::RemoteStatus {
                service: "gemini",
                status: 500
            }
        ));
        assert_eq!(responder.pool().cursor(), expected);
    }
}

#[tokio::test]
async fn test_missing_text_is_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": []
        })))
        .mount(&mock_server)
        .await;

    let responder = create_responder(&mock_server, &["key-a", "key-b"]);
    let err = responder.respond("Hello", "Be brief.").await.unwrap_err();

    assert!(matches!(err, Error::Provider(_)));
    assert_eq!(responder.pool().cursor(), 1);
}

#[tokio::test]
async fn test_malformed_json_is_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let responder = create_responder(&mock_server, &["key-a", "key-b"]);
    assert!(responder.respond("Hello", "Be brief.").await.is_err());
    assert_eq!(responder.pool().cursor(), 1);
}

#[tokio::test]
async fn test_blank_input_makes_no_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("unused")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let responder = create_responder(&mock_server, &["key-a", "key-b"]);
    let err = responder.respond("   ", "Be brief.").await.unwrap_err();

    assert!(err.is_validation());
    assert_eq!(responder.pool().cursor(), 0);
}

#[tokio::test]
async fn test_transport_error_does_not_expose_key() {
    let provider =
        GeminiProvider::new("http://127.0.0.1:9", "test-model", Duration::from_secs(2)).unwrap();
    let pool = CredentialPool::new(vec!["SECRET-KEY-123".to_string()]).unwrap();
    let responder = Responder::new(provider, pool);

    let err = responder.respond("Hello", "Be brief.").await.unwrap_err();

    assert!(matches!(err, Error::Http(_)));
    assert!(!err.to_string().contains("SECRET-KEY-123"));
}
