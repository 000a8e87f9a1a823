//! HTTP-level tests for `OpenAiClient` against a local mock server.

use edgequake_translate::{LanguageModel, OpenAiClient, TranslateError, TranslationConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OpenAiClient {
    let config = TranslationConfig::builder()
        .api_base_url(server.uri())
        .build()
        .unwrap();
    OpenAiClient::new("sk-test", &config).unwrap()
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn api_error(status: u16, message: &str, code: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": {"message": message, "type": code, "code": code}
    }))
}

#[tokio::test]
async fn validate_lists_models_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server).validate().await.unwrap();
}

#[tokio::test]
async fn validate_maps_rejected_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(api_error(401, "Incorrect API key provided", "invalid_api_key"))
        .mount(&server)
        .await;

    let err = client_for(&server).validate().await.unwrap_err();
    assert!(matches!(err, TranslateError::CredentialInvalid { ref detail } if detail.contains("Incorrect")));
}

#[tokio::test]
async fn translate_posts_chat_completion_with_translation_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system"},
                {"role": "user", "content": "Translate: 1. Hola"}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(r#"[{"number": 1, "text": "Hello"}]"#)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server)
        .translate("Translate: 1. Hola")
        .await
        .unwrap();
    assert_eq!(reply, r#"[{"number": 1, "text": "Hello"}]"#);
}

#[tokio::test]
async fn summarize_uses_summary_model_and_token_cap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 1000})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("A short novel.")))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client_for(&server).summarize("Érase una vez").await.unwrap();
    assert_eq!(summary, "A short novel.");
}

#[tokio::test]
async fn quota_exhaustion_is_not_reported_as_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(api_error(429, "You exceeded your current quota", "insufficient_quota"))
        .mount(&server)
        .await;

    let err = client_for(&server).translate("x").await.unwrap_err();
    assert!(matches!(err, TranslateError::QuotaExceeded { .. }));
    assert!(err.needs_user_action());
}

#[tokio::test]
async fn plain_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = client_for(&server).translate("x").await.unwrap_err();
    assert!(matches!(err, TranslateError::RateLimited { ref detail } if detail == "slow down"));
}

#[tokio::test]
async fn inactive_billing_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(api_error(403, "Billing is not active", "billing_not_active"))
        .mount(&server)
        .await;

    let err = client_for(&server).translate("x").await.unwrap_err();
    assert!(matches!(err, TranslateError::BillingInactive { .. }));
}

#[tokio::test]
async fn server_error_is_a_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server).translate("x").await.unwrap_err();
    assert!(matches!(err, TranslateError::TransportFailure { .. }));
}

#[tokio::test]
async fn unrecognised_error_keeps_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(api_error(400, "model not found", "model_not_found"))
        .mount(&server)
        .await;

    match client_for(&server).translate("x").await.unwrap_err() {
        TranslateError::UnknownApiError { status, message } => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "model not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn empty_choices_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client_for(&server).translate("x").await.unwrap_err();
    assert!(matches!(err, TranslateError::UnknownApiError { status: Some(200), .. }));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_failure() {
    // Bind then release a port so nothing is listening on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = TranslationConfig::builder()
        .api_base_url(format!("http://127.0.0.1:{port}"))
        .build()
        .unwrap();
    let client = OpenAiClient::new("sk-test", &config).unwrap();
    let err = client.translate("x").await.unwrap_err();
    assert!(matches!(err, TranslateError::TransportFailure { .. }));
}
