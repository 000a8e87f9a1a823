//! Translation client: the only stage with network I/O.
//!
//! [`LanguageModel`] is the seam between the run controller and the provider.
//! The session only ever sees three operations (validate the credential,
//! summarise the document, send one translation prompt) so tests can script a
//! model without an HTTP server, and another OpenAI-compatible endpoint only
//! needs a different base URL.
//!
//! ## Error Mapping
//!
//! The provider reports failures as `{"error": {"message", "type", "code"}}`.
//! The `code` (falling back to `type`) is checked first because OpenAI sends
//! `insufficient_quota` with HTTP 429, and that must not be mistaken for a
//! transient rate limit. Only then does the HTTP status decide:
//!
//! | code / status            | error                                   |
//! |--------------------------|-----------------------------------------|
//! | `insufficient_quota`     | [`TranslateError::QuotaExceeded`]       |
//! | `rate_limit_exceeded`    | [`TranslateError::RateLimited`]         |
//! | `invalid_api_key`        | [`TranslateError::CredentialInvalid`]   |
//! | `billing_not_active`     | [`TranslateError::BillingInactive`]     |
//! | 401                      | [`TranslateError::CredentialInvalid`]   |
//! | 429                      | [`TranslateError::RateLimited`]         |
//! | 5xx, connect, timeout    | [`TranslateError::TransportFailure`]    |
//! | anything else            | [`TranslateError::UnknownApiError`]     |
//!
//! No retries happen here. A failed call surfaces to the run controller,
//! which parks the chunk for an explicit retry.

use crate::config::TranslationConfig;
use crate::error::TranslateError;
use crate::prompts::{summary_prompt, SYSTEM_PROMPT};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The model operations a translation run needs.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Cheap authenticated call proving the credential works.
    async fn validate(&self) -> Result<(), TranslateError>;

    /// Summarise the whole document; the result is embedded in chunk prompts.
    async fn summarize(&self, full_text: &str) -> Result<String, TranslateError>;

    /// Send one translation prompt and return the model's raw reply.
    async fn translate(&self, prompt: &str) -> Result<String, TranslateError>;
}

/// Chat-completions client for OpenAI and compatible endpoints.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    summary_model: String,
    translation_model: String,
    temperature: f32,
    summary_max_tokens: Option<usize>,
    translation_max_tokens: Option<usize>,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("summary_model", &self.summary_model)
            .field("translation_model", &self.translation_model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    /// A string for OpenAI; some compatible providers send a number.
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ApiErrorBody {
    fn code(&self) -> Option<String> {
        match self.code.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl OpenAiClient {
    /// Build a client for `api_key` using the endpoint and model settings of
    /// `config`.
    pub fn new(api_key: &str, config: &TranslationConfig) -> Result<Self, TranslateError> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| TranslateError::CredentialInvalid {
                detail: "API key contains characters not allowed in an HTTP header".into(),
            })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(secs) = config.api_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| TranslateError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            summary_model: config.summary_model.clone(),
            translation_model: config.translation_model.clone(),
            temperature: config.temperature,
            summary_max_tokens: config.summary_max_tokens,
            translation_max_tokens: config.translation_max_tokens,
        })
    }

    async fn chat(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: Option<usize>,
    ) -> Result<String, TranslateError> {
        let start = Instant::now();
        let body = build_request(model, prompt, self.temperature, max_tokens);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify_error(Some(status), &text));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| TranslateError::UnknownApiError {
                status: Some(status.as_u16()),
                message: format!("unreadable completion body: {e}"),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TranslateError::UnknownApiError {
                status: Some(status.as_u16()),
                message: "response contained no choices".into(),
            })?;

        debug!(
            "{}: {} prompt chars → {} reply chars in {:?}",
            model,
            prompt.len(),
            content.len(),
            start.elapsed()
        );
        Ok(content)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn validate(&self) -> Result<(), TranslateError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            debug!("API credential accepted");
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        let err = classify_error(Some(status), &text);
        warn!("API credential check failed: {}", err);
        Err(err)
    }

    async fn summarize(&self, full_text: &str) -> Result<String, TranslateError> {
        self.chat(
            &self.summary_model,
            &summary_prompt(full_text),
            self.summary_max_tokens,
        )
        .await
    }

    async fn translate(&self, prompt: &str) -> Result<String, TranslateError> {
        self.chat(&self.translation_model, prompt, self.translation_max_tokens)
            .await
    }
}

fn build_request<'a>(
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: Option<usize>,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: [
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: prompt,
            },
        ],
        temperature,
        max_tokens,
    }
}

fn transport_error(e: reqwest::Error) -> TranslateError {
    TranslateError::TransportFailure {
        detail: e.to_string(),
    }
}

/// Map an error response to the variant that names its recovery action.
fn classify_error(status: Option<StatusCode>, body: &str) -> TranslateError {
    let api = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|env| env.error)
        .unwrap_or_default();

    let detail = api
        .message
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "empty error response".into())
            } else {
                trimmed.chars().take(200).collect()
            }
        });

    let code = api.code();
    match code.as_deref().or(api.kind.as_deref()) {
        Some("insufficient_quota") => return TranslateError::QuotaExceeded { detail },
        Some("rate_limit_exceeded") => return TranslateError::RateLimited { detail },
        Some("invalid_api_key") => return TranslateError::CredentialInvalid { detail },
        Some("billing_not_active") => return TranslateError::BillingInactive { detail },
        _ => {}
    }

    match status {
        Some(StatusCode::UNAUTHORIZED) => TranslateError::CredentialInvalid { detail },
        Some(StatusCode::TOO_MANY_REQUESTS) => TranslateError::RateLimited { detail },
        Some(s) if s.is_server_error() => TranslateError::TransportFailure { detail },
        other => TranslateError::UnknownApiError {
            status: other.map(|s| s.as_u16()),
            message: detail,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn request_body_omits_unset_max_tokens() {
        let body = serde_json::to_value(build_request("gpt-4o", "hola", 0.3, None)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hola");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn request_body_carries_max_tokens_when_set() {
        let body: Value =
            serde_json::to_value(build_request("gpt-4o-mini", "x", 0.3, Some(1000))).unwrap();
        assert_eq!(body["max_tokens"], json!(1000));
    }

    #[test]
    fn quota_code_wins_over_429() {
        let body = r#"{"error":{"message":"You exceeded your quota","type":"insufficient_quota","code":"insufficient_quota"}}"#;
        let err = classify_error(Some(StatusCode::TOO_MANY_REQUESTS), body);
        assert!(matches!(err, TranslateError::QuotaExceeded { ref detail } if detail == "You exceeded your quota"));
    }

    #[test]
    fn known_codes_map_to_variants() {
        let mk = |code: &str| format!(r#"{{"error":{{"message":"m","code":"{code}"}}}}"#);
        assert!(matches!(
            classify_error(Some(StatusCode::TOO_MANY_REQUESTS), &mk("rate_limit_exceeded")),
            TranslateError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_error(Some(StatusCode::UNAUTHORIZED), &mk("invalid_api_key")),
            TranslateError::CredentialInvalid { .. }
        ));
        assert!(matches!(
            classify_error(Some(StatusCode::FORBIDDEN), &mk("billing_not_active")),
            TranslateError::BillingInactive { .. }
        ));
    }

    #[test]
    fn status_fallbacks() {
        assert!(matches!(
            classify_error(Some(StatusCode::UNAUTHORIZED), ""),
            TranslateError::CredentialInvalid { .. }
        ));
        assert!(matches!(
            classify_error(Some(StatusCode::BAD_GATEWAY), "<html>bad gateway</html>"),
            TranslateError::TransportFailure { .. }
        ));
        match classify_error(Some(StatusCode::BAD_REQUEST), r#"{"error":{"message":"context too long"}}"#) {
            TranslateError::UnknownApiError { status, message } => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "context too long");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn numeric_code_keeps_provider_message() {
        let body = r#"{"error":{"message":"Upstream rate limit, slow down","code":429}}"#;
        match classify_error(Some(StatusCode::TOO_MANY_REQUESTS), body) {
            TranslateError::RateLimited { detail } => {
                assert_eq!(detail, "Upstream rate limit, slow down");
            }
            other => panic!("unexpected: {other:?}"),
        }
        let body = r#"{"error":{"message":"bad input","code":400}}"#;
        assert!(matches!(
            classify_error(Some(StatusCode::BAD_REQUEST), body),
            TranslateError::UnknownApiError { status: Some(400), ref message } if message == "bad input"
        ));
    }

    #[test]
    fn debug_hides_credential() {
        let config = TranslationConfig::default();
        let client = OpenAiClient::new("sk-very-secret", &config).unwrap();
        assert!(!format!("{client:?}").contains("sk-very-secret"));
    }

    #[test]
    fn header_unsafe_key_is_rejected() {
        let config = TranslationConfig::default();
        let err = OpenAiClient::new("sk-\nbad", &config).unwrap_err();
        assert!(matches!(err, TranslateError::CredentialInvalid { .. }));
    }
}
