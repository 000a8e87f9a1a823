//! Configuration types for chunked document translation.
//!
//! All run behaviour is controlled through [`TranslationConfig`], built via
//! its [`TranslationConfigBuilder`]. Keeping every knob in one struct makes it
//! easy to log the settings a run used and to compare two runs.
//!
//! # Design choice: builder over constructor
//! Most callers only set an API key and perhaps a custom prompt. The builder
//! lets them set only what they care about and rely on documented defaults
//! for the rest (chunk size 8, context 2, 3 s between chunks).

use crate::error::TranslateError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Default OpenAI-compatible API root (no trailing slash).
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for a translation session.
///
/// Built via [`TranslationConfig::builder()`] or using
/// [`TranslationConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_translate::TranslationConfig;
///
/// let config = TranslationConfig::builder()
///     .api_key("sk-test")
///     .target_language("English")
///     .chunk_size(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TranslationConfig {
    /// Bearer credential for the API. If None, the session falls back to the
    /// credential held in its state store.
    pub api_key: Option<String>,

    /// API root; `/models` and `/chat/completions` are appended.
    /// Default: [`DEFAULT_API_BASE_URL`].
    pub api_base_url: String,

    /// Model used for the one-per-document summary. Default: "gpt-4o-mini".
    ///
    /// The summary request carries the entire document, so it goes to the
    /// cheaper model with the higher tokens-per-minute allowance.
    pub summary_model: String,

    /// Model used for every translation request. Default: "gpt-4o".
    pub translation_model: String,

    /// Sampling temperature for all requests. Default: 0.3.
    pub temperature: f32,

    /// `max_tokens` for the summary request. Default: Some(1000).
    pub summary_max_tokens: Option<usize>,

    /// `max_tokens` for translation requests. Default: None (provider maximum).
    ///
    /// A cap here truncates long chunk replies mid-object; the parser then
    /// recovers only the complete prefix and the chunk fails as incomplete.
    pub translation_max_tokens: Option<usize>,

    /// Language every paragraph is translated into. Default: "English".
    pub target_language: String,

    /// Extra user instructions embedded in every chunk prompt.
    pub custom_prompt: Option<String>,

    /// Paragraphs per batched request. Default: 8.
    pub chunk_size: usize,

    /// Context paragraphs sent on each side of a chunk. Default: 2.
    pub context_size: usize,

    /// Estimated prompt tokens above which a chunk is translated one
    /// paragraph at a time. Default: 12000.
    pub max_prompt_tokens: usize,

    /// Characters of the document summary embedded in chunk prompts. Default: 500.
    pub summary_excerpt_chars: usize,

    /// Pause between consecutive chunks, in milliseconds. Default: 3000.
    pub inter_chunk_delay_ms: u64,

    /// Pause between per-paragraph fallback calls, in milliseconds. Default: 2000.
    pub per_paragraph_delay_ms: u64,

    /// Optional whole-request timeout in seconds. Default: None (transport defaults).
    pub api_timeout_secs: Option<u64>,

    /// Progress callback receiving status and per-chunk events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            summary_model: "gpt-4o-mini".to_string(),
            translation_model: "gpt-4o".to_string(),
            temperature: 0.3,
            summary_max_tokens: Some(1000),
            translation_max_tokens: None,
            target_language: "English".to_string(),
            custom_prompt: None,
            chunk_size: 8,
            context_size: 2,
            max_prompt_tokens: 12_000,
            summary_excerpt_chars: 500,
            inter_chunk_delay_ms: 3000,
            per_paragraph_delay_ms: 2000,
            api_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("summary_model", &self.summary_model)
            .field("translation_model", &self.translation_model)
            .field("temperature", &self.temperature)
            .field("summary_max_tokens", &self.summary_max_tokens)
            .field("translation_max_tokens", &self.translation_max_tokens)
            .field("target_language", &self.target_language)
            .field("custom_prompt", &self.custom_prompt)
            .field("chunk_size", &self.chunk_size)
            .field("context_size", &self.context_size)
            .field("max_prompt_tokens", &self.max_prompt_tokens)
            .field("inter_chunk_delay_ms", &self.inter_chunk_delay_ms)
            .field("per_paragraph_delay_ms", &self.per_paragraph_delay_ms)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn TranslationProgressCallback>"),
            )
            .finish()
    }
}

impl TranslationConfig {
    /// Create a new builder for `TranslationConfig`.
    pub fn builder() -> TranslationConfigBuilder {
        TranslationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TranslationConfig`].
#[derive(Debug)]
pub struct TranslationConfigBuilder {
    config: TranslationConfig,
}

impl TranslationConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn summary_model(mut self, model: impl Into<String>) -> Self {
        self.config.summary_model = model.into();
        self
    }

    pub fn translation_model(mut self, model: impl Into<String>) -> Self {
        self.config.translation_model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn summary_max_tokens(mut self, n: Option<usize>) -> Self {
        self.config.summary_max_tokens = n;
        self
    }

    pub fn translation_max_tokens(mut self, n: Option<usize>) -> Self {
        self.config.translation_max_tokens = n;
        self
    }

    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.config.target_language = lang.into();
        self
    }

    pub fn custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.custom_prompt = Some(prompt.into());
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n.max(1);
        self
    }

    pub fn context_size(mut self, n: usize) -> Self {
        self.config.context_size = n;
        self
    }

    pub fn max_prompt_tokens(mut self, n: usize) -> Self {
        self.config.max_prompt_tokens = n;
        self
    }

    pub fn summary_excerpt_chars(mut self, n: usize) -> Self {
        self.config.summary_excerpt_chars = n;
        self
    }

    pub fn inter_chunk_delay_ms(mut self, ms: u64) -> Self {
        self.config.inter_chunk_delay_ms = ms;
        self
    }

    pub fn per_paragraph_delay_ms(mut self, ms: u64) -> Self {
        self.config.per_paragraph_delay_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranslationConfig, TranslateError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(TranslateError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if c.max_prompt_tokens == 0 {
            return Err(TranslateError::InvalidConfig(
                "Max prompt tokens must be ≥ 1".into(),
            ));
        }
        if c.target_language.trim().is_empty() {
            return Err(TranslateError::InvalidConfig(
                "Target language must not be empty".into(),
            ));
        }
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(TranslateError::InvalidConfig(format!(
                "API base URL must be http(s), got '{}'",
                c.api_base_url
            )));
        }
        if c.translation_model.trim().is_empty() || c.summary_model.trim().is_empty() {
            return Err(TranslateError::InvalidConfig(
                "Model names must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = TranslationConfig::default();
        assert_eq!(c.chunk_size, 8);
        assert_eq!(c.context_size, 2);
        assert_eq!(c.max_prompt_tokens, 12_000);
        assert_eq!(c.inter_chunk_delay_ms, 3000);
        assert_eq!(c.per_paragraph_delay_ms, 2000);
        assert_eq!(c.summary_max_tokens, Some(1000));
        assert_eq!(c.translation_max_tokens, None);
        assert_eq!(c.summary_model, "gpt-4o-mini");
        assert_eq!(c.translation_model, "gpt-4o");
        assert!((c.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn builder_clamps_and_trims() {
        let c = TranslationConfig::builder()
            .chunk_size(0)
            .temperature(5.0)
            .api_base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(c.chunk_size, 1);
        assert!((c.temperature - 2.0).abs() < f32::EPSILON);
        assert_eq!(c.api_base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn build_rejects_bad_base_url() {
        let err = TranslationConfig::builder()
            .api_base_url("ftp://nope")
            .build()
            .unwrap_err();
        assert!(matches!(err, TranslateError::InvalidConfig(_)));
    }

    #[test]
    fn build_rejects_zero_prompt_budget() {
        assert!(TranslationConfig::builder().max_prompt_tokens(0).build().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = TranslationConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
