//! Error types for the edgequake-translate library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TranslateError`] — the operation cannot proceed (credential rejected,
//!   unreadable document, corrupt state file) or an API call failed. Returned
//!   as `Err(TranslateError)` from every fallible entry point.
//!
//! * [`ChunkError`] — a single chunk failed mid-run. Everything translated
//!   before it is already persisted; the error carries the chunk's paragraph
//!   range and context windows so exactly that chunk can be retried with
//!   [`crate::session::TranslationSession::retry_chunk`].
//!
//! API failures are split by recovery action: wait (`RateLimited`), fix
//! billing (`QuotaExceeded`, `BillingInactive`), fix the key
//! (`CredentialInvalid`), or check the network (`TransportFailure`).

use crate::pipeline::plan::Chunk;
use crate::session::RunPhase;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-translate library.
#[derive(Debug, Error)]
pub enum TranslateError {
    // ── Credential errors ─────────────────────────────────────────────────
    /// No API key was configured or stored.
    #[error("No API key configured.\nPass --api-key, set OPENAI_API_KEY, or store one with `doctranslate key`.")]
    MissingCredential,

    /// The provider rejected the API key.
    #[error("Invalid API key: {detail}\nCheck the key in your OpenAI account settings.")]
    CredentialInvalid { detail: String },

    // ── Provider account errors ───────────────────────────────────────────
    /// The account has run out of quota.
    #[error("Billing quota exceeded: {detail}\nCheck your OpenAI account billing and add a payment method.")]
    QuotaExceeded { detail: String },

    /// HTTP 429 / `rate_limit_exceeded` — wait before retrying.
    #[error("Rate limit exceeded: {detail}\nWait a moment, then retry.")]
    RateLimited { detail: String },

    /// Billing is not active on the account.
    #[error("Billing not active: {detail}\nAdd a payment method to your OpenAI account.")]
    BillingInactive { detail: String },

    // ── Transport / API errors ────────────────────────────────────────────
    /// Network failure or HTTP 5xx from the provider.
    #[error("Transport failure talking to the LLM API: {detail}\nCheck your internet connection and retry.")]
    TransportFailure { detail: String },

    /// Any other error reported by the provider, message carried verbatim.
    #[error("LLM API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    UnknownApiError {
        status: Option<u16>,
        message: String,
    },

    // ── Document errors ───────────────────────────────────────────────────
    /// The supplied document could not be read as text.
    #[error("Failed to extract text from '{source_name}': {detail}")]
    ExtractionFailure { source_name: String, detail: String },

    /// A remote document URL was supplied; fetching is not supported.
    #[error(
        "Remote documents are not supported: '{url}'\n\
Download the document first (File → Download → Microsoft Word (.docx) for Google Docs)\n\
and pass the local .docx or .txt file instead."
    )]
    RemoteSourceUnsupported { url: String },

    /// Extraction succeeded but produced no paragraphs.
    #[error("Document '{source_name}' contains no paragraphs to translate")]
    EmptyDocument { source_name: String },

    // ── Response errors ───────────────────────────────────────────────────
    /// The model response could not be recovered as `{number, text}` JSON.
    #[error("Failed to parse translation response: {detail}\nResponse began with: {excerpt:?}")]
    ParseFailure { detail: String, excerpt: String },

    /// The response parsed, but some of the chunk's paragraphs were missing.
    #[error("Response omitted paragraph(s) {}", join_numbers(.missing))]
    MissingTranslations { missing: Vec<usize> },

    // ── State errors ──────────────────────────────────────────────────────
    /// A state blob is not a recognisable saved run.
    #[error("Invalid state file: {detail}")]
    InvalidStateFile { detail: String },

    /// `resume` was called with no paragraphs loaded.
    #[error("No saved state to resume from.\nStart a new translation or load a state file.")]
    NothingToResume,

    /// An operation was called in the wrong phase.
    #[error("Cannot {operation} while the run is {actual:?}")]
    InvalidPhase {
        operation: &'static str,
        actual: RunPhase,
    },

    /// Reading or writing the persistence directory failed.
    #[error("Storage failure at '{}': {source}", .path.display())]
    StorageFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Building an export archive failed.
    #[error("Failed to build export archive: {0}")]
    ExportFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Chunk errors ──────────────────────────────────────────────────────
    /// A chunk failed; the run is waiting for an explicit retry.
    #[error(transparent)]
    ChunkFailed(Box<ChunkError>),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TranslateError {
    /// True for errors raised by the provider account or credential, where
    /// retrying without user action cannot succeed.
    pub fn needs_user_action(&self) -> bool {
        match self {
            TranslateError::MissingCredential
            | TranslateError::CredentialInvalid { .. }
            | TranslateError::QuotaExceeded { .. }
            | TranslateError::BillingInactive { .. } => true,
            TranslateError::ChunkFailed(e) => e.source.needs_user_action(),
            _ => false,
        }
    }

    /// The failed chunk, if this error came from the translating loop.
    pub fn chunk(&self) -> Option<&ChunkError> {
        match self {
            TranslateError::ChunkFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChunkError> for TranslateError {
    fn from(e: ChunkError) -> Self {
        TranslateError::ChunkFailed(Box::new(e))
    }
}

/// A single chunk failed during the translating loop.
///
/// Holds everything needed to re-issue the same request: the chunk's item
/// range and its before/after context windows.
#[derive(Debug, Error)]
#[error(
    "Chunk {}/{} (paragraphs {}–{}) failed: {source}",
    .chunk.index + 1,
    .chunk.total,
    .chunk.first_number(),
    .chunk.last_number()
)]
pub struct ChunkError {
    pub chunk: Chunk,
    #[source]
    pub source: TranslateError,
}

fn join_numbers(numbers: &[usize]) -> String {
    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_api_error_display_with_status() {
        let e = TranslateError::UnknownApiError {
            status: Some(400),
            message: "model not found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 400"), "got: {msg}");
        assert!(msg.contains("model not found"));
    }

    #[test]
    fn unknown_api_error_display_without_status() {
        let e = TranslateError::UnknownApiError {
            status: None,
            message: "no choices".into(),
        };
        assert!(!e.to_string().contains("HTTP"));
    }

    #[test]
    fn account_errors_have_distinct_guidance() {
        let quota = TranslateError::QuotaExceeded { detail: "x".into() }.to_string();
        let rate = TranslateError::RateLimited { detail: "x".into() }.to_string();
        let key = TranslateError::CredentialInvalid { detail: "x".into() }.to_string();
        assert!(quota.contains("billing"));
        assert!(rate.contains("Wait"));
        assert!(key.contains("key"));
        assert_ne!(quota, rate);
    }

    #[test]
    fn chunk_error_display_names_range() {
        let chunk = Chunk {
            index: 2,
            total: 5,
            items: 16..24,
            context_before: 14..16,
            context_after: 24..26,
        };
        let e: TranslateError = ChunkError {
            chunk,
            source: TranslateError::TransportFailure {
                detail: "connection reset".into(),
            },
        }
        .into();
        let msg = e.to_string();
        assert!(msg.contains("Chunk 3/5"), "got: {msg}");
        assert!(msg.contains("17–24"), "got: {msg}");
        assert!(e.chunk().is_some());
        assert!(!e.needs_user_action());
    }

    #[test]
    fn missing_translations_lists_numbers() {
        let e = TranslateError::MissingTranslations {
            missing: vec![3, 7],
        };
        assert!(e.to_string().contains("3, 7"));
    }

    #[test]
    fn quota_needs_user_action() {
        assert!(TranslateError::QuotaExceeded { detail: String::new() }.needs_user_action());
        assert!(!TranslateError::RateLimited { detail: String::new() }.needs_user_action());
    }
}
