//! The translation run controller.
//!
//! A [`TranslationSession`] owns one document at a time and drives it through
//! a small state machine:
//!
//! ```text
//!            start()                 all chunks ok
//!  Idle ──▶ Summarizing ──▶ Translating ──────────────▶ Completed
//!   ▲            │              │   ▲
//!   │  stop      │ setup error  │   │ retry_chunk() ok
//!   └────────────┼──────────────┤   │
//!                ▼              ▼   │
//!              Failed       AwaitingRetry
//! ```
//!
//! ## Why sequential?
//!
//! Each chunk prompt embeds its neighbours as context, and a provider rate
//! limit is the usual failure. Sending one request at a time with a fixed
//! pause keeps the run well under the limit and guarantees that everything
//! before the first failure is translated and persisted. Session methods take
//! `&mut self`, so overlapping runs are impossible by construction.
//!
//! ## Failure isolation
//!
//! A failed chunk never aborts the document. The session parks in
//! [`RunPhase::AwaitingRetry`], keeps the chunk, and returns
//! [`TranslateError::ChunkFailed`]. [`TranslationSession::retry_chunk`]
//! re-issues exactly that chunk and then continues from the paragraph after
//! it.

use crate::config::TranslationConfig;
use crate::error::{ChunkError, TranslateError};
use crate::output::{RunOutcome, RunStats, TranslationOutput};
use crate::pipeline::client::{LanguageModel, OpenAiClient};
use crate::pipeline::export::{build_archive, render_document, ExportKind};
use crate::pipeline::extract::{extract_text, SourceDocument};
use crate::pipeline::parse::parse_translations;
use crate::pipeline::plan::{plan_chunks, Chunk};
use crate::pipeline::segment::{segment, Paragraph};
use crate::pipeline::tokens::estimate_tokens;
use crate::progress::{
    NoopProgressCallback, StatusEvent, StatusLevel, TranslationProgressCallback,
};
use crate::prompts::{chunk_prompt, paragraph_prompt, PromptContext};
use crate::state::{RunState, StateStore};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

static NOOP_CALLBACK: NoopProgressCallback = NoopProgressCallback;

/// Lifecycle of a translation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Summarizing,
    Translating,
    AwaitingRetry,
    Completed,
    Failed,
}

/// Requests that a running session stop before its next chunk.
///
/// Cloneable and `Send`, so it can be handed to a signal handler or UI
/// thread while the session is busy.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates summary, chunked translation, persistence, and retry for
/// one document.
pub struct TranslationSession {
    config: TranslationConfig,
    store: StateStore,
    model: Option<Arc<dyn LanguageModel>>,
    validated: bool,
    phase: RunPhase,
    paragraphs: Vec<Paragraph>,
    translations: Vec<Option<String>>,
    summary: String,
    custom_prompt: Option<String>,
    failed_chunk: Option<Chunk>,
    stop: StopHandle,
    stats: RunStats,
    started: Instant,
}

impl std::fmt::Debug for TranslationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationSession")
            .field("phase", &self.phase)
            .field("paragraphs", &self.paragraphs.len())
            .field("translated", &self.translated_count())
            .field("failed_chunk", &self.failed_chunk)
            .finish_non_exhaustive()
    }
}

impl TranslationSession {
    /// Create a session that talks to the configured OpenAI-compatible API.
    ///
    /// The credential is taken from `config.api_key`, falling back to the
    /// one saved in `store`. It is only required once an API call is needed.
    pub fn new(config: TranslationConfig, store: StateStore) -> Self {
        let custom_prompt = config
            .custom_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| store.custom_prompt());
        Self {
            config,
            store,
            model: None,
            validated: false,
            phase: RunPhase::Idle,
            paragraphs: Vec::new(),
            translations: Vec::new(),
            summary: String::new(),
            custom_prompt,
            failed_chunk: None,
            stop: StopHandle::default(),
            stats: RunStats::default(),
            started: Instant::now(),
        }
    }

    /// Create a session backed by a caller-supplied model.
    pub fn with_model(
        config: TranslationConfig,
        store: StateStore,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let mut session = Self::new(config, store);
        session.model = Some(model);
        session
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    pub fn translations(&self) -> &[Option<String>] {
        &self.translations
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn custom_prompt(&self) -> Option<&str> {
        self.custom_prompt.as_deref()
    }

    /// The chunk waiting for [`Self::retry_chunk`], if any.
    pub fn failed_chunk(&self) -> Option<&Chunk> {
        self.failed_chunk.as_ref()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn translated_count(&self) -> usize {
        self.translations
            .iter()
            .take(self.paragraphs.len())
            .filter(|t| t.as_deref().is_some_and(|t| !t.trim().is_empty()))
            .count()
    }

    /// 1-based number of the paragraph a resume would start from.
    pub fn next_paragraph(&self) -> Option<usize> {
        self.first_absent().map(|i| i + 1)
    }

    /// Replace the custom translation instructions used for later chunks.
    pub fn set_custom_prompt(&mut self, prompt: Option<String>) {
        self.custom_prompt = prompt.filter(|p| !p.trim().is_empty());
    }

    /// Snapshot of the current document and its translations.
    pub fn snapshot(&self) -> RunState {
        RunState::new(
            self.paragraphs.clone(),
            self.translations.clone(),
            self.summary.clone(),
            self.custom_prompt.clone().unwrap_or_default(),
        )
    }

    // ── Loading ──────────────────────────────────────────────────────────

    /// Restore the run saved in the store. Returns `false` when there is
    /// nothing (or nothing readable) to restore.
    pub fn load_saved(&mut self) -> bool {
        match self.store.load() {
            Some(state) => {
                self.apply_state(state);
                self.status(
                    StatusLevel::Info,
                    format!(
                        "Restored saved translation: {}/{} paragraphs translated",
                        self.translated_count(),
                        self.paragraphs.len()
                    ),
                );
                true
            }
            None => false,
        }
    }

    /// Restore a run from a user-supplied state file and save it as the
    /// current run.
    pub fn load_state_file(&mut self, bytes: &[u8]) -> Result<(), TranslateError> {
        let state = match StateStore::load_from_external(bytes) {
            Ok(state) => state,
            Err(e) => {
                self.status(StatusLevel::Error, e.to_string());
                return Err(e);
            }
        };
        self.apply_state(state);
        self.persist();
        self.status(
            StatusLevel::Success,
            format!(
                "State file loaded: {}/{} paragraphs translated",
                self.translated_count(),
                self.paragraphs.len()
            ),
        );
        Ok(())
    }

    fn apply_state(&mut self, mut state: RunState) {
        state.reconcile();
        if self.config.custom_prompt.is_none() && !state.custom_prompt.trim().is_empty() {
            self.custom_prompt = Some(state.custom_prompt);
        }
        self.paragraphs = state.paragraphs;
        self.translations = state.translated_paragraphs;
        self.summary = state.document_summary;
        self.failed_chunk = None;
        self.phase = RunPhase::Idle;
    }

    // ── Operations ───────────────────────────────────────────────────────

    /// Translate a new document from the beginning.
    ///
    /// The previous document stays loaded until the new one has been
    /// extracted, segmented, and summarised.
    pub async fn start(&mut self, source: SourceDocument) -> Result<RunOutcome, TranslateError> {
        self.begin_call();
        info!("Starting translation: {}", source.name());

        let model = self.validated_model().await?;

        let text = extract_text(&source).map_err(|e| self.fail(e))?;
        let paragraphs = segment(&text);
        if paragraphs.is_empty() {
            return Err(self.fail(TranslateError::EmptyDocument {
                source_name: source.name().to_string(),
            }));
        }
        self.status(
            StatusLevel::Info,
            format!("Document split into {} paragraphs", paragraphs.len()),
        );

        let full_text = paragraphs
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let summary = self.summarize(&model, &full_text).await?;

        self.translations = vec![None; paragraphs.len()];
        self.paragraphs = paragraphs;
        self.summary = summary;
        self.failed_chunk = None;
        self.stats.total_paragraphs = self.paragraphs.len();
        self.callback().on_progress(10.0);

        self.translate_from(0).await
    }

    /// Continue the loaded run from its first untranslated paragraph.
    ///
    /// A fully translated document completes immediately without any API
    /// call, credential check included.
    pub async fn resume(&mut self) -> Result<RunOutcome, TranslateError> {
        self.begin_call();
        if self.paragraphs.is_empty() {
            return Err(TranslateError::NothingToResume);
        }
        if self.translations.len() < self.paragraphs.len() {
            self.translations.resize(self.paragraphs.len(), None);
        }
        self.failed_chunk = None;
        self.stats.total_paragraphs = self.paragraphs.len();

        let Some(cursor) = self.first_absent() else {
            self.status(StatusLevel::Info, "All paragraphs are already translated");
            return Ok(self.complete());
        };

        let model = self.validated_model().await?;
        if self.summary.trim().is_empty() {
            let full_text = self
                .paragraphs
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            self.summary = self.summarize(&model, &full_text).await?;
        }

        self.status(
            StatusLevel::Info,
            format!(
                "Resuming from paragraph {} ({}/{} translated)",
                cursor + 1,
                self.translated_count(),
                self.paragraphs.len()
            ),
        );
        self.report_progress();
        self.translate_from(cursor).await
    }

    /// Re-issue the chunk that failed, then continue after it.
    pub async fn retry_chunk(&mut self) -> Result<RunOutcome, TranslateError> {
        if self.phase != RunPhase::AwaitingRetry {
            return Err(TranslateError::InvalidPhase {
                operation: "retry a chunk",
                actual: self.phase,
            });
        }
        let chunk = self
            .failed_chunk
            .clone()
            .ok_or_else(|| TranslateError::Internal("awaiting retry without a failed chunk".into()))?;

        self.begin_call();
        self.stats.total_paragraphs = self.paragraphs.len();
        self.phase = RunPhase::Translating;
        self.status(
            StatusLevel::Info,
            format!(
                "Retrying chunk {}/{} (paragraphs {}–{})",
                chunk.index + 1,
                chunk.total,
                chunk.first_number(),
                chunk.last_number()
            ),
        );

        if let Err(e) = self.run_chunk(&chunk).await {
            return Err(self.park(chunk, e));
        }
        self.failed_chunk = None;

        let next = chunk.items.end;
        if next < self.paragraphs.len() {
            self.pause(self.config.inter_chunk_delay_ms).await;
        }
        self.translate_from(next).await
    }

    /// Render and zip the original or translated document.
    pub fn export(&self, kind: ExportKind) -> Result<Vec<u8>, TranslateError> {
        if self.paragraphs.is_empty() {
            return Err(TranslateError::ExportFailed("no document loaded".into()));
        }
        build_archive(
            kind,
            &render_document(kind, &self.paragraphs, &self.translations),
        )
    }

    /// The current run as pretty JSON, loadable with [`Self::load_state_file`].
    pub fn export_state(&self) -> Result<String, TranslateError> {
        if self.paragraphs.is_empty() {
            return Err(TranslateError::ExportFailed("no document loaded".into()));
        }
        self.snapshot().to_pretty_json()
    }

    // ── Translating loop ─────────────────────────────────────────────────

    async fn translate_from(&mut self, cursor: usize) -> Result<RunOutcome, TranslateError> {
        self.phase = RunPhase::Translating;
        let chunks = plan_chunks(
            &self.paragraphs,
            cursor,
            self.config.chunk_size,
            self.config.context_size,
        );
        debug!(
            "Planned {} chunks from paragraph {} (chunk size {}, context {})",
            chunks.len(),
            cursor + 1,
            self.config.chunk_size,
            self.config.context_size
        );

        for chunk in chunks {
            if self.stop.take() {
                self.phase = RunPhase::Idle;
                let next_paragraph = chunk.first_number();
                self.status(
                    StatusLevel::Info,
                    format!("Stopped before paragraph {next_paragraph}; resume to continue"),
                );
                return Ok(RunOutcome::Stopped {
                    next_paragraph,
                    stats: self.finish_stats(),
                });
            }

            if let Err(e) = self.run_chunk(&chunk).await {
                return Err(self.park(chunk, e));
            }

            if !chunk.is_last() {
                self.pause(self.config.inter_chunk_delay_ms).await;
            }
        }

        Ok(self.complete())
    }

    /// Translate one chunk and persist. Slots written before a failure stay
    /// written and are persisted too.
    async fn run_chunk(&mut self, chunk: &Chunk) -> Result<(), TranslateError> {
        let model = self.model()?;
        let chunk_num = chunk.index + 1;
        self.callback()
            .on_chunk_start(chunk_num, chunk.total, chunk.first_number(), chunk.last_number());
        self.status(
            StatusLevel::Info,
            format!(
                "Translating chunk {}/{} (paragraphs {}–{})",
                chunk_num,
                chunk.total,
                chunk.first_number(),
                chunk.last_number()
            ),
        );

        let filled_before = self.translated_count();
        let result = self.request_chunk(&model, chunk).await.and_then(|()| {
            let missing: Vec<usize> = chunk
                .items
                .clone()
                .filter(|&i| !self.slot_filled(i))
                .map(|i| i + 1)
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(TranslateError::MissingTranslations { missing })
            }
        });

        let filled_now = self.translated_count();
        self.stats.translated_this_run += filled_now.saturating_sub(filled_before);

        match result {
            Ok(()) => {
                self.persist();
                self.stats.chunks_completed += 1;
                self.callback()
                    .on_chunk_complete(chunk_num, chunk.total, filled_now, self.paragraphs.len());
                self.report_progress();
                self.status(
                    StatusLevel::Success,
                    format!("Chunk {}/{} translated", chunk_num, chunk.total),
                );
                Ok(())
            }
            Err(e) => {
                if filled_now > filled_before {
                    self.persist();
                }
                Err(e)
            }
        }
    }

    async fn request_chunk(
        &mut self,
        model: &Arc<dyn LanguageModel>,
        chunk: &Chunk,
    ) -> Result<(), TranslateError> {
        let prompt = {
            let ctx = PromptContext {
                target_language: &self.config.target_language,
                custom_prompt: self.custom_prompt.as_deref(),
                summary: &self.summary,
                summary_excerpt_chars: self.config.summary_excerpt_chars,
            };
            chunk_prompt(
                &ctx,
                chunk.before(&self.paragraphs),
                chunk.items(&self.paragraphs),
                chunk.after(&self.paragraphs),
            )
        };

        let estimated = estimate_tokens(&prompt);
        if estimated <= self.config.max_prompt_tokens {
            debug!("Chunk {} prompt ≈ {} tokens", chunk.index + 1, estimated);
            self.stats.api_calls += 1;
            let raw = model.translate(&prompt).await?;
            for t in parse_translations(&raw)? {
                self.write_slot(t.number, &t.text);
            }
            return Ok(());
        }

        self.stats.oversized_chunks += 1;
        self.status(
            StatusLevel::Info,
            format!(
                "Chunk {} is too large (≈{} tokens), translating paragraph by paragraph",
                chunk.index + 1,
                estimated
            ),
        );
        let items = chunk.items(&self.paragraphs).to_vec();
        for (k, paragraph) in items.iter().enumerate() {
            if k > 0 {
                self.pause(self.config.per_paragraph_delay_ms).await;
            }
            self.stats.api_calls += 1;
            let raw = model
                .translate(&paragraph_prompt(&self.config.target_language, paragraph))
                .await?;
            let parsed = parse_translations(&raw)?;
            // A lone object is taken as this paragraph even if the model
            // renumbered it.
            let text = match parsed.iter().find(|t| t.number == paragraph.number) {
                Some(t) => Some(&t.text),
                None if parsed.len() == 1 => Some(&parsed[0].text),
                None => None,
            };
            if let Some(text) = text {
                self.write_slot(paragraph.number, text);
            }
        }
        Ok(())
    }

    /// Store a translation for paragraph `number` (1-based).
    fn write_slot(&mut self, number: usize, text: &str) {
        if number == 0 || number > self.paragraphs.len() {
            warn!(
                "Ignoring translation for paragraph {} (document has {})",
                number,
                self.paragraphs.len()
            );
            return;
        }
        if text.trim().is_empty() {
            debug!("Ignoring empty translation for paragraph {}", number);
            return;
        }
        self.translations[number - 1] = Some(text.to_string());
        self.callback().on_paragraph_translated(number, text);
    }

    /// Move to `AwaitingRetry` holding `chunk`, and wrap the cause.
    fn park(&mut self, chunk: Chunk, cause: TranslateError) -> TranslateError {
        self.phase = RunPhase::AwaitingRetry;
        let message = format!(
            "Chunk {}/{} (paragraphs {}–{}) failed: {}",
            chunk.index + 1,
            chunk.total,
            chunk.first_number(),
            chunk.last_number(),
            cause
        );
        self.callback()
            .on_chunk_error(chunk.index + 1, chunk.total, &cause.to_string());
        self.status(StatusLevel::Error, message);
        self.failed_chunk = Some(chunk.clone());
        ChunkError {
            chunk,
            source: cause,
        }
        .into()
    }

    fn complete(&mut self) -> RunOutcome {
        self.phase = RunPhase::Completed;
        self.persist();
        self.callback().on_progress(100.0);
        self.callback().on_run_complete(self.paragraphs.len());
        self.status(StatusLevel::Success, "Translation complete!");

        RunOutcome::Completed(TranslationOutput {
            summary: self.summary.clone(),
            paragraphs: self.paragraphs.clone(),
            translations: self
                .translations
                .iter()
                .take(self.paragraphs.len())
                .map(|t| t.clone().unwrap_or_default())
                .collect(),
            stats: self.finish_stats(),
        })
    }

    // ── Model access ─────────────────────────────────────────────────────

    fn model(&mut self) -> Result<Arc<dyn LanguageModel>, TranslateError> {
        if let Some(model) = &self.model {
            return Ok(Arc::clone(model));
        }
        let key = self
            .config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.store.credential())
            .ok_or(TranslateError::MissingCredential)?;
        let client: Arc<dyn LanguageModel> = Arc::new(OpenAiClient::new(&key, &self.config)?);
        self.model = Some(Arc::clone(&client));
        Ok(client)
    }

    /// The model, after a one-time credential check for this session.
    async fn validated_model(&mut self) -> Result<Arc<dyn LanguageModel>, TranslateError> {
        let model = self.model().map_err(|e| self.fail(e))?;
        if !self.validated {
            self.status(StatusLevel::Info, "Validating API key...");
            model.validate().await.map_err(|e| self.fail(e))?;
            self.validated = true;
            self.status(StatusLevel::Success, "API key validated");
        }
        Ok(model)
    }

    async fn summarize(
        &mut self,
        model: &Arc<dyn LanguageModel>,
        full_text: &str,
    ) -> Result<String, TranslateError> {
        self.phase = RunPhase::Summarizing;
        self.status(
            StatusLevel::Info,
            format!(
                "Estimated document size: {} tokens",
                estimate_tokens(full_text)
            ),
        );
        self.status(StatusLevel::Info, "Generating document summary...");
        self.stats.api_calls += 1;
        let summary = model
            .summarize(full_text)
            .await
            .map_err(|e| self.fail(e))?
            .trim()
            .to_string();
        self.callback().on_summary(&summary);
        self.status(StatusLevel::Success, "Document summary generated");
        Ok(summary)
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn begin_call(&mut self) {
        self.stop.clear();
        self.stats = RunStats::default();
        self.started = Instant::now();
    }

    fn finish_stats(&mut self) -> RunStats {
        self.stats.duration_ms = self.started.elapsed().as_millis() as u64;
        self.stats.clone()
    }

    /// Record an unrecoverable setup error.
    fn fail(&mut self, e: TranslateError) -> TranslateError {
        self.phase = RunPhase::Failed;
        self.status(StatusLevel::Error, e.to_string());
        e
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.snapshot()) {
            self.status(
                StatusLevel::Error,
                format!("Could not save progress (translation continues): {e}"),
            );
        }
    }

    fn first_absent(&self) -> Option<usize> {
        (0..self.paragraphs.len()).find(|&i| !self.slot_filled(i))
    }

    fn slot_filled(&self, index: usize) -> bool {
        self.translations
            .get(index)
            .and_then(|t| t.as_deref())
            .is_some_and(|t| !t.trim().is_empty())
    }

    fn report_progress(&self) {
        let total = self.paragraphs.len().max(1) as f32;
        let done = self.translated_count() as f32;
        self.callback().on_progress(10.0 + done / total * 80.0);
    }

    async fn pause(&self, ms: u64) {
        if ms > 0 {
            sleep(Duration::from_millis(ms)).await;
        }
    }

    fn callback(&self) -> &dyn TranslationProgressCallback {
        match self.config.progress_callback.as_deref() {
            Some(cb) => cb,
            None => &NOOP_CALLBACK,
        }
    }

    fn status(&self, level: StatusLevel, message: impl Into<String>) {
        let event = StatusEvent::new(level, message);
        match level {
            StatusLevel::Error => error!("{}", event.message),
            _ => info!("{}", event.message),
        }
        self.callback().on_status(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_handle_is_shared_and_consumed_once() {
        let a = StopHandle::default();
        let b = a.clone();
        b.stop();
        assert!(a.is_stop_requested());
        assert!(a.take());
        assert!(!b.is_stop_requested());
        assert!(!a.take());
    }

    #[test]
    fn new_session_is_idle_and_empty() {
        let session = TranslationSession::new(TranslationConfig::default(), StateStore::in_memory());
        assert_eq!(session.phase(), RunPhase::Idle);
        assert!(session.paragraphs().is_empty());
        assert!(session.failed_chunk().is_none());
        assert_eq!(session.next_paragraph(), None);
    }

    #[test]
    fn custom_prompt_falls_back_to_store() {
        let store = StateStore::in_memory();
        store.set_custom_prompt("Use British spelling").unwrap();
        let session = TranslationSession::new(TranslationConfig::default(), store.clone());
        assert_eq!(session.custom_prompt(), Some("Use British spelling"));

        let config = TranslationConfig::builder()
            .custom_prompt("Keep names")
            .build()
            .unwrap();
        let session = TranslationSession::new(config, store);
        assert_eq!(session.custom_prompt(), Some("Keep names"));
    }

    #[test]
    fn export_without_document_fails() {
        let session = TranslationSession::new(TranslationConfig::default(), StateStore::in_memory());
        assert!(matches!(
            session.export(ExportKind::Original),
            Err(TranslateError::ExportFailed(_))
        ));
        assert!(session.export_state().is_err());
    }

    #[test]
    fn load_state_file_restores_and_persists() {
        let store = StateStore::in_memory();
        let mut session = TranslationSession::new(TranslationConfig::default(), store.clone());
        let json = r#"{"paragraphs":[{"number":1,"text":"Hola"},{"number":2,"text":"Adiós"}],
            "translatedParagraphs":["Hello",null],"documentSummary":"Greetings",
            "customPrompt":"Be brief","timestamp":1}"#;
        session.load_state_file(json.as_bytes()).unwrap();
        assert_eq!(session.paragraphs().len(), 2);
        assert_eq!(session.next_paragraph(), Some(2));
        assert_eq!(session.summary(), "Greetings");
        assert_eq!(session.custom_prompt(), Some("Be brief"));
        assert_eq!(store.load().unwrap().translated_paragraphs[0].as_deref(), Some("Hello"));
    }

    #[test]
    fn loaded_state_prompt_overrides_stored_default_but_not_config() {
        let json = r#"{"paragraphs":[{"number":1,"text":"Hola"}],"customPrompt":"From state","timestamp":1}"#;
        let store = StateStore::in_memory();
        store.set_custom_prompt("Stored default").unwrap();

        let mut session = TranslationSession::new(TranslationConfig::default(), store.clone());
        assert_eq!(session.custom_prompt(), Some("Stored default"));
        session.load_state_file(json.as_bytes()).unwrap();
        assert_eq!(session.custom_prompt(), Some("From state"));

        let config = TranslationConfig::builder()
            .custom_prompt("From flag")
            .build()
            .unwrap();
        let mut session = TranslationSession::new(config, store);
        session.load_state_file(json.as_bytes()).unwrap();
        assert_eq!(session.custom_prompt(), Some("From flag"));
    }

    #[test]
    fn load_state_file_rejects_garbage() {
        let mut session = TranslationSession::new(TranslationConfig::default(), StateStore::in_memory());
        let err = session.load_state_file(b"[]").unwrap_err();
        assert!(matches!(err, TranslateError::InvalidStateFile { .. }));
        assert!(session.paragraphs().is_empty());
    }

    #[tokio::test]
    async fn retry_outside_awaiting_retry_is_rejected() {
        let mut session = TranslationSession::new(TranslationConfig::default(), StateStore::in_memory());
        let err = session.retry_chunk().await.unwrap_err();
        assert!(matches!(
            err,
            TranslateError::InvalidPhase {
                actual: RunPhase::Idle,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn start_without_credential_fails_before_any_state_change() {
        let mut session = TranslationSession::new(TranslationConfig::default(), StateStore::in_memory());
        let err = session
            .start(SourceDocument::Text {
                name: "doc.txt".into(),
                text: "Hola".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::MissingCredential));
        assert_eq!(session.phase(), RunPhase::Failed);
        assert!(session.paragraphs().is_empty());
        assert!(session.store().load().is_none());
    }
}
