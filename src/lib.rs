//! # edgequake-translate
//!
//! Translate long documents paragraph by paragraph through a chat-completion
//! LLM API, with resumable progress and per-chunk retry.
//!
//! ## Why this crate?
//!
//! Sending a whole book to a model in one request fails in predictable ways:
//! the reply is cut off at the output limit, the request trips a rate limit,
//! and one error throws away every paragraph already translated. This crate
//! splits the document into numbered paragraphs, translates them in small
//! batches with their neighbours as context, saves after every batch, and
//! parks on the first failure so exactly that batch can be retried.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .docx / .txt
//!  │
//!  ├─ 1. Extract   raw text (word/document.xml or UTF-8)
//!  ├─ 2. Segment   blank-line paragraphs, numbered §1..§N
//!  ├─ 3. Summary   one call to the summary model
//!  ├─ 4. Plan      chunks of 8 with 2 context paragraphs each side
//!  ├─ 5. Translate one call per chunk (per paragraph if oversized)
//!  ├─ 6. Parse     repair and read the {number, text} JSON reply
//!  ├─ 7. Persist   run state saved after every chunk
//!  └─ 8. Export    §N text, zipped
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_translate::{
//!     RunOutcome, SourceDocument, StateStore, FileStore, TranslationConfig, TranslationSession,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TranslationConfig::builder()
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .target_language("English")
//!         .build()?;
//!     let store = StateStore::new(FileStore::open(".doctranslate")?);
//!     let mut session = TranslationSession::new(config, store);
//!
//!     let source = SourceDocument::Bytes {
//!         name: "novela.docx".into(),
//!         bytes: std::fs::read("novela.docx")?,
//!     };
//!     match session.start(source).await {
//!         Ok(RunOutcome::Completed(output)) => println!("{}", output.translated_text()),
//!         Ok(RunOutcome::Stopped { next_paragraph, .. }) => {
//!             eprintln!("stopped; resume at §{next_paragraph}")
//!         }
//!         Err(e) if e.chunk().is_some() => {
//!             eprintln!("{e}");
//!             session.retry_chunk().await?;
//!         }
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doctranslate` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-translate = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod state;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{TranslationConfig, TranslationConfigBuilder};
pub use error::{ChunkError, TranslateError};
pub use output::{RunOutcome, RunStats, TranslationOutput};
pub use pipeline::client::{LanguageModel, OpenAiClient};
pub use pipeline::export::ExportKind;
pub use pipeline::extract::{extract_text, load_source, SourceDocument};
pub use pipeline::parse::{parse_translations, TranslatedParagraph};
pub use pipeline::plan::{plan_chunks, Chunk};
pub use pipeline::segment::{segment, Paragraph};
pub use pipeline::tokens::estimate_tokens;
pub use progress::{
    NoopProgressCallback, ProgressCallback, StatusEvent, StatusLevel, TranslationProgressCallback,
};
pub use session::{RunPhase, StopHandle, TranslationSession};
pub use state::{FileStore, KeyValueStore, MemoryStore, RunState, StateStore, StorageKey};
pub use stream::{progress_channel, ProgressEvent, ProgressStream};
