//! Progress-callback trait for status and per-chunk translation events.
//!
//! Inject an [`Arc<dyn TranslationProgressCallback>`] via
//! [`crate::config::TranslationConfigBuilder::progress_callback`] to receive
//! events as the session summarises and translates a document.
//!
//! # Why callbacks instead of channels?
//!
//! The callback is the least-invasive integration point: callers can forward
//! events to a terminal progress bar, a GUI, or a log without the library
//! knowing how the host application renders them. [`crate::stream`] offers a
//! channel-backed implementation for callers that prefer a `Stream`.
//!
//! # Example
//!
//! ```rust
//! use edgequake_translate::{TranslationProgressCallback, TranslationConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     translated: Arc<AtomicUsize>,
//! }
//!
//! impl TranslationProgressCallback for CountingCallback {
//!     fn on_paragraph_translated(&self, number: usize, _text: &str) {
//!         self.translated.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("§{number} done");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     translated: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = TranslationConfig::builder()
//!     .progress_callback(counter as Arc<dyn TranslationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Severity of a [`StatusEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusLevel::Info => "info",
            StatusLevel::Success => "success",
            StatusLevel::Error => "error",
        })
    }
}

/// One timestamped entry of the session's status stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub timestamp: DateTime<Utc>,
    pub level: StatusLevel,
    pub message: String,
}

impl StatusEvent {
    pub fn new(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Called by the session as it summarises and translates a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive strictly in document order; the
/// session never has two requests in flight.
pub trait TranslationProgressCallback: Send + Sync {
    /// Every status message, in emission order.
    fn on_status(&self, event: &StatusEvent) {
        let _ = event;
    }

    /// Called once the document summary is available (fresh run or resume).
    fn on_summary(&self, summary: &str) {
        let _ = summary;
    }

    /// Called before the first request for a chunk.
    ///
    /// # Arguments
    /// * `chunk_num`    — 1-indexed chunk within the current plan
    /// * `total_chunks` — chunks in the current plan
    /// * `first`, `last` — 1-indexed paragraph numbers covered
    fn on_chunk_start(&self, chunk_num: usize, total_chunks: usize, first: usize, last: usize) {
        let _ = (chunk_num, total_chunks, first, last);
    }

    /// Called each time a paragraph slot receives a translation.
    fn on_paragraph_translated(&self, number: usize, text: &str) {
        let _ = (number, text);
    }

    /// Called after a chunk is written and persisted.
    ///
    /// # Arguments
    /// * `translated` — filled slots across the whole document
    /// * `total`      — paragraphs in the document
    fn on_chunk_complete(&self, chunk_num: usize, total_chunks: usize, translated: usize, total: usize) {
        let _ = (chunk_num, total_chunks, translated, total);
    }

    /// Called when a chunk fails; the session is now awaiting a retry.
    fn on_chunk_error(&self, chunk_num: usize, total_chunks: usize, error: &str) {
        let _ = (chunk_num, total_chunks, error);
    }

    /// Overall progress in percent: 10 after the summary, 10–90 across chunks,
    /// 100 on completion.
    fn on_progress(&self, percent: f32) {
        let _ = percent;
    }

    /// Called once every paragraph is translated.
    fn on_run_complete(&self, total_paragraphs: usize) {
        let _ = total_paragraphs;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TranslationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TranslationConfig`].
pub type ProgressCallback = Arc<dyn TranslationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        statuses: Mutex<Vec<StatusLevel>>,
        paragraphs: AtomicUsize,
        errors: AtomicUsize,
    }

    impl TranslationProgressCallback for TrackingCallback {
        fn on_status(&self, event: &StatusEvent) {
            self.statuses.lock().unwrap().push(event.level);
        }

        fn on_paragraph_translated(&self, _number: usize, _text: &str) {
            self.paragraphs.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_error(&self, _chunk_num: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_status(&StatusEvent::new(StatusLevel::Info, "hello"));
        cb.on_summary("summary");
        cb.on_chunk_start(1, 3, 1, 8);
        cb.on_paragraph_translated(1, "x");
        cb.on_chunk_complete(1, 3, 8, 20);
        cb.on_chunk_error(2, 3, "boom");
        cb.on_progress(50.0);
        cb.on_run_complete(20);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_status(&StatusEvent::new(StatusLevel::Info, "a"));
        tracker.on_status(&StatusEvent::new(StatusLevel::Error, "b"));
        tracker.on_paragraph_translated(1, "x");
        tracker.on_paragraph_translated(2, "y");
        tracker.on_chunk_error(1, 1, "bad");

        assert_eq!(
            *tracker.statuses.lock().unwrap(),
            vec![StatusLevel::Info, StatusLevel::Error]
        );
        assert_eq!(tracker.paragraphs.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_event_display_has_level_and_message() {
        let e = StatusEvent::new(StatusLevel::Success, "Chunk 1/3 translated");
        let line = e.to_string();
        assert!(line.contains("[success]"));
        assert!(line.ends_with("Chunk 1/3 translated"));
    }

    #[test]
    fn status_level_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&StatusLevel::Success).unwrap(), "\"success\"");
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_progress(10.0);
    }
}
