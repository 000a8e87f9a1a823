//! Streaming progress API: receive run events as a `Stream`.
//!
//! ## Why a stream as well as callbacks?
//!
//! A callback runs inside the session's task. Callers that render progress
//! elsewhere (another task, a websocket, a TUI loop) would otherwise have to
//! build their own channel. [`progress_channel`] does that once: it returns a
//! [`ProgressCallback`] to put in the config and a [`ProgressStream`] that
//! yields the same events in order.
//!
//! The channel is unbounded, so a slow consumer never stalls a translation
//! run. Events sent after the stream is dropped are discarded.
//!
//! # Example
//! ```rust,no_run
//! use edgequake_translate::{progress_channel, ProgressEvent, TranslationConfig};
//! use futures::StreamExt;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (callback, mut events) = progress_channel();
//! let config = TranslationConfig::builder().progress_callback(callback).build()?;
//! tokio::spawn(async move {
//!     while let Some(event) = events.next().await {
//!         if let ProgressEvent::Status(status) = event {
//!             eprintln!("{status}");
//!         }
//!     }
//! });
//! # let _ = config;
//! # Ok(())
//! # }
//! ```

use crate::progress::{ProgressCallback, StatusEvent, TranslationProgressCallback};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

/// One progress notification, mirroring [`TranslationProgressCallback`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Status(StatusEvent),
    Summary(String),
    ChunkStarted {
        chunk: usize,
        total_chunks: usize,
        first: usize,
        last: usize,
    },
    ParagraphTranslated {
        number: usize,
        text: String,
    },
    ChunkCompleted {
        chunk: usize,
        total_chunks: usize,
        translated: usize,
        total: usize,
    },
    ChunkFailed {
        chunk: usize,
        total_chunks: usize,
        error: String,
    },
    Progress(f32),
    RunCompleted {
        total_paragraphs: usize,
    },
}

/// A boxed stream of progress events.
pub type ProgressStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

struct ChannelCallback {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelCallback {
    fn send(&self, event: ProgressEvent) {
        // Receiver gone: nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl TranslationProgressCallback for ChannelCallback {
    fn on_status(&self, event: &StatusEvent) {
        self.send(ProgressEvent::Status(event.clone()));
    }

    fn on_summary(&self, summary: &str) {
        self.send(ProgressEvent::Summary(summary.to_string()));
    }

    fn on_chunk_start(&self, chunk_num: usize, total_chunks: usize, first: usize, last: usize) {
        self.send(ProgressEvent::ChunkStarted {
            chunk: chunk_num,
            total_chunks,
            first,
            last,
        });
    }

    fn on_paragraph_translated(&self, number: usize, text: &str) {
        self.send(ProgressEvent::ParagraphTranslated {
            number,
            text: text.to_string(),
        });
    }

    fn on_chunk_complete(&self, chunk_num: usize, total_chunks: usize, translated: usize, total: usize) {
        self.send(ProgressEvent::ChunkCompleted {
            chunk: chunk_num,
            total_chunks,
            translated,
            total,
        });
    }

    fn on_chunk_error(&self, chunk_num: usize, total_chunks: usize, error: &str) {
        self.send(ProgressEvent::ChunkFailed {
            chunk: chunk_num,
            total_chunks,
            error: error.to_string(),
        });
    }

    fn on_progress(&self, percent: f32) {
        self.send(ProgressEvent::Progress(percent));
    }

    fn on_run_complete(&self, total_paragraphs: usize) {
        self.send(ProgressEvent::RunCompleted { total_paragraphs });
    }
}

/// Create a callback/stream pair connected by an unbounded channel.
///
/// The stream ends once the callback (and every config clone holding it)
/// has been dropped.
pub fn progress_channel() -> (ProgressCallback, ProgressStream) {
    let (tx, rx) = unbounded_channel();
    let callback: ProgressCallback = Arc::new(ChannelCallback { tx });
    (callback, Box::pin(UnboundedReceiverStream::new(rx)))
}
