//! Result types returned by a translation run.

use crate::pipeline::export::{render_document, ExportKind};
use crate::pipeline::segment::Paragraph;
use serde::Serialize;

/// Counters for one call to `start`, `resume`, or `retry_chunk`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Paragraphs in the document.
    pub total_paragraphs: usize,
    /// Slots filled during this call.
    pub translated_this_run: usize,
    /// Chunks that completed during this call.
    pub chunks_completed: usize,
    /// Summary and translation requests sent (validation excluded).
    pub api_calls: usize,
    /// Chunks that fell back to one request per paragraph.
    pub oversized_chunks: usize,
    /// Wall-clock time of the call.
    pub duration_ms: u64,
}

/// A fully translated document.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationOutput {
    pub summary: String,
    pub paragraphs: Vec<Paragraph>,
    /// One translation per paragraph, same order.
    pub translations: Vec<String>,
    pub stats: RunStats,
}

impl TranslationOutput {
    /// The translated document in `§N text` layout.
    pub fn translated_text(&self) -> String {
        let slots: Vec<Option<String>> = self.translations.iter().cloned().map(Some).collect();
        render_document(ExportKind::Translated, &self.paragraphs, &slots)
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every paragraph has a translation.
    Completed(TranslationOutput),
    /// A stop was requested; the run can be resumed at `next_paragraph`
    /// (1-based).
    Stopped { next_paragraph: usize, stats: RunStats },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn stats(&self) -> &RunStats {
        match self {
            RunOutcome::Completed(out) => &out.stats,
            RunOutcome::Stopped { stats, .. } => stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translated_text_uses_section_markers() {
        let out = TranslationOutput {
            summary: String::new(),
            paragraphs: vec![
                Paragraph { number: 1, text: "Hola".into() },
                Paragraph { number: 2, text: "Adiós".into() },
            ],
            translations: vec!["Hello".into(), "Goodbye".into()],
            stats: RunStats::default(),
        };
        assert_eq!(out.translated_text(), "§1 Hello\n\n§2 Goodbye");
        assert!(RunOutcome::Completed(out).is_completed());
    }

    #[test]
    fn stopped_outcome_exposes_stats() {
        let outcome = RunOutcome::Stopped {
            next_paragraph: 9,
            stats: RunStats {
                chunks_completed: 1,
                ..Default::default()
            },
        };
        assert!(!outcome.is_completed());
        assert_eq!(outcome.stats().chunks_completed, 1);
    }
}
