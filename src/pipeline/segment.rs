//! Paragraph segmentation: raw extracted text → numbered paragraphs.
//!
//! A paragraph is any block of text separated from its neighbours by one or
//! more blank lines. Numbers are 1-based, assigned in source order, and never
//! change afterwards; they are the keys the model echoes back in its JSON.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One numbered paragraph of the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// 1-based position in the document.
    pub number: usize,
    /// Trimmed, non-empty paragraph text.
    pub text: String,
}

impl Paragraph {
    /// The `"<number>. <text>"` line used inside prompts.
    pub fn prompt_line(&self) -> String {
        format!("{}. {}", self.number, self.text)
    }
}

static RE_BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Split `text` on blank-line boundaries into numbered paragraphs.
///
/// Runs of blank lines (including whitespace-only lines and CRLF endings)
/// count as a single separator. Empty input yields an empty vector.
pub fn segment(text: &str) -> Vec<Paragraph> {
    RE_BLANK_LINE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(i, p)| Paragraph {
            number: i + 1,
            text: p.to_string(),
        })
        .collect()
}
