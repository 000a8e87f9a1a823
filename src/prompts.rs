//! Prompt templates for summarisation and translation.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the wording of a request means
//!    editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the rendered prompts without a
//!    live API, so regressions in numbering or context layout are caught early.
//!
//! The response format requested here (`{"number", "text"}` JSON) is the
//! contract [`crate::pipeline::parse`] recovers from.

use crate::pipeline::segment::Paragraph;

/// System message sent with every chat request.
pub const SYSTEM_PROMPT: &str = "You are a professional translator. Provide accurate, context-aware translations while maintaining the original structure and formatting.";

/// Everything a chunk prompt embeds besides the paragraphs themselves.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub target_language: &'a str,
    pub custom_prompt: Option<&'a str>,
    pub summary: &'a str,
    /// Maximum characters of `summary` to embed.
    pub summary_excerpt_chars: usize,
}

/// Build the one-shot summarisation prompt for the whole document.
pub fn summary_prompt(full_text: &str) -> String {
    format!(
        "Please provide a comprehensive summary of the following document in English. \
Focus on the main themes, key points, and overall structure:\n\n{full_text}\n\nSummary:"
    )
}

/// Build the batched translation prompt for one chunk.
///
/// Context paragraphs are listed with their numbers so the model can resolve
/// references, but only the `Translate:` block is expected back.
pub fn chunk_prompt(
    ctx: &PromptContext<'_>,
    before: &[Paragraph],
    items: &[Paragraph],
    after: &[Paragraph],
) -> String {
    let instructions = match ctx.custom_prompt.map(str::trim) {
        Some(p) if !p.is_empty() => format!("Instructions: {p}\n\n"),
        _ => String::new(),
    };

    format!(
        "Translate these numbered paragraphs to {lang}. Maintain numbering and structure.\n\n\
{instructions}\n\n\
Summary: {summary}...\n\n\
Previous: {before}\n\n\
Translate: {items}\n\n\
Next: {after}\n\n\
Respond with JSON array: [{{\"number\": 1, \"text\": \"translation\"}}, ...]",
        lang = ctx.target_language,
        summary = excerpt(ctx.summary, ctx.summary_excerpt_chars),
        before = numbered_block(before),
        items = numbered_block(items),
        after = numbered_block(after),
    )
}

/// Build the single-paragraph prompt used when a chunk is too large to batch.
pub fn paragraph_prompt(target_language: &str, paragraph: &Paragraph) -> String {
    format!(
        "Translate paragraph {n} to {target_language}: \"{text}\"\n\n\
Respond with JSON: {{\"number\": {n}, \"text\": \"translation\"}}",
        n = paragraph.number,
        text = paragraph.text,
    )
}

fn numbered_block(paragraphs: &[Paragraph]) -> String {
    if paragraphs.is_empty() {
        return "None".to_string();
    }
    paragraphs
        .iter()
        .map(Paragraph::prompt_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
