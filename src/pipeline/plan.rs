//! Chunk planning: partition the paragraph sequence into context-aware batches.
//!
//! Each [`Chunk`] is a contiguous run of at most `chunk_size` paragraphs plus
//! up to `context_size` neighbours on either side. The neighbours are sent to
//! the model as read-only context so pronouns and references that cross a
//! chunk boundary resolve the same way they would in the full document.
//!
//! Chunks hold index ranges rather than borrowed paragraphs so a failed chunk
//! can be stored inside an error and re-issued later without lifetimes.

use crate::pipeline::segment::Paragraph;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One planned batch over a paragraph slice (0-based index ranges).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position of this chunk within its plan.
    pub index: usize,
    /// Number of chunks in the plan this chunk belongs to.
    pub total: usize,
    /// Paragraphs to translate.
    pub items: Range<usize>,
    /// Preceding context, immediately before `items`.
    pub context_before: Range<usize>,
    /// Following context, immediately after `items`.
    pub context_after: Range<usize>,
}

impl Chunk {
    /// 1-based paragraph number of the first item.
    pub fn first_number(&self) -> usize {
        self.items.start + 1
    }

    /// 1-based paragraph number of the last item.
    pub fn last_number(&self) -> usize {
        self.items.end
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }

    pub fn items<'a>(&self, paragraphs: &'a [Paragraph]) -> &'a [Paragraph] {
        &paragraphs[self.items.clone()]
    }

    pub fn before<'a>(&self, paragraphs: &'a [Paragraph]) -> &'a [Paragraph] {
        &paragraphs[self.context_before.clone()]
    }

    pub fn after<'a>(&self, paragraphs: &'a [Paragraph]) -> &'a [Paragraph] {
        &paragraphs[self.context_after.clone()]
    }
}

/// Plan the chunks covering `[cursor, paragraphs.len())`.
///
/// The result is a pure function of its inputs: planning twice from the same
/// cursor yields identical boundaries. A cursor at or past the end yields no
/// chunks. `chunk_size` of 0 is treated as 1.
pub fn plan_chunks(
    paragraphs: &[Paragraph],
    cursor: usize,
    chunk_size: usize,
    context_size: usize,
) -> Vec<Chunk> {
    let len = paragraphs.len();
    let chunk_size = chunk_size.max(1);
    let remaining = len.saturating_sub(cursor);
    let total = remaining.div_ceil(chunk_size);

    (0..total)
        .map(|index| {
            let start = cursor + index * chunk_size;
            let end = (start + chunk_size).min(len);
            Chunk {
                index,
                total,
                items: start..end,
                context_before: start.saturating_sub(context_size)..start,
                context_after: end..(end + context_size).min(len),
            }
        })
        .collect()
}
