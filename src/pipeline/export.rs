//! Export: render the original or translated document and pack it as a ZIP.
//!
//! Both renderings use the same layout: one `§N text` block per paragraph,
//! blocks separated by a blank line. Untranslated slots (absent or empty)
//! render as [`PENDING_PLACEHOLDER`], so a partial export still lines up
//! paragraph-for-paragraph with the original.

use crate::error::TranslateError;
use crate::pipeline::segment::Paragraph;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Text written for a paragraph that has no translation yet.
pub const PENDING_PLACEHOLDER: &str = "Translation pending...";

/// Which side of the document to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Original,
    Translated,
}

impl ExportKind {
    fn stem(self) -> &'static str {
        match self {
            ExportKind::Original => "original_document",
            ExportKind::Translated => "translated_document",
        }
    }

    /// Name of the text file inside the archive.
    pub fn entry_name(self) -> String {
        format!("{}.txt", self.stem())
    }

    /// Suggested file name for the archive itself.
    pub fn archive_name(self) -> String {
        format!("{}.zip", self.stem())
    }
}

/// Render one side of the document as `§N text` blocks.
pub fn render_document(
    kind: ExportKind,
    paragraphs: &[Paragraph],
    translations: &[Option<String>],
) -> String {
    paragraphs
        .iter()
        .map(|p| {
            let text = match kind {
                ExportKind::Original => p.text.as_str(),
                ExportKind::Translated => translations
                    .get(p.number - 1)
                    .and_then(|t| t.as_deref())
                    .filter(|t| !t.is_empty())
                    .unwrap_or(PENDING_PLACEHOLDER),
            };
            format!("§{} {}", p.number, text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Pack `content` into a single-entry ZIP archive and return its bytes.
pub fn build_archive(kind: ExportKind, content: &str) -> Result<Vec<u8>, TranslateError> {
    let fail = |e: &dyn std::fmt::Display| TranslateError::ExportFailed(e.to_string());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(kind.entry_name(), options)
        .map_err(|e| fail(&e))?;
    zip.write_all(content.as_bytes()).map_err(|e| fail(&e))?;
    let cursor = zip.finish().map_err(|e| fail(&e))?;
    Ok(cursor.into_inner())
}
