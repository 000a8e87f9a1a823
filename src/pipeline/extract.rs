//! Text extraction: turn a user-supplied document into plain text.
//!
//! ## Supported sources
//!
//! | Source                      | Handling                                     |
//! |-----------------------------|----------------------------------------------|
//! | `.docx` (or ZIP magic)      | raw text of `word/document.xml`              |
//! | anything else               | UTF-8 text, BOM stripped                     |
//! | `http://` / `https://` URL  | fails fast with an actionable error          |
//!
//! DOCX extraction keeps only run text. Every `<w:p>` ends with a blank line
//! so the paragraph segmenter sees the same boundaries the author did; tabs
//! and line breaks inside a paragraph are kept as `\t` and `\n`.

use crate::error::TranslateError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info};
use zip::ZipArchive;

const DOCX_BODY_PART: &str = "word/document.xml";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// A document handed to the session for translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDocument {
    /// File contents; the name decides DOCX vs. plain text.
    Bytes { name: String, bytes: Vec<u8> },
    /// Already-extracted text.
    Text { name: String, text: String },
    /// A remote document link. Not fetched.
    RemoteUrl(String),
}

impl SourceDocument {
    /// Display name used in status messages and errors.
    pub fn name(&self) -> &str {
        match self {
            SourceDocument::Bytes { name, .. } | SourceDocument::Text { name, .. } => name,
            SourceDocument::RemoteUrl(url) => url,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a CLI argument to a [`SourceDocument`].
///
/// URLs are passed through untouched so [`extract_text`] can reject them
/// with the remote-source error. Local paths are read into memory.
pub fn load_source(input: &str) -> Result<SourceDocument, TranslateError> {
    if is_url(input) {
        return Ok(SourceDocument::RemoteUrl(input.to_string()));
    }
    let path = Path::new(input);
    let bytes = std::fs::read(path).map_err(|e| TranslateError::ExtractionFailure {
        source_name: input.to_string(),
        detail: e.to_string(),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string());
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(SourceDocument::Bytes { name, bytes })
}

/// Extract the plain text of `source`.
pub fn extract_text(source: &SourceDocument) -> Result<String, TranslateError> {
    match source {
        SourceDocument::RemoteUrl(url) => Err(TranslateError::RemoteSourceUnsupported {
            url: url.clone(),
        }),
        SourceDocument::Text { text, .. } => Ok(text.clone()),
        SourceDocument::Bytes { name, bytes } => {
            let text = if is_docx(name, bytes) {
                docx_text(bytes).map_err(|detail| TranslateError::ExtractionFailure {
                    source_name: name.clone(),
                    detail,
                })?
            } else {
                plain_text(bytes).map_err(|detail| TranslateError::ExtractionFailure {
                    source_name: name.clone(),
                    detail,
                })?
            };
            info!("Extracted {} characters from {}", text.chars().count(), name);
            Ok(text)
        }
    }
}

fn is_docx(name: &str, bytes: &[u8]) -> bool {
    name.to_ascii_lowercase().ends_with(".docx") || bytes.starts_with(ZIP_MAGIC)
}

fn plain_text(bytes: &[u8]) -> Result<String, String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| format!("not a .docx and not valid UTF-8 text ({e})"))
}

fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut zip = ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a DOCX package: {e}"))?;
    let mut xml = Vec::new();
    zip.by_name(DOCX_BODY_PART)
        .map_err(|e| format!("{DOCX_BODY_PART} missing: {e}"))?
        .read_to_end(&mut xml)
        .map_err(|e| format!("reading {DOCX_BODY_PART}: {e}"))?;
    body_text(&xml)
}

/// Walk `word/document.xml`, keeping run text and paragraph boundaries.
fn body_text(xml: &[u8]) -> Result<String, String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("malformed XML at byte {}: {e}", reader.buffer_position()))?
        {
            Event::Eof => break,
            Event::Start(s) if s.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push_str("\n\n"),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" => out.push('\n'),
                b"w:p" => out.push_str("\n\n"),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| format!("bad text escape: {e}"))?;
                out.push_str(&text);
            }
            Event::CData(t) if in_text => {
                out.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("[Content_Types].xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file(DOCX_BODY_PART, SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn docx_paragraphs_become_blank_line_separated() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Hola</w:t></w:r><w:r><w:t xml:space=\"preserve\"> mundo</w:t></w:r></w:p>\
             <w:p/>\
             <w:p><w:r><w:t>Adiós &amp; gracias</w:t></w:r></w:p>",
        );
        let text = extract_text(&SourceDocument::Bytes {
            name: "book.docx".into(),
            bytes,
        })
        .unwrap();
        assert_eq!(text, "Hola mundo\n\n\n\nAdiós & gracias\n\n");
    }

    #[test]
    fn docx_tabs_and_breaks_are_kept() {
        let bytes = docx_with_body("<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p>");
        let text = docx_text(&bytes).unwrap();
        assert_eq!(text, "a\tb\nc\n\n");
    }

    #[test]
    fn docx_detected_by_magic_without_extension() {
        let bytes = docx_with_body("<w:p><w:r><w:t>x</w:t></w:r></w:p>");
        let text = extract_text(&SourceDocument::Bytes {
            name: "upload".into(),
            bytes,
        })
        .unwrap();
        assert_eq!(text.trim(), "x");
    }

    #[test]
    fn zip_without_body_part_fails() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("other.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<x/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let err = extract_text(&SourceDocument::Bytes {
            name: "broken.docx".into(),
            bytes,
        })
        .unwrap_err();
        assert!(matches!(err, TranslateError::ExtractionFailure { .. }));
    }

    #[test]
    fn plain_text_strips_bom() {
        let text = extract_text(&SourceDocument::Bytes {
            name: "notes.txt".into(),
            bytes: b"\xEF\xBB\xBFPrimero\n\nSegundo".to_vec(),
        })
        .unwrap();
        assert_eq!(text, "Primero\n\nSegundo");
    }

    #[test]
    fn invalid_utf8_fails() {
        let err = extract_text(&SourceDocument::Bytes {
            name: "blob.bin".into(),
            bytes: vec![0xff, 0xfe, 0x00],
        })
        .unwrap_err();
        assert!(matches!(err, TranslateError::ExtractionFailure { .. }));
    }

    #[test]
    fn remote_url_fails_fast() {
        let url = "https://docs.google.com/document/d/abc/edit";
        let err = extract_text(&SourceDocument::RemoteUrl(url.into())).unwrap_err();
        assert!(matches!(err, TranslateError::RemoteSourceUnsupported { .. }));
        assert!(err.to_string().contains(".docx"));
    }

    #[test]
    fn load_source_passes_urls_through() {
        let src = load_source("http://example.com/doc").unwrap();
        assert_eq!(src, SourceDocument::RemoteUrl("http://example.com/doc".into()));
    }

    #[test]
    fn load_source_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        std::fs::write(&path, "uno\n\ndos").unwrap();
        let src = load_source(path.to_str().unwrap()).unwrap();
        assert_eq!(src.name(), "in.txt");
        assert_eq!(extract_text(&src).unwrap(), "uno\n\ndos");
    }

    #[test]
    fn load_source_missing_file_fails() {
        let err = load_source("/definitely/not/here.docx").unwrap_err();
        assert!(matches!(err, TranslateError::ExtractionFailure { .. }));
    }
}
