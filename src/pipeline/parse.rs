//! Response parsing: recover `{number, text}` pairs from model output.
//!
//! ## Why is repair necessary?
//!
//! The prompt asks for a bare JSON array, but chat models regularly:
//!
//! - wrap the array in a ```` ```json ```` fence
//! - append a sentence of commentary after the closing bracket
//! - stop mid-object when the reply hits the provider's output limit
//! - leave a dangling comma after the last object
//!
//! Each quirk has one repair rule below. Rules are pure `&str → String`
//! functions applied in a fixed order, so each is testable on its own.
//!
//! ## Strategy Order
//!
//! 1. Strip code fences
//! 2. Parse directly
//! 3. Repair (trailing comma → truncate to last complete object → brackets), parse
//! 4. Parse the greedy `[` … `]` span
//! 5. Fail with [`TranslateError::ParseFailure`]
//!
//! A repair only ever *removes* an incomplete tail; it never invents a
//! translation. Paragraph numbers are not range-checked here.

use crate::error::TranslateError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One translated paragraph as returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedParagraph {
    pub number: usize,
    pub text: String,
}

/// The model may answer with an array (batched call) or one object
/// (per-paragraph call).
#[derive(Deserialize)]
#[serde(untagged)]
enum ResponseShape {
    Many(Vec<TranslatedParagraph>),
    One(TranslatedParagraph),
}

impl From<ResponseShape> for Vec<TranslatedParagraph> {
    fn from(shape: ResponseShape) -> Self {
        match shape {
            ResponseShape::Many(v) => v,
            ResponseShape::One(p) => vec![p],
        }
    }
}

type Repair = fn(&str) -> String;

/// Repair passes, applied cumulatively in this order.
const REPAIRS: &[(&str, Repair)] = &[
    ("drop_trailing_comma", drop_trailing_comma),
    (
        "truncate_to_last_complete_object",
        truncate_to_last_complete_object,
    ),
    ("ensure_brackets", ensure_brackets),
];

/// Parse raw model output into translated paragraphs.
///
/// A single object is normalised to a one-element vector.
pub fn parse_translations(raw: &str) -> Result<Vec<TranslatedParagraph>, TranslateError> {
    let stripped = strip_code_fences(raw);

    if let Some(parsed) = try_parse(&stripped) {
        return Ok(parsed);
    }

    let repaired = REPAIRS.iter().fold(stripped.clone(), |text, (name, rule)| {
        let next = rule(&text);
        if next != text {
            debug!("response repair '{}' applied", name);
        }
        next
    });
    if let Some(parsed) = try_parse(&repaired) {
        return Ok(parsed);
    }

    if let Some(span) = extract_array_span(&stripped) {
        if let Some(parsed) = try_parse(span) {
            debug!("response recovered from greedy array span");
            return Ok(parsed);
        }
    }

    Err(TranslateError::ParseFailure {
        detail: "no strategy produced a valid {number, text} array".into(),
        excerpt: raw.trim().chars().take(80).collect(),
    })
}

fn try_parse(text: &str) -> Option<Vec<TranslatedParagraph>> {
    serde_json::from_str::<ResponseShape>(text)
        .ok()
        .map(Vec::from)
}

// ── Strategy 1: Strip code fences ────────────────────────────────────────────

fn strip_code_fences(input: &str) -> String {
    let mut s = input.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim().to_string()
}

// ── Repair: Drop a dangling trailing comma ───────────────────────────────────

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*$").unwrap());

fn drop_trailing_comma(input: &str) -> String {
    RE_TRAILING_COMMA.replace(input, "").to_string()
}

// ── Repair: Truncate to the last complete object ─────────────────────────────
//
// A reply cut off by the output limit ends inside an object:
// `[{"number": 1, "text": "a"}, {"number": 2, "text": "b…`. Everything after
// the last complete `{"number": N, "text": "…"}` is dropped and the array is
// closed. JSON string escapes (`\"`) inside the text are honoured.

static RE_COMPLETE_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\s*"number"\s*:\s*\d+\s*,\s*"text"\s*:\s*"(?:[^"\\]|\\.)*"\s*\}"#).unwrap()
});

fn truncate_to_last_complete_object(input: &str) -> String {
    let Some(last) = RE_COMPLETE_OBJECT.find_iter(input).last() else {
        return input.to_string();
    };
    let tail = input[last.end()..].trim();
    if tail.is_empty() || tail == "]" {
        return input.to_string();
    }
    format!("{}]", &input[..last.end()])
}

// ── Repair: Ensure the text is wrapped in brackets ───────────────────────────

fn ensure_brackets(input: &str) -> String {
    let mut s = input.trim().to_string();
    if !s.starts_with('[') {
        s.insert(0, '[');
    }
    if !s.ends_with(']') {
        s.push(']');
    }
    s
}

// ── Strategy 4: Greedy array span ────────────────────────────────────────────

fn extract_array_span(input: &str) -> Option<&str> {
    let start = input.find('[')?;
    let end = input.rfind(']')?;
    (end > start).then(|| &input[start..=end])
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(number: usize, text: &str) -> TranslatedParagraph {
        TranslatedParagraph {
            number,
            text: text.into(),
        }
    }

    #[test]
    fn test_fenced_array() {
        let raw = "```json\n[{\"number\":1,\"text\":\"hi\"}]\n```";
        assert_eq!(parse_translations(raw).unwrap(), vec![tp(1, "hi")]);
    }

    #[test]
    fn test_bare_fence() {
        let raw = "```\n[{\"number\":4,\"text\":\"x\"}]\n```";
        assert_eq!(parse_translations(raw).unwrap(), vec![tp(4, "x")]);
    }

    #[test]
    fn test_single_object() {
        let raw = r#"{"number": 7, "text": "Good morning"}"#;
        assert_eq!(parse_translations(raw).unwrap(), vec![tp(7, "Good morning")]);
    }

    #[test]
    fn test_truncated_tail_recovers_complete_objects() {
        let raw = r#"[{"number":1,"text":"hi"},{"number":2,"text":"partial"#;
        let parsed = parse_translations(raw).unwrap();
        assert_eq!(parsed, vec![tp(1, "hi")]);
    }

    #[test]
    fn test_truncated_with_nothing_complete_fails() {
        let raw = r#"[{"number":1,"text":"unfinished"#;
        let err = parse_translations(raw).unwrap_err();
        assert!(matches!(err, TranslateError::ParseFailure { .. }));
    }

    #[test]
    fn test_trailing_commentary() {
        let raw = "[{\"number\":1,\"text\":\"a\"},{\"number\":2,\"text\":\"b\"}]\n\nLet me know if you need anything else!";
        assert_eq!(parse_translations(raw).unwrap(), vec![tp(1, "a"), tp(2, "b")]);
    }

    #[test]
    fn test_leading_commentary_uses_array_span() {
        let raw = "Here is the translation:\n[{\"number\":3,\"text\":\"c\"}]";
        assert_eq!(parse_translations(raw).unwrap(), vec![tp(3, "c")]);
    }

    #[test]
    fn test_escaped_quotes_survive_truncation() {
        let raw = r#"[{"number":1,"text":"he said \"yes\""},{"number":2,"text":"cut"#;
        assert_eq!(parse_translations(raw).unwrap(), vec![tp(1, "he said \"yes\"")]);
    }

    #[test]
    fn test_garbage_fails() {
        let err = parse_translations("I cannot translate this.").unwrap_err();
        match err {
            TranslateError::ParseFailure { excerpt, .. } => {
                assert!(excerpt.starts_with("I cannot"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_shape_fails() {
        assert!(parse_translations(r#"[{"id":1,"content":"x"}]"#).is_err());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("  []  "), "[]");
    }

    #[test]
    fn test_drop_trailing_comma() {
        assert_eq!(drop_trailing_comma("[{\"a\":1}, \n"), "[{\"a\":1}");
        assert_eq!(drop_trailing_comma("[1]"), "[1]");
    }

    #[test]
    fn test_truncate_leaves_complete_array_alone() {
        let input = r#"[{"number":1,"text":"a"}]"#;
        assert_eq!(truncate_to_last_complete_object(input), input);
    }

    #[test]
    fn test_ensure_brackets() {
        assert_eq!(ensure_brackets(r#"{"number":1,"text":"a"}"#), r#"[{"number":1,"text":"a"}]"#);
        assert_eq!(ensure_brackets("[]"), "[]");
    }

    #[test]
    fn test_extract_array_span() {
        assert_eq!(extract_array_span("x [1, 2] y"), Some("[1, 2]"));
        assert_eq!(extract_array_span("] no ["), None);
        assert_eq!(extract_array_span("none"), None);
    }

    #[test]
    fn test_numbers_are_not_range_checked() {
        let parsed = parse_translations(r#"[{"number":999,"text":"far"}]"#).unwrap();
        assert_eq!(parsed[0].number, 999);
    }
}
