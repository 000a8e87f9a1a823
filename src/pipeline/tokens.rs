//! Request-size estimation.
//!
//! One token is assumed to cover three characters. Real tokenisers average
//! closer to four for English, so the estimate runs high; it only decides
//! whether a chunk is sent batched or split into per-paragraph calls.

/// Estimate the token cost of `text` as `ceil(chars / 3)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 2);
        assert_eq!(estimate_tokens("a"), 1);
    }

    #[test]
    fn exact_multiple() {
        assert_eq!(estimate_tokens(&"a".repeat(300)), 100);
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // Three 2-byte characters.
        assert_eq!(estimate_tokens("äöü"), 1);
    }
}
