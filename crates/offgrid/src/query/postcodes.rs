//! Postcode detection in query text.

use offgrid_data::normalize::tokenize;

/// Longest postcode, in query tokens ("sw1a 1aa" is two).
pub const MAX_POSTCODE_TOKENS: usize = 3;
/// Longest postcode, in characters without separators.
const MAX_POSTCODE_LEN: usize = 10;
/// Complete postcodes are never shorter than this.
const MIN_POSTCODE_LEN: usize = 3;

/// True when `s` may be a postcode, or the start of one when `is_prefix`
/// is set. Postcodes are short alphanumeric codes with at least one digit.
pub fn looks_like_postcode(s: &str, is_prefix: bool) -> bool {
    let tokens = tokenize(s);
    if tokens.is_empty() || tokens.len() > MAX_POSTCODE_TOKENS {
        return false;
    }
    let len: usize = tokens.iter().map(|t| t.chars().count()).sum();
    if len > MAX_POSTCODE_LEN || (!is_prefix && len < MIN_POSTCODE_LEN) {
        return false;
    }
    tokens
        .iter()
        .all(|t| t.chars().all(char::is_alphanumeric))
        && tokens
            .iter()
            .any(|t| t.chars().any(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_postcode() {
        assert!(looks_like_postcode("49007", false));
        assert!(looks_like_postcode("SW1A 1AA", false));
        assert!(looks_like_postcode("123-4567", false));
        assert!(looks_like_postcode("4", true));
        assert!(!looks_like_postcode("4", false));
        assert!(!looks_like_postcode("main", false));
        assert!(!looks_like_postcode("12345678901", false));
        assert!(!looks_like_postcode("a b c 1", false));
        assert!(!looks_like_postcode("", true));
    }
}
