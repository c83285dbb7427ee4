//! String normalization shared by the index builder and query parsing.
//!
//! Both sides must agree exactly, otherwise index lookups silently miss.

use unicode_segmentation::UnicodeSegmentation;

/// Lower-cases and folds a few letter variants that are used interchangeably.
pub fn normalize(s: &str) -> String {
    let folded: String = s
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'ё' => 'е',
            '’' | '`' => '\'',
            c => c,
        })
        .collect();
    folded.replace('ß', "ss")
}

/// Splits normalized text into word tokens.
pub fn tokenize(s: &str) -> Vec<String> {
    normalize(s)
        .unicode_words()
        .map(str::to_owned)
        .collect()
}

/// True when `token` is made of ASCII digits only.
pub fn is_number(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}
