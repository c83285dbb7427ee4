//! Display names and highlighted query matches.

use std::ops::Range;

use offgrid_data::{Feature, normalize::normalize};
use unicode_segmentation::UnicodeSegmentation;

use crate::query::QueryParams;

/// The name to show: the one in `locale`, else English, else the local
/// name. When the query matched an alternative name that differs from it,
/// the alternative is appended in brackets.
pub fn display_name(feature: &Feature, locale: &str, matched_alt: Option<&str>) -> String {
    let base = feature
        .name(locale)
        .or_else(|| feature.name("en"))
        .or_else(|| feature.default_name())
        .unwrap_or_default();
    match matched_alt {
        Some(alt) if base.is_empty() => alt.to_owned(),
        Some(alt) if normalize(alt) != normalize(base) => format!("{base} ({alt})"),
        _ => base.to_owned(),
    }
}

/// Byte ranges of the words of `name` that some query token matches. The
/// prefix token also matches words it is the beginning of.
pub fn highlights(name: &str, query: &QueryParams) -> Vec<Range<usize>> {
    name.unicode_word_indices()
        .filter(|(_, word)| {
            let word = normalize(word);
            query.tokens().iter().enumerate().any(|(i, token)| {
                let prefix = query.is_prefix_token(i);
                token
                    .forms()
                    .any(|form| form == word || prefix && word.starts_with(form))
            })
        })
        .map(|(start, word)| start..start + word.len())
        .collect()
}
