//! How well a feature name matches a token range of the query.

use std::cmp::Reverse;

use offgrid_data::{Feature, Synonyms, feature::DEFAULT_LANG, normalize::tokenize};
use rapidfuzz::distance::levenshtein;

use crate::query::{QueryParams, QueryToken, TokenRange};

/// Match quality of a name against query tokens, worst first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NameScore {
    #[default]
    Zero,
    /// The tokens match somewhere inside the name.
    Substring,
    /// The tokens match the beginning of the name, or the whole name with
    /// an unfinished last token.
    FullPrefix,
    /// The tokens match the whole name.
    FullMatch,
}

impl NameScore {
    pub const fn weight(self) -> f64 {
        match self {
            Self::Zero => 0.0,
            Self::Substring => 0.35,
            Self::FullPrefix => 0.7,
            Self::FullMatch => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameMatch {
    pub score: NameScore,
    pub errors: Option<usize>,
    /// Share of the name's tokens covered by the query tokens.
    pub matched_fraction: f64,
}

impl NameMatch {
    pub const ZERO: Self = Self {
        score: NameScore::Zero,
        errors: None,
        matched_fraction: 0.0,
    };

    pub const fn full(score: NameScore) -> Self {
        Self {
            score,
            errors: Some(0),
            matched_fraction: 1.0,
        }
    }

    fn key(&self) -> (NameScore, Reverse<usize>, u32) {
        (
            self.score,
            Reverse(self.errors.unwrap_or(usize::MAX)),
            (self.matched_fraction * 1000.0) as u32,
        )
    }

    /// Higher score first, then fewer errors, then more of the name matched.
    pub fn is_better_than(&self, other: &Self) -> bool {
        self.key() > other.key()
    }
}

/// Typos tolerated in a query token of this length.
fn max_errors(token: &str) -> usize {
    match token.chars().count() {
        0..=3 => 0,
        4..=7 => 1,
        _ => 2,
    }
}

fn form_errors(form: &str, name_token: &str, prefix: bool) -> Option<usize> {
    if prefix && name_token.starts_with(form) || form == name_token {
        return Some(0);
    }
    if form.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let query: Vec<char> = form.chars().collect();
    let name: Vec<char> = if prefix {
        name_token.chars().take(query.len()).collect()
    } else {
        name_token.chars().collect()
    };
    let distance = levenshtein::distance(query.iter().copied(), name.iter().copied());
    (distance <= max_errors(form)).then_some(distance)
}

fn token_errors(token: &QueryToken, name_token: &str, prefix: bool) -> Option<usize> {
    token
        .forms()
        .filter_map(|form| form_errors(form, name_token, prefix))
        .min()
}

/// Scores already tokenized name words against query tokens. The query
/// tokens must match a contiguous run of name tokens.
pub fn score_tokens(name: &[String], tokens: &[QueryToken], last_is_prefix: bool) -> NameMatch {
    let (m, n) = (tokens.len(), name.len());
    if m == 0 || m > n {
        return NameMatch::ZERO;
    }

    let mut best = NameMatch::ZERO;
    for offset in 0..=n - m {
        let mut errors = 0;
        let matched = tokens.iter().enumerate().all(|(i, token)| {
            let prefix = last_is_prefix && i + 1 == m;
            token_errors(token, &name[offset + i], prefix).is_some_and(|e| {
                errors += e;
                true
            })
        });
        if !matched {
            continue;
        }
        let last_complete = !last_is_prefix
            || tokens[m - 1]
                .forms()
                .any(|form| token_errors_exact(form, &name[offset + m - 1]));
        let score = if m == n && last_complete {
            NameScore::FullMatch
        } else if offset == 0 {
            NameScore::FullPrefix
        } else {
            NameScore::Substring
        };
        let candidate = NameMatch {
            score,
            errors: Some(errors),
            matched_fraction: m as f64 / n as f64,
        };
        if candidate.is_better_than(&best) {
            best = candidate;
        }
    }
    best
}

fn token_errors_exact(form: &str, name_token: &str) -> bool {
    form_errors(form, name_token, false).is_some()
}

/// Spelling variants of a street name: the name itself, the name without
/// designator words ("street", "улица") and split or joined forms of glued
/// suffixes ("hauptstrasse" / "haupt strasse" / "haupt str").
pub fn street_name_variants(name: &[String], synonyms: &Synonyms) -> Vec<Vec<String>> {
    let mut variants = vec![name.to_vec()];

    let stripped: Vec<String> = name
        .iter()
        .filter(|t| !synonyms.is_street_word(t))
        .cloned()
        .collect();
    if !stripped.is_empty() && stripped.len() < name.len() {
        variants.push(stripped);
    }

    for (suffix, short) in synonyms.glued_street_suffixes() {
        for (i, token) in name.iter().enumerate() {
            if let Some(stem) = token.strip_suffix(suffix.as_str())
                && !stem.is_empty()
            {
                for tail in [suffix, short] {
                    let mut split = name[..i].to_vec();
                    split.push(stem.to_owned());
                    split.push(tail.clone());
                    split.extend_from_slice(&name[i + 1..]);
                    variants.push(split);
                }
            }
            if (token == suffix || token == short) && i > 0 {
                let mut joined = name[..i - 1].to_vec();
                joined.push(format!("{}{suffix}", name[i - 1]));
                joined.extend_from_slice(&name[i + 1..]);
                variants.push(joined);
            }
        }
    }
    variants
}

/// The best matching name of a feature.
#[derive(Debug, Clone, PartialEq)]
pub struct BestName<'f> {
    pub text: &'f str,
    /// The name is an alternative or historical one.
    pub is_alt: bool,
    pub matched: NameMatch,
}

/// Names in tie-breaking order: the query locale, the local name, English,
/// the other languages and then alternative names.
fn names_by_tier<'f>(feature: &'f Feature, locale: &str) -> Vec<(&'f str, bool)> {
    let tier = |lang: &str| {
        if lang == locale {
            0
        } else if lang == DEFAULT_LANG {
            1
        } else if lang == "en" {
            2
        } else {
            3
        }
    };
    let mut names: Vec<(usize, &str)> = feature
        .names
        .iter()
        .map(|n| (tier(&n.lang), n.text.as_str()))
        .collect();
    names.sort_by_key(|(t, _)| *t);
    names
        .into_iter()
        .map(|(_, text)| (text, false))
        .chain(feature.searchable_names().filter(|(_, alt)| *alt))
        .collect()
}

/// Scores every name of `feature` against `range` and keeps the best one.
/// Street names are also scored in their [variants](street_name_variants).
pub fn best_name_match<'f>(
    feature: &'f Feature,
    query: &QueryParams,
    range: TokenRange,
    synonyms: &Synonyms,
    is_street: bool,
) -> Option<BestName<'f>> {
    let tokens = &query.tokens()[range.start()..range.end()];
    let prefix = query.range_has_prefix(range);

    let mut best: Option<BestName<'f>> = None;
    for (text, is_alt) in names_by_tier(feature, query.locale()) {
        let words = tokenize(text);
        let candidates = if is_street {
            street_name_variants(&words, synonyms)
        } else {
            vec![words]
        };
        for variant in candidates {
            let matched = score_tokens(&variant, tokens, prefix);
            if best
                .as_ref()
                .is_none_or(|b| matched.is_better_than(&b.matched))
            {
                best = Some(BestName {
                    text,
                    is_alt,
                    matched,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use offgrid_data::CategoriesTable;

    fn query(text: &str) -> QueryParams {
        QueryParams::new(text, "en", &CategoriesTable::new(), &Synonyms::standard())
    }

    fn score(name: &str, q: &str) -> NameMatch {
        let query = query(q);
        score_tokens(
            &tokenize(name),
            query.tokens(),
            query.last_token_is_prefix(),
        )
    }

    #[test]
    fn test_name_scores() {
        assert_eq!(score("Main Street", "main street ").score, NameScore::FullMatch);
        assert_eq!(score("Main Street", "main st ").score, NameScore::FullMatch);
        assert_eq!(score("Main Street", "main stre").score, NameScore::FullPrefix);
        assert_eq!(score("Main Street", "main ").score, NameScore::FullPrefix);
        assert_eq!(score("Main Street", "street ").score, NameScore::Substring);
        assert_eq!(score("Main Street", "oak ").score, NameScore::Zero);
        assert_eq!(score("Main", "main street ").score, NameScore::Zero);
    }

    #[test]
    fn test_typos_count_as_errors() {
        let m = score("Springfield", "sprinfield ");
        assert_eq!(m.score, NameScore::FullMatch);
        assert_eq!(m.errors, Some(1));
        assert_eq!(score("Oak", "oat ").score, NameScore::Zero);
        assert_eq!(score("12", "13 ").score, NameScore::Zero);
    }

    #[test]
    fn test_prefix_typos_compare_against_name_head() {
        let m = score("Springfield", "sprinf");
        assert_eq!(m.score, NameScore::FullPrefix);
        assert_eq!(m.errors, Some(1));
        assert_eq!(score("Springfield", "sprxxf").score, NameScore::Zero);
    }

    #[test]
    fn test_better_match_prefers_fewer_errors() {
        let exact = NameMatch::full(NameScore::FullMatch);
        let typo = NameMatch {
            errors: Some(1),
            ..exact
        };
        assert!(exact.is_better_than(&typo));
        assert!(typo.is_better_than(&NameMatch::ZERO));
    }

    #[test]
    fn test_street_variants() {
        let synonyms = Synonyms::standard();
        let variants = street_name_variants(&tokenize("улица Арбат"), &synonyms);
        assert!(variants.contains(&vec!["арбат".to_owned()]));

        let variants = street_name_variants(&tokenize("Hauptstrasse"), &synonyms);
        assert!(variants.contains(&vec!["haupt".to_owned(), "strasse".to_owned()]));
        assert!(variants.contains(&vec!["haupt".to_owned(), "str".to_owned()]));

        let variants = street_name_variants(&tokenize("Haupt Strasse"), &synonyms);
        assert!(variants.contains(&vec!["hauptstrasse".to_owned()]));
    }

    #[test]
    fn test_best_name_prefers_alt_when_it_matches() {
        let feature = Feature::point(0.0, 0.0)
            .named("Oak Street")
            .alt_name("Post Road");
        let query = query("post road ");
        let best = best_name_match(
            &feature,
            &query,
            query.full_range(),
            &Synonyms::standard(),
            true,
        )
        .unwrap();
        assert_eq!(best.text, "Post Road");
        assert!(best.is_alt);
        assert_eq!(best.matched.score, NameScore::FullMatch);
    }

    #[test]
    fn test_street_without_designator_is_full_match() {
        let feature = Feature::point(0.0, 0.0).named("улица Арбат");
        let query = query("арбат ");
        let best = best_name_match(
            &feature,
            &query,
            query.full_range(),
            &Synonyms::standard(),
            true,
        )
        .unwrap();
        assert_eq!(best.matched.score, NameScore::FullMatch);
    }
}
