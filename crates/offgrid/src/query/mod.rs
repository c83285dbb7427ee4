//! Query tokenization: normalized tokens with synonyms, category types and
//! the prefix flag of the last token.

pub mod house_numbers;
pub mod postcodes;

use std::{fmt, ops::Range};

use offgrid_data::{
    CategoriesTable, Synonyms, TypeId,
    normalize::{is_number, tokenize},
};
use smallvec::SmallVec;

/// Half-open range `[start, end)` over query tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenRange {
    start: usize,
    end: usize,
}

impl TokenRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "bad token range [{start}, {end})");
        Self { start, end }
    }

    pub const fn start(&self) -> usize {
        self.start
    }

    pub const fn end(&self) -> usize {
        self.end
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub const fn contains(&self, i: usize) -> bool {
        self.start <= i && i < self.end
    }

    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub const fn is_adjacent_to(&self, other: &Self) -> bool {
        self.end == other.start || other.end == self.start
    }

    pub fn iter(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for TokenRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryToken {
    /// The normalized token as typed.
    pub original: String,
    /// Synonyms the token is also looked up by.
    pub variants: SmallVec<[String; 2]>,
    pub is_number: bool,
    /// Types whose localized category name is this token.
    pub categories: SmallVec<[TypeId; 2]>,
}

impl QueryToken {
    /// The token itself followed by its synonyms.
    pub fn forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.original.as_str()).chain(self.variants.iter().map(String::as_str))
    }
}

/// A tokenized query.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    raw: String,
    locale: String,
    tokens: Vec<QueryToken>,
    last_token_is_prefix: bool,
}

impl QueryParams {
    pub fn new(query: &str, locale: &str, categories: &CategoriesTable, synonyms: &Synonyms) -> Self {
        let words = tokenize(query);
        // "Main St" is still being typed, "Main St " is not.
        let last_token_is_prefix =
            !words.is_empty() && query.chars().last().is_some_and(char::is_alphanumeric);
        let tokens = words
            .into_iter()
            .map(|word| QueryToken {
                variants: synonyms.expand(&word).iter().cloned().collect(),
                is_number: is_number(&word),
                categories: categories.types_for(locale, &word).iter().copied().collect(),
                original: word,
            })
            .collect();
        Self {
            raw: query.to_owned(),
            locale: locale.to_owned(),
            tokens,
            last_token_is_prefix,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[QueryToken] {
        &self.tokens
    }

    pub fn token(&self, i: usize) -> &QueryToken {
        &self.tokens[i]
    }

    pub const fn last_token_is_prefix(&self) -> bool {
        self.last_token_is_prefix
    }

    pub fn is_prefix_token(&self, i: usize) -> bool {
        self.last_token_is_prefix && i + 1 == self.tokens.len()
    }

    /// True when `range` covers the prefix token.
    pub fn range_has_prefix(&self, range: TokenRange) -> bool {
        self.last_token_is_prefix && range.end() == self.tokens.len() && !range.is_empty()
    }

    pub fn full_range(&self) -> TokenRange {
        TokenRange::new(0, self.tokens.len())
    }

    pub fn is_number_tokens(&self, range: TokenRange) -> bool {
        !range.is_empty() && range.iter().all(|i| self.tokens[i].is_number)
    }

    /// Tokens of `range` joined by single spaces.
    pub fn range_text(&self, range: TokenRange) -> String {
        range
            .iter()
            .map(|i| self.tokens[i].original.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Queries like "cafe" or "coffee shop" that only name categories.
    pub fn is_categorial(&self) -> bool {
        !self.tokens.is_empty() && self.tokens.iter().all(|t| !t.categories.is_empty())
    }

    /// Union of the category types of all tokens, sorted.
    pub fn preferred_types(&self) -> Vec<TypeId> {
        let mut types: Vec<TypeId> = self
            .tokens
            .iter()
            .flat_map(|t| t.categories.iter().copied())
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offgrid_data::test_data::{standard_categories, standard_classificator};

    fn params(query: &str) -> QueryParams {
        let classif = standard_classificator();
        QueryParams::new(
            query,
            "en",
            &standard_categories(&classif),
            &Synonyms::standard(),
        )
    }

    #[test]
    fn test_last_token_prefix_flag() {
        assert!(params("Main St").last_token_is_prefix());
        assert!(!params("Main St ").last_token_is_prefix());
        assert!(!params("Main St.").last_token_is_prefix());
        assert!(!params("").last_token_is_prefix());
    }

    #[test]
    fn test_synonyms_and_numbers() {
        let q = params("main st 12");
        assert_eq!(q.len(), 3);
        assert!(q.token(1).forms().any(|f| f == "street"));
        assert!(q.token(2).is_number);
        assert!(q.is_number_tokens(TokenRange::new(2, 3)));
        assert!(!q.is_number_tokens(TokenRange::new(1, 3)));
        assert_eq!(q.range_text(TokenRange::new(0, 2)), "main st");
        assert!(q.range_has_prefix(TokenRange::new(2, 3)));
    }

    #[test]
    fn test_categorial_query() {
        let q = params("coffee cafe");
        assert!(q.is_categorial());
        assert_eq!(q.preferred_types().len(), 1);
        assert!(!params("blue cafe").is_categorial());
    }

    #[test]
    fn test_token_range() {
        let a = TokenRange::new(0, 2);
        let b = TokenRange::new(2, 3);
        assert!(!a.overlaps(&b));
        assert!(a.is_adjacent_to(&b));
        assert!(a.overlaps(&TokenRange::new(1, 4)));
        assert_eq!(a.to_string(), "[0, 2)");
        assert_eq!(a.len(), 2);
    }
}
