//! Scoring records passed between the geocoder, the pre-ranker and the
//! ranker.

use offgrid_data::{FeatureRef, TypeId, geometry::Point};

use crate::{
    config::RankingWeights,
    layers::IntersectionResult,
    model::SearchType,
    query::TokenRange,
    ranking::name_score::NameScore,
};

/// Distances are clamped to this before scoring.
pub const MAX_DISTANCE_M: f64 = 2_000_000.0;

/// Token range matched by each search type of one interpretation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenRanges([Option<TokenRange>; SearchType::COUNT]);

impl TokenRanges {
    pub const fn get(&self, t: SearchType) -> Option<TokenRange> {
        self.0[t.index()]
    }

    pub const fn set(&mut self, t: SearchType, range: TokenRange) {
        self.0[t.index()] = Some(range);
    }

    pub fn iter(&self) -> impl Iterator<Item = (SearchType, TokenRange)> + '_ {
        ALL_TYPES
            .iter()
            .filter_map(|&t| self.get(t).map(|r| (t, r)))
    }

    /// True when the ranges together cover every one of `num_tokens` tokens.
    pub fn covers_all(&self, num_tokens: usize) -> bool {
        (0..num_tokens).all(|i| self.0.iter().flatten().any(|r| r.contains(i)))
    }
}

const ALL_TYPES: [SearchType; SearchType::COUNT] = [
    SearchType::SubPoi,
    SearchType::ComplexPoi,
    SearchType::Building,
    SearchType::Street,
    SearchType::Suburb,
    SearchType::Unclassified,
    SearchType::Village,
    SearchType::City,
    SearchType::State,
    SearchType::Country,
];

/// Scores known before the feature is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PreRankingInfo {
    pub search_type: SearchType,
    pub token_ranges: TokenRanges,
    pub rank: u8,
    pub popularity: u8,
    pub distance_to_pivot_m: f64,
    /// Set when the distance was computed from the exact center.
    pub center: Option<Point>,
    pub all_tokens_used: bool,
    /// The prefix token, if used, also matches a whole name token.
    pub exact_match: bool,
    /// Tokens matched as a postcode.
    pub postcode: Option<TokenRange>,
}

impl PreRankingInfo {
    pub fn new(search_type: SearchType) -> Self {
        Self {
            search_type,
            token_ranges: TokenRanges::default(),
            rank: 0,
            popularity: 0,
            distance_to_pivot_m: MAX_DISTANCE_M,
            center: None,
            all_tokens_used: false,
            exact_match: false,
            postcode: None,
        }
    }

    /// True when the layer ranges and the postcode together cover every
    /// one of `num_tokens` tokens.
    pub fn covers_all_tokens(&self, num_tokens: usize) -> bool {
        (0..num_tokens).all(|i| {
            self.postcode.is_some_and(|r| r.contains(i))
                || self.token_ranges.iter().any(|(_, r)| r.contains(i))
        })
    }

    /// Rank without name matching, comparable only between pre-ranking
    /// records of the same query.
    pub fn linear_rank(&self, w: &RankingWeights) -> f64 {
        w.rank * f64::from(self.rank) / 255.0
            + w.popularity * f64::from(self.popularity) / 255.0
            + w.distance * distance_score(self.distance_to_pivot_m)
            + if self.all_tokens_used { w.all_tokens_used } else { 0.0 }
            + w.search_type * search_type_score(self.search_type)
    }
}

/// One raw hit of the geocoder.
#[derive(Debug, Clone, PartialEq)]
pub struct PreRankerResult {
    pub id: FeatureRef,
    pub info: PreRankingInfo,
    /// Street and suburb the hit was matched through, in the hit's tile.
    pub geo_parts: IntersectionResult,
    /// City or village the hit was found in.
    pub locality: Option<FeatureRef>,
}

impl PreRankerResult {
    pub fn new(id: FeatureRef, info: PreRankingInfo) -> Self {
        Self {
            id,
            info,
            geo_parts: IntersectionResult::default(),
            locality: None,
        }
    }
}

/// Fully resolved scores of one result.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankingInfo {
    pub name_score: NameScore,
    /// Edit operations needed to match the query, `None` when no name
    /// matched at all.
    pub errors_made: Option<usize>,
    /// Share of the matched name's tokens covered by the query.
    pub matched_fraction: f64,
    pub search_type: SearchType,
    pub best_type: Option<TypeId>,
    pub distance_m: f64,
    /// Rank normalized for the search type.
    pub rank: u8,
    pub popularity: u8,
    pub all_tokens_used: bool,
    /// The query only named categories.
    pub pure_cats: bool,
    pub exact_match: bool,
}

impl RankingInfo {
    pub fn linear_rank(&self, w: &RankingWeights) -> f64 {
        let errors_penalty = self
            .errors_made
            .map_or(1.0, |e| e.min(MAX_COUNTED_ERRORS) as f64 / MAX_COUNTED_ERRORS as f64);
        w.name_score * self.name_score.weight()
            - w.errors * errors_penalty
            + w.matched_fraction * self.matched_fraction.clamp(0.0, 1.0)
            + w.rank * f64::from(self.rank) / 255.0
            + w.popularity * f64::from(self.popularity) / 255.0
            + w.distance * distance_score(self.distance_m)
            + if self.all_tokens_used { w.all_tokens_used } else { 0.0 }
            + w.search_type * search_type_score(self.search_type)
    }
}

const MAX_COUNTED_ERRORS: usize = 3;

/// 1 at the pivot, 0 at [`MAX_DISTANCE_M`] and beyond.
pub fn distance_score(distance_m: f64) -> f64 {
    1.0 - distance_m.clamp(0.0, MAX_DISTANCE_M) / MAX_DISTANCE_M
}

/// Buildings are the most precise answer to an address query.
pub const fn search_type_score(t: SearchType) -> f64 {
    match t {
        SearchType::Building => 1.0,
        SearchType::City => 0.9,
        SearchType::SubPoi | SearchType::ComplexPoi | SearchType::Street | SearchType::Country => {
            0.8
        }
        SearchType::State => 0.7,
        SearchType::Suburb | SearchType::Unclassified | SearchType::Village => 0.6,
    }
}
