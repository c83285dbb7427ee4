//! Final scoring: loads every pre-ranked hit, matches its names against the
//! query and keeps an ordered, de-duplicated list of results.

use std::time::Instant;

use offgrid_data::{
    Feature, FeatureRef, GeomKind, TypeId,
    geometry::{Point, Rect, distance_m, rect_contains},
    normalize::normalize,
    postcode_key,
};
use tracing::{debug, instrument, warn};

use crate::{
    config::{RankingWeights, SearchConfig},
    context::SearchContext,
    model::{Model, SearchType},
    query::{
        QueryParams,
        house_numbers::{feature_matches, parse_query, uses_conscription_numbers},
    },
    ranking::{
        address::format_address,
        display::{display_name, highlights},
        info::{PreRankerResult, RankingInfo},
        name_score::{NameMatch, NameScore, best_name_match},
        result::{ResultKind, SearchResult},
    },
};

/// Per-query settings of the ranker.
#[derive(Debug, Clone)]
pub struct RankerParams {
    pub query: QueryParams,
    pub pivot: Point,
    pub viewport: Rect,
    pub viewport_search: bool,
    /// Code of the region the pivot lies in.
    pub pivot_region: Option<String>,
    pub max_results: usize,
    pub weights: RankingWeights,
    pub duplicate_linear_distance_m: f64,
    pub min_distance_between_results_m: f64,
}

impl RankerParams {
    pub fn new(
        config: &SearchConfig,
        query: QueryParams,
        pivot: Point,
        viewport: Rect,
        viewport_search: bool,
        max_results: usize,
    ) -> Self {
        Self {
            query,
            pivot,
            viewport,
            viewport_search,
            pivot_region: None,
            max_results,
            weights: config.ranking,
            duplicate_linear_distance_m: config.duplicate_linear_distance_m,
            min_distance_between_results_m: config.min_distance_between_results_m,
        }
    }
}

/// A scored result before presentation.
#[derive(Debug, Clone)]
pub struct RankerResult {
    pub result: SearchResult,
    pub info: RankingInfo,
    pub linear_rank: f64,
    pub geom_kind: GeomKind,
    /// Normalized display name, compared when de-duplicating.
    key_name: String,
}

impl RankerResult {
    fn same_name_and_type(&self, other: &Self) -> bool {
        self.key_name == other.key_name
            && self.info.search_type == other.info.search_type
            && self.info.best_type == other.info.best_type
    }
}

/// Turns one pre-ranked hit into a [`RankerResult`].
pub struct RankerResultMaker<'a> {
    ctx: &'a SearchContext,
    params: &'a RankerParams,
    pure_cats: bool,
    preferred_types: Vec<TypeId>,
}

impl<'a> RankerResultMaker<'a> {
    pub fn new(ctx: &'a SearchContext, params: &'a RankerParams) -> Self {
        Self {
            ctx,
            params,
            pure_cats: params.query.is_categorial(),
            preferred_types: params.query.preferred_types(),
        }
    }

    /// `None` when the feature can no longer be loaded.
    pub fn make(&self, pre: &PreRankerResult) -> Option<RankerResult> {
        let Some(tile) = self.ctx.tile(pre.id.tile) else {
            warn!(tile = pre.id.tile.0, "Result in an unknown tile dropped");
            return None;
        };
        let Some(feature) = tile.feature(pre.id.id) else {
            warn!(tile = pre.id.tile.0, id = pre.id.id, "Missing feature dropped");
            return None;
        };
        let center = pre.info.center.or_else(|| tile.center(pre.id.id))?;
        let search_type = pre.info.search_type;
        let best_type = Model::best_type(&self.ctx.classif, &feature.types);
        let conscription = uses_conscription_numbers(tile.info.country.as_deref());

        let (name_match, matched_alt) = if self.pure_cats {
            let score = if best_type.is_some_and(|t| self.preferred_types.contains(&t)) {
                NameScore::FullPrefix
            } else {
                NameScore::Substring
            };
            (NameMatch::full(score), None)
        } else {
            self.own_name_match(pre, feature, conscription)
        };

        let mut name_match = self.cross_layer_match(pre, name_match);

        // Streets like "2-й Обыденский переулок" must not win over a house
        // number query just because their name starts with the number.
        if search_type == SearchType::Street
            && name_match.score > NameScore::Substring
            && let Some(range) = pre.info.token_ranges.get(SearchType::Street)
            && range.len() == 1
            && self.params.query.token(range.start()).is_number
        {
            name_match.score = NameScore::Substring;
        }

        let distance_m = self.distance_m(pre, center);
        let info = RankingInfo {
            name_score: name_match.score,
            errors_made: name_match.errors,
            matched_fraction: name_match.matched_fraction,
            search_type,
            best_type,
            distance_m,
            rank: self.normalized_rank(feature, search_type, center),
            popularity: feature.popularity,
            all_tokens_used: pre.info.all_tokens_used,
            pure_cats: self.pure_cats,
            exact_match: pre.info.exact_match,
        };
        let linear_rank = info.linear_rank(&self.params.weights);

        let locale = self.params.query.locale();
        let mut name = display_name(feature, locale, matched_alt);
        // Interpolation lines carry a range: show the queried number.
        let house_number = match (feature.interpolation, pre.info.token_ranges.get(SearchType::Building)) {
            (Some(_), Some(range)) => Some(self.params.query.range_text(range)),
            (Some(_), None) => None,
            (None, _) => feature.house_number.clone(),
        };
        if name.is_empty()
            && let Some(hn) = &house_number
        {
            name.clone_from(hn);
        }
        let result = SearchResult {
            kind: ResultKind::Feature,
            feature: Some(pre.id),
            center,
            highlights: highlights(&name, &self.params.query),
            address: format_address(
                self.ctx,
                pre.id,
                feature,
                search_type,
                house_number.as_deref(),
                center,
                locale,
            ),
            best_type,
            search_type: Some(search_type),
            ranking: Some(info.clone()),
            name,
        };
        debug!(
            name = %result.name,
            search_type = %search_type,
            name_score = ?info.name_score,
            linear_rank,
            "Ranked result"
        );
        Some(RankerResult {
            key_name: normalize(&result.name),
            geom_kind: feature.geom_kind(),
            result,
            info,
            linear_rank,
        })
    }

    fn own_name_match<'f>(
        &self,
        pre: &PreRankerResult,
        feature: &'f Feature,
        conscription: bool,
    ) -> (NameMatch, Option<&'f str>) {
        let search_type = pre.info.search_type;
        let Some(range) = pre.info.token_ranges.get(search_type) else {
            return (NameMatch::ZERO, None);
        };
        let query = &self.params.query;
        let best = best_name_match(
            feature,
            query,
            range,
            &self.ctx.synonyms,
            search_type == SearchType::Street,
        );
        let (mut matched, alt) = best.map_or((NameMatch::ZERO, None), |b| {
            (b.matched, b.is_alt.then_some(b.text))
        });

        if search_type == SearchType::Building && matched.score == NameScore::Zero {
            let hn_query = parse_query(&query.range_text(range), query.range_has_prefix(range));
            if feature_matches(feature, &hn_query, conscription) {
                matched = NameMatch::full(NameScore::FullMatch);
            }
        }

        // Hits found by postcode alone match it in full.
        if matched.score == NameScore::Zero
            && pre.info.postcode == Some(range)
            && feature
                .postcode
                .as_deref()
                .is_some_and(|p| postcode_key(p).starts_with(&query.range_text(range)))
        {
            matched = NameMatch::full(NameScore::FullMatch);
        }
        (matched, alt)
    }

    /// The better of the own score and the scores of the street and suburb
    /// the hit was matched through.
    fn cross_layer_match(&self, pre: &PreRankerResult, own: NameMatch) -> NameMatch {
        let mut best = own;
        for parent in [SearchType::Street, SearchType::Suburb] {
            if parent == pre.info.search_type {
                continue;
            }
            let (Some(range), Some(id)) = (pre.info.token_ranges.get(parent), pre.geo_parts.get(parent))
            else {
                continue;
            };
            let Some(feature) = self.ctx.feature(FeatureRef::new(pre.id.tile, id)) else {
                continue;
            };
            if let Some(m) = best_name_match(
                feature,
                &self.params.query,
                range,
                &self.ctx.synonyms,
                parent == SearchType::Street,
            ) && m.matched.score > best.score
            {
                best = m.matched;
            }
        }
        best
    }

    /// Distance to the pivot, or to the city center when the query fully
    /// named the city the hit was found in.
    fn distance_m(&self, pre: &PreRankerResult, center: Point) -> f64 {
        if let Some(locality) = pre.locality
            && let Some(range) = pre.info.token_ranges.get(SearchType::City)
            && let Some(city) = self.ctx.feature(locality)
            && let Some(city_center) = self.ctx.center(locality)
            && best_name_match(city, &self.params.query, range, &self.ctx.synonyms, false)
                .is_some_and(|m| m.matched.score == NameScore::FullMatch)
        {
            return distance_m(center, city_center);
        }
        if pre.info.center.is_some() {
            pre.info.distance_to_pivot_m
        } else {
            distance_m(center, self.params.pivot)
        }
    }

    fn normalized_rank(&self, feature: &Feature, search_type: SearchType, center: Point) -> u8 {
        let rank = f64::from(feature.rank);
        let scaled = match search_type {
            SearchType::Village => rank / 2.0,
            SearchType::City => {
                if self.ctx.model.is_capital(&feature.types)
                    || rect_contains(&self.params.viewport, center)
                {
                    rank * 2.0
                } else if self.params.pivot_region.as_deref().is_some_and(|code| {
                    self.ctx
                        .regions
                        .region_at(center)
                        .is_some_and(|r| r.code == code)
                }) {
                    rank * 1.7
                } else {
                    rank / 1.5
                }
            }
            SearchType::State | SearchType::Country => rank / 1.5,
            _ => rank,
        };
        scaled.clamp(0.0, 255.0) as u8
    }
}

/// Accumulates ranked results of one query.
pub struct Ranker {
    params: RankerParams,
    results: Vec<RankerResult>,
}

impl Ranker {
    pub fn new(params: RankerParams) -> Self {
        Self {
            params,
            results: Vec::new(),
        }
    }

    pub fn params(&self) -> &RankerParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[instrument(name = "Rank batch", level = "debug", skip_all, fields(size = batch.len()))]
    pub fn add_batch(&mut self, ctx: &SearchContext, batch: &[PreRankerResult]) {
        let t = Instant::now();
        let maker = RankerResultMaker::new(ctx, &self.params);
        let made: Vec<RankerResult> = batch.iter().filter_map(|pre| maker.make(pre)).collect();
        debug!(
            made = made.len(),
            total = self.results.len() + made.len(),
            elapsed_ms = t.elapsed().as_millis(),
            "Batch ranked"
        );
        self.results.extend(made);
    }

    /// The current best results: de-duplicated, ordered and truncated.
    pub fn snapshot(&self) -> Vec<SearchResult> {
        let mut by_rank: Vec<&RankerResult> = self.results.iter().collect();
        by_rank.sort_by(|a, b| b.linear_rank.total_cmp(&a.linear_rank));

        let mut kept: Vec<&RankerResult> = Vec::new();
        for r in by_rank {
            if !kept.iter().any(|k| self.is_duplicate(k, r)) {
                kept.push(r);
            }
        }

        if self.params.viewport_search {
            kept.sort_by(|a, b| a.info.distance_m.total_cmp(&b.info.distance_m));
        } else {
            kept.sort_by(|a, b| {
                b.linear_rank
                    .total_cmp(&a.linear_rank)
                    .then_with(|| b.info.popularity.cmp(&a.info.popularity))
                    .then_with(|| a.info.distance_m.total_cmp(&b.info.distance_m))
            });
        }
        kept.truncate(self.params.max_results);
        kept.into_iter().map(|r| r.result.clone()).collect()
    }

    /// `later` ranks below `kept`. Same-named lines collapse within a few
    /// kilometers whatever their address (a street crossing a locality
    /// border is one street), everything else within a few meters and only
    /// with an equal address.
    fn is_duplicate(&self, kept: &RankerResult, later: &RankerResult) -> bool {
        if !kept.same_name_and_type(later) {
            return false;
        }
        let d = distance_m(kept.result.center, later.result.center);
        if kept.geom_kind == GeomKind::Line && later.geom_kind == GeomKind::Line {
            return d <= self.params.duplicate_linear_distance_m;
        }
        kept.geom_kind == later.geom_kind
            && kept.result.address == later.result.address
            && d < self.params.min_distance_between_results_m
    }
}
