//! Cheap first stage between the geocoder and the ranker: deduplicates raw
//! hits, computes their distance to the pivot and hands them over in
//! batches.

use std::cmp::Ordering;

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use offgrid_data::{
    FeatureId, FeatureRef, MapTile, TileId,
    geometry::{Point, Rect, distance_m, rect_around},
};
use tracing::{debug, warn};

use crate::{
    cancel::CancelResult,
    config::{RankingWeights, SearchConfig},
    context::SearchContext,
    ranking::info::{MAX_DISTANCE_M, PreRankerResult},
};

const NESTED_RADII_M: [f64; 4] = [100.0, 300.0, 1_000.0, 2_500.0];
/// The nested rects are rebuilt once the pivot moves further than this.
const PIVOT_MOVE_TOLERANCE_M: f64 = 15.0;

/// Approximate distance to the pivot from four nested squares around it.
///
/// A feature inside the smallest square containing it gets that square's
/// radius as distance. Used when a feature has no center in its tile.
#[derive(Debug, Default)]
pub struct NestedRectsCache {
    pivot: Option<Point>,
    levels: [HashMap<TileId, HashSet<FeatureId>>; NESTED_RADII_M.len()],
}

impl NestedRectsCache {
    pub fn set_pivot(&mut self, pivot: Point) {
        if self
            .pivot
            .is_some_and(|p| distance_m(p, pivot) <= PIVOT_MOVE_TOLERANCE_M)
        {
            return;
        }
        self.clear();
        self.pivot = Some(pivot);
    }

    pub fn distance(&mut self, tile: &MapTile, id: FeatureId) -> f64 {
        let Some(pivot) = self.pivot else {
            return MAX_DISTANCE_M;
        };
        for (level, radius) in self.levels.iter_mut().zip(NESTED_RADII_M) {
            let ids = level.entry(tile.id()).or_insert_with(|| {
                let mut ids = HashSet::new();
                tile.features.for_each_in_rect(
                    &rect_around(pivot, radius),
                    u8::MAX,
                    &mut |id| {
                        ids.insert(id);
                    },
                );
                ids
            });
            if ids.contains(&id) {
                return radius;
            }
        }
        MAX_DISTANCE_M
    }

    pub fn clear(&mut self) {
        self.pivot = None;
        for level in &mut self.levels {
            level.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(|level| level.is_empty())
    }
}

/// Per-query settings of the pre-ranker.
#[derive(Debug, Clone)]
pub struct PreRankerParams {
    pub pivot: Point,
    pub viewport: Rect,
    pub viewport_search: bool,
    pub batch_size: usize,
    pub limit: usize,
    pub rank_threshold: f64,
    pub weights: RankingWeights,
}

impl PreRankerParams {
    pub fn new(config: &SearchConfig, pivot: Point, viewport: Rect, viewport_search: bool) -> Self {
        Self {
            pivot,
            viewport,
            viewport_search,
            batch_size: config.batch_size.max(1),
            limit: config.preranker_limit,
            rank_threshold: config.viewport_rank_threshold,
            weights: config.ranking,
        }
    }
}

pub struct PreRanker {
    params: PreRankerParams,
    pending: Vec<PreRankerResult>,
    /// Position of a pending feature in `pending`.
    slots: HashMap<FeatureRef, usize>,
    sent: HashSet<FeatureRef>,
    have_full_match: bool,
    /// Features shown by the previous viewport search.
    prev_emit: HashSet<FeatureRef>,
    pivot_cache: NestedRectsCache,
}

impl PreRanker {
    pub fn new(params: PreRankerParams) -> Self {
        let mut pivot_cache = NestedRectsCache::default();
        pivot_cache.set_pivot(params.pivot);
        Self {
            params,
            pending: Vec::new(),
            slots: HashMap::new(),
            sent: HashSet::new(),
            have_full_match: false,
            prev_emit: HashSet::new(),
            pivot_cache,
        }
    }

    /// Starts a new query. The previous viewport emit set survives.
    pub fn reset(&mut self, params: PreRankerParams) {
        self.pivot_cache.set_pivot(params.pivot);
        self.params = params;
        self.pending.clear();
        self.slots.clear();
        self.sent.clear();
        self.have_full_match = false;
    }

    pub fn params(&self) -> &PreRankerParams {
        &self.params
    }

    pub fn num_sent(&self) -> usize {
        self.sent.len()
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// True when the rest of the search can be skipped.
    pub fn enough(&self) -> bool {
        !self.params.viewport_search
            && self.have_full_match
            && self.num_sent() >= self.params.batch_size
    }

    /// Adds a raw hit. Hits on an already known feature only replace it
    /// when they cover more of the query.
    pub fn emplace(&mut self, ctx: &SearchContext, mut result: PreRankerResult) {
        if self.sent.contains(&result.id) {
            return;
        }
        let Some(tile) = ctx.tile(result.id.tile) else {
            warn!(tile = result.id.tile.0, "Hit in an unknown tile dropped");
            return;
        };
        let Some(feature) = tile.feature(result.id.id) else {
            warn!(tile = result.id.tile.0, id = result.id.id, "Missing feature dropped");
            return;
        };
        result.info.rank = feature.rank;
        result.info.popularity = feature.popularity;
        match tile.center(result.id.id) {
            Some(center) => {
                result.info.center = Some(center);
                result.info.distance_to_pivot_m = distance_m(center, self.params.pivot);
            }
            None => {
                result.info.center = None;
                result.info.distance_to_pivot_m = self.pivot_cache.distance(tile, result.id.id);
            }
        }
        if result.info.all_tokens_used && result.info.exact_match {
            self.have_full_match = true;
        }

        match self.slots.get(&result.id) {
            Some(&slot) => {
                if covers_more(&result, &self.pending[slot]) {
                    self.pending[slot] = result;
                }
            }
            None => {
                self.slots.insert(result.id, self.pending.len());
                self.pending.push(result);
            }
        }
    }

    /// Flushes pending hits to `sink` in batches of at most `batch_size`.
    /// Only the last update drains everything up to the limit; viewport
    /// searches flush only on the last update.
    pub fn update(
        &mut self,
        last: bool,
        sink: &mut impl FnMut(Vec<PreRankerResult>) -> CancelResult<()>,
    ) -> CancelResult<()> {
        if self.params.viewport_search {
            if last {
                let batch = self.take_viewport();
                if !batch.is_empty() {
                    sink(batch)?;
                }
            }
            return Ok(());
        }

        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                break;
            }
            debug!(
                size = batch.len(),
                sent = self.num_sent(),
                pending = self.pending.len(),
                "Pre-ranker flush"
            );
            sink(batch)?;
            if !last {
                break;
            }
        }
        Ok(())
    }

    /// The nearest half by distance, the rest by linear rank.
    fn take_batch(&mut self) -> Vec<PreRankerResult> {
        let room = self.params.limit.saturating_sub(self.num_sent());
        let n = self.params.batch_size.min(room).min(self.pending.len());
        if n == 0 {
            return Vec::new();
        }

        self.pending.sort_by(|a, b| {
            a.info
                .distance_to_pivot_m
                .total_cmp(&b.info.distance_to_pivot_m)
                .then_with(|| b.info.rank.cmp(&a.info.rank))
        });
        let mut batch: Vec<PreRankerResult> = self.pending.drain(..n / 2).collect();

        let weights = self.params.weights;
        self.pending.sort_by(|a, b| by_linear_rank(a, b, &weights));
        batch.extend(self.pending.drain(..n - batch.len()));

        self.reindex();
        for r in &batch {
            self.sent.insert(r.id);
        }
        batch
    }

    /// Keeps hits whose linear rank is close to the best one, preferring
    /// the ones shown last time.
    fn take_viewport(&mut self) -> Vec<PreRankerResult> {
        let weights = self.params.weights;
        let best = self
            .pending
            .iter()
            .map(|r| r.info.linear_rank(&weights))
            .fold(f64::NEG_INFINITY, f64::max);
        let threshold = best - self.params.rank_threshold;

        let mut batch: Vec<PreRankerResult> = self
            .pending
            .drain(..)
            .filter(|r| r.info.linear_rank(&weights) >= threshold)
            .collect();
        let prev = &self.prev_emit;
        batch.sort_by(|a, b| {
            prev.contains(&b.id)
                .cmp(&prev.contains(&a.id))
                .then_with(|| by_linear_rank(a, b, &weights))
        });
        batch.truncate(self.params.limit);

        self.slots.clear();
        self.prev_emit = batch.iter().map(|r| r.id).collect();
        self.sent.extend(batch.iter().map(|r| r.id));
        batch
    }

    fn reindex(&mut self) {
        self.slots.clear();
        for (i, r) in self.pending.iter().enumerate() {
            self.slots.insert(r.id, i);
        }
    }

    pub fn clear_caches(&mut self) {
        self.pivot_cache.clear();
        self.pivot_cache.set_pivot(self.params.pivot);
    }

    /// Forgets the features shown by the last viewport search.
    pub fn clear_viewport_history(&mut self) {
        self.prev_emit.clear();
    }
}

fn by_linear_rank(a: &PreRankerResult, b: &PreRankerResult, w: &RankingWeights) -> Ordering {
    b.info
        .linear_rank(w)
        .total_cmp(&a.info.linear_rank(w))
        .then_with(|| a.id.cmp(&b.id))
}

fn covers_more(a: &PreRankerResult, b: &PreRankerResult) -> bool {
    let covered = |r: &PreRankerResult| r.info.token_ranges.iter().map(|(_, t)| t.len()).sum::<usize>();
    (a.info.all_tokens_used, a.info.exact_match, covered(a))
        > (b.info.all_tokens_used, b.info.exact_match, covered(b))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        model::SearchType,
        query::TokenRange,
        ranking::info::PreRankingInfo,
    };
    use offgrid_data::{
        CategoriesTable, CitiesBoundaries, RegionInfo, Synonyms,
        test_data::{COUNTRY_TILE, grid_tile, standard_classificator},
    };

    fn grid_context() -> SearchContext {
        let classif = Arc::new(standard_classificator());
        let tile = grid_tile(classif.clone(), 0.001).unwrap();
        SearchContext::new(
            classif,
            CategoriesTable::new(),
            Synonyms::new(),
            RegionInfo::new(Vec::new()),
            CitiesBoundaries::new(),
            vec![Arc::new(tile)],
        )
        .unwrap()
    }

    fn params(batch_size: usize, viewport_search: bool) -> PreRankerParams {
        let pivot = Point::new(0.0, 0.0);
        PreRankerParams {
            pivot,
            viewport: rect_around(pivot, 5_000.0),
            viewport_search,
            batch_size,
            limit: 1_000,
            rank_threshold: 0.5,
            weights: RankingWeights::default(),
        }
    }

    fn hit(id: FeatureId) -> PreRankerResult {
        let mut info = PreRankingInfo::new(SearchType::SubPoi);
        info.token_ranges.set(SearchType::SubPoi, TokenRange::new(0, 1));
        info.all_tokens_used = true;
        PreRankerResult::new(FeatureRef::new(COUNTRY_TILE, id), info)
    }

    #[test]
    fn test_grid_is_flushed_in_bounded_batches() {
        let ctx = grid_context();
        let tile = ctx.tile(COUNTRY_TILE).unwrap().clone();
        let num = tile.features.num_features();
        let batch_size = (num as usize).div_ceil(2);
        let mut pre_ranker = PreRanker::new(params(batch_size, false));
        for id in 0..num {
            pre_ranker.emplace(&ctx, hit(id));
        }

        let mut batches: Vec<Vec<PreRankerResult>> = Vec::new();
        pre_ranker
            .update(false, &mut |b| {
                batches.push(b);
                Ok(())
            })
            .unwrap();
        assert_eq!(batches.len(), 1);
        pre_ranker
            .update(true, &mut |b| {
                batches.push(b);
                Ok(())
            })
            .unwrap();

        let mut seen = HashSet::new();
        for batch in &batches {
            assert!(batch.len() <= batch_size);
            for r in batch {
                assert!(seen.insert(r.id), "{:?} sent twice", r.id);
                let center = tile.center(r.id.id).unwrap();
                let expected = distance_m(center, Point::new(0.0, 0.0));
                assert!((r.info.distance_to_pivot_m - expected).abs() < 1.0);
            }
        }
        assert_eq!(seen.len(), num as usize);
        assert_eq!(pre_ranker.num_pending(), 0);
    }

    #[test]
    fn test_first_half_of_batch_is_nearest() {
        let ctx = grid_context();
        let mut pre_ranker = PreRanker::new(params(10, false));
        for id in 0..121 {
            pre_ranker.emplace(&ctx, hit(id));
        }
        let mut batch = Vec::new();
        pre_ranker
            .update(false, &mut |b| {
                batch = b;
                Ok(())
            })
            .unwrap();
        assert_eq!(batch.len(), 10);
        // The cafe at the pivot comes first.
        assert!(batch[0].info.distance_to_pivot_m < 1.0);
        assert!(batch[..5].iter().all(|r| r.info.distance_to_pivot_m < 150.0));
    }

    #[test]
    fn test_duplicates_and_limit() {
        let ctx = grid_context();
        let mut p = params(5, false);
        p.limit = 3;
        let mut pre_ranker = PreRanker::new(p);
        for id in [1, 1, 2, 3, 4, 5] {
            pre_ranker.emplace(&ctx, hit(id));
        }
        assert_eq!(pre_ranker.num_pending(), 5);
        let mut total = 0;
        pre_ranker
            .update(true, &mut |b| {
                total += b.len();
                Ok(())
            })
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(pre_ranker.num_sent(), 3);
    }

    #[test]
    fn test_missing_features_are_dropped() {
        let ctx = grid_context();
        let mut pre_ranker = PreRanker::new(params(5, false));
        pre_ranker.emplace(&ctx, hit(10_000));
        assert_eq!(pre_ranker.num_pending(), 0);
    }

    #[test]
    fn test_enough_after_full_match_batch() {
        let ctx = grid_context();
        let mut pre_ranker = PreRanker::new(params(2, false));
        for id in 0..4 {
            pre_ranker.emplace(&ctx, hit(id));
        }
        assert!(!pre_ranker.enough());
        let mut exact = hit(4);
        exact.info.exact_match = true;
        pre_ranker.emplace(&ctx, exact);
        pre_ranker.update(false, &mut |_| Ok(())).unwrap();
        assert!(pre_ranker.enough());
    }

    #[test]
    fn test_viewport_search_prefers_previous_results() {
        let ctx = grid_context();
        let mut p = params(100, true);
        p.limit = 1;
        let mut pre_ranker = PreRanker::new(p.clone());
        pre_ranker.emplace(&ctx, hit(7));
        pre_ranker.update(false, &mut |_| panic!("viewport flushes only at the end")).unwrap();
        let mut first = Vec::new();
        pre_ranker
            .update(true, &mut |b| {
                first = b;
                Ok(())
            })
            .unwrap();
        assert_eq!(first.len(), 1);
        let shown = first[0].id;

        pre_ranker.reset(p);
        for id in [shown.id, 60] {
            pre_ranker.emplace(&ctx, hit(id));
        }
        let mut second = Vec::new();
        pre_ranker
            .update(true, &mut |b| {
                second = b;
                Ok(())
            })
            .unwrap();
        assert_eq!(second.iter().map(|r| r.id).collect::<Vec<_>>(), vec![shown]);
    }

    #[test]
    fn test_nested_rects_distance() {
        let ctx = grid_context();
        let tile = ctx.tile(COUNTRY_TILE).unwrap();
        let mut cache = NestedRectsCache::default();
        cache.set_pivot(Point::new(0.0, 0.0));
        // Feature 60 sits on the pivot, feature 0 at (-0.005, -0.005).
        assert_eq!(cache.distance(tile, 60), 100.0);
        assert_eq!(cache.distance(tile, 0), 1_000.0);
        assert!(!cache.is_empty());

        cache.set_pivot(Point::new(0.00001, 0.0));
        assert!(!cache.is_empty());
        cache.set_pivot(Point::new(1.0, 0.0));
        assert!(cache.is_empty());
        assert_eq!(cache.distance(tile, 60), MAX_DISTANCE_M);
    }
}
