//! The geocoder: splits the query tokens into localities and feature
//! layers, joins the layers tile by tile and reports every interpretation
//! it finds as a raw hit.
//!
//! Per tile, localities are matched first (country, then state, then city
//! or village, every level optional). The tokens left over are searched
//! inside the matched city, or around the pivot when no city matched.
//! That layer search is a depth-first walk over the token ranges that
//! start at the first unused token, with an explicit stack of frames.

pub mod filter;
pub mod localities;
pub mod tiles;

use std::{sync::Arc, time::Instant};

use ahash::AHashMap as HashMap;
use itertools::Itertools;
use offgrid_data::{
    FeatureId, FeatureRef, MapTile, TileId,
    geometry::Rect,
};
use tracing::{debug, instrument, warn};

use crate::{
    cancel::{CancelResult, CancelToken},
    config::SearchConfig,
    context::SearchContext,
    layers::{
        FeaturesLayer, FeaturesLayerMatcher, FeaturesLayerPathFinder, IntersectionResult,
        MatcherCaches,
    },
    model::SearchType,
    params::Mode,
    query::{
        QueryParams, TokenRange,
        house_numbers::looks_like_house_number,
        postcodes::{MAX_POSTCODE_TOKENS, looks_like_postcode},
    },
    ranking::info::{PreRankerResult, PreRankingInfo},
};

pub use filter::{RectFeaturesCache, SearchFilter, intersect};
pub use localities::{Locality, find_localities};
pub use tiles::{TileOrder, order_tiles};

const WORLD_LOCALITIES: [SearchType; 3] = [SearchType::Country, SearchType::State, SearchType::City];
const TILE_LOCALITIES: [SearchType; 2] = [SearchType::Village, SearchType::City];

/// Receives the raw hits of the geocoder.
pub trait HitSink {
    fn emplace(&mut self, hit: PreRankerResult);

    /// Hits handed over to ranking so far.
    fn num_sent(&self) -> usize;

    /// Called after every searched tile near the pivot and once more with
    /// `last` set when the search ends.
    fn update(&mut self, last: bool) -> CancelResult<()>;

    /// True when the remaining tiles need not be searched.
    fn enough(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct GeocoderParams {
    pub query: QueryParams,
    pub mode: Mode,
    /// Area searched when the query names no city.
    pub pivot: Rect,
    pub viewport: Rect,
}

/// Drives the search over all tiles of a [`SearchContext`]. Owns the
/// per-query caches, which are emptied by [`clear_caches`](Self::clear_caches).
pub struct Geocoder {
    ctx: Arc<SearchContext>,
    config: SearchConfig,
    matcher_caches: HashMap<TileId, MatcherCaches>,
    rect_features: RectFeaturesCache,
}

impl Geocoder {
    pub fn new(ctx: Arc<SearchContext>, config: SearchConfig) -> Self {
        Self {
            ctx,
            config,
            matcher_caches: HashMap::new(),
            rect_features: RectFeaturesCache::default(),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SearchConfig) {
        self.config = config;
        self.clear_caches();
    }

    pub fn clear_caches(&mut self) {
        self.matcher_caches.clear();
        self.rect_features.clear();
    }

    pub fn has_cached_data(&self) -> bool {
        !self.matcher_caches.values().all(MatcherCaches::is_empty) || !self.rect_features.is_empty()
    }

    #[instrument(
        name = "Geocode",
        level = "debug",
        skip_all,
        fields(query = params.query.raw(), mode = ?params.mode)
    )]
    pub fn go<S: HitSink>(
        &mut self,
        params: &GeocoderParams,
        cancel: &CancelToken,
        sink: &mut S,
    ) -> CancelResult<()> {
        let t = Instant::now();
        let query = &params.query;
        if query.is_empty() || params.mode == Mode::Bookmarks {
            return sink.update(true);
        }
        let ctx = &*self.ctx;
        let viewport_search = params.mode == Mode::Viewport;
        let order = order_tiles(ctx.tiles(), params.mode, &params.pivot, &params.viewport);
        debug!(
            tiles = order.tiles.len(),
            intersecting = order.num_intersecting,
            "Tiles ordered"
        );

        let world_localities = match ctx.world() {
            Some(world) => {
                let restrict = viewport_search.then(|| self.rect_features.get(world, &params.viewport));
                let base = BaseContext::new(world, query, restrict.as_deref().map(Vec::as_slice));
                find_localities(
                    world,
                    &ctx.model,
                    query,
                    &base.token_ids,
                    &base.exact_last,
                    &WORLD_LOCALITIES,
                    self.config.max_localities_per_kind,
                )
            }
            None => Vec::new(),
        };

        for (index, tile) in order.tiles.iter().enumerate() {
            cancel.check()?;
            let tile_start = Instant::now();
            let restrict = viewport_search.then(|| self.rect_features.get(tile, &params.viewport));
            let base = BaseContext::new(tile, query, restrict.as_deref().map(Vec::as_slice));

            let mut localities = world_localities.clone();
            if !tile.is_world() {
                localities.extend(find_localities(
                    tile,
                    &ctx.model,
                    query,
                    &base.token_ids,
                    &base.exact_last,
                    &TILE_LOCALITIES,
                    self.config.max_localities_per_kind,
                ));
            }

            let mut search = TileSearch {
                ctx,
                config: &self.config,
                cancel,
                query,
                tile: tile.as_ref(),
                caches: self.matcher_caches.entry(tile.id()).or_default(),
                rect_features: &mut self.rect_features,
                sink: &mut *sink,
                used: vec![false; query.len()],
                base,
                localities,
                chain: Vec::new(),
                postcode: None,
                types: HashMap::new(),
                emitted: 0,
            };
            search.match_regions(SearchType::Country)?;
            if !tile.is_world() && (index < order.num_intersecting || search.sink.num_sent() == 0) {
                search.match_around_pivot(&params.pivot)?;
            }
            debug!(
                tile = tile.name(),
                hits = search.emitted,
                elapsed_ms = tile_start.elapsed().as_millis(),
                "Tile searched"
            );

            if index + 1 >= order.num_intersecting {
                sink.update(false)?;
                if sink.enough() {
                    debug!(tile = tile.name(), "Enough results, search stopped");
                    break;
                }
            }
        }
        sink.update(true)?;
        debug!(elapsed_ms = t.elapsed().as_millis(), "Geocoding done");
        Ok(())
    }
}

/// Per-token candidates of one tile.
#[derive(Debug, Default)]
struct BaseContext {
    /// Sorted ids of every query token: name matches of the token and its
    /// synonyms (prefix matches for the prefix token) plus features of
    /// the categories it names.
    token_ids: Vec<Vec<FeatureId>>,
    /// Ids matching the last token as a whole word.
    exact_last: Vec<FeatureId>,
}

impl BaseContext {
    fn new(tile: &MapTile, query: &QueryParams, restrict: Option<&[FeatureId]>) -> Self {
        let lookup = |i: usize, prefix: bool| -> Vec<FeatureId> {
            let token = query.token(i);
            let names = token.forms().map(|form| {
                if prefix {
                    tile.index.prefix(form)
                } else {
                    tile.index.exact(form)
                }
            });
            let types = token.categories.iter().map(|&t| tile.index.by_type(t));
            let ids: Vec<FeatureId> = names.chain(types).kmerge().dedup().collect();
            match restrict {
                Some(area) => intersect(&ids, area),
                None => ids,
            }
        };

        let token_ids: Vec<Vec<FeatureId>> = (0..query.len())
            .map(|i| lookup(i, query.is_prefix_token(i)))
            .collect();
        let exact_last = match query.len().checked_sub(1) {
            Some(last) if query.last_token_is_prefix() => lookup(last, false),
            Some(last) => token_ids[last].clone(),
            None => Vec::new(),
        };
        Self {
            token_ids,
            exact_last,
        }
    }
}

/// Layers on the stack of one frame still to be tried.
struct Frame {
    candidates: Vec<FeaturesLayer>,
    /// The frame's current candidate is on the layer stack.
    pushed: bool,
}

/// Features carrying the postcode typed in the query.
struct Postcode {
    range: TokenRange,
    /// Sorted.
    features: Vec<FeatureId>,
}

impl Postcode {
    fn contains(&self, id: FeatureId) -> bool {
        self.features.binary_search(&id).is_ok()
    }
}

/// Search state of one tile.
struct TileSearch<'a, S: HitSink> {
    ctx: &'a SearchContext,
    config: &'a SearchConfig,
    cancel: &'a CancelToken,
    query: &'a QueryParams,
    tile: &'a MapTile,
    caches: &'a mut MatcherCaches,
    rect_features: &'a mut RectFeaturesCache,
    sink: &'a mut S,
    base: BaseContext,
    localities: Vec<Locality>,
    /// Tokens consumed by the localities on `chain` and the layer stack.
    used: Vec<bool>,
    /// Matched localities, outermost first.
    chain: Vec<Locality>,
    /// Set while the layers are searched under a postcode.
    postcode: Option<Postcode>,
    types: HashMap<FeatureId, Option<SearchType>>,
    emitted: usize,
}

impl<S: HitSink> TileSearch<'_, S> {
    fn all_used(&self) -> bool {
        self.used.iter().all(|&u| u)
    }

    fn is_free(&self, range: TokenRange) -> bool {
        range.iter().all(|i| !self.used[i])
    }

    fn set_used(&mut self, range: TokenRange, used: bool) {
        for i in range.iter() {
            self.used[i] = used;
        }
    }

    fn push_locality(&mut self, locality: Locality) {
        self.set_used(locality.range, true);
        self.chain.push(locality);
    }

    fn pop_locality(&mut self) {
        if let Some(locality) = self.chain.pop() {
            self.set_used(locality.range, false);
        }
    }

    fn candidates(&self, kinds: &[SearchType]) -> Vec<Locality> {
        self.localities
            .iter()
            .filter(|l| kinds.contains(&l.search_type))
            .cloned()
            .collect()
    }

    /// Both localities lie in the same region, or the regions are unknown.
    fn nests_in(&self, inner: &Locality, outer: &Locality) -> bool {
        let regions = &self.ctx.regions;
        match (regions.region_at(inner.center), regions.region_at(outer.center)) {
            (Some(a), Some(b)) => a.code == b.code,
            _ => true,
        }
    }

    fn region_covers_tile(&self, region: &Locality) -> bool {
        self.ctx
            .regions
            .region_at(region.center)
            .is_some_and(|r| r.tiles.contains(&self.tile.id()))
    }

    fn innermost_region(&self) -> Option<&Locality> {
        self.chain.iter().rev().find(|l| l.is_region())
    }

    fn city(&self) -> Option<&Locality> {
        self.chain.iter().rev().find(|l| !l.is_region())
    }

    fn search_type(&mut self, id: FeatureId) -> Option<SearchType> {
        if let Some(&t) = self.types.get(&id) {
            return t;
        }
        let addresses = &self.tile.addresses;
        let t = if addresses.is_street(id) {
            Some(SearchType::Street)
        } else if addresses.villages().binary_search(&id).is_ok() {
            Some(SearchType::Village)
        } else if let Some(feature) = self.tile.feature(id) {
            Some(self.ctx.model.search_type(feature))
        } else {
            warn!(tile = self.tile.name(), id, "Missing feature, dropped");
            None
        };
        self.types.insert(id, t);
        t
    }

    fn emit(&mut self, hit: PreRankerResult) {
        self.emitted += 1;
        self.sink.emplace(hit);
    }

    fn emit_locality(&mut self, locality: &Locality) {
        // Each locality is reported once, from its own tile.
        if locality.id.tile != self.tile.id() {
            return;
        }
        let mut info = PreRankingInfo::new(locality.search_type);
        for l in &self.chain {
            info.token_ranges.set(l.search_type, l.range);
        }
        info.all_tokens_used = info.covers_all_tokens(self.query.len());
        info.exact_match = self.exact_in_chain();
        let mut hit = PreRankerResult::new(locality.id, info);
        if !locality.is_region() {
            hit.locality = Some(locality.id);
        }
        debug!(id = ?locality.id, search_type = %locality.search_type, "Locality hit");
        self.emit(hit);
    }

    /// Exact-match flag of the chain locality holding the last token, true
    /// when none holds it.
    fn exact_in_chain(&self) -> bool {
        let Some(last) = self.query.len().checked_sub(1) else {
            return true;
        };
        self.chain
            .iter()
            .find(|l| l.range.contains(last))
            .is_none_or(|l| l.exact_match)
    }

    fn is_exact(&self, range: TokenRange, id: FeatureId) -> bool {
        !self.query.range_has_prefix(range) || self.base.exact_last.binary_search(&id).is_ok()
    }

    fn new_info(&self, search_type: SearchType) -> PreRankingInfo {
        let mut info = PreRankingInfo::new(search_type);
        for l in &self.chain {
            info.token_ranges.set(l.search_type, l.range);
        }
        info.postcode = self.postcode.as_ref().map(|p| p.range);
        info
    }

    /// Countries, then states. Every level is also skipped.
    fn match_regions(&mut self, kind: SearchType) -> CancelResult<()> {
        let next = (kind == SearchType::Country).then_some(SearchType::State);
        match next {
            Some(next) => self.match_regions(next)?,
            None => self.match_cities()?,
        }

        for region in self.candidates(&[kind]) {
            self.cancel.check()?;
            if !self.is_free(region.range) {
                continue;
            }
            if !self.tile.is_world() && !self.region_covers_tile(&region) {
                continue;
            }
            if let Some(outer) = self.innermost_region()
                && !self.nests_in(&region, outer)
            {
                continue;
            }
            self.push_locality(region.clone());
            if self.all_used() {
                self.emit_locality(&region);
            } else {
                match next {
                    Some(next) => self.match_regions(next)?,
                    None => self.match_cities()?,
                }
            }
            self.pop_locality();
        }
        Ok(())
    }

    /// Cities and villages inside the matched region, if any. The rest of
    /// the query is searched inside each of them.
    fn match_cities(&mut self) -> CancelResult<()> {
        for city in self.candidates(&TILE_LOCALITIES) {
            self.cancel.check()?;
            if !self.is_free(city.range) {
                continue;
            }
            if let Some(region) = self.innermost_region()
                && !self.nests_in(&city, region)
            {
                continue;
            }
            self.push_locality(city.clone());
            if self.all_used() {
                self.emit_locality(&city);
            } else if !self.tile.is_world() {
                let features = self.rect_features.get(self.tile, &city.search_rect());
                debug!(city = ?city.id, features = features.len(), "Searching in locality");
                self.limited_search(&SearchFilter::Locality(features))?;
            }
            self.pop_locality();
        }

        // A matched region without a city: the whole tile lies inside it.
        if !self.tile.is_world() && self.chain.last().is_some_and(Locality::is_region) {
            self.limited_search(&SearchFilter::None)?;
        }
        Ok(())
    }

    fn match_around_pivot(&mut self, pivot: &Rect) -> CancelResult<()> {
        let features = self.rect_features.get(self.tile, pivot);
        let filter = SearchFilter::Viewport {
            features,
            threshold: self.config.preranker_limit,
        };
        self.limited_search(&filter)
    }

    fn limited_search(&mut self, filter: &SearchFilter) -> CancelResult<()> {
        self.match_unclassified(filter)?;
        if self.tile.addresses.has_postcodes() {
            self.with_postcodes(filter)?;
        }
        self.match_layers(filter)
    }

    /// Searches the layers once more for every free token run that names
    /// a postcode of the tile, with those tokens used up and the POIs and
    /// buildings restricted to that postcode.
    fn with_postcodes(&mut self, filter: &SearchFilter) -> CancelResult<()> {
        for start in 0..self.query.len() {
            let mut end = start;
            for e in start + 1..=(start + MAX_POSTCODE_TOKENS).min(self.query.len()) {
                if self.used[e - 1] {
                    break;
                }
                let range = TokenRange::new(start, e);
                if looks_like_postcode(&self.query.range_text(range), self.query.range_has_prefix(range)) {
                    end = e;
                }
            }
            if end == start {
                continue;
            }
            self.cancel.check()?;
            let range = TokenRange::new(start, end);
            let features = self
                .tile
                .addresses
                .with_postcode(&self.query.range_text(range), self.query.range_has_prefix(range));
            if features.is_empty() {
                continue;
            }
            debug!(%range, features = features.len(), "Searching under postcode");
            self.set_used(range, true);
            self.postcode = Some(Postcode { range, features });
            let result = if self.all_used() {
                self.emit_postcode_features(filter)
            } else {
                self.match_layers(filter)
            };
            self.postcode = None;
            self.set_used(range, false);
            result?;
        }
        Ok(())
    }

    /// The query is a postcode and nothing else: every feature with it is
    /// a hit.
    fn emit_postcode_features(&mut self, filter: &SearchFilter) -> CancelResult<()> {
        let Some(postcode) = &self.postcode else {
            return Ok(());
        };
        let range = postcode.range;
        let features = filter.apply(postcode.features.clone());
        let exact = self
            .tile
            .addresses
            .with_postcode(&self.query.range_text(range), false);
        for id in features {
            self.cancel.check()?;
            let Some(search_type) = self.search_type(id) else {
                continue;
            };
            let mut info = self.new_info(search_type);
            info.token_ranges.set(search_type, range);
            info.all_tokens_used = info.covers_all_tokens(self.query.len());
            info.exact_match = exact.binary_search(&id).is_ok() && self.exact_in_chain();
            let mut hit = PreRankerResult::new(FeatureRef::new(self.tile.id(), id), info);
            hit.locality = self.city().map(|c| c.id);
            self.emit(hit);
        }
        Ok(())
    }

    /// Parks, rivers and other unclassified features, matched directly when
    /// the unused tokens form one group.
    fn match_unclassified(&mut self, filter: &SearchFilter) -> CancelResult<()> {
        let unused: Vec<usize> = (0..self.used.len()).filter(|&i| !self.used[i]).collect();
        let (Some(&first), Some(&last)) = (unused.first(), unused.last()) else {
            return Ok(());
        };
        if last + 1 - first != unused.len() {
            return Ok(());
        }
        self.cancel.check()?;
        let range = TokenRange::new(first, last + 1);
        let mut ids = self.base.token_ids[first].clone();
        for i in first + 1..=last {
            ids = intersect(&ids, &self.base.token_ids[i]);
        }
        for id in filter.apply(ids) {
            if self.search_type(id) != Some(SearchType::Unclassified) {
                continue;
            }
            let mut info = self.new_info(SearchType::Unclassified);
            info.token_ranges.set(SearchType::Unclassified, range);
            info.all_tokens_used = info.covers_all_tokens(self.query.len());
            info.exact_match = self.is_exact(range, id) && self.exact_in_chain();
            let mut hit = PreRankerResult::new(FeatureRef::new(self.tile.id(), id), info);
            hit.locality = self.city().map(|c| c.id);
            self.emit(hit);
        }
        Ok(())
    }

    /// Designator words like "street" or "ул" name no street on their own.
    fn is_street_words_only(&self, range: TokenRange) -> bool {
        range.iter().all(|i| {
            self.query
                .token(i)
                .forms()
                .any(|form| self.ctx.synonyms.is_street_word(form))
        })
    }

    /// Candidate layers for every token range starting at the first unused
    /// token, shortest ranges first.
    fn layer_candidates(&mut self, filter: &SearchFilter) -> CancelResult<Vec<FeaturesLayer>> {
        let Some(start) = self.used.iter().position(|&u| !u) else {
            return Ok(Vec::new());
        };
        let mut candidates = Vec::new();
        let mut ids: Vec<FeatureId> = Vec::new();
        for end in start + 1..=self.query.len() {
            if self.used[end - 1] {
                break;
            }
            self.cancel.check()?;
            let range = TokenRange::new(start, end);
            ids = if end == start + 1 {
                self.base.token_ids[start].clone()
            } else {
                intersect(&ids, &self.base.token_ids[end - 1])
            };
            let filtered = filter.apply(ids.clone());
            let house_number = looks_like_house_number(
                &self.query.range_text(range),
                self.query.range_has_prefix(range),
            );
            if filtered.is_empty() && !house_number {
                break;
            }

            let mut clusters: [Vec<FeatureId>; SearchType::LAYER_TYPES.len()] = Default::default();
            for id in filtered {
                let Some(t) = self.search_type(id) else {
                    continue;
                };
                if t < SearchType::Street
                    && self.postcode.as_ref().is_some_and(|p| !p.contains(id))
                {
                    continue;
                }
                if let Some(slot) = SearchType::LAYER_TYPES.iter().position(|&l| l == t) {
                    clusters[slot].push(id);
                }
            }
            let street_words_only = self.is_street_words_only(range);
            for (&search_type, cluster) in SearchType::LAYER_TYPES.iter().zip(clusters) {
                if search_type == SearchType::Street && street_words_only {
                    continue;
                }
                if !cluster.is_empty() {
                    candidates.push(FeaturesLayer::new(search_type, range, cluster, self.query));
                } else if search_type == SearchType::Building && house_number {
                    candidates.push(FeaturesLayer::delayed_buildings(range, self.query));
                }
            }
        }
        // Popped from the back.
        candidates.reverse();
        Ok(candidates)
    }

    fn match_layers(&mut self, filter: &SearchFilter) -> CancelResult<()> {
        let mut layers: Vec<FeaturesLayer> = Vec::new();
        let mut stack = vec![Frame {
            candidates: self.layer_candidates(filter)?,
            pushed: false,
        }];
        while let Some(frame) = stack.last_mut() {
            if frame.pushed {
                frame.pushed = false;
                if let Some(layer) = layers.pop() {
                    self.set_used(layer.range, false);
                }
            }
            let Some(layer) = frame.candidates.pop() else {
                stack.pop();
                continue;
            };
            if !is_sane(&layers, &layer) {
                continue;
            }
            frame.pushed = true;
            self.set_used(layer.range, true);
            layers.push(layer);

            self.find_paths(&layers)?;
            if layers.len() < self.config.max_layers && !self.all_used() {
                let candidates = self.layer_candidates(filter)?;
                stack.push(Frame {
                    candidates,
                    pushed: false,
                });
            }
        }
        Ok(())
    }

    fn find_paths(&mut self, layers: &[FeaturesLayer]) -> CancelResult<()> {
        if let [street] = layers
            && street.search_type == SearchType::Street
            && self.all_used()
            && let Some(postcode) = &self.postcode
        {
            let buildings = FeaturesLayer::new(
                SearchType::Building,
                postcode.range,
                postcode.features.clone(),
                self.query,
            );
            return self.match_postcode_street(street, &buildings);
        }
        self.join_layers(layers)
    }

    /// A street plus a postcode: the street itself when it carries the
    /// postcode, and every building with the postcode on it.
    fn match_postcode_street(
        &mut self,
        street: &FeaturesLayer,
        buildings: &FeaturesLayer,
    ) -> CancelResult<()> {
        let on_street: Vec<FeatureId> = street
            .features
            .iter()
            .copied()
            .filter(|&id| self.postcode.as_ref().is_some_and(|p| p.contains(id)))
            .collect();
        for id in on_street {
            let mut path = IntersectionResult::default();
            path.set(SearchType::Street, id);
            self.emit_path(&[street], &path);
        }
        self.join_layers(&[buildings.clone(), street.clone()])
    }

    fn join_layers(&mut self, layers: &[FeaturesLayer]) -> CancelResult<()> {
        let mut sorted: Vec<&FeaturesLayer> = layers.iter().collect();
        sorted.sort_by_key(|l| l.search_type);

        let mut paths = Vec::new();
        let mut matcher = FeaturesLayerMatcher::new(
            self.tile,
            &self.ctx.model,
            self.config,
            self.cancel,
            &mut *self.caches,
        );
        FeaturesLayerPathFinder::default().find_reachable(&mut matcher, &sorted, &mut |path| {
            paths.push(*path);
        })?;

        for path in &paths {
            self.emit_path(&sorted, path);
        }
        Ok(())
    }

    fn emit_path(&mut self, layers: &[&FeaturesLayer], path: &IntersectionResult) {
        let inner = layers[0].search_type;
        let Some(id) = path.get(inner) else {
            return;
        };
        // Delayed buildings are only known here.
        if inner < SearchType::Street && self.postcode.as_ref().is_some_and(|p| !p.contains(id)) {
            return;
        }
        let mut info = self.new_info(inner);
        for layer in layers {
            info.token_ranges.set(layer.search_type, layer.range);
        }
        info.all_tokens_used = info.covers_all_tokens(self.query.len());
        let last = self.query.len().saturating_sub(1);
        info.exact_match = match layers.iter().find(|l| l.range.contains(last)) {
            Some(layer) => path
                .get(layer.search_type)
                .is_some_and(|id| self.is_exact(layer.range, id)),
            None => self.exact_in_chain(),
        };
        let mut hit = PreRankerResult::new(FeatureRef::new(self.tile.id(), id), info);
        hit.geo_parts = *path;
        hit.locality = self.city().map(|c| c.id);
        self.emit(hit);
    }
}

/// One layer per search type; building and street layers must name
/// adjacent token ranges.
fn is_sane(layers: &[FeaturesLayer], candidate: &FeaturesLayer) -> bool {
    if layers.iter().any(|l| l.search_type == candidate.search_type) {
        return false;
    }
    let all = || layers.iter().chain(std::iter::once(candidate));
    let building = all().find(|l| l.search_type == SearchType::Building);
    let street = all().find(|l| l.search_type == SearchType::Street);
    match (building, street) {
        (Some(b), Some(s)) => b.range.is_adjacent_to(&s.range),
        _ => true,
    }
}
