//! One query at a time through the whole pipeline: coordinates check,
//! tokenization, geocoding, pre-ranking and ranking.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use offgrid_data::geometry::{Point, rect_around, rect_contains};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::{
    cancel::{CancelResult, CancelToken, Cancelled},
    config::SearchConfig,
    context::SearchContext,
    geocoder::{Geocoder, GeocoderParams, HitSink},
    params::{Mode, SearchParams},
    query::QueryParams,
    ranking::{
        EndMarker, PreRanker, PreRankerParams, PreRankerResult, Ranker, RankerParams, Results,
        SearchResult,
    },
};

/// Locale used when neither the query nor the engine sets one.
pub const DEFAULT_LOCALE: &str = "en";

static LAT_LON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([-+]?\d{1,2}(?:\.\d+)?)(\s*[,;]\s*|\s+)([-+]?\d{1,3}(?:\.\d+)?)\s*$")
        .expect("Invalid coordinates regex")
});

/// Parses "lat, lon", "lat; lon" or "lat lon". Numbers separated by
/// spaces only count when both have a fractional part, so "12 34" stays a
/// house number query.
pub fn parse_lat_lon(query: &str) -> Option<(f64, f64)> {
    let caps = LAT_LON.captures(query)?;
    let (lat, sep, lon) = (&caps[1], &caps[2], &caps[3]);
    if sep.trim().is_empty() && !(lat.contains('.') && lon.contains('.')) {
        return None;
    }
    let lat: f64 = lat.parse().ok()?;
    let lon: f64 = lon.parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some((lat, lon))
}

/// Runs queries against a shared [`SearchContext`]. Not thread-safe by
/// itself: the engine gives every worker thread its own processor.
pub struct Processor {
    ctx: Arc<SearchContext>,
    config: SearchConfig,
    locale: String,
    geocoder: Geocoder,
    pre_ranker: PreRanker,
}

impl Processor {
    pub fn new(ctx: Arc<SearchContext>, config: SearchConfig) -> Self {
        let origin = Point::new(0.0, 0.0);
        let pre_ranker =
            PreRanker::new(PreRankerParams::new(&config, origin, rect_around(origin, 0.0), false));
        Self {
            geocoder: Geocoder::new(ctx.clone(), config.clone()),
            ctx,
            config,
            locale: DEFAULT_LOCALE.to_owned(),
            pre_ranker,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = locale.into();
        debug!(locale = %self.locale, "Locale set");
    }

    pub fn set_config(&mut self, config: SearchConfig) {
        self.geocoder.set_config(config.clone());
        self.config = config;
        debug!("Config reloaded");
    }

    /// Drops every cache, including the results shown by the last
    /// viewport search.
    pub fn clear_caches(&mut self) {
        self.geocoder.clear_caches();
        self.pre_ranker.clear_caches();
        self.pre_ranker.clear_viewport_history();
    }

    /// A cancel token carrying the query's timeout, or the configured one.
    pub fn cancel_token(&self, params: &SearchParams) -> CancelToken {
        let timeout: Option<Duration> = params.timeout.or(self.config.default_timeout);
        CancelToken::new(timeout, self.config.soft_deadline)
    }

    /// Runs one query. Intermediate snapshots and the final results are
    /// passed to `on_results`; the final results are also returned.
    #[instrument(name = "Search", level = "debug", skip_all, fields(query = %params.query, mode = ?params.mode))]
    pub fn search(
        &mut self,
        params: &SearchParams,
        cancel: &CancelToken,
        on_results: &mut dyn FnMut(&Results),
    ) -> Results {
        let t = Instant::now();
        let results = self.run(params, cancel, on_results);
        self.geocoder.clear_caches();
        self.pre_ranker.clear_caches();
        info!(
            query = %params.query,
            results = results.len(),
            cancelled = results.is_cancelled(),
            incomplete = results.incomplete,
            elapsed_ms = t.elapsed().as_millis(),
            "Search finished"
        );
        on_results(&results);
        results
    }

    fn run(
        &mut self,
        params: &SearchParams,
        cancel: &CancelToken,
        on_results: &mut dyn FnMut(&Results),
    ) -> Results {
        if params.mode == Mode::Bookmarks {
            return Results::finished(Vec::new());
        }
        if let Some((lat, lon)) = parse_lat_lon(&params.query) {
            debug!(lat, lon, "Coordinates query");
            return Results::finished(vec![SearchResult::lat_lon(lat, lon)]);
        }

        let ctx = &*self.ctx;
        let locale = params.locale.as_deref().unwrap_or(&self.locale);
        let query = QueryParams::new(&params.query, locale, &ctx.categories, &ctx.synonyms);
        if query.is_empty() {
            return Results::finished(Vec::new());
        }

        let viewport_search = params.mode == Mode::Viewport;
        let viewport_center = Point::from(params.viewport.center());
        let pivot = if viewport_search {
            viewport_center
        } else {
            params
                .position
                .filter(|p| rect_contains(&params.viewport, *p))
                .unwrap_or(viewport_center)
        };
        let pivot_rect = if viewport_search {
            params.viewport
        } else {
            rect_around(pivot, self.config.pivot_radius_m)
        };
        let max_results = params.max_results.unwrap_or(self.config.max_results);

        let mut ranker_params = RankerParams::new(
            &self.config,
            query.clone(),
            pivot,
            params.viewport,
            viewport_search,
            max_results,
        );
        ranker_params.pivot_region = ctx.regions.region_at(pivot).map(|r| r.code.clone());
        self.pre_ranker.reset(PreRankerParams::new(
            &self.config,
            pivot,
            params.viewport,
            viewport_search,
        ));

        let geocoder_params = GeocoderParams {
            query,
            mode: params.mode,
            pivot: pivot_rect,
            viewport: params.viewport,
        };
        let mut pipeline = Pipeline {
            ctx,
            pre_ranker: &mut self.pre_ranker,
            ranker: Ranker::new(ranker_params),
            cancel,
            on_results,
        };
        match self.geocoder.go(&geocoder_params, cancel, &mut pipeline) {
            Ok(()) => Results::finished(pipeline.ranker.snapshot()),
            Err(reason) => {
                if reason == Cancelled::Deadline {
                    warn!(query = %params.query, "Search deadline exceeded, returning partial results");
                }
                pipeline.flush();
                Results {
                    items: pipeline.ranker.snapshot(),
                    end: Some(EndMarker::Cancelled),
                    incomplete: reason == Cancelled::Deadline,
                }
            }
        }
    }
}

/// Moves geocoder hits through the pre-ranker into the ranker and reports
/// snapshots after every flush.
struct Pipeline<'a> {
    ctx: &'a SearchContext,
    pre_ranker: &'a mut PreRanker,
    ranker: Ranker,
    cancel: &'a CancelToken,
    on_results: &'a mut dyn FnMut(&Results),
}

impl Pipeline<'_> {
    /// Moves pre-ranked batches into the ranker. Between the batches of an
    /// intermediate update the query may be cancelled; a batch is always
    /// ranked before that is reported.
    fn rank(&mut self, last: bool) -> CancelResult<bool> {
        let ctx = self.ctx;
        let cancel = self.cancel;
        let ranker = &mut self.ranker;
        let mut flushed = false;
        let mut sink = |batch: Vec<PreRankerResult>| -> CancelResult<()> {
            ranker.add_batch(ctx, &batch);
            flushed = true;
            if last { Ok(()) } else { cancel.check() }
        };
        self.pre_ranker.update(last, &mut sink)?;
        Ok(flushed)
    }

    /// Ranks everything still pending after the search stopped early.
    fn flush(&mut self) {
        if let Err(reason) = self.rank(true) {
            warn!(%reason, "Pending hits left unranked");
        }
    }
}

impl HitSink for Pipeline<'_> {
    fn emplace(&mut self, hit: PreRankerResult) {
        self.cancel.note_produced(1);
        self.pre_ranker.emplace(self.ctx, hit);
    }

    fn num_sent(&self) -> usize {
        self.pre_ranker.num_sent()
    }

    fn update(&mut self, last: bool) -> CancelResult<()> {
        if self.rank(last)? && !last {
            let snapshot = Results {
                items: self.ranker.snapshot(),
                end: None,
                incomplete: false,
            };
            (self.on_results)(&snapshot);
        }
        Ok(())
    }

    fn enough(&self) -> bool {
        self.pre_ranker.enough()
    }
}
