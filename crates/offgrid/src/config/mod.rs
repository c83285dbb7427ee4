use std::time::Duration;

use crate::error::OffgridError;

/// Weights of the linear ranking model.
///
/// Every term is normalized to `0.0..=1.0` before weighting, so the weights
/// are directly comparable. Penalties (errors, distance) are subtracted.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankingWeights {
    pub name_score: f64,
    pub errors: f64,
    pub matched_fraction: f64,
    pub rank: f64,
    pub popularity: f64,
    pub distance: f64,
    pub all_tokens_used: f64,
    pub search_type: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            name_score: 1.0,
            errors: 0.3,
            matched_fraction: 0.3,
            rank: 0.4,
            popularity: 0.2,
            distance: 0.5,
            all_tokens_used: 0.3,
            search_type: 0.2,
        }
    }
}

/// Configuration of the search pipeline.
///
/// Use [`SearchConfigBuilder`] for presets and fluent overrides.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchConfig {
    /// Max number of results returned for one query.
    pub max_results: usize,
    /// Number of results moved from the pre-ranker to the ranker per update.
    pub batch_size: usize,
    /// Max number of raw hits the pre-ranker hands over in total.
    pub preranker_limit: usize,
    /// Depth bound of the layer search.
    pub max_layers: usize,
    /// Max candidates kept per locality kind (country, state, city, village).
    pub max_localities_per_kind: usize,
    /// Half-side of the search rect around the position when no locality
    /// was matched.
    pub pivot_radius_m: f64,
    /// Radius around a point building that sub-POIs may belong to.
    pub building_radius_m: f64,
    /// Radius around a point complex POI that sub-POIs may belong to.
    pub complex_poi_radius_m: f64,
    /// Max distance between a POI and the street it belongs to.
    pub street_poi_distance_m: f64,
    /// Margin around a street scanned for its buildings.
    pub street_vicinity_m: f64,
    /// Buildings are joined through their matching street when
    /// `buildings * invert_join_factor < streets`.
    pub invert_join_factor: usize,
    /// Linear duplicates closer than this collapse into one result.
    pub duplicate_linear_distance_m: f64,
    /// Results with the same name and type closer than this are duplicates.
    pub min_distance_between_results_m: f64,
    /// Viewport mode keeps candidates whose linear rank is within this
    /// distance of the best one.
    pub viewport_rank_threshold: f64,
    pub cancel_poll_interval: u32,
    /// Ignore the timeout while nothing has been found yet.
    pub soft_deadline: bool,
    pub default_timeout: Option<Duration>,
    /// Number of engine worker threads.
    pub num_threads: usize,
    pub ranking: RankingWeights,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 30,
            batch_size: 10,
            preranker_limit: 200,
            max_layers: 5,
            max_localities_per_kind: 5,
            pivot_radius_m: 30_000.0,
            building_radius_m: 50.0,
            complex_poi_radius_m: 300.0,
            street_poi_distance_m: 100.0,
            street_vicinity_m: 200.0,
            invert_join_factor: 10,
            duplicate_linear_distance_m: 3_000.0,
            min_distance_between_results_m: 100.0,
            viewport_rank_threshold: 0.5,
            cancel_poll_interval: 256,
            soft_deadline: true,
            default_timeout: Some(Duration::from_secs(3)),
            num_threads: 2,
            ranking: RankingWeights::default(),
        }
    }
}

impl SearchConfig {
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
    }
}

/// Builder for creating search configurations with ergonomic defaults
#[derive(Debug, Clone, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// Create a new builder with sensible defaults
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    /// Create a builder optimized for fast searches (fewer results, shallower layer search)
    pub fn fast() -> Self {
        let mut builder = Self::new();
        builder.config.max_results = 10;
        builder.config.batch_size = 5;
        builder.config.preranker_limit = 50;
        builder.config.max_layers = 4;
        builder.config.default_timeout = Some(Duration::from_secs(1));
        builder
    }

    /// Create a builder optimized for comprehensive searches (more results, deeper layer search)
    pub fn comprehensive() -> Self {
        let mut builder = Self::new();
        builder.config.max_results = 100;
        builder.config.batch_size = 20;
        builder.config.preranker_limit = 1000;
        builder.config.max_layers = 6;
        builder.config.default_timeout = Some(Duration::from_secs(10));
        builder
    }

    /// Create a builder for viewport searches: many results, all emitted at once
    pub fn viewport() -> Self {
        let mut builder = Self::new();
        builder.config.max_results = 200;
        builder.config.batch_size = 200;
        builder.config.preranker_limit = 1000;
        builder.config.viewport_rank_threshold = 0.3;
        builder
    }

    /// Set the maximum number of results to return
    pub fn max_results(mut self, limit: usize) -> Self {
        self.config.max_results = limit;
        self
    }

    /// Set the number of results emitted per update
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size.max(1);
        self
    }

    /// Set the maximum number of raw hits handed to the ranker
    pub fn preranker_limit(mut self, limit: usize) -> Self {
        self.config.preranker_limit = limit;
        self
    }

    /// Set the depth bound of the layer search
    pub fn max_layers(mut self, max: usize) -> Self {
        self.config.max_layers = max.max(1);
        self
    }

    /// Set the default query timeout, `None` to disable it
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Enable or disable the soft deadline policy
    pub fn soft_deadline(mut self, enabled: bool) -> Self {
        self.config.soft_deadline = enabled;
        self
    }

    /// Set the number of engine worker threads
    pub fn threads(mut self, n: usize) -> Self {
        self.config.num_threads = n.max(1);
        self
    }

    /// Configure join radii: building, complex POI and POI-to-street distance
    pub fn join_radii(mut self, building_m: f64, complex_poi_m: f64, street_poi_m: f64) -> Self {
        self.config.building_radius_m = building_m;
        self.config.complex_poi_radius_m = complex_poi_m;
        self.config.street_poi_distance_m = street_poi_m;
        self
    }

    /// Configure ranking weights
    pub fn ranking(self) -> RankingBuilder {
        RankingBuilder::new(self)
    }

    /// Build the final configuration
    pub fn build(self) -> SearchConfig {
        self.config
    }
}

/// Builder for ranking model weights
pub struct RankingBuilder {
    parent: SearchConfigBuilder,
}

impl RankingBuilder {
    fn new(parent: SearchConfigBuilder) -> Self {
        Self { parent }
    }

    /// Prefer nearby results over better-named far away ones
    pub fn prioritize_distance(mut self) -> Self {
        self.parent.config.ranking.distance = 1.0;
        self.parent.config.ranking.rank = 0.2;
        self
    }

    /// Prefer popular and important features
    pub fn prioritize_popularity(mut self) -> Self {
        self.parent.config.ranking.popularity = 0.5;
        self.parent.config.ranking.rank = 0.6;
        self.parent.config.ranking.distance = 0.3;
        self
    }

    /// Set custom weights (must be finite and non-negative, not all zero)
    #[allow(clippy::too_many_arguments)]
    pub fn custom_weights(
        mut self,
        name_score: f64,
        errors: f64,
        matched_fraction: f64,
        rank: f64,
        popularity: f64,
        distance: f64,
        all_tokens_used: f64,
        search_type: f64,
    ) -> Result<Self, OffgridError> {
        let weights = RankingWeights {
            name_score,
            errors,
            matched_fraction,
            rank,
            popularity,
            distance,
            all_tokens_used,
            search_type,
        };
        let all = [
            name_score,
            errors,
            matched_fraction,
            rank,
            popularity,
            distance,
            all_tokens_used,
            search_type,
        ];
        if let Some(bad) = all.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(OffgridError::ConfigError(format!(
                "Ranking weights must be finite and non-negative, got {bad}"
            )));
        }
        if all.iter().all(|w| *w == 0.0) {
            return Err(OffgridError::ConfigError(
                "At least one ranking weight must be positive".to_owned(),
            ));
        }
        self.parent.config.ranking = weights;
        Ok(self)
    }

    /// Return to the main configuration builder
    pub fn done(self) -> SearchConfigBuilder {
        self.parent
    }
}
