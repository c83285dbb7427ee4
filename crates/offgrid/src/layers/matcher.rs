//! Belongs-to joins between two adjacent layers.

use offgrid_data::{
    FeatureId, Geometry, MapTile, ReverseGeocoder,
    geometry::{Point, Rect, distance_m, inflate, rect_around},
};
use tracing::{debug, warn};

use crate::{
    cancel::{CancelPoller, CancelResult, CancelToken},
    config::SearchConfig,
    geometry::{PointIdPair, RectIdPair, RequestType, StreetProjector, match_points_rects},
    layers::{FeaturesLayer, MatcherCaches},
    model::{Model, SearchType},
    query::house_numbers::{HnParse, feature_matches, parse_query, uses_conscription_numbers},
};

/// Computes `(child, parent)` pairs where the child feature belongs to the
/// parent feature. The child layer is always the more specific one.
pub trait LayerMatcher {
    fn match_layers(
        &mut self,
        child: &FeaturesLayer,
        parent: &FeaturesLayer,
        f: &mut dyn FnMut(FeatureId, FeatureId),
    ) -> CancelResult<()>;
}

/// Geometric and address joins over the features of one tile.
pub struct FeaturesLayerMatcher<'a> {
    tile: &'a MapTile,
    model: &'a Model,
    config: &'a SearchConfig,
    cancel: &'a CancelToken,
    caches: &'a mut MatcherCaches,
    conscription: bool,
}

impl<'a> FeaturesLayerMatcher<'a> {
    pub fn new(
        tile: &'a MapTile,
        model: &'a Model,
        config: &'a SearchConfig,
        cancel: &'a CancelToken,
        caches: &'a mut MatcherCaches,
    ) -> Self {
        Self {
            conscription: uses_conscription_numbers(tile.info.country.as_deref()),
            tile,
            model,
            config,
            cancel,
            caches,
        }
    }

    fn poller(&self) -> CancelPoller<'a> {
        CancelPoller::new(self.cancel, self.config.cancel_poll_interval)
    }

    fn is_building(&self, id: FeatureId) -> bool {
        self.tile
            .feature(id)
            .is_some_and(|f| self.model.search_type(f) == SearchType::Building)
    }

    /// Query tokens of a delayed building layer, parsed as a house number.
    fn house_number_query(layer: &FeaturesLayer) -> HnParse {
        parse_query(&layer.sub_query, layer.last_token_is_prefix)
    }

    fn centers(&self, layer: &FeaturesLayer) -> Vec<PointIdPair> {
        layer
            .features
            .iter()
            .filter_map(|&id| {
                let center = self.tile.center(id);
                if center.is_none() {
                    warn!(tile = self.tile.name(), id, "Missing feature center, dropped");
                }
                center.map(|point| PointIdPair { point, id })
            })
            .collect()
    }

    /// Sub-POIs inside buildings or complex POIs: areas use their own
    /// footprint, points a square of the configured radius.
    fn match_pois_with_buildings(
        &mut self,
        child: &FeaturesLayer,
        parent: &FeaturesLayer,
        f: &mut dyn FnMut(FeatureId, FeatureId),
    ) -> CancelResult<()> {
        let mut poller = self.poller();
        let radius = if parent.search_type == SearchType::Building {
            self.config.building_radius_m
        } else {
            self.config.complex_poi_radius_m
        };
        let pois = self.centers(child);

        if !parent.has_delayed_features {
            let rects: Vec<RectIdPair> = parent
                .features
                .iter()
                .filter_map(|&id| {
                    let feature = self.tile.feature(id)?;
                    let rect = match &feature.geometry {
                        Geometry::Area(_) => feature.bounding_rect()?,
                        _ => rect_around(self.tile.center(id)?, radius),
                    };
                    Some(RectIdPair { rect, id })
                })
                .collect();
            let mut pairs = Vec::new();
            match_points_rects(&pois, &rects, RequestType::All, |c, p| pairs.push((c, p)));
            for (c, p) in pairs {
                poller.poll()?;
                f(c, p);
            }
            return Ok(());
        }

        let query = Self::house_number_query(parent);
        if query.is_empty() {
            return Ok(());
        }
        for poi in pois {
            let mut nearby = Vec::new();
            self.tile
                .features
                .for_each_in_rect(&rect_around(poi.point, radius), u8::MAX, &mut |id| {
                    nearby.push(id);
                });
            nearby.sort_unstable();
            for id in nearby {
                poller.poll()?;
                if !self.is_building(id) {
                    continue;
                }
                if let Some(feature) = self.tile.feature(id)
                    && feature_matches(feature, &query, self.conscription)
                {
                    f(poi.id, id);
                }
            }
        }
        Ok(())
    }

    fn street_projector(tile: &MapTile, street: FeatureId) -> Option<StreetProjector> {
        match &tile.feature(street)?.geometry {
            Geometry::Line(line) => Some(StreetProjector::new(line)),
            Geometry::Area(poly) => Some(StreetProjector::new(poly.exterior())),
            Geometry::Point(_) => None,
        }
    }

    fn is_near_street(&mut self, street: FeatureId, point: Point) -> bool {
        let tile = self.tile;
        let max_distance = self.config.street_poi_distance_m;
        match self
            .caches
            .projectors
            .get_or_insert_with(street, || Self::street_projector(tile, street))
        {
            Some(projector) => projector.is_near(point, max_distance),
            None => tile
                .center(street)
                .is_some_and(|c| distance_m(c, point) < max_distance),
        }
    }

    /// POIs along streets: projection onto the street closer than the
    /// configured distance. Few POIs against many streets go through the
    /// cached nearby streets of each POI, otherwise streets are swept.
    fn match_pois_with_streets(
        &mut self,
        child: &FeaturesLayer,
        parent: &FeaturesLayer,
        f: &mut dyn FnMut(FeatureId, FeatureId),
    ) -> CancelResult<()> {
        let mut poller = self.poller();
        let radius = self.config.street_poi_distance_m;
        let pois = self.centers(child);

        let mut candidates = Vec::new();
        if pois.len() * self.config.invert_join_factor < parent.len() {
            let tile = self.tile;
            for poi in &pois {
                poller.poll()?;
                let streets = self.caches.nearby_streets.get_or_insert_with(poi.id, || {
                    ReverseGeocoder::for_tile(tile)
                        .nearby_streets(poi.point, radius)
                        .into_iter()
                        .map(|s| s.id)
                        .collect()
                });
                candidates.extend(
                    streets
                        .iter()
                        .filter(|s| parent.contains(**s))
                        .map(|&s| (poi.id, poi.point, s)),
                );
            }
        } else {
            let rects: Vec<RectIdPair> = parent
                .features
                .iter()
                .filter_map(|&id| {
                    let rect: Rect = self.tile.feature(id)?.bounding_rect()?;
                    Some(RectIdPair {
                        rect: inflate(&rect, radius),
                        id,
                    })
                })
                .collect();
            let indexed: Vec<PointIdPair> = pois
                .iter()
                .enumerate()
                .map(|(i, p)| PointIdPair {
                    point: p.point,
                    id: i as u32,
                })
                .collect();
            match_points_rects(&indexed, &rects, RequestType::All, |i, s| {
                let poi = pois[i as usize];
                candidates.push((poi.id, poi.point, s));
            });
        }

        for (poi, point, street) in candidates {
            poller.poll()?;
            if self.is_near_street(street, point) {
                f(poi, street);
            }
        }
        Ok(())
    }

    /// Buildings on streets. Few known buildings against many streets are
    /// joined through each building's address street; otherwise every
    /// street's vicinity is scanned, which also finds delayed buildings.
    fn match_buildings_with_streets(
        &mut self,
        child: &FeaturesLayer,
        parent: &FeaturesLayer,
        f: &mut dyn FnMut(FeatureId, FeatureId),
    ) -> CancelResult<()> {
        let mut poller = self.poller();
        let tile = self.tile;

        if !child.has_delayed_features
            && child.len() * self.config.invert_join_factor < parent.len()
        {
            for &house in &child.features {
                poller.poll()?;
                let street = *self
                    .caches
                    .matching_street
                    .get_or_insert_with(house, || tile.addresses.street_of(house));
                if let Some(street) = street
                    && parent.contains(street)
                {
                    f(house, street);
                }
            }
            return Ok(());
        }

        let query = if child.has_delayed_features {
            let query = Self::house_number_query(child);
            if query.is_empty() {
                return Ok(());
            }
            query
        } else {
            Vec::new()
        };
        let vicinity = self.config.street_vicinity_m;
        for &street in &parent.features {
            poller.poll()?;
            let buildings = self
                .caches
                .street_buildings
                .get_or_insert_with(street, || street_buildings(tile, street, vicinity));
            for &house in buildings {
                poller.poll()?;
                let matches = if child.has_delayed_features {
                    tile.feature(house)
                        .is_some_and(|feature| feature_matches(feature, &query, self.conscription))
                } else {
                    child.contains(house)
                };
                if matches {
                    f(house, street);
                }
            }
        }
        Ok(())
    }

    /// Buildings addressed to a place (`addr:place`) instead of a street.
    fn match_buildings_with_place(
        &mut self,
        child: &FeaturesLayer,
        parent: &FeaturesLayer,
        f: &mut dyn FnMut(FeatureId, FeatureId),
    ) -> CancelResult<()> {
        let mut poller = self.poller();
        let tile = self.tile;
        let query = if child.has_delayed_features {
            Self::house_number_query(child)
        } else {
            Vec::new()
        };
        for &place in &parent.features {
            poller.poll()?;
            let addresses = self
                .caches
                .place_addresses
                .get_or_insert_with(place, || tile.addresses.addresses_of(place).to_vec());
            for &house in addresses {
                poller.poll()?;
                let matches = if child.has_delayed_features {
                    tile.feature(house)
                        .is_some_and(|feature| feature_matches(feature, &query, self.conscription))
                } else {
                    child.contains(house)
                };
                if matches {
                    f(house, place);
                }
            }
        }
        Ok(())
    }

    fn pass_through(
        &self,
        child: &FeaturesLayer,
        parent: &FeaturesLayer,
        f: &mut dyn FnMut(FeatureId, FeatureId),
    ) -> CancelResult<()> {
        let mut poller = self.poller();
        for &c in &child.features {
            for &p in &parent.features {
                poller.poll()?;
                f(c, p);
            }
        }
        Ok(())
    }
}

/// Buildings near `street` whose address names it.
fn street_buildings(tile: &MapTile, street: FeatureId, vicinity_m: f64) -> Vec<FeatureId> {
    let Some(rect) = tile.feature(street).and_then(|s| s.bounding_rect()) else {
        return Vec::new();
    };
    let mut result = Vec::new();
    tile.features
        .for_each_in_rect(&inflate(&rect, vicinity_m), u8::MAX, &mut |id| {
            if tile.addresses.street_of(id) == Some(street) {
                result.push(id);
            }
        });
    result.sort_unstable();
    result
}

impl LayerMatcher for FeaturesLayerMatcher<'_> {
    fn match_layers(
        &mut self,
        child: &FeaturesLayer,
        parent: &FeaturesLayer,
        f: &mut dyn FnMut(FeatureId, FeatureId),
    ) -> CancelResult<()> {
        debug_assert!(child.search_type < parent.search_type);
        self.cancel.check()?;

        let mut count = 0usize;
        let mut emit = |c: FeatureId, p: FeatureId| {
            count += 1;
            f(c, p);
        };
        match (child.search_type, parent.search_type) {
            (SearchType::SubPoi, SearchType::Building | SearchType::ComplexPoi)
            | (SearchType::ComplexPoi, SearchType::Building) => {
                self.match_pois_with_buildings(child, parent, &mut emit)?;
            }
            (SearchType::SubPoi | SearchType::ComplexPoi, SearchType::Street) => {
                self.match_pois_with_streets(child, parent, &mut emit)?;
            }
            (SearchType::Building, SearchType::Street) => {
                self.match_buildings_with_streets(child, parent, &mut emit)?;
            }
            (SearchType::Building, SearchType::Suburb) => {
                self.match_buildings_with_place(child, parent, &mut emit)?;
            }
            (
                SearchType::Street | SearchType::SubPoi | SearchType::ComplexPoi,
                SearchType::Suburb,
            ) => self.pass_through(child, parent, &mut emit)?,
            _ => {}
        }
        debug!(
            child = %child.search_type,
            parent = %parent.search_type,
            children = child.len(),
            parents = parent.len(),
            pairs = count,
            "Matched layers"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::SearchContext, query::QueryParams, query::TokenRange};
    use offgrid_data::test_data::{COUNTRY_TILE, TestWorld};

    struct Fixture {
        ctx: SearchContext,
        world: TestWorld,
    }

    fn fixture() -> Fixture {
        Fixture {
            ctx: SearchContext::try_from(TestWorld::sample().unwrap()).unwrap(),
            world: TestWorld::sample().unwrap(),
        }
    }

    fn layer(t: SearchType, ids: Vec<FeatureId>, text: &str) -> FeaturesLayer {
        let query = QueryParams::new(
            text,
            "en",
            &offgrid_data::CategoriesTable::new(),
            &offgrid_data::Synonyms::new(),
        );
        FeaturesLayer::new(t, query.full_range(), ids, &query)
    }

    fn run(
        fx: &Fixture,
        child: &FeaturesLayer,
        parent: &FeaturesLayer,
    ) -> Vec<(FeatureId, FeatureId)> {
        let tile = fx.ctx.tile(COUNTRY_TILE).unwrap();
        let config = SearchConfig::default();
        let cancel = CancelToken::default();
        let mut caches = MatcherCaches::default();
        let mut matcher = FeaturesLayerMatcher::new(tile, &fx.ctx.model, &config, &cancel, &mut caches);
        let mut pairs = Vec::new();
        matcher
            .match_layers(child, parent, &mut |c, p| pairs.push((c, p)))
            .unwrap();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    #[test]
    fn test_buildings_with_streets_both_strategies() {
        let fx = fixture();
        let main = fx.world.find_named("Main Street").unwrap().id;
        let oak = fx.world.find_named("Oak Street").unwrap().id;
        let house = fx.world.find_house("Main Street", "2").unwrap().id;
        let oak_house = fx.world.find_house("Oak Street", "5").unwrap().id;

        // One building against two streets: scans street vicinities.
        let buildings = layer(SearchType::Building, vec![house, oak_house], "2");
        let streets = layer(SearchType::Street, vec![main, oak], "main");
        assert_eq!(run(&fx, &buildings, &streets), vec![(house, main), (oak_house, oak)]);

        // Many streets: goes through the house → street table.
        let many: Vec<FeatureId> = (0..fx.ctx.tile(COUNTRY_TILE).unwrap().features.num_features()).collect();
        let streets = layer(SearchType::Street, many, "main");
        let single = layer(SearchType::Building, vec![house], "2");
        assert_eq!(run(&fx, &single, &streets), vec![(house, main)]);
    }

    #[test]
    fn test_delayed_buildings_match_by_house_number() {
        let fx = fixture();
        let main = fx.world.find_named("Main Street").unwrap().id;
        let house = fx.world.find_house("Main Street", "12а").unwrap().id;
        let query = QueryParams::new(
            "12а",
            "en",
            &offgrid_data::CategoriesTable::new(),
            &offgrid_data::Synonyms::new(),
        );
        let delayed = FeaturesLayer::delayed_buildings(TokenRange::new(0, 1), &query);
        let streets = layer(SearchType::Street, vec![main], "main");
        assert_eq!(run(&fx, &delayed, &streets), vec![(house, main)]);
    }

    #[test]
    fn test_interpolation_line_matches_range() {
        let fx = fixture();
        let road = fx.world.find_named("Long Road").unwrap().id;
        let streets = layer(SearchType::Street, vec![road], "long road");
        for (hn, expected) in [("3700", 1), ("3701", 0)] {
            let query = QueryParams::new(
                hn,
                "en",
                &offgrid_data::CategoriesTable::new(),
                &offgrid_data::Synonyms::new(),
            );
            let delayed = FeaturesLayer::delayed_buildings(TokenRange::new(0, 1), &query);
            assert_eq!(run(&fx, &delayed, &streets).len(), expected, "house {hn}");
        }
    }

    #[test]
    fn test_pois_with_streets() {
        let fx = fixture();
        let main = fx.world.find_named("Main Street").unwrap().id;
        let cafe = fx.world.find_named("Blue Cafe").unwrap().id;
        let shop = fx.world.find_named("Shoe Corner").unwrap().id;
        let pois = layer(SearchType::SubPoi, vec![cafe, shop], "cafe");
        let streets = layer(SearchType::Street, vec![main], "main");
        assert_eq!(run(&fx, &pois, &streets), vec![(cafe, main)]);
    }

    #[test]
    fn test_pois_in_complex_poi_and_buildings() {
        let fx = fixture();
        let mall = fx.world.find_named("Central Mall").unwrap().id;
        let shop = fx.world.find_named("Shoe Corner").unwrap().id;
        let cafe = fx.world.find_named("Blue Cafe").unwrap().id;
        let pois = layer(SearchType::SubPoi, vec![cafe, shop], "shoe");
        let malls = layer(SearchType::ComplexPoi, vec![mall], "mall");
        assert_eq!(run(&fx, &pois, &malls), vec![(shop, mall)]);

        let pharmacy = fx.world.find_named("Red Pharmacy").unwrap().id;
        let house = fx.world.find_house("Main Street", "2").unwrap().id;
        let pois = layer(SearchType::SubPoi, vec![pharmacy, cafe], "pharmacy");
        let buildings = layer(SearchType::Building, vec![house], "2");
        assert_eq!(run(&fx, &pois, &buildings), vec![(pharmacy, house)]);
    }

    #[test]
    fn test_buildings_with_place() {
        let fx = fixture();
        let old_town = fx.world.find_named("Old Town").unwrap().id;
        let house = fx
            .world
            .tile(COUNTRY_TILE)
            .unwrap()
            .addresses
            .addresses_of(old_town)[0];
        let buildings = layer(SearchType::Building, vec![house], "7");
        let places = layer(SearchType::Suburb, vec![old_town], "old town");
        assert_eq!(run(&fx, &buildings, &places), vec![(house, old_town)]);
    }
}
