//! Assembles a [`MapTile`] from features and precomputes its address tables.

use std::{sync::Arc, time::Instant};

use ahash::AHashMap as HashMap;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::{
    classif::{Classificator, rules},
    error::{DataError, Result},
    feature::{Feature, FeatureId, Geometry, TileId},
    geometry::{distance_m, union},
    index::TokenIndex,
    normalize::normalize,
    reverse::ReverseGeocoder,
    tile::{
        AddressTables, FeatureSource, FeatureTable, MapTile, TileInfo, TileKind, postcode_key,
    },
};

/// Max distance between an address and the street named in `addr:street`.
const NAMED_STREET_RADIUS_M: f64 = 1_000.0;
/// Max distance to the nearest street for addresses without `addr:street`.
const UNNAMED_STREET_RADIUS_M: f64 = 50.0;
/// Max distance between an address and the place named in `addr:place`.
const PLACE_RADIUS_M: f64 = 5_000.0;

pub struct TileBuilder {
    id: TileId,
    name: String,
    kind: TileKind,
    country: Option<String>,
    classif: Arc<Classificator>,
    features: Vec<Feature>,
}

impl TileBuilder {
    pub fn new(id: TileId, name: impl Into<String>, kind: TileKind, classif: Arc<Classificator>) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            country: None,
            classif,
            features: Vec::new(),
        }
    }

    pub fn country(mut self, code: impl Into<String>) -> Self {
        self.country = Some(code.into());
        self
    }

    /// Adds a feature and returns the id it gets in the tile.
    pub fn add(&mut self, mut feature: Feature) -> FeatureId {
        let id = self.features.len() as FeatureId;
        feature.id = id;
        self.features.push(feature);
        id
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[instrument(name = "Build tile", level = "debug", skip_all, fields(tile = %self.name, features = self.features.len()))]
    pub fn build(self) -> Result<MapTile> {
        let t = Instant::now();
        if self.features.is_empty() {
            return Err(DataError::EmptyTile(self.name));
        }

        let mut rects = Vec::with_capacity(self.features.len());
        let mut centers = Vec::with_capacity(self.features.len());
        for feature in &self.features {
            validate(feature)?;
            let (Some(rect), Some(center)) = (feature.bounding_rect(), feature.center()) else {
                return Err(DataError::DegenerateGeometry(feature.id));
            };
            rects.push(rect);
            centers.push(center);
        }
        let bounds = rects
            .iter()
            .skip(1)
            .fold(rects[0], |acc, r| union(&acc, r));

        let index = self.build_index();
        let table = FeatureTable::new(self.features, rects, centers);

        let street_rule = self.classif.compile(&rules::STREET);
        let village_rule = self.classif.compile(&rules::VILLAGE);
        let suburb_rule = self.classif.compile(&rules::SUBURB);
        let streets: Vec<FeatureId> = table
            .iter()
            .filter(|f| street_rule.matches(&f.types))
            .map(|f| f.id)
            .collect();
        let villages: Vec<FeatureId> = table
            .iter()
            .filter(|f| village_rule.matches(&f.types))
            .map(|f| f.id)
            .collect();
        let places: Vec<FeatureId> = table
            .iter()
            .filter(|f| suburb_rule.matches(&f.types) || village_rule.matches(&f.types))
            .map(|f| f.id)
            .collect();

        let mut postcodes: Vec<(String, FeatureId)> = table
            .iter()
            .filter_map(|f| Some((postcode_key(f.postcode.as_deref()?), f.id)))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        postcodes.sort_unstable();

        let house_to_street = match_houses_to_streets(&table, &streets);
        let place_to_addresses = match_addresses_to_places(&table, &places);

        debug!(
            streets = streets.len(),
            houses = house_to_street.len(),
            places = place_to_addresses.len(),
            postcodes = postcodes.len(),
            "Address tables ready"
        );

        let tile = MapTile {
            info: TileInfo {
                id: self.id,
                name: self.name,
                kind: self.kind,
                bounds,
                country: self.country,
            },
            features: Box::new(table),
            index: Box::new(index),
            addresses: AddressTables {
                house_to_street,
                place_to_addresses,
                streets,
                villages,
                postcodes,
            },
        };
        info!(
            tile = tile.name(),
            features = tile.features.num_features(),
            elapsed_ms = ?t.elapsed(),
            "Built tile"
        );
        Ok(tile)
    }

    fn build_index(&self) -> TokenIndex {
        let mut index = TokenIndex::new();
        for feature in &self.features {
            for (name, _) in feature.searchable_names() {
                index.insert_name(feature.id, name);
            }
            if feature.interpolation.is_none()
                && let Some(hn) = &feature.house_number
            {
                index.insert_name(feature.id, hn);
            }
            for &t in &feature.types {
                index.insert_type(feature.id, t);
            }
        }
        index.finish();
        index
    }
}

fn validate(feature: &Feature) -> Result<()> {
    let degenerate = match &feature.geometry {
        Geometry::Point(_) => false,
        Geometry::Line(line) => line.0.len() < 2,
        Geometry::Area(poly) => poly.exterior().0.len() < 4,
    };
    if degenerate {
        return Err(DataError::DegenerateGeometry(feature.id));
    }
    if feature.interpolation.is_some() {
        let valid = feature
            .house_number
            .as_deref()
            .and_then(|hn| hn.split_once(':'))
            .and_then(|(a, b)| Some((a.trim().parse::<u32>().ok()?, b.trim().parse::<u32>().ok()?)))
            .is_some_and(|(a, b)| a < b);
        if !valid {
            return Err(DataError::InvalidInterpolationRange {
                id: feature.id,
                value: feature.house_number.clone().unwrap_or_default(),
            });
        }
    }
    Ok(())
}

fn match_houses_to_streets(
    table: &FeatureTable,
    streets: &[FeatureId],
) -> HashMap<FeatureId, FeatureId> {
    let rg = ReverseGeocoder::new(table, streets);
    let houses: Vec<&Feature> = table
        .iter()
        .filter(|f| f.house_number.is_some())
        .collect();
    let pairs: Vec<(FeatureId, FeatureId)> = houses
        .par_iter()
        .filter_map(|house| {
            let center = table.center(house.id)?;
            let street = match &house.street {
                Some(name) => rg.nearest_named_street(center, NAMED_STREET_RADIUS_M, name),
                None if house.place.is_none() => rg
                    .nearby_streets(center, UNNAMED_STREET_RADIUS_M)
                    .first()
                    .map(|s| s.id),
                None => None,
            }?;
            Some((house.id, street))
        })
        .collect();
    pairs.into_iter().collect()
}

fn match_addresses_to_places(
    table: &FeatureTable,
    places: &[FeatureId],
) -> HashMap<FeatureId, Vec<FeatureId>> {
    let mut by_name: HashMap<String, Vec<FeatureId>> = HashMap::new();
    for &id in places {
        if let Some(feature) = table.feature(id) {
            for (name, _) in feature.searchable_names() {
                by_name.entry(normalize(name)).or_default().push(id);
            }
        }
    }

    let mut result: HashMap<FeatureId, Vec<FeatureId>> = HashMap::new();
    for house in table.iter().filter(|f| f.house_number.is_some()) {
        let (Some(place), Some(center)) = (&house.place, table.center(house.id)) else {
            continue;
        };
        let Some(candidates) = by_name.get(&normalize(place)) else {
            continue;
        };
        let nearest = candidates
            .iter()
            .filter_map(|&id| table.center(id).map(|c| (id, distance_m(center, c))))
            .filter(|(_, d)| *d <= PLACE_RADIUS_M)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((place_id, _)) = nearest {
            result.entry(place_id).or_default().push(house.id);
        }
    }
    for ids in result.values_mut() {
        ids.sort_unstable();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Interpolation, TokenLookup};

    fn classif() -> Arc<Classificator> {
        Arc::new(Classificator::with_types([
            "highway-residential",
            "building",
            "place-suburb",
            "addr-interpolation-even",
        ]))
    }

    #[test]
    fn test_empty_tile_is_rejected() {
        let builder = TileBuilder::new(TileId(1), "Empty", TileKind::Country, classif());
        assert!(matches!(builder.build(), Err(DataError::EmptyTile(_))));
    }

    #[test]
    fn test_degenerate_line_is_rejected() {
        let mut builder = TileBuilder::new(TileId(1), "Bad", TileKind::Country, classif());
        builder.add(Feature::line(&[(0.0, 0.0)]));
        assert!(matches!(
            builder.build(),
            Err(DataError::DegenerateGeometry(0))
        ));
    }

    #[test]
    fn test_interpolation_range_is_validated() {
        let c = classif();
        let interpol = c.find("addr-interpolation-even").unwrap();
        let mut builder = TileBuilder::new(TileId(1), "Bad", TileKind::Country, c);
        builder.add(
            Feature::line(&[(0.0, 0.0), (0.001, 0.0)])
                .typed(interpol)
                .house_number("3800:3602")
                .interpolated(Interpolation::Even),
        );
        assert!(matches!(
            builder.build(),
            Err(DataError::InvalidInterpolationRange { id: 0, .. })
        ));
    }

    #[test]
    fn test_address_tables() {
        let c = classif();
        let road = c.find("highway-residential").unwrap();
        let building = c.find("building").unwrap();
        let suburb = c.find("place-suburb").unwrap();
        let mut builder = TileBuilder::new(TileId(1), "Town", TileKind::Country, c);
        let main = builder.add(
            Feature::line(&[(0.0, 0.0), (0.01, 0.0)])
                .named("Main Street")
                .typed(road),
        );
        let side = builder.add(
            Feature::line(&[(0.0, 0.0003), (0.01, 0.0003)])
                .named("Side Street")
                .typed(road),
        );
        // Closer to Side Street but addressed to Main Street.
        let house = builder.add(
            Feature::point(0.005, 0.0002)
                .typed(building)
                .house_number("12")
                .on_street("Main Street"),
        );
        let unnamed = builder.add(Feature::point(0.006, 0.00025).typed(building).house_number("3"));
        let old_town = builder.add(Feature::point(0.02, 0.02).named("Old Town").typed(suburb));
        let placed = builder.add(
            Feature::point(0.021, 0.02)
                .typed(building)
                .house_number("7")
                .in_place("Old Town"),
        );
        let tile = builder.build().unwrap();

        assert_eq!(tile.addresses.street_of(house), Some(main));
        assert_eq!(tile.addresses.street_of(unnamed), Some(side));
        assert_eq!(tile.addresses.street_of(placed), None);
        assert_eq!(tile.addresses.addresses_of(old_town), &[placed]);
        assert_eq!(tile.addresses.streets(), &[main, side]);
        assert_eq!(tile.index.exact("12"), vec![house]);
        assert_eq!(tile.index.exact("main"), vec![main]);
    }

    #[test]
    fn test_postcode_lookup() {
        let c = classif();
        let building = c.find("building").unwrap();
        let mut builder = TileBuilder::new(TileId(1), "Town", TileKind::Country, c);
        let a = builder.add(Feature::point(0.0, 0.0).typed(building).postcode("SW1A-1AA"));
        let b = builder.add(Feature::point(0.001, 0.0).typed(building).postcode("SW1A 2AB"));
        let lower = builder.add(Feature::point(0.002, 0.0).typed(building).postcode("sw1a 1aa"));
        builder.add(Feature::point(0.003, 0.0).typed(building));
        let tile = builder.build().unwrap();

        assert!(tile.addresses.has_postcodes());
        assert_eq!(tile.addresses.with_postcode("sw1a 1aa", false), vec![a, lower]);
        assert_eq!(tile.addresses.with_postcode("sw1a", false), Vec::<FeatureId>::new());
        assert_eq!(tile.addresses.with_postcode("sw1a", true), vec![a, b, lower]);
        assert_eq!(tile.addresses.with_postcode("sw1a 2", true), vec![b]);
        assert!(tile.addresses.with_postcode("e1", true).is_empty());
    }
}
