//! Synthetic map data for unit and integration tests.
//!
//! Two small worlds are provided:
//!
//! - [`TestWorld::sample`]: the country "Testland" with the city Springfield
//!   (streets, buildings, POIs, a mall, a suburb with `addr:place`
//!   addresses, an interpolation line, a park) and the village Little Hamlet.
//! - [`TestWorld::moscow`]: a few Moscow streets whose names start with a
//!   number, next to the Arbat suburb.
//!
//! plus [`grid_tile`], 121 cafes on an 11×11 grid around (0, 0).

use std::sync::Arc;

use geo::polygon;
use tracing::info;

use crate::{
    builder::TileBuilder,
    classif::{CategoriesTable, Classificator, Synonyms},
    error::Result,
    feature::{Feature, FeatureRef, Interpolation, TileId},
    normalize::normalize,
    region::{CitiesBoundaries, Region, RegionInfo},
    tile::{MapTile, TileKind},
};

pub const WORLD_TILE: TileId = TileId(0);
pub const COUNTRY_TILE: TileId = TileId(1);

/// Center of Springfield in [`TestWorld::sample`].
pub const SPRINGFIELD: (f64, f64) = (10.0, 50.0);
/// Center of Moscow in [`TestWorld::moscow`].
pub const MOSCOW: (f64, f64) = (37.62, 55.75);

const STANDARD_TYPES: &[&str] = &[
    "place-country",
    "place-state",
    "place-city",
    "place-city-capital",
    "place-town",
    "place-village",
    "place-hamlet",
    "place-suburb",
    "place-neighbourhood",
    "place-square",
    "highway-residential",
    "highway-primary",
    "highway-pedestrian",
    "highway-bus_stop",
    "building",
    "addr-interpolation-even",
    "addr-interpolation-odd",
    "addr-interpolation-all",
    "amenity-cafe",
    "amenity-pharmacy",
    "amenity-restaurant",
    "amenity-hospital",
    "amenity-university",
    "shop-mall",
    "shop-shoes",
    "shop-bakery",
    "tourism-hotel",
    "railway-station",
    "leisure-park",
    "waterway-river",
];

/// Classificator holding every type the fixtures use.
pub fn standard_classificator() -> Classificator {
    Classificator::with_types(STANDARD_TYPES.iter().copied())
}

/// Category names in English and Russian.
pub fn standard_categories(classif: &Classificator) -> CategoriesTable {
    let mut cats = CategoriesTable::new();
    for (locale, name, path) in [
        ("en", "cafe", "amenity-cafe"),
        ("en", "coffee", "amenity-cafe"),
        ("en", "pharmacy", "amenity-pharmacy"),
        ("en", "restaurant", "amenity-restaurant"),
        ("en", "hotel", "tourism-hotel"),
        ("en", "shoes", "shop-shoes"),
        ("en", "bakery", "shop-bakery"),
        ("ru", "кафе", "amenity-cafe"),
        ("ru", "аптека", "amenity-pharmacy"),
    ] {
        if let Some(t) = classif.find(path) {
            cats.add(locale, name, &[t]);
        }
    }
    cats
}

/// Everything a search context needs, built from synthetic features.
pub struct TestWorld {
    pub classif: Arc<Classificator>,
    pub categories: CategoriesTable,
    pub synonyms: Synonyms,
    pub regions: RegionInfo,
    pub cities_boundaries: CitiesBoundaries,
    pub tiles: Vec<Arc<MapTile>>,
}

impl TestWorld {
    pub fn sample() -> Result<Self> {
        let classif = Arc::new(standard_classificator());
        let t = |path: &str| classif.get(path);

        let mut world_tile = TileBuilder::new(WORLD_TILE, "World", TileKind::World, classif.clone());
        world_tile.add(
            Feature::point(10.0, 50.0)
                .named("Testland")
                .named_in("de", "Testreich")
                .typed(t("place-country")?)
                .rank(170),
        );
        world_tile.add(
            Feature::point(10.1, 50.1)
                .named("North Province")
                .typed(t("place-state")?)
                .rank(150),
        );
        let springfield = world_tile.add(
            Feature::point(SPRINGFIELD.0, SPRINGFIELD.1)
                .named("Springfield")
                .typed(t("place-city")?)
                .population(500_000)
                .rank(200),
        );
        world_tile.add(
            Feature::point(10.6, 50.6)
                .named("Shelbyville")
                .typed(t("place-town")?)
                .population(50_000)
                .rank(150),
        );

        let mut country = TileBuilder::new(COUNTRY_TILE, "Testland", TileKind::Country, classif.clone())
            .country("TL");
        let road = t("highway-residential")?;
        let building = t("building")?;

        country.add(
            Feature::line(&[(9.995, 50.0), (10.005, 50.0)])
                .named("Main Street")
                .typed(road)
                .postcode("49007")
                .popularity(10),
        );
        country.add(
            Feature::line(&[(10.0, 49.995), (10.0, 50.005)])
                .named("Oak Street")
                .alt_name("Post Road")
                .typed(road),
        );
        for (hn, postcode, lon, lat) in [
            ("1", "49007", 9.996, 50.0002),
            ("2", "49007", 9.998, 50.0002),
            ("3", "49007", 9.997, 49.9998),
            ("10", "49008", 10.003, 50.0002),
            ("12а", "49008", 10.004, 50.0002),
        ] {
            country.add(
                Feature::point(lon, lat)
                    .typed(building)
                    .house_number(hn)
                    .on_street("Main Street")
                    .postcode(postcode),
            );
        }
        country.add(
            Feature::point(10.0002, 50.003)
                .typed(building)
                .house_number("5")
                .on_street("Oak Street")
                .postcode("49008"),
        );
        country.add(
            Feature::point(10.001, 50.0003)
                .named("Blue Cafe")
                .typed(t("amenity-cafe")?)
                .postcode("49008")
                .popularity(50),
        );
        country.add(
            Feature::point(9.9981, 50.0002)
                .named("Red Pharmacy")
                .typed(t("amenity-pharmacy")?),
        );
        country.add(
            Feature::area(&[
                (10.010, 50.010),
                (10.014, 50.010),
                (10.014, 50.013),
                (10.010, 50.013),
                (10.010, 50.010),
            ])
            .named("Central Mall")
            .typed(t("shop-mall")?),
        );
        country.add(
            Feature::point(10.012, 50.011)
                .named("Shoe Corner")
                .typed(t("shop-shoes")?),
        );
        country.add(
            Feature::point(10.02, 50.02)
                .named("Old Town")
                .typed(t("place-suburb")?),
        );
        country.add(
            Feature::point(10.021, 50.02)
                .typed(building)
                .house_number("7")
                .in_place("Old Town"),
        );
        country.add(
            Feature::line(&[(9.98, 49.99), (9.99, 49.99)])
                .named("Long Road")
                .typed(t("highway-primary")?),
        );
        country.add(
            Feature::line(&[(9.981, 49.9901), (9.989, 49.9901)])
                .typed(t("addr-interpolation-even")?)
                .house_number("3602:3800")
                .interpolated(Interpolation::Even)
                .on_street("Long Road"),
        );
        country.add(
            Feature::area(&[
                (9.99, 50.01),
                (9.995, 50.01),
                (9.995, 50.015),
                (9.99, 50.015),
                (9.99, 50.01),
            ])
            .named("Green Park")
            .typed(t("leisure-park")?),
        );
        country.add(
            Feature::point(10.3, 50.3)
                .named("Little Hamlet")
                .typed(t("place-village")?)
                .population(300)
                .rank(60),
        );
        country.add(
            Feature::line(&[(10.299, 50.3005), (10.301, 50.3005)])
                .named("Church Lane")
                .typed(road),
        );
        country.add(
            Feature::point(10.3, 50.3008)
                .named("Village Cafe")
                .typed(t("amenity-cafe")?),
        );

        let mut cities_boundaries = CitiesBoundaries::new();
        cities_boundaries.insert(
            FeatureRef::new(WORLD_TILE, springfield),
            polygon![(x: 9.97, y: 49.97), (x: 10.03, y: 49.97), (x: 10.03, y: 50.03), (x: 9.97, y: 50.03), (x: 9.97, y: 49.97)],
        );
        let regions = RegionInfo::new(vec![Region::new(
            "TL",
            "Testland",
            polygon![(x: 9.0, y: 49.0), (x: 11.0, y: 49.0), (x: 11.0, y: 51.0), (x: 9.0, y: 51.0), (x: 9.0, y: 49.0)],
            vec![COUNTRY_TILE],
        )]);

        let world = Self {
            categories: standard_categories(&classif),
            synonyms: Synonyms::standard(),
            regions,
            cities_boundaries,
            tiles: vec![Arc::new(world_tile.build()?), Arc::new(country.build()?)],
            classif,
        };
        info!(tiles = world.tiles.len(), "Sample test world ready");
        Ok(world)
    }

    pub fn moscow() -> Result<Self> {
        let classif = Arc::new(standard_classificator());
        let t = |path: &str| classif.get(path);

        let mut world_tile = TileBuilder::new(WORLD_TILE, "World", TileKind::World, classif.clone());
        world_tile.add(
            Feature::point(37.6, 55.7)
                .named("Россия")
                .named_in("en", "Russia")
                .typed(t("place-country")?)
                .rank(200),
        );
        world_tile.add(
            Feature::point(MOSCOW.0, MOSCOW.1)
                .named("Москва")
                .named_in("en", "Moscow")
                .typed(t("place-city-capital")?)
                .population(12_000_000)
                .rank(250),
        );

        let mut country = TileBuilder::new(COUNTRY_TILE, "Moscow", TileKind::Country, classif.clone())
            .country("RU");
        let road = t("highway-residential")?;
        let building = t("building")?;
        country.add(
            Feature::point(37.595, 55.75)
                .named("Арбат")
                .typed(t("place-suburb")?),
        );
        country.add(
            Feature::line(&[(37.59, 55.7505), (37.60, 55.7505)])
                .named("улица Арбат")
                .typed(t("highway-pedestrian")?),
        );
        country.add(
            Feature::point(37.5985, 55.7507)
                .typed(building)
                .house_number("2")
                .on_street("улица Арбат"),
        );
        country.add(
            Feature::line(&[(37.600, 55.744), (37.603, 55.745)])
                .named("2-й Обыденский переулок")
                .typed(road),
        );
        country.add(
            Feature::point(37.6015, 55.7447)
                .typed(building)
                .house_number("2")
                .on_street("2-й Обыденский переулок"),
        );
        country.add(
            Feature::line(&[(37.604, 55.746), (37.607, 55.747)])
                .named("4-й Голутвинский переулок")
                .typed(road),
        );

        let regions = RegionInfo::new(vec![Region::new(
            "RU",
            "Россия",
            polygon![(x: 37.0, y: 55.0), (x: 38.5, y: 55.0), (x: 38.5, y: 56.5), (x: 37.0, y: 56.5), (x: 37.0, y: 55.0)],
            vec![COUNTRY_TILE],
        )]);

        Ok(Self {
            categories: standard_categories(&classif),
            synonyms: Synonyms::standard(),
            regions,
            cities_boundaries: CitiesBoundaries::new(),
            tiles: vec![Arc::new(world_tile.build()?), Arc::new(country.build()?)],
            classif,
        })
    }

    pub fn tile(&self, id: TileId) -> Option<&Arc<MapTile>> {
        self.tiles.iter().find(|t| t.id() == id)
    }

    /// The first feature whose default name equals `name`, ignoring case.
    pub fn find_named(&self, name: &str) -> Option<FeatureRef> {
        let wanted = normalize(name);
        self.find(|f| f.default_name().is_some_and(|n| normalize(n) == wanted))
    }

    /// Address features with house number `hn` on the street named `street`.
    pub fn find_house(&self, street: &str, hn: &str) -> Option<FeatureRef> {
        self.find(|f| {
            f.house_number.as_deref() == Some(hn) && f.street.as_deref() == Some(street)
        })
    }

    fn find(&self, pred: impl Fn(&Feature) -> bool) -> Option<FeatureRef> {
        self.tiles.iter().find_map(|tile| {
            (0..tile.features.num_features())
                .filter_map(|id| tile.feature(id))
                .find(|f| pred(f))
                .map(|f| FeatureRef::new(tile.id(), f.id))
        })
    }
}

/// A tile with 121 cafes on an 11×11 grid with `step` degrees spacing,
/// centered on (0, 0).
pub fn grid_tile(classif: Arc<Classificator>, step: f64) -> Result<MapTile> {
    let cafe = classif.get("amenity-cafe")?;
    let mut builder = TileBuilder::new(COUNTRY_TILE, "Grid", TileKind::Country, classif);
    for x in -5..=5 {
        for y in -5..=5 {
            builder.add(
                Feature::point(f64::from(x) * step, f64::from(y) * step)
                    .named("Cafe")
                    .typed(cafe),
            );
        }
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenLookup;

    #[test]
    fn test_sample_world_builds() {
        let world = TestWorld::sample().unwrap();
        assert_eq!(world.tiles.len(), 2);
        let main = world.find_named("Main Street").unwrap();
        let house = world.find_house("Main Street", "2").unwrap();
        let country = world.tile(COUNTRY_TILE).unwrap();
        assert_eq!(country.addresses.street_of(house.id), Some(main.id));
        assert!(country.addresses.villages().len() == 1);
    }

    #[test]
    fn test_grid_tile() {
        let classif = Arc::new(standard_classificator());
        let tile = grid_tile(classif, 0.001).unwrap();
        assert_eq!(tile.features.num_features(), 121);
        assert_eq!(tile.index.exact("cafe").len(), 121);
    }

    #[test]
    fn test_moscow_world_builds() {
        let world = TestWorld::moscow().unwrap();
        assert!(world.find_named("улица Арбат").is_some());
        assert!(world.find_house("2-й Обыденский переулок", "2").is_some());
    }
}
