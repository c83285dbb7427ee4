//! Administrative region and city boundary lookups.

use ahash::AHashMap as HashMap;
use geo::{BoundingRect, Contains};

use crate::{
    feature::{FeatureRef, TileId},
    geometry::{Point, Polygon, Rect, rect_contains},
};

/// A country (or a large sub-national region) with the tiles covering it.
#[derive(Debug, Clone)]
pub struct Region {
    pub code: String,
    pub name: String,
    pub polygon: Polygon,
    pub tiles: Vec<TileId>,
    bounds: Option<Rect>,
}

impl Region {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        polygon: Polygon,
        tiles: Vec<TileId>,
    ) -> Self {
        let bounds = polygon.bounding_rect();
        Self {
            code: code.into(),
            name: name.into(),
            polygon,
            tiles,
            bounds,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        self.bounds.is_some_and(|b| rect_contains(&b, p)) && self.polygon.contains(&p)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionInfo {
    regions: Vec<Region>,
}

impl RegionInfo {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn push(&mut self, region: Region) {
        self.regions.push(region);
    }

    /// The first region whose polygon contains `p`.
    pub fn region_at(&self, p: Point) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(p))
    }

    pub fn by_code(&self, code: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.code == code)
    }

    /// Regions a tile belongs to.
    pub fn regions_of_tile(&self, tile: TileId) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(move |r| r.tiles.contains(&tile))
    }
}

/// Administrative boundaries of cities, keyed by the city feature.
#[derive(Debug, Clone, Default)]
pub struct CitiesBoundaries {
    boundaries: HashMap<FeatureRef, Vec<Polygon>>,
}

impl CitiesBoundaries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, city: FeatureRef, polygon: Polygon) {
        self.boundaries.entry(city).or_default().push(polygon);
    }

    pub fn get(&self, city: FeatureRef) -> Option<&[Polygon]> {
        self.boundaries.get(&city).map(Vec::as_slice)
    }

    pub fn has(&self, city: FeatureRef) -> bool {
        self.boundaries.contains_key(&city)
    }

    /// True when `p` lies inside one of the city's boundary polygons.
    pub fn contains(&self, city: FeatureRef, p: Point) -> bool {
        self.get(city)
            .is_some_and(|polys| polys.iter().any(|poly| poly.contains(&p)))
    }

    /// Any city whose boundary contains `p`, lowest id first for stable
    /// results.
    pub fn city_at(&self, p: Point) -> Option<FeatureRef> {
        self.boundaries
            .iter()
            .filter(|(_, polys)| polys.iter().any(|poly| poly.contains(&p)))
            .map(|(city, _)| *city)
            .min()
    }
}
