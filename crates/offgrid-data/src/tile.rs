//! Map tiles: features, their token index and precomputed address tables.

use std::fmt;

use ahash::AHashMap as HashMap;
use rstar::{
    AABB, RTree,
    primitives::{GeomWithData, Rectangle},
};

use crate::{
    feature::{Feature, FeatureId, TileId},
    geometry::{Point, Rect},
    index::TokenLookup,
    normalize::tokenize,
};

type IndexedRect = GeomWithData<Rectangle<[f64; 2]>, FeatureId>;

/// Read side of a tile's feature storage.
pub trait FeatureSource: Send + Sync {
    /// The feature with `id`, `None` when the id is stale or out of range.
    fn feature(&self, id: FeatureId) -> Option<&Feature>;

    /// Calls `visitor` with every feature visible at `scale` whose bounding
    /// rect intersects `rect`, in no particular order.
    fn for_each_in_rect(&self, rect: &Rect, scale: u8, visitor: &mut dyn FnMut(FeatureId));

    fn num_features(&self) -> u32;

    /// Representative point of a feature without touching its geometry.
    fn center(&self, id: FeatureId) -> Option<Point>;
}

/// Vector-backed feature storage with precomputed rects, centers and an
/// R-tree over the rects.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    features: Vec<Feature>,
    rects: Vec<Rect>,
    centers: Vec<Point>,
    tree: RTree<IndexedRect>,
}

fn corners(rect: &Rect) -> ([f64; 2], [f64; 2]) {
    let (min, max) = (rect.min(), rect.max());
    ([min.x, min.y], [max.x, max.y])
}

impl FeatureTable {
    /// Features must carry their index as id and a non-degenerate geometry.
    pub(crate) fn new(features: Vec<Feature>, rects: Vec<Rect>, centers: Vec<Point>) -> Self {
        debug_assert_eq!(features.len(), rects.len());
        debug_assert_eq!(features.len(), centers.len());
        let entries: Vec<IndexedRect> = features
            .iter()
            .zip(&rects)
            .map(|(feature, rect)| {
                let (min, max) = corners(rect);
                GeomWithData::new(Rectangle::from_corners(min, max), feature.id)
            })
            .collect();
        Self {
            features,
            rects,
            centers,
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn rect(&self, id: FeatureId) -> Option<&Rect> {
        self.rects.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl FeatureSource for FeatureTable {
    fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(id as usize)
    }

    fn for_each_in_rect(&self, rect: &Rect, scale: u8, visitor: &mut dyn FnMut(FeatureId)) {
        let (min, max) = corners(rect);
        let envelope = AABB::from_corners(min, max);
        for entry in self.tree.locate_in_envelope_intersecting(&envelope) {
            if self
                .features
                .get(entry.data as usize)
                .is_some_and(|f| f.min_scale <= scale)
            {
                visitor(entry.data);
            }
        }
    }

    fn num_features(&self) -> u32 {
        self.features.len() as u32
    }

    fn center(&self, id: FeatureId) -> Option<Point> {
        self.centers.get(id as usize).copied()
    }
}

/// Address lookups computed when the tile is built.
#[derive(Debug, Clone, Default)]
pub struct AddressTables {
    pub(crate) house_to_street: HashMap<FeatureId, FeatureId>,
    pub(crate) place_to_addresses: HashMap<FeatureId, Vec<FeatureId>>,
    /// Sorted ids of all street features.
    pub(crate) streets: Vec<FeatureId>,
    /// Sorted ids of all village features.
    pub(crate) villages: Vec<FeatureId>,
    /// (postcode key, id) pairs sorted by key. Keys are the postcode's
    /// tokens joined by single spaces.
    pub(crate) postcodes: Vec<(String, FeatureId)>,
}

/// Lookup key of a postcode: "SW1A-1AA" and "sw1a 1aa" share one.
pub fn postcode_key(postcode: &str) -> String {
    tokenize(postcode).join(" ")
}

impl AddressTables {
    /// The street an address feature belongs to.
    pub fn street_of(&self, house: FeatureId) -> Option<FeatureId> {
        self.house_to_street.get(&house).copied()
    }

    /// Address features whose `addr:place` names `place`.
    pub fn addresses_of(&self, place: FeatureId) -> &[FeatureId] {
        self.place_to_addresses
            .get(&place)
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn streets(&self) -> &[FeatureId] {
        &self.streets
    }

    pub fn villages(&self) -> &[FeatureId] {
        &self.villages
    }

    pub fn is_street(&self, id: FeatureId) -> bool {
        self.streets.binary_search(&id).is_ok()
    }

    /// Sorted ids of the features whose postcode is `key`, or starts with
    /// it when `prefix` is set.
    pub fn with_postcode(&self, key: &str, prefix: bool) -> Vec<FeatureId> {
        let start = self.postcodes.partition_point(|(k, _)| k.as_str() < key);
        let mut ids: Vec<FeatureId> = self.postcodes[start..]
            .iter()
            .take_while(|(k, _)| if prefix { k.starts_with(key) } else { k == key })
            .map(|&(_, id)| id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn has_postcodes(&self) -> bool {
        !self.postcodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TileKind {
    /// Holds countries, states and major cities of the whole world.
    World,
    /// Holds everything inside one country or region.
    Country,
}

#[derive(Debug, Clone)]
pub struct TileInfo {
    pub id: TileId,
    pub name: String,
    pub kind: TileKind,
    pub bounds: Rect,
    /// ISO code of the country the tile belongs to.
    pub country: Option<String>,
}

/// A loaded map tile.
pub struct MapTile {
    pub info: TileInfo,
    pub features: Box<dyn FeatureSource>,
    pub index: Box<dyn TokenLookup>,
    pub addresses: AddressTables,
}

impl MapTile {
    pub const fn id(&self) -> TileId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn is_world(&self) -> bool {
        self.info.kind == TileKind::World
    }

    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.feature(id)
    }

    pub fn center(&self, id: FeatureId) -> Option<Point> {
        self.features.center(id)
    }
}

impl fmt::Debug for MapTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapTile")
            .field("info", &self.info)
            .field("num_features", &self.features.num_features())
            .finish_non_exhaustive()
    }
}
