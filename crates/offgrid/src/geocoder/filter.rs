//! Restrictions of candidate id lists to an area.

use std::sync::Arc;

use ahash::AHashMap as HashMap;
use offgrid_data::{FeatureId, MapTile, TileId, geometry::Rect};

/// Intersection of two sorted id lists.
pub fn intersect(a: &[FeatureId], b: &[FeatureId]) -> Vec<FeatureId> {
    let mut result = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result
}

/// Sorted ids of the tile's features intersecting `rect`, at every scale.
pub fn features_in_rect(tile: &MapTile, rect: &Rect) -> Vec<FeatureId> {
    let mut ids = Vec::new();
    tile.features
        .for_each_in_rect(rect, u8::MAX, &mut |id| ids.push(id));
    ids.sort_unstable();
    ids.dedup();
    ids
}

type RectKey = (TileId, [u64; 4]);

fn rect_key(tile: TileId, rect: &Rect) -> RectKey {
    (
        tile,
        [
            rect.min().x.to_bits(),
            rect.min().y.to_bits(),
            rect.max().x.to_bits(),
            rect.max().y.to_bits(),
        ],
    )
}

/// Features per (tile, rect), kept until [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct RectFeaturesCache {
    map: HashMap<RectKey, Arc<Vec<FeatureId>>>,
}

impl RectFeaturesCache {
    pub fn get(&mut self, tile: &MapTile, rect: &Rect) -> Arc<Vec<FeatureId>> {
        self.map
            .entry(rect_key(tile.id(), rect))
            .or_insert_with(|| Arc::new(features_in_rect(tile, rect)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Area restriction of a layer search.
#[derive(Debug, Clone, Default)]
pub enum SearchFilter {
    #[default]
    None,
    /// Only features inside a city or village.
    Locality(Arc<Vec<FeatureId>>),
    /// Only features around the pivot, and only once the candidates
    /// outnumber `threshold`.
    Viewport {
        features: Arc<Vec<FeatureId>>,
        threshold: usize,
    },
}

impl SearchFilter {
    pub fn apply(&self, ids: Vec<FeatureId>) -> Vec<FeatureId> {
        match self {
            Self::None => ids,
            Self::Locality(features) => intersect(&ids, features),
            Self::Viewport {
                features,
                threshold,
            } => {
                if ids.len() > *threshold {
                    intersect(&ids, features)
                } else {
                    ids
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offgrid_data::{
        geometry::{Point, rect_around},
        test_data::{COUNTRY_TILE, TestWorld},
    };

    #[test]
    fn test_intersect() {
        assert_eq!(intersect(&[1, 3, 5, 7], &[2, 3, 7, 9]), vec![3, 7]);
        assert!(intersect(&[], &[1]).is_empty());
    }

    #[test]
    fn test_filters() {
        let features = Arc::new(vec![2, 4, 6]);
        assert_eq!(SearchFilter::None.apply(vec![1, 2]), vec![1, 2]);
        assert_eq!(
            SearchFilter::Locality(features.clone()).apply(vec![1, 2, 6]),
            vec![2, 6]
        );
        let viewport = SearchFilter::Viewport {
            features,
            threshold: 3,
        };
        assert_eq!(viewport.apply(vec![1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(viewport.apply(vec![1, 2, 3, 4]), vec![2, 4]);
    }

    #[test]
    fn test_rect_cache() {
        let world = TestWorld::sample().unwrap();
        let tile = world.tile(COUNTRY_TILE).unwrap();
        let rect = rect_around(Point::new(10.3, 50.3), 500.0);
        let mut cache = RectFeaturesCache::default();
        let first = cache.get(tile, &rect);
        // Little Hamlet, Church Lane and Village Cafe.
        assert_eq!(first.len(), 3);
        let again = cache.get(tile, &rect);
        assert!(Arc::ptr_eq(&first, &again));
        cache.clear();
        assert!(cache.is_empty());
    }
}
