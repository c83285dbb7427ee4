//! Order in which map tiles are searched.

use std::sync::Arc;

use offgrid_data::{
    MapTile,
    geometry::{Point, Rect, distance_to_rect_m, rects_intersect},
};

use crate::params::Mode;

/// Tiles to search, in search order.
#[derive(Debug, Clone, Default)]
pub struct TileOrder {
    pub tiles: Vec<Arc<MapTile>>,
    /// The first `num_intersecting` tiles intersect the pivot rect.
    pub num_intersecting: usize,
}

/// Tiles intersecting `pivot` come first, the rest follow by distance from
/// the pivot center. Viewport searches only visit tiles intersecting the
/// viewport, downloader searches only the world tile.
pub fn order_tiles(tiles: &[Arc<MapTile>], mode: Mode, pivot: &Rect, viewport: &Rect) -> TileOrder {
    match mode {
        Mode::Bookmarks => TileOrder::default(),
        Mode::Downloader => {
            let tiles: Vec<_> = tiles.iter().filter(|t| t.is_world()).cloned().collect();
            TileOrder {
                num_intersecting: tiles.len(),
                tiles,
            }
        }
        Mode::Viewport => {
            let tiles: Vec<_> = tiles
                .iter()
                .filter(|t| rects_intersect(&t.info.bounds, viewport))
                .cloned()
                .collect();
            TileOrder {
                num_intersecting: tiles.len(),
                tiles,
            }
        }
        Mode::Everywhere => {
            let center = Point::from(pivot.center());
            let (mut near, mut far): (Vec<_>, Vec<_>) = tiles
                .iter()
                .cloned()
                .partition(|t| rects_intersect(&t.info.bounds, pivot));
            let by_distance = |a: &Arc<MapTile>, b: &Arc<MapTile>| {
                distance_to_rect_m(&a.info.bounds, center)
                    .total_cmp(&distance_to_rect_m(&b.info.bounds, center))
                    .then_with(|| a.id().cmp(&b.id()))
            };
            near.sort_by(by_distance);
            far.sort_by(by_distance);
            let num_intersecting = near.len();
            near.extend(far);
            TileOrder {
                tiles: near,
                num_intersecting,
            }
        }
    }
}
