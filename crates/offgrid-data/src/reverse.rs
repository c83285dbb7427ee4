use crate::{
    feature::{Feature, FeatureId, Geometry},
    geometry::{Point, distance_m, distance_to_line_m, distance_to_rect_m, rect_around},
    normalize::normalize,
    tile::{FeatureSource, MapTile},
};

/// Scale used for reverse lookups: everything is visible.
const MAX_SCALE: u8 = u8::MAX;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyStreet {
    pub id: FeatureId,
    pub distance_m: f64,
}

/// Nearest-street lookups over one tile.
pub struct ReverseGeocoder<'a> {
    features: &'a dyn FeatureSource,
    streets: &'a [FeatureId],
}

impl<'a> ReverseGeocoder<'a> {
    /// `streets` must be sorted.
    pub fn new(features: &'a dyn FeatureSource, streets: &'a [FeatureId]) -> Self {
        Self { features, streets }
    }

    pub fn for_tile(tile: &'a MapTile) -> Self {
        Self::new(tile.features.as_ref(), tile.addresses.streets())
    }

    /// Streets within `radius_m` of `center`, nearest first.
    pub fn nearby_streets(&self, center: Point, radius_m: f64) -> Vec<NearbyStreet> {
        let mut result = Vec::new();
        let rect = rect_around(center, radius_m);
        self.features
            .for_each_in_rect(&rect, MAX_SCALE, &mut |id| {
                if self.streets.binary_search(&id).is_err() {
                    return;
                }
                let Some(feature) = self.features.feature(id) else {
                    return;
                };
                if let Some(d) = distance_to(feature, center)
                    && d <= radius_m
                {
                    result.push(NearbyStreet { id, distance_m: d });
                }
            });
        result.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m).then(a.id.cmp(&b.id)));
        result
    }

    /// The nearest street within `radius_m` carrying `name` in any language.
    pub fn nearest_named_street(
        &self,
        center: Point,
        radius_m: f64,
        name: &str,
    ) -> Option<FeatureId> {
        let wanted = normalize(name);
        self.nearby_streets(center, radius_m)
            .into_iter()
            .find(|s| {
                self.features.feature(s.id).is_some_and(|f| {
                    f.searchable_names().any(|(n, _)| normalize(n) == wanted)
                })
            })
            .map(|s| s.id)
    }
}

fn distance_to(feature: &Feature, p: Point) -> Option<f64> {
    match &feature.geometry {
        Geometry::Point(q) => Some(distance_m(p, *q)),
        Geometry::Line(line) => distance_to_line_m(line, p),
        Geometry::Area(_) => feature.bounding_rect().map(|r| distance_to_rect_m(&r, p)),
    }
}
