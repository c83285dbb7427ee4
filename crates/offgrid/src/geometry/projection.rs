use geo::{Closest, ClosestPoint, Line};
use offgrid_data::geometry::{LineString, Point, distance_m};

/// Projection of a point onto a street polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub point: Point,
    pub distance_m: f64,
    pub segment: usize,
}

/// Projects points onto the segments of one street.
#[derive(Debug, Clone)]
pub struct StreetProjector {
    segments: Vec<Line>,
}

impl StreetProjector {
    pub fn new(street: &LineString) -> Self {
        Self {
            segments: street.lines().collect(),
        }
    }

    /// The closest projection onto any segment, `None` for an empty street.
    pub fn project(&self, p: Point) -> Option<Projection> {
        self.segments
            .iter()
            .enumerate()
            .filter_map(|(segment, line)| {
                let q = match line.closest_point(&p) {
                    Closest::Intersection(q) | Closest::SinglePoint(q) => q,
                    Closest::Indeterminate => return None,
                };
                Some(Projection {
                    point: q,
                    distance_m: distance_m(p, q),
                    segment,
                })
            })
            .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m))
    }

    /// True when `p` projects onto the street closer than `max_distance_m`.
    pub fn is_near(&self, p: Point, max_distance_m: f64) -> bool {
        self.project(p).is_some_and(|proj| proj.distance_m < max_distance_m)
    }
}
