//! Small geodesic helpers over `geo` types.
//!
//! Coordinates are longitude/latitude degrees (`x` = lon, `y` = lat).
//! Distances are haversine meters.

use geo::{BoundingRect, ClosestPoint, Distance, Haversine};
pub use geo::{Closest, Coord, LineString, Point, Polygon, Rect};

/// Meters per degree of latitude on the haversine sphere.
pub const METERS_PER_DEGREE: f64 = 111_194.9;

/// Great-circle distance between two points in meters.
pub fn distance_m(a: Point, b: Point) -> f64 {
    Haversine.distance(a, b)
}

/// Square rect centered on `center` whose half-side is `radius_m` meters.
pub fn rect_around(center: Point, radius_m: f64) -> Rect {
    let dlat = radius_m / METERS_PER_DEGREE;
    let cos = center.y().to_radians().cos().max(1e-6);
    let dlon = radius_m / (METERS_PER_DEGREE * cos);
    Rect::new(
        geo::coord! { x: center.x() - dlon, y: center.y() - dlat },
        geo::coord! { x: center.x() + dlon, y: center.y() + dlat },
    )
}

/// Grows `rect` by `meters` on every side.
pub fn inflate(rect: &Rect, meters: f64) -> Rect {
    let mid_lat = rect.center().y;
    let dlat = meters / METERS_PER_DEGREE;
    let dlon = meters / (METERS_PER_DEGREE * mid_lat.to_radians().cos().max(1e-6));
    Rect::new(
        geo::coord! { x: rect.min().x - dlon, y: rect.min().y - dlat },
        geo::coord! { x: rect.max().x + dlon, y: rect.max().y + dlat },
    )
}

/// Inclusive containment: points on the border are inside.
pub fn rect_contains(rect: &Rect, p: Point) -> bool {
    p.x() >= rect.min().x && p.x() <= rect.max().x && p.y() >= rect.min().y && p.y() <= rect.max().y
}

/// Inclusive intersection test.
pub fn rects_intersect(a: &Rect, b: &Rect) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

/// Smallest rect covering both.
pub fn union(a: &Rect, b: &Rect) -> Rect {
    Rect::new(
        geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}

/// Distance from `p` to the closest point of `rect`, zero when inside.
pub fn distance_to_rect_m(rect: &Rect, p: Point) -> f64 {
    let clamped = Point::new(
        p.x().clamp(rect.min().x, rect.max().x),
        p.y().clamp(rect.min().y, rect.max().y),
    );
    distance_m(p, clamped)
}

/// Approximate distance from `p` to a polyline, using the planar closest
/// point in degree space and the haversine distance to it.
pub fn distance_to_line_m(line: &LineString, p: Point) -> Option<f64> {
    match line.closest_point(&p) {
        Closest::Intersection(q) => Some(distance_m(p, q)),
        Closest::SinglePoint(q) => Some(distance_m(p, q)),
        Closest::Indeterminate => None,
    }
}

/// Bounding rect of a set of points, `None` when empty.
pub fn bounding_rect_of(points: &[Point]) -> Option<Rect> {
    geo::MultiPoint::new(points.to_vec()).bounding_rect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_around_has_requested_half_side() {
        let center = Point::new(37.6, 55.75);
        let rect = rect_around(center, 500.0);
        let north = Point::new(center.x(), rect.max().y);
        let east = Point::new(rect.max().x, center.y());
        assert!((distance_m(center, north) - 500.0).abs() < 1.0);
        assert!((distance_m(center, east) - 500.0).abs() < 2.0);
    }

    #[test]
    fn test_rect_contains_is_inclusive() {
        let rect = Rect::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 1.0, y: 1.0 });
        assert!(rect_contains(&rect, Point::new(0.0, 0.0)));
        assert!(rect_contains(&rect, Point::new(1.0, 0.5)));
        assert!(!rect_contains(&rect, Point::new(1.0001, 0.5)));
    }

    #[test]
    fn test_distance_to_rect_zero_inside() {
        let rect = Rect::new(geo::coord! { x: 0.0, y: 0.0 }, geo::coord! { x: 1.0, y: 1.0 });
        assert_eq!(distance_to_rect_m(&rect, Point::new(0.5, 0.5)), 0.0);
        assert!(distance_to_rect_m(&rect, Point::new(2.0, 0.5)) > 100_000.0);
    }

    #[test]
    fn test_distance_to_line() {
        let line = LineString::from(vec![(0.0, 0.0), (0.01, 0.0)]);
        let d = distance_to_line_m(&line, Point::new(0.005, 0.0005)).unwrap();
        assert!((d - 55.6).abs() < 1.0, "got {d}");
    }
}
