//! Sweep-line join of points against rects.
//!
//! Events are processed in x order with rect openings before points before
//! rect closings, so rect bounds are inclusive on both axes. Open rects live
//! in a segment tree over the compressed y coordinates; a point query walks
//! one root-to-leaf path and sees every open rect covering its y exactly
//! once.

use std::cmp::Ordering;

use ahash::AHashMap as HashMap;
use offgrid_data::geometry::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// Each contained point is reported once, with the first rect found.
    Any,
    /// Every containing (point, rect) pair is reported once.
    All,
}

#[derive(Debug, Clone, Copy)]
pub struct PointIdPair {
    pub point: Point,
    pub id: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RectIdPair {
    pub rect: Rect,
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    Open,
    Point,
    Close,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    x: f64,
    kind: EventKind,
    index: usize,
}

/// Rects covering each node's y interval, stored by index into the rect
/// slice. `slots` maps a (node, rect) pair to the rect's position in the
/// node so that closing a rect is constant time per node.
struct SegmentTree {
    nodes: Vec<Vec<usize>>,
    slots: HashMap<(usize, usize), usize>,
    size: usize,
}

impl SegmentTree {
    fn new(size: usize) -> Self {
        Self {
            nodes: vec![Vec::new(); 4 * size.max(1)],
            slots: HashMap::new(),
            size,
        }
    }

    fn add(&mut self, lo: usize, hi: usize, rect: usize) {
        let mut covering = Vec::new();
        self.cover(1, 0, self.size - 1, lo, hi, &mut covering);
        for node in covering {
            let ids = &mut self.nodes[node];
            self.slots.insert((node, rect), ids.len());
            ids.push(rect);
        }
    }

    fn remove(&mut self, lo: usize, hi: usize, rect: usize) {
        let mut covering = Vec::new();
        self.cover(1, 0, self.size - 1, lo, hi, &mut covering);
        for node in covering {
            let Some(pos) = self.slots.remove(&(node, rect)) else {
                continue;
            };
            let ids = &mut self.nodes[node];
            ids.swap_remove(pos);
            if let Some(&moved) = ids.get(pos) {
                self.slots.insert((node, moved), pos);
            }
        }
    }

    /// Canonical nodes whose intervals exactly cover `lo..=hi`.
    fn cover(&self, node: usize, l: usize, r: usize, lo: usize, hi: usize, out: &mut Vec<usize>) {
        if hi < l || r < lo {
            return;
        }
        if lo <= l && r <= hi {
            out.push(node);
            return;
        }
        let mid = l + (r - l) / 2;
        self.cover(2 * node, l, mid, lo, hi, out);
        self.cover(2 * node + 1, mid + 1, r, lo, hi, out);
    }

    /// Calls `f` for every rect covering position `pos` until it returns
    /// `false`.
    fn stab(&self, pos: usize, f: &mut dyn FnMut(usize) -> bool) {
        let (mut node, mut l, mut r) = (1, 0, self.size - 1);
        loop {
            for &rect in &self.nodes[node] {
                if !f(rect) {
                    return;
                }
            }
            if l == r {
                return;
            }
            let mid = l + (r - l) / 2;
            if pos <= mid {
                node *= 2;
                r = mid;
            } else {
                node = 2 * node + 1;
                l = mid + 1;
            }
        }
    }
}

fn compressed_index(ys: &[f64], y: f64) -> usize {
    ys.partition_point(|v| v.total_cmp(&y) == Ordering::Less)
}

/// Calls `f(point_id, rect_id)` for points inside rects, in sweep order.
pub fn match_points_rects(
    points: &[PointIdPair],
    rects: &[RectIdPair],
    request: RequestType,
    mut f: impl FnMut(u32, u32),
) {
    if points.is_empty() || rects.is_empty() {
        return;
    }

    let mut ys: Vec<f64> = rects
        .iter()
        .flat_map(|r| [r.rect.min().y, r.rect.max().y])
        .chain(points.iter().map(|p| p.point.y()))
        .collect();
    ys.sort_by(f64::total_cmp);
    ys.dedup();

    let mut events = Vec::with_capacity(points.len() + 2 * rects.len());
    for (index, r) in rects.iter().enumerate() {
        events.push(Event {
            x: r.rect.min().x,
            kind: EventKind::Open,
            index,
        });
        events.push(Event {
            x: r.rect.max().x,
            kind: EventKind::Close,
            index,
        });
    }
    for (index, p) in points.iter().enumerate() {
        events.push(Event {
            x: p.point.x(),
            kind: EventKind::Point,
            index,
        });
    }
    events.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.kind.cmp(&b.kind)));

    let mut tree = SegmentTree::new(ys.len());
    let y_span = |r: &Rect| (compressed_index(&ys, r.min().y), compressed_index(&ys, r.max().y));
    for event in events {
        match event.kind {
            EventKind::Open => {
                let (lo, hi) = y_span(&rects[event.index].rect);
                tree.add(lo, hi, event.index);
            }
            EventKind::Close => {
                let (lo, hi) = y_span(&rects[event.index].rect);
                tree.remove(lo, hi, event.index);
            }
            EventKind::Point => {
                let p = points[event.index];
                let pos = compressed_index(&ys, p.point.y());
                tree.stab(pos, &mut |rect| {
                    f(p.id, rects[rect].id);
                    request == RequestType::All
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet as HashSet;
    use offgrid_data::geometry::{Coord, rect_contains};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let rects = [RectIdPair {
            rect: rect(0.0, 0.0, 1.0, 1.0),
            id: 7,
        }];
        let points = [
            PointIdPair { point: Point::new(0.0, 0.0), id: 1 },
            PointIdPair { point: Point::new(1.0, 1.0), id: 2 },
            PointIdPair { point: Point::new(1.0, 0.5), id: 3 },
            PointIdPair { point: Point::new(1.5, 0.5), id: 4 },
        ];
        let mut found = Vec::new();
        match_points_rects(&points, &rects, RequestType::All, |p, r| found.push((p, r)));
        found.sort_unstable();
        assert_eq!(found, vec![(1, 7), (2, 7), (3, 7)]);
    }

    #[test]
    fn test_any_reports_point_once() {
        let rects = [
            RectIdPair { rect: rect(0.0, 0.0, 2.0, 2.0), id: 1 },
            RectIdPair { rect: rect(0.5, 0.5, 1.5, 1.5), id: 2 },
        ];
        let points = [PointIdPair { point: Point::new(1.0, 1.0), id: 9 }];
        let mut any = Vec::new();
        match_points_rects(&points, &rects, RequestType::Any, |p, r| any.push((p, r)));
        assert_eq!(any.len(), 1);
        let mut all = Vec::new();
        match_points_rects(&points, &rects, RequestType::All, |p, r| all.push((p, r)));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_many_identical_rects() {
        let rects: Vec<RectIdPair> = (0..2_000)
            .map(|id| RectIdPair {
                rect: rect(0.0, 0.0, 1.0, 1.0),
                id,
            })
            .collect();
        let points = [
            PointIdPair { point: Point::new(0.5, 0.5), id: 1 },
            PointIdPair { point: Point::new(2.0, 0.5), id: 2 },
        ];
        let mut all = Vec::new();
        match_points_rects(&points, &rects, RequestType::All, |p, r| all.push((p, r)));
        assert_eq!(all.len(), 2_000);
        assert!(all.iter().all(|(p, _)| *p == 1));
        let ids: HashSet<u32> = all.iter().map(|(_, r)| *r).collect();
        assert_eq!(ids.len(), 2_000);
    }

    #[test]
    fn test_closed_rects_stop_matching() {
        // Staggered identical-height rects close one after another, so each
        // closing swaps another rect into the freed slot.
        let rects: Vec<RectIdPair> = (0..100)
            .map(|id| RectIdPair {
                rect: rect(0.0, 0.0, f64::from(id) + 1.0, 1.0),
                id,
            })
            .collect();
        let points: Vec<PointIdPair> = (0..100)
            .map(|id| PointIdPair {
                point: Point::new(f64::from(id) + 0.5, 0.5),
                id,
            })
            .collect();
        let mut all = Vec::new();
        match_points_rects(&points, &rects, RequestType::All, |p, r| all.push((p, r)));
        // Point at x = k + 0.5 lies in rects k..100.
        assert_eq!(all.len(), (1..=100).sum::<usize>());
        assert!(all.iter().all(|(p, r)| r >= p));
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = fastrand::Rng::with_seed(42);
        for _ in 0..50 {
            // Small integer grid so that many points land on rect borders.
            let coord = |rng: &mut fastrand::Rng| f64::from(rng.i32(0..20));
            let rects: Vec<RectIdPair> = (0..rng.usize(1..30))
                .map(|id| {
                    let (x0, y0) = (coord(&mut rng), coord(&mut rng));
                    let (w, h) = (f64::from(rng.i32(0..6)), f64::from(rng.i32(0..6)));
                    RectIdPair {
                        rect: rect(x0, y0, x0 + w, y0 + h),
                        id: id as u32,
                    }
                })
                .collect();
            let points: Vec<PointIdPair> = (0..rng.usize(1..60))
                .map(|id| PointIdPair {
                    point: Point::new(coord(&mut rng), coord(&mut rng)),
                    id: id as u32,
                })
                .collect();

            let mut expected = HashSet::new();
            for p in &points {
                for r in &rects {
                    if rect_contains(&r.rect, p.point) {
                        expected.insert((p.id, r.id));
                    }
                }
            }

            let mut all = Vec::new();
            match_points_rects(&points, &rects, RequestType::All, |p, r| all.push((p, r)));
            let all_set: HashSet<_> = all.iter().copied().collect();
            assert_eq!(all.len(), all_set.len(), "pair reported twice");
            assert_eq!(all_set, expected);

            let mut any = Vec::new();
            match_points_rects(&points, &rects, RequestType::Any, |p, r| any.push((p, r)));
            let any_points: HashSet<u32> = any.iter().map(|(p, _)| *p).collect();
            let expected_points: HashSet<u32> = expected.iter().map(|(p, _)| *p).collect();
            assert_eq!(any.len(), any_points.len(), "point reported twice");
            assert_eq!(any_points, expected_points);
            assert!(any.iter().all(|pair| expected.contains(pair)));
        }
    }
}
