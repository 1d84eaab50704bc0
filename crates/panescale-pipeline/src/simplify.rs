//! Closed-polygon simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! Traced borders are loops of boundary pixels. Reducing them to their
//! corner vertices turns a marker outline into a quadrilateral and a window
//! frame's edge contour into a handful of long straight sides.

use crate::geometry::point_line_distance;
use crate::types::{LineSegment, Point, Polyline};

/// Simplify a closed loop of points.
///
/// The loop is split at its two mutually farthest points (a stable pair of
/// corners for convex shapes), each half is simplified with RDP, and
/// vertices left within `tolerance` of the chord between their neighbours
/// are pruned. A tolerance of 0.0 keeps every non-collinear point.
///
/// Loops with fewer than four points are returned unchanged.
#[must_use = "returns the simplified polygon"]
pub fn simplify_closed(polyline: &Polyline, tolerance: f64) -> Vec<Point> {
    let points = polyline.points();
    let n = points.len();
    if n < 4 {
        return points.to_vec();
    }

    let a = farthest_from(points, points[0]);
    let b = farthest_from(points, points[a]);
    let (first, second) = (a.min(b), a.max(b));
    if first == second {
        return vec![points[first]];
    }

    // Rotate so the first split point is at index 0, and close the loop.
    let ring: Vec<Point> = points[first..]
        .iter()
        .chain(&points[..=first])
        .copied()
        .collect();
    let split = second - first;

    let mut kept = vec![false; ring.len()];
    kept[0] = true;
    kept[split] = true;
    kept[n] = true;
    rdp_recurse(&ring, 0, split, tolerance, &mut kept);
    rdp_recurse(&ring, split, n, tolerance, &mut kept);

    let vertices: Vec<Point> = ring[..n]
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect();

    prune_collinear(vertices, tolerance)
}

/// Remove vertices lying within `tolerance` of the line through their
/// neighbours until none remain or only a triangle is left.
#[must_use = "returns the pruned polygon"]
pub fn prune_collinear(mut vertices: Vec<Point>, tolerance: f64) -> Vec<Point> {
    loop {
        let len = vertices.len();
        if len <= 3 {
            return vertices;
        }
        let redundant = (0..len).find(|&i| {
            let prev = vertices[(i + len - 1) % len];
            let next = vertices[(i + 1) % len];
            point_line_distance(vertices[i], &LineSegment::new(prev, next)) <= tolerance
        });
        match redundant {
            Some(i) => {
                vertices.remove(i);
            }
            None => return vertices,
        }
    }
}

/// Sides of a closed polygon, including the closing side.
#[must_use]
pub fn polygon_sides(vertices: &[Point]) -> Vec<LineSegment> {
    let n = vertices.len();
    if n < 2 {
        return Vec::new();
    }
    (0..n)
        .map(|i| LineSegment::new(vertices[i], vertices[(i + 1) % n]))
        .collect()
}

fn farthest_from(points: &[Point], origin: Point) -> usize {
    points
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.distance_squared(origin)
                .total_cmp(&b.distance_squared(origin))
        })
        .map_or(0, |(i, _)| i)
}

/// Recursive step of the Ramer-Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` that is farthest from the
/// line segment between them. If that distance exceeds `tolerance`, the
/// point is kept and both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let chord = LineSegment::new(points[start], points[end]);
    let mut max_dist = 0.0;
    let mut max_idx = start;

    for (i, &p) in points.iter().enumerate().take(end).skip(start + 1) {
        let d = point_line_distance(p, &chord);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Boundary pixel loop of an axis-aligned rectangle, clockwise from the
    /// top-left pixel.
    fn rect_loop(x0: i32, y0: i32, x1: i32, y1: i32) -> Polyline {
        let mut pts = Vec::new();
        for x in x0..x1 {
            pts.push(Point::new(f64::from(x), f64::from(y0)));
        }
        for y in y0..y1 {
            pts.push(Point::new(f64::from(x1), f64::from(y)));
        }
        for x in (x0 + 1..=x1).rev() {
            pts.push(Point::new(f64::from(x), f64::from(y1)));
        }
        for y in (y0 + 1..=y1).rev() {
            pts.push(Point::new(f64::from(x0), f64::from(y)));
        }
        Polyline::new(pts)
    }

    fn contains(vertices: &[Point], x: f64, y: f64) -> bool {
        vertices.contains(&Point::new(x, y))
    }

    #[test]
    fn short_loop_unchanged() {
        let pl = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ]);
        assert_eq!(simplify_closed(&pl, 1.0).len(), 3);
    }

    #[test]
    fn rectangle_loop_reduces_to_corners() {
        let vertices = simplify_closed(&rect_loop(10, 20, 50, 40), 1.0);
        assert_eq!(vertices.len(), 4, "{vertices:?}");
        assert!(contains(&vertices, 10.0, 20.0));
        assert!(contains(&vertices, 50.0, 20.0));
        assert!(contains(&vertices, 50.0, 40.0));
        assert!(contains(&vertices, 10.0, 40.0));
    }

    #[test]
    fn loop_starting_mid_side_still_reduces_to_corners() {
        let mut points = rect_loop(0, 0, 30, 30).points().to_vec();
        points.rotate_left(7);
        let vertices = simplify_closed(&Polyline::new(points), 1.0);
        assert_eq!(vertices.len(), 4, "{vertices:?}");
        assert!(!contains(&vertices, 7.0, 0.0));
    }

    #[test]
    fn staircase_edge_within_tolerance_is_one_side() {
        // Right triangle whose hypotenuse is a 1-pixel staircase.
        let mut pts: Vec<Point> = (0..=20)
            .map(|i| Point::new(f64::from(i), f64::from(i / 2)))
            .collect();
        pts.extend((0..20).rev().map(|x| Point::new(f64::from(x), 10.0)));
        pts.extend((1..10).rev().map(|y| Point::new(0.0, f64::from(y))));

        let vertices = simplify_closed(&Polyline::new(pts), 1.5);
        assert_eq!(vertices.len(), 3, "{vertices:?}");
        assert!(contains(&vertices, 0.0, 0.0));
        assert!(contains(&vertices, 20.0, 10.0));
        assert!(contains(&vertices, 0.0, 10.0));
    }

    #[test]
    fn zero_tolerance_keeps_real_corners() {
        let vertices = simplify_closed(&rect_loop(0, 0, 5, 5), 0.0);
        assert_eq!(vertices.len(), 4);
    }

    #[test]
    fn prune_removes_midpoint_of_straight_run() {
        let vertices = vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.2),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        let pruned = prune_collinear(vertices, 1.0);
        assert_eq!(pruned.len(), 4);
        assert!(!pruned.contains(&Point::new(5.0, 0.2)));
    }

    #[test]
    fn prune_stops_at_triangle() {
        let vertices = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
        ];
        assert_eq!(prune_collinear(vertices, 5.0).len(), 3);
    }

    #[test]
    fn polygon_sides_include_closing_side() {
        let sides = polygon_sides(&[
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 3.0),
        ]);
        assert_eq!(sides.len(), 3);
        assert!((sides[2].length() - 5.0).abs() < 1e-12);
    }
}
