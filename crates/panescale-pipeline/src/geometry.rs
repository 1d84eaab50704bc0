//! Pure geometry over points and line segments.
//!
//! Every function here is deterministic and allocation-light so it can be
//! called from any stage, and from tests, without a pipeline context.

use crate::types::{Dimensions, LineSegment, Point};

/// Determinant magnitude (on normalised coordinates) below which two lines
/// are treated as parallel.
pub const PARALLEL_EPSILON: f64 = 1e-6;

/// Fraction of the image extent an intersection may fall outside the frame
/// and still be considered a corner.
pub const FRAME_MARGIN_RATIO: f64 = 0.1;

/// Smallest difference between two orientations, in `[0, 90]` degrees.
///
/// Orientations are taken modulo 180, so 5 and 175 are 10 degrees apart.
#[must_use]
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 180.0;
    diff.min(180.0 - diff)
}

/// Intersection of the infinite lines through two segments.
///
/// Coordinates are normalised by the largest absolute coordinate before the
/// determinant test so the parallel threshold does not depend on image
/// size. Returns `None` for (near-)parallel or zero-length inputs.
#[must_use]
pub fn line_intersection(a: &LineSegment, b: &LineSegment) -> Option<Point> {
    let coords = [
        a.start.x, a.start.y, a.end.x, a.end.y, b.start.x, b.start.y, b.end.x, b.end.y,
    ];
    let scale = coords.iter().fold(1.0_f64, |acc, c| acc.max(c.abs()));
    let [x1, y1, x2, y2, x3, y3, x4, y4] = coords.map(|c| c / scale);

    let denom = (x1 - x2).mul_add(y3 - y4, -((y1 - y2) * (x3 - x4)));
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }

    let det_a = x1.mul_add(y2, -(y1 * x2));
    let det_b = x3.mul_add(y4, -(y3 * x4));
    let px = det_a.mul_add(x3 - x4, -((x1 - x2) * det_b)) / denom;
    let py = det_a.mul_add(y3 - y4, -((y1 - y2) * det_b)) / denom;
    Some(Point::new(px * scale, py * scale))
}

/// Perpendicular distance from `point` to the infinite line through `line`.
///
/// Falls back to the distance to `line.start` when the segment has zero
/// length.
#[must_use]
pub fn point_line_distance(point: Point, line: &LineSegment) -> f64 {
    let len = line.length();
    if len <= f64::EPSILON {
        return point.distance(line.start);
    }
    let dx = line.end.x - line.start.x;
    let dy = line.end.y - line.start.y;
    let cross = dx.mul_add(line.start.y - point.y, -((line.start.x - point.x) * dy));
    cross.abs() / len
}

/// All pairwise intersections of the given lines.
#[must_use]
pub fn intersections(lines: &[LineSegment]) -> Vec<Point> {
    let mut points = Vec::new();
    for (i, a) in lines.iter().enumerate() {
        for b in &lines[i + 1..] {
            if let Some(p) = line_intersection(a, b) {
                points.push(p);
            }
        }
    }
    points
}

/// Reduce a cloud of intersection points to one corner per quadrant.
///
/// Points further than [`FRAME_MARGIN_RATIO`] of the image extent outside
/// the frame are dropped. The remaining points are bucketed into quadrants
/// around their centroid and the point nearest the centroid is kept from
/// each. Returns corners in top-left, top-right, bottom-right, bottom-left
/// order, or `None` when fewer than four points remain or any quadrant is
/// empty.
#[must_use]
pub fn four_intersections(points: &[Point], dims: Dimensions) -> Option<[Point; 4]> {
    if points.len() < 4 {
        return None;
    }
    let width = f64::from(dims.width);
    let height = f64::from(dims.height);
    let margin_x = width * FRAME_MARGIN_RATIO;
    let margin_y = height * FRAME_MARGIN_RATIO;

    let inside: Vec<Point> = points
        .iter()
        .copied()
        .filter(|p| {
            p.x >= -margin_x && p.x <= width + margin_x && p.y >= -margin_y && p.y <= height + margin_y
        })
        .collect();
    if inside.len() < 4 {
        return None;
    }
    let center = Point::centroid(&inside)?;

    let mut best: [Option<(f64, Point)>; 4] = [None; 4];
    for p in inside {
        let quadrant = match (p.x < center.x, p.y < center.y) {
            (true, true) => 0,
            (false, true) => 1,
            (false, false) => 2,
            (true, false) => 3,
        };
        let dist = p.distance_squared(center);
        if best[quadrant].is_none_or(|(d, _)| dist < d) {
            best[quadrant] = Some((dist, p));
        }
    }

    let [tl, tr, br, bl] = best;
    Some([tl?.1, tr?.1, br?.1, bl?.1])
}
