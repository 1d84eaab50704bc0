//! Shared types for the panescale measurement pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Millimetres per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Arithmetic mean of a set of points, or `None` when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn centroid(points: &[Self]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Self::new(sx / n, sy / n))
    }
}

/// A sequence of connected points, as produced by contour tracing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Length of the polyline treated as a closed loop.
    #[must_use]
    pub fn closed_length(&self) -> f64 {
        let n = self.0.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| self.0[i].distance(self.0[(i + 1) % n]))
            .sum()
    }
}

/// A straight line segment between two points.
///
/// The direction is irrelevant to every derived quantity: the angle is
/// folded into `[0, 180)` degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    /// First endpoint.
    pub start: Point,
    /// Second endpoint.
    pub end: Point,
}

impl LineSegment {
    /// Create a segment from its two endpoints.
    #[must_use]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Euclidean length in pixels.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Point halfway between the endpoints.
    #[must_use]
    pub fn midpoint(&self) -> Point {
        Point::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }

    /// Orientation in degrees, in `[0, 180)`.
    ///
    /// Measured from the positive x axis towards positive y (downwards in
    /// image space).
    #[must_use]
    pub fn angle(&self) -> f64 {
        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        let angle = dy.atan2(dx).to_degrees().rem_euclid(180.0);
        // rem_euclid can round a tiny negative angle up to exactly 180.
        if angle >= 180.0 { 0.0 } else { angle }
    }

    /// Unit direction vector, or `None` for a zero-length segment.
    #[must_use]
    pub fn direction(&self) -> Option<(f64, f64)> {
        let len = self.length();
        if len <= f64::EPSILON {
            return None;
        }
        Some((
            (self.end.x - self.start.x) / len,
            (self.end.y - self.start.y) / len,
        ))
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// The larger of width and height.
    #[must_use]
    pub fn max_side(self) -> u32 {
        self.width.max(self.height)
    }

    /// Geometric center of the frame.
    #[must_use]
    pub fn center(self) -> Point {
        Point::new(f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }
}

/// How raster inputs are conditioned before marker and edge extraction.
///
/// Both variants feed the same downstream contracts; they differ only in
/// how foreground and edges are separated from the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    /// Global Otsu binarisation and a fixed-threshold Canny edge map.
    #[default]
    Plain,
    /// Local-mean adaptive binarisation and a Canny edge map with
    /// Otsu-derived thresholds, masked by a difference-of-Gaussians
    /// response. More tolerant of uneven lighting.
    EdgeEnhanced,
}

impl std::fmt::Display for Preprocessing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::EdgeEnhanced => write!(f, "edge_enhanced"),
        }
    }
}

/// One of the four sides of a [`Quadrilateral`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    /// All sides in clockwise order starting at the top.
    pub const ALL: [Self; 4] = [Self::Top, Self::Right, Self::Bottom, Self::Left];

    /// Orientation a side of an upright rectangle has, in degrees.
    #[must_use]
    pub const fn expected_angle(self) -> f64 {
        match self {
            Self::Top | Self::Bottom => 0.0,
            Self::Left | Self::Right => 90.0,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Top => write!(f, "top"),
            Self::Right => write!(f, "right"),
            Self::Bottom => write!(f, "bottom"),
            Self::Left => write!(f, "left"),
        }
    }
}

/// Sine of the smallest corner angle still treated as a real corner.
const COLLINEAR_SINE: f64 = 1e-3;

/// Four corners ordered top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    corners: [Point; 4],
}

impl Quadrilateral {
    /// Wrap corners that are already in top-left, top-right,
    /// bottom-right, bottom-left order.
    #[must_use]
    pub const fn new(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    /// Order four arbitrary points as top-left, top-right, bottom-right,
    /// bottom-left.
    ///
    /// Points are sorted clockwise (in image space) around their centroid
    /// and rotated so the point with the smallest `x + y` comes first.
    #[must_use]
    pub fn from_unordered(points: [Point; 4]) -> Self {
        let center = Point::centroid(&points).unwrap_or(Point::new(0.0, 0.0));
        let mut sorted = points;
        sorted.sort_by(|a, b| {
            let angle_a = (a.y - center.y).atan2(a.x - center.x);
            let angle_b = (b.y - center.y).atan2(b.x - center.x);
            angle_a.total_cmp(&angle_b)
        });
        let first = sorted
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.x + a.y).total_cmp(&(b.x + b.y)))
            .map_or(0, |(i, _)| i);
        sorted.rotate_left(first);
        Self { corners: sorted }
    }

    /// Corners in top-left, top-right, bottom-right, bottom-left order.
    #[must_use]
    pub const fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    #[must_use]
    pub const fn top_left(&self) -> Point {
        self.corners[0]
    }

    #[must_use]
    pub const fn top_right(&self) -> Point {
        self.corners[1]
    }

    #[must_use]
    pub const fn bottom_right(&self) -> Point {
        self.corners[2]
    }

    #[must_use]
    pub const fn bottom_left(&self) -> Point {
        self.corners[3]
    }

    /// The side joining two adjacent corners.
    #[must_use]
    pub const fn side(&self, side: Side) -> LineSegment {
        let [tl, tr, br, bl] = self.corners;
        match side {
            Side::Top => LineSegment::new(tl, tr),
            Side::Right => LineSegment::new(tr, br),
            Side::Bottom => LineSegment::new(bl, br),
            Side::Left => LineSegment::new(tl, bl),
        }
    }

    /// Sides in top, right, bottom, left order.
    #[must_use]
    pub fn sides(&self) -> [LineSegment; 4] {
        Side::ALL.map(|side| self.side(side))
    }

    /// Side lengths in top, right, bottom, left order.
    #[must_use]
    pub fn side_lengths(&self) -> [f64; 4] {
        self.sides().map(|s| s.length())
    }

    #[must_use]
    pub fn perimeter(&self) -> f64 {
        self.side_lengths().iter().sum()
    }

    /// Mean of the four corners.
    #[must_use]
    pub fn centroid(&self) -> Point {
        Point::centroid(&self.corners).unwrap_or(self.corners[0])
    }

    /// Unsigned area by the shoelace formula.
    #[must_use]
    pub fn area(&self) -> f64 {
        let twice: f64 = (0..4)
            .map(|i| {
                let a = self.corners[i];
                let b = self.corners[(i + 1) % 4];
                a.x.mul_add(b.y, -(b.x * a.y))
            })
            .sum();
        twice.abs() / 2.0
    }

    /// Returns `true` if any three corners are (nearly) collinear or any
    /// side has zero length.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.turns().iter().any(|turn| turn.is_none_or(|sine| sine.abs() < COLLINEAR_SINE))
    }

    /// Returns `true` if every corner turns in the same direction.
    #[must_use]
    pub fn is_convex(&self) -> bool {
        let turns = self.turns();
        if turns.iter().any(Option::is_none) {
            return false;
        }
        let signs: Vec<bool> = turns.iter().flatten().map(|s| *s > 0.0).collect();
        signs.iter().all(|&s| s) || signs.iter().all(|&s| !s)
    }

    /// Move each corner `offset` pixels away from the centroid.
    #[must_use]
    pub fn expanded(&self, offset: f64) -> Self {
        let center = self.centroid();
        let corners = self.corners.map(|c| {
            let dist = c.distance(center);
            if dist <= f64::EPSILON {
                return c;
            }
            let scale = (dist + offset) / dist;
            Point::new(
                (c.x - center.x).mul_add(scale, center.x),
                (c.y - center.y).mul_add(scale, center.y),
            )
        });
        Self { corners }
    }

    /// Returns `true` if `point` lies inside (or on) the quadrilateral.
    ///
    /// Only meaningful for convex quadrilaterals.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        let crosses: Vec<f64> = (0..4)
            .map(|i| {
                let a = self.corners[i];
                let b = self.corners[(i + 1) % 4];
                (b.x - a.x).mul_add(point.y - a.y, -((b.y - a.y) * (point.x - a.x)))
            })
            .collect();
        crosses.iter().all(|&c| c >= 0.0) || crosses.iter().all(|&c| c <= 0.0)
    }

    /// Normalised cross product at each corner: the sine of the turn
    /// angle, or `None` where an adjacent side has zero length.
    fn turns(&self) -> [Option<f64>; 4] {
        std::array::from_fn(|i| {
            let prev = self.corners[(i + 3) % 4];
            let here = self.corners[i];
            let next = self.corners[(i + 1) % 4];
            let (ax, ay) = (here.x - prev.x, here.y - prev.y);
            let (bx, by) = (next.x - here.x, next.y - here.y);
            let norm = ax.hypot(ay) * bx.hypot(by);
            if norm <= f64::EPSILON {
                return None;
            }
            Some(ax.mul_add(by, -(ay * bx)) / norm)
        })
    }
}

/// A detected fiducial marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerObservation {
    /// Position of the marker in detection order (sorted top to bottom,
    /// then left to right).
    pub index: usize,
    /// Outer corners in pixel space.
    pub corners: Quadrilateral,
    /// Known physical side length in millimetres.
    pub side_mm: f64,
}

impl MarkerObservation {
    /// Center of the marker in pixel space.
    #[must_use]
    pub fn center(&self) -> Point {
        self.corners.centroid()
    }

    /// Mean side length in pixels.
    #[must_use]
    pub fn side_px(&self) -> f64 {
        crate::scale::marker_scale_px(self.corners.corners())
    }
}

/// Physical size of the measured window, in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub width_in: f64,
    pub height_in: f64,
}

impl Measurement {
    /// Copy with both dimensions rounded to two decimal places.
    #[must_use]
    pub fn rounded(self) -> Self {
        Self {
            width_in: (self.width_in * 100.0).round() / 100.0,
            height_in: (self.height_in * 100.0).round() / 100.0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Quadrilateral {
        Quadrilateral::new([
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ])
    }

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_centroid_of_empty_is_none() {
        assert!(Point::centroid(&[]).is_none());
    }

    #[test]
    fn point_centroid_is_mean() {
        let c = Point::centroid(&[Point::new(0.0, 0.0), Point::new(4.0, 2.0)]).unwrap();
        assert_eq!(c, Point::new(2.0, 1.0));
    }

    // --- Polyline tests ---

    #[test]
    fn polyline_closed_length_includes_closing_edge() {
        let pl = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        assert_abs_diff_eq!(pl.closed_length(), 40.0);
    }

    // --- LineSegment tests ---

    #[test]
    fn segment_length_and_midpoint() {
        let s = LineSegment::new(Point::new(0.0, 0.0), Point::new(6.0, 8.0));
        assert_abs_diff_eq!(s.length(), 10.0);
        assert_eq!(s.midpoint(), Point::new(3.0, 4.0));
    }

    #[test]
    fn segment_angle_ignores_direction() {
        let forward = LineSegment::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        let backward = LineSegment::new(Point::new(10.0, 10.0), Point::new(0.0, 0.0));
        assert_abs_diff_eq!(forward.angle(), 45.0, epsilon = 1e-9);
        assert_abs_diff_eq!(backward.angle(), 45.0, epsilon = 1e-9);
    }

    #[test]
    fn segment_angle_of_leftward_horizontal_is_zero() {
        let s = LineSegment::new(Point::new(10.0, 5.0), Point::new(0.0, 5.0));
        assert_abs_diff_eq!(s.angle(), 0.0);
    }

    #[test]
    fn segment_angle_stays_below_180() {
        let s = LineSegment::new(Point::new(10.0, 0.0), Point::new(0.0, -1e-15));
        let angle = s.angle();
        assert!((0.0..180.0).contains(&angle), "angle {angle}");
    }

    #[test]
    fn segment_angle_vertical() {
        let s = LineSegment::new(Point::new(3.0, 0.0), Point::new(3.0, 9.0));
        assert_abs_diff_eq!(s.angle(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_length_segment_has_no_direction() {
        let p = Point::new(1.0, 1.0);
        assert!(LineSegment::new(p, p).direction().is_none());
    }

    // --- Quadrilateral tests ---

    #[test]
    fn from_unordered_orders_clockwise_from_top_left() {
        let quad = Quadrilateral::from_unordered([
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 0.0),
        ]);
        assert_eq!(quad, rect(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn from_unordered_handles_rotated_rectangle() {
        let quad = Quadrilateral::from_unordered([
            Point::new(102.0, 48.0),
            Point::new(10.0, 12.0),
            Point::new(95.0, 2.0),
            Point::new(17.0, 58.0),
        ]);
        assert_eq!(quad.top_left(), Point::new(10.0, 12.0));
        assert_eq!(quad.top_right(), Point::new(95.0, 2.0));
        assert_eq!(quad.bottom_right(), Point::new(102.0, 48.0));
        assert_eq!(quad.bottom_left(), Point::new(17.0, 58.0));
    }

    #[test]
    fn sides_follow_corner_order() {
        let quad = rect(0.0, 0.0, 30.0, 20.0);
        let [top, right, bottom, left] = quad.side_lengths();
        assert_abs_diff_eq!(top, 30.0);
        assert_abs_diff_eq!(right, 20.0);
        assert_abs_diff_eq!(bottom, 30.0);
        assert_abs_diff_eq!(left, 20.0);
        assert_abs_diff_eq!(quad.perimeter(), 100.0);
        assert_abs_diff_eq!(quad.area(), 600.0);
    }

    #[test]
    fn rectangle_is_convex_and_not_degenerate() {
        let quad = rect(5.0, 5.0, 40.0, 10.0);
        assert!(quad.is_convex());
        assert!(!quad.is_degenerate());
    }

    #[test]
    fn collinear_corners_are_degenerate() {
        let quad = Quadrilateral::new([
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ]);
        assert!(quad.is_degenerate());
    }

    #[test]
    fn repeated_corner_is_degenerate() {
        let p = Point::new(1.0, 1.0);
        let quad = Quadrilateral::new([p, p, Point::new(5.0, 5.0), Point::new(0.0, 5.0)]);
        assert!(quad.is_degenerate());
        assert!(!quad.is_convex());
    }

    #[test]
    fn bowtie_is_not_convex() {
        let quad = Quadrilateral::new([
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ]);
        assert!(!quad.is_convex());
    }

    #[test]
    fn expanded_square_grows_by_diagonal_offset() {
        let quad = rect(0.0, 0.0, 10.0, 10.0).expanded(0.5 * std::f64::consts::SQRT_2);
        assert_abs_diff_eq!(quad.side_lengths()[0], 11.0, epsilon = 1e-9);
        assert_abs_diff_eq!(quad.top_left().x, -0.5, epsilon = 1e-9);
    }

    #[test]
    fn contains_interior_but_not_exterior() {
        let quad = rect(0.0, 0.0, 10.0, 10.0);
        assert!(quad.contains(Point::new(5.0, 5.0)));
        assert!(!quad.contains(Point::new(15.0, 5.0)));
    }

    // --- Measurement tests ---

    #[test]
    fn measurement_rounds_to_two_decimals() {
        let m = Measurement {
            width_in: 12.3456,
            height_in: 7.891,
        }
        .rounded();
        assert_abs_diff_eq!(m.width_in, 12.35);
        assert_abs_diff_eq!(m.height_in, 7.89);
    }

    // --- Serde tests ---

    #[test]
    fn quadrilateral_serde_round_trip() {
        let quad = rect(1.5, 2.5, 10.0, 20.0);
        let json = serde_json::to_string(&quad).unwrap();
        let deserialized: Quadrilateral = serde_json::from_str(&json).unwrap();
        assert_eq!(quad, deserialized);
    }

    #[test]
    fn side_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Side::Bottom).unwrap(), "\"bottom\"");
    }
}
