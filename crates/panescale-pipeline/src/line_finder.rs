//! Window edge selection and quadrilateral fitting.
//!
//! Takes the raw segments produced by [`crate::segments`] and reduces them
//! to the four sides of the window:
//!
//! 1. [`filter_lines_by_angle`] keeps segments aligned with the dominant
//!    orientation (the longest segment) or perpendicular to it.
//! 2. [`merge_collinear`] collapses the duplicate and broken segments every
//!    real edge produces into one representative.
//! 3. [`select_window_edges`] buckets lines by which side of the scene
//!    center they fall on and picks the outermost consistent line per side.
//! 4. [`fit_quadrilateral`] intersects the four edges into corners and
//!    checks the result is a plausible rectangle in perspective.
//!
//! [`process_lines`] chains the four steps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{EdgeFittingErrorDetails, EdgeFittingReason, StageError};
use crate::geometry::{angular_distance, four_intersections, intersections, point_line_distance};
use crate::types::{Dimensions, LineSegment, Point, Quadrilateral, Side};

/// Lines at least this fraction of the larger image dimension long define
/// the scene center.
pub const CENTER_LINE_RATIO: f64 = 0.25;

/// Largest orientation difference, in degrees, between segments merged
/// into one line.
pub const MERGE_ANGLE_DEG: f64 = 3.0;

/// Half-width, in whole degrees, of the modal orientation band kept per
/// side.
const MODE_BAND_DEG: i64 = 1;

/// The four selected window edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowEdges {
    pub top: LineSegment,
    pub right: LineSegment,
    pub bottom: LineSegment,
    pub left: LineSegment,
}

impl WindowEdges {
    /// The edge for one side.
    #[must_use]
    pub const fn get(&self, side: Side) -> LineSegment {
        match side {
            Side::Top => self.top,
            Side::Right => self.right,
            Side::Bottom => self.bottom,
            Side::Left => self.left,
        }
    }

    /// Edges in top, right, bottom, left order.
    #[must_use]
    pub const fn as_array(&self) -> [LineSegment; 4] {
        [self.top, self.right, self.bottom, self.left]
    }
}

/// Everything the line finder derived, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFit {
    /// Raw segments handed in.
    pub candidate_count: usize,
    /// Segments left after angle filtering.
    pub filtered_count: usize,
    /// Orientation of the longest raw segment, in degrees.
    pub reference_angle: f64,
    /// Lines after merging duplicates.
    pub merged: Vec<LineSegment>,
    /// Center used to bucket lines into sides.
    pub center: Point,
    pub edges: WindowEdges,
    /// All pairwise intersections of the four edges.
    pub intersections: Vec<Point>,
    pub quad: Quadrilateral,
}

/// Keep lines within `tolerance` degrees of `reference` or of
/// `reference + 90`.
#[must_use]
pub fn filter_lines_by_angle(
    lines: &[LineSegment],
    reference: f64,
    tolerance: f64,
) -> Vec<LineSegment> {
    let perpendicular = reference + 90.0;
    lines
        .iter()
        .copied()
        .filter(|line| {
            let angle = line.angle();
            angular_distance(angle, reference) <= tolerance
                || angular_distance(angle, perpendicular) <= tolerance
        })
        .collect()
}

/// The longest line, if any.
#[must_use]
pub fn longest(lines: &[LineSegment]) -> Option<LineSegment> {
    lines
        .iter()
        .copied()
        .max_by(|a, b| a.length().total_cmp(&b.length()))
}

/// Merge lines that are near-parallel and lie along the same support line.
///
/// Lines are visited longest first. A line joins the first group whose
/// representative (its longest member) is within `angle_tolerance`
/// degrees and whose support line passes within `distance` pixels of the
/// line's midpoint. Each group becomes one segment on the representative's
/// support line spanning the projections of every member's endpoints.
#[must_use]
pub fn merge_collinear(
    lines: &[LineSegment],
    angle_tolerance: f64,
    distance: f64,
) -> Vec<LineSegment> {
    let mut sorted = lines.to_vec();
    sorted.sort_by(|a, b| b.length().total_cmp(&a.length()));

    let mut groups: Vec<(LineSegment, Vec<LineSegment>)> = Vec::new();
    for line in sorted {
        let mid = line.midpoint();
        let angle = line.angle();
        let group = groups.iter_mut().find(|(rep, _)| {
            angular_distance(rep.angle(), angle) <= angle_tolerance
                && point_line_distance(mid, rep) <= distance
        });
        match group {
            Some((_, members)) => members.push(line),
            None => groups.push((line, vec![line])),
        }
    }

    groups
        .into_iter()
        .filter_map(|(rep, members)| span_along(rep, &members))
        .collect()
}

/// Segment on `rep`'s support line covering every member's projection.
fn span_along(rep: LineSegment, members: &[LineSegment]) -> Option<LineSegment> {
    let (ux, uy) = rep.direction()?;
    let origin = rep.start;
    let (lo, hi) = members
        .iter()
        .flat_map(|m| [m.start, m.end])
        .map(|p| (p.x - origin.x).mul_add(ux, (p.y - origin.y) * uy))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
            (lo.min(t), hi.max(t))
        });
    let at = |t: f64| Point::new(ux.mul_add(t, origin.x), uy.mul_add(t, origin.y));
    Some(LineSegment::new(at(lo), at(hi)))
}

/// Mean midpoint of lines at least `length_threshold` long.
#[must_use]
pub fn average_line_midpoint(lines: &[LineSegment], length_threshold: f64) -> Option<Point> {
    let midpoints: Vec<Point> = lines
        .iter()
        .filter(|l| l.length() >= length_threshold)
        .map(LineSegment::midpoint)
        .collect();
    Point::centroid(&midpoints)
}

/// Pick one line per side of the window.
///
/// The scene center is the mean midpoint of lines at least
/// `length_threshold` long (falling back to all lines, then to the image
/// center). A line belongs to a side when both endpoints lie beyond the
/// center on that side and it is within `angle_window` degrees of the
/// side's expected orientation. Within a side only lines near the modal
/// whole-degree orientation are considered, and the one farthest from the
/// center wins. Lines within `tie_distance` of the farthest are compared by
/// length instead, so a short stray segment just outside a long frame edge
/// does not win.
///
/// # Errors
///
/// Returns [`StageError::EdgeFittingFailed`] with
/// [`EdgeFittingReason::MissingEdge`] when any side has no candidate.
pub fn select_window_edges(
    lines: &[LineSegment],
    dims: Dimensions,
    length_threshold: f64,
    angle_window: f64,
    tie_distance: f64,
) -> Result<(Point, WindowEdges), StageError> {
    let center = average_line_midpoint(lines, length_threshold)
        .or_else(|| average_line_midpoint(lines, 0.0))
        .unwrap_or_else(|| dims.center());

    let picked = Side::ALL.map(|side| pick_side(lines, center, side, angle_window, tie_distance));
    let selected = picked.iter().filter(|p| p.is_some()).count();
    let [Some(top), Some(right), Some(bottom), Some(left)] = picked else {
        return Err(StageError::EdgeFittingFailed(EdgeFittingErrorDetails {
            reason: EdgeFittingReason::MissingEdge,
            candidate_lines: lines.len(),
            selected_edges: selected,
            intersections: 0,
        }));
    };

    Ok((
        center,
        WindowEdges {
            top,
            right,
            bottom,
            left,
        },
    ))
}

/// How far `line` sits beyond `center` on `side`.
fn extremity(line: &LineSegment, center: Point, side: Side) -> f64 {
    let mid = line.midpoint();
    match side {
        Side::Top => center.y - mid.y,
        Side::Bottom => mid.y - center.y,
        Side::Left => center.x - mid.x,
        Side::Right => mid.x - center.x,
    }
}

fn on_side(line: &LineSegment, center: Point, side: Side) -> bool {
    let [a, b] = [line.start, line.end];
    match side {
        Side::Top => a.y < center.y && b.y < center.y,
        Side::Bottom => a.y > center.y && b.y > center.y,
        Side::Left => a.x < center.x && b.x < center.x,
        Side::Right => a.x > center.x && b.x > center.x,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn angle_bin(line: &LineSegment) -> i64 {
    (line.angle().round() as i64).rem_euclid(180)
}

fn bin_distance(a: i64, b: i64) -> i64 {
    let diff = (a - b).abs() % 180;
    diff.min(180 - diff)
}

fn pick_side(
    lines: &[LineSegment],
    center: Point,
    side: Side,
    angle_window: f64,
    tie_distance: f64,
) -> Option<LineSegment> {
    let candidates: Vec<LineSegment> = lines
        .iter()
        .copied()
        .filter(|l| on_side(l, center, side))
        .filter(|l| angular_distance(l.angle(), side.expected_angle()) <= angle_window)
        .collect();

    // Modal orientation; ties go to the bin with more total length.
    let mut bins: BTreeMap<i64, (usize, f64)> = BTreeMap::new();
    for line in &candidates {
        let entry = bins.entry(angle_bin(line)).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += line.length();
    }
    let mode = bins
        .iter()
        .max_by(|(_, (ca, la)), (_, (cb, lb))| ca.cmp(cb).then(la.total_cmp(lb)))
        .map(|(bin, _)| *bin)?;

    let banded: Vec<LineSegment> = candidates
        .into_iter()
        .filter(|l| bin_distance(angle_bin(l), mode) <= MODE_BAND_DEG)
        .collect();

    let farthest = banded
        .iter()
        .map(|l| extremity(l, center, side))
        .fold(f64::NEG_INFINITY, f64::max);

    banded
        .into_iter()
        .filter(|l| extremity(l, center, side) >= farthest - tie_distance)
        .max_by(|a, b| a.length().total_cmp(&b.length()))
}

/// Intersect the four edges and order the corners.
///
/// Checks that the corners form a convex, non-degenerate quadrilateral
/// whose sides all lie within `tolerance` degrees of `reference` or its
/// perpendicular.
///
/// # Errors
///
/// Returns [`StageError::EdgeFittingFailed`] when a quadrant has no
/// corner, the quadrilateral is degenerate, or a side is off-axis.
pub fn fit_quadrilateral(
    edges: &WindowEdges,
    dims: Dimensions,
    reference: f64,
    tolerance: f64,
) -> Result<(Vec<Point>, Quadrilateral), StageError> {
    let points = intersections(&edges.as_array());
    let fail = |reason| {
        StageError::EdgeFittingFailed(EdgeFittingErrorDetails {
            reason,
            candidate_lines: 4,
            selected_edges: 4,
            intersections: points.len(),
        })
    };

    let Some(corners) = four_intersections(&points, dims) else {
        return Err(fail(EdgeFittingReason::TooFewIntersections));
    };
    let quad = Quadrilateral::new(corners);
    if quad.is_degenerate() || !quad.is_convex() {
        return Err(fail(EdgeFittingReason::DegenerateQuadrilateral));
    }

    let perpendicular = reference + 90.0;
    let aligned = quad.sides().iter().all(|side| {
        let angle = side.angle();
        angular_distance(angle, reference) <= tolerance
            || angular_distance(angle, perpendicular) <= tolerance
    });
    if !aligned {
        return Err(fail(EdgeFittingReason::NotRectangular));
    }

    Ok((points, quad))
}

/// Run the full line-finding chain on raw segments.
///
/// # Errors
///
/// Returns [`StageError::EdgeFittingFailed`] carrying the raw segment count
/// and how far the chain got.
pub fn process_lines(
    segments: &[LineSegment],
    dims: Dimensions,
    config: &PipelineConfig,
) -> Result<LineFit, StageError> {
    let candidate_count = segments.len();
    let too_few = |selected| {
        StageError::EdgeFittingFailed(EdgeFittingErrorDetails {
            reason: EdgeFittingReason::TooFewLines,
            candidate_lines: candidate_count,
            selected_edges: selected,
            intersections: 0,
        })
    };

    let Some(reference) = longest(segments) else {
        return Err(too_few(0));
    };
    let reference_angle = reference.angle();

    let filtered = filter_lines_by_angle(segments, reference_angle, config.angle_tolerance_deg);
    let merged = merge_collinear(&filtered, MERGE_ANGLE_DEG, config.merge_distance_px);
    log::debug!(
        "line finder: {candidate_count} segments, {} after angle filter, {} after merge",
        filtered.len(),
        merged.len()
    );
    if merged.len() < 4 {
        return Err(too_few(0));
    }

    let length_threshold = f64::from(dims.max_side()) * CENTER_LINE_RATIO;
    let (center, edges) = select_window_edges(
        &merged,
        dims,
        length_threshold,
        config.edge_angle_window_deg,
        config.merge_distance_px,
    )
    .map_err(|e| with_candidates(e, candidate_count))?;

    let (intersections, quad) =
        fit_quadrilateral(&edges, dims, reference_angle, config.angle_tolerance_deg)
            .map_err(|e| with_candidates(e, candidate_count))?;

    Ok(LineFit {
        candidate_count,
        filtered_count: filtered.len(),
        reference_angle,
        merged,
        center,
        edges,
        intersections,
        quad,
    })
}

fn with_candidates(err: StageError, candidates: usize) -> StageError {
    match err {
        StageError::EdgeFittingFailed(mut details) => {
            details.candidate_lines = candidates;
            StageError::EdgeFittingFailed(details)
        }
        other => other,
    }
}
