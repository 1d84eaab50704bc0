//! Square fiducial marker detection.
//!
//! Markers are printed black squares in the ArUco 4x4 layout: a 6x6 grid
//! of cells whose outer ring is always black and whose inner 4x4 cells
//! carry data bits. Only the black ring matters here; the data bits are
//! never decoded.
//!
//! The [`MarkerDetector`] trait is the capability the pipeline depends on.
//! [`SquareMarkerDetector`] implements it for both strategies of
//! [`MarkerStrategy`] under either [`Preprocessing`] mode.

use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::contour;
use crate::error::{MarkerDetectionErrorDetails, StageError};
use crate::simplify;
use crate::threshold;
use crate::types::{MarkerObservation, Point, Preprocessing, Quadrilateral};

/// Cells per side of the marker grid, including the border ring.
pub const GRID_CELLS: usize = 6;

/// Outward corner offset compensating for contour points lying on
/// boundary pixel centres. Moving a square's corners this far along the
/// diagonal grows each side by one pixel.
pub const CORNER_OFFSET_PX: f64 = 0.5 * std::f64::consts::SQRT_2;

/// Candidates with a corner closer than this to the image border are
/// assumed to be cut off by the frame.
pub const BORDER_MARGIN_PX: f64 = 2.0;

/// Smallest intensity gap between the surrounding ring and the marker
/// border for the border to count as dark.
pub const MIN_BORDER_CONTRAST: f64 = 40.0;

/// How many markers the scene is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStrategy {
    /// Exactly one marker.
    #[default]
    Single,
    /// Exactly two markers, usually placed in diagonally opposite corners
    /// of the window.
    Pair,
}

impl MarkerStrategy {
    /// Number of markers the strategy requires.
    #[must_use]
    pub const fn expected_quantity(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Pair => 2,
        }
    }
}

impl fmt::Display for MarkerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("single"),
            Self::Pair => f.write_str("pair"),
        }
    }
}

/// Finds fiducial markers in a grayscale image.
pub trait MarkerDetector {
    /// Detect markers, sorted top to bottom then left to right.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MarkerNotFound`] when the number of markers
    /// found differs from what the detector expects.
    fn detect(&self, image: &GrayImage) -> Result<Vec<MarkerObservation>, StageError>;
}

/// Everything one marker search produced, whether or not it satisfied the
/// strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSearch {
    /// Convex quadrilaterals that passed the shape checks.
    pub candidates: usize,
    /// Candidates that also passed the border check and nesting removal.
    pub markers: Vec<MarkerObservation>,
}

/// Contour-based detector for black square markers.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMarkerDetector {
    pub strategy: MarkerStrategy,
    pub preprocessing: Preprocessing,
    pub marker_size_mm: f64,
    pub adaptive_block_ratio: f64,
    pub polygon_epsilon: f64,
    pub min_side_px: f64,
    pub max_side_ratio: f64,
    pub border_fill: f64,
}

impl SquareMarkerDetector {
    /// Detector using the marker settings of `config`.
    #[must_use]
    pub const fn from_config(config: &PipelineConfig) -> Self {
        Self {
            strategy: config.marker_strategy,
            preprocessing: config.preprocessing,
            marker_size_mm: config.marker_size_mm,
            adaptive_block_ratio: config.adaptive_block_ratio,
            polygon_epsilon: config.polygon_epsilon,
            min_side_px: config.marker_min_side_px,
            max_side_ratio: config.marker_max_side_ratio,
            border_fill: config.marker_border_fill,
        }
    }

    /// Run the candidate search without enforcing the marker count.
    #[must_use]
    pub fn search(&self, image: &GrayImage) -> MarkerSearch {
        let binary = threshold::binarize(image, self.preprocessing, self.adaptive_block_ratio);
        let candidates = self.quad_candidates(&binary);
        let count = candidates.len();

        let mut verified: Vec<Quadrilateral> = candidates
            .into_iter()
            .filter(|quad| has_dark_border(image, quad, self.border_fill))
            .collect();
        verified.sort_by(|a, b| b.area().total_cmp(&a.area()));

        let mut outermost: Vec<Quadrilateral> = Vec::with_capacity(verified.len());
        for quad in verified {
            let center = quad.centroid();
            if !outermost.iter().any(|outer| outer.contains(center)) {
                outermost.push(quad);
            }
        }

        let mut expanded: Vec<Quadrilateral> = outermost
            .iter()
            .map(|quad| quad.expanded(CORNER_OFFSET_PX))
            .collect();
        expanded.sort_by(|a, b| {
            let (ca, cb) = (a.centroid(), b.centroid());
            ca.y.total_cmp(&cb.y).then(ca.x.total_cmp(&cb.x))
        });

        let markers = expanded
            .into_iter()
            .enumerate()
            .map(|(index, corners)| MarkerObservation {
                index,
                corners,
                side_mm: self.marker_size_mm,
            })
            .collect();

        MarkerSearch {
            candidates: count,
            markers,
        }
    }

    /// Accept a search result if it holds exactly the number of markers
    /// the strategy requires.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MarkerNotFound`] with the recovered markers as
    /// partial geometry otherwise.
    pub fn accept(&self, search: MarkerSearch) -> Result<Vec<MarkerObservation>, StageError> {
        let expected = self.strategy.expected_quantity();
        log::debug!(
            "marker search: {} candidate(s), {} marker(s), {} expected",
            search.candidates,
            search.markers.len(),
            expected
        );
        if search.markers.len() == expected {
            return Ok(search.markers);
        }
        Err(StageError::MarkerNotFound(MarkerDetectionErrorDetails {
            expected,
            found: search.markers.len(),
            candidates: search.candidates,
            strategy: self.strategy,
            preprocessing: self.preprocessing,
            partial: search.markers,
        }))
    }

    /// Convex four-sided outer contours of plausible marker shape.
    fn quad_candidates(&self, binary: &GrayImage) -> Vec<Quadrilateral> {
        let (w, h) = (f64::from(binary.width()), f64::from(binary.height()));
        contour::outer_contours(binary)
            .iter()
            .filter_map(|polyline| {
                let epsilon = self.polygon_epsilon * polyline.closed_length();
                let vertices = simplify::simplify_closed(polyline, epsilon);
                let corners: [Point; 4] = vertices.try_into().ok()?;
                Some(Quadrilateral::from_unordered(corners))
            })
            .filter(|quad| !quad.is_degenerate() && quad.is_convex())
            .filter(|quad| {
                let sides = quad.side_lengths();
                let shortest = sides.iter().copied().fold(f64::INFINITY, f64::min);
                let longest = sides.iter().copied().fold(0.0, f64::max);
                shortest >= self.min_side_px && longest <= shortest * self.max_side_ratio
            })
            .filter(|quad| {
                quad.corners().iter().all(|c| {
                    c.x >= BORDER_MARGIN_PX
                        && c.y >= BORDER_MARGIN_PX
                        && c.x <= w - 1.0 - BORDER_MARGIN_PX
                        && c.y <= h - 1.0 - BORDER_MARGIN_PX
                })
            })
            .collect()
    }
}

impl MarkerDetector for SquareMarkerDetector {
    fn detect(&self, image: &GrayImage) -> Result<Vec<MarkerObservation>, StageError> {
        self.accept(self.search(image))
    }
}

/// Point at grid coordinates `(u, v)` of `quad`, where `(0, 0)` is the
/// top-left corner and `(1, 1)` the bottom-right.
#[must_use]
pub fn quad_point(quad: &Quadrilateral, u: f64, v: f64) -> Point {
    let [tl, tr, br, bl] = *quad.corners();
    let weights = [(1.0 - u) * (1.0 - v), u * (1.0 - v), u * v, (1.0 - u) * v];
    let (x, y) = [tl, tr, br, bl]
        .iter()
        .zip(weights)
        .fold((0.0, 0.0), |(x, y), (p, w)| (p.x.mul_add(w, x), p.y.mul_add(w, y)));
    Point::new(x, y)
}

/// Bilinearly interpolated intensity at `p`, clamped to the image.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sample(image: &GrayImage, p: Point) -> f64 {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
        return 0.0;
    }
    let x = p.x.clamp(0.0, f64::from(w - 1));
    let y = p.y.clamp(0.0, f64::from(h - 1));
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - f64::from(x0), y - f64::from(y0));

    let at = |px: u32, py: u32| f64::from(image.get_pixel(px, py).0[0]);
    let top = at(x0, y0).mul_add(1.0 - fx, at(x1, y0) * fx);
    let bottom = at(x0, y1).mul_add(1.0 - fx, at(x1, y1) * fx);
    top.mul_add(1.0 - fy, bottom * fy)
}

/// Grid coordinates of the centre of cell `i`.
#[allow(clippy::cast_precision_loss)]
fn cell_center(i: usize) -> f64 {
    (i as f64 + 0.5) / GRID_CELLS as f64
}

/// Whether the outer ring of `quad`'s cell grid is dark against its
/// surroundings.
///
/// The 20 border cells are sampled at their centres, and a ring half a
/// cell outside the quad gives the local background level. A border cell
/// is dark when it is closer to the border mean than to the background
/// mean's midpoint, and at least `fill` of them must be.
#[allow(clippy::cast_precision_loss)]
fn has_dark_border(image: &GrayImage, quad: &Quadrilateral, fill: f64) -> bool {
    let last = GRID_CELLS - 1;
    let border: Vec<f64> = (0..GRID_CELLS)
        .flat_map(|j| (0..GRID_CELLS).map(move |i| (i, j)))
        .filter(|&(i, j)| i == 0 || j == 0 || i == last || j == last)
        .map(|(i, j)| sample(image, quad_point(quad, cell_center(i), cell_center(j))))
        .collect();

    let outside = 0.5 / GRID_CELLS as f64;
    let surround: Vec<f64> = (0..GRID_CELLS)
        .flat_map(|k| {
            let t = cell_center(k);
            [
                (t, -outside),
                (t, 1.0 + outside),
                (-outside, t),
                (1.0 + outside, t),
            ]
        })
        .map(|(u, v)| sample(image, quad_point(quad, u, v)))
        .collect();

    let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;
    let (border_mean, surround_mean) = (mean(&border), mean(&surround));
    if surround_mean - border_mean < MIN_BORDER_CONTRAST {
        return false;
    }
    let level = f64::midpoint(border_mean, surround_mean);
    let dark = border.iter().filter(|&&v| v < level).count();
    dark as f64 / border.len() as f64 >= fill
}
