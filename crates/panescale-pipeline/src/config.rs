//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::dimension::DimensionCalculatorKind;
use crate::downsample::DownsampleFilter;
use crate::edge;
use crate::error::PipelineError;
use crate::marker::MarkerStrategy;
use crate::segments::LineDetectorKind;
use crate::types::{Dimensions, Preprocessing};
use crate::window::WindowDetectorKind;

/// Configuration for a measurement run.
///
/// Every field has a default, and a partial JSON object deserializes onto
/// those defaults. Call [`validate`](Self::validate) (the pipeline does)
/// before trusting hand-built values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// One or two markers in the frame.
    pub marker_strategy: MarkerStrategy,

    /// Plain or edge-enhanced conditioning, applied to both the marker
    /// search and the window edge map.
    pub preprocessing: Preprocessing,

    /// How the window quadrilateral is found.
    pub window_detector: WindowDetectorKind,

    /// How raw line segments are extracted from the edge map.
    pub line_detector: LineDetectorKind,

    /// How pixel dimensions are turned into physical ones.
    pub dimension_calculator: DimensionCalculatorKind,

    /// Physical side length of each marker, in millimetres.
    pub marker_size_mm: f64,

    /// Physical center-to-center distance between two markers, in
    /// millimetres. Only used by the pair strategy.
    pub marker_spacing_mm: Option<f64>,

    /// Maximum pixel dimension of the working image. Larger inputs are
    /// downsampled before any detection runs. Zero disables downsampling.
    pub working_resolution: u32,

    /// Resampling filter used when downsampling.
    pub downsample_filter: DownsampleFilter,

    /// Gaussian blur sigma applied before binarisation and edge detection.
    pub blur_sigma: f32,

    /// Canny low threshold for the plain edge map.
    ///
    /// Must be at least [`edge::MIN_THRESHOLD`] and at most `canny_high`.
    pub canny_low: f32,

    /// Canny high threshold for the plain edge map.
    pub canny_high: f32,

    /// Inner sigma of the difference-of-Gaussians mask.
    pub dog_sigma_inner: f32,

    /// Outer sigma of the difference-of-Gaussians mask.
    pub dog_sigma_outer: f32,

    /// Adaptive-threshold window radius as a fraction of the larger image
    /// dimension.
    pub adaptive_block_ratio: f64,

    /// Closed-polygon approximation tolerance as a fraction of the contour
    /// perimeter.
    pub polygon_epsilon: f64,

    /// Smallest marker side accepted, in pixels.
    pub marker_min_side_px: f64,

    /// Largest accepted ratio between a marker's longest and shortest side.
    pub marker_max_side_ratio: f64,

    /// Fraction of the marker's border cells that must be dark.
    pub marker_border_fill: f64,

    /// Ramer-Douglas-Peucker tolerance in pixels for edge-map contours.
    pub simplify_tolerance: f64,

    /// Shortest usable line, as a fraction of the larger image dimension.
    pub min_line_length_ratio: f64,

    /// Tolerance in degrees when filtering lines against the reference
    /// orientation and checking fitted sides.
    pub angle_tolerance_deg: f64,

    /// Window in degrees around horizontal/vertical for per-side edge
    /// candidates.
    pub edge_angle_window_deg: f64,

    /// Distance in pixels under which parallel lines are merged and edge
    /// candidates are considered tied.
    pub merge_distance_px: f64,

    /// Non-maximum suppression radius for the Hough accumulator.
    pub hough_suppression_radius: u32,

    /// Largest gap in edge support bridged when walking a Hough line.
    pub max_line_gap_px: f64,

    /// Largest relative disagreement between two scale estimates.
    pub scale_agreement_tolerance: f64,
}

impl PipelineConfig {
    pub const DEFAULT_MARKER_SIZE_MM: f64 = 100.0;
    pub const DEFAULT_WORKING_RESOLUTION: u32 = 1600;
    pub const DEFAULT_DOWNSAMPLE_FILTER: DownsampleFilter = DownsampleFilter::Triangle;
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.4;
    pub const DEFAULT_CANNY_LOW: f32 = 50.0;
    pub const DEFAULT_CANNY_HIGH: f32 = 150.0;
    pub const DEFAULT_DOG_SIGMA_INNER: f32 = 1.0;
    pub const DEFAULT_DOG_SIGMA_OUTER: f32 = 3.0;
    pub const DEFAULT_ADAPTIVE_BLOCK_RATIO: f64 = 0.0625;
    pub const DEFAULT_POLYGON_EPSILON: f64 = 0.03;
    pub const DEFAULT_MARKER_MIN_SIDE_PX: f64 = 16.0;
    pub const DEFAULT_MARKER_MAX_SIDE_RATIO: f64 = 1.3;
    pub const DEFAULT_MARKER_BORDER_FILL: f64 = 0.75;
    pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 2.0;
    pub const DEFAULT_MIN_LINE_LENGTH_RATIO: f64 = 0.2;
    pub const DEFAULT_ANGLE_TOLERANCE_DEG: f64 = 12.0;
    pub const DEFAULT_EDGE_ANGLE_WINDOW_DEG: f64 = 45.0;
    pub const DEFAULT_MERGE_DISTANCE_PX: f64 = 6.0;
    pub const DEFAULT_HOUGH_SUPPRESSION_RADIUS: u32 = 8;
    pub const DEFAULT_MAX_LINE_GAP_PX: f64 = 6.0;
    pub const DEFAULT_SCALE_AGREEMENT_TOLERANCE: f64 = 0.15;

    /// Shortest usable line length in pixels for an image of `dims`.
    #[must_use]
    pub fn min_line_length(&self, dims: Dimensions) -> f64 {
        self.min_line_length_ratio * f64::from(dims.max_side())
    }

    /// Check every invariant the stages rely on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), PipelineError> {
        fn positive(name: &str, value: f64) -> Result<(), PipelineError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(PipelineError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        }
        fn fraction(name: &str, value: f64) -> Result<(), PipelineError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(PipelineError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )))
            }
        }

        positive("marker_size_mm", self.marker_size_mm)?;
        if let Some(spacing) = self.marker_spacing_mm {
            positive("marker_spacing_mm", spacing)?;
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "blur_sigma must be non-negative, got {}",
                self.blur_sigma
            )));
        }
        if self.canny_low < edge::MIN_THRESHOLD || self.canny_low > self.canny_high {
            return Err(PipelineError::InvalidConfig(format!(
                "canny thresholds must satisfy {} <= canny_low <= canny_high, got {} and {}",
                edge::MIN_THRESHOLD,
                self.canny_low,
                self.canny_high
            )));
        }
        positive("dog_sigma_inner", f64::from(self.dog_sigma_inner))?;
        if self.dog_sigma_outer <= self.dog_sigma_inner {
            return Err(PipelineError::InvalidConfig(format!(
                "dog_sigma_outer ({}) must exceed dog_sigma_inner ({})",
                self.dog_sigma_outer, self.dog_sigma_inner
            )));
        }
        positive("adaptive_block_ratio", self.adaptive_block_ratio)?;
        positive("polygon_epsilon", self.polygon_epsilon)?;
        positive("marker_min_side_px", self.marker_min_side_px)?;
        if !(self.marker_max_side_ratio.is_finite() && self.marker_max_side_ratio >= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "marker_max_side_ratio must be at least 1, got {}",
                self.marker_max_side_ratio
            )));
        }
        fraction("marker_border_fill", self.marker_border_fill)?;
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "simplify_tolerance must be non-negative, got {}",
                self.simplify_tolerance
            )));
        }
        fraction("min_line_length_ratio", self.min_line_length_ratio)?;
        if !(self.angle_tolerance_deg > 0.0 && self.angle_tolerance_deg < 45.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "angle_tolerance_deg must be within (0, 45), got {}",
                self.angle_tolerance_deg
            )));
        }
        if !(self.edge_angle_window_deg > 0.0 && self.edge_angle_window_deg <= 90.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "edge_angle_window_deg must be within (0, 90], got {}",
                self.edge_angle_window_deg
            )));
        }
        positive("merge_distance_px", self.merge_distance_px)?;
        positive("max_line_gap_px", self.max_line_gap_px)?;
        positive("scale_agreement_tolerance", self.scale_agreement_tolerance)?;

        if self.window_detector == WindowDetectorKind::MarkerBounded
            && self.marker_strategy != MarkerStrategy::Pair
        {
            return Err(PipelineError::InvalidConfig(
                "the marker_bounded window detector requires the pair marker strategy".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            marker_strategy: MarkerStrategy::default(),
            preprocessing: Preprocessing::default(),
            window_detector: WindowDetectorKind::default(),
            line_detector: LineDetectorKind::default(),
            dimension_calculator: DimensionCalculatorKind::default(),
            marker_size_mm: Self::DEFAULT_MARKER_SIZE_MM,
            marker_spacing_mm: None,
            working_resolution: Self::DEFAULT_WORKING_RESOLUTION,
            downsample_filter: Self::DEFAULT_DOWNSAMPLE_FILTER,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            canny_low: Self::DEFAULT_CANNY_LOW,
            canny_high: Self::DEFAULT_CANNY_HIGH,
            dog_sigma_inner: Self::DEFAULT_DOG_SIGMA_INNER,
            dog_sigma_outer: Self::DEFAULT_DOG_SIGMA_OUTER,
            adaptive_block_ratio: Self::DEFAULT_ADAPTIVE_BLOCK_RATIO,
            polygon_epsilon: Self::DEFAULT_POLYGON_EPSILON,
            marker_min_side_px: Self::DEFAULT_MARKER_MIN_SIDE_PX,
            marker_max_side_ratio: Self::DEFAULT_MARKER_MAX_SIDE_RATIO,
            marker_border_fill: Self::DEFAULT_MARKER_BORDER_FILL,
            simplify_tolerance: Self::DEFAULT_SIMPLIFY_TOLERANCE,
            min_line_length_ratio: Self::DEFAULT_MIN_LINE_LENGTH_RATIO,
            angle_tolerance_deg: Self::DEFAULT_ANGLE_TOLERANCE_DEG,
            edge_angle_window_deg: Self::DEFAULT_EDGE_ANGLE_WINDOW_DEG,
            merge_distance_px: Self::DEFAULT_MERGE_DISTANCE_PX,
            hough_suppression_radius: Self::DEFAULT_HOUGH_SUPPRESSION_RADIUS,
            max_line_gap_px: Self::DEFAULT_MAX_LINE_GAP_PX,
            scale_agreement_tolerance: Self::DEFAULT_SCALE_AGREEMENT_TOLERANCE,
        }
    }
}
