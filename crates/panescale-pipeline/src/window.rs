//! Window quadrilateral detection.
//!
//! This module defines the [`WindowDetector`] trait for pluggable window
//! detection strategies and the [`WindowDetectorKind`] enum for selecting
//! one at runtime.

use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::edge;
use crate::error::{EdgeFittingReason, StageError};
use crate::line_finder::{self, LineFit};
use crate::scale::{self, Diagonal};
use crate::segments::LineDetector;
use crate::types::{Dimensions, MarkerObservation, Point, Quadrilateral};

/// Selects which window detector to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowDetectorKind {
    /// Extract line segments from an edge map and fit the window's four
    /// sides.
    #[default]
    LineFit,

    /// Use two markers placed in diagonally opposite window corners; the
    /// window is the axis-aligned rectangle their outer corners span.
    ///
    /// Requires the pair marker strategy.
    MarkerBounded,
}

impl fmt::Display for WindowDetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineFit => f.write_str("line_fit"),
            Self::MarkerBounded => f.write_str("marker_bounded"),
        }
    }
}

/// What a window detector gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct WindowInput<'a> {
    /// Blurred working-resolution grayscale image.
    pub blurred: &'a GrayImage,
    /// Markers found by the marker stage.
    pub markers: &'a [MarkerObservation],
    pub config: &'a PipelineConfig,
}

/// A detected window together with the intermediates that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFit {
    pub quad: Quadrilateral,
    /// Edge map, for detectors that build one.
    pub edges: Option<GrayImage>,
    /// Line-finder state, for the line-fit detector.
    pub line_fit: Option<LineFit>,
}

/// Trait for window detection strategies.
pub trait WindowDetector {
    /// Find the window quadrilateral.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::EdgeFittingFailed`] when no plausible window
    /// could be fitted.
    fn detect(&self, input: &WindowInput<'_>) -> Result<WindowFit, StageError>;
}

impl WindowDetector for WindowDetectorKind {
    fn detect(&self, input: &WindowInput<'_>) -> Result<WindowFit, StageError> {
        match *self {
            Self::LineFit => detect_line_fit(input),
            Self::MarkerBounded => detect_marker_bounded(input.markers),
        }
    }
}

fn detect_line_fit(input: &WindowInput<'_>) -> Result<WindowFit, StageError> {
    let dims = Dimensions {
        width: input.blurred.width(),
        height: input.blurred.height(),
    };
    let edges = edge::edge_map(input.blurred, input.config);
    let segments = input.config.line_detector.detect(&edges, input.config);
    let fit = line_finder::process_lines(&segments, dims, input.config)?;
    Ok(WindowFit {
        quad: fit.quad,
        edges: Some(edges),
        line_fit: Some(fit),
    })
}

/// Diagonal two markers occupy: the upper marker left of the lower one
/// means top-left to bottom-right.
#[must_use]
pub fn marker_diagonal(upper: &MarkerObservation, lower: &MarkerObservation) -> Diagonal {
    if upper.center().x <= lower.center().x {
        Diagonal::TopLeftBottomRight
    } else {
        Diagonal::TopRightBottomLeft
    }
}

fn detect_marker_bounded(markers: &[MarkerObservation]) -> Result<WindowFit, StageError> {
    let [first, second] = markers else {
        return Err(StageError::edge_fitting(EdgeFittingReason::MarkersUnavailable));
    };
    let (upper, lower) = if first.center().y <= second.center().y {
        (first, second)
    } else {
        (second, first)
    };
    let diagonal = marker_diagonal(upper, lower);

    let points: Vec<Point> = markers
        .iter()
        .flat_map(|m| m.corners.corners().iter().copied())
        .collect();
    let Some((a, b)) = scale::diff_two_markers_px(&points, diagonal) else {
        return Err(StageError::edge_fitting(EdgeFittingReason::MarkersUnavailable));
    };

    let (left, right) = (a.x.min(b.x), a.x.max(b.x));
    let (top, bottom) = (a.y.min(b.y), a.y.max(b.y));
    let quad = Quadrilateral::new([
        Point::new(left, top),
        Point::new(right, top),
        Point::new(right, bottom),
        Point::new(left, bottom),
    ]);
    if quad.is_degenerate() {
        return Err(StageError::edge_fitting(EdgeFittingReason::DegenerateQuadrilateral));
    }
    log::debug!("marker-bounded window: {diagonal:?} from {a:?} to {b:?}");

    Ok(WindowFit {
        quad,
        edges: None,
        line_fit: None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square_marker(index: usize, x: f64, y: f64, side: f64) -> MarkerObservation {
        MarkerObservation {
            index,
            corners: Quadrilateral::new([
                Point::new(x, y),
                Point::new(x + side, y),
                Point::new(x + side, y + side),
                Point::new(x, y + side),
            ]),
            side_mm: 100.0,
        }
    }

    fn input<'a>(
        blurred: &'a GrayImage,
        markers: &'a [MarkerObservation],
        config: &'a PipelineConfig,
    ) -> WindowInput<'a> {
        WindowInput {
            blurred,
            markers,
            config,
        }
    }

    #[test]
    fn default_is_line_fit() {
        assert_eq!(WindowDetectorKind::default(), WindowDetectorKind::LineFit);
        assert_eq!(WindowDetectorKind::MarkerBounded.to_string(), "marker_bounded");
    }

    #[test]
    fn marker_bounded_top_left_bottom_right() {
        let markers = [
            square_marker(0, 20.0, 30.0, 40.0),
            square_marker(1, 300.0, 200.0, 40.0),
        ];
        let image = GrayImage::new(400, 300);
        let config = PipelineConfig::default();
        let fit = WindowDetectorKind::MarkerBounded
            .detect(&input(&image, &markers, &config))
            .unwrap();
        assert_eq!(fit.quad.top_left(), Point::new(20.0, 30.0));
        assert_eq!(fit.quad.bottom_right(), Point::new(340.0, 240.0));
        assert!(fit.line_fit.is_none());
    }

    #[test]
    fn marker_bounded_top_right_bottom_left() {
        let markers = [
            square_marker(0, 300.0, 30.0, 40.0),
            square_marker(1, 20.0, 200.0, 40.0),
        ];
        assert_eq!(
            marker_diagonal(&markers[0], &markers[1]),
            Diagonal::TopRightBottomLeft
        );
        let image = GrayImage::new(400, 300);
        let config = PipelineConfig::default();
        let fit = WindowDetectorKind::MarkerBounded
            .detect(&input(&image, &markers, &config))
            .unwrap();
        let [top, right, _, _] = fit.quad.side_lengths();
        assert_abs_diff_eq!(top, 320.0);
        assert_abs_diff_eq!(right, 210.0);
    }

    #[test]
    fn marker_bounded_needs_two_markers() {
        let markers = [square_marker(0, 20.0, 30.0, 40.0)];
        let image = GrayImage::new(400, 300);
        let config = PipelineConfig::default();
        let err = WindowDetectorKind::MarkerBounded
            .detect(&input(&image, &markers, &config))
            .unwrap_err();
        assert!(matches!(
            err,
            StageError::EdgeFittingFailed(ref d) if d.reason == EdgeFittingReason::MarkersUnavailable
        ));
    }

    #[test]
    fn line_fit_on_blank_image_fails() {
        let image = GrayImage::from_pixel(200, 150, image::Luma([200]));
        let config = PipelineConfig::default();
        let err = WindowDetectorKind::LineFit
            .detect(&input(&image, &[], &config))
            .unwrap_err();
        assert!(matches!(
            err,
            StageError::EdgeFittingFailed(ref d) if d.reason == EdgeFittingReason::TooFewLines
        ));
    }

    #[test]
    fn line_fit_finds_dark_rectangle() {
        let image = GrayImage::from_fn(300, 200, |x, y| {
            let inside = (50..250).contains(&x) && (40..160).contains(&y);
            image::Luma([if inside { 40 } else { 220 }])
        });
        let config = PipelineConfig::default();
        let fit = WindowDetectorKind::LineFit
            .detect(&input(&image, &[], &config))
            .unwrap();
        let [top, right, bottom, left] = fit.quad.side_lengths();
        assert!((top - 200.0).abs() <= 3.0, "top {top}");
        assert!((bottom - 200.0).abs() <= 3.0, "bottom {bottom}");
        assert!((left - 120.0).abs() <= 3.0, "left {left}");
        assert!((right - 120.0).abs() <= 3.0, "right {right}");
        assert!(fit.edges.is_some());
    }
}
