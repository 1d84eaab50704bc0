//! Pixel-to-millimetre scale from marker geometry.

use serde::{Deserialize, Serialize};

use crate::error::{GeometryQuantity, StageError};
use crate::types::{MarkerObservation, Point};

/// Mean side length in pixels of the closed polygon through `corners`.
///
/// Returns `0.0` for fewer than two corners.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn marker_scale_px(corners: &[Point]) -> f64 {
    let n = corners.len();
    if n < 2 {
        return 0.0;
    }
    let total: f64 = (0..n)
        .map(|i| corners[i].distance(corners[(i + 1) % n]))
        .sum();
    total / n as f64
}

/// Which pair of opposite window corners two markers occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagonal {
    /// One marker at the top left, the other at the bottom right.
    TopLeftBottomRight,
    /// One marker at the top right, the other at the bottom left.
    TopRightBottomLeft,
}

/// Extreme corners spanned by two markers along `diagonal`.
///
/// Of the pooled corner points, the two with the smallest y form the top
/// pair and the two with the largest y the bottom pair. For
/// [`Diagonal::TopLeftBottomRight`] the result is the left-most top point
/// and the right-most bottom point; for
/// [`Diagonal::TopRightBottomLeft`] the right-most top point and the
/// left-most bottom point.
///
/// Returns `None` for fewer than four points.
#[must_use]
pub fn diff_two_markers_px(points: &[Point], diagonal: Diagonal) -> Option<(Point, Point)> {
    if points.len() < 4 {
        return None;
    }
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y));
    let top = &sorted[..2];
    let bottom = &sorted[sorted.len() - 2..];

    let leftmost = |pair: &[Point]| {
        pair.iter()
            .copied()
            .min_by(|a, b| a.x.total_cmp(&b.x))
    };
    let rightmost = |pair: &[Point]| {
        pair.iter()
            .copied()
            .max_by(|a, b| a.x.total_cmp(&b.x))
    };

    match diagonal {
        Diagonal::TopLeftBottomRight => Some((leftmost(top)?, rightmost(bottom)?)),
        Diagonal::TopRightBottomLeft => Some((rightmost(top)?, leftmost(bottom)?)),
    }
}

/// A calibrated scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Millimetres per working-image pixel.
    pub mm_per_px: f64,
    /// Mean side length of each marker, in pixels.
    pub marker_side_px: Vec<f64>,
    /// Center-to-center distance between two markers, in pixels, when a
    /// physical spacing was supplied.
    pub spacing_px: Option<f64>,
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Relative spread of two or more estimates around their mean.
fn disagreement(values: &[f64]) -> f64 {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (hi - lo) / mean(values)
}

/// Derive millimetres per pixel from detected markers.
///
/// The scale is `marker_size_mm` over the mean marker side in pixels. With
/// several markers their sides must agree within `tolerance` (relative).
/// When exactly two markers are present and `spacing_mm` is given, the
/// center-distance scale must agree with the side scale as well, and the
/// two are averaged.
///
/// # Errors
///
/// Returns [`StageError::DegenerateGeometry`] when there are no markers, a
/// side or the scale is non-finite or non-positive, or estimates disagree.
pub fn calibrate(
    markers: &[MarkerObservation],
    marker_size_mm: f64,
    spacing_mm: Option<f64>,
    tolerance: f64,
) -> Result<Scale, StageError> {
    if markers.is_empty() {
        return Err(StageError::degenerate(GeometryQuantity::MarkerSide, 0.0));
    }

    let sides: Vec<f64> = markers.iter().map(MarkerObservation::side_px).collect();
    if let Some(&bad) = sides.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        return Err(StageError::degenerate(GeometryQuantity::MarkerSide, bad));
    }
    if sides.len() > 1 {
        let spread = disagreement(&sides);
        if spread > tolerance {
            return Err(StageError::degenerate(GeometryQuantity::ScaleDisagreement, spread));
        }
    }

    let side_scale = marker_size_mm / mean(&sides);
    let (mm_per_px, spacing_px) = match (markers, spacing_mm) {
        ([a, b], Some(spacing)) => {
            let distance = a.center().distance(b.center());
            let spacing_scale = spacing / distance;
            if !(spacing_scale.is_finite() && spacing_scale > 0.0) {
                return Err(StageError::degenerate(GeometryQuantity::Scale, spacing_scale));
            }
            let spread = disagreement(&[side_scale, spacing_scale]);
            if spread > tolerance {
                return Err(StageError::degenerate(GeometryQuantity::ScaleDisagreement, spread));
            }
            (f64::midpoint(side_scale, spacing_scale), Some(distance))
        }
        _ => (side_scale, None),
    };

    if !(mm_per_px.is_finite() && mm_per_px > 0.0) {
        return Err(StageError::degenerate(GeometryQuantity::Scale, mm_per_px));
    }
    log::debug!("scale: {mm_per_px:.5} mm/px from {} marker(s)", markers.len());

    Ok(Scale {
        mm_per_px,
        marker_side_px: sides,
        spacing_px,
    })
}
