//! Conversion of a fitted quadrilateral into physical dimensions.
//!
//! This module defines the [`DimensionCalculator`] trait for pluggable
//! conversion strategies and the [`DimensionCalculatorKind`] enum for
//! selecting one at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GeometryQuantity, StageError};
use crate::types::{MM_PER_INCH, Measurement, Quadrilateral, Side};

/// Selects which dimension calculator to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionCalculatorKind {
    /// Width is the mean of the top and bottom sides, height the mean of
    /// the left and right sides.
    ///
    /// Averaging opposite sides cancels most of the foreshortening a
    /// slightly oblique shot introduces.
    #[default]
    PerspectiveAveraging,

    /// Width is the top side and height the left side.
    AdjacentSides,
}

impl fmt::Display for DimensionCalculatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerspectiveAveraging => f.write_str("perspective_averaging"),
            Self::AdjacentSides => f.write_str("adjacent_sides"),
        }
    }
}

/// Trait for turning pixel geometry into a [`Measurement`].
pub trait DimensionCalculator {
    /// Measure `quad` at `mm_per_px` millimetres per pixel.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::DegenerateGeometry`] when either dimension is
    /// non-finite or non-positive.
    fn calculate(&self, mm_per_px: f64, quad: &Quadrilateral) -> Result<Measurement, StageError>;
}

impl DimensionCalculator for DimensionCalculatorKind {
    fn calculate(&self, mm_per_px: f64, quad: &Quadrilateral) -> Result<Measurement, StageError> {
        let len = |side| quad.side(side).length();
        let (width_px, height_px) = match *self {
            Self::PerspectiveAveraging => (
                f64::midpoint(len(Side::Top), len(Side::Bottom)),
                f64::midpoint(len(Side::Left), len(Side::Right)),
            ),
            Self::AdjacentSides => (len(Side::Top), len(Side::Left)),
        };

        let width_in = width_px * mm_per_px / MM_PER_INCH;
        let height_in = height_px * mm_per_px / MM_PER_INCH;
        if !(width_in.is_finite() && width_in > 0.0) {
            return Err(StageError::degenerate(GeometryQuantity::Width, width_in));
        }
        if !(height_in.is_finite() && height_in > 0.0) {
            return Err(StageError::degenerate(GeometryQuantity::Height, height_in));
        }
        Ok(Measurement {
            width_in,
            height_in,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Point;
    use approx::assert_abs_diff_eq;

    fn trapezoid() -> Quadrilateral {
        // Top 100, bottom 120, left and right about 50.
        Quadrilateral::new([
            Point::new(10.0, 0.0),
            Point::new(110.0, 0.0),
            Point::new(120.0, 50.0),
            Point::new(0.0, 50.0),
        ])
    }

    #[test]
    fn default_is_perspective_averaging() {
        assert_eq!(
            DimensionCalculatorKind::default(),
            DimensionCalculatorKind::PerspectiveAveraging
        );
    }

    #[test]
    fn rectangle_converts_to_inches() {
        let quad = Quadrilateral::new([
            Point::new(0.0, 0.0),
            Point::new(254.0, 0.0),
            Point::new(254.0, 127.0),
            Point::new(0.0, 127.0),
        ]);
        let m = DimensionCalculatorKind::PerspectiveAveraging
            .calculate(1.0, &quad)
            .unwrap();
        assert_abs_diff_eq!(m.width_in, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.height_in, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn averaging_uses_opposite_sides() {
        let m = DimensionCalculatorKind::PerspectiveAveraging
            .calculate(MM_PER_INCH, &trapezoid())
            .unwrap();
        assert_abs_diff_eq!(m.width_in, 110.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.height_in, 2600.0_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn adjacent_sides_use_top_and_left() {
        let m = DimensionCalculatorKind::AdjacentSides
            .calculate(MM_PER_INCH, &trapezoid())
            .unwrap();
        assert_abs_diff_eq!(m.width_in, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn non_positive_scale_is_degenerate() {
        let err = DimensionCalculatorKind::PerspectiveAveraging
            .calculate(0.0, &trapezoid())
            .unwrap_err();
        assert!(matches!(
            err,
            StageError::DegenerateGeometry(ref d) if d.quantity == GeometryQuantity::Width
        ));
    }

    #[test]
    fn nan_scale_is_degenerate() {
        let result = DimensionCalculatorKind::AdjacentSides.calculate(f64::NAN, &trapezoid());
        assert!(matches!(result, Err(StageError::DegenerateGeometry(_))));
    }

    #[test]
    fn calculation_is_deterministic() {
        let calc = DimensionCalculatorKind::PerspectiveAveraging;
        assert_eq!(
            calc.calculate(1.3, &trapezoid()).unwrap(),
            calc.calculate(1.3, &trapezoid()).unwrap()
        );
    }
}
