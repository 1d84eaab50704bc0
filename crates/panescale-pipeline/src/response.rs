//! Request and response bodies for a transport layer.
//!
//! A transport decodes a [`MeasureRequest`], calls
//! [`MeasureRequest::measure`], and serializes the resulting
//! [`MeasureResponse`]. Successful responses carry only the rounded
//! dimensions; failures carry a machine-readable kind, the failing stage,
//! and a hint suitable for showing to the person holding the camera.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{GeometryQuantity, PipelineError, StageError};
use crate::marker::MarkerStrategy;
use crate::pipeline::StageKind;
use crate::types::Measurement;

/// A measurement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureRequest {
    /// Encoded image bytes.
    pub image: Vec<u8>,
    /// Physical marker side length in millimetres.
    pub marker_size_mm: f64,
    /// One or two markers.
    #[serde(default)]
    pub strategy: MarkerStrategy,
}

impl MeasureRequest {
    /// `base` with this request's marker settings applied.
    #[must_use]
    pub fn config(&self, base: &PipelineConfig) -> PipelineConfig {
        PipelineConfig {
            marker_size_mm: self.marker_size_mm,
            marker_strategy: self.strategy,
            ..base.clone()
        }
    }

    /// Measure the request's image against `base`.
    #[must_use]
    pub fn measure(&self, base: &PipelineConfig) -> MeasureResponse {
        MeasureResponse::from_result(crate::measure(&self.image, &self.config(base)))
    }
}

/// Failure category of a [`MeasureFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MarkerNotFound,
    EdgeFittingFailed,
    DegenerateGeometry,
    /// Empty or undecodable image, or a bad configuration.
    InvalidInput,
}

impl FailureKind {
    /// Category of a stage error.
    #[must_use]
    pub const fn of_stage_error(error: &StageError) -> Self {
        match error {
            StageError::MarkerNotFound(_) => Self::MarkerNotFound,
            StageError::EdgeFittingFailed(_) => Self::EdgeFittingFailed,
            StageError::DegenerateGeometry(_) => Self::DegenerateGeometry,
        }
    }

    /// What the user should do differently.
    #[must_use]
    pub const fn hint(self) -> &'static str {
        match self {
            Self::MarkerNotFound => {
                "Unable to detect markers. Move the marker fully into the frame and retake the photo."
            }
            Self::EdgeFittingFailed => {
                "Unable to find the window edges. Improve lighting or shoot the window more squarely."
            }
            Self::DegenerateGeometry => {
                "The measured shape is inconsistent. Retake the photo from a different angle."
            }
            Self::InvalidInput => "The photo could not be read. Check the image and marker size.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkerNotFound => f.write_str("marker_not_found"),
            Self::EdgeFittingFailed => f.write_str("edge_fitting_failed"),
            Self::DegenerateGeometry => f.write_str("degenerate_geometry"),
            Self::InvalidInput => f.write_str("invalid_input"),
        }
    }
}

/// Failure body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureFailure {
    /// Full error message.
    pub error: String,
    pub kind: FailureKind,
    /// Stage that failed, absent for input errors.
    pub stage: Option<StageKind>,
    pub hint: String,
    /// Structured stage error, absent for input errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StageError>,
}

impl From<&PipelineError> for MeasureFailure {
    fn from(err: &PipelineError) -> Self {
        let kind = err
            .stage_error()
            .map_or(FailureKind::InvalidInput, FailureKind::of_stage_error);
        Self {
            error: err.to_string(),
            kind,
            stage: err.stage(),
            hint: kind.hint().to_string(),
            details: err.stage_error().cloned(),
        }
    }
}

/// Response body: either the rounded measurement or a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasureResponse {
    Success(Measurement),
    Failure(MeasureFailure),
}

impl MeasureResponse {
    /// Response for a pipeline outcome. Successful dimensions are rounded
    /// to two decimal places; a dimension that rounds to zero is reported
    /// as degenerate geometry of the dimension stage.
    #[must_use]
    pub fn from_result(result: Result<Measurement, PipelineError>) -> Self {
        match result {
            Ok(measurement) => {
                let rounded = measurement.rounded();
                match non_positive(rounded) {
                    None => Self::Success(rounded),
                    Some(source) => Self::from_result(Err(PipelineError::Stage {
                        stage: StageKind::DimensionCompute,
                        source,
                    })),
                }
            }
            Err(err) => {
                log::warn!("measurement failed: {err}");
                Self::Failure(MeasureFailure::from(&err))
            }
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn non_positive(measurement: Measurement) -> Option<StageError> {
    [
        (GeometryQuantity::Width, measurement.width_in),
        (GeometryQuantity::Height, measurement.height_in),
    ]
    .into_iter()
    .find(|&(_, value)| value.is_nan() || value <= 0.0)
    .map(|(quantity, value)| StageError::degenerate(quantity, value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{EdgeFittingReason, MarkerDetectionErrorDetails};
    use crate::types::Preprocessing;

    fn marker_failure() -> PipelineError {
        PipelineError::Stage {
            stage: StageKind::MarkerDetect,
            source: StageError::MarkerNotFound(MarkerDetectionErrorDetails {
                expected: 1,
                found: 0,
                candidates: 3,
                strategy: MarkerStrategy::Single,
                preprocessing: Preprocessing::Plain,
                partial: Vec::new(),
            }),
        }
    }

    #[test]
    fn success_serializes_flat_and_rounded() {
        let response = MeasureResponse::from_result(Ok(Measurement {
            width_in: 35.432_1,
            height_in: 23.619,
        }));
        assert!(response.is_success());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, serde_json::json!({"width_in": 35.43, "height_in": 23.62}));
    }

    #[test]
    fn dimension_rounding_to_zero_is_degenerate() {
        let response = MeasureResponse::from_result(Ok(Measurement {
            width_in: 12.0,
            height_in: 0.004,
        }));
        let MeasureResponse::Failure(failure) = response else {
            unreachable!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::DegenerateGeometry);
        assert_eq!(failure.stage, Some(StageKind::DimensionCompute));
        assert!(matches!(
            failure.details,
            Some(StageError::DegenerateGeometry(ref d)) if d.quantity == GeometryQuantity::Height
        ));
    }

    #[test]
    fn smallest_reportable_dimension_succeeds() {
        let response = MeasureResponse::from_result(Ok(Measurement {
            width_in: 0.005,
            height_in: 3.0,
        }));
        assert_eq!(
            response,
            MeasureResponse::Success(Measurement {
                width_in: 0.01,
                height_in: 3.0
            })
        );
    }

    #[test]
    fn marker_failure_has_kind_stage_and_hint() {
        let response = MeasureResponse::from_result(Err(marker_failure()));
        assert!(!response.is_success());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["kind"], "marker_not_found");
        assert_eq!(value["stage"], "marker_detect");
        assert!(value["hint"].as_str().unwrap().contains("Move the marker"));
        assert_eq!(value["details"]["kind"], "marker_not_found");
        assert_eq!(value["details"]["details"]["candidates"], 3);
    }

    #[test]
    fn edge_failure_hint_mentions_lighting() {
        let err = PipelineError::Stage {
            stage: StageKind::WindowDetect,
            source: StageError::edge_fitting(EdgeFittingReason::MissingEdge),
        };
        let MeasureResponse::Failure(failure) = MeasureResponse::from_result(Err(err)) else {
            unreachable!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::EdgeFittingFailed);
        assert!(failure.hint.contains("lighting"));
    }

    #[test]
    fn input_errors_are_invalid_input_without_stage() {
        let value =
            serde_json::to_value(MeasureResponse::from_result(Err(PipelineError::EmptyInput)))
                .unwrap();
        assert_eq!(value["kind"], "invalid_input");
        assert!(value["stage"].is_null());
        assert!(value.get("details").is_none());
    }

    #[test]
    fn failure_round_trips_through_json() {
        let response = MeasureResponse::from_result(Err(marker_failure()));
        let json = serde_json::to_string(&response).unwrap();
        let back: MeasureResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn success_round_trips_through_json() {
        let back: MeasureResponse =
            serde_json::from_str(r#"{"width_in": 10.5, "height_in": 20.25}"#).unwrap();
        assert!(back.is_success());
    }

    #[test]
    fn request_overrides_marker_settings() {
        let request: MeasureRequest =
            serde_json::from_str(r#"{"image": [1, 2, 3], "marker_size_mm": 50.0, "strategy": "pair"}"#)
                .unwrap();
        let config = request.config(&PipelineConfig::default());
        assert!((config.marker_size_mm - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.marker_strategy, MarkerStrategy::Pair);
    }

    #[test]
    fn request_strategy_defaults_to_single() {
        let request: MeasureRequest =
            serde_json::from_str(r#"{"image": [], "marker_size_mm": 100.0}"#).unwrap();
        assert_eq!(request.strategy, MarkerStrategy::Single);
        let response = request.measure(&PipelineConfig::default());
        assert!(matches!(
            response,
            MeasureResponse::Failure(ref f) if f.kind == FailureKind::InvalidInput
        ));
    }
}
