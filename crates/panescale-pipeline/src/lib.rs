//! panescale-pipeline: window measurement from a single photograph (sans-IO).
//!
//! Measures a rectangular window from a photo that also contains one or
//! two square fiducial markers of known physical size:
//! decode -> downsample -> grayscale -> blur -> marker detection ->
//! scale calibration -> window detection -> dimension conversion.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. Reading files, timing, and
//! transport live with the caller.

pub mod blur;
pub mod config;
pub mod contour;
pub mod diagnostics;
pub mod dimension;
pub mod downsample;
pub mod edge;
pub mod error;
pub mod geometry;
pub mod grayscale;
pub mod line_finder;
pub mod marker;
pub mod pipeline;
pub mod response;
pub mod scale;
pub mod segments;
pub mod simplify;
pub mod threshold;
pub mod types;
pub mod window;

pub use config::PipelineConfig;
pub use diagnostics::{Clock, PipelineDiagnostics, measure_with_diagnostics};
pub use dimension::{DimensionCalculator, DimensionCalculatorKind};
pub use downsample::DownsampleFilter;
pub use error::{
    DegenerateGeometryDetails, EdgeFittingErrorDetails, EdgeFittingReason, GeometryQuantity,
    MarkerDetectionErrorDetails, PipelineError, StageError,
};
pub use marker::{MarkerDetector, MarkerStrategy, SquareMarkerDetector};
pub use pipeline::{Pipeline, PipelineContext, STAGE_COUNT, StageKind};
pub use response::{FailureKind, MeasureFailure, MeasureRequest, MeasureResponse};
pub use scale::{Diagonal, Scale};
pub use segments::{LineDetector, LineDetectorKind};
pub use types::{
    Dimensions, LineSegment, MarkerObservation, Measurement, Point, Polyline, Preprocessing,
    Quadrilateral, Side,
};
pub use window::{WindowDetector, WindowDetectorKind};

/// Measure the window in an encoded image.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP) and a configuration and
/// runs every stage of [`Pipeline`].
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
/// Returns [`PipelineError::Stage`] naming the first stage that failed.
pub fn measure(image_bytes: &[u8], config: &PipelineConfig) -> Result<Measurement, PipelineError> {
    let context = Pipeline::new(image_bytes, config.clone())?.run()?;
    context.measurement().ok_or(PipelineError::Stage {
        stage: StageKind::DimensionCompute,
        source: StageError::degenerate(GeometryQuantity::Width, 0.0),
    })
}
