//! Error types for pipeline stages and whole-pipeline runs.
//!
//! [`StageError`] is what an individual stage reports; [`PipelineError`]
//! wraps it with the failing stage's identity, alongside the input and
//! configuration failures that happen before any stage runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::marker::MarkerStrategy;
use crate::pipeline::StageKind;
use crate::types::{MarkerObservation, Preprocessing};

/// Context for a marker search that did not find the expected markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetectionErrorDetails {
    /// Number of markers the strategy requires.
    pub expected: usize,
    /// Number of markers that passed every check.
    pub found: usize,
    /// Number of quadrilateral candidates inspected.
    pub candidates: usize,
    pub strategy: MarkerStrategy,
    pub preprocessing: Preprocessing,
    /// Any markers that were recovered.
    pub partial: Vec<MarkerObservation>,
}

impl fmt::Display for MarkerDetectionErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} marker(s), found {} among {} candidate(s) ({} strategy, {} preprocessing)",
            self.expected, self.found, self.candidates, self.strategy, self.preprocessing,
        )
    }
}

/// Why the window's edges could not be fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeFittingReason {
    /// Fewer than four usable line segments.
    TooFewLines,
    /// No candidate line for one of the four sides.
    MissingEdge,
    /// The four edges did not give one corner per quadrant.
    TooFewIntersections,
    /// The fitted corners are collinear or not convex.
    DegenerateQuadrilateral,
    /// A side is outside the angle tolerance of both rectangle axes.
    NotRectangular,
    /// The marker-bounded detector did not receive exactly two markers.
    MarkersUnavailable,
    /// Dimensions were requested before a window was fitted.
    WindowUnavailable,
}

impl fmt::Display for EdgeFittingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::TooFewLines => "too few lines",
            Self::MissingEdge => "missing edge",
            Self::TooFewIntersections => "too few intersections",
            Self::DegenerateQuadrilateral => "degenerate quadrilateral",
            Self::NotRectangular => "not rectangular",
            Self::MarkersUnavailable => "markers unavailable",
            Self::WindowUnavailable => "window unavailable",
        };
        f.write_str(text)
    }
}

/// Context for a failed window fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeFittingErrorDetails {
    pub reason: EdgeFittingReason,
    /// Raw segments handed to the line finder.
    pub candidate_lines: usize,
    /// Window edges that were selected before the failure.
    pub selected_edges: usize,
    /// Intersections found between the selected edges.
    pub intersections: usize,
}

impl EdgeFittingErrorDetails {
    /// Details with every count zeroed.
    #[must_use]
    pub const fn new(reason: EdgeFittingReason) -> Self {
        Self {
            reason,
            candidate_lines: 0,
            selected_edges: 0,
            intersections: 0,
        }
    }
}

impl fmt::Display for EdgeFittingErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} candidate line(s), {} edge(s), {} intersection(s))",
            self.reason, self.candidate_lines, self.selected_edges, self.intersections,
        )
    }
}

/// A derived quantity that can go non-finite or non-positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryQuantity {
    /// A marker's mean side length in pixels.
    MarkerSide,
    /// Millimetres per pixel.
    Scale,
    /// Relative disagreement between two scale estimates.
    ScaleDisagreement,
    /// Physical width of the window.
    Width,
    /// Physical height of the window.
    Height,
}

impl fmt::Display for GeometryQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MarkerSide => "marker side",
            Self::Scale => "scale",
            Self::ScaleDisagreement => "scale disagreement",
            Self::Width => "width",
            Self::Height => "height",
        };
        f.write_str(text)
    }
}

/// Which quantity went bad and the value it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegenerateGeometryDetails {
    pub quantity: GeometryQuantity,
    pub value: f64,
}

impl fmt::Display for DegenerateGeometryDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.quantity, self.value)
    }
}

/// Failure reported by a single pipeline stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details", rename_all = "snake_case")]
pub enum StageError {
    /// The expected number of markers was not found.
    #[error("marker not found: {0}")]
    MarkerNotFound(MarkerDetectionErrorDetails),

    /// The window's four edges could not be fitted.
    #[error("edge fitting failed: {0}")]
    EdgeFittingFailed(EdgeFittingErrorDetails),

    /// A derived quantity was non-finite or non-positive.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(DegenerateGeometryDetails),
}

impl StageError {
    /// Shorthand for an edge-fitting failure with no counts.
    #[must_use]
    pub const fn edge_fitting(reason: EdgeFittingReason) -> Self {
        Self::EdgeFittingFailed(EdgeFittingErrorDetails::new(reason))
    }

    /// Shorthand for a degenerate-geometry failure.
    #[must_use]
    pub const fn degenerate(quantity: GeometryQuantity, value: f64) -> Self {
        Self::DegenerateGeometry(DegenerateGeometryDetails { quantity, value })
    }

    /// Stable snake-case identifier of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MarkerNotFound(_) => "marker_not_found",
            Self::EdgeFittingFailed(_) => "edge_fitting_failed",
            Self::DegenerateGeometry(_) => "degenerate_geometry",
        }
    }
}

/// Errors that can occur during a pipeline run.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A stage failed; later stages did not run.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageKind,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    /// The stage that failed, if the error came from a stage.
    #[must_use]
    pub const fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying stage error, if any.
    #[must_use]
    pub const fn stage_error(&self) -> Option<&StageError> {
        match self {
            Self::Stage { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidConfig(String),
    Stage { stage: StageKind, source: StageError },
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
            Self::Stage { stage, source } => PipelineErrorProxy::Stage {
                stage: *stage,
                source: source.clone(),
            },
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image::ImageError cannot be rebuilt from its message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::Stage { stage, source } => Self::Stage { stage, source },
        })
    }
}
