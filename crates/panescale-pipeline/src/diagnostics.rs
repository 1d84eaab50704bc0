//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! algorithm tuning and parameter experimentation.
//! [`measure_with_diagnostics`] collects them alongside the measurement.
//!
//! Duration measurements use [`std::time::Duration`] (platform-agnostic).
//! Timestamps come from a caller-supplied [`Clock`], so the library never
//! reads the system time itself.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::dimension::DimensionCalculatorKind;
use crate::error::{GeometryQuantity, PipelineError, StageError};
use crate::marker::MarkerStrategy;
use crate::pipeline::{Pipeline, PipelineContext, StageKind};
use crate::types::{Measurement, Point, Preprocessing};
use crate::window::WindowDetectorKind;

/// Source of timestamps for stage timing.
pub trait Clock {
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Decode, downsample, grayscale, and blur.
    pub decode: StageDiagnostics,
    pub marker_detect: StageDiagnostics,
    pub scale_calibrate: StageDiagnostics,
    pub window_detect: StageDiagnostics,
    pub dimension_compute: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the run.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Raster preparation metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        source_width: u32,
        /// Decoded image height in pixels.
        source_height: u32,
        /// Working image width in pixels.
        width: u32,
        /// Working image height in pixels.
        height: u32,
        /// Whether the working image was downsampled.
        downsampled: bool,
    },
    /// Marker search metrics.
    MarkerDetect {
        strategy: MarkerStrategy,
        preprocessing: Preprocessing,
        /// Quadrilaterals that passed the shape checks.
        candidates: usize,
        /// Markers accepted.
        markers: usize,
    },
    /// Scale calibration metrics.
    ScaleCalibrate {
        mm_per_px: f64,
        /// Mean side of each marker in pixels.
        marker_side_px: Vec<f64>,
        /// Marker center distance, when a physical spacing was given.
        spacing_px: Option<f64>,
    },
    /// Window detection metrics.
    WindowDetect {
        detector: WindowDetectorKind,
        /// Edge pixels in the edge map, for detectors that build one.
        edge_pixel_count: Option<u64>,
        /// Raw segments handed to the line finder.
        candidate_lines: Option<usize>,
        /// Lines left after merging.
        merged_lines: Option<usize>,
        /// Fitted corners, top-left first.
        corners: [Point; 4],
    },
    /// Dimension conversion metrics.
    DimensionCompute {
        calculator: DimensionCalculatorKind,
        width_in: f64,
        height_in: f64,
    },
}

/// High-level summary of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Working image width in pixels.
    pub image_width: u32,
    /// Working image height in pixels.
    pub image_height: u32,
    /// Number of markers used.
    pub marker_count: usize,
    /// The measurement produced.
    pub measurement: Measurement,
}

impl PipelineDiagnostics {
    /// Per-stage diagnostics in execution order, with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 5] {
        [
            ("Decode", &self.decode),
            ("Marker Detect", &self.marker_detect),
            ("Scale Calibrate", &self.scale_calibrate),
            ("Window Detect", &self.window_detect),
            ("Dimension Compute", &self.dimension_compute),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{}",
            self.summary.image_width, self.summary.image_height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Markers: {}  |  Width: {:.2} in  |  Height: {:.2} in",
            self.summary.marker_count,
            self.summary.measurement.width_in,
            self.summary.measurement.height_in,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            source_width,
            source_height,
            width,
            height,
            downsampled,
        } => {
            if *downsampled {
                format!("{input_bytes} bytes -> {source_width}x{source_height} -> {width}x{height}")
            } else {
                format!("{input_bytes} bytes -> {width}x{height}")
            }
        }
        StageMetrics::MarkerDetect {
            strategy,
            preprocessing,
            candidates,
            markers,
        } => format!("{strategy}/{preprocessing}: {markers} of {candidates} candidates"),
        StageMetrics::ScaleCalibrate {
            mm_per_px,
            marker_side_px,
            spacing_px,
        } => {
            let sides: Vec<String> = marker_side_px.iter().map(|s| format!("{s:.1}")).collect();
            let spacing = spacing_px.map_or_else(String::new, |d| format!(" spacing={d:.1}px"));
            format!("{mm_per_px:.4} mm/px sides=[{}]{spacing}", sides.join(", "))
        }
        StageMetrics::WindowDetect {
            detector,
            edge_pixel_count,
            candidate_lines,
            merged_lines,
            ..
        } => match (edge_pixel_count, candidate_lines, merged_lines) {
            (Some(edges), Some(lines), Some(merged)) => {
                format!("{detector}: edges={edges} lines={lines} merged={merged}")
            }
            _ => detector.to_string(),
        },
        StageMetrics::DimensionCompute {
            calculator,
            width_in,
            height_in,
        } => format!("{calculator}: {width_in:.2} x {height_in:.2} in"),
    }
}

/// Metrics for `stage` read from a context the stage has completed on.
fn stage_metrics(stage: StageKind, ctx: &PipelineContext) -> Option<StageMetrics> {
    let config = ctx.config();
    Some(match stage {
        StageKind::MarkerDetect => StageMetrics::MarkerDetect {
            strategy: config.marker_strategy,
            preprocessing: config.preprocessing,
            candidates: ctx.marker_candidates(),
            markers: ctx.markers().len(),
        },
        StageKind::ScaleCalibrate => {
            let scale = ctx.scale()?;
            StageMetrics::ScaleCalibrate {
                mm_per_px: scale.mm_per_px,
                marker_side_px: scale.marker_side_px.clone(),
                spacing_px: scale.spacing_px,
            }
        }
        StageKind::WindowDetect => {
            let window = ctx.window()?;
            StageMetrics::WindowDetect {
                detector: config.window_detector,
                edge_pixel_count: window.edges.as_ref().map(crate::edge::edge_pixel_count),
                candidate_lines: window.line_fit.as_ref().map(|f| f.candidate_count),
                merged_lines: window.line_fit.as_ref().map(|f| f.merged.len()),
                corners: *window.quad.corners(),
            }
        }
        StageKind::DimensionCompute => {
            let m = ctx.measurement()?;
            StageMetrics::DimensionCompute {
                calculator: config.dimension_calculator,
                width_in: m.width_in,
                height_in: m.height_in,
            }
        }
    })
}

/// Run the full pipeline, timing every stage with `clock`.
///
/// # Errors
///
/// Returns the same errors as [`crate::measure`].
pub fn measure_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &PipelineConfig,
    clock: &C,
) -> Result<(Measurement, PipelineDiagnostics), PipelineError> {
    let total_start = clock.now();

    let start = clock.now();
    let mut pipeline = Pipeline::new(image_bytes, config.clone())?;
    let ctx = pipeline.context();
    let decode = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Decode {
            input_bytes: ctx.input_bytes(),
            source_width: ctx.source_dimensions().width,
            source_height: ctx.source_dimensions().height,
            width: ctx.dimensions().width,
            height: ctx.dimensions().height,
            downsampled: ctx.downsampled(),
        },
    };

    let mut stages: Vec<StageDiagnostics> = Vec::with_capacity(StageKind::ORDER.len());
    loop {
        let start = clock.now();
        let Some(stage) = pipeline.step()? else {
            break;
        };
        let duration = clock.elapsed(&start);
        if let Some(metrics) = stage_metrics(stage, pipeline.context()) {
            stages.push(StageDiagnostics { duration, metrics });
        }
    }

    let ctx = pipeline.into_context();
    let total_duration = clock.elapsed(&total_start);
    let (Some(measurement), Ok([marker_detect, scale_calibrate, window_detect, dimension_compute])) =
        (ctx.measurement(), <[StageDiagnostics; 4]>::try_from(stages))
    else {
        return Err(PipelineError::Stage {
            stage: StageKind::DimensionCompute,
            source: StageError::degenerate(GeometryQuantity::Width, 0.0),
        });
    };

    let summary = PipelineSummary {
        image_width: ctx.dimensions().width,
        image_height: ctx.dimensions().height,
        marker_count: ctx.markers().len(),
        measurement,
    };

    Ok((
        measurement,
        PipelineDiagnostics {
            decode,
            marker_detect,
            scale_calibrate,
            window_detect,
            dimension_compute,
            total_duration,
            summary,
        },
    ))
}
