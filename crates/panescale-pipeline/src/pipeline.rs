//! Staged measurement pipeline: advance stage by stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust,no_run
//! # use panescale_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # fn run(jpeg: &[u8]) -> Result<(), PipelineError> {
//! let mut pipeline = Pipeline::new(jpeg, PipelineConfig::default())?;
//! while let Some(stage) = pipeline.step()? {
//!     println!("{stage} done");
//! }
//! let measurement = pipeline.context().measurement();
//! # Ok(())
//! # }
//! ```
//!
//! [`Pipeline::new`] does all raster preparation (decode, downsample,
//! grayscale, blur) so every stage works on the same working image. The
//! four stages then run in the fixed order of [`StageKind::ORDER`], each
//! reading what earlier stages left in the [`PipelineContext`] and adding
//! its own result. A failing stage halts the run; nothing is retried.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::dimension::DimensionCalculator;
use crate::error::{EdgeFittingReason, GeometryQuantity, PipelineError, StageError};
use crate::marker::{MarkerStrategy, SquareMarkerDetector};
use crate::scale::{self, Scale};
use crate::types::{Dimensions, GrayImage, MarkerObservation, Measurement, Quadrilateral};
use crate::window::{WindowDetector, WindowFit, WindowInput};

/// Number of stages in a full run.
pub const STAGE_COUNT: usize = 4;

/// One step of the measurement pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Find the fiducial marker(s).
    MarkerDetect,
    /// Derive millimetres per pixel from the markers.
    ScaleCalibrate,
    /// Find the window quadrilateral.
    WindowDetect,
    /// Convert the quadrilateral to inches.
    DimensionCompute,
}

impl StageKind {
    /// Every stage in execution order.
    pub const ORDER: [Self; STAGE_COUNT] = [
        Self::MarkerDetect,
        Self::ScaleCalibrate,
        Self::WindowDetect,
        Self::DimensionCompute,
    ];

    /// Stable snake-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MarkerDetect => "marker_detect",
            Self::ScaleCalibrate => "scale_calibrate",
            Self::WindowDetect => "window_detect",
            Self::DimensionCompute => "dimension_compute",
        }
    }

    /// Position in [`Self::ORDER`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::MarkerDetect => 0,
            Self::ScaleCalibrate => 1,
            Self::WindowDetect => 2,
            Self::DimensionCompute => 3,
        }
    }

    /// The stage that runs after this one.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::MarkerDetect => Some(Self::ScaleCalibrate),
            Self::ScaleCalibrate => Some(Self::WindowDetect),
            Self::WindowDetect => Some(Self::DimensionCompute),
            Self::DimensionCompute => None,
        }
    }

    /// Execute this stage against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the stage's [`StageError`]. `ctx` is left unchanged on
    /// failure apart from diagnostic counts.
    pub fn run(self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        match self {
            Self::MarkerDetect => run_marker_detect(ctx),
            Self::ScaleCalibrate => run_scale_calibrate(ctx),
            Self::WindowDetect => run_window_detect(ctx),
            Self::DimensionCompute => run_dimension_compute(ctx),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything one run knows, owned by that run alone.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    config: PipelineConfig,
    input_bytes: usize,
    source_dimensions: Dimensions,
    dimensions: Dimensions,
    downsampled: bool,
    gray: GrayImage,
    blurred: GrayImage,
    marker_candidates: usize,
    markers: Vec<MarkerObservation>,
    scale: Option<Scale>,
    window: Option<WindowFit>,
    measurement: Option<Measurement>,
}

impl PipelineContext {
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Size of the encoded input.
    #[must_use]
    pub const fn input_bytes(&self) -> usize {
        self.input_bytes
    }

    /// Dimensions of the decoded image before downsampling.
    #[must_use]
    pub const fn source_dimensions(&self) -> Dimensions {
        self.source_dimensions
    }

    /// Dimensions of the working image every stage sees.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Whether the decoded image was shrunk to the working resolution.
    #[must_use]
    pub const fn downsampled(&self) -> bool {
        self.downsampled
    }

    /// Working-resolution grayscale image.
    #[must_use]
    pub const fn gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Grayscale image after the configured Gaussian blur.
    #[must_use]
    pub const fn blurred(&self) -> &GrayImage {
        &self.blurred
    }

    /// Edge map built by the window stage, if it built one.
    #[must_use]
    pub fn edges(&self) -> Option<&GrayImage> {
        self.window.as_ref().and_then(|w| w.edges.as_ref())
    }

    /// Quadrilateral candidates inspected by the marker stage.
    #[must_use]
    pub const fn marker_candidates(&self) -> usize {
        self.marker_candidates
    }

    #[must_use]
    pub fn markers(&self) -> &[MarkerObservation] {
        &self.markers
    }

    #[must_use]
    pub const fn scale(&self) -> Option<&Scale> {
        self.scale.as_ref()
    }

    /// Full output of the window stage.
    #[must_use]
    pub const fn window(&self) -> Option<&WindowFit> {
        self.window.as_ref()
    }

    /// The fitted window quadrilateral.
    #[must_use]
    pub fn quad(&self) -> Option<&Quadrilateral> {
        self.window.as_ref().map(|w| &w.quad)
    }

    #[must_use]
    pub const fn measurement(&self) -> Option<Measurement> {
        self.measurement
    }
}

fn run_marker_detect(ctx: &mut PipelineContext) -> Result<(), StageError> {
    let detector = SquareMarkerDetector::from_config(&ctx.config);
    let search = detector.search(&ctx.blurred);
    ctx.marker_candidates = search.candidates;
    ctx.markers = detector.accept(search)?;
    Ok(())
}

fn run_scale_calibrate(ctx: &mut PipelineContext) -> Result<(), StageError> {
    let spacing = match ctx.config.marker_strategy {
        MarkerStrategy::Pair => ctx.config.marker_spacing_mm,
        MarkerStrategy::Single => None,
    };
    let scale = scale::calibrate(
        &ctx.markers,
        ctx.config.marker_size_mm,
        spacing,
        ctx.config.scale_agreement_tolerance,
    )?;
    ctx.scale = Some(scale);
    Ok(())
}

fn run_window_detect(ctx: &mut PipelineContext) -> Result<(), StageError> {
    let input = WindowInput {
        blurred: &ctx.blurred,
        markers: &ctx.markers,
        config: &ctx.config,
    };
    let fit = ctx.config.window_detector.detect(&input)?;
    ctx.window = Some(fit);
    Ok(())
}

fn run_dimension_compute(ctx: &mut PipelineContext) -> Result<(), StageError> {
    let Some(scale) = ctx.scale.as_ref() else {
        return Err(StageError::degenerate(GeometryQuantity::Scale, 0.0));
    };
    let Some(window) = ctx.window.as_ref() else {
        return Err(StageError::edge_fitting(EdgeFittingReason::WindowUnavailable));
    };
    let measurement = ctx
        .config
        .dimension_calculator
        .calculate(scale.mm_per_px, &window.quad)?;
    ctx.measurement = Some(measurement);
    Ok(())
}

/// A measurement run in progress.
#[derive(Debug, Clone)]
pub struct Pipeline {
    context: PipelineContext,
    next: Option<StageKind>,
}

impl Pipeline {
    /// Validate `config`, decode `image_bytes`, and prepare the working
    /// rasters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a bad configuration,
    /// [`PipelineError::EmptyInput`] for empty input, and
    /// [`PipelineError::ImageDecode`] for undecodable input.
    pub fn new(image_bytes: &[u8], config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let decoded = crate::grayscale::decode(image_bytes)?;
        let source_dimensions = Dimensions {
            width: decoded.width(),
            height: decoded.height(),
        };
        let (working, downsampled) = crate::downsample::downsample(
            decoded,
            config.working_resolution,
            config.downsample_filter,
        );
        let gray = crate::grayscale::to_grayscale(&working);
        let blurred = crate::blur::gaussian_blur(&gray, config.blur_sigma);
        let dimensions = Dimensions {
            width: gray.width(),
            height: gray.height(),
        };
        log::debug!(
            "prepared {}x{} working image from {}x{} source (downsampled: {downsampled})",
            dimensions.width,
            dimensions.height,
            source_dimensions.width,
            source_dimensions.height,
        );

        Ok(Self {
            context: PipelineContext {
                config,
                input_bytes: image_bytes.len(),
                source_dimensions,
                dimensions,
                downsampled,
                gray,
                blurred,
                marker_candidates: 0,
                markers: Vec::new(),
                scale: None,
                window: None,
                measurement: None,
            },
            next: Some(StageKind::MarkerDetect),
        })
    }

    /// The stage [`step`](Self::step) would run next, or `None` once the
    /// run is complete.
    #[must_use]
    pub const fn next_stage(&self) -> Option<StageKind> {
        self.next
    }

    #[must_use]
    pub const fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Consume the pipeline, keeping its context.
    #[must_use]
    pub fn into_context(self) -> PipelineContext {
        self.context
    }

    /// Run the next stage.
    ///
    /// Returns the stage that ran, or `None` when every stage already has.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Stage`] when the stage fails. The failed
    /// stage stays next, so stepping again re-runs it.
    pub fn step(&mut self) -> Result<Option<StageKind>, PipelineError> {
        let Some(stage) = self.next else {
            return Ok(None);
        };
        log::debug!("running stage {stage}");
        if let Err(source) = stage.run(&mut self.context) {
            log::warn!("stage {stage} failed: {source}");
            return Err(PipelineError::Stage { stage, source });
        }
        self.next = stage.next();
        Ok(Some(stage))
    }

    /// Run every remaining stage.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure.
    pub fn run(mut self) -> Result<PipelineContext, PipelineError> {
        while self.step()?.is_some() {}
        Ok(self.context)
    }
}
