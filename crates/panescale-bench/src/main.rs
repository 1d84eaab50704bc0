//! panescale-bench: CLI tool for measuring photos and evaluating strategies.
//!
//! `measure` runs the pipeline on one photo with configurable parameters
//! and prints the measurement with per-stage diagnostics. `evaluate` runs
//! the measurement strategies over a labelled manifest and reports their
//! reliability and accuracy.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin panescale-bench -- measure [OPTIONS] <IMAGE_PATH>
//! cargo run --release --bin panescale-bench -- evaluate [OPTIONS] <MANIFEST>
//! ```
//!
//! Set `RUST_LOG=debug` to trace the pipeline stages.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod evaluate;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use panescale_pipeline::{Clock, PipelineConfig, PipelineDiagnostics};

use crate::evaluate::Strategy;

/// Window measurement diagnostics and evaluation for panescale.
#[derive(Parser)]
#[command(name = "panescale-bench", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure one photo and print per-stage diagnostics.
    Measure(MeasureArgs),
    /// Score the measurement strategies against a labelled manifest.
    Evaluate(EvaluateArgs),
}

#[derive(Args)]
struct MeasureArgs {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Physical marker side length in millimetres.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MARKER_SIZE_MM)]
    marker_size_mm: f64,

    /// Number of markers in the photo.
    #[arg(long, value_enum, default_value_t = Markers::Single)]
    markers: Markers,

    /// Preprocessing for marker search and edge detection.
    #[arg(long, value_enum, default_value_t = Preprocess::Plain)]
    preprocessing: Preprocess,

    /// Window detection strategy.
    #[arg(long, value_enum, default_value_t = Window::LineFit)]
    window: Window,

    /// Line detector for the line-fit window strategy.
    #[arg(long, value_enum, default_value_t = Lines::Contour)]
    lines: Lines,

    /// Dimension calculator.
    #[arg(long, value_enum, default_value_t = Calculator::Perspective)]
    calculator: Calculator,

    /// Gaussian blur sigma.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Canny low threshold.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CANNY_LOW)]
    canny_low: f32,

    /// Canny high threshold.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CANNY_HIGH)]
    canny_high: f32,

    /// Working resolution (max dimension in pixels after downsampling).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_WORKING_RESOLUTION, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    working_resolution: u32,

    /// Downsample filter.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    downsample_filter: Filter,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Path to the manifest JSON.
    manifest: PathBuf,

    /// Strategies to evaluate (default: all).
    #[arg(long = "strategy", value_enum)]
    strategies: Vec<Strategy>,

    /// Output the report as JSON.
    #[arg(long)]
    json: bool,

    /// Base pipeline config as a JSON string; strategies override the
    /// marker settings.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Markers {
    Single,
    Pair,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preprocess {
    /// Global Otsu binarization and fixed Canny thresholds.
    Plain,
    /// Adaptive binarization and a DoG-masked edge map.
    EdgeEnhanced,
}

#[derive(Clone, Copy, ValueEnum)]
enum Window {
    /// Fit the outer frame edges.
    LineFit,
    /// Rectangle spanned by the outer corners of two markers.
    MarkerBounded,
}

#[derive(Clone, Copy, ValueEnum)]
enum Lines {
    /// Straight runs of simplified edge contours.
    Contour,
    /// Hough transform peaks walked back to segments.
    Hough,
}

#[derive(Clone, Copy, ValueEnum)]
enum Calculator {
    /// Mean of opposite sides.
    Perspective,
    /// Top and left sides only.
    Adjacent,
}

/// Downsample resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Disabled: skip downsampling regardless of image size.
    Disabled,
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Maps a [`panescale_pipeline::DownsampleFilter`] to the local CLI [`Filter`] enum.
const fn filter_from_pipeline(f: panescale_pipeline::DownsampleFilter) -> Filter {
    match f {
        panescale_pipeline::DownsampleFilter::Disabled => Filter::Disabled,
        panescale_pipeline::DownsampleFilter::Nearest => Filter::Nearest,
        panescale_pipeline::DownsampleFilter::Triangle => Filter::Triangle,
        panescale_pipeline::DownsampleFilter::CatmullRom => Filter::CatmullRom,
        panescale_pipeline::DownsampleFilter::Gaussian => Filter::Gaussian,
        panescale_pipeline::DownsampleFilter::Lanczos3 => Filter::Lanczos3,
    }
}

/// The CLI default filter, derived from [`PipelineConfig::DEFAULT_DOWNSAMPLE_FILTER`]
/// so the two cannot silently diverge.
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(PipelineConfig::DEFAULT_DOWNSAMPLE_FILTER);

fn parse_config_json(json: &str) -> Result<PipelineConfig, String> {
    serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))
}

/// Build a [`PipelineConfig`] from `measure` arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_args(args: &MeasureArgs) -> Result<PipelineConfig, String> {
    if let Some(ref json) = args.config_json {
        return parse_config_json(json);
    }

    Ok(PipelineConfig {
        marker_size_mm: args.marker_size_mm,
        marker_strategy: match args.markers {
            Markers::Single => panescale_pipeline::MarkerStrategy::Single,
            Markers::Pair => panescale_pipeline::MarkerStrategy::Pair,
        },
        preprocessing: match args.preprocessing {
            Preprocess::Plain => panescale_pipeline::Preprocessing::Plain,
            Preprocess::EdgeEnhanced => panescale_pipeline::Preprocessing::EdgeEnhanced,
        },
        window_detector: match args.window {
            Window::LineFit => panescale_pipeline::WindowDetectorKind::LineFit,
            Window::MarkerBounded => panescale_pipeline::WindowDetectorKind::MarkerBounded,
        },
        line_detector: match args.lines {
            Lines::Contour => panescale_pipeline::LineDetectorKind::ContourSegments,
            Lines::Hough => panescale_pipeline::LineDetectorKind::Hough,
        },
        dimension_calculator: match args.calculator {
            Calculator::Perspective => {
                panescale_pipeline::DimensionCalculatorKind::PerspectiveAveraging
            }
            Calculator::Adjacent => panescale_pipeline::DimensionCalculatorKind::AdjacentSides,
        },
        blur_sigma: args.blur_sigma,
        canny_low: args.canny_low,
        canny_high: args.canny_high,
        working_resolution: args.working_resolution,
        downsample_filter: match args.downsample_filter {
            Filter::Disabled => panescale_pipeline::DownsampleFilter::Disabled,
            Filter::Nearest => panescale_pipeline::DownsampleFilter::Nearest,
            Filter::Triangle => panescale_pipeline::DownsampleFilter::Triangle,
            Filter::CatmullRom => panescale_pipeline::DownsampleFilter::CatmullRom,
            Filter::Gaussian => panescale_pipeline::DownsampleFilter::Gaussian,
            Filter::Lanczos3 => panescale_pipeline::DownsampleFilter::Lanczos3,
        },
        ..PipelineConfig::default()
    })
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Measure(args) => run_measure(&args),
        Command::Evaluate(args) => run_evaluate(&args),
    }
}

fn run_measure(args: &MeasureArgs) -> ExitCode {
    let config = match config_from_args(args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&args.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", args.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        args.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", args.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(args.runs);

    for run in 0..args.runs {
        if args.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, args.runs);
        }

        match panescale_pipeline::measure_with_diagnostics(&image_bytes, &config, &StdClock) {
            Ok((measurement, diagnostics)) => {
                if args.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                    let rounded = measurement.rounded();
                    println!(
                        "Measurement: {:.2} in x {:.2} in",
                        rounded.width_in, rounded.height_in
                    );
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                if args.json {
                    let failure = panescale_pipeline::MeasureFailure::from(&e);
                    if let Ok(json) = serde_json::to_string_pretty(&failure) {
                        println!("{json}");
                    }
                } else {
                    eprintln!("Hint: {}", panescale_pipeline::MeasureFailure::from(&e).hint);
                }
                return ExitCode::FAILURE;
            }
        }

        if args.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if args.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

fn run_evaluate(args: &EvaluateArgs) -> ExitCode {
    let base = match args.config_json.as_deref().map(parse_config_json) {
        Some(Ok(c)) => c,
        Some(Err(msg)) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
        None => PipelineConfig::default(),
    };
    let strategies = if args.strategies.is_empty() {
        Strategy::ALL.to_vec()
    } else {
        args.strategies.clone()
    };

    let report = match evaluate::evaluate(&args.manifest, &strategies, &base) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", report.report());
    }
    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for (i, (name, _)) in first.stages().iter().enumerate() {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| d.stages()[i].1.duration.as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> MeasureArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Measure(m) => m,
            Command::Evaluate(_) => unreachable!("expected measure"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn measure_defaults_match_pipeline_defaults() {
        let config = config_from_args(&parse(&["panescale-bench", "measure", "w.jpg"])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn measure_flags_map_onto_config() {
        let args = parse(&[
            "panescale-bench",
            "measure",
            "w.jpg",
            "--markers",
            "pair",
            "--window",
            "marker-bounded",
            "--lines",
            "hough",
            "--marker-size-mm",
            "50",
        ]);
        let config = config_from_args(&args).unwrap();
        assert_eq!(
            config.marker_strategy,
            panescale_pipeline::MarkerStrategy::Pair
        );
        assert_eq!(
            config.window_detector,
            panescale_pipeline::WindowDetectorKind::MarkerBounded
        );
        assert_eq!(
            config.line_detector,
            panescale_pipeline::LineDetectorKind::Hough
        );
        assert!((config.marker_size_mm - 50.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_json_overrides_flags() {
        let args = parse(&[
            "panescale-bench",
            "measure",
            "w.jpg",
            "--blur-sigma",
            "3.0",
            "--config-json",
            r#"{"marker_size_mm": 80.0}"#,
        ]);
        let config = config_from_args(&args).unwrap();
        assert!((config.marker_size_mm - 80.0).abs() < f64::EPSILON);
        assert!((config.blur_sigma - PipelineConfig::DEFAULT_BLUR_SIGMA).abs() < f32::EPSILON);
    }

    #[test]
    fn bad_config_json_is_reported() {
        let args = parse(&[
            "panescale-bench",
            "measure",
            "w.jpg",
            "--config-json",
            "{not json",
        ]);
        assert!(config_from_args(&args).unwrap_err().contains("--config-json"));
    }

    #[test]
    fn evaluate_accepts_repeated_strategies() {
        let cli = Cli::try_parse_from([
            "panescale-bench",
            "evaluate",
            "corpus/manifest.json",
            "--strategy",
            "one-marker-v2",
            "--strategy",
            "two-marker",
        ])
        .unwrap();
        let Command::Evaluate(args) = cli.command else {
            unreachable!("expected evaluate");
        };
        assert_eq!(args.strategies, vec![Strategy::OneMarkerV2, Strategy::TwoMarker]);
    }
}
