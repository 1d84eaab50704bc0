//! Batch evaluation of measurement strategies against a labelled corpus.
//!
//! A manifest is a JSON array of entries, each naming an image (relative
//! to the manifest's directory), its true window size in inches, and how
//! many markers it shows. Every strategy attempts the entries whose marker
//! count it handles and is scored on reliability (share of attempts that
//! produced a measurement) and accuracy (one minus the mean relative
//! error of width and height).

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use panescale_pipeline::{
    MarkerStrategy, Measurement, PipelineConfig, Preprocessing, WindowDetectorKind,
};
use serde::{Deserialize, Serialize};

/// One labelled photo.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    /// Image path, relative to the manifest's directory.
    pub path: PathBuf,
    /// True window width in inches.
    pub width_in: f64,
    /// True window height in inches.
    pub height_in: f64,
    /// Markers visible in the photo.
    pub marker_quantity: usize,
    #[serde(default = "default_marker_size_mm")]
    pub marker_size_mm: f64,
    /// Skip this entry entirely.
    #[serde(default)]
    pub ignore: bool,
}

const fn default_marker_size_mm() -> f64 {
    PipelineConfig::DEFAULT_MARKER_SIZE_MM
}

/// A measurement strategy under evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One marker, plain binarization.
    OneMarker,
    /// One marker, edge-enhanced preprocessing.
    OneMarkerV2,
    /// Two markers bounding the window.
    TwoMarker,
}

impl Strategy {
    pub const ALL: [Self; 3] = [Self::OneMarker, Self::OneMarkerV2, Self::TwoMarker];

    /// Marker count of the entries this strategy attempts.
    #[must_use]
    pub const fn marker_quantity(self) -> usize {
        match self {
            Self::OneMarker | Self::OneMarkerV2 => 1,
            Self::TwoMarker => 2,
        }
    }

    /// Whether this strategy attempts `entry`.
    #[must_use]
    pub fn attempts(self, entry: &ManifestEntry) -> bool {
        !entry.ignore && entry.marker_quantity == self.marker_quantity()
    }

    /// `base` adjusted for this strategy and `entry`'s marker size.
    #[must_use]
    pub fn config(self, base: &PipelineConfig, entry: &ManifestEntry) -> PipelineConfig {
        let (marker_strategy, preprocessing, window_detector) = match self {
            Self::OneMarker => (
                MarkerStrategy::Single,
                Preprocessing::Plain,
                WindowDetectorKind::LineFit,
            ),
            Self::OneMarkerV2 => (
                MarkerStrategy::Single,
                Preprocessing::EdgeEnhanced,
                WindowDetectorKind::LineFit,
            ),
            Self::TwoMarker => (
                MarkerStrategy::Pair,
                Preprocessing::Plain,
                WindowDetectorKind::MarkerBounded,
            ),
        };
        PipelineConfig {
            marker_strategy,
            preprocessing,
            window_detector,
            marker_size_mm: entry.marker_size_mm,
            ..base.clone()
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneMarker => f.write_str("one-marker"),
            Self::OneMarkerV2 => f.write_str("one-marker-v2"),
            Self::TwoMarker => f.write_str("two-marker"),
        }
    }
}

/// Accuracy of `measured` against the entry's true size: one minus the
/// mean relative error of width and height. Measurements are rounded to
/// two decimals first, as a caller would see them.
#[must_use]
pub fn accuracy(measured: Measurement, entry: &ManifestEntry) -> f64 {
    let m = measured.rounded();
    let width_error = ((m.width_in - entry.width_in) / entry.width_in).abs();
    let height_error = ((m.height_in - entry.height_in) / entry.height_in).abs();
    1.0 - (width_error + height_error) / 2.0
}

/// Outcome of one strategy on one entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement: Option<Measurement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntryResult {
    fn success(entry: &ManifestEntry, measurement: Measurement) -> Self {
        Self {
            id: entry.id.clone(),
            measurement: Some(measurement),
            accuracy: Some(accuracy(measurement, entry)),
            error: None,
        }
    }

    fn failure(entry: &ManifestEntry, error: String) -> Self {
        Self {
            id: entry.id.clone(),
            measurement: None,
            accuracy: None,
            error: Some(error),
        }
    }
}

/// An entry and its accuracy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored {
    pub id: String,
    pub accuracy: f64,
}

/// Aggregate results of one strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    pub strategy: Strategy,
    pub attempts: usize,
    pub successes: usize,
    /// Successes over attempts, in percent. Zero when nothing was attempted.
    pub reliability_pct: f64,
    /// Mean accuracy of the successes, in percent.
    pub mean_accuracy_pct: Option<f64>,
    pub best: Option<Scored>,
    pub worst: Option<Scored>,
    pub entries: Vec<EntryResult>,
}

impl StrategyReport {
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new(strategy: Strategy, entries: Vec<EntryResult>) -> Self {
        let scored: Vec<Scored> = entries
            .iter()
            .filter_map(|e| {
                e.accuracy.map(|accuracy| Scored {
                    id: e.id.clone(),
                    accuracy,
                })
            })
            .collect();

        let attempts = entries.len();
        let successes = scored.len();
        let reliability_pct = if attempts == 0 {
            0.0
        } else {
            successes as f64 / attempts as f64 * 100.0
        };
        let mean_accuracy_pct = (successes > 0)
            .then(|| scored.iter().map(|s| s.accuracy).sum::<f64>() / successes as f64 * 100.0);
        let best = scored
            .iter()
            .max_by(|a, b| a.accuracy.total_cmp(&b.accuracy))
            .cloned();
        let worst = scored
            .iter()
            .min_by(|a, b| a.accuracy.total_cmp(&b.accuracy))
            .cloned();

        Self {
            strategy,
            attempts,
            successes,
            reliability_pct,
            mean_accuracy_pct,
            best,
            worst,
            entries,
        }
    }
}

/// Results of every evaluated strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub strategies: Vec<StrategyReport>,
    /// Mean accuracy over every success of every strategy, in percent.
    pub overall_accuracy_pct: Option<f64>,
}

impl EvaluationReport {
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new(strategies: Vec<StrategyReport>) -> Self {
        let accuracies: Vec<f64> = strategies
            .iter()
            .flat_map(|s| s.entries.iter().filter_map(|e| e.accuracy))
            .collect();
        let overall_accuracy_pct = (!accuracies.is_empty())
            .then(|| accuracies.iter().sum::<f64>() / accuracies.len() as f64 * 100.0);
        Self {
            strategies,
            overall_accuracy_pct,
        }
    }

    /// Format the report for a terminal.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Evaluation Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "{:<16} {:>9} {:>10} {:>12} {:>10}",
            "Strategy", "Attempts", "Successes", "Reliability", "Accuracy"
        ));
        lines.push("-".repeat(60));
        for s in &self.strategies {
            lines.push(format!(
                "{:<16} {:>9} {:>10} {:>11.2}% {:>10}",
                s.strategy.to_string(),
                s.attempts,
                s.successes,
                s.reliability_pct,
                percent(s.mean_accuracy_pct),
            ));
        }

        for s in &self.strategies {
            if let (Some(best), Some(worst)) = (&s.best, &s.worst) {
                lines.push(String::new());
                lines.push(format!(
                    "{}: best {} ({:.2}%), worst {} ({:.2}%)",
                    s.strategy,
                    best.id,
                    best.accuracy * 100.0,
                    worst.id,
                    worst.accuracy * 100.0,
                ));
            }
            for failure in s.entries.iter().filter(|e| e.accuracy.is_none()) {
                lines.push(format!(
                    "{}: {} failed: {}",
                    s.strategy,
                    failure.id,
                    failure.error.as_deref().unwrap_or("unknown error"),
                ));
            }
        }

        lines.push(String::new());
        lines.push(format!(
            "Overall accuracy: {}",
            percent(self.overall_accuracy_pct)
        ));
        lines.join("\n")
    }
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}%"))
}

/// Read and parse a manifest.
///
/// # Errors
///
/// Returns a message when the file cannot be read or is not a valid
/// manifest.
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading manifest {}: {e}", path.display()))?;
    parse_manifest(&text, path)
}

/// Parse manifest JSON read from `path`.
///
/// # Errors
///
/// Returns a message when the JSON does not describe a list of entries, or
/// when an entry's expected width or height is not a positive number.
pub fn parse_manifest(text: &str, path: &Path) -> Result<Vec<ManifestEntry>, String> {
    let entries: Vec<ManifestEntry> = serde_json::from_str(text)
        .map_err(|e| format!("Error parsing manifest {}: {e}", path.display()))?;
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if let Some(bad) = entries
        .iter()
        .find(|e| !positive(e.width_in) || !positive(e.height_in))
    {
        return Err(format!(
            "Error in manifest {}: entry {} expects {} x {} in; both must be positive",
            path.display(),
            bad.id,
            bad.width_in,
            bad.height_in,
        ));
    }
    Ok(entries)
}

/// Run `strategy` on every entry it attempts.
///
/// Image paths resolve against `base_dir`. Unreadable images count as
/// failed attempts.
#[must_use]
pub fn evaluate_strategy(
    strategy: Strategy,
    entries: &[ManifestEntry],
    base_dir: &Path,
    base: &PipelineConfig,
) -> StrategyReport {
    let results = entries
        .iter()
        .filter(|entry| strategy.attempts(entry))
        .map(|entry| {
            let path = base_dir.join(&entry.path);
            let outcome = std::fs::read(&path)
                .map_err(|e| format!("Error reading {}: {e}", path.display()))
                .and_then(|bytes| {
                    panescale_pipeline::measure(&bytes, &strategy.config(base, entry))
                        .map_err(|e| e.to_string())
                });
            match outcome {
                Ok(measurement) => {
                    log::info!("{strategy} {}: {measurement:?}", entry.id);
                    EntryResult::success(entry, measurement)
                }
                Err(error) => {
                    log::warn!("{strategy} {}: {error}", entry.id);
                    EntryResult::failure(entry, error)
                }
            }
        })
        .collect();
    StrategyReport::new(strategy, results)
}

/// Evaluate `strategies` against the manifest at `manifest_path`.
///
/// # Errors
///
/// Returns a message when the manifest cannot be loaded.
pub fn evaluate(
    manifest_path: &Path,
    strategies: &[Strategy],
    base: &PipelineConfig,
) -> Result<EvaluationReport, String> {
    let entries = load_manifest(manifest_path)?;
    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    log::info!(
        "evaluating {} entries from {}",
        entries.len(),
        manifest_path.display()
    );
    Ok(EvaluationReport::new(
        strategies
            .iter()
            .map(|&s| evaluate_strategy(s, &entries, base_dir, base))
            .collect(),
    ))
}
