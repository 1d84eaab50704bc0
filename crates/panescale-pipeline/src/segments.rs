//! Raw line-segment extraction from a binary edge map.
//!
//! This module defines the [`LineDetector`] trait for pluggable segment
//! extractors and the [`LineDetectorKind`] enum for selecting one at
//! runtime. Both strategies discard segments shorter than the configured
//! minimum line length; everything downstream (angle filtering, merging,
//! edge selection) is shared.

use std::fmt;

use image::GrayImage;
use imageproc::hough::{LineDetectionOptions, PolarLine};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::contour;
use crate::simplify;
use crate::types::{Dimensions, LineSegment, Point};

/// Selects which segment extractor to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineDetectorKind {
    /// Trace edge-map contours, simplify each to a polygon, and emit the
    /// polygon's sides.
    ///
    /// Follows edges of any orientation at sub-degree precision. Canny's
    /// one-pixel edges trace as thin loops, so every edge shows up twice;
    /// the line finder merges the duplicates.
    #[default]
    ContourSegments,

    /// Standard Hough transform, then walk each detected line across the
    /// image and keep runs of supporting edge pixels.
    ///
    /// Robust to broken edges, but quantised to whole degrees.
    Hough,
}

impl fmt::Display for LineDetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContourSegments => f.write_str("contour_segments"),
            Self::Hough => f.write_str("hough"),
        }
    }
}

/// Trait for segment extraction strategies.
///
/// Input: a binary edge map (white pixels = edges, black = background).
/// Output: straight segments at least the configured minimum length.
pub trait LineDetector {
    /// Extract line segments from `edges`.
    fn detect(&self, edges: &GrayImage, config: &PipelineConfig) -> Vec<LineSegment>;
}

impl LineDetector for LineDetectorKind {
    fn detect(&self, edges: &GrayImage, config: &PipelineConfig) -> Vec<LineSegment> {
        let dims = Dimensions {
            width: edges.width(),
            height: edges.height(),
        };
        let min_length = config.min_line_length(dims);
        let segments = match *self {
            Self::ContourSegments => contour_segments(edges, config.simplify_tolerance),
            Self::Hough => hough_segments(
                edges,
                min_length,
                config.hough_suppression_radius,
                config.max_line_gap_px,
            ),
        };
        segments
            .into_iter()
            .filter(|s| s.length() >= min_length)
            .collect()
    }
}

/// Sides of every simplified edge-map contour.
fn contour_segments(edges: &GrayImage, tolerance: f64) -> Vec<LineSegment> {
    contour::trace_contours(edges)
        .iter()
        .flat_map(|c| simplify::polygon_sides(&simplify::simplify_closed(&c.polyline, tolerance)))
        .collect()
}

/// Hough lines walked into supported runs.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hough_segments(
    edges: &GrayImage,
    min_length: f64,
    suppression_radius: u32,
    max_gap: f64,
) -> Vec<LineSegment> {
    let options = LineDetectionOptions {
        vote_threshold: (min_length.round() as u32).max(1),
        suppression_radius,
    };
    imageproc::hough::detect_lines(edges, options)
        .iter()
        .flat_map(|line| walk_polar_line(edges, line, max_gap))
        .collect()
}

/// Walk the polar line `x cos θ + y sin θ = r` across the image and return
/// runs of edge support. Gaps up to `max_gap` pixels are bridged.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn walk_polar_line(edges: &GrayImage, line: &PolarLine, max_gap: f64) -> Vec<LineSegment> {
    let theta = f64::from(line.angle_in_degrees).to_radians();
    let (sin, cos) = theta.sin_cos();
    let r = f64::from(line.r);
    let origin = Point::new(r * cos, r * sin);
    let at = |t: f64| Point::new(sin.mul_add(-t, origin.x), cos.mul_add(t, origin.y));

    let (w, h) = (f64::from(edges.width()), f64::from(edges.height()));
    let reach = w.hypot(h).ceil() as i64;

    let mut runs = Vec::new();
    let mut run: Option<(f64, f64)> = None;
    for step in -reach..=reach {
        let t = step as f64;
        let p = at(t);
        if p.x < 0.0 || p.y < 0.0 || p.x >= w || p.y >= h {
            continue;
        }
        if !supported(edges, p.x.round() as i64, p.y.round() as i64) {
            continue;
        }
        run = match run {
            Some((start, last)) if t - last <= max_gap + 1.0 => Some((start, t)),
            Some((start, last)) => {
                runs.push(LineSegment::new(at(start), at(last)));
                Some((t, t))
            }
            None => Some((t, t)),
        };
    }
    if let Some((start, last)) = run {
        runs.push(LineSegment::new(at(start), at(last)));
    }
    runs
}

/// Whether any pixel in the 3x3 neighbourhood of `(x, y)` is an edge.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn supported(edges: &GrayImage, x: i64, y: i64) -> bool {
    let (w, h) = (i64::from(edges.width()), i64::from(edges.height()));
    (-1..=1).any(|dy| {
        (-1..=1).any(|dx| {
            let (nx, ny) = (x + dx, y + dy);
            nx >= 0 && ny >= 0 && nx < w && ny < h && edges.get_pixel(nx as u32, ny as u32).0[0] > 0
        })
    })
}
