//! Contour tracing on binary maps.
//!
//! Suzuki-Abe border following via [`imageproc::contours::find_contours`],
//! converted into floating-point [`Polyline`]s tagged with whether each
//! border is the outside of a blob or the rim of a hole inside one.

use image::GrayImage;
use imageproc::contours::BorderType;

use crate::types::{Point, Polyline};

/// Which side of a foreground region a border traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderKind {
    /// The outer boundary of a foreground blob.
    Outer,
    /// The boundary of a background hole inside a blob.
    Hole,
}

/// A traced border.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedContour {
    pub border: BorderKind,
    /// Boundary pixel centres in tracing order. The loop is implicitly
    /// closed.
    pub polyline: Polyline,
}

/// Trace every border (outer and hole) of the nonzero pixels in `binary`.
///
/// Borders with fewer than two points (isolated pixels) are dropped.
#[must_use]
pub fn trace_contours(binary: &GrayImage) -> Vec<TracedContour> {
    let contours: Vec<imageproc::contours::Contour<u32>> =
        imageproc::contours::find_contours(binary);

    contours
        .into_iter()
        .filter(|c| c.points.len() >= 2)
        .map(|c| {
            let border = match c.border_type {
                BorderType::Outer => BorderKind::Outer,
                BorderType::Hole => BorderKind::Hole,
            };
            let points = c
                .points
                .into_iter()
                .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                .collect();
            TracedContour {
                border,
                polyline: Polyline::new(points),
            }
        })
        .collect()
}

/// Outer borders only; hole borders are discarded.
#[must_use]
pub fn outer_contours(binary: &GrayImage) -> Vec<Polyline> {
    trace_contours(binary)
        .into_iter()
        .filter(|c| c.border == BorderKind::Outer)
        .map(|c| c.polyline)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_square(size: u32, from: u32, to: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = (from..to).contains(&x) && (from..to).contains(&y);
            image::Luma([if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn empty_image_produces_no_contours() {
        assert!(trace_contours(&GrayImage::new(10, 10)).is_empty());
    }

    #[test]
    fn single_pixel_contour_is_filtered_out() {
        let mut img = GrayImage::new(10, 10);
        img.put_pixel(5, 5, image::Luma([255]));
        for contour in trace_contours(&img) {
            assert!(contour.polyline.len() >= 2);
        }
    }

    #[test]
    fn filled_square_has_one_outer_border_on_pixel_centres() {
        let contours = trace_contours(&filled_square(20, 5, 15));
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].border, BorderKind::Outer);

        let points = contours[0].polyline.points();
        let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        assert!((min_x - 5.0).abs() < f64::EPSILON);
        assert!((max_x - 14.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ring_has_outer_and_hole_borders() {
        let mut img = filled_square(30, 5, 25);
        for y in 10..20 {
            for x in 10..20 {
                img.put_pixel(x, y, image::Luma([0]));
            }
        }
        let contours = trace_contours(&img);
        assert!(contours.iter().any(|c| c.border == BorderKind::Outer));
        assert!(contours.iter().any(|c| c.border == BorderKind::Hole));
        assert_eq!(outer_contours(&img).len(), 1);
    }
}
