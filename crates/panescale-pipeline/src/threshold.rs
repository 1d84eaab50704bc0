//! Binarisation of grayscale images into dark-foreground masks.
//!
//! Markers are printed black on white, so every function here maps dark
//! pixels to 255 (foreground) and light pixels to 0. That polarity lets
//! [`imageproc::contours::find_contours`] treat markers as objects.

use image::GrayImage;

use crate::types::Preprocessing;

/// Intensity spread below which an image is treated as featureless.
pub const MIN_CONTRAST: u8 = 24;

/// Margin below the local mean a pixel must fall to count as dark in
/// adaptive mode.
pub const ADAPTIVE_OFFSET: u8 = 7;

/// Binarise with a single global Otsu threshold.
///
/// Pixels at or below the Otsu level become foreground. A
/// featureless image (spread under [`MIN_CONTRAST`]) yields an empty mask.
#[must_use = "returns the binary mask"]
pub fn otsu_dark(image: &GrayImage) -> GrayImage {
    if !has_contrast(image) {
        return GrayImage::new(image.width(), image.height());
    }
    let level = imageproc::contrast::otsu_level(image);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        image::Luma([if image.get_pixel(x, y).0[0] <= level { 255 } else { 0 }])
    })
}

/// Binarise against the local mean over a `(2r+1)²` box window.
///
/// Pixels more than [`ADAPTIVE_OFFSET`] below their neighbourhood mean
/// become foreground. Large uniformly dark regions hollow out, but their
/// outlines survive, which is all contour tracing needs.
#[must_use = "returns the binary mask"]
pub fn adaptive_dark(image: &GrayImage, block_radius: u32) -> GrayImage {
    if !has_contrast(image) {
        return GrayImage::new(image.width(), image.height());
    }
    let radius = block_radius.max(1);
    let mean = imageproc::filter::box_filter(image, radius, radius);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = image.get_pixel(x, y).0[0];
        let local = mean.get_pixel(x, y).0[0];
        image::Luma([if value.saturating_add(ADAPTIVE_OFFSET) < local { 255 } else { 0 }])
    })
}

/// Adaptive window radius for an image whose longer side is `max_side`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn block_radius(max_side: u32, ratio: f64) -> u32 {
    ((f64::from(max_side) * ratio).round() as u32).max(1)
}

/// Binarise according to the preprocessing mode.
#[must_use = "returns the binary mask"]
pub fn binarize(image: &GrayImage, preprocessing: Preprocessing, block_ratio: f64) -> GrayImage {
    match preprocessing {
        Preprocessing::Plain => otsu_dark(image),
        Preprocessing::EdgeEnhanced => {
            let radius = block_radius(image.width().max(image.height()), block_ratio);
            adaptive_dark(image, radius)
        }
    }
}

fn has_contrast(image: &GrayImage) -> bool {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    max > min && max - min >= MIN_CONTRAST
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 40x40 light image with a dark 10x10 square at (15, 15).
    fn dark_square() -> GrayImage {
        GrayImage::from_fn(40, 40, |x, y| {
            let inside = (15..25).contains(&x) && (15..25).contains(&y);
            image::Luma([if inside { 20 } else { 220 }])
        })
    }

    fn foreground(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == 255).count()
    }

    #[test]
    fn otsu_marks_dark_square_as_foreground() {
        let mask = otsu_dark(&dark_square());
        assert_eq!(foreground(&mask), 100);
        assert_eq!(mask.get_pixel(20, 20).0[0], 255);
        assert_eq!(mask.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn uniform_image_has_no_foreground() {
        let img = GrayImage::from_pixel(20, 20, image::Luma([128]));
        assert_eq!(foreground(&otsu_dark(&img)), 0);
        assert_eq!(foreground(&adaptive_dark(&img, 3)), 0);
    }

    #[test]
    fn low_contrast_image_has_no_foreground() {
        let img = GrayImage::from_fn(20, 20, |x, _| image::Luma([if x < 10 { 120 } else { 130 }]));
        assert_eq!(foreground(&otsu_dark(&img)), 0);
    }

    #[test]
    fn adaptive_keeps_square_outline() {
        let mask = adaptive_dark(&dark_square(), 4);
        // Pixels just inside the square sit next to light background.
        assert_eq!(mask.get_pixel(15, 20).0[0], 255);
        assert_eq!(mask.get_pixel(24, 20).0[0], 255);
        // Background far from the square stays clear.
        assert_eq!(mask.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn adaptive_handles_uneven_lighting() {
        // Brightness ramps left to right; a dark bar sits on each half.
        let img = GrayImage::from_fn(60, 20, |x, y| {
            let base = 80 + u8::try_from(x * 2).unwrap_or(u8::MAX);
            let bar = (8..12).contains(&y) && (x == 10 || x == 50);
            image::Luma([if bar { base - 60 } else { base }])
        });
        let mask = adaptive_dark(&img, 3);
        assert_eq!(mask.get_pixel(10, 10).0[0], 255);
        assert_eq!(mask.get_pixel(50, 10).0[0], 255);
        assert_eq!(mask.get_pixel(30, 2).0[0], 0);
    }

    #[test]
    fn block_radius_is_at_least_one() {
        assert_eq!(block_radius(10, 0.01), 1);
        assert_eq!(block_radius(640, 0.0625), 40);
    }

    #[test]
    fn binarize_dispatches_on_preprocessing() {
        let img = dark_square();
        assert_eq!(binarize(&img, Preprocessing::Plain, 0.1), otsu_dark(&img));
        assert_eq!(
            binarize(&img, Preprocessing::EdgeEnhanced, 0.1),
            adaptive_dark(&img, 4)
        );
    }
}
