//! Canny edge maps for window-edge extraction.
//!
//! Wraps [`imageproc::edges::canny`] to detect edges in a blurred grayscale
//! image. Returns a binary image where white pixels (255) are edges and
//! black pixels (0) are background.
//!
//! [`enhanced_edge_map`] derives its thresholds from the image itself and
//! keeps only edges that coincide with a strong difference-of-Gaussians
//! response, which suppresses wall and curtain texture in real photos.

use image::GrayImage;
use imageproc::distance_transform::Norm;

use crate::blur;
use crate::config::PipelineConfig;
use crate::types::Preprocessing;

/// Minimum allowed Canny threshold.
///
/// A low threshold of zero causes every pixel with any gradient to be
/// treated as a potential edge, producing an extremely dense edge map.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Ratio between the Canny high and low thresholds in enhanced mode.
pub const ENHANCED_HIGH_RATIO: f32 = 1.5;

/// Detect edges using the Canny algorithm.
///
/// Returns a binary image: 255 for edge pixels, 0 for non-edge.
///
/// Both thresholds are clamped to a minimum of [`MIN_THRESHOLD`] and
/// `low_threshold` is clamped to be at most `high_threshold`.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);
    imageproc::edges::canny(image, low, high)
}

/// Canny with thresholds `(otsu, 1.5 * otsu)`, dilated once and masked by
/// the dilated, Otsu-binarised difference-of-Gaussians response.
#[must_use = "returns the binary edge map"]
pub fn enhanced_edge_map(image: &GrayImage, dog_inner: f32, dog_outer: f32) -> GrayImage {
    let level = f32::from(imageproc::contrast::otsu_level(image)).max(MIN_THRESHOLD);
    let edges = canny(image, level, level * ENHANCED_HIGH_RATIO);
    let edges = imageproc::morphology::dilate(&edges, Norm::LInf, 1);

    let dog = blur::difference_of_gaussians(image, dog_inner, dog_outer);
    let dog_level = imageproc::contrast::otsu_level(&dog);
    let mask = GrayImage::from_fn(dog.width(), dog.height(), |x, y| {
        image::Luma([if dog.get_pixel(x, y).0[0] > dog_level { 255 } else { 0 }])
    });
    let mask = imageproc::morphology::dilate(&mask, Norm::LInf, 2);

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let both = edges.get_pixel(x, y).0[0] > 0 && mask.get_pixel(x, y).0[0] > 0;
        image::Luma([if both { 255 } else { 0 }])
    })
}

/// Edge map for the configured preprocessing mode.
///
/// `blurred` is the working image after the configured Gaussian blur.
#[must_use = "returns the binary edge map"]
pub fn edge_map(blurred: &GrayImage, config: &PipelineConfig) -> GrayImage {
    match config.preprocessing {
        Preprocessing::Plain => canny(blurred, config.canny_low, config.canny_high),
        Preprocessing::EdgeEnhanced => {
            enhanced_edge_map(blurred, config.dog_sigma_inner, config.dog_sigma_outer)
        }
    }
}

/// Number of edge pixels in a binary map.
#[must_use]
pub fn edge_pixel_count(edges: &GrayImage) -> u64 {
    edges.pixels().map(|p| u64::from(p.0[0] > 0)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20x20 image with a sharp vertical boundary at x = 10.
    fn sharp_edge_image() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, _y| {
            if x < 10 {
                image::Luma([0])
            } else {
                image::Luma([255])
            }
        })
    }

    #[test]
    fn blank_image_produces_no_edges() {
        let img = GrayImage::from_fn(20, 20, |_, _| image::Luma([128]));
        let edges = canny(&img, 50.0, 150.0);
        assert_eq!(edge_pixel_count(&edges), 0, "expected no edges in uniform image");
    }

    #[test]
    fn sharp_edge_detected_near_boundary() {
        let edges = canny(&sharp_edge_image(), 50.0, 150.0);
        assert!(edge_pixel_count(&edges) > 0, "expected edges at sharp boundary");
        for (x, _, p) in edges.enumerate_pixels() {
            if p.0[0] > 0 {
                assert!((7..=12).contains(&x), "edge pixel far from boundary at x={x}");
            }
        }
    }

    #[test]
    fn output_dimensions_match_input() {
        let edges = canny(&GrayImage::new(17, 31), 50.0, 150.0);
        assert_eq!((edges.width(), edges.height()), (17, 31));
    }

    #[test]
    fn zero_low_threshold_is_clamped_to_min() {
        let img = sharp_edge_image();
        assert_eq!(canny(&img, 0.0, 150.0), canny(&img, MIN_THRESHOLD, 150.0));
    }

    #[test]
    fn low_above_high_is_clamped() {
        let img = sharp_edge_image();
        assert_eq!(canny(&img, 200.0, 100.0), canny(&img, 100.0, 100.0));
    }

    #[test]
    fn enhanced_map_finds_square_outline() {
        let img = GrayImage::from_fn(60, 60, |x, y| {
            let inside = (20..40).contains(&x) && (20..40).contains(&y);
            image::Luma([if inside { 30 } else { 220 }])
        });
        let edges = enhanced_edge_map(&img, 1.0, 3.0);
        assert!(edge_pixel_count(&edges) > 0);
        assert_eq!(edges.get_pixel(5, 5).0[0], 0);
        assert_eq!(edges.get_pixel(30, 30).0[0], 0);
    }

    #[test]
    fn enhanced_map_of_uniform_image_is_empty() {
        let img = GrayImage::from_pixel(30, 30, image::Luma([200]));
        assert_eq!(edge_pixel_count(&enhanced_edge_map(&img, 1.0, 3.0)), 0);
    }

    #[test]
    fn edge_map_dispatches_on_preprocessing() {
        let img = sharp_edge_image();
        let plain = PipelineConfig::default();
        assert_eq!(edge_map(&img, &plain), canny(&img, plain.canny_low, plain.canny_high));
    }
}
