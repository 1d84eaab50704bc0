//! Image downsampling to a target working resolution.
//!
//! Phone photos routinely exceed 4000 pixels on the long axis. Marker and
//! window detection only need a fraction of that, so the decoded image is
//! shrunk until its longest axis matches `working_resolution` before any
//! detection runs. Measurements are ratios of pixel lengths within the same
//! image, so the scale change cancels out.
//!
//! If the image is already at or below the target resolution, it is
//! returned unchanged.

use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Resampling filter used when downsampling.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality,
/// with a `Disabled` variant to skip downsampling entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownsampleFilter {
    /// Skip downsampling regardless of image size.
    Disabled,
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest/best for photos.
    Lanczos3,
}

impl DownsampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    ///
    /// Returns `None` for [`DownsampleFilter::Disabled`] since there is no
    /// corresponding resampling filter.
    const fn to_image_filter(self) -> Option<image::imageops::FilterType> {
        match self {
            Self::Disabled => None,
            Self::Nearest => Some(image::imageops::FilterType::Nearest),
            Self::Triangle => Some(image::imageops::FilterType::Triangle),
            Self::CatmullRom => Some(image::imageops::FilterType::CatmullRom),
            Self::Gaussian => Some(image::imageops::FilterType::Gaussian),
            Self::Lanczos3 => Some(image::imageops::FilterType::Lanczos3),
        }
    }
}

impl fmt::Display for DownsampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Nearest => f.write_str("nearest"),
            Self::Triangle => f.write_str("triangle"),
            Self::CatmullRom => f.write_str("catmull_rom"),
            Self::Gaussian => f.write_str("gaussian"),
            Self::Lanczos3 => f.write_str("lanczos3"),
        }
    }
}

/// Downsample a decoded image so the longest axis is at most
/// `max_dimension` pixels, using the specified resampling filter.
///
/// A `max_dimension` of zero disables downsampling.
///
/// Returns the (possibly unchanged) image and whether downsampling
/// was actually applied.
#[must_use]
pub fn downsample(
    image: DynamicImage,
    max_dimension: u32,
    filter: DownsampleFilter,
) -> (DynamicImage, bool) {
    let Some(image_filter) = filter.to_image_filter() else {
        return (image, false);
    };

    let long_axis = image.width().max(image.height());
    if max_dimension == 0 || long_axis <= max_dimension {
        return (image, false);
    }

    let resized = image.resize(max_dimension, max_dimension, image_filter);
    (resized, true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_image(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            w,
            h,
            image::Rgba([128, 128, 128, 255]),
        ))
    }

    #[test]
    fn default_filter_is_triangle() {
        assert_eq!(DownsampleFilter::default(), DownsampleFilter::Triangle);
    }

    #[test]
    fn no_downsample_when_already_small() {
        let (result, applied) = downsample(test_image(100, 80), 256, DownsampleFilter::Triangle);
        assert!(!applied);
        assert_eq!((result.width(), result.height()), (100, 80));
    }

    #[test]
    fn no_downsample_when_exact_match() {
        let (result, applied) = downsample(test_image(256, 200), 256, DownsampleFilter::Triangle);
        assert!(!applied);
        assert_eq!((result.width(), result.height()), (256, 200));
    }

    #[test]
    fn downsample_landscape_preserves_aspect() {
        let (result, applied) = downsample(test_image(1024, 768), 256, DownsampleFilter::Triangle);
        assert!(applied);
        assert_eq!((result.width(), result.height()), (256, 192));
    }

    #[test]
    fn downsample_portrait_preserves_aspect() {
        let (result, applied) = downsample(test_image(600, 1200), 256, DownsampleFilter::Triangle);
        assert!(applied);
        assert_eq!((result.width(), result.height()), (128, 256));
    }

    #[test]
    fn disabled_filter_skips_even_large_image() {
        let (result, applied) = downsample(test_image(1024, 768), 256, DownsampleFilter::Disabled);
        assert!(!applied);
        assert_eq!((result.width(), result.height()), (1024, 768));
    }

    #[test]
    fn zero_resolution_skips() {
        let (result, applied) = downsample(test_image(1024, 768), 0, DownsampleFilter::Lanczos3);
        assert!(!applied);
        assert_eq!(result.width(), 1024);
    }

    #[test]
    fn filter_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DownsampleFilter::CatmullRom).unwrap(),
            "\"catmull_rom\""
        );
    }
}
