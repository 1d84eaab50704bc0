//! Gaussian blur and difference-of-Gaussians.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`] to smooth images,
//! reducing high-frequency noise that would produce spurious edges and
//! ragged marker outlines.
//!
//! [`difference_of_gaussians`] is a band-pass response used by the
//! edge-enhanced preprocessing to mask out texture that survives Canny.

use image::GrayImage;

/// Apply Gaussian blur to a grayscale image.
///
/// Higher `sigma` values produce more smoothing. Non-positive sigma values
/// (zero or negative) return the image unchanged, since `imageproc`'s
/// underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Absolute difference of two Gaussian blurs, stretched to `0..=255`.
///
/// A uniform response (including an all-zero one) maps to all zeros.
#[must_use = "returns the band-pass response"]
pub fn difference_of_gaussians(image: &GrayImage, inner_sigma: f32, outer_sigma: f32) -> GrayImage {
    let inner = gaussian_blur(image, inner_sigma);
    let outer = gaussian_blur(image, outer_sigma);

    let diff: Vec<u8> = inner
        .as_raw()
        .iter()
        .zip(outer.as_raw())
        .map(|(&a, &b)| a.abs_diff(b))
        .collect();

    let (min, max) = diff
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max <= min {
        return GrayImage::new(image.width(), image.height());
    }

    let range = u32::from(max - min);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let idx = (y as usize) * (image.width() as usize) + x as usize;
        let stretched = u32::from(diff[idx] - min) * 255 / range;
        image::Luma([u8::try_from(stretched).unwrap_or(u8::MAX)])
    })
}
