//! Mask clean-up: morphological close and open, blur, hard threshold.

use image::{GrayImage, Luma};
use imageproc::contrast::{threshold_mut, ThresholdType};
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{grayscale_close, grayscale_open, Mask};
use serde::{Deserialize, Serialize};

use crate::error::PassportPhotoError;

/// Parameters of [`refine_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineSettings {
    /// Side of the elliptical structuring element (odd).
    pub kernel_size: u32,
    /// Gaussian kernel side (odd); the blur sigma is derived from it.
    pub blur_kernel_size: u32,
    /// Values strictly above this become 255, the rest 0.
    pub threshold: u8,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            kernel_size: 5,
            blur_kernel_size: 9,
            threshold: 128,
        }
    }
}

impl RefineSettings {
    /// Reject even or zero kernel sizes, and structuring elements wider
    /// than [`MAX_KERNEL_SIZE`].
    pub fn validate(&self) -> Result<(), PassportPhotoError> {
        for (name, size) in [
            ("kernel_size", self.kernel_size),
            ("blur_kernel_size", self.blur_kernel_size),
        ] {
            if size == 0 || size % 2 == 0 {
                return Err(PassportPhotoError::InvalidConfig(format!(
                    "refine.{name} must be odd and positive, got {size}"
                )));
            }
        }
        if self.kernel_size > MAX_KERNEL_SIZE {
            return Err(PassportPhotoError::InvalidConfig(format!(
                "refine.kernel_size must be at most {MAX_KERNEL_SIZE}, got {}",
                self.kernel_size
            )));
        }
        Ok(())
    }

    /// Blur sigma for the configured kernel size.
    pub fn blur_sigma(&self) -> f32 {
        let k = self.blur_kernel_size as f32;
        0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
    }
}

/// Largest kernel side [`Mask::from_image`] accepts with a centred anchor.
pub const MAX_KERNEL_SIZE: u32 = 511;

/// Ellipse inscribed in a `size` x `size` square, set cells 255.
///
/// Each row `i` spans `c ± round(c · sqrt(1 − (i − r)² / r²))`, the rule
/// common image libraries use for elliptical kernels.
pub fn elliptical_kernel(size: u32) -> GrayImage {
    let size = size.clamp(1, MAX_KERNEL_SIZE);
    let r = (size / 2) as i32;
    let inv_r2 = if r > 0 { 1.0 / f64::from(r * r) } else { 0.0 };

    let mut kernel = GrayImage::new(size, size);
    for i in 0..size as i32 {
        let dy = i - r;
        let dx = if r > 0 {
            (f64::from(r) * (f64::from(r * r - dy * dy) * inv_r2).max(0.0).sqrt()).round() as i32
        } else {
            0
        };
        let lo = (r - dx).max(0);
        let hi = (r + dx + 1).min(size as i32);
        for j in lo..hi {
            kernel.put_pixel(j as u32, i as u32, Luma([255]));
        }
    }
    kernel
}

/// [`elliptical_kernel`] anchored at its centre, ready for the
/// `imageproc` morphology operators.
pub fn ellipse_mask(size: u32) -> Mask {
    let kernel = elliptical_kernel(size);
    let anchor = (kernel.width() / 2) as u8;
    Mask::from_image(&kernel, anchor, anchor)
}

/// Close, open, blur and threshold a raw segmentation mask.
///
/// The result has the input's dimensions and contains only 0 and 255.
pub fn refine_mask(mask: &GrayImage, settings: &RefineSettings) -> GrayImage {
    let element = ellipse_mask(settings.kernel_size);
    let closed = grayscale_close(mask, &element);
    let opened = grayscale_open(&closed, &element);
    let mut blurred = gaussian_blur_f32(&opened, settings.blur_sigma());
    threshold_mut(&mut blurred, settings.threshold, ThresholdType::Binary);
    blurred
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::morphology::{grayscale_dilate, grayscale_erode};

    fn kernel_rows(kernel: &GrayImage) -> Vec<String> {
        kernel
            .rows()
            .map(|row| row.map(|p| if p.0[0] == 255 { '1' } else { '0' }).collect())
            .collect()
    }

    #[test]
    fn five_by_five_ellipse_shape() {
        let rows = kernel_rows(&elliptical_kernel(5));
        assert_eq!(rows, vec!["00100", "11111", "11111", "11111", "00100"]);
    }

    #[test]
    fn three_by_three_ellipse_is_a_cross() {
        let rows = kernel_rows(&elliptical_kernel(3));
        assert_eq!(rows, vec!["010", "111", "010"]);
    }

    #[test]
    fn oversized_kernel_is_clamped() {
        assert_eq!(elliptical_kernel(2001).dimensions(), (511, 511));
        assert_eq!(elliptical_kernel(0).dimensions(), (1, 1));
    }

    #[test]
    fn ellipse_mask_is_anchored_at_centre() {
        // Dilating a single lit pixel stamps the kernel around it.
        let mut point = GrayImage::new(9, 9);
        point.put_pixel(4, 4, Luma([255]));
        let stamped = grayscale_dilate(&point, &ellipse_mask(5));

        let mut expected = GrayImage::new(9, 9);
        image::imageops::replace(&mut expected, &elliptical_kernel(5), 2, 2);
        assert_eq!(stamped, expected);
    }

    #[test]
    fn unit_kernel_is_identity() {
        let element = ellipse_mask(1);
        let mask = GrayImage::from_fn(6, 4, |x, y| Luma([(x * 40 + y) as u8]));
        assert_eq!(grayscale_dilate(&mask, &element), mask);
        assert_eq!(grayscale_erode(&mask, &element), mask);
    }

    #[test]
    fn close_fills_small_holes() {
        let mut mask = GrayImage::from_pixel(30, 30, Luma([255]));
        mask.put_pixel(15, 15, Luma([0]));
        mask.put_pixel(16, 15, Luma([0]));
        let closed = grayscale_close(&mask, &ellipse_mask(5));
        assert!(closed.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn open_removes_specks() {
        let mut mask = GrayImage::new(30, 30);
        mask.put_pixel(5, 5, Luma([255]));
        mask.put_pixel(20, 21, Luma([255]));
        let opened = grayscale_open(&mask, &ellipse_mask(5));
        assert!(opened.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn erosion_ignores_outside_samples() {
        let mask = GrayImage::from_pixel(8, 8, Luma([200]));
        let eroded = grayscale_erode(&mask, &ellipse_mask(5));
        assert_eq!(eroded.get_pixel(0, 0).0[0], 200);
    }

    #[test]
    fn speck_and_hole_are_cleaned_in_one_pass() {
        let mut mask = GrayImage::from_fn(40, 40, |x, _| Luma([if x < 20 { 255 } else { 0 }]));
        mask.put_pixel(8, 8, Luma([0]));
        mask.put_pixel(32, 30, Luma([255]));
        let refined = refine_mask(&mask, &RefineSettings::default());
        assert_eq!(refined.get_pixel(8, 8).0[0], 255);
        assert_eq!(refined.get_pixel(32, 30).0[0], 0);
    }

    #[test]
    fn refined_mask_is_binary() {
        let mask = GrayImage::from_fn(64, 80, |x, y| {
            let dx = x as f32 - 32.0;
            let dy = y as f32 - 40.0;
            Luma([(255.0 - (dx * dx + dy * dy).sqrt() * 6.0).clamp(0.0, 255.0) as u8])
        });
        let refined = refine_mask(&mask, &RefineSettings::default());
        assert_eq!(refined.dimensions(), (64, 80));
        assert!(refined.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(refined.get_pixel(32, 40).0[0], 255);
        assert_eq!(refined.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn solid_block_survives_refinement() {
        let mask = GrayImage::from_fn(60, 60, |x, y| {
            Luma([if (15..45).contains(&x) && (15..45).contains(&y) { 255 } else { 0 }])
        });
        let refined = refine_mask(&mask, &RefineSettings::default());
        assert_eq!(refined.get_pixel(30, 30).0[0], 255);
        assert_eq!(refined.get_pixel(16, 30).0[0], 255);
        assert_eq!(refined.get_pixel(5, 5).0[0], 0);
    }

    #[test]
    fn threshold_is_strict() {
        // 128 sits exactly on the threshold and must not survive.
        let mask = GrayImage::from_pixel(12, 12, Luma([128]));
        let refined = refine_mask(&mask, &RefineSettings::default());
        assert!(refined.pixels().all(|p| p.0[0] == 0));

        let mask = GrayImage::from_pixel(12, 12, Luma([130]));
        let refined = refine_mask(&mask, &RefineSettings::default());
        assert!(refined.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn sigma_follows_kernel_size() {
        let settings = RefineSettings::default();
        assert!((settings.blur_sigma() - 1.7).abs() < 1e-6);
    }

    #[test]
    fn even_kernels_are_rejected() {
        let settings = RefineSettings {
            kernel_size: 4,
            ..RefineSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(PassportPhotoError::InvalidConfig(_))
        ));
        let huge = RefineSettings {
            kernel_size: 513,
            ..RefineSettings::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(PassportPhotoError::InvalidConfig(_))
        ));
        assert!(RefineSettings::default().validate().is_ok());
    }
}
