//! Lighting correction ahead of face detection.
//!
//! Equalizing the RGB channels independently shifts hue and saturation, so
//! only the L\* channel of CIE L\*a\*b\* is equalized and a\*/b\* are carried
//! through untouched.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::stats::cumulative_histogram;
use palette::{FromColor, IntoColor, Lab, LinSrgb, Srgb};

/// Scale between L\* (0–100) and its 8-bit representation.
const L_TO_BYTE: f32 = 255.0 / 100.0;

/// Equalize the lightness histogram of `image` in place.
pub fn equalize_lightness(image: &mut RgbImage) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let mut lightness = GrayImage::new(width, height);
    let mut chroma = Vec::with_capacity(width as usize * height as usize);

    for (pixel, l_out) in image.pixels().zip(lightness.pixels_mut()) {
        let lab = rgb_to_lab(pixel);
        *l_out = Luma([(lab.l * L_TO_BYTE).round().clamp(0.0, 255.0) as u8]);
        chroma.push((lab.a, lab.b));
    }

    let Some(lut) = equalization_table(&lightness) else {
        return;
    };

    for ((pixel, l_in), (a, b)) in image
        .pixels_mut()
        .zip(lightness.pixels())
        .zip(chroma.into_iter())
    {
        let l = lut[usize::from(l_in.0[0])];
        let lab = Lab::new(f32::from(l) / L_TO_BYTE, a, b);
        *pixel = lab_to_rgb(lab);
    }
}

/// Histogram equalization table mapping the darkest populated level to 0
/// and the brightest to 255: `round((cdf(v) − cdf_min) · 255 / (N − cdf_min))`.
///
/// `None` when a single level is populated, leaving the image as it was.
fn equalization_table(channel: &GrayImage) -> Option<[u8; 256]> {
    let cdf = &cumulative_histogram(channel).channels[0];
    let total = cdf[255];
    let cdf_min = cdf.iter().copied().find(|&c| c > 0)?;
    if cdf_min == total {
        return None;
    }

    let scale = 255.0 / f64::from(total - cdf_min);
    let mut lut = [0u8; 256];
    for (entry, &c) in lut.iter_mut().zip(cdf.iter()) {
        *entry = (f64::from(c.saturating_sub(cdf_min)) * scale)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    Some(lut)
}

fn rgb_to_lab(pixel: &Rgb<u8>) -> Lab {
    let srgb: Srgb<f32> = Srgb::new(
        f32::from(pixel[0]) / 255.0,
        f32::from(pixel[1]) / 255.0,
        f32::from(pixel[2]) / 255.0,
    );
    let lin: LinSrgb<f32> = srgb.into_linear();
    Lab::from_color(lin)
}

fn lab_to_rgb(lab: Lab) -> Rgb<u8> {
    let lin: LinSrgb<f32> = lab.into_color();
    let srgb: Srgb<f32> = Srgb::from_linear(lin);
    let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([to_byte(srgb.red), to_byte(srgb.green), to_byte(srgb.blue)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim_gradient(width: u32, height: u32) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            // Underexposed: everything squeezed into the bottom third.
            let v = ((x + y) * 80 / (width + height)) as u8;
            *pixel = Rgb([v + 10, v + 5, v]);
        }
        img
    }

    fn lightness_range(img: &RgbImage) -> (f32, f32) {
        img.pixels().map(|p| rgb_to_lab(p).l).fold(
            (f32::MAX, f32::MIN),
            |(lo, hi), l| (lo.min(l), hi.max(l)),
        )
    }

    #[test]
    fn stretches_lightness_of_dim_image() {
        let mut img = dim_gradient(64, 48);
        let (_, before_hi) = lightness_range(&img);
        equalize_lightness(&mut img);
        let (_, after_hi) = lightness_range(&img);
        assert!(after_hi > before_hi + 30.0, "{before_hi} -> {after_hi}");
    }

    #[test]
    fn neutral_pixels_stay_neutral() {
        let mut img = RgbImage::new(16, 16);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let v = (x * 8 + y) as u8;
            *pixel = Rgb([v, v, v]);
        }
        equalize_lightness(&mut img);
        for pixel in img.pixels() {
            let [r, g, b] = pixel.0;
            assert!((r as i16 - g as i16).abs() <= 2);
            assert!((g as i16 - b as i16).abs() <= 2);
        }
    }

    #[test]
    fn preserves_dimensions() {
        let mut img = dim_gradient(37, 11);
        equalize_lightness(&mut img);
        assert_eq!(img.dimensions(), (37, 11));
    }

    #[test]
    fn equalization_is_nearly_idempotent() {
        let mut once = dim_gradient(64, 64);
        equalize_lightness(&mut once);
        let mut twice = once.clone();
        equalize_lightness(&mut twice);

        let mut total = 0u64;
        let mut worst = 0u8;
        for (a, b) in once.as_raw().iter().zip(twice.as_raw()) {
            let d = a.abs_diff(*b);
            total += u64::from(d);
            worst = worst.max(d);
        }
        let mean = total as f64 / once.as_raw().len() as f64;
        assert!(mean < 3.0, "mean delta {mean}");
        assert!(worst <= 24, "max delta {worst}");
    }

    #[test]
    fn single_tone_image_is_untouched() {
        let mut img = RgbImage::from_pixel(24, 18, Rgb([120, 110, 100]));
        let before = img.clone();
        equalize_lightness(&mut img);
        assert_eq!(img, before);
    }

    #[test]
    fn darkest_level_maps_to_black() {
        let mut img = RgbImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Rgb([20, 20, 20])
            } else {
                Rgb([200, 200, 200])
            }
        });
        equalize_lightness(&mut img);
        let dark = img.get_pixel(0, 0).0;
        let light = img.get_pixel(19, 0).0;
        assert!(dark.iter().all(|&c| c <= 2), "dark half became {dark:?}");
        assert!(light.iter().all(|&c| c >= 253), "light half became {light:?}");
    }

    #[test]
    fn table_spans_full_range() {
        let channel = GrayImage::from_fn(4, 1, |x, _| Luma([[50, 50, 100, 200][x as usize]]));
        let lut = equalization_table(&channel).unwrap();
        assert_eq!(lut[50], 0);
        assert_eq!(lut[100], 128);
        assert_eq!(lut[200], 255);
        assert!(equalization_table(&GrayImage::from_pixel(3, 3, Luma([7]))).is_none());
    }

    #[test]
    fn empty_image_is_a_no_op() {
        let mut img = RgbImage::new(0, 0);
        equalize_lightness(&mut img);
        assert_eq!(img.dimensions(), (0, 0));
    }
}
