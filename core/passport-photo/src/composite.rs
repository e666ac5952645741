use image::{GrayImage, Rgb, RgbImage};

use crate::error::PassportPhotoError;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Keep canvas pixels where `mask` is non-zero and paint the rest white.
pub fn apply_white_background(
    canvas: &RgbImage,
    mask: &GrayImage,
) -> Result<RgbImage, PassportPhotoError> {
    if canvas.dimensions() != mask.dimensions() {
        return Err(PassportPhotoError::SegmentationError(format!(
            "mask is {}x{} but canvas is {}x{}",
            mask.width(),
            mask.height(),
            canvas.width(),
            canvas.height()
        )));
    }

    let mut out = RgbImage::from_pixel(canvas.width(), canvas.height(), WHITE);
    for ((dst, src), m) in out.pixels_mut().zip(canvas.pixels()).zip(mask.pixels()) {
        if m.0[0] != 0 {
            *dst = *src;
        }
    }
    Ok(out)
}
