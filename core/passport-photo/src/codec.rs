use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, RgbImage, RgbaImage};

use crate::error::PassportPhotoError;
use crate::OutputFormat;

/// Detect the input image format from the raw bytes.
pub(crate) fn detect_format(input: &[u8]) -> Result<ImageFormat, PassportPhotoError> {
    image::guess_format(input).map_err(|e| PassportPhotoError::DecodeError(e.to_string()))
}

/// Decode input bytes into a 3-channel image.
///
/// Inputs carrying an alpha channel are composited onto white so that
/// transparent regions read as background for the later stages.
pub(crate) fn decode_image(input: &[u8]) -> Result<RgbImage, PassportPhotoError> {
    let decoded =
        image::load_from_memory(input).map_err(|e| PassportPhotoError::DecodeError(e.to_string()))?;

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(PassportPhotoError::ZeroDimensions);
    }

    if decoded.color().has_alpha() {
        Ok(flatten_alpha(&decoded))
    } else {
        Ok(decoded.into_rgb8())
    }
}

/// Flatten alpha channel by compositing onto a white background.
pub(crate) fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    let rgba: RgbaImage = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = f32::from(a) / 255.0;
        let inv_alpha = 1.0 - alpha;
        let over_white = |c: u8| (f32::from(c) * alpha + 255.0 * inv_alpha).round() as u8;
        rgb.put_pixel(x, y, image::Rgb([over_white(r), over_white(g), over_white(b)]));
    }

    rgb
}

/// Encode the final image in the requested container.
///
/// `quality` (0.0–1.0) only affects JPEG; PNG is always lossless.
pub(crate) fn encode_image(
    image: &RgbImage,
    format: &OutputFormat,
    quality: f32,
) -> Result<Vec<u8>, PassportPhotoError> {
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Png => {
            let encoder = PngEncoder::new(&mut buffer);
            encoder
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|e| PassportPhotoError::EncodeError(e.to_string()))?;
        }
        OutputFormat::Jpeg => {
            let quality_percent = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality_percent);
            encoder
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|e| PassportPhotoError::EncodeError(e.to_string()))?;
        }
    }

    Ok(buffer)
}
