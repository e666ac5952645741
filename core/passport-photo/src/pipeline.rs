use image::RgbImage;
use log::{debug, Level};

use crate::codec::{decode_image, encode_image};
use crate::composite::apply_white_background;
use crate::crop::{compose_canvas, CanvasPlacement};
use crate::error::PassportPhotoError;
use crate::face_detector::{locate_face, FaceDetector};
use crate::geometry::{BoundingBox, TargetSize};
use crate::normalize::equalize_lightness;
use crate::refine::{refine_mask, RefineSettings};
use crate::segmentation::{segment_canvas, SegmentationHints, Segmenter};
use crate::telemetry::timing_guard;
use crate::{OutputFormat, PassportPhoto};

/// Everything a single run needs, borrowed from the processor.
pub(crate) struct PipelineParams<'a> {
    pub target: TargetSize,
    pub refine: &'a RefineSettings,
    pub format: OutputFormat,
    pub jpeg_quality: f32,
    pub detector: &'a dyn FaceDetector,
    pub segmenter: &'a dyn Segmenter,
}

/// A finished frame before encoding.
#[derive(Debug, Clone)]
pub(crate) struct RenderedPhoto {
    pub image: RgbImage,
    pub placement: CanvasPlacement,
    pub source_face: BoundingBox,
    pub canvas_face: BoundingBox,
}

/// Decode, render and encode one photo.
pub(crate) fn run_pipeline(
    input: &[u8],
    params: &PipelineParams<'_>,
) -> Result<PassportPhoto, PassportPhotoError> {
    let _total = timing_guard("pipeline", Level::Debug);

    let decoded = {
        let _t = timing_guard("decode", Level::Debug);
        decode_image(input)?
    };
    debug!(
        "decoded {} byte input as {}x{}",
        input.len(),
        decoded.width(),
        decoded.height()
    );

    let rendered = render(decoded, params)?;

    let data = {
        let _t = timing_guard("encode", Level::Debug);
        encode_image(&rendered.image, &params.format, params.jpeg_quality)?
    };
    debug!("encoded {:?} output: {} bytes", params.format, data.len());

    Ok(PassportPhoto {
        data,
        format: params.format,
        width: rendered.image.width(),
        height: rendered.image.height(),
        original_size: input.len(),
        face_bounds: rendered.canvas_face,
        source_face: rendered.source_face,
    })
}

/// Run every pixel stage on an already decoded image.
pub(crate) fn render(
    mut image: RgbImage,
    params: &PipelineParams<'_>,
) -> Result<RenderedPhoto, PassportPhotoError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PassportPhotoError::ZeroDimensions);
    }

    {
        let _t = timing_guard("normalize", Level::Debug);
        equalize_lightness(&mut image);
    }

    let face = {
        let _t = timing_guard("locate face", Level::Debug);
        locate_face(params.detector, &image)?
    };

    let framed = {
        let _t = timing_guard("compose canvas", Level::Debug);
        compose_canvas(&image, &face.bounds, params.target)
    };
    debug!(
        "canvas placement {:?}, face on canvas {:?}",
        framed.placement, framed.face
    );

    let hints = SegmentationHints { face: framed.face };
    let raw_mask = {
        let _t = timing_guard("segment", Level::Debug);
        segment_canvas(params.segmenter, &framed.image, &hints)?
    };

    let mask = {
        let _t = timing_guard("refine mask", Level::Debug);
        refine_mask(&raw_mask, params.refine)
    };

    let composed = {
        let _t = timing_guard("composite", Level::Debug);
        apply_white_background(&framed.image, &mask)?
    };

    Ok(RenderedPhoto {
        image: composed,
        placement: framed.placement,
        source_face: face.bounds,
        canvas_face: framed.face,
    })
}
