//! Learned foreground mask from a single-output saliency network.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use log::{debug, warn};
use tract_onnx::prelude::{
    tvec, DatumExt, Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact,
    TypedOp,
};

use super::{SegmentationHints, Segmenter};
use crate::error::PassportPhotoError;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Square input side used by U²-Net style models.
pub const DEFAULT_INPUT_SIZE: u32 = 320;

/// Segmenter backed by an ONNX saliency network run through tract.
#[derive(Debug)]
pub struct SaliencySegmenter {
    runnable: RunnableModel,
    input_size: u32,
}

impl SaliencySegmenter {
    /// Load and optimise the network at `path` for a `input_size`² RGB input.
    pub fn from_path(path: impl AsRef<Path>, input_size: u32) -> Result<Self, PassportPhotoError> {
        let path = path.as_ref();
        if input_size == 0 {
            return Err(PassportPhotoError::InvalidConfig(
                "saliency input size must be non-zero".to_string(),
            ));
        }
        if !path.exists() {
            return Err(PassportPhotoError::ModelLoad(format!(
                "saliency model not found: {}",
                path.display()
            )));
        }

        let runnable = match load_runnable(path, input_size, true) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(
                    "saliency model {} failed optimised load ({err}); using decluttered graph",
                    path.display()
                );
                load_runnable(path, input_size, false)?
            }
        };
        debug!(
            "saliency model {} ready at {input_size}x{input_size}",
            path.display()
        );

        Ok(Self {
            runnable,
            input_size,
        })
    }

    /// Side length of the square network input.
    pub fn input_size(&self) -> u32 {
        self.input_size
    }
}

fn load_runnable(
    path: &Path,
    input_size: u32,
    optimized: bool,
) -> Result<RunnableModel, PassportPhotoError> {
    let side = input_size as usize;
    let load_err = |e: &dyn std::fmt::Display| {
        PassportPhotoError::ModelLoad(format!("{}: {e}", path.display()))
    };

    let model = tract_onnx::onnx()
        .model_for_path(path)
        .map_err(|e| load_err(&e))?
        .with_input_fact(0, f32::fact([1, 3, side, side]).into())
        .map_err(|e| load_err(&e))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| load_err(&e))?
            .into_runnable()
            .map_err(|e| load_err(&e))
    } else {
        model
            .into_typed()
            .map_err(|e| load_err(&e))?
            .into_decluttered()
            .map_err(|e| load_err(&e))?
            .into_runnable()
            .map_err(|e| load_err(&e))
    }
}

impl Segmenter for SaliencySegmenter {
    fn segment(
        &self,
        canvas: &RgbImage,
        _hints: &SegmentationHints,
    ) -> Result<GrayImage, PassportPhotoError> {
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return Err(PassportPhotoError::SegmentationError(
                "canvas is empty".to_string(),
            ));
        }

        let side = self.input_size as usize;
        let data = canvas_to_chw(canvas, self.input_size);
        let input = Tensor::from_shape(&[1, 3, side, side], &data)
            .map_err(|e| PassportPhotoError::SegmentationError(format!("input tensor: {e}")))?;

        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| PassportPhotoError::SegmentationError(format!("inference: {e}")))?;
        let first = outputs
            .into_iter()
            .next()
            .ok_or_else(|| PassportPhotoError::SegmentationError("model produced no outputs".into()))?
            .into_tensor();
        let values = first
            .as_slice::<f32>()
            .map_err(|e| PassportPhotoError::SegmentationError(format!("output tensor: {e}")))?;

        saliency_to_mask(values, self.input_size, width, height)
    }
}

/// Resize to `side`² (bilinear) and lay out as planar RGB scaled to [0, 1].
pub(crate) fn canvas_to_chw(canvas: &RgbImage, side: u32) -> Vec<f32> {
    let resized = imageops::resize(canvas, side, side, FilterType::Triangle);
    let plane = (side * side) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = f32::from(pixel[c]) / 255.0;
        }
    }
    data
}

/// Min-max stretch a `side`² saliency map to bytes and scale it to
/// `width` x `height`.
pub(crate) fn saliency_to_mask(
    values: &[f32],
    side: u32,
    width: u32,
    height: u32,
) -> Result<GrayImage, PassportPhotoError> {
    let expected = (side as usize) * (side as usize);
    if values.len() != expected {
        return Err(PassportPhotoError::SegmentationError(format!(
            "saliency output has {} values, expected {expected}",
            values.len()
        )));
    }

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        warn!("saliency output is flat (min {min}, max {max}); treating all as background");
        return Ok(GrayImage::new(width, height));
    }

    let bytes: Vec<u8> = values
        .iter()
        .map(|&v| ((v - min) * 255.0 / range).round().clamp(0.0, 255.0) as u8)
        .collect();
    let small = GrayImage::from_raw(side, side, bytes).ok_or_else(|| {
        PassportPhotoError::SegmentationError("saliency buffer size mismatch".to_string())
    })?;

    Ok(imageops::resize(&small, width, height, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn chw_layout_is_planar_rgb() {
        let canvas = RgbImage::from_pixel(4, 4, Rgb([255, 0, 51]));
        let data = canvas_to_chw(&canvas, 2);
        assert_eq!(data.len(), 12);
        assert!(data[..4].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(data[4..8].iter().all(|&v| v == 0.0));
        assert!(data[8..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn output_is_stretched_to_full_range() {
        let values = [0.0, 0.2, 0.6, 1.0];
        let mask = saliency_to_mask(&values, 2, 2, 2).unwrap();
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert_eq!(mask.get_pixel(1, 0).0[0], 51);
        assert_eq!(mask.get_pixel(0, 1).0[0], 153);
        assert_eq!(mask.get_pixel(1, 1).0[0], 255);
    }

    #[test]
    fn mask_is_scaled_to_canvas() {
        let values: Vec<f32> = (0..16).map(|i| if i % 4 < 2 { 0.0 } else { 1.0 }).collect();
        let mask = saliency_to_mask(&values, 4, 70, 90).unwrap();
        assert_eq!(mask.dimensions(), (70, 90));
        assert_eq!(mask.get_pixel(0, 45).0[0], 0);
        assert_eq!(mask.get_pixel(69, 45).0[0], 255);
    }

    #[test]
    fn flat_output_is_background() {
        let values = [0.4f32; 9];
        let mask = saliency_to_mask(&values, 3, 10, 12).unwrap();
        assert_eq!(mask.dimensions(), (10, 12));
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn wrong_element_count_is_rejected() {
        let err = saliency_to_mask(&[0.0; 5], 2, 4, 4).unwrap_err();
        assert!(matches!(err, PassportPhotoError::SegmentationError(_)));
    }

    /// ONNX graph averaging the three input channels into a `[1, 1, S, S]`
    /// map, standing in for a trained saliency network.
    fn channel_mean_model() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/channel_mean.onnx")
    }

    #[test]
    fn network_output_becomes_canvas_mask() {
        let segmenter = SaliencySegmenter::from_path(channel_mean_model(), 8).unwrap();
        assert_eq!(segmenter.input_size(), 8);

        let canvas = RgbImage::from_fn(40, 50, |x, _| {
            if x < 20 {
                Rgb([10, 20, 30])
            } else {
                Rgb([200, 210, 220])
            }
        });
        let hints = SegmentationHints {
            face: crate::BoundingBox::new(10, 10, 20, 20),
        };
        let mask = segmenter.segment(&canvas, &hints).unwrap();

        assert_eq!(mask.dimensions(), (40, 50));
        assert_eq!(mask.get_pixel(0, 25).0[0], 0);
        assert_eq!(mask.get_pixel(39, 25).0[0], 255);
        for y in [0, 25, 49] {
            let row: Vec<u8> = (0..40).map(|x| mask.get_pixel(x, y).0[0]).collect();
            assert!(row.windows(2).all(|w| w[0] <= w[1]), "row {y}: {row:?}");
        }
    }

    #[test]
    fn uniform_canvas_yields_background() {
        let segmenter = SaliencySegmenter::from_path(channel_mean_model(), 8).unwrap();
        let canvas = RgbImage::from_pixel(16, 16, Rgb([90, 90, 90]));
        let hints = SegmentationHints {
            face: crate::BoundingBox::new(4, 4, 8, 8),
        };
        let mask = segmenter.segment(&canvas, &hints).unwrap();
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn missing_model_file_is_reported() {
        let err = SaliencySegmenter::from_path("/nonexistent/u2net.onnx", DEFAULT_INPUT_SIZE)
            .unwrap_err();
        assert!(matches!(err, PassportPhotoError::ModelLoad(_)));
    }
}
