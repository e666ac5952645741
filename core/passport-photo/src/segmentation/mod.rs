//! Foreground/background separation on the composed canvas.
//!
//! Two interchangeable strategies implement [`Segmenter`]:
//!
//! - [`SaliencySegmenter`] runs a learned saliency network (feature
//!   `saliency`).
//! - [`EnergyCutSegmenter`] estimates a body region from the face and runs an
//!   iterative colour-model graph cut.
//!
//! Which one a processor uses is chosen by [`SegmentationStrategy`].

mod gmm;
mod grabcut;
/// Boykov–Kolmogorov max-flow / min-cut on sparse graphs.
pub mod maxflow;
#[cfg(feature = "saliency")]
mod saliency;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::PassportPhotoError;
use crate::geometry::BoundingBox;

pub use grabcut::{estimate_body_region, EnergyCutSegmenter, EnergyCutSettings};
#[cfg(feature = "saliency")]
pub use saliency::{SaliencySegmenter, DEFAULT_INPUT_SIZE};

/// Side information available to a segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationHints {
    /// The selected face in canvas coordinates.
    pub face: BoundingBox,
}

/// Produces a foreground mask for a canvas.
///
/// Implementations must be shareable across request threads. The returned
/// mask has the canvas dimensions; non-zero means foreground.
pub trait Segmenter: Send + Sync {
    /// Segment `canvas` into foreground and background.
    fn segment(
        &self,
        canvas: &RgbImage,
        hints: &SegmentationHints,
    ) -> Result<GrayImage, PassportPhotoError>;
}

/// Which segmentation backend a configured processor builds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationStrategy {
    /// Learned saliency mask (needs a model file).
    #[default]
    Saliency,
    /// Body-estimate graph cut.
    EnergyCut,
}

/// Build the segmenter selected by `config`, loading model files as needed.
pub fn build_segmenter(config: &PipelineConfig) -> Result<Box<dyn Segmenter>, PassportPhotoError> {
    match config.segmentation {
        SegmentationStrategy::EnergyCut => Ok(Box::new(EnergyCutSegmenter::new(config.energy_cut))),
        SegmentationStrategy::Saliency => build_saliency(config),
    }
}

#[cfg(feature = "saliency")]
fn build_saliency(config: &PipelineConfig) -> Result<Box<dyn Segmenter>, PassportPhotoError> {
    let path = config.models.saliency.as_ref().ok_or_else(|| {
        PassportPhotoError::InvalidConfig(
            "saliency segmentation requires models.saliency to be set".to_string(),
        )
    })?;
    Ok(Box::new(SaliencySegmenter::from_path(
        path,
        config.saliency_input_size,
    )?))
}

#[cfg(not(feature = "saliency"))]
fn build_saliency(_config: &PipelineConfig) -> Result<Box<dyn Segmenter>, PassportPhotoError> {
    Err(PassportPhotoError::InvalidConfig(
        "saliency segmentation is not available in this build".to_string(),
    ))
}

/// Run `segmenter` and check the mask it returns fits the canvas.
pub(crate) fn segment_canvas(
    segmenter: &dyn Segmenter,
    canvas: &RgbImage,
    hints: &SegmentationHints,
) -> Result<GrayImage, PassportPhotoError> {
    let mask = segmenter.segment(canvas, hints)?;
    if mask.dimensions() != canvas.dimensions() {
        return Err(PassportPhotoError::SegmentationError(format!(
            "mask is {}x{} but canvas is {}x{}",
            mask.width(),
            mask.height(),
            canvas.width(),
            canvas.height()
        )));
    }
    Ok(mask)
}
