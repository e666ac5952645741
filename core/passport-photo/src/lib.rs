//! Passport photo normalization: centre the subject's face on a fixed-size
//! canvas and replace the background with solid white.
//!
//! # Example
//!
//! ```no_run
//! use passport_photo::{PassportPhotoProcessor, PipelineConfig};
//!
//! let config = PipelineConfig::load_from_path("passport.json").unwrap();
//! # #[cfg(feature = "rustface")]
//! # {
//! let processor = PassportPhotoProcessor::from_config(&config).unwrap();
//!
//! let raw_bytes = std::fs::read("photo.jpg").unwrap();
//! let photo = processor.process(&raw_bytes).unwrap();
//! println!("{}x{}, {} bytes", photo.width, photo.height, photo.data.len());
//! # }
//! ```
//!
//! Loading models from a configuration file needs the default `rustface`
//! feature; without it, pass your own detector to
//! [`PassportPhotoProcessor::from_config_with_detector`].
#![warn(missing_docs)]

mod codec;
mod composite;
/// Serializable pipeline configuration.
pub mod config;
mod crop;
mod error;
/// Face detection traits and data types.
pub mod face_detector;
mod geometry;
mod normalize;
mod pipeline;
/// Mask morphology and thresholding.
pub mod refine;
#[cfg(feature = "rustface")]
/// Built-in SeetaFace-based face detector backend.
pub mod rustface_backend;
/// Segmentation backends.
pub mod segmentation;
/// Stage timing helpers.
pub mod telemetry;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Background compositing.
pub use composite::apply_white_background;
/// Pipeline configuration document.
pub use config::{ModelPaths, OutputSettings, PipelineConfig};
/// Canvas geometry for the face-centred frame.
pub use crop::{compose_canvas, plan_canvas, CanvasPlacement, FramedCanvas};
/// Error type returned by passport-photo operations.
pub use error::PassportPhotoError;
/// Face detection trait and candidate type.
pub use face_detector::{locate_face, select_largest_face, FaceCandidate, FaceDetector};
/// Pixel geometry types.
pub use geometry::{BoundingBox, TargetSize};
/// Lightness normalization applied before detection.
pub use normalize::equalize_lightness;
/// Mask refinement settings.
pub use refine::{refine_mask, RefineSettings};
#[cfg(feature = "rustface")]
/// Built-in detector backed by a SeetaFace model file.
pub use rustface_backend::{RustfaceDetector, RustfaceSettings};
/// Segmentation trait, hints and backends.
pub use segmentation::{
    build_segmenter, EnergyCutSegmenter, EnergyCutSettings, SegmentationHints,
    SegmentationStrategy, Segmenter,
};
#[cfg(feature = "saliency")]
/// Learned saliency segmenter.
pub use segmentation::SaliencySegmenter;

/// Output image format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless PNG.
    #[default]
    Png,

    /// JPEG encoding.
    Jpeg,
}

/// Result of processing one photo.
#[derive(Debug, Clone)]
pub struct PassportPhoto {
    /// The encoded image bytes.
    pub data: Vec<u8>,

    /// The output format used.
    pub format: OutputFormat,

    /// Width of the output image in pixels.
    pub width: u32,

    /// Height of the output image in pixels.
    pub height: u32,

    /// Size of the original input in bytes.
    pub original_size: usize,

    /// Selected face in output image coordinates.
    pub face_bounds: BoundingBox,

    /// Selected face in input image coordinates.
    pub source_face: BoundingBox,
}

/// Turns arbitrary photos of a person into passport photos.
///
/// Holds the face detector and segmenter handles plus the frame and encoding
/// settings. Processing takes `&self`, so one processor can serve many
/// threads behind an `Arc`.
pub struct PassportPhotoProcessor {
    detector: Box<dyn FaceDetector>,
    segmenter: Box<dyn Segmenter>,
    target: TargetSize,
    refine: RefineSettings,
    format: OutputFormat,
    jpeg_quality: f32,
}

impl PassportPhotoProcessor {
    /// Create a processor from explicit detector and segmenter handles with
    /// default frame (700×900) and PNG output.
    ///
    /// ```no_run
    /// use passport_photo::{
    ///     BoundingBox, EnergyCutSegmenter, FaceCandidate, FaceDetector, PassportPhotoProcessor,
    /// };
    ///
    /// struct MyDetector;
    /// impl FaceDetector for MyDetector {
    ///     fn detect(&self, _image: &image::RgbImage) -> Vec<FaceCandidate> {
    ///         vec![FaceCandidate::new(BoundingBox::new(120, 80, 200, 240), 1.0)]
    ///     }
    /// }
    ///
    /// let processor = PassportPhotoProcessor::new(
    ///     Box::new(MyDetector),
    ///     Box::new(EnergyCutSegmenter::default()),
    /// );
    /// let bytes = std::fs::read("photo.jpg").unwrap();
    /// let photo = processor.process(&bytes).unwrap();
    /// ```
    pub fn new(detector: Box<dyn FaceDetector>, segmenter: Box<dyn Segmenter>) -> Self {
        let output = OutputSettings::default();
        Self {
            detector,
            segmenter,
            target: TargetSize::default(),
            refine: RefineSettings::default(),
            format: output.format,
            jpeg_quality: output.jpeg_quality,
        }
    }

    /// Build a processor entirely from `config`, loading the face detector
    /// model and the configured segmentation backend from disk.
    #[cfg(feature = "rustface")]
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PassportPhotoError> {
        config.validate()?;
        let path = config.models.face_detector.as_ref().ok_or_else(|| {
            PassportPhotoError::InvalidConfig(
                "models.face_detector must point to a SeetaFace model".to_string(),
            )
        })?;
        let detector = RustfaceDetector::from_path(path)?;
        Self::from_config_with_detector(config, Box::new(detector))
    }

    /// Build a processor from `config` with a caller-supplied face detector.
    pub fn from_config_with_detector(
        config: &PipelineConfig,
        detector: Box<dyn FaceDetector>,
    ) -> Result<Self, PassportPhotoError> {
        config.validate()?;
        let segmenter = build_segmenter(config)?;
        Ok(Self::new(detector, segmenter).config(config))
    }

    /// Apply the frame, refinement and output sections of `config`.
    ///
    /// Model paths and the segmentation strategy are not re-read; use
    /// [`PassportPhotoProcessor::from_config`] to rebuild the handles.
    pub fn config(mut self, config: &PipelineConfig) -> Self {
        self.target = config.target;
        self.refine = config.refine;
        self.format = config.output.format;
        self.jpeg_quality = config.output.jpeg_quality;
        self
    }

    /// Set the output canvas size (default: 700×900).
    pub fn target_size(mut self, target: TargetSize) -> Self {
        self.target = target;
        self
    }

    /// Set the output format (default: `OutputFormat::Png`).
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the JPEG quality from 0.0 (lowest) to 1.0 (highest).
    /// Default: 0.9.
    pub fn jpeg_quality(mut self, quality: f32) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Set the mask refinement parameters.
    pub fn refine_settings(mut self, settings: RefineSettings) -> Self {
        self.refine = settings;
        self
    }

    /// The configured output canvas size.
    pub fn target(&self) -> TargetSize {
        self.target
    }

    /// Decode `input`, produce the passport photo and encode it.
    pub fn process(&self, input: &[u8]) -> Result<PassportPhoto, PassportPhotoError> {
        self.validate()?;
        codec::detect_format(input)?;
        pipeline::run_pipeline(input, &self.params())
    }

    /// Run the pixel stages on an already decoded image.
    pub fn process_image(&self, image: RgbImage) -> Result<RgbImage, PassportPhotoError> {
        self.validate()?;
        pipeline::render(image, &self.params()).map(|rendered| rendered.image)
    }

    fn params(&self) -> pipeline::PipelineParams<'_> {
        pipeline::PipelineParams {
            target: self.target,
            refine: &self.refine,
            format: self.format,
            jpeg_quality: self.jpeg_quality,
            detector: self.detector.as_ref(),
            segmenter: self.segmenter.as_ref(),
        }
    }

    fn validate(&self) -> Result<(), PassportPhotoError> {
        if self.target.width == 0 || self.target.height == 0 {
            return Err(PassportPhotoError::InvalidTargetSize {
                width: self.target.width,
                height: self.target.height,
            });
        }
        if !(0.0..=1.0).contains(&self.jpeg_quality) {
            return Err(PassportPhotoError::InvalidQuality(self.jpeg_quality));
        }
        self.refine.validate()
    }
}
