use std::sync::Arc;

use passport_photo::{PassportPhotoProcessor, PipelineConfig};

uniffi::setup_scaffolding!();

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PassportPhotoError {
    #[error("failed to decode image: {message}")]
    DecodeError { message: String },
    #[error("image dimensions are zero")]
    ZeroDimensions,
    #[error("no face detected")]
    NoFaceDetected,
    #[error("segmentation failed: {message}")]
    SegmentationError { message: String },
    #[error("failed to encode image: {message}")]
    EncodeError { message: String },
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
    #[error("failed to load model: {message}")]
    ModelLoad { message: String },
}

impl From<passport_photo::PassportPhotoError> for PassportPhotoError {
    fn from(e: passport_photo::PassportPhotoError) -> Self {
        use passport_photo::PassportPhotoError as Core;
        match e {
            Core::DecodeError(message) => PassportPhotoError::DecodeError { message },
            Core::ZeroDimensions => PassportPhotoError::ZeroDimensions,
            Core::NoFaceDetected => PassportPhotoError::NoFaceDetected,
            Core::SegmentationError(message) => PassportPhotoError::SegmentationError { message },
            Core::EncodeError(message) => PassportPhotoError::EncodeError { message },
            Core::ModelLoad(message) => PassportPhotoError::ModelLoad { message },
            Core::InvalidConfig(message) => PassportPhotoError::InvalidConfig { message },
            other @ (Core::InvalidTargetSize { .. } | Core::InvalidQuality(_)) => {
                PassportPhotoError::InvalidConfig {
                    message: other.to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl From<passport_photo::OutputFormat> for OutputFormat {
    fn from(format: passport_photo::OutputFormat) -> Self {
        match format {
            passport_photo::OutputFormat::Png => OutputFormat::Png,
            passport_photo::OutputFormat::Jpeg => OutputFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct FaceBounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl From<passport_photo::BoundingBox> for FaceBounds {
    fn from(b: passport_photo::BoundingBox) -> Self {
        FaceBounds {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
        }
    }
}

#[derive(Debug, uniffi::Record)]
pub struct ProcessedPhoto {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub original_size: u64,
    /// Face position in the output photo.
    pub face_bounds: FaceBounds,
    /// Face position in the uploaded photo.
    pub source_face: FaceBounds,
}

/// Long-lived pipeline instance; create once at startup and share.
#[derive(uniffi::Object)]
pub struct PassportPhotoService {
    processor: PassportPhotoProcessor,
}

#[uniffi::export]
impl PassportPhotoService {
    /// Load models and settings from a JSON pipeline configuration.
    #[uniffi::constructor]
    pub fn new(config_json: String) -> Result<Arc<Self>, PassportPhotoError> {
        let config = PipelineConfig::from_json_str(&config_json)?;
        let processor = PassportPhotoProcessor::from_config(&config)?;
        Ok(Arc::new(Self { processor }))
    }

    /// Turn an uploaded photo into a passport photo.
    pub fn process(&self, input: Vec<u8>) -> Result<ProcessedPhoto, PassportPhotoError> {
        let result = self.processor.process(&input)?;

        Ok(ProcessedPhoto {
            data: result.data,
            format: result.format.into(),
            width: result.width,
            height: result.height,
            original_size: result.original_size as u64,
            face_bounds: result.face_bounds.into(),
            source_face: result.source_face.into(),
        })
    }
}

impl PassportPhotoService {
    /// Wrap an already assembled processor (custom detectors, tests).
    pub fn with_processor(processor: PassportPhotoProcessor) -> Arc<Self> {
        Arc::new(Self { processor })
    }
}

/// Default pipeline configuration as pretty-printed JSON, a starting point
/// for host applications.
#[uniffi::export]
pub fn default_config_json() -> String {
    serde_json::to_string_pretty(&PipelineConfig::default()).unwrap_or_default()
}
