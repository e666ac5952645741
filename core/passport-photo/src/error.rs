use thiserror::Error;

/// Failures of the passport photo pipeline.
#[derive(Debug, Error)]
pub enum PassportPhotoError {
    /// The input bytes are not a supported image.
    #[error("failed to decode image: {0}")]
    DecodeError(String),

    /// The decoded image has no pixels.
    #[error("image dimensions are zero")]
    ZeroDimensions,

    /// No usable face was found in the photo.
    #[error("no face detected")]
    NoFaceDetected,

    /// A segmentation backend failed or produced an unusable mask.
    #[error("segmentation failed: {0}")]
    SegmentationError(String),

    /// The output frame could not be encoded.
    #[error("failed to encode image: {0}")]
    EncodeError(String),

    /// A zero-sized output frame was requested.
    #[error("target size must be non-zero, got {width}x{height}")]
    InvalidTargetSize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// JPEG quality outside `0.0..=1.0`.
    #[error("quality must be between 0.0 and 1.0, got {0}")]
    InvalidQuality(f32),

    /// The pipeline configuration is malformed or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A detector or segmentation model could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoad(String),
}

impl PassportPhotoError {
    /// Returns `true` when the failure is caused by the input image itself
    /// (undecodable bytes or no usable face) rather than by configuration or
    /// the processing backends.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::DecodeError(_) | Self::ZeroDimensions | Self::NoFaceDetected
        )
    }
}
