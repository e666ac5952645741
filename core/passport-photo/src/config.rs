//! Serializable pipeline configuration.
//!
//! Every section uses `#[serde(default)]`, so a JSON document only needs to
//! name the values it overrides:
//!
//! ```json
//! {
//!   "segmentation": "energy_cut",
//!   "models": { "face_detector": "models/seeta_fd_frontal_v1.0.bin" },
//!   "output": { "format": "jpeg", "jpeg_quality": 0.85 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PassportPhotoError;
use crate::geometry::TargetSize;
use crate::refine::RefineSettings;
use crate::segmentation::{EnergyCutSettings, SegmentationStrategy};
use crate::OutputFormat;

/// Square input side of the saliency network.
const DEFAULT_SALIENCY_INPUT: u32 = 320;

/// Locations of model files loaded by [`crate::PassportPhotoProcessor::from_config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    /// SeetaFace frontal detector model.
    pub face_detector: Option<PathBuf>,
    /// ONNX saliency network.
    pub saliency: Option<PathBuf>,
}

/// Encoding of the final photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Container format.
    pub format: OutputFormat,
    /// JPEG quality in `[0, 1]`; ignored for PNG.
    pub jpeg_quality: f32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            jpeg_quality: 0.9,
        }
    }
}

/// Complete configuration of a passport photo pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output canvas size.
    pub target: TargetSize,
    /// Segmentation backend.
    pub segmentation: SegmentationStrategy,
    /// Model files.
    pub models: ModelPaths,
    /// Side of the square saliency network input.
    pub saliency_input_size: u32,
    /// Graph cut tuning.
    pub energy_cut: EnergyCutSettings,
    /// Mask clean-up.
    pub refine: RefineSettings,
    /// Encoding.
    pub output: OutputSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: TargetSize::default(),
            segmentation: SegmentationStrategy::default(),
            models: ModelPaths::default(),
            saliency_input_size: DEFAULT_SALIENCY_INPUT,
            energy_cut: EnergyCutSettings::default(),
            refine: RefineSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, PassportPhotoError> {
        let config: PipelineConfig = serde_json::from_str(json)
            .map_err(|e| PassportPhotoError::InvalidConfig(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, PassportPhotoError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            PassportPhotoError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&contents).map_err(|e| match e {
            PassportPhotoError::InvalidConfig(msg) => {
                PassportPhotoError::InvalidConfig(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), PassportPhotoError> {
        let path = path.as_ref();
        let payload = serde_json::to_string_pretty(self)
            .map_err(|e| PassportPhotoError::InvalidConfig(format!("failed to serialize: {e}")))?;
        fs::write(path, payload).map_err(|e| {
            PassportPhotoError::InvalidConfig(format!("failed to write {}: {e}", path.display()))
        })
    }

    /// Check value ranges without touching any model file.
    pub fn validate(&self) -> Result<(), PassportPhotoError> {
        if self.target.width == 0 || self.target.height == 0 {
            return Err(PassportPhotoError::InvalidTargetSize {
                width: self.target.width,
                height: self.target.height,
            });
        }
        let quality = self.output.jpeg_quality;
        if !(0.0..=1.0).contains(&quality) {
            return Err(PassportPhotoError::InvalidQuality(quality));
        }
        if self.saliency_input_size == 0 {
            return Err(PassportPhotoError::InvalidConfig(
                "saliency_input_size must be non-zero".to_string(),
            ));
        }
        if self.energy_cut.iterations == 0 {
            return Err(PassportPhotoError::InvalidConfig(
                "energy_cut.iterations must be at least 1".to_string(),
            ));
        }
        if self.energy_cut.max_working_dimension == 0 {
            return Err(PassportPhotoError::InvalidConfig(
                "energy_cut.max_working_dimension must be non-zero".to_string(),
            ));
        }
        self.refine.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_passport_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.target, TargetSize::new(700, 900));
        assert_eq!(config.segmentation, SegmentationStrategy::Saliency);
        assert_eq!(config.saliency_input_size, 320);
        assert_eq!(config.energy_cut.iterations, 5);
        assert_eq!(config.refine.kernel_size, 5);
        assert_eq!(config.output.format, OutputFormat::Png);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{ "segmentation": "energy_cut", "output": { "format": "jpeg" } }"#,
        )
        .unwrap();
        assert_eq!(config.segmentation, SegmentationStrategy::EnergyCut);
        assert_eq!(config.output.format, OutputFormat::Jpeg);
        assert_eq!(config.output.jpeg_quality, 0.9);
        assert_eq!(config.target, TargetSize::default());
    }

    #[test]
    fn round_trips_through_file() {
        let mut config = PipelineConfig::default();
        config.target = TargetSize::new(350, 450);
        config.models.face_detector = Some(PathBuf::from("models/fd.bin"));
        config.refine.blur_kernel_size = 7;

        let file = NamedTempFile::new().expect("tempfile");
        config.save_to_path(file.path()).unwrap();
        let loaded = PipelineConfig::load_from_path(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = PipelineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, PassportPhotoError::InvalidConfig(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = PipelineConfig::load_from_path("/nonexistent/passport.json").unwrap_err();
        assert!(matches!(err, PassportPhotoError::InvalidConfig(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let zero_target = PipelineConfig {
            target: TargetSize::new(0, 900),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            zero_target.validate(),
            Err(PassportPhotoError::InvalidTargetSize { width: 0, height: 900 })
        ));

        let mut bad_quality = PipelineConfig::default();
        bad_quality.output.jpeg_quality = 1.5;
        assert!(matches!(
            bad_quality.validate(),
            Err(PassportPhotoError::InvalidQuality(_))
        ));

        let mut no_iterations = PipelineConfig::default();
        no_iterations.energy_cut.iterations = 0;
        assert!(matches!(
            no_iterations.validate(),
            Err(PassportPhotoError::InvalidConfig(_))
        ));

        let mut even_blur = PipelineConfig::default();
        even_blur.refine.blur_kernel_size = 8;
        assert!(matches!(
            even_blur.validate(),
            Err(PassportPhotoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validation_errors_surface_from_json() {
        let err = PipelineConfig::from_json_str(r#"{ "target": { "width": 0 } }"#).unwrap_err();
        assert!(matches!(err, PassportPhotoError::InvalidTargetSize { .. }));
    }
}
