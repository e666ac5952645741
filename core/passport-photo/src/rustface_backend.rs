use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use image::RgbImage;
use log::debug;

use crate::error::PassportPhotoError;
use crate::face_detector::{FaceCandidate, FaceDetector};
use crate::geometry::BoundingBox;

/// Tuning for the SeetaFace funnel cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RustfaceSettings {
    /// Smallest face side, in pixels, the pyramid scans for.
    pub min_face_size: u32,
    /// Minimum classifier score to keep a window.
    pub score_threshold: f64,
    /// Scale step between pyramid levels (0–1).
    pub pyramid_scale_factor: f32,
    /// Sliding window step in pixels (horizontal, vertical).
    pub slide_window_step: (u32, u32),
}

impl Default for RustfaceSettings {
    fn default() -> Self {
        Self {
            min_face_size: 20,
            score_threshold: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: (4, 4),
        }
    }
}

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The model is parsed once; each call to [`FaceDetector::detect`] builds a
/// short-lived detector from a clone of it because the rustface detector
/// keeps per-run state.
pub struct RustfaceDetector {
    model: rustface::Model,
    settings: RustfaceSettings,
}

impl RustfaceDetector {
    /// Load a SeetaFace frontal model (`seeta_fd_frontal_v1.0.bin`) from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PassportPhotoError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PassportPhotoError::ModelLoad(format!("{}: {e}", path.display()))
        })?;
        let detector = Self::from_reader(BufReader::new(file))?;
        debug!("loaded SeetaFace model from {}", path.display());
        Ok(detector)
    }

    /// Parse a SeetaFace model from any byte source.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PassportPhotoError> {
        let model = rustface::read_model(reader)
            .map_err(|e| PassportPhotoError::ModelLoad(format!("invalid SeetaFace model: {e}")))?;
        Ok(Self {
            model,
            settings: RustfaceSettings::default(),
        })
    }

    /// Override the cascade tuning.
    pub fn with_settings(mut self, settings: RustfaceSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect(&self, image: &RgbImage) -> Vec<FaceCandidate> {
        let gray = image::imageops::grayscale(image);
        let (width, height) = gray.dimensions();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.settings.min_face_size);
        detector.set_score_thresh(self.settings.score_threshold);
        detector.set_pyramid_scale_factor(self.settings.pyramid_scale_factor);
        detector.set_slide_window_step(
            self.settings.slide_window_step.0,
            self.settings.slide_window_step.1,
        );

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceCandidate::new(
                    BoundingBox::new(
                        bbox.x(),
                        bbox.y(),
                        i32::try_from(bbox.width()).unwrap_or(i32::MAX),
                        i32::try_from(bbox.height()).unwrap_or(i32::MAX),
                    ),
                    face.score(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_a_load_error() {
        let err = RustfaceDetector::from_path("/nonexistent/seeta_fd_frontal_v1.0.bin")
            .err()
            .unwrap();
        assert!(matches!(err, PassportPhotoError::ModelLoad(_)));
    }

    #[test]
    fn truncated_model_is_a_load_error() {
        let err = RustfaceDetector::from_reader(&b"\x01\x00"[..]).err().unwrap();
        assert!(matches!(err, PassportPhotoError::ModelLoad(_)));
    }
}
