use image::RgbImage;
use log::{debug, warn};

use crate::error::PassportPhotoError;
use crate::geometry::BoundingBox;

/// A region reported by a face detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceCandidate {
    /// Face rectangle in source-image pixel coordinates.
    pub bounds: BoundingBox,
    /// Detection confidence score (scale depends on the backend).
    pub confidence: f64,
}

impl FaceCandidate {
    /// Create a candidate from its rectangle and score.
    pub const fn new(bounds: BoundingBox, confidence: f64) -> Self {
        Self { bounds, confidence }
    }

    /// Area of the face rectangle, the selection key.
    pub fn area(&self) -> i64 {
        self.bounds.area()
    }
}

/// Pluggable face detection backend.
///
/// Implement this trait to provide a custom face detector (ONNX, dlib, a
/// fixed box for tests, etc.) and pass it to
/// [`crate::PassportPhotoProcessor::new`]. Detectors are shared between
/// concurrent requests, so `detect` takes `&self`.
pub trait FaceDetector: Send + Sync {
    /// Detect frontal faces in `image`, reporting boxes in its pixel coordinates.
    fn detect(&self, image: &RgbImage) -> Vec<FaceCandidate>;
}

/// Pick the candidate with the largest area.
///
/// Ties keep the candidate that was reported first.
pub fn select_largest_face(candidates: &[FaceCandidate]) -> Option<&FaceCandidate> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if candidate.area() <= current.area() => Some(current),
        _ => Some(candidate),
    })
}

/// Run `detector` on `image` and select the subject's face.
///
/// Candidates are clipped to the image first; boxes with nothing left inside
/// the image are discarded.
pub fn locate_face(
    detector: &dyn FaceDetector,
    image: &RgbImage,
) -> Result<FaceCandidate, PassportPhotoError> {
    let (width, height) = image.dimensions();
    let raw = detector.detect(image);
    let raw_count = raw.len();

    let candidates: Vec<FaceCandidate> = raw
        .into_iter()
        .filter_map(|candidate| {
            candidate
                .bounds
                .clamp_to(width, height)
                .map(|bounds| FaceCandidate::new(bounds, candidate.confidence))
        })
        .collect();

    if candidates.len() < raw_count {
        warn!(
            "dropped {} face candidate(s) lying outside the {width}x{height} image",
            raw_count - candidates.len()
        );
    }

    let face = select_largest_face(&candidates)
        .copied()
        .ok_or(PassportPhotoError::NoFaceDetected)?;

    debug!(
        "selected face {:?} (score {:.2}) out of {} candidate(s)",
        face.bounds,
        face.confidence,
        candidates.len()
    );

    Ok(face)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector(Vec<FaceCandidate>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _image: &RgbImage) -> Vec<FaceCandidate> {
            self.0.clone()
        }
    }

    fn candidate(x: i32, y: i32, w: i32, h: i32, score: f64) -> FaceCandidate {
        FaceCandidate::new(BoundingBox::new(x, y, w, h), score)
    }

    #[test]
    fn largest_area_wins_regardless_of_score() {
        let faces = [
            candidate(0, 0, 10, 10, 9.0),
            candidate(20, 20, 30, 30, 1.0),
            candidate(5, 5, 20, 20, 5.0),
        ];
        let best = select_largest_face(&faces).unwrap();
        assert_eq!(best.bounds, BoundingBox::new(20, 20, 30, 30));
    }

    #[test]
    fn ties_keep_first_encountered() {
        let faces = [
            candidate(0, 0, 20, 10, 1.0),
            candidate(50, 50, 10, 20, 2.0),
        ];
        let best = select_largest_face(&faces).unwrap();
        assert_eq!(best.bounds.x, 0);
    }

    #[test]
    fn empty_candidates_select_nothing() {
        assert!(select_largest_face(&[]).is_none());
    }

    #[test]
    fn locate_face_reports_no_face() {
        let detector = FixedDetector(vec![]);
        let img = RgbImage::new(50, 50);
        let err = locate_face(&detector, &img).unwrap_err();
        assert!(matches!(err, PassportPhotoError::NoFaceDetected));
    }

    #[test]
    fn locate_face_clips_and_discards_out_of_bounds() {
        let detector = FixedDetector(vec![
            candidate(200, 200, 40, 40, 3.0),
            candidate(-10, -10, 30, 30, 1.0),
        ]);
        let img = RgbImage::new(100, 100);
        let face = locate_face(&detector, &img).unwrap();
        assert_eq!(face.bounds, BoundingBox::new(0, 0, 20, 20));
    }
}
