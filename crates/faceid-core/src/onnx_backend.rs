//! SCRFD + ArcFace implementation of [`VisionBackend`].

use std::path::Path;

use thiserror::Error;

use crate::backend::{DetectOptions, VisionBackend};
use crate::detector::{DetectorError, DetectorProfile, FaceDetector};
use crate::error::BackendError;
use crate::picture::Picture;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::DetectedFace;

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Tolerance calibrated for this backend's descriptors.
///
/// ArcFace descriptors are unit length, so Euclidean distance relates to
/// cosine similarity as `d = sqrt(2 * (1 - cos))`. A cosine threshold of 0.40
/// gives `d = sqrt(1.2)`.
pub const RECOMMENDED_TOLERANCE: f32 = 1.095;

#[derive(Error, Debug)]
pub enum OnnxBackendError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Face backend running both ONNX models on the CPU.
///
/// The registry's default tolerance of 0.4 suits dlib-style 128-d
/// descriptors and is very strict for ArcFace; use
/// [`RECOMMENDED_TOLERANCE`] with this backend.
pub struct OnnxBackend {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxBackend {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn init(model_dir: &Path) -> Result<Self, OnnxBackendError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        tracing::info!(dir = %model_dir.display(), "ONNX face backend ready");
        Ok(Self { detector, recognizer })
    }

    /// Decode `image`, detect every face and extract a descriptor for each.
    pub fn detect_faces(
        &mut self,
        image: &[u8],
        options: DetectOptions,
    ) -> Result<Vec<DetectedFace>, OnnxBackendError> {
        let picture = Picture::decode(image, options.color)?;
        let boxes = self.detector.detect(&picture, DetectorProfile::for_mode(options.mode))?;

        tracing::debug!(
            width = picture.width(),
            height = picture.height(),
            faces = boxes.len(),
            ?options,
            "faces detected"
        );

        boxes
            .into_iter()
            .map(|geometry| -> Result<DetectedFace, OnnxBackendError> {
                let descriptor = self.recognizer.extract(&picture, &geometry)?;
                Ok(DetectedFace { descriptor, geometry })
            })
            .collect()
    }
}

impl VisionBackend for OnnxBackend {
    fn detect(
        &mut self,
        image: &[u8],
        options: DetectOptions,
    ) -> Result<Vec<DetectedFace>, BackendError> {
        Ok(self.detect_faces(image, options)?)
    }
}
