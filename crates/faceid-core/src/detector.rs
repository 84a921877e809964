//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the picture into a square input, decodes the three
//! anchor-free stride heads (scores, box distances, five keypoints) and
//! suppresses overlapping boxes.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::backend::DetectionMode;
use crate::picture::Picture;
use crate::types::BoundingBox;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (download from insightface and place in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Input resolution and score cut-off used for one detection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorProfile {
    /// Square network input side, a multiple of the largest stride.
    pub input_size: usize,
    pub confidence_threshold: f32,
}

impl DetectorProfile {
    pub const STANDARD: Self = Self { input_size: 640, confidence_threshold: 0.5 };
    /// Larger input and lower cut-off: finds small faces at roughly twice the cost.
    pub const HIGH_ACCURACY: Self = Self { input_size: 960, confidence_threshold: 0.35 };

    pub fn for_mode(mode: DetectionMode) -> Self {
        match mode {
            DetectionMode::Standard => Self::STANDARD,
            DetectionMode::HighAccuracy => Self::HIGH_ACCURACY,
        }
    }
}

/// Output tensor positions for one stride head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Scale and padding applied when fitting a picture into the network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: usize,
    pad_y: usize,
    width: u32,
    height: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, input_size: usize) -> Self {
        let side = input_size as f32;
        let scale = (side / width as f32).min(side / height as f32);
        let new_w = ((width as f32 * scale).round() as usize).clamp(1, input_size);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, input_size);

        Self {
            scale,
            pad_x: (input_size - new_w) / 2,
            pad_y: (input_size - new_h) / 2,
            width: new_w as u32,
            height: new_h as u32,
        }
    }

    /// Map a point from network input space back to picture space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let outputs = map_outputs(&output_names);
        tracing::debug!(?outputs, "SCRFD output tensor mapping");

        Ok(Self { session, outputs })
    }

    /// Detect faces, returning boxes with landmarks sorted by confidence.
    pub fn detect(
        &mut self,
        picture: &Picture,
        profile: DetectorProfile,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        if picture.width() == 0 || picture.height() == 0 {
            return Err(DetectorError::InferenceFailed("picture has no pixels".into()));
        }

        let (input, letterbox) = to_input_tensor(picture, profile.input_size);
        let heads = self.outputs;
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (head, &stride) in heads.iter().zip(SCRFD_STRIDES.iter()) {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };

            let tensors = StrideTensors {
                scores: extract(head.score, "scores")?,
                bboxes: extract(head.bbox, "bboxes")?,
                kps: extract(head.kps, "kps")?,
            };
            candidates.extend(tensors.decode(stride, profile, &letterbox));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), input_size = profile.input_size, "SCRFD detection done");
        Ok(faces)
    }
}

/// Letterbox the picture into a normalized NCHW tensor.
///
/// Padding is filled with the mean, so it normalizes to 0.0.
fn to_input_tensor(picture: &Picture, input_size: usize) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(picture.width(), picture.height(), input_size);
    let resized = picture.resized(letterbox.width, letterbox.height);

    let mut tensor = Array4::<f32>::zeros((1, 3, input_size, input_size));
    for y in 0..letterbox.height {
        for x in 0..letterbox.width {
            let pixel = resized.rgb(x, y);
            let (ty, tx) = (y as usize + letterbox.pad_y, x as usize + letterbox.pad_x);
            for (c, &value) in pixel.iter().enumerate() {
                tensor[[0, c, ty, tx]] = (value as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }
    }

    (tensor, letterbox)
}

/// Name-based output discovery ("score_8", "bbox_16", "kps_32", ...).
///
/// Exports with generic numeric names fall back to the standard positional
/// layout: scores 0-2, boxes 3-5, keypoints 6-8.
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some(StrideOutputs {
                score: find("score", stride)?,
                bbox: find("bbox", stride)?,
                kps: find("kps", stride)?,
            })
        })
        .collect();

    match named.as_deref() {
        Some(&[a, b, c]) => [a, b, c],
        _ => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
            std::array::from_fn(|i| StrideOutputs { score: i, bbox: i + 3, kps: i + 6 })
        }
    }
}

/// Raw head outputs for one stride.
struct StrideTensors<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

impl StrideTensors<'_> {
    fn decode(&self, stride: usize, profile: DetectorProfile, letterbox: &Letterbox) -> Vec<BoundingBox> {
        let grid = profile.input_size / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let step = stride as f32;

        let mut faces = Vec::new();
        for idx in 0..anchors.min(self.scores.len()) {
            let score = self.scores[idx];
            if score <= profile.confidence_threshold {
                continue;
            }

            let Some(dist) = self.bboxes.get(idx * 4..idx * 4 + 4) else {
                continue;
            };

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * step;
            let ay = (cell / grid) as f32 * step;

            let (x1, y1) = letterbox.unmap(ax - dist[0] * step, ay - dist[1] * step);
            let (x2, y2) = letterbox.unmap(ax + dist[2] * step, ay + dist[3] * step);

            let landmarks = self.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.unmap(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step))
            });

            faces.push(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            });
        }

        faces
    }
}

/// Greedy non-maximum suppression, highest confidence first.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if keep.iter().all(|kept| kept.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x, y, width: w, height: h, confidence: conf, landmarks: None,
        }
    }

    #[test]
    fn test_profiles() {
        assert_eq!(DetectorProfile::for_mode(DetectionMode::Standard), DetectorProfile::STANDARD);
        let high = DetectorProfile::for_mode(DetectionMode::HighAccuracy);
        assert!(high.input_size > DetectorProfile::STANDARD.input_size);
        assert_eq!(high.input_size % 32, 0);
        assert!(high.confidence_threshold < DetectorProfile::STANDARD.confidence_threshold);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let candidates = vec![
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(candidates, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_separate_faces() {
        let candidates = vec![
            make_bbox(0.0, 0.0, 10.0, 10.0, 0.9),
            make_bbox(50.0, 50.0, 10.0, 10.0, 0.8),
        ];
        assert_eq!(nms(candidates, 0.4).len(), 2);
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(320, 240, 640);
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert_eq!((lb.width, lb.height), (640, 480));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 80));
    }

    #[test]
    fn test_letterbox_unmap_roundtrip() {
        let lb = Letterbox::fit(300, 500, 640);
        let (ox, oy) = (100.0f32, 50.0f32);
        let mapped = (ox * lb.scale + lb.pad_x as f32, oy * lb.scale + lb.pad_y as f32);
        let (rx, ry) = lb.unmap(mapped.0, mapped.1);
        assert!((rx - ox).abs() < 0.1, "x: {rx} vs {ox}");
        assert!((ry - oy).abs() < 0.1, "y: {ry} vs {oy}");
    }

    #[test]
    fn test_input_tensor_padding_normalizes_to_zero() {
        let picture = Picture::Luma(GrayImage::from_pixel(64, 32, Luma([255])));
        let (tensor, lb) = to_input_tensor(&picture, 64);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(lb.pad_y, 16);
        // Padding row
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        // Image row, all channels equal for luma input
        let expected = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        for c in 0..3 {
            assert!((tensor[[0, c, 20, 10]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_map_outputs_named() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32",
            "bbox_8",  "bbox_16",  "bbox_32",
            "kps_8",   "kps_16",   "kps_32",
        ].iter().map(|s| s.to_string()).collect();

        let heads = map_outputs(&names);
        assert_eq!(heads[0], StrideOutputs { score: 0, bbox: 3, kps: 6 });
        assert_eq!(heads[2], StrideOutputs { score: 2, bbox: 5, kps: 8 });
    }

    #[test]
    fn test_map_outputs_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        let heads = map_outputs(&names);
        assert_eq!(heads[0], StrideOutputs { score: 2, bbox: 0, kps: 1 });
        assert_eq!(heads[1], StrideOutputs { score: 5, bbox: 3, kps: 4 });
    }

    #[test]
    fn test_map_outputs_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        let heads = map_outputs(&names);
        assert_eq!(heads[1], StrideOutputs { score: 1, bbox: 4, kps: 7 });
    }

    #[test]
    fn test_decode_single_anchor() {
        // 32x32 input, stride 32: one cell, two anchors at (0, 0)
        let profile = DetectorProfile { input_size: 32, confidence_threshold: 0.5 };
        let lb = Letterbox::fit(32, 32, 32);
        let scores = [0.9, 0.1];
        let bboxes = [0.0, 0.0, 0.5, 0.25, 0.0, 0.0, 0.0, 0.0];
        let kps = [0.1f32; 20];
        let tensors = StrideTensors { scores: &scores, bboxes: &bboxes, kps: &kps };

        let faces = tensors.decode(32, profile, &lb);
        assert_eq!(faces.len(), 1);
        let face = &faces[0];
        assert!((face.width - 16.0).abs() < 1e-4);
        assert!((face.height - 8.0).abs() < 1e-4);
        let lms = face.landmarks.unwrap();
        assert!((lms[0].0 - 3.2).abs() < 1e-4);
    }
}
