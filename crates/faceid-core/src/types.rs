use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, 0.0 when they do not overlap.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;

        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face descriptor: a fixed-length embedding for exactly one detected face.
///
/// Descriptors are immutable once produced by a backend. Two descriptors are
/// only comparable when they have the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    model_version: Option<String>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance to another descriptor.
    ///
    /// `None` when the lengths differ: such descriptors come from different
    /// embedding spaces and cannot be compared.
    pub fn euclidean_distance(&self, other: &Descriptor) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }

        let distance = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt();
        Some(distance)
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// A registered identity: a caller-chosen key and the descriptor of its face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry<ID> {
    pub id: ID,
    pub descriptor: Descriptor,
}

impl<ID> DatasetEntry<ID> {
    pub fn new(id: ID, descriptor: Descriptor) -> Self {
        Self { id, descriptor }
    }
}

/// One face found by a vision backend.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub descriptor: Descriptor,
    pub geometry: BoundingBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 1.0, landmarks: None }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Descriptor::new(vec![0.3, -0.2, 0.9]);
        assert_eq!(a.euclidean_distance(&a.clone()), Some(0.0));
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b).unwrap() - 5.0).abs() < 1e-6);
        assert!((b.euclidean_distance(&a).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_length_mismatch() {
        let a = Descriptor::new(vec![1.0, 0.0]);
        let b = Descriptor::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.euclidean_distance(&b), None);
    }

    #[test]
    fn test_euclidean_distance_overflow_is_comparable() {
        let a = Descriptor::new(vec![f32::MAX, -f32::MAX]);
        let b = Descriptor::new(vec![-f32::MAX, f32::MAX]);
        assert_eq!(a.euclidean_distance(&b), Some(f32::INFINITY));
    }

    #[test]
    fn test_model_version() {
        let d = Descriptor::new(vec![1.0]).with_model_version("w600k_r50");
        assert_eq!(d.model_version(), Some("w600k_r50"));
        assert_eq!(Descriptor::from(vec![1.0]).model_version(), None);
    }

    #[test]
    fn test_iou_identical() {
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(20.0, 20.0, 10.0, 10.0);
        assert!(a.iou(&b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 0.0, 10.0, 10.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_dataset_entry_serializes() {
        let entry = DatasetEntry::new("x1".to_string(), Descriptor::new(vec![0.5, 0.25]));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], "x1");
        assert_eq!(json["descriptor"]["values"][1], 0.25);
    }
}
