//! Vision backend boundary.
//!
//! The registry only needs one thing from a backend: turn image bytes into a
//! list of faces, each carrying a descriptor. Decoding, detection and
//! embedding are entirely the backend's business.

use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::types::DetectedFace;

/// Detection accuracy/speed trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectionMode {
    #[default]
    Standard,
    /// Slower detection that finds smaller or harder faces.
    HighAccuracy,
}

/// Color handling applied to the image before detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorMode {
    #[default]
    Color,
    Grayscale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetectOptions {
    pub mode: DetectionMode,
    pub color: ColorMode,
}

/// Face detection and embedding engine.
///
/// Implementations are usually stateful (inference sessions, scratch
/// buffers), hence `&mut self`. A backend that cannot honour one of the
/// requested options must return an error rather than ignore it.
pub trait VisionBackend {
    fn detect(
        &mut self,
        image: &[u8],
        options: DetectOptions,
    ) -> Result<Vec<DetectedFace>, BackendError>;
}

impl<B: VisionBackend + ?Sized> VisionBackend for Box<B> {
    fn detect(
        &mut self,
        image: &[u8],
        options: DetectOptions,
    ) -> Result<Vec<DetectedFace>, BackendError> {
        (**self).detect(image, options)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use super::*;
    use crate::types::{BoundingBox, Descriptor};

    /// Backend that returns canned descriptors keyed by the image bytes.
    ///
    /// Unknown bytes fail like an undecodable image. Options seen on each
    /// call are recorded for assertions.
    #[derive(Default)]
    pub struct ScriptedBackend {
        faces: HashMap<Vec<u8>, Vec<Vec<f32>>>,
        pub calls: Vec<DetectOptions>,
        pub grayscale_unsupported: bool,
    }

    impl ScriptedBackend {
        pub fn with_image(mut self, image: &[u8], faces: Vec<Vec<f32>>) -> Self {
            self.faces.insert(image.to_vec(), faces);
            self
        }
    }

    pub fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            descriptor: Descriptor::new(values),
            geometry: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
                landmarks: None,
            },
        }
    }

    impl VisionBackend for ScriptedBackend {
        fn detect(
            &mut self,
            image: &[u8],
            options: DetectOptions,
        ) -> Result<Vec<DetectedFace>, BackendError> {
            self.calls.push(options);
            if self.grayscale_unsupported && options.color == ColorMode::Grayscale {
                return Err("grayscale detection is not supported".into());
            }
            let faces = self.faces.get(image).ok_or("unrecognized image data")?;
            Ok(faces.iter().cloned().map(face).collect())
        }
    }
}
