//! Identity registry and face classifier.
//!
//! Registers one face descriptor per caller-chosen identity key and
//! classifies new face images against them with a tolerance-bounded
//! nearest-neighbour search. Detection and embedding come from a
//! [`VisionBackend`]; [`OnnxBackend`] runs SCRFD and ArcFace on the CPU.

pub mod alignment;
pub mod backend;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod index;
pub mod matcher;
pub mod onnx_backend;
pub mod picture;
pub mod recognizer;
pub mod registry;
pub mod types;

use std::path::PathBuf;

pub use backend::{ColorMode, DetectOptions, DetectionMode, VisionBackend};
pub use config::ClassifierConfig;
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use error::{BackendError, RegistryError};
pub use index::{DescriptorIndex, Neighbor};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher};
pub use onnx_backend::{OnnxBackend, RECOMMENDED_TOLERANCE};
pub use registry::FaceRegistry;
pub use types::{BoundingBox, DatasetEntry, Descriptor, DetectedFace};

/// Default ONNX model directory: `$XDG_DATA_HOME/faceid/models`,
/// falling back to `~/.local/share/faceid/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceid")
        .join("models")
}
