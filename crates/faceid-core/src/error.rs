use thiserror::Error;

/// Error type returned by a [`VisionBackend`](crate::backend::VisionBackend).
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("vision backend failed to initialize: {0}")]
    BackendInitFailed(#[source] BackendError),
    #[error("face detection failed: {0}")]
    DetectionFailed(#[source] BackendError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("multiple faces detected ({count}), expected exactly one")]
    MultipleFaceDetected { count: usize },
    /// No indexed entry within tolerance, or the index is empty / never loaded.
    #[error("face is not registered")]
    NotRegistered,
    #[error("invalid tolerance {0}: must be a non-negative number")]
    InvalidTolerance(f32),
}
