use serde::{Deserialize, Serialize};

use crate::backend::{ColorMode, DetectOptions, DetectionMode};
use crate::error::RegistryError;

/// Default maximum distance for a positive match.
pub const DEFAULT_TOLERANCE: f32 = 0.4;

/// Classifier settings owned by one registry.
///
/// Changes apply to the next detection or classification call; descriptors
/// already stored are never re-evaluated. Deserialization goes through
/// [`set_tolerance`](Self::set_tolerance), so an invalid tolerance is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawClassifierConfig")]
pub struct ClassifierConfig {
    tolerance: f32,
    high_accuracy: bool,
    grayscale: bool,
}

#[derive(Deserialize)]
struct RawClassifierConfig {
    tolerance: f32,
    #[serde(default)]
    high_accuracy: bool,
    #[serde(default)]
    grayscale: bool,
}

impl TryFrom<RawClassifierConfig> for ClassifierConfig {
    type Error = RegistryError;

    fn try_from(raw: RawClassifierConfig) -> Result<Self, Self::Error> {
        let mut config = Self::default();
        config
            .set_tolerance(raw.tolerance)?
            .set_high_accuracy(raw.high_accuracy)
            .set_grayscale(raw.grayscale);
        Ok(config)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            high_accuracy: false,
            grayscale: false,
        }
    }
}

impl ClassifierConfig {
    /// Set the tolerance. Smaller is stricter; there is no upper bound.
    pub fn set_tolerance(&mut self, tolerance: f32) -> Result<&mut Self, RegistryError> {
        if tolerance.is_nan() || tolerance < 0.0 {
            return Err(RegistryError::InvalidTolerance(tolerance));
        }
        self.tolerance = tolerance;
        Ok(self)
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn set_high_accuracy(&mut self, enabled: bool) -> &mut Self {
        self.high_accuracy = enabled;
        self
    }

    pub fn is_high_accuracy(&self) -> bool {
        self.high_accuracy
    }

    pub fn set_grayscale(&mut self, enabled: bool) -> &mut Self {
        self.grayscale = enabled;
        self
    }

    pub fn is_grayscale(&self) -> bool {
        self.grayscale
    }

    /// Backend options for the next detection call.
    pub fn detect_options(&self) -> DetectOptions {
        DetectOptions {
            mode: if self.high_accuracy {
                DetectionMode::HighAccuracy
            } else {
                DetectionMode::Standard
            },
            color: if self.grayscale {
                ColorMode::Grayscale
            } else {
                ColorMode::Color
            },
        }
    }
}
