use std::path::PathBuf;

use faceid_core::{ClassifierConfig, RECOMMENDED_TOLERANCE};

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum descriptor distance for a positive match. Defaults to the
    /// ArcFace-calibrated tolerance of the ONNX backend.
    pub tolerance: f32,
    /// Run the slower, more sensitive detection profile.
    pub high_accuracy: bool,
    /// Detect on a luma-only copy of each image.
    pub grayscale: bool,
}

impl Config {
    /// Load configuration from `FACEID_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            model_dir: var("FACEID_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(faceid_core::default_model_dir),
            tolerance: parse_or(var("FACEID_TOLERANCE"), RECOMMENDED_TOLERANCE),
            high_accuracy: flag(var("FACEID_HIGH_ACCURACY")),
            grayscale: flag(var("FACEID_GRAYSCALE")),
        }
    }

    /// Classifier settings for a new registry.
    pub fn classifier(&self) -> anyhow::Result<ClassifierConfig> {
        let mut config = ClassifierConfig::default();
        config
            .set_tolerance(self.tolerance)?
            .set_high_accuracy(self.high_accuracy)
            .set_grayscale(self.grayscale);
        Ok(config)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn flag(value: Option<String>) -> bool {
    value.map(|v| v != "0" && !v.is_empty()).unwrap_or(false)
}
