//! Identity registry and single-face classifier.
//!
//! The registry keeps an ordered list of `(ID, Descriptor)` entries and a
//! derived [`DescriptorIndex`]. Appending entries does not refresh the index:
//! callers must [`reload_index`](FaceRegistry::reload_index) before new
//! entries become visible to classification. [`clear`](FaceRegistry::clear)
//! is the exception and resets the index immediately.

use std::path::Path;

use crate::backend::VisionBackend;
use crate::config::ClassifierConfig;
use crate::error::RegistryError;
use crate::index::{DescriptorIndex, Neighbor};
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::onnx_backend::OnnxBackend;
use crate::types::{DatasetEntry, Descriptor};

pub struct FaceRegistry<ID, B = OnnxBackend> {
    backend: B,
    entries: Vec<DatasetEntry<ID>>,
    index: DescriptorIndex,
    config: ClassifierConfig,
    /// Bumped on every mutation of `entries`.
    generation: u64,
    /// Value of `generation` when `index` was last built.
    indexed_generation: u64,
}

impl<ID> FaceRegistry<ID, OnnxBackend> {
    /// Load the ONNX backend from `model_dir` and create an empty registry.
    pub fn init(model_dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let backend = OnnxBackend::init(model_dir.as_ref())
            .map_err(|e| RegistryError::BackendInitFailed(Box::new(e)))?;
        Ok(Self::with_backend(backend))
    }
}

impl<ID, B: VisionBackend> FaceRegistry<ID, B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            entries: Vec::new(),
            index: DescriptorIndex::empty(),
            config: ClassifierConfig::default(),
            generation: 0,
            indexed_generation: 0,
        }
    }

    /// Release the backend handle.
    pub fn close(self) -> B {
        tracing::info!(entries = self.entries.len(), "closing face registry");
        self.backend
    }

    // --- Registry lifecycle ---

    /// Replace every entry. The index is left untouched until the next reload.
    pub fn set_all(&mut self, entries: Vec<DatasetEntry<ID>>) -> &mut Self {
        tracing::debug!(previous = self.entries.len(), new = entries.len(), "replacing registry entries");
        self.entries = entries;
        self.generation += 1;
        self
    }

    /// Current entries in insertion order.
    pub fn all(&self) -> &[DatasetEntry<ID>] {
        &self.entries
    }

    /// Remove every entry and reset the index.
    pub fn clear(&mut self) {
        tracing::debug!(removed = self.entries.len(), "clearing registry");
        self.entries.clear();
        self.index = DescriptorIndex::empty();
        self.generation += 1;
        self.indexed_generation = self.generation;
    }

    /// Detect exactly one face in `image` and append it under `id`.
    pub fn add_one(&mut self, id: ID, image: &[u8]) -> Result<(), RegistryError> {
        let descriptor = self.recognize_single(image)?;
        self.entries.push(DatasetEntry::new(id, descriptor));
        self.generation += 1;
        tracing::debug!(entries = self.entries.len(), "registered face");
        Ok(())
    }

    /// Rebuild the index from the current entries.
    pub fn reload_index(&mut self) {
        self.index = DescriptorIndex::build(&self.entries);
        self.indexed_generation = self.generation;
        tracing::info!(points = self.index.len(), "face index reloaded");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of points in the index, which may lag behind [`len`](Self::len).
    pub fn indexed_len(&self) -> usize {
        self.index.len()
    }

    /// Whether entries changed since the index was last built.
    pub fn is_index_stale(&self) -> bool {
        self.generation != self.indexed_generation
    }

    // --- Classification ---

    /// Detect exactly one face in `image` and return its descriptor.
    ///
    /// Detection honours the current mode flags. The registry is not modified.
    pub fn recognize_single(&mut self, image: &[u8]) -> Result<Descriptor, RegistryError> {
        let options = self.config.detect_options();
        let mut faces = self
            .backend
            .detect(image, options)
            .map_err(RegistryError::DetectionFailed)?;

        match faces.len() {
            0 => Err(RegistryError::NoFaceDetected),
            1 => Ok(faces.remove(0).descriptor),
            count => Err(RegistryError::MultipleFaceDetected { count }),
        }
    }

    /// Decide which indexed position, if any, `probe` belongs to.
    pub fn match_descriptor(&self, probe: &Descriptor) -> Result<Neighbor, RegistryError> {
        if self.is_index_stale() {
            tracing::warn!(
                entries = self.entries.len(),
                indexed = self.index.len(),
                "classifying against a stale index; call reload_index() after changing entries"
            );
        }

        let result = EuclideanMatcher.compare(probe, &self.index, self.config.tolerance());
        match result.accepted() {
            Some(hit) => Ok(hit),
            None => {
                match result.distance {
                    None if self.index.is_empty() => tracing::debug!("rejected: index has no points"),
                    None => tracing::warn!(
                        probe_len = probe.len(),
                        "rejected: descriptor length differs from every indexed descriptor"
                    ),
                    Some(distance) => tracing::debug!(
                        distance,
                        tolerance = self.config.tolerance(),
                        "rejected: nearest face is beyond tolerance"
                    ),
                }
                Err(RegistryError::NotRegistered)
            }
        }
    }
}

impl<ID: Clone, B: VisionBackend> FaceRegistry<ID, B> {
    /// Recognize the single face in `image` and return the registered entry
    /// it matches.
    pub fn classify_single(&mut self, image: &[u8]) -> Result<DatasetEntry<ID>, RegistryError> {
        let probe = self.recognize_single(image)?;
        self.classify_descriptor(&probe)
    }

    /// Classify an already extracted descriptor.
    pub fn classify_descriptor(&self, probe: &Descriptor) -> Result<DatasetEntry<ID>, RegistryError> {
        let hit = self.match_descriptor(probe)?;
        match self.entries.get(hit.position) {
            Some(entry) => {
                tracing::debug!(position = hit.position, distance = hit.distance, "face classified");
                Ok(entry.clone())
            }
            None => {
                tracing::warn!(
                    position = hit.position,
                    entries = self.entries.len(),
                    "stale index points past the end of the registry"
                );
                Err(RegistryError::NotRegistered)
            }
        }
    }
}

// --- Configuration ---
impl<ID, B> FaceRegistry<ID, B> {
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn set_tolerance(&mut self, tolerance: f32) -> Result<&mut Self, RegistryError> {
        self.config.set_tolerance(tolerance)?;
        Ok(self)
    }

    pub fn tolerance(&self) -> f32 {
        self.config.tolerance()
    }

    pub fn set_high_accuracy(&mut self, enabled: bool) -> &mut Self {
        self.config.set_high_accuracy(enabled);
        self
    }

    pub fn is_high_accuracy(&self) -> bool {
        self.config.is_high_accuracy()
    }

    pub fn set_grayscale(&mut self, enabled: bool) -> &mut Self {
        self.config.set_grayscale(enabled);
        self
    }

    pub fn is_grayscale(&self) -> bool {
        self.config.is_grayscale()
    }

    /// Replace the whole configuration at once.
    pub fn set_config(&mut self, config: ClassifierConfig) -> &mut Self {
        self.config = config;
        self
    }
}
