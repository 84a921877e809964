//! Search index over registered descriptors.
//!
//! Points are labelled by their position in the registry at build time, not
//! by identity key. The registry maps a winning position back to its entry.

use crate::types::{DatasetEntry, Descriptor};

/// Nearest indexed point for a probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorIndex {
    points: Vec<Descriptor>,
}

impl DescriptorIndex {
    /// An index with zero comparison points. Every search misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from registry entries; point `i` is labelled `i`.
    pub fn build<ID>(entries: &[DatasetEntry<ID>]) -> Self {
        Self {
            points: entries.iter().map(|e| e.descriptor.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (usize, &Descriptor)> {
        self.points.iter().enumerate()
    }

    /// Exhaustive nearest-neighbour search.
    ///
    /// Visits every point. Only a strictly smaller distance replaces the
    /// current best, so the lowest position wins ties. Points of a different
    /// length and NaN distances are skipped.
    pub fn nearest(&self, probe: &Descriptor) -> Option<Neighbor> {
        let mut best: Option<Neighbor> = None;

        for (position, point) in self.points() {
            let Some(distance) = probe.euclidean_distance(point) else {
                continue;
            };
            if distance.is_nan() {
                continue;
            }
            let closer = match best {
                None => true,
                Some(b) => distance < b.distance,
            };
            if closer {
                best = Some(Neighbor { position, distance });
            }
        }

        best
    }
}
