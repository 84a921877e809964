use crate::index::{DescriptorIndex, Neighbor};
use crate::types::Descriptor;

/// Result of matching a probe descriptor against an index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest indexed point, `None` when the index is empty.
    pub distance: Option<f32>,
    /// Index position of the nearest point (set even when not matched).
    pub position: Option<usize>,
}

impl MatchResult {
    /// The accepted neighbour, if the probe matched.
    pub fn accepted(&self) -> Option<Neighbor> {
        match (self.matched, self.position, self.distance) {
            (true, Some(position), Some(distance)) => Some(Neighbor { position, distance }),
            _ => None,
        }
    }
}

/// Strategy for deciding whether a probe belongs to an indexed identity.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, index: &DescriptorIndex, tolerance: f32) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
///
/// Accepts the nearest point when its distance is at most `tolerance`.
/// Ties go to the lowest index position.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Descriptor, index: &DescriptorIndex, tolerance: f32) -> MatchResult {
        match index.nearest(probe) {
            Some(hit) => MatchResult {
                matched: hit.distance <= tolerance,
                distance: Some(hit.distance),
                position: Some(hit.position),
            },
            None => MatchResult {
                matched: false,
                distance: None,
                position: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DatasetEntry;

    fn index(vectors: &[&[f32]]) -> DescriptorIndex {
        let entries: Vec<DatasetEntry<usize>> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| DatasetEntry::new(i, Descriptor::new(v.to_vec())))
            .collect();
        DescriptorIndex::build(&entries)
    }

    #[test]
    fn test_match_within_tolerance() {
        let idx = index(&[&[0.0, 1.0], &[1.0, 0.0]]);
        let result = EuclideanMatcher.compare(&Descriptor::new(vec![0.8, 0.0]), &idx, 0.4);
        assert!(result.matched);
        assert_eq!(result.position, Some(1));
        assert_eq!(result.accepted().map(|n| n.position), Some(1));
    }

    #[test]
    fn test_no_match_beyond_tolerance() {
        let idx = index(&[&[1.0, 0.0]]);
        let result = EuclideanMatcher.compare(&Descriptor::new(vec![0.0, 1.0]), &idx, 0.4);
        assert!(!result.matched);
        assert_eq!(result.position, Some(0));
        assert!((result.distance.unwrap() - 2f32.sqrt()).abs() < 1e-6);
        assert!(result.accepted().is_none());
    }

    #[test]
    fn test_empty_index() {
        let result = EuclideanMatcher.compare(&Descriptor::new(vec![1.0]), &DescriptorIndex::empty(), 10.0);
        assert!(!result.matched);
        assert_eq!(result.distance, None);
        assert_eq!(result.position, None);
    }

    #[test]
    fn test_threshold_monotonicity() {
        // d = 0.5 exactly representable
        let idx = index(&[&[0.0]]);
        let probe = Descriptor::new(vec![0.5]);
        for tolerance in [0.5f32, 0.75, 1.0, 100.0] {
            assert!(EuclideanMatcher.compare(&probe, &idx, tolerance).matched, "tolerance {tolerance}");
        }
        for tolerance in [0.0f32, 0.25, 0.499] {
            assert!(!EuclideanMatcher.compare(&probe, &idx, tolerance).matched, "tolerance {tolerance}");
        }
    }

    #[test]
    fn test_zero_tolerance_exact_match() {
        let idx = index(&[&[0.1, 0.2]]);
        let result = EuclideanMatcher.compare(&Descriptor::new(vec![0.1, 0.2]), &idx, 0.0);
        assert!(result.matched);
    }

    #[test]
    fn test_length_mismatch_never_matches() {
        let idx = index(&[&[1.0, 0.0, 0.0]]);
        let result = EuclideanMatcher.compare(&Descriptor::new(vec![1.0, 0.0]), &idx, f32::INFINITY);
        assert!(!result.matched);
        assert_eq!(result.position, None);
    }

    #[test]
    fn test_infinite_tolerance_accepts_overflowing_distance() {
        let idx = index(&[&[f32::MAX, -f32::MAX]]);
        let result = EuclideanMatcher.compare(&Descriptor::new(vec![-f32::MAX, f32::MAX]), &idx, f32::INFINITY);
        assert!(result.matched);
        assert_eq!(result.distance, Some(f32::INFINITY));
    }
}
