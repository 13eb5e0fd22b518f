//! Probe-vs-gallery matching over the encoding store.

use crate::store::EncodingStore;
use crate::types::{Embedding, MatchResult};

/// Default maximum Euclidean distance for two faces to count as the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Strategy for comparing a probe embedding against every stored face.
pub trait Matcher {
    fn find(&self, probe: &Embedding, store: &EncodingStore) -> MatchResult;
}

/// Euclidean distance matcher: a stored face matches when its distance to
/// the probe is at most `threshold`. Lower distance = more similar.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Matcher for EuclideanMatcher {
    fn find(&self, probe: &Embedding, store: &EncodingStore) -> MatchResult {
        let mut result = MatchResult::default();
        if probe.is_empty() {
            return result;
        }

        for record in store.records() {
            // Records from a different model dimension are skipped, never matched.
            let Some(distance) = probe.euclidean_distance(&record.embedding) else {
                continue;
            };

            if result.best_distance.map_or(true, |best| distance < best) {
                result.best_distance = Some(distance);
            }

            if distance <= self.threshold && result.filenames.insert(record.filename.clone()) {
                tracing::debug!(file = %record.filename, distance, "match found");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EncodingRecord;

    fn record(name: &str, values: &[f32]) -> EncodingRecord {
        EncodingRecord {
            filename: name.to_string(),
            embedding: Embedding::new(values.to_vec()),
        }
    }

    fn store(records: Vec<EncodingRecord>) -> EncodingStore {
        EncodingStore::from_records(records).unwrap()
    }

    #[test]
    fn test_self_match_at_zero_distance() {
        let s = store(vec![record("a.jpg", &[0.1, 0.2, 0.3])]);
        let probe = Embedding::new(vec![0.1, 0.2, 0.3]);
        let result = EuclideanMatcher::default().find(&probe, &s);
        assert_eq!(result.filenames.into_iter().collect::<Vec<_>>(), vec!["a.jpg"]);
        assert_eq!(result.best_distance, Some(0.0));
    }

    #[test]
    fn test_far_embedding_never_matches() {
        let s = store(vec![
            record("a.jpg", &[1.0, 0.0, 0.0]),
            record("b.jpg", &[0.0, 1.0, 0.0]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0, 1.0]);
        let result = EuclideanMatcher::default().find(&probe, &s);
        assert!(result.is_empty());
        // sqrt(2) is well past 0.6
        assert!(result.best_distance.unwrap() > DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let s = store(vec![record("edge.jpg", &[0.5, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher::new(0.5).find(&probe, &s);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_multiple_faces_same_photo_deduplicated() {
        let s = store(vec![
            record("group.jpg", &[0.0, 0.0]),
            record("group.jpg", &[0.1, 0.0]),
            record("solo.jpg", &[0.0, 0.1]),
        ]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher::default().find(&probe, &s);
        assert_eq!(
            result.filenames.into_iter().collect::<Vec<_>>(),
            vec!["group.jpg", "solo.jpg"]
        );
    }

    #[test]
    fn test_empty_store_yields_empty_set() {
        let probe = Embedding::new(vec![0.5, 0.5]);
        let result = EuclideanMatcher::default().find(&probe, &EncodingStore::default());
        assert!(result.is_empty());
        assert_eq!(result.best_distance, None);
    }

    #[test]
    fn test_empty_probe_yields_empty_set() {
        let s = store(vec![record("a.jpg", &[0.0, 0.0])]);
        let result = EuclideanMatcher::default().find(&Embedding::new(vec![]), &s);
        assert!(result.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_skipped() {
        let s = store(vec![record("a.jpg", &[0.0, 0.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher::default().find(&probe, &s);
        assert!(result.is_empty());
        assert_eq!(result.best_distance, None);
    }
}
