use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
///
/// An embedding with no values stands in for "no query" and never matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Returns `None` when the dimensions differ.
    pub fn euclidean_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f32>()
                .sqrt(),
        )
    }
}

/// One face found in one gallery photo.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingRecord {
    pub filename: String,
    pub embedding: Embedding,
}

/// Photos whose stored faces fall within the match threshold of a probe.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Deduplicated: one entry per photo even when several faces matched.
    pub filenames: BTreeSet<String>,
    /// Smallest distance seen across the whole store, if any comparison ran.
    pub best_distance: Option<f32>,
}

impl MatchResult {
    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filenames.len()
    }
}
