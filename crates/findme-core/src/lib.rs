//! Face encoding, matching and the gallery encoding cache.
//!
//! Faces are found with SCRFD and embedded with ArcFace, both running via
//! ONNX Runtime on the CPU. Gallery embeddings are persisted once and reused
//! until an explicit rescan.

pub mod alignment;
pub mod cache;
pub mod detector;
pub mod encoder;
pub mod matcher;
pub mod recognizer;
pub mod store;
pub mod types;

pub use cache::{CacheSource, EncodingCache};
pub use encoder::{EncodeError, FaceEncoder, OnnxEncoder};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use store::{BuildSummary, EncodingStore, StoreError};
pub use types::{BoundingBox, Embedding, EncodingRecord, MatchResult};

use std::path::PathBuf;

/// Default location of the ONNX models: `$XDG_DATA_HOME/findme/models`.
pub fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}

/// `$XDG_DATA_HOME/findme`, falling back to `~/.local/share/findme`.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("findme")
}
