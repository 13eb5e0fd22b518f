//! Image → face embeddings.
//!
//! [`FaceEncoder`] is the seam between the pipeline and the models: the
//! ONNX-backed [`OnnxEncoder`] in production, simple fakes in tests.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// File extensions scanned in the gallery (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("unreadable image: {0}")]
    Unreadable(String),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Whether `path` carries one of the gallery image extensions.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Decode in-memory image bytes to RGB.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, EncodeError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| EncodeError::Unreadable(e.to_string()))
}

/// Detects faces and embeds every one of them.
pub trait FaceEncoder {
    /// Embeddings of all faces in `image`, most confident first.
    /// An empty list means no face was found.
    fn encode_image(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncodeError>;

    fn encode_bytes(&mut self, bytes: &[u8]) -> Result<Vec<Embedding>, EncodeError> {
        let image = decode_image(bytes)?;
        self.encode_image(&image)
    }

    /// Format is sniffed from the content, not the extension.
    fn encode_file(&mut self, path: &Path) -> Result<Vec<Embedding>, EncodeError> {
        let bytes = std::fs::read(path)
            .map_err(|e| EncodeError::Unreadable(format!("{}: {e}", path.display())))?;
        self.encode_bytes(&bytes)
    }

    /// The first face only, as used for selfies. `Ok(None)` when no face is found.
    fn encode_first(&mut self, bytes: &[u8]) -> Result<Option<Embedding>, EncodeError> {
        Ok(self.encode_bytes(bytes)?.into_iter().next())
    }
}

/// SCRFD detection + ArcFace recognition.
pub struct OnnxEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEncoder {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, EncodeError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEncoder for OnnxEncoder {
    fn encode_image(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncodeError> {
        let faces = self.detector.detect(image)?;

        let mut embeddings = Vec::with_capacity(faces.len());
        for face in &faces {
            if face.landmarks.is_none() {
                tracing::debug!(confidence = face.confidence, "face without landmarks skipped");
                continue;
            }
            embeddings.push(self.recognizer.embed_face(image, face)?);
        }
        Ok(embeddings)
    }
}
