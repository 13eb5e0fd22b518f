use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration.
///
/// Built from an optional TOML file (`FINDME_CONFIG`) and then overridden by
/// `FINDME_*` environment variables. Every component gets its paths from here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gallery of event photos to search.
    pub source_dir: PathBuf,
    /// Base directory for per-user folders and download archives.
    pub output_dir: PathBuf,
    /// Cached gallery encodings.
    pub encodings_path: PathBuf,
    /// Where uploaded selfies are kept; `None` disables keeping them.
    pub selfie_dir: Option<PathBuf>,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum Euclidean embedding distance for a match.
    pub match_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("all_photos"),
            output_dir: PathBuf::from("sorted_user_photos"),
            encodings_path: PathBuf::from("face_encodings.zip"),
            selfie_dir: Some(PathBuf::from("user_selfies")),
            model_dir: findme_core::default_model_dir(),
            match_threshold: findme_core::DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl Config {
    /// Load configuration: `FINDME_CONFIG` file if set, then `FINDME_*` overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match std::env::var("FINDME_CONFIG") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config file; missing keys keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FINDME_SOURCE_DIR") {
            self.source_dir = PathBuf::from(v);
        }
        if let Some(v) = var("FINDME_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = var("FINDME_ENCODINGS_PATH") {
            self.encodings_path = PathBuf::from(v);
        }
        if let Some(v) = var("FINDME_SELFIE_DIR") {
            // Empty value turns selfie keeping off.
            self.selfie_dir = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = var("FINDME_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        match var("FINDME_MATCH_THRESHOLD").map(|v| v.parse::<f32>()) {
            Some(Ok(t)) if t > 0.0 => self.match_threshold = t,
            Some(_) => tracing::warn!("ignoring invalid FINDME_MATCH_THRESHOLD"),
            None => {}
        }
    }
}
