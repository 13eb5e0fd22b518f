//! The find-my-photos request pipeline.
//!
//! validate → resolve encodings → encode selfie → match → organize.
//! Every request produces a human-readable status text; failures end the
//! pipeline early but are still reported through that text.

use crate::config::Config;
use crate::organizer::PhotoOrganizer;
use crate::validation::{validate_email, validate_phone, InputError};
use findme_core::{
    BuildSummary, CacheSource, EncodeError, EncodingCache, EuclideanMatcher, FaceEncoder, Matcher,
    StoreError,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),
    #[error("no face detected in the selfie; please upload a clearer photo")]
    NoFaceDetected,
    #[error("photo collection {0} is missing or has no images")]
    SourceUnavailable(PathBuf),
    #[error("encoding store error: {0}")]
    Store(StoreError),
    #[error("face encoder failed: {0}")]
    Encoder(EncodeError),
}

impl From<StoreError> for RequestError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SourceUnavailable(dir) => Self::SourceUnavailable(dir),
            other => Self::Store(other),
        }
    }
}

impl From<EncodeError> for RequestError {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::Unreadable(msg) => Self::InvalidInput(InputError::UnreadableSelfie(msg)),
            other => Self::Encoder(other),
        }
    }
}

/// One find-my-photos request.
#[derive(Debug, Clone, Default)]
pub struct FindRequest {
    pub phone: String,
    pub email: String,
    /// Encoded image bytes (JPEG, PNG, ...).
    pub selfie: Vec<u8>,
    pub force_rescan: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindResponse {
    /// Newline-separated progress and result lines.
    pub status: String,
    /// Copied photos in the user's folder.
    pub previews: Vec<PathBuf>,
    pub archive: Option<PathBuf>,
}

#[derive(Default)]
struct StatusLog {
    lines: Vec<String>,
}

impl StatusLog {
    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn finish(self) -> String {
        self.lines.join("\n")
    }
}

/// Owns everything a request touches: encoder, cache, matcher and organizer.
///
/// Not shared; callers serialize requests (see `engine`).
pub struct RequestHandler<E> {
    config: Config,
    encoder: E,
    cache: EncodingCache,
    matcher: EuclideanMatcher,
    organizer: PhotoOrganizer,
}

impl<E: FaceEncoder> RequestHandler<E> {
    pub fn new(config: Config, encoder: E) -> Self {
        let cache = EncodingCache::new(&config.encodings_path, &config.source_dir);
        let matcher = EuclideanMatcher::new(config.match_threshold);
        let organizer = PhotoOrganizer::new(&config.source_dir, &config.output_dir);
        Self {
            config,
            encoder,
            cache,
            matcher,
            organizer,
        }
    }

    /// Load the persisted encodings, if there are any, ahead of the first request.
    pub fn warm(&mut self) {
        match self.cache.load() {
            Ok(_) => {}
            Err(StoreError::NotFound(path)) => {
                tracing::info!(path = %path.display(), "no cached encodings; first request builds them");
            }
            Err(e) => tracing::warn!(error = %e, "cached encodings not loaded"),
        }
    }

    pub fn handle(&mut self, request: &FindRequest) -> FindResponse {
        let mut log = StatusLog::default();
        match self.run(request, &mut log) {
            Ok((previews, archive)) => FindResponse {
                status: log.finish(),
                previews,
                archive,
            },
            Err(e) => {
                tracing::warn!(error = %e, "request failed");
                log.push(format!("Error: {e}"));
                FindResponse {
                    status: log.finish(),
                    ..FindResponse::default()
                }
            }
        }
    }

    fn run(
        &mut self,
        request: &FindRequest,
        log: &mut StatusLog,
    ) -> Result<(Vec<PathBuf>, Option<PathBuf>), RequestError> {
        let phone = validate_phone(&request.phone)?;
        validate_email(&request.email)?;
        if request.selfie.is_empty() {
            return Err(InputError::MissingSelfie.into());
        }
        tracing::info!(user = phone, force_rescan = request.force_rescan, "find request");
        log.push(format!("Request received for {phone}."));

        if let Some(dir) = &self.config.selfie_dir {
            keep_selfie(dir, phone, &request.selfie);
        }

        let (store, source) = self
            .cache
            .resolve(&mut self.encoder, request.force_rescan)?;
        match source {
            CacheSource::Rebuilt(summary) => log.push(format!("Scanned photo collection: {summary}.")),
            CacheSource::Memory | CacheSource::Disk => log.push(format!(
                "Using {} cached face encodings from {} photos.",
                store.len(),
                store.photo_count()
            )),
        }
        if store.is_empty() {
            log.push("Warning: no faces are known from the photo collection.");
        }

        let probe = self
            .encoder
            .encode_first(&request.selfie)?
            .ok_or(RequestError::NoFaceDetected)?;
        log.push("Selfie processed.");

        let result = self.matcher.find(&probe, store);
        tracing::info!(
            user = phone,
            matches = result.len(),
            best_distance = ?result.best_distance,
            "matching done"
        );
        if result.is_empty() {
            log.push("No matching photos found in the collection.");
        } else {
            log.push(format!("Found {} matching photo(s).", result.len()));
        }

        // The user's folder is reset even when nothing matched.
        let organized = match self.organizer.organize(phone, &result.filenames) {
            Ok(organized) => organized,
            Err(e) => {
                log.push(format!("Could not prepare your photo folder: {e}"));
                return Ok((Vec::new(), None));
            }
        };
        if organized.copied.is_empty() && organized.skipped.is_empty() {
            return Ok((Vec::new(), None));
        }
        if !organized.skipped.is_empty() {
            log.push(format!(
                "{} matched photo(s) could not be copied.",
                organized.skipped.len()
            ));
        }
        log.push(format!(
            "Copied {} photo(s) to {}.",
            organized.copied.len(),
            organized.folder.display()
        ));

        let archive = match organized.archive {
            Ok(Some(path)) => {
                log.push(format!("Download ready: {}", path.display()));
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                log.push(format!("Archive failed ({e}); photos are still in your folder."));
                None
            }
        };

        Ok((organized.copied, archive))
    }

    /// Re-encode the gallery now, regardless of the cache state.
    pub fn rescan(&mut self) -> Result<BuildSummary, RequestError> {
        Ok(self.cache.rebuild(&mut self.encoder)?)
    }

    /// Snapshot of daemon state for the `Status` call.
    pub fn status(&self) -> serde_json::Value {
        let store = self.cache.store();
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "source_dir": self.config.source_dir.display().to_string(),
            "encodings_path": self.cache.path().display().to_string(),
            "encodings_loaded": store.is_some(),
            "encodings": store.map(|s| s.len()).unwrap_or(0),
            "photos_with_faces": store.map(|s| s.photo_count()).unwrap_or(0),
            "stale": self.cache.is_stale(),
            "match_threshold": self.matcher.threshold,
        })
    }
}

/// Keep a copy of the uploaded selfie. Failures are logged only.
fn keep_selfie(dir: &Path, user: &str, bytes: &[u8]) {
    let ext = image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("jpg");
    let id = uuid::Uuid::new_v4().simple().to_string();
    let path = dir.join(format!("uploaded_selfie_{user}_{}.{ext}", &id[..8]));

    let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, bytes));
    match written {
        Ok(()) => tracing::debug!(path = %path.display(), "selfie kept"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to keep selfie"),
    }
}
