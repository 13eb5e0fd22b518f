//! Persistent filename → face embedding store.
//!
//! On disk the store is a zip archive holding two parallel arrays:
//! `embeddings.json` (N × D floats) and `filenames.json` (N strings).

use crate::encoder::{is_image_file, FaceEncoder};
use crate::types::{Embedding, EncodingRecord};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const EMBEDDINGS_ENTRY: &str = "embeddings.json";
const FILENAMES_ENTRY: &str = "filenames.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("encodings file not found: {0}")]
    NotFound(PathBuf),
    #[error("encodings file corrupt: {0}")]
    Corrupt(String),
    #[error("photo source unavailable: {0}")]
    SourceUnavailable(PathBuf),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// NotFound and Corrupt both mean "build it again".
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Corrupt(_))
    }
}

impl From<ZipError> for StoreError {
    fn from(e: ZipError) -> Self {
        match e {
            // A truncated archive reads as EOF: that is corruption, not an I/O fault.
            ZipError::Io(io)
                if !matches!(io.kind(), io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData) =>
            {
                StoreError::Io(io)
            }
            other => StoreError::Corrupt(other.to_string()),
        }
    }
}

/// Ordered face records for the whole gallery.
///
/// Every embedding has the same dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodingStore {
    records: Vec<EncodingRecord>,
}

impl EncodingStore {
    pub fn from_records(records: Vec<EncodingRecord>) -> Result<Self, StoreError> {
        if let Some(first) = records.first() {
            let dim = first.embedding.dim();
            if let Some(bad) = records.iter().find(|r| r.embedding.dim() != dim) {
                return Err(StoreError::Corrupt(format!(
                    "{}: embedding has {} dimensions, expected {dim}",
                    bad.filename,
                    bad.embedding.dim()
                )));
            }
        }
        Ok(Self { records })
    }

    /// Zip the two parallel arrays back into records.
    pub fn from_parallel(
        embeddings: Vec<Vec<f32>>,
        filenames: Vec<String>,
    ) -> Result<Self, StoreError> {
        if embeddings.len() != filenames.len() {
            return Err(StoreError::Corrupt(format!(
                "{} embeddings but {} filenames",
                embeddings.len(),
                filenames.len()
            )));
        }
        let records = embeddings
            .into_iter()
            .zip(filenames)
            .map(|(values, filename)| EncodingRecord {
                filename,
                embedding: Embedding::new(values),
            })
            .collect();
        Self::from_records(records)
    }

    pub fn records(&self) -> &[EncodingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embedding dimension, `None` for an empty store.
    pub fn dim(&self) -> Option<usize> {
        self.records.first().map(|r| r.embedding.dim())
    }

    /// Number of distinct photos with at least one face.
    pub fn photo_count(&self) -> usize {
        let mut names: Vec<&str> = self.records.iter().map(|r| r.filename.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }

    /// Write the store to `path`, replacing any previous file.
    ///
    /// Goes through a sibling temp file so readers never see a half-written archive.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let embeddings: Vec<&[f32]> = self.records.iter().map(|r| r.embedding.values.as_slice()).collect();
        let filenames: Vec<&str> = self.records.iter().map(|r| r.filename.as_str()).collect();

        let tmp = path.with_extension("tmp");
        {
            let mut zip = ZipWriter::new(BufWriter::new(File::create(&tmp)?));
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

            zip.start_file(EMBEDDINGS_ENTRY, options)?;
            serde_json::to_writer(&mut zip, &embeddings).map_err(io::Error::from)?;
            zip.start_file(FILENAMES_ENTRY, options)?;
            serde_json::to_writer(&mut zip, &filenames).map_err(io::Error::from)?;

            zip.finish()?.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        tracing::debug!(path = %path.display(), records = self.len(), "encodings saved");
        Ok(())
    }

    /// Read a store written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut archive = ZipArchive::new(BufReader::new(file))?;
        let embeddings: Vec<Vec<f32>> = read_json_entry(&mut archive, EMBEDDINGS_ENTRY)?;
        let filenames: Vec<String> = read_json_entry(&mut archive, FILENAMES_ENTRY)?;

        Self::from_parallel(embeddings, filenames)
    }
}

fn read_json_entry<R, T>(archive: &mut ZipArchive<R>, name: &str) -> Result<T, StoreError>
where
    R: Read + io::Seek,
    T: serde::de::DeserializeOwned,
{
    let mut entry = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => StoreError::Corrupt(format!("missing entry {name}")),
        other => other.into(),
    })?;
    let mut raw = Vec::new();
    // Checksum and inflate failures surface here as io errors.
    entry
        .read_to_end(&mut raw)
        .map_err(|e| StoreError::Corrupt(format!("{name}: {e}")))?;
    serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt(format!("{name}: {e}")))
}

/// Outcome of a full gallery scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSummary {
    pub embeddings: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub elapsed: Duration,
}

impl std::fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} face encodings from {} photos ({} skipped) in {:.1}s",
            self.embeddings,
            self.files_processed,
            self.files_skipped,
            self.elapsed.as_secs_f32()
        )
    }
}

/// Gallery image files in `source_dir`, sorted by name.
///
/// A missing directory or one with no image files is `SourceUnavailable`.
pub fn list_gallery(source_dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = match std::fs::read_dir(source_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::SourceUnavailable(source_dir.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(StoreError::SourceUnavailable(source_dir.to_path_buf()));
    }
    Ok(files)
}

/// Encode every gallery photo in `source_dir`.
///
/// Photos that fail to decode or contain no face are skipped and counted.
pub fn build_store(
    source_dir: &Path,
    encoder: &mut dyn FaceEncoder,
) -> Result<(EncodingStore, BuildSummary), StoreError> {
    let started = Instant::now();
    let files = list_gallery(source_dir)?;
    tracing::info!(dir = %source_dir.display(), files = files.len(), "scanning gallery");

    let mut records = Vec::new();
    let mut summary = BuildSummary::default();

    for path in &files {
        summary.files_processed += 1;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let embeddings = match encoder.encode_file(path) {
            Ok(embeddings) => embeddings,
            Err(e) => {
                tracing::warn!(file = %filename, error = %e, "skipping photo");
                summary.files_skipped += 1;
                continue;
            }
        };

        if embeddings.is_empty() {
            tracing::debug!(file = %filename, "no faces found");
            summary.files_skipped += 1;
            continue;
        }

        tracing::debug!(file = %filename, faces = embeddings.len(), "encoded photo");
        records.extend(embeddings.into_iter().map(|embedding| EncodingRecord {
            filename: filename.clone(),
            embedding,
        }));
    }

    let store = EncodingStore::from_records(records)?;
    summary.embeddings = store.len();
    summary.elapsed = started.elapsed();

    Ok((store, summary))
}
