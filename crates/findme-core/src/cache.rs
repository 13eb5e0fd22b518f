//! In-process cache over the on-disk encoding store.
//!
//! The gallery is only re-encoded when asked to (`force`, [`EncodingCache::invalidate`])
//! or when the file on disk is missing or unreadable. New photos dropped into
//! the source directory are never noticed on their own.

use crate::encoder::FaceEncoder;
use crate::store::{build_store, BuildSummary, EncodingStore, StoreError};
use std::path::{Path, PathBuf};

/// Where the store handed out by [`EncodingCache::resolve`] came from.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheSource {
    Memory,
    Disk,
    Rebuilt(BuildSummary),
}

pub struct EncodingCache {
    path: PathBuf,
    source_dir: PathBuf,
    store: Option<EncodingStore>,
    stale: bool,
}

impl EncodingCache {
    pub fn new(path: impl Into<PathBuf>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source_dir: source_dir.into(),
            store: None,
            stale: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Store currently held in memory, if any.
    pub fn store(&self) -> Option<&EncodingStore> {
        self.store.as_ref()
    }

    /// True once [`invalidate`](Self::invalidate) was called and no rebuild has happened since.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Force the next [`resolve`](Self::resolve) to rebuild.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Read the store from disk into memory.
    pub fn load(&mut self) -> Result<&EncodingStore, StoreError> {
        let store = EncodingStore::load(&self.path)?;
        Ok(self.adopt(store))
    }

    fn adopt(&mut self, store: EncodingStore) -> &EncodingStore {
        tracing::info!(
            path = %self.path.display(),
            encodings = store.len(),
            photos = store.photo_count(),
            "loaded cached encodings"
        );
        self.store.insert(store)
    }

    /// Re-encode the whole gallery, persist it and replace the in-memory store.
    ///
    /// On failure the previous store is left as it was.
    pub fn rebuild(&mut self, encoder: &mut dyn FaceEncoder) -> Result<BuildSummary, StoreError> {
        let (store, summary) = build_store(&self.source_dir, encoder)?;
        store.save(&self.path)?;
        tracing::info!(path = %self.path.display(), %summary, "encodings rebuilt");

        self.store = Some(store);
        self.stale = false;
        Ok(summary)
    }

    /// Hand out a usable store: memory, then disk, then a full rebuild.
    pub fn resolve(
        &mut self,
        encoder: &mut dyn FaceEncoder,
        force: bool,
    ) -> Result<(&EncodingStore, CacheSource), StoreError> {
        let source = if force || self.stale {
            CacheSource::Rebuilt(self.rebuild(encoder)?)
        } else if self.store.is_some() {
            CacheSource::Memory
        } else {
            match EncodingStore::load(&self.path) {
                Ok(store) => {
                    self.adopt(store);
                    CacheSource::Disk
                }
                Err(e) if e.needs_rebuild() => {
                    tracing::warn!(error = %e, "cached encodings unusable, rebuilding");
                    CacheSource::Rebuilt(self.rebuild(encoder)?)
                }
                Err(e) => return Err(e),
            }
        };

        let store = self
            .store
            .as_ref()
            .ok_or_else(|| StoreError::NotFound(self.path.clone()))?;
        Ok((store, source))
    }
}
