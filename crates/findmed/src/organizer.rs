//! Per-user result folders and their download archives.

use regex::Regex;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Folder name used when a user id sanitizes to nothing.
pub const UNKNOWN_USER_DIR: &str = "unknown_user";

#[derive(Error, Debug)]
pub enum OrganizeError {
    #[error("cannot prepare folder {path}: {source}")]
    Folder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Outcome of organizing one user's matches.
#[derive(Debug)]
pub struct Organized {
    pub folder: PathBuf,
    /// Copied photos, in filename order.
    pub copied: Vec<PathBuf>,
    /// Matched filenames that could not be copied.
    pub skipped: Vec<String>,
    /// `Ok(None)` when nothing was copied.
    pub archive: Result<Option<PathBuf>, OrganizeError>,
}

fn strip_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\s-]").expect("static regex"))
}

fn separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[-\s]+").expect("static regex"))
}

/// Reduce a user id to a safe single-component folder name.
///
/// Drops everything but word characters, whitespace and hyphens, trims, and
/// collapses runs of hyphens/whitespace into one hyphen.
pub fn sanitize_folder_name(name: &str) -> String {
    let stripped = strip_pattern().replace_all(name, "");
    let collapsed = separator_pattern().replace_all(stripped.trim(), "-");
    if collapsed.is_empty() {
        UNKNOWN_USER_DIR.to_string()
    } else {
        collapsed.into_owned()
    }
}

/// Copies matched gallery photos into `<output>/<user>/` and zips them.
pub struct PhotoOrganizer {
    source_dir: PathBuf,
    output_dir: PathBuf,
}

impl PhotoOrganizer {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Rebuild the user's folder from scratch with exactly the matched photos.
    ///
    /// Copy failures skip the file. Archive failures are reported in the
    /// outcome; only a folder that cannot be reset fails the call.
    pub fn organize(
        &self,
        user_id: &str,
        matched: &BTreeSet<String>,
    ) -> Result<Organized, OrganizeError> {
        let user = sanitize_folder_name(user_id);
        let folder = self.output_dir.join(&user);
        reset_dir(&folder).map_err(|source| OrganizeError::Folder {
            path: folder.clone(),
            source,
        })?;

        let mut copied = Vec::new();
        let mut skipped = Vec::new();
        for name in matched {
            if !is_plain_file_name(name) {
                tracing::warn!(file = %name, "refusing to copy non-plain filename");
                skipped.push(name.clone());
                continue;
            }
            let dest = folder.join(name);
            match fs::copy(self.source_dir.join(name), &dest) {
                Ok(_) => copied.push(dest),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "failed to copy matched photo");
                    skipped.push(name.clone());
                }
            }
        }
        tracing::info!(
            user = %user,
            copied = copied.len(),
            skipped = skipped.len(),
            "organized matched photos"
        );

        let archive = if copied.is_empty() {
            Ok(None)
        } else {
            let path = self
                .output_dir
                .join(format!("matched_photos_{user}_{}.zip", short_id()));
            match write_archive(&copied, &path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), files = copied.len(), "archive written");
                    Ok(Some(path))
                }
                Err(source) => {
                    let _ = fs::remove_file(&path);
                    tracing::warn!(path = %path.display(), error = %source, "archive failed");
                    Err(OrganizeError::Archive { path, source })
                }
            }
        };

        Ok(Organized {
            folder,
            copied,
            skipped,
            archive,
        })
    }
}

fn reset_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

fn is_plain_file_name(name: &str) -> bool {
    Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

fn write_archive(files: &[PathBuf], path: &Path) -> ZipResult<()> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        zip.start_file(name, options)?;
        io::copy(&mut File::open(file)?, &mut zip)?;
    }
    zip.finish()?.flush()?;
    Ok(())
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
