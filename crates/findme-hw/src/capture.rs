//! Selfie capture: a frame source plus somewhere to keep the saved shot.
//!
//! The capture loop blocks on the caller's `next_action` for every step and
//! has no timeout; the user ends it by saving or quitting.

use crate::camera::{Camera, CameraError};
use crate::frame::Frame;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame buffer does not match {width}x{height}")]
    MalformedFrame { width: u32, height: u32 },
    #[error("failed to save selfie: {0}")]
    Save(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can hand out a frame on demand.
pub trait FrameSource {
    fn capture_frame(&mut self) -> Result<Frame, CameraError>;
}

impl FrameSource for Camera {
    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        Camera::capture_frame(self)
    }
}

/// What the user asked for at the capture prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureAction {
    Save,
    Quit,
}

/// Directory where captured selfies are written as JPEG.
pub struct SelfieStore {
    dir: PathBuf,
}

impl SelfieStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `frame` as `selfie_<user>_<8 hex>.jpg` and return its path.
    pub fn save(&self, frame: &Frame, user: &str) -> Result<PathBuf, CaptureError> {
        let image = frame.to_image().ok_or(CaptureError::MalformedFrame {
            width: frame.width,
            height: frame.height,
        })?;

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("selfie_{}_{}.jpg", file_stem_safe(user), short_id()));
        image.save_with_format(&path, ImageFormat::Jpeg)?;

        tracing::info!(path = %path.display(), seq = frame.sequence, "selfie saved");
        Ok(path)
    }
}

/// Drive `source` until the user saves a usable frame or quits.
///
/// Dark frames are refused and the user is asked again. Returns `None` on quit.
pub fn capture_selfie(
    source: &mut dyn FrameSource,
    store: &SelfieStore,
    user: &str,
    mut next_action: impl FnMut() -> CaptureAction,
) -> Result<Option<PathBuf>, CaptureError> {
    loop {
        match next_action() {
            CaptureAction::Quit => {
                tracing::info!("selfie capture cancelled");
                return Ok(None);
            }
            CaptureAction::Save => {
                let frame = source.capture_frame()?;
                if frame.is_dark() {
                    tracing::warn!(
                        brightness = frame.avg_brightness(),
                        "frame too dark, not saved"
                    );
                    continue;
                }
                return store.save(&frame, user).map(Some);
            }
        }
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn file_stem_safe(user: &str) -> String {
    let cleaned: String = user
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    struct MockCamera {
        frames: VecDeque<Frame>,
        captured: usize,
    }

    impl MockCamera {
        fn with_brightness(levels: &[u8]) -> Self {
            let frames = levels
                .iter()
                .enumerate()
                .map(|(i, &level)| Frame {
                    data: vec![level; 8 * 6 * 3],
                    width: 8,
                    height: 6,
                    timestamp: std::time::Instant::now(),
                    sequence: i as u32,
                })
                .collect();
            Self { frames, captured: 0 }
        }
    }

    impl FrameSource for MockCamera {
        fn capture_frame(&mut self) -> Result<Frame, CameraError> {
            self.captured += 1;
            self.frames
                .pop_front()
                .ok_or_else(|| CameraError::CaptureFailed("mock exhausted".into()))
        }
    }

    #[test]
    fn test_save_writes_decodable_jpeg() {
        let dir = TempDir::new().unwrap();
        let mut camera = MockCamera::with_brightness(&[180]);
        let store = SelfieStore::new(dir.path().join("selfies"));

        let path = capture_selfie(&mut camera, &store, "5551234567", || CaptureAction::Save)
            .unwrap()
            .expect("selfie path");

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("selfie_5551234567_"), "{name}");
        assert!(name.ends_with(".jpg"));
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (8, 6));
    }

    #[test]
    fn test_quit_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let mut camera = MockCamera::with_brightness(&[180]);
        let store = SelfieStore::new(dir.path());

        let result = capture_selfie(&mut camera, &store, "u", || CaptureAction::Quit).unwrap();
        assert!(result.is_none());
        assert_eq!(camera.captured, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_dark_frame_asks_again() {
        let dir = TempDir::new().unwrap();
        let mut camera = MockCamera::with_brightness(&[0, 200]);
        let store = SelfieStore::new(dir.path());

        let mut prompts = 0;
        let result = capture_selfie(&mut camera, &store, "u", || {
            prompts += 1;
            CaptureAction::Save
        })
        .unwrap();

        assert!(result.is_some());
        assert_eq!(prompts, 2);
        assert_eq!(camera.captured, 2);
    }

    #[test]
    fn test_camera_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let mut camera = MockCamera::with_brightness(&[]);
        let store = SelfieStore::new(dir.path());

        let err = capture_selfie(&mut camera, &store, "u", || CaptureAction::Save).unwrap_err();
        assert!(matches!(err, CaptureError::Camera(_)));
    }

    #[test]
    fn test_file_stem_safe() {
        assert_eq!(file_stem_safe("555-123 4567"), "555-123_4567");
        assert_eq!(file_stem_safe(""), "user");
    }
}
