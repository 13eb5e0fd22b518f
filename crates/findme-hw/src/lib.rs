//! Webcam access for selfie capture.
//!
//! Provides V4L2-based camera capture, RGB frame conversion and the
//! capture loop used to take a selfie.

pub mod camera;
pub mod capture;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use capture::{capture_selfie, CaptureAction, CaptureError, FrameSource, SelfieStore};
pub use frame::Frame;
