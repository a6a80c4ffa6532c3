//! Camera access: capture constraints, the source/stream seam, and scoped
//! ownership of an open stream.

use crate::frame::Frame;
use poise_core::FrameSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("end of stream")]
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Constraints requested when opening the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
    pub ideal_frame_rate: u32,
    pub max_frame_rate: u32,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            facing_mode: FacingMode::User,
            ideal_frame_rate: 15,
            max_frame_rate: 20,
        }
    }
}

/// Something that can hand out a video stream, e.g. a webcam.
pub trait VideoSource {
    fn open(&mut self, request: &CaptureRequest) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// An open, exclusively owned video stream.
pub trait VideoStream: Send {
    /// Negotiated resolution, which may differ from the request.
    fn size(&self) -> FrameSize;

    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Stop every track of the stream and give the device back.
    fn stop_tracks(&mut self);
}

/// Owns an open stream for as long as streaming is on.
///
/// Tracks are stopped exactly once: on [`release`](Self::release) or on drop,
/// whichever comes first.
pub struct CaptureGuard {
    stream: Box<dyn VideoStream>,
    released: bool,
}

impl CaptureGuard {
    pub fn new(stream: Box<dyn VideoStream>) -> Self {
        let size = stream.size();
        tracing::info!(width = size.width, height = size.height, "camera acquired");
        Self {
            stream,
            released: false,
        }
    }

    pub fn size(&self) -> FrameSize {
        self.stream.size()
    }

    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        self.stream.next_frame()
    }

    pub fn release(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if !self.released {
            self.stream.stop_tracks();
            self.released = true;
            tracing::info!("camera released");
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.stop();
    }
}
