//! Recorded sessions played back through the live pipeline.
//!
//! A recording is a JSON file of per-frame detector output. It splits into a
//! [`ReplaySource`] that yields one frame per entry and a [`ReplayDetector`]
//! that answers each frame with the recorded detections (or error).

use crate::camera::{CameraError, CaptureRequest, VideoSource, VideoStream};
use crate::frame::Frame;
use poise_core::{Detector, DetectorError, DetectorOptions, FrameSize, RawDetection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read recording {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid recording: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Detector output captured for one frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedFrame {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
    /// Set when the detector failed on this frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecording {
    /// Resolution the landmarks were recorded against.
    #[serde(default)]
    pub frame_size: FrameSize,
    pub frames: Vec<RecordedFrame>,
}

impl SessionRecording {
    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ReplayError> {
        let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn into_replay(self) -> (ReplaySource, ReplayDetector) {
        let source = ReplaySource {
            frame_size: self.frame_size,
            frame_count: self.frames.len(),
            releases: Arc::new(AtomicUsize::new(0)),
        };
        let detector = ReplayDetector {
            frames: self.frames,
        };
        (source, detector)
    }
}

/// Video source that plays back a recording's frames in order.
pub struct ReplaySource {
    frame_size: FrameSize,
    frame_count: usize,
    releases: Arc<AtomicUsize>,
}

impl ReplaySource {
    /// Counts how many opened streams have had their tracks stopped.
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.releases.clone()
    }
}

impl VideoSource for ReplaySource {
    fn open(&mut self, request: &CaptureRequest) -> Result<Box<dyn VideoStream>, CameraError> {
        tracing::debug!(
            requested_width = request.width,
            requested_height = request.height,
            frames = self.frame_count,
            "opening replay stream"
        );
        Ok(Box::new(ReplayStream {
            frame_size: self.frame_size,
            frame_count: self.frame_count,
            next: 0,
            stopped: false,
            releases: self.releases.clone(),
        }))
    }
}

struct ReplayStream {
    frame_size: FrameSize,
    frame_count: usize,
    next: usize,
    stopped: bool,
    releases: Arc<AtomicUsize>,
}

impl VideoStream for ReplayStream {
    fn size(&self) -> FrameSize {
        self.frame_size
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        if self.stopped {
            return Err(CameraError::CaptureFailed("stream stopped".into()));
        }
        if self.next >= self.frame_count {
            return Err(CameraError::EndOfStream);
        }
        let sequence = self.next as u32;
        self.next += 1;
        Ok(Frame {
            data: Vec::new(),
            width: self.frame_size.width,
            height: self.frame_size.height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    fn stop_tracks(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Detector answering each frame with what was recorded for its sequence number.
pub struct ReplayDetector {
    frames: Vec<RecordedFrame>,
}

impl Detector<Frame> for ReplayDetector {
    fn detect(&mut self, frame: &Frame, _options: &DetectorOptions) -> Result<Vec<RawDetection>, DetectorError> {
        match self.frames.get(frame.sequence as usize) {
            Some(RecordedFrame { error: Some(msg), .. }) => Err(DetectorError::DetectionFailed(msg.clone())),
            Some(recorded) => Ok(recorded.detections.clone()),
            None => Ok(Vec::new()),
        }
    }
}
