//! poise-capture — Frame capture and the detection loop around poise-core.
//!
//! Owns the camera while streaming, paces detector passes to a fixed rate,
//! tracks model readiness, and can replay recorded sessions in place of a
//! live camera and detector.

pub mod camera;
pub mod engine;
pub mod frame;
pub mod models;
pub mod replay;
pub mod state;

pub use camera::{CameraError, CaptureGuard, CaptureRequest, FacingMode, VideoSource, VideoStream};
pub use engine::{spawn_capture, CaptureConfig, CaptureHandle, EngineError, SessionReport, StreamStatus};
pub use frame::Frame;
pub use models::{ModelArtifact, ModelError, ModelStatus};
pub use replay::{ReplayDetector, ReplaySource, SessionRecording};
pub use state::{CaptureState, FramePacer, StreamFlag};
