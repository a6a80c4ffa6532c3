//! poise-core — Face-metrics derivation for interview practice sessions.
//!
//! Turns raw landmark/expression detections into per-frame signals (eye
//! contact, head position, confidence) and folds them into a session summary.
//! Nothing here depends on a particular detector library.

pub mod confidence;
pub mod detector;
pub mod extractor;
pub mod geometry;
pub mod session;
pub mod types;

pub use confidence::aggregate_confidence;
pub use detector::{Detector, DetectorError, DetectorOptions, RawDetection};
pub use extractor::{ExtractorConfig, FaceSelection, FrameExtractor, FrameOutcome};
pub use geometry::{eye_contact, head_position};
pub use session::{SessionAggregator, SessionFaceSummary};
pub use types::{
    Expression, ExpressionScores, FaceLandmarks, FaceMetrics, FrameSize, HeadPosition,
    LandmarkPoint, MetricsError,
};
