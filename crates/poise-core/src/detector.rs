//! Detector seam: what the metrics layer needs from a face detector.
//!
//! Any landmark + expression detector can sit behind [`Detector`] as long as
//! it reports its results as [`RawDetection`] values.

use crate::types::{ExpressionScores, FaceLandmarks, MetricsError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Defaults tuned for a light detector running on every capture tick.
const DEFAULT_INPUT_SIZE: u32 = 224;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector not ready: models are not loaded")]
    NotReady,
    #[error("detection failed: {0}")]
    DetectionFailed(String),
}

/// Options passed to the detector on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorOptions {
    /// Square input size the detector resizes frames to.
    pub input_size: u32,
    /// Minimum face score the detector itself reports.
    pub score_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

/// One face as reported by a detector, before any metric derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Detector certainty that this is a face, in [0, 1].
    pub score: f32,
    pub landmarks: FaceLandmarks,
    pub expressions: ExpressionScores,
}

impl RawDetection {
    /// Reject detections the metric functions cannot consume.
    pub fn validate(&self) -> Result<(), MetricsError> {
        if !(0.0..=1.0).contains(&self.score) {
            return Err(MetricsError::ScoreOutOfRange {
                field: "detection",
                value: self.score,
            });
        }
        self.expressions.validate()?;
        self.landmarks.validate()
    }
}

/// A face detector producing landmarks and expression scores for frame type `F`.
///
/// Calls are sequential: the capture engine never issues a second `detect`
/// before the first returns.
pub trait Detector<F: ?Sized> {
    fn detect(
        &mut self,
        frame: &F,
        options: &DetectorOptions,
    ) -> Result<Vec<RawDetection>, DetectorError>;
}

impl<F: ?Sized, D: Detector<F> + ?Sized> Detector<F> for Box<D> {
    fn detect(
        &mut self,
        frame: &F,
        options: &DetectorOptions,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        (**self).detect(frame, options)
    }
}
