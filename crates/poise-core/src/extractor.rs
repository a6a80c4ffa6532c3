//! Per-frame metrics extraction.
//!
//! Runs one detection pass, picks a single face, derives eye contact, head
//! position and confidence, and drops frames at or below the confidence gate.
//! Apart from calling the detector this is pure.

use crate::confidence::aggregate_confidence;
use crate::detector::{Detector, DetectorOptions, RawDetection};
use crate::geometry::{eye_contact, head_position};
use crate::types::{FaceMetrics, FrameSize, MetricsError};
use serde::{Deserialize, Serialize};

/// Frames whose aggregate confidence is not above this are treated as noise.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Which face to analyze when the detector reports several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaceSelection {
    /// The first detection in detector order.
    #[default]
    First,
    /// The detection with the highest face score (first wins ties).
    HighestScore,
}

impl FaceSelection {
    /// The detection to analyze, or `None` when there are none.
    pub fn select(self, detections: &[RawDetection]) -> Option<&RawDetection> {
        match self {
            FaceSelection::First => detections.first(),
            FaceSelection::HighestScore => {
                let mut best: Option<&RawDetection> = None;
                for det in detections {
                    if best.map_or(true, |b| det.score > b.score) {
                        best = Some(det);
                    }
                }
                best
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorConfig {
    /// Confidence gate; frames must score strictly above it.
    pub min_confidence: f32,
    pub face_selection: FaceSelection,
    pub detector_options: DetectorOptions,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            face_selection: FaceSelection::default(),
            detector_options: DetectorOptions::default(),
        }
    }
}

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Accepted(FaceMetrics),
    /// No face in the frame. A normal outcome.
    NoFace,
    /// A face was found but its confidence did not clear the gate.
    BelowGate { confidence: f32 },
    /// The selected detection could not be turned into metrics.
    Invalid(MetricsError),
    /// The detector itself failed on this frame.
    DetectorFailed(String),
}

impl FrameOutcome {
    pub fn into_metrics(self) -> Option<FaceMetrics> {
        match self {
            FrameOutcome::Accepted(metrics) => Some(metrics),
            _ => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, FrameOutcome::Accepted(_))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameExtractor {
    config: ExtractorConfig,
}

impl FrameExtractor {
    /// Extractor applying `config` to every frame.
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Gate, face selection and detector options in effect.
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Metrics for one frame, or `None` when nothing usable was found.
    pub fn extract<F, D>(&self, detector: &mut D, frame: &F, frame_size: FrameSize) -> Option<FaceMetrics>
    where
        F: ?Sized,
        D: Detector<F> + ?Sized,
    {
        self.extract_detailed(detector, frame, frame_size).into_metrics()
    }

    /// Like [`extract`](Self::extract) but reports why a frame was dropped.
    pub fn extract_detailed<F, D>(&self, detector: &mut D, frame: &F, frame_size: FrameSize) -> FrameOutcome
    where
        F: ?Sized,
        D: Detector<F> + ?Sized,
    {
        let detections = match detector.detect(frame, &self.config.detector_options) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed; skipping frame");
                return FrameOutcome::DetectorFailed(e.to_string());
            }
        };

        let Some(face) = self.config.face_selection.select(&detections) else {
            return FrameOutcome::NoFace;
        };
        if detections.len() > 1 {
            tracing::debug!(
                faces = detections.len(),
                policy = ?self.config.face_selection,
                "multiple faces detected; analyzing one"
            );
        }

        let metrics = match derive_metrics(face, frame_size) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "unusable detection; skipping frame");
                return FrameOutcome::Invalid(e);
            }
        };

        if metrics.confidence > self.config.min_confidence {
            FrameOutcome::Accepted(metrics)
        } else {
            tracing::trace!(confidence = metrics.confidence, "below confidence gate");
            FrameOutcome::BelowGate {
                confidence: metrics.confidence,
            }
        }
    }
}

/// Derive metrics from a single detection, without any gating.
pub fn derive_metrics(face: &RawDetection, frame_size: FrameSize) -> Result<FaceMetrics, MetricsError> {
    face.validate()?;
    let eye_contact = eye_contact(face.landmarks.left_eye_points(), face.landmarks.right_eye_points())?;
    let head_position = head_position(&face.landmarks.positions, frame_size)?;
    let confidence = aggregate_confidence(face.score, &face.expressions);

    Ok(FaceMetrics {
        expressions: face.expressions,
        eye_contact,
        head_position,
        confidence,
    })
}
