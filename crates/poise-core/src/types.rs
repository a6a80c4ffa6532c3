use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Reference frame assumed when the capture resolution is unknown.
pub const REFERENCE_FRAME_WIDTH: u32 = 640;
pub const REFERENCE_FRAME_HEIGHT: u32 = 480;

/// Eye contour index ranges in the 68-point (iBUG) landmark convention.
pub const LEFT_EYE_68: Range<usize> = 36..42;
pub const RIGHT_EYE_68: Range<usize> = 42..48;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("insufficient landmarks: {0} has no points")]
    InsufficientLandmarks(&'static str),
    #[error("invalid frame size {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },
    #[error("{field} score {value} outside [0, 1]")]
    ScoreOutOfRange { field: &'static str, value: f32 },
    #[error("landmark {index} has a non-finite coordinate")]
    NonFiniteLandmark { index: usize },
}

/// One detected facial keypoint, in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Full landmark set of one face, plus where each eye contour lives in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceLandmarks {
    pub positions: Vec<LandmarkPoint>,
    #[serde(default = "default_left_eye")]
    pub left_eye: Range<usize>,
    #[serde(default = "default_right_eye")]
    pub right_eye: Range<usize>,
}

fn default_left_eye() -> Range<usize> {
    LEFT_EYE_68
}

fn default_right_eye() -> Range<usize> {
    RIGHT_EYE_68
}

impl FaceLandmarks {
    /// First point with a NaN or infinite coordinate fails.
    pub fn validate(&self) -> Result<(), MetricsError> {
        match self
            .positions
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            Some(index) => Err(MetricsError::NonFiniteLandmark { index }),
            None => Ok(()),
        }
    }

    /// Landmarks laid out in the 68-point convention.
    pub fn from_68_points(positions: Vec<LandmarkPoint>) -> Self {
        Self {
            positions,
            left_eye: LEFT_EYE_68,
            right_eye: RIGHT_EYE_68,
        }
    }

    /// Left eye contour. Empty if the range does not fit the point set.
    pub fn left_eye_points(&self) -> &[LandmarkPoint] {
        self.positions.get(self.left_eye.clone()).unwrap_or(&[])
    }

    /// Right eye contour. Empty if the range does not fit the point set.
    pub fn right_eye_points(&self) -> &[LandmarkPoint] {
        self.positions.get(self.right_eye.clone()).unwrap_or(&[])
    }
}

/// Number of labels in [`Expression::ALL`].
pub const EXPRESSION_COUNT: usize = 7;

/// The closed set of expression labels, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    pub const ALL: [Expression; EXPRESSION_COUNT] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
        Expression::Fearful,
        Expression::Disgusted,
        Expression::Surprised,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
        }
    }

    /// Emoji shown next to the live video for this expression.
    pub fn emoji(self) -> &'static str {
        match self {
            Expression::Neutral => "😐",
            Expression::Happy => "😊",
            Expression::Sad => "😢",
            Expression::Angry => "😠",
            Expression::Fearful => "😨",
            Expression::Disgusted => "🤢",
            Expression::Surprised => "😲",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-label expression classifier output for one face.
///
/// Each score lies in [0, 1]; the scores need not sum to exactly 1.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpressionScores {
    pub neutral: f32,
    pub happy: f32,
    pub sad: f32,
    pub angry: f32,
    pub fearful: f32,
    pub disgusted: f32,
    pub surprised: f32,
}

impl ExpressionScores {
    pub fn get(&self, expression: Expression) -> f32 {
        match expression {
            Expression::Neutral => self.neutral,
            Expression::Happy => self.happy,
            Expression::Sad => self.sad,
            Expression::Angry => self.angry,
            Expression::Fearful => self.fearful,
            Expression::Disgusted => self.disgusted,
            Expression::Surprised => self.surprised,
        }
    }

    /// Scores paired with their labels, in the fixed label order.
    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        Expression::ALL.into_iter().map(|e| (e, self.get(e)))
    }

    /// Highest score across all labels.
    pub fn max_score(&self) -> f32 {
        self.iter().map(|(_, s)| s).fold(0.0f32, f32::max)
    }

    /// Label with the highest score; ties go to the earliest label in
    /// [`Expression::ALL`].
    pub fn dominant(&self) -> Expression {
        let mut best = Expression::Neutral;
        let mut best_score = f32::NEG_INFINITY;
        for (expression, score) in self.iter() {
            if score > best_score {
                best = expression;
                best_score = score;
            }
        }
        best
    }

    /// Check that every score is a finite value in [0, 1].
    pub fn validate(&self) -> Result<(), MetricsError> {
        for (expression, score) in self.iter() {
            if !(0.0..=1.0).contains(&score) {
                return Err(MetricsError::ScoreOutOfRange {
                    field: expression.as_str(),
                    value: score,
                });
            }
        }
        Ok(())
    }
}

/// Capture resolution used as the normalization frame for head position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::new(REFERENCE_FRAME_WIDTH, REFERENCE_FRAME_HEIGHT)
    }
}

/// Face center normalized to the frame: (-1, -1) is top-left, (1, 1) bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadPosition {
    pub x: f32,
    pub y: f32,
}

/// Semantic signals derived from one accepted video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceMetrics {
    pub expressions: ExpressionScores,
    pub eye_contact: bool,
    pub head_position: HeadPosition,
    /// Aggregate confidence in [0, 1].
    pub confidence: f32,
}

impl FaceMetrics {
    pub fn dominant_expression(&self) -> Expression {
        self.expressions.dominant()
    }
}
