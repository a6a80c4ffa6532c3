//! Aggregate per-frame confidence.

use crate::types::ExpressionScores;

/// Average of the detector's face score and the strongest expression score.
///
/// Favors frames where the detector is sure a face exists and the classifier
/// is sure of its read. Inputs in [0, 1] give an output in [0, 1].
pub fn aggregate_confidence(detection_score: f32, expressions: &ExpressionScores) -> f32 {
    (detection_score + expressions.max_score()) / 2.0
}
