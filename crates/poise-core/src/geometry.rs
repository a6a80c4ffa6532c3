//! Landmark geometry: eye contact and normalized head position.
//!
//! Both signals are cheap proxies. A roughly horizontal eye line stands in
//! for "facing the camera"; it is not a gaze estimator.

use crate::types::{FrameSize, HeadPosition, LandmarkPoint, MetricsError};

/// Maximum tilt of the eye line (degrees) still counted as eye contact.
pub const EYE_CONTACT_MAX_ANGLE_DEG: f32 = 20.0;

/// Mean position of a point set.
pub fn centroid(points: &[LandmarkPoint]) -> Option<LandmarkPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(LandmarkPoint::new(sx / n, sy / n))
}

/// Angle in degrees of the line from the left eye centroid to the right eye
/// centroid, relative to horizontal. Range (-180, 180].
pub fn eye_line_angle(
    left_eye: &[LandmarkPoint],
    right_eye: &[LandmarkPoint],
) -> Result<f32, MetricsError> {
    let left = centroid(left_eye).ok_or(MetricsError::InsufficientLandmarks("left eye"))?;
    let right = centroid(right_eye).ok_or(MetricsError::InsufficientLandmarks("right eye"))?;
    Ok((right.y - left.y).atan2(right.x - left.x).to_degrees())
}

/// True when the eye line is within [`EYE_CONTACT_MAX_ANGLE_DEG`] of horizontal.
pub fn eye_contact(
    left_eye: &[LandmarkPoint],
    right_eye: &[LandmarkPoint],
) -> Result<bool, MetricsError> {
    let angle = eye_line_angle(left_eye, right_eye)?;
    Ok(angle.abs() < EYE_CONTACT_MAX_ANGLE_DEG)
}

/// Centroid of all landmarks, mapped to [-1, 1] on both axes of `frame`.
///
/// Landmarks must be in the pixel space of `frame`. Points outside the frame
/// produce values outside [-1, 1] rather than an error.
pub fn head_position(
    landmarks: &[LandmarkPoint],
    frame: FrameSize,
) -> Result<HeadPosition, MetricsError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(MetricsError::InvalidFrameSize {
            width: frame.width,
            height: frame.height,
        });
    }
    let center = centroid(landmarks).ok_or(MetricsError::InsufficientLandmarks("face"))?;
    Ok(HeadPosition {
        x: (center.x / frame.width as f32) * 2.0 - 1.0,
        y: (center.y / frame.height as f32) * 2.0 - 1.0,
    })
}
