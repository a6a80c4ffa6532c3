//! Session-level reduction of accepted per-frame metrics.
//!
//! [`SessionAggregator`] is a running fold: push frames as they arrive, or
//! build one from a finished slice. Every statistic is count based, so frame
//! order does not change the result.

use crate::types::{Expression, FaceMetrics, EXPRESSION_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// End-of-session face statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFaceSummary {
    /// Mean confidence over accepted frames.
    pub average_confidence: f32,
    /// How many frames each expression was the per-frame winner of.
    pub dominant_expressions: BTreeMap<Expression, usize>,
    /// Fraction of accepted frames with eye contact, in [0, 1].
    pub eye_contact_percentage: f32,
    pub frame_count: usize,
}

impl SessionFaceSummary {
    /// Batch reduction. `None` when there are no frames.
    pub fn from_frames<'a, I>(frames: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a FaceMetrics>,
    {
        frames.into_iter().collect::<SessionAggregator>().summary()
    }

    /// Most frequent per-frame winner; ties go to the earlier label.
    pub fn dominant_expression(&self) -> Option<Expression> {
        let mut best: Option<(Expression, usize)> = None;
        for (&expression, &count) in &self.dominant_expressions {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((expression, count));
            }
        }
        best.map(|(e, _)| e)
    }

    /// Per-frame winner histogram as fractions of the session.
    pub fn expression_frequencies(&self) -> BTreeMap<Expression, f32> {
        if self.frame_count == 0 {
            return BTreeMap::new();
        }
        self.dominant_expressions
            .iter()
            .map(|(&e, &count)| (e, count as f32 / self.frame_count as f32))
            .collect()
    }
}

/// Incremental accumulator behind [`SessionFaceSummary`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionAggregator {
    frames: usize,
    confidence_sum: f64,
    eye_contact_frames: usize,
    winners: [usize; EXPRESSION_COUNT],
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one accepted frame into the running totals.
    pub fn push(&mut self, metrics: &FaceMetrics) {
        self.frames += 1;
        self.confidence_sum += f64::from(metrics.confidence);
        if metrics.eye_contact {
            self.eye_contact_frames += 1;
        }
        self.winners[metrics.dominant_expression() as usize] += 1;
    }

    /// Fold another partial aggregate into this one.
    pub fn merge(&mut self, other: &SessionAggregator) {
        self.frames += other.frames;
        self.confidence_sum += other.confidence_sum;
        self.eye_contact_frames += other.eye_contact_frames;
        for (mine, theirs) in self.winners.iter_mut().zip(other.winners.iter()) {
            *mine += theirs;
        }
    }

    /// Number of accepted frames folded so far.
    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Current summary, or `None` if no frame has been accepted yet.
    ///
    /// An empty session is "no data", which callers must keep apart from a
    /// genuine 0% score.
    pub fn summary(&self) -> Option<SessionFaceSummary> {
        if self.frames == 0 {
            return None;
        }
        let n = self.frames as f64;
        let dominant_expressions = Expression::ALL
            .iter()
            .zip(self.winners.iter())
            .filter(|(_, count)| **count > 0)
            .map(|(&e, &count)| (e, count))
            .collect();

        Some(SessionFaceSummary {
            average_confidence: (self.confidence_sum / n) as f32,
            dominant_expressions,
            eye_contact_percentage: (self.eye_contact_frames as f64 / n) as f32,
            frame_count: self.frames,
        })
    }
}

impl<'a> Extend<&'a FaceMetrics> for SessionAggregator {
    fn extend<I: IntoIterator<Item = &'a FaceMetrics>>(&mut self, iter: I) {
        for metrics in iter {
            self.push(metrics);
        }
    }
}

impl<'a> FromIterator<&'a FaceMetrics> for SessionAggregator {
    fn from_iter<I: IntoIterator<Item = &'a FaceMetrics>>(iter: I) -> Self {
        let mut agg = SessionAggregator::new();
        agg.extend(iter);
        agg
    }
}
