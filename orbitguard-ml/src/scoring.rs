//! The scoring function interface
//!
//! A [`Scorer`] is any multivariate detector that, given a batch of feature
//! vectors, returns one anomaly flag and one unbounded score per row (higher
//! = more anomalous). The pipeline holds it as `Option<Box<dyn Scorer>>`;
//! `None` is the "no model loaded" case and scores every row 0/0.0.

use orbitguard_core::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

use crate::{MLError, MLResult, StandardScaler};

/// Per-row verdicts from a scorer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreBatch {
    /// Thresholded verdict per row
    pub is_anomaly: Vec<bool>,
    /// Continuous score per row, higher = more anomalous
    pub scores: Vec<f32>,
}

impl ScoreBatch {
    /// All-clear batch of `len` rows (flag 0, score 0.0)
    pub fn clear(len: usize) -> Self {
        Self {
            is_anomaly: vec![false; len],
            scores: vec![0.0; len],
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Ensure both columns hold exactly `expected` rows
    pub fn check_len(&self, expected: usize) -> MLResult<()> {
        for actual in [self.is_anomaly.len(), self.scores.len()] {
            if actual != expected {
                return Err(MLError::ShapeMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

/// Multivariate anomaly detector
///
/// Implementations must be cheap relative to the simulator tick interval and
/// must return exactly one verdict per input row.
pub trait Scorer: Send + Sync {
    /// Detector name for logs
    fn name(&self) -> &'static str;

    /// Score a batch of feature vectors
    fn score(&self, batch: &[FeatureVector]) -> MLResult<ScoreBatch>;
}

impl<S: Scorer + ?Sized> Scorer for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn score(&self, batch: &[FeatureVector]) -> MLResult<ScoreBatch> {
        (**self).score(batch)
    }
}

/// Normalises features with a fitted scaler before the inner scorer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaledScorer<S> {
    scaler: StandardScaler,
    inner: S,
}

impl<S> ScaledScorer<S> {
    /// Pair a scaler with a scorer
    pub fn new(scaler: StandardScaler, inner: S) -> Self {
        Self { scaler, inner }
    }

    /// The fitted scaler
    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// The wrapped scorer
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Scorer> Scorer for ScaledScorer<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn score(&self, batch: &[FeatureVector]) -> MLResult<ScoreBatch> {
        let scaled = self.scaler.transform_batch(batch);
        self.inner.score(&scaled)
    }
}

/// Per-feature absolute limits; a stand-in detector that needs no training
///
/// The score is the largest `|x_i| / limit_i` minus one, so it is positive as
/// soon as any feature exceeds its limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdScorer {
    limits: [f32; FEATURE_COUNT],
}

impl ThresholdScorer {
    /// Create from per-feature limits; non-positive limits disable a feature
    pub fn new(limits: [f32; FEATURE_COUNT]) -> Self {
        Self { limits }
    }
}

impl Scorer for ThresholdScorer {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn score(&self, batch: &[FeatureVector]) -> MLResult<ScoreBatch> {
        let scores: Vec<f32> = batch
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.limits.iter())
                    .filter(|(_, limit)| **limit > 0.0)
                    .map(|(x, limit)| x.abs() / limit - 1.0)
                    .fold(-1.0, f32::max)
            })
            .collect();

        Ok(ScoreBatch {
            is_anomaly: scores.iter().map(|s| *s > 0.0).collect(),
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_batch() {
        let batch = ScoreBatch::clear(3);
        assert_eq!(batch.len(), 3);
        assert!(batch.is_anomaly.iter().all(|f| !f));
        assert!(batch.scores.iter().all(|s| *s == 0.0));
        assert!(batch.check_len(3).is_ok());
    }

    #[test]
    fn check_len_reports_mismatch() {
        let batch = ScoreBatch {
            is_anomaly: vec![true],
            scores: vec![0.1, 0.2],
        };
        assert!(matches!(
            batch.check_len(2),
            Err(MLError::ShapeMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn threshold_scorer_flags_exceedance() {
        let mut limits = [0.0; FEATURE_COUNT];
        limits[2] = 70.0; // temp
        let scorer = ThresholdScorer::new(limits);

        let mut hot = [0.0; FEATURE_COUNT];
        hot[2] = 105.0;
        let mut cool = [0.0; FEATURE_COUNT];
        cool[2] = 35.0;

        let batch = scorer.score(&[hot, cool]).unwrap();
        assert_eq!(batch.is_anomaly, vec![true, false]);
        assert!((batch.scores[0] - 0.5).abs() < 1e-6);
        assert!((batch.scores[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn scaled_scorer_transforms_first() {
        let rows = vec![[10.0; FEATURE_COUNT], [12.0; FEATURE_COUNT], [14.0; FEATURE_COUNT]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        // After scaling, 14.0 sits ~1.22σ from the mean
        let scorer = ScaledScorer::new(scaler, ThresholdScorer::new([1.0; FEATURE_COUNT]));

        let batch = scorer.score(&[[12.0; FEATURE_COUNT], [14.0; FEATURE_COUNT]]).unwrap();
        assert_eq!(batch.is_anomaly, vec![false, true]);
        assert_eq!(scorer.name(), "threshold");
    }
}
