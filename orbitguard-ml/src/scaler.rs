//! Per-feature standardisation
//!
//! `z = (x - mean) / scale`, where `scale` is the population standard
//! deviation. Constant features get a scale of 1.0 so they pass through
//! centred instead of dividing by zero.

use orbitguard_core::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

use crate::{MLError, MLResult};

/// Fitted mean/scale per feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: [f32; FEATURE_COUNT],
    scale: [f32; FEATURE_COUNT],
}

impl StandardScaler {
    /// Fit on training rows
    pub fn fit(rows: &[FeatureVector]) -> MLResult<Self> {
        if rows.is_empty() {
            return Err(MLError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let n = rows.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        let mut scale = [1.0; FEATURE_COUNT];

        for j in 0..FEATURE_COUNT {
            let mu = rows.iter().map(|r| r[j] as f64).sum::<f64>() / n;
            let var = rows.iter().map(|r| (r[j] as f64 - mu).powi(2)).sum::<f64>() / n;
            let sd = var.sqrt();
            mean[j] = mu as f32;
            if sd > f64::from(f32::EPSILON) {
                scale[j] = sd as f32;
            }
        }

        Ok(Self { mean, scale })
    }

    /// Standardise one row
    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = *row;
        for (j, value) in out.iter_mut().enumerate() {
            *value = (*value - self.mean[j]) / self.scale[j];
        }
        out
    }

    /// Standardise a batch
    pub fn transform_batch(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    /// Fitted means
    pub fn mean(&self) -> &[f32; FEATURE_COUNT] {
        &self.mean
    }

    /// Fitted scales
    pub fn scale(&self) -> &[f32; FEATURE_COUNT] {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centres_and_scales() {
        let mut a = [5.0; FEATURE_COUNT];
        let mut b = [5.0; FEATURE_COUNT];
        a[0] = 1.0;
        b[0] = 3.0;

        let scaler = StandardScaler::fit(&[a, b]).unwrap();
        assert_eq!(scaler.mean()[0], 2.0);
        assert_eq!(scaler.scale()[0], 1.0);

        let z = scaler.transform(&a);
        assert_eq!(z[0], -1.0);
        // Constant feature: centred, unit scale
        assert_eq!(z[1], 0.0);
        assert_eq!(scaler.scale()[1], 1.0);
    }

    #[test]
    fn empty_fit_fails() {
        assert!(StandardScaler::fit(&[]).is_err());
    }
}
