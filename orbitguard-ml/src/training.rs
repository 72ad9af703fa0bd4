//! Offline fitting of the learned detectors
//!
//! The leading `train_fraction` of the history (in time order) is used for
//! fitting; the rest is scored as a holdout and only reported in the logs.

use orbitguard_core::constants::detection::{DEFAULT_SIGMA, DEFAULT_WINDOW};
use orbitguard_core::{FeatureVector, TelemetrySample};
use serde::{Deserialize, Serialize};

use crate::residual::{forward_fill, ResidualDetector};
use crate::{
    ForestConfig, IsolationForest, LinearRegression, MLError, MLResult, ModelBundle, ScaledScorer,
    Scorer, StandardScaler,
};

/// Training parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of the history used for fitting, in (0, 1]
    pub train_fraction: f32,
    /// Isolation forest parameters
    pub forest: ForestConfig,
    /// Battery regression window width
    pub window: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.7,
            forest: ForestConfig::default().with_trees(200),
            window: DEFAULT_WINDOW,
        }
    }
}

impl TrainingConfig {
    /// Set fraction of samples used for fitting
    pub fn with_train_fraction(mut self, fraction: f32) -> Self {
        self.train_fraction = fraction;
        self
    }

    /// Set forest parameters
    pub fn with_forest(mut self, forest: ForestConfig) -> Self {
        self.forest = forest;
        self
    }

    /// Set regression window width
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    fn validate(&self) -> MLResult<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(MLError::InvalidConfig("train_fraction must be in (0, 1]"));
        }
        if self.window == 0 {
            return Err(MLError::InvalidConfig("window must be at least 1"));
        }
        Ok(())
    }
}

/// Fit scaler, forest and battery regression on `history`
pub fn train_bundle(history: &[TelemetrySample], config: &TrainingConfig) -> MLResult<ModelBundle> {
    config.validate()?;

    let split = ((history.len() as f32) * config.train_fraction).floor() as usize;
    let (train, holdout) = history.split_at(split.min(history.len()));
    let required = config.window + 1;
    if train.len() < required.max(2) {
        return Err(MLError::InsufficientData {
            required: required.max(2),
            available: train.len(),
        });
    }
    log::info!("Training on {} samples ({} held out)", train.len(), holdout.len());

    let features: Vec<FeatureVector> = train.iter().map(TelemetrySample::features).collect();
    let scaler = StandardScaler::fit(&features)?;
    let mut forest = IsolationForest::new(config.forest.clone());
    forest.fit(&scaler.transform_batch(&features))?;
    let scorer = ScaledScorer::new(scaler, forest);

    let series = forward_fill(train);
    let w = config.window;
    let windows: Vec<&[f32]> = (w..series.len()).map(|i| &series[i - w..i]).collect();
    let predictor = LinearRegression::fit(&windows, &series[w..])?;

    if !holdout.is_empty() {
        report_holdout(holdout, &scorer, &predictor, w);
    }

    Ok(ModelBundle {
        scorer: Some(scorer),
        predictor: Some(predictor),
    })
}

fn report_holdout(
    holdout: &[TelemetrySample],
    scorer: &ScaledScorer<IsolationForest>,
    predictor: &LinearRegression,
    window: usize,
) {
    let features: Vec<FeatureVector> = holdout.iter().map(TelemetrySample::features).collect();
    match scorer.score(&features) {
        Ok(batch) => {
            let flagged = batch.is_anomaly.iter().filter(|f| **f).count();
            log::info!(
                "Holdout multivariate flags: {}/{} ({:.1}%)",
                flagged,
                batch.len(),
                100.0 * flagged as f32 / batch.len().max(1) as f32
            );
        }
        Err(e) => log::warn!("Holdout scoring failed: {}", e),
    }

    let series = forward_fill(holdout);
    let detector = ResidualDetector::new(window, DEFAULT_SIGMA);
    match detector.residuals(&series, predictor) {
        Ok(residuals) if !residuals.is_empty() => {
            let mae = residuals.iter().sum::<f32>() / residuals.len() as f32;
            log::info!(
                "Holdout battery MAE: {:.5} V over {} windows",
                mae,
                residuals.len()
            );
        }
        Ok(_) => log::debug!("Holdout too short for a battery residual report"),
        Err(e) => log::warn!("Holdout residuals failed: {}", e),
    }
}
