//! The combined anomaly pipeline
//!
//! Runs the rule check, the multivariate scorer and the battery residual
//! detector over samples and merges their verdicts. Used both by the batch
//! processor (whole files) and the live simulator (one sample per tick).

use std::iter;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use orbitguard_core::constants::detection::{DEFAULT_SIGMA, DEFAULT_WINDOW};
use orbitguard_core::{FeatureVector, RuleViolations, ScoredSample, TelemetrySample};
use serde::{Deserialize, Serialize};

use crate::residual::{fill_values, forward_fill, ResidualDetector};
use crate::{
    MLError, MLResult, ModelBundle, ScoreBatch, Scorer, StreamingConfig, StreamingResidual,
    WindowPredictor,
};

/// Pipeline parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Battery window width `W`
    pub window: usize,
    /// Residual threshold multiplier `k` in `μ + kσ`
    pub sigma: f32,
    /// Live residual population settings
    pub streaming: StreamingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            sigma: DEFAULT_SIGMA,
            streaming: StreamingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Set the battery window width
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Set the residual threshold multiplier
    pub fn with_sigma(mut self, sigma: f32) -> Self {
        self.sigma = sigma;
        self
    }

    /// Set live residual population settings
    pub fn with_streaming(mut self, streaming: StreamingConfig) -> Self {
        self.streaming = streaming;
        self
    }
}

/// Rule, multivariate and residual detectors in one place
pub struct AnomalyPipeline {
    config: PipelineConfig,
    scorer: Option<Box<dyn Scorer>>,
    predictor: Option<Box<dyn WindowPredictor>>,
    warned_missing: AtomicBool,
}

impl std::fmt::Debug for AnomalyPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyPipeline")
            .field("config", &self.config)
            .field("scorer", &self.scorer.as_ref().map(|s| s.name()))
            .field("predictor", &self.predictor.as_ref().map(|p| p.window()))
            .finish()
    }
}

impl AnomalyPipeline {
    /// Pipeline with no learned detectors (rule check only)
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            scorer: None,
            predictor: None,
            warned_missing: AtomicBool::new(false),
        }
    }

    /// Pipeline using whatever a loaded bundle provides
    pub fn from_bundle(config: PipelineConfig, bundle: ModelBundle) -> Self {
        let mut pipeline = Self::new(config);
        if let Some(scorer) = bundle.scorer {
            pipeline = pipeline.with_scorer(scorer);
        }
        if let Some(predictor) = bundle.predictor {
            pipeline = pipeline.with_predictor(predictor);
        }
        pipeline
    }

    /// Attach a multivariate scorer
    pub fn with_scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.scorer = Some(Box::new(scorer));
        self
    }

    /// Attach a battery predictor; dropped if its window does not match
    pub fn with_predictor(mut self, predictor: impl WindowPredictor + 'static) -> Self {
        if predictor.window() == self.config.window {
            self.predictor = Some(Box::new(predictor));
        } else {
            log::warn!(
                "Battery predictor expects window {} but pipeline uses {}; residual detector disabled",
                predictor.window(),
                self.config.window
            );
            self.predictor = None;
        }
        self
    }

    /// Pipeline parameters
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// True when a multivariate scorer is attached
    pub fn has_scorer(&self) -> bool {
        self.scorer.is_some()
    }

    /// True when a battery predictor is attached
    pub fn has_predictor(&self) -> bool {
        self.predictor.is_some()
    }

    /// Empty live residual state matching this pipeline's settings
    pub fn streaming_state(&self) -> StreamingResidual {
        StreamingResidual::new(self.config.streaming, self.config.sigma)
    }

    /// Score a batch. Output has exactly one entry per input, in order.
    pub fn score_batch(&self, samples: &[TelemetrySample]) -> Vec<ScoredSample> {
        self.note_missing_models();

        let features: Vec<FeatureVector> = samples.iter().map(TelemetrySample::features).collect();
        let iso = self.multivariate(&features);
        let residual = self.batch_residual_flags(samples);

        samples
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                ScoredSample::new(
                    *sample,
                    RuleViolations::check(sample),
                    iso.is_anomaly[i],
                    iso.scores[i],
                    residual[i],
                )
            })
            .collect()
    }

    /// Score one live sample.
    ///
    /// `trailing_battery` holds raw battery readings of the samples that
    /// preceded this one, oldest first. The residual verdict comes from
    /// `live`, which pools residuals across calls.
    pub fn score_live(
        &self,
        sample: &TelemetrySample,
        trailing_battery: &[f32],
        live: &mut StreamingResidual,
    ) -> ScoredSample {
        self.note_missing_models();

        let iso = self.multivariate(&[sample.features()]);
        let residual_flag = match self.live_residual(sample, trailing_battery) {
            Ok(Some(residual)) => live.observe(residual),
            Ok(None) => false,
            Err(e) => {
                log::warn!("Live residual scoring failed: {}", e);
                false
            }
        };

        ScoredSample::new(
            *sample,
            RuleViolations::check(sample),
            iso.is_anomaly[0],
            iso.scores[0],
            residual_flag,
        )
    }

    fn multivariate(&self, features: &[FeatureVector]) -> ScoreBatch {
        let Some(scorer) = &self.scorer else {
            return ScoreBatch::clear(features.len());
        };
        if features.is_empty() {
            return ScoreBatch::clear(0);
        }

        let result = contained(scorer.name(), || scorer.score(features))
            .and_then(|batch| batch.check_len(features.len()).map(|_| batch));
        match result {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!(
                    "{} scoring failed on {} samples, leaving flags clear: {}",
                    scorer.name(),
                    features.len(),
                    e
                );
                ScoreBatch::clear(features.len())
            }
        }
    }

    fn batch_residual_flags(&self, samples: &[TelemetrySample]) -> Vec<bool> {
        let Some(predictor) = &self.predictor else {
            return vec![false; samples.len()];
        };

        let series = forward_fill(samples);
        let detector = ResidualDetector::new(self.config.window, self.config.sigma);
        match contained("battery_residual", || detector.flags(&series, predictor)) {
            Ok(flags) => flags,
            Err(e) => {
                log::warn!("Battery residual scoring failed, leaving flags clear: {}", e);
                vec![false; samples.len()]
            }
        }
    }

    fn live_residual(
        &self,
        sample: &TelemetrySample,
        trailing_battery: &[f32],
    ) -> MLResult<Option<f32>> {
        let Some(predictor) = &self.predictor else {
            return Ok(None);
        };
        let w = self.config.window;
        if trailing_battery.len() < w {
            return Ok(None);
        }

        let series = fill_values(
            trailing_battery
                .iter()
                .copied()
                .chain(iter::once(sample.battery_v)),
        );
        let n = series.len();
        let window = &series[n - 1 - w..n - 1];
        let predicted = contained("battery_residual", || predictor.predict(&[window]))?;
        Ok(predicted.first().map(|p| (series[n - 1] - p).abs()))
    }

    fn note_missing_models(&self) {
        if self.scorer.is_some() && self.predictor.is_some() {
            return;
        }
        if !self.warned_missing.swap(true, Ordering::Relaxed) {
            log::warn!(
                "Model unavailable (multivariate={}, battery_regression={}); affected flags stay 0",
                self.scorer.is_some(),
                self.predictor.is_some()
            );
        }
    }
}

/// Run one detector stage, reporting a panic as a stage error
fn contained<T>(stage: &'static str, run: impl FnOnce() -> MLResult<T>) -> MLResult<T> {
    panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or(Err(MLError::DetectorPanic(stage)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PersistencePredictor;

    struct FailingScorer;

    impl Scorer for FailingScorer {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn score(&self, _batch: &[FeatureVector]) -> MLResult<ScoreBatch> {
            Err(MLError::NotFitted)
        }
    }

    struct PanickingScorer;

    impl Scorer for PanickingScorer {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn score(&self, _batch: &[FeatureVector]) -> MLResult<ScoreBatch> {
            panic!("bad model")
        }
    }

    struct PanickingPredictor;

    impl WindowPredictor for PanickingPredictor {
        fn window(&self) -> usize {
            DEFAULT_WINDOW
        }

        fn predict(&self, _windows: &[&[f32]]) -> MLResult<Vec<f32>> {
            panic!("bad regression")
        }
    }

    struct ShortScorer;

    impl Scorer for ShortScorer {
        fn name(&self) -> &'static str {
            "short"
        }

        fn score(&self, _batch: &[FeatureVector]) -> MLResult<ScoreBatch> {
            Ok(ScoreBatch::clear(1))
        }
    }

    fn nominal(n: usize) -> Vec<TelemetrySample> {
        (0..n)
            .map(|i| TelemetrySample {
                timestamp: i as u32,
                battery_v: 3.9,
                temp: 30.0,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn empty_batch_scores_empty() {
        let pipeline = AnomalyPipeline::new(PipelineConfig::default());
        assert!(pipeline.score_batch(&[]).is_empty());
    }

    #[test]
    fn failing_scorer_fails_open() {
        let pipeline = AnomalyPipeline::new(PipelineConfig::default()).with_scorer(FailingScorer);
        let scored = pipeline.score_batch(&nominal(10));
        assert_eq!(scored.len(), 10);
        assert!(scored.iter().all(|s| !s.iso_flag() && s.iso_score() == 0.0));
    }

    #[test]
    fn panicking_detectors_fail_open() {
        let pipeline = AnomalyPipeline::new(PipelineConfig::default())
            .with_scorer(PanickingScorer)
            .with_predictor(PanickingPredictor);

        let scored = pipeline.score_batch(&nominal(10));
        assert_eq!(scored.len(), 10);
        assert!(scored.iter().all(|s| !s.iso_flag() && !s.residual_flag()));

        let mut live = pipeline.streaming_state();
        let low = TelemetrySample {
            battery_v: 3.0,
            ..Default::default()
        };
        let scored = pipeline.score_live(&low, &[3.9; 5], &mut live);
        assert!(scored.rule_flag());
        assert!(!scored.iso_flag() && !scored.residual_flag());
        assert_eq!(live.population(), 0);
    }

    #[test]
    fn short_scorer_output_is_rejected() {
        let pipeline = AnomalyPipeline::new(PipelineConfig::default()).with_scorer(ShortScorer);
        let scored = pipeline.score_batch(&nominal(4));
        assert_eq!(scored.len(), 4);
        assert!(scored.iter().all(|s| !s.iso_flag()));
    }

    #[test]
    fn mismatched_predictor_is_dropped() {
        let pipeline = AnomalyPipeline::new(PipelineConfig::default())
            .with_predictor(PersistencePredictor::new(3));
        assert!(!pipeline.has_predictor());
    }

    #[test]
    fn live_needs_full_window() {
        let pipeline = AnomalyPipeline::new(PipelineConfig::default())
            .with_predictor(PersistencePredictor::new(5));
        let mut live = pipeline.streaming_state();
        let sample = TelemetrySample {
            battery_v: 3.0,
            ..Default::default()
        };
        let scored = pipeline.score_live(&sample, &[3.9; 4], &mut live);
        assert!(!scored.residual_flag());
        assert_eq!(live.population(), 0);

        pipeline.score_live(&sample, &[3.9; 5], &mut live);
        assert_eq!(live.population(), 1);
    }

    #[test]
    fn live_residual_flags_after_warmup() {
        let config = PipelineConfig::default().with_streaming(StreamingConfig {
            population: 100,
            refresh_every: 10,
            min_population: 20,
        });
        let pipeline = AnomalyPipeline::new(config).with_predictor(PersistencePredictor::new(5));
        let mut live = pipeline.streaming_state();

        let mut history: Vec<f32> = Vec::new();
        for i in 0..60 {
            let sample = TelemetrySample {
                battery_v: 3.9 + 0.002 * (i % 4) as f32,
                ..Default::default()
            };
            let tail = &history[history.len().saturating_sub(5)..];
            assert!(!pipeline.score_live(&sample, tail, &mut live).residual_flag());
            history.push(sample.battery_v);
        }

        let drop = TelemetrySample {
            battery_v: 3.3,
            ..Default::default()
        };
        let tail = &history[history.len() - 5..];
        let scored = pipeline.score_live(&drop, tail, &mut live);
        assert!(scored.residual_flag());
        assert!(scored.combined_flag());
        assert!(!scored.rule_flag());
    }
}
