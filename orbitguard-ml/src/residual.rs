//! Windowed battery residual detector
//!
//! For every index `i ≥ W` the predictor estimates `battery_v[i]` from the
//! previous `W` readings and the residual is `|actual - predicted|`. A
//! residual is anomalous when it exceeds `μ + kσ` of the residual
//! distribution (k = 3 by default).
//!
//! ## Two Modes
//!
//! **Batch** ([`ResidualDetector::flags`]): μ and σ are recomputed from the
//! whole batch on every run, so slow drift between runs is absorbed.
//! Indices `i < W` lack history and are never flagged.
//!
//! **Streaming** ([`StreamingResidual`]): a single live sample has no
//! population of its own, so residuals are pooled in a rolling window and
//! the threshold is *held*, recomputed only every `refresh_every`
//! observations. Until `min_population` residuals are pooled, nothing is
//! flagged. The held threshold can lag live drift by up to `refresh_every`
//! ticks; that is the accepted cost of live residual flagging.

use orbitguard_core::constants::detection::{DEFAULT_SIGMA, DEFAULT_WINDOW};
use orbitguard_core::{RingBuffer, TelemetrySample};
use serde::{Deserialize, Serialize};

use crate::{MLError, MLResult, WindowPredictor};

/// Battery series with missing readings forward-filled.
///
/// Leading gaps (no reading seen yet) become 0.0.
pub fn forward_fill(samples: &[TelemetrySample]) -> Vec<f32> {
    fill_values(samples.iter().map(|s| s.battery_v))
}

/// Forward-fill any sequence of readings; non-finite values are gaps
pub fn fill_values(values: impl IntoIterator<Item = f32>) -> Vec<f32> {
    let mut last = None;
    values
        .into_iter()
        .map(|v| {
            if v.is_finite() {
                last = Some(v);
            }
            last.unwrap_or(0.0)
        })
        .collect()
}

/// Mean and population standard deviation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResidualStats {
    /// Mean residual
    pub mean: f32,
    /// Population standard deviation
    pub std_dev: f32,
}

impl ResidualStats {
    /// Compute over `values`; `None` when empty
    pub fn of(values: impl IntoIterator<Item = f32>) -> Option<Self> {
        let (mut n, mut sum, mut sum_sq) = (0usize, 0.0f64, 0.0f64);
        for v in values {
            n += 1;
            sum += v as f64;
            sum_sq += (v as f64) * (v as f64);
        }
        if n == 0 {
            return None;
        }
        let mean = sum / n as f64;
        let var = (sum_sq / n as f64 - mean * mean).max(0.0);
        Some(Self {
            mean: mean as f32,
            std_dev: var.sqrt() as f32,
        })
    }

    /// `μ + kσ`
    pub fn threshold(&self, sigma: f32) -> f32 {
        self.mean + sigma * self.std_dev
    }
}

/// Batch-mode residual detector
#[derive(Debug, Clone, Copy)]
pub struct ResidualDetector {
    window: usize,
    sigma: f32,
}

impl Default for ResidualDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_SIGMA)
    }
}

impl ResidualDetector {
    /// Create with window `W` and threshold multiplier `sigma`
    pub fn new(window: usize, sigma: f32) -> Self {
        Self {
            window: window.max(1),
            sigma,
        }
    }

    /// Window width
    pub fn window(&self) -> usize {
        self.window
    }

    /// Residuals for indices `W..len` of a filled series.
    ///
    /// Empty when `series.len() <= W`.
    pub fn residuals<P>(&self, series: &[f32], predictor: &P) -> MLResult<Vec<f32>>
    where
        P: WindowPredictor + ?Sized,
    {
        if predictor.window() != self.window {
            return Err(MLError::ShapeMismatch {
                expected: self.window,
                actual: predictor.window(),
            });
        }
        if series.len() <= self.window {
            return Ok(Vec::new());
        }

        let w = self.window;
        let windows: Vec<&[f32]> = (w..series.len()).map(|i| &series[i - w..i]).collect();
        let predictions = predictor.predict(&windows)?;
        if predictions.len() != windows.len() {
            return Err(MLError::ShapeMismatch {
                expected: windows.len(),
                actual: predictions.len(),
            });
        }

        Ok(series[w..]
            .iter()
            .zip(predictions)
            .map(|(actual, predicted)| (actual - predicted).abs())
            .collect())
    }

    /// One flag per series index; `i < W` is always false
    pub fn flags<P>(&self, series: &[f32], predictor: &P) -> MLResult<Vec<bool>>
    where
        P: WindowPredictor + ?Sized,
    {
        let mut flags = vec![false; series.len()];
        let residuals = self.residuals(series, predictor)?;

        if let Some(stats) = ResidualStats::of(residuals.iter().copied()) {
            let limit = stats.threshold(self.sigma);
            for (k, r) in residuals.iter().enumerate() {
                flags[self.window + k] = *r > limit;
            }
        }
        Ok(flags)
    }
}

/// Streaming-mode population settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Residuals retained for the threshold estimate
    pub population: usize,
    /// Observations between threshold refreshes
    pub refresh_every: usize,
    /// Residuals needed before any live flag can fire
    pub min_population: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            population: 200,
            refresh_every: 50,
            min_population: 30,
        }
    }
}

/// Rolling residual population with a periodically refreshed threshold
#[derive(Debug, Clone)]
pub struct StreamingResidual {
    config: StreamingConfig,
    sigma: f32,
    residuals: RingBuffer<f32>,
    threshold: Option<f32>,
    since_refresh: usize,
}

impl StreamingResidual {
    /// Create an empty population
    pub fn new(config: StreamingConfig, sigma: f32) -> Self {
        Self {
            config,
            sigma,
            residuals: RingBuffer::with_capacity(config.population),
            threshold: None,
            since_refresh: 0,
        }
    }

    /// Judge `residual` against the held threshold, then add it to the pool
    pub fn observe(&mut self, residual: f32) -> bool {
        let flagged = self.threshold.is_some_and(|limit| residual > limit);

        self.residuals.push(residual);
        self.since_refresh += 1;

        let warm = self.residuals.len() >= self.config.min_population;
        let due = self.threshold.is_none() || self.since_refresh >= self.config.refresh_every;
        if warm && due {
            self.refresh();
        }
        flagged
    }

    fn refresh(&mut self) {
        if let Some(stats) = ResidualStats::of(self.residuals.iter().copied()) {
            let limit = stats.threshold(self.sigma);
            log::debug!(
                "live residual threshold refreshed: {:.5} (n={}, mean={:.5}, sd={:.5})",
                limit,
                self.residuals.len(),
                stats.mean,
                stats.std_dev
            );
            self.threshold = Some(limit);
        }
        self.since_refresh = 0;
    }

    /// Currently held threshold, if warmed up
    pub fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    /// Residuals currently pooled
    pub fn population(&self) -> usize {
        self.residuals.len()
    }
}
