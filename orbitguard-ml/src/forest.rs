//! Isolation Forest implementation
//!
//! Combines many isolation trees, each fitted on a random sub-sample, and
//! turns their mean path length into an anomaly score.

use orbitguard_core::FeatureVector;
use rand::rngs::StdRng;
use rand::seq::index::sample as sample_indices;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::scoring::{ScoreBatch, Scorer};
use crate::{c_factor, IsolationTree, MLError, MLResult, TreeConfig};

/// Decision offset used when no contamination is configured
const NEUTRAL_OFFSET: f32 = 0.5;

/// Configuration for Isolation Forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub num_trees: usize,
    /// Sub-sample size ψ for each tree
    pub sample_size: usize,
    /// Maximum tree depth; `None` uses `ceil(log2(ψ))`
    pub max_depth: Option<usize>,
    /// Random seed
    pub seed: u64,
    /// Expected fraction of anomalies in the training data.
    ///
    /// Sets the decision offset to the matching quantile of training scores.
    /// `None` uses a fixed offset of 0.5.
    pub contamination: Option<f32>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            sample_size: 256,
            max_depth: None,
            seed: 42,
            contamination: Some(0.03),
        }
    }
}

impl ForestConfig {
    /// Set the number of trees
    pub fn with_trees(mut self, num_trees: usize) -> Self {
        self.num_trees = num_trees;
        self
    }

    /// Set the per-tree sub-sample size
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the expected contamination
    pub fn with_contamination(mut self, contamination: Option<f32>) -> Self {
        self.contamination = contamination;
        self
    }

    fn validate(&self) -> MLResult<()> {
        if self.num_trees == 0 {
            return Err(MLError::InvalidConfig("num_trees must be at least 1"));
        }
        if self.sample_size < 2 {
            return Err(MLError::InvalidConfig("sample_size must be at least 2"));
        }
        if let Some(c) = self.contamination {
            if !(c > 0.0 && c < 0.5) {
                return Err(MLError::InvalidConfig("contamination must be in (0, 0.5)"));
            }
        }
        Ok(())
    }
}

/// Anomaly score result for one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyScore {
    /// Raw isolation score in (0, 1]; ~0.5 is typical, near 1 is anomalous
    pub raw: f32,
    /// Raw score minus the fitted offset; positive means anomalous
    pub decision: f32,
    /// Mean path length across trees
    pub avg_path_length: f32,
}

impl AnomalyScore {
    /// Check if score indicates an anomaly
    pub fn is_anomaly(&self) -> bool {
        self.decision > 0.0
    }
}

/// Isolation Forest for anomaly detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    /// Individual trees
    trees: Vec<IsolationTree>,
    /// Configuration
    config: ForestConfig,
    /// Effective sub-sample size used for normalisation
    psi: usize,
    /// Decision offset
    offset: f32,
}

impl IsolationForest {
    /// Create a new, unfitted forest
    pub fn new(config: ForestConfig) -> Self {
        Self {
            trees: Vec::new(),
            config,
            psi: 0,
            offset: NEUTRAL_OFFSET,
        }
    }

    /// Train the forest on samples
    pub fn fit(&mut self, samples: &[FeatureVector]) -> MLResult<()> {
        self.config.validate()?;
        if samples.len() < 2 {
            return Err(MLError::InsufficientData {
                required: 2,
                available: samples.len(),
            });
        }

        let psi = self.config.sample_size.min(samples.len());
        let max_depth = self
            .config
            .max_depth
            .unwrap_or_else(|| (psi as f32).log2().ceil() as usize)
            .max(1);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut trees = Vec::with_capacity(self.config.num_trees);
        for i in 0..self.config.num_trees {
            let subset: Vec<FeatureVector> = sample_indices(&mut rng, samples.len(), psi)
                .into_iter()
                .map(|idx| samples[idx])
                .collect();

            let mut tree = IsolationTree::new(TreeConfig {
                max_depth,
                seed: self.config.seed.wrapping_add(i as u64 + 1),
            });
            tree.fit(&subset)?;
            trees.push(tree);
        }

        self.trees = trees;
        self.psi = psi;
        self.offset = NEUTRAL_OFFSET;

        if let Some(contamination) = self.config.contamination {
            let mut raw: Vec<f32> = samples.iter().map(|s| self.raw_score(s)).collect();
            raw.sort_by(f32::total_cmp);
            self.offset = quantile(&raw, 1.0 - contamination);
        }

        log::debug!(
            "isolation forest fitted: {} trees, psi={}, depth<={}, offset={:.4}",
            self.trees.len(),
            psi,
            max_depth,
            self.offset
        );
        Ok(())
    }

    /// Check if the forest has been fitted
    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Structural check for a forest read back from an artifact
    pub fn validate(&self) -> MLResult<()> {
        if !self.is_fitted() {
            return Err(MLError::NotFitted);
        }
        if self.psi < 2 {
            return Err(MLError::InvalidModel("sub-sample size below 2"));
        }
        if !self.offset.is_finite() {
            return Err(MLError::InvalidModel("decision offset is not finite"));
        }
        self.trees.iter().try_for_each(IsolationTree::validate)
    }

    fn raw_score(&self, sample: &FeatureVector) -> f32 {
        let avg = self.avg_path_length(sample);
        isolation_score(avg, self.psi)
    }

    fn avg_path_length(&self, sample: &FeatureVector) -> f32 {
        let total: f32 = self.trees.iter().map(|t| t.path_length(sample)).sum();
        total / self.trees.len() as f32
    }

    /// Calculate anomaly score for a sample
    pub fn anomaly_score(&self, sample: &FeatureVector) -> MLResult<AnomalyScore> {
        if !self.is_fitted() {
            return Err(MLError::NotFitted);
        }

        let avg_path_length = self.avg_path_length(sample);
        let raw = isolation_score(avg_path_length, self.psi);
        Ok(AnomalyScore {
            raw,
            decision: raw - self.offset,
            avg_path_length,
        })
    }

    /// Score many samples
    pub fn predict(&self, samples: &[FeatureVector]) -> MLResult<Vec<AnomalyScore>> {
        samples.iter().map(|s| self.anomaly_score(s)).collect()
    }

    /// Fitted decision offset
    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Get forest statistics
    pub fn stats(&self) -> ForestStats {
        ForestStats {
            num_trees: self.trees.len(),
            total_nodes: self.trees.iter().map(|t| t.node_count()).sum(),
            max_depth: self.trees.iter().map(|t| t.depth()).max().unwrap_or(0),
            sample_size: self.psi,
            offset: self.offset,
        }
    }
}

impl Scorer for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation_forest"
    }

    fn score(&self, batch: &[FeatureVector]) -> MLResult<ScoreBatch> {
        let scores = self.predict(batch)?;
        Ok(ScoreBatch {
            is_anomaly: scores.iter().map(AnomalyScore::is_anomaly).collect(),
            scores: scores.iter().map(|s| s.decision).collect(),
        })
    }
}

/// Forest statistics
#[derive(Debug, Clone, Copy)]
pub struct ForestStats {
    /// Number of trees
    pub num_trees: usize,
    /// Total nodes across all trees
    pub total_nodes: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Sub-sample size ψ
    pub sample_size: usize,
    /// Decision offset
    pub offset: f32,
}

/// Calculate isolation score from mean path length
///
/// `score = 2^(-E(h(x)) / c(ψ))`
pub fn isolation_score(avg_path_length: f32, psi: usize) -> f32 {
    let expected = c_factor(psi);
    if expected == 0.0 {
        return NEUTRAL_OFFSET;
    }
    2.0_f32.powf(-avg_path_length / expected)
}

/// Linear-interpolated quantile of ascending `sorted` values
fn quantile(sorted: &[f32], q: f32) -> f32 {
    match sorted.len() {
        0 => NEUTRAL_OFFSET,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f32;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f32;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn create_test_data() -> Vec<FeatureVector> {
        let mut rng = StdRng::seed_from_u64(9);
        (0..300)
            .map(|_| {
                let mut row = [0.0; 12];
                for v in row.iter_mut() {
                    *v = rng.gen_range(-1.0..1.0);
                }
                row
            })
            .collect()
    }

    #[test]
    fn test_forest_creation() {
        let forest = IsolationForest::new(ForestConfig::default());
        assert!(!forest.is_fitted());
        assert!(matches!(forest.anomaly_score(&[0.0; 12]), Err(MLError::NotFitted)));
    }

    #[test]
    fn test_forest_fit() {
        let mut forest = IsolationForest::new(ForestConfig::default().with_trees(20));
        forest.fit(&create_test_data()).unwrap();

        let stats = forest.stats();
        assert_eq!(stats.num_trees, 20);
        assert_eq!(stats.sample_size, 256);
        assert!(stats.total_nodes > 20);
        assert!(stats.max_depth <= 8);
    }

    #[test]
    fn test_anomaly_detection() {
        let mut forest = IsolationForest::new(ForestConfig::default());
        forest.fit(&create_test_data()).unwrap();

        let normal = forest.anomaly_score(&[0.0; 12]).unwrap();
        let outlier = forest.anomaly_score(&[8.0; 12]).unwrap();

        assert!(outlier.raw > normal.raw);
        assert!(outlier.is_anomaly());
        assert!(!normal.is_anomaly());
    }

    #[test]
    fn contamination_sets_flag_rate() {
        let data = create_test_data();
        let mut forest = IsolationForest::new(ForestConfig::default().with_contamination(Some(0.1)));
        forest.fit(&data).unwrap();

        let batch = forest.score(&data).unwrap();
        let flagged = batch.is_anomaly.iter().filter(|f| **f).count();
        // Roughly 10% of the training set sits above the 90th percentile
        assert!((20..=40).contains(&flagged), "flagged {}", flagged);
    }

    #[test]
    fn scorer_output_matches_batch_length() {
        let mut forest = IsolationForest::new(ForestConfig::default().with_trees(10));
        forest.fit(&create_test_data()).unwrap();
        let batch = forest.score(&[[0.0; 12], [1.0; 12], [5.0; 12]]).unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn fit_rejects_bad_config_and_data() {
        let mut forest = IsolationForest::new(ForestConfig::default().with_trees(0));
        assert!(matches!(forest.fit(&create_test_data()), Err(MLError::InvalidConfig(_))));

        let mut forest = IsolationForest::new(ForestConfig::default());
        assert!(matches!(forest.fit(&[[0.0; 12]]), Err(MLError::InsufficientData { .. })));
    }

    #[test]
    fn serde_round_trip_preserves_scores() {
        let mut forest = IsolationForest::new(ForestConfig::default().with_trees(5));
        forest.fit(&create_test_data()).unwrap();

        let json = serde_json::to_string(&forest).unwrap();
        let loaded: IsolationForest = serde_json::from_str(&json).unwrap();
        let probe = [0.3; 12];
        let before = forest.anomaly_score(&probe).unwrap();
        let after = loaded.anomaly_score(&probe).unwrap();
        assert!((before.decision - after.decision).abs() < 1e-5);
        assert_eq!(loaded.stats().num_trees, 5);
    }

    #[test]
    fn quantile_interpolates() {
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.5), 3.0);
        assert_eq!(quantile(&[0.0, 10.0], 0.25), 2.5);
        assert_eq!(quantile(&[7.0], 0.9), 7.0);
    }
}
