//! Anomaly Scoring for Spacecraft Telemetry
//!
//! ## Overview
//!
//! Every telemetry sample is judged by three independent detectors whose
//! verdicts are merged with a logical OR. Each verdict is kept on the scored
//! sample so an operator can always see *why* a sample was flagged.
//!
//! | Detector      | Input                     | Needs artifact | Module        |
//! |---------------|---------------------------|----------------|---------------|
//! | Rule check    | one sample                | no             | `orbitguard_core::rules` |
//! | Multivariate  | 12-feature vector         | forest+scaler  | [`forest`], [`scaler`] |
//! | Residual      | battery voltage window    | regression     | [`residual`], [`regression`] |
//!
//! ## Fail-Open Scoring
//!
//! Learned detectors are optional capabilities. A missing artifact, a shape
//! mismatch or any scoring error leaves that detector's flags at 0 (and its
//! score at 0.0) for the affected samples. Absence of a model never raises an
//! anomaly and never stops ingestion; the rule check keeps working.
//!
//! ## Isolation Forest
//!
//! The multivariate detector is an Isolation Forest. Anomalies are isolated
//! by fewer random partitions than normal points:
//!
//! ```text
//! s(x) = 2^(-E[h(x)] / c(ψ))
//!
//! h(x)  path length of x in one tree
//! c(ψ)  average path length of an unsuccessful BST search over ψ samples
//! ```
//!
//! The scorer reports `s(x) - offset`, where the offset is fitted from the
//! expected contamination, so positive scores are anomalies and larger is
//! worse.
//!
//! ## Example
//!
//! ```rust
//! use orbitguard_core::TelemetrySample;
//! use orbitguard_ml::{AnomalyPipeline, PipelineConfig};
//!
//! // No artifacts loaded: rule-only scoring
//! let pipeline = AnomalyPipeline::new(PipelineConfig::default());
//! let low = TelemetrySample { battery_v: 3.0, temp: 50.0, ..Default::default() };
//!
//! let scored = pipeline.score_batch(&[low]);
//! assert!(scored[0].rule_flag());
//! assert!(!scored[0].iso_flag());
//! assert_eq!(scored[0].iso_score(), 0.0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use thiserror::Error;

pub mod forest;
pub mod model;
pub mod node;
pub mod pipeline;
pub mod regression;
pub mod residual;
pub mod scaler;
pub mod scoring;
pub mod training;
pub mod tree;

pub use forest::{AnomalyScore, ForestConfig, IsolationForest};
pub use model::ModelBundle;
pub use node::{c_factor, Node, NodeKind};
pub use pipeline::{AnomalyPipeline, PipelineConfig};
pub use regression::{LinearRegression, PersistencePredictor, WindowPredictor};
pub use residual::{
    fill_values, forward_fill, ResidualDetector, ResidualStats, StreamingConfig, StreamingResidual,
};
pub use scaler::StandardScaler;
pub use scoring::{ScaledScorer, ScoreBatch, Scorer, ThresholdScorer};
pub use training::{train_bundle, TrainingConfig};
pub use tree::{IsolationTree, TreeConfig};

/// Result type for ML operations
pub type MLResult<T> = Result<T, MLError>;

/// Errors from fitting, loading or running a detector
#[derive(Error, Debug)]
pub enum MLError {
    /// Not enough data to fit
    #[error("Insufficient data: need {required}, have {available}")]
    InsufficientData {
        /// Minimum number of rows needed
        required: usize,
        /// Rows provided
        available: usize,
    },

    /// Model used before `fit`
    #[error("Model has not been fitted")]
    NotFitted,

    /// Input or output length does not match the model
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Length the model requires
        expected: usize,
        /// Length it received
        actual: usize,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Deserialized model is structurally unusable
    #[error("Invalid model: {0}")]
    InvalidModel(&'static str),

    /// Detector panicked while scoring
    #[error("{0} detector panicked")]
    DetectorPanic(&'static str),

    /// Linear system could not be solved
    #[error("Singular system while fitting regression")]
    Singular,

    /// Artifact file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact file is not valid JSON for the model
    #[error("Artifact format error: {0}")]
    Format(#[from] serde_json::Error),
}
