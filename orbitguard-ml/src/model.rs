//! Persisted detector artifacts
//!
//! A model directory holds up to three JSON files:
//!
//! | File               | Contents                         |
//! |--------------------|----------------------------------|
//! | `isoforest.json`   | fitted [`IsolationForest`]       |
//! | `scaler.json`      | fitted [`StandardScaler`]        |
//! | `lr_battery.json`  | battery [`LinearRegression`]     |
//!
//! Loading never fails. Whatever is missing or unreadable is logged and left
//! out of the bundle, and the pipeline scores without it.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{
    AnomalyPipeline, IsolationForest, LinearRegression, MLResult, PipelineConfig, ScaledScorer,
    StandardScaler,
};

/// Isolation forest artifact
pub const ISOFOREST_FILE: &str = "isoforest.json";
/// Feature scaler artifact
pub const SCALER_FILE: &str = "scaler.json";
/// Battery regression artifact
pub const LR_FILE: &str = "lr_battery.json";

/// The optional learned detectors
#[derive(Debug, Clone, Default)]
pub struct ModelBundle {
    /// Scaler plus forest; present only when both artifacts loaded
    pub scorer: Option<ScaledScorer<IsolationForest>>,
    /// Battery window regression
    pub predictor: Option<LinearRegression>,
}

impl ModelBundle {
    /// Bundle with no learned detectors
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load whatever artifacts `dir` holds
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();

        let forest: Option<IsolationForest> = read_artifact(dir, ISOFOREST_FILE);
        let scaler: Option<StandardScaler> = read_artifact(dir, SCALER_FILE);
        let scorer = match (scaler, forest) {
            (Some(scaler), Some(forest)) => match forest.validate() {
                Ok(()) => Some(ScaledScorer::new(scaler, forest)),
                Err(e) => {
                    log::warn!(
                        "Rejecting {}: {}; multivariate detector disabled",
                        ISOFOREST_FILE,
                        e
                    );
                    None
                }
            },
            (None, Some(_)) => {
                log::warn!(
                    "{} present without {}; multivariate detector disabled",
                    ISOFOREST_FILE,
                    SCALER_FILE
                );
                None
            }
            _ => None,
        };

        let predictor = read_artifact(dir, LR_FILE);

        log::info!(
            "Loaded models from {}: multivariate={}, battery_regression={}",
            dir.display(),
            scorer.is_some(),
            predictor.is_some()
        );
        Self { scorer, predictor }
    }

    /// Write every present artifact into `dir`, creating it if needed
    pub fn save(&self, dir: impl AsRef<Path>) -> MLResult<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        if let Some(scorer) = &self.scorer {
            write_artifact(dir, ISOFOREST_FILE, scorer.inner())?;
            write_artifact(dir, SCALER_FILE, scorer.scaler())?;
        }
        if let Some(predictor) = &self.predictor {
            write_artifact(dir, LR_FILE, predictor)?;
        }
        Ok(())
    }

    /// True when no learned detector is present
    pub fn is_empty(&self) -> bool {
        self.scorer.is_none() && self.predictor.is_none()
    }

    /// Build a pipeline around these detectors
    pub fn into_pipeline(self, config: PipelineConfig) -> AnomalyPipeline {
        AnomalyPipeline::from_bundle(config, self)
    }
}

fn read_artifact<T: DeserializeOwned>(dir: &Path, name: &str) -> Option<T> {
    let path = dir.join(name);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("Model artifact {} not found", path.display());
            return None;
        }
        Err(e) => {
            log::warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring invalid artifact {}: {}", path.display(), e);
            None
        }
    }
}

fn write_artifact<T: Serialize>(dir: &Path, name: &str, value: &T) -> MLResult<()> {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json)?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}
