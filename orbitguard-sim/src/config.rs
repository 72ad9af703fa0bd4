//! Application configuration
//!
//! Every section is optional in the JSON file; omitted keys take their
//! defaults.
//!
//! ```json
//! {
//!   "pipeline":  { "window": 5, "sigma": 3.0 },
//!   "simulator": { "tick_interval_ms": 1000, "auto_inject_probability": 0.02 },
//!   "batch":     { "input": "data/telemetry.bin", "interval_secs": 60 }
//! }
//! ```

use std::fs;
use std::path::Path;

use orbitguard_ml::{PipelineConfig, TrainingConfig};
use serde::{Deserialize, Serialize};

use crate::batch::BatchConfig;
use crate::simulator::SimulatorConfig;
use crate::ConfigError;

/// All settings for the binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Detector parameters
    pub pipeline: PipelineConfig,
    /// Offline training parameters
    pub training: TrainingConfig,
    /// Live simulator parameters
    pub simulator: SimulatorConfig,
    /// Batch job paths and schedule
    pub batch: BatchConfig,
}

impl AppConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse without validating
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reject values the components cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.window == 0 {
            return Err(ConfigError::Invalid("pipeline.window must be at least 1"));
        }
        if !(self.pipeline.sigma.is_finite() && self.pipeline.sigma >= 0.0) {
            return Err(ConfigError::Invalid("pipeline.sigma must be a non-negative number"));
        }
        if self.training.window != self.pipeline.window {
            return Err(ConfigError::Invalid(
                "training.window must equal pipeline.window",
            ));
        }
        if self.simulator.capacity == 0 {
            return Err(ConfigError::Invalid("simulator.capacity must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.simulator.auto_inject_probability) {
            return Err(ConfigError::Invalid(
                "simulator.auto_inject_probability must be in [0, 1]",
            ));
        }
        if self.batch.interval_secs == 0 {
            return Err(ConfigError::Invalid("batch.interval_secs must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AppConfig::from_json(
            r#"{ "simulator": { "tick_interval_ms": 250 }, "batch": { "input": "x.bin" } }"#,
        )
        .unwrap();
        assert_eq!(config.simulator.tick_interval_ms, 250);
        assert_eq!(config.simulator.capacity, 1000);
        assert_eq!(config.batch.input, std::path::PathBuf::from("x.bin"));
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn load_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.json");
        assert!(matches!(AppConfig::load(&missing), Err(ConfigError::Read { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ pipeline: ").unwrap();
        assert!(matches!(AppConfig::load(&broken), Err(ConfigError::Parse { .. })));

        let invalid = dir.path().join("invalid.json");
        fs::write(&invalid, r#"{ "simulator": { "auto_inject_probability": 2.0 } }"#).unwrap();
        assert!(matches!(AppConfig::load(&invalid), Err(ConfigError::Invalid(_))));
    }
}
