//! Live and Offline Telemetry Processing for OrbitGuard
//!
//! ## Overview
//!
//! Two ways to run the anomaly pipeline over spacecraft telemetry:
//!
//! - **Live**: [`LiveSimulator`] generates one sample per tick, scores it and
//!   keeps the newest samples in a bounded ring buffer. [`TelemetryService`]
//!   answers operator queries against that buffer and accepts fault
//!   injections.
//! - **Offline**: [`BatchProcessor`] scores a stored packet stream and writes
//!   CSV tables; [`BatchScheduler`] repeats that on an interval.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use orbitguard_ml::{AnomalyPipeline, PipelineConfig};
//! use orbitguard_sim::{InjectRequest, LiveSimulator, SimulatorConfig, TelemetryService};
//!
//! let config = SimulatorConfig::default().with_auto_inject(0.0).with_seed(7);
//! let sim = Arc::new(LiveSimulator::new(config, AnomalyPipeline::new(PipelineConfig::default())));
//! sim.prefill(10);
//!
//! let service = TelemetryService::new(Arc::clone(&sim));
//! service.inject_anomaly(&InjectRequest { kind: "comm".into() }).unwrap();
//! sim.prefill(1);
//!
//! let latest = service.telemetry();
//! assert_eq!(latest.len(), 11);
//! assert!(latest[10].rule_flag());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod config;
pub mod errors;
pub mod generator;
pub mod injection;
pub mod scheduler;
pub mod service;
pub mod simulator;

pub use batch::{BatchConfig, BatchProcessor, BatchSummary, FLAGGED_FILE};
pub use config::AppConfig;
pub use errors::{BatchError, ConfigError, InvalidAnomalyKind, ServiceError, SimError};
pub use generator::{
    synthetic_series, Clock, NoiseProfile, OrbitalGenerator, SampleSource, StepClock, SystemClock,
};
pub use injection::{ActiveInjection, AnomalyKind, InjectionState};
pub use scheduler::BatchScheduler;
pub use service::{InjectRequest, InjectResponse, StatsResponse, TelemetryService};
pub use simulator::{LiveSimulator, SimulatorConfig, SimulatorState, SimulatorStatus};
