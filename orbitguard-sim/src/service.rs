//! Query surface over a running simulator
//!
//! Transport-agnostic handlers for the three operator requests: fetch the
//! recent telemetry, summarise its health, and inject a fault. Requests and
//! responses are plain serde types so any JSON transport can carry them.

use std::sync::Arc;

use orbitguard_core::constants::live::QUERY_WINDOW;
use orbitguard_core::ScoredSample;
use serde::{Deserialize, Serialize};

use crate::injection::AnomalyKind;
use crate::simulator::LiveSimulator;
use crate::ServiceError;

/// Health summary over the query window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Samples failing a hard rule
    pub critical: usize,
    /// Samples flagged only by a learned detector
    pub warning: usize,
    /// Unflagged samples
    pub normal: usize,
}

impl StatsResponse {
    /// Classify every sample into exactly one bucket
    pub fn from_samples(samples: &[ScoredSample]) -> Self {
        samples.iter().fold(Self::default(), |mut acc, s| {
            if s.rule_flag() {
                acc.critical += 1;
            } else if s.combined_flag() {
                acc.warning += 1;
            } else {
                acc.normal += 1;
            }
            acc
        })
    }
}

/// Fault injection request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectRequest {
    /// `"battery"`, `"temp"` or `"comm"`
    #[serde(rename = "type")]
    pub kind: String,
}

/// Accepted fault injection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectResponse {
    /// Always `"injected"`
    pub status: String,
    /// Kind that was injected
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
}

/// Request handlers bound to one simulator
#[derive(Debug, Clone)]
pub struct TelemetryService {
    simulator: Arc<LiveSimulator>,
    window: usize,
}

impl TelemetryService {
    /// Serve the newest [`QUERY_WINDOW`] samples of `simulator`
    pub fn new(simulator: Arc<LiveSimulator>) -> Self {
        Self {
            simulator,
            window: QUERY_WINDOW,
        }
    }

    /// The served simulator
    pub fn simulator(&self) -> &Arc<LiveSimulator> {
        &self.simulator
    }

    /// Newest samples, oldest first
    pub fn telemetry(&self) -> Vec<ScoredSample> {
        self.simulator.get_latest(self.window)
    }

    /// Critical / warning / normal counts over the same window
    pub fn stats(&self) -> StatsResponse {
        StatsResponse::from_samples(&self.telemetry())
    }

    /// Validate the kind, then inject it
    pub fn inject_anomaly(&self, request: &InjectRequest) -> Result<InjectResponse, ServiceError> {
        let kind: AnomalyKind = request.kind.parse()?;
        self.simulator.inject(kind);
        Ok(InjectResponse {
            status: "injected".to_string(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbitguard_core::{RuleViolations, TelemetrySample};

    fn scored(battery_v: f32, iso_flag: bool) -> ScoredSample {
        let sample = TelemetrySample {
            battery_v,
            temp: 25.0,
            ..Default::default()
        };
        ScoredSample::new(sample, RuleViolations::check(&sample), iso_flag, 0.0, false)
    }

    #[test]
    fn buckets_partition_the_window() {
        let window = vec![
            scored(3.0, false),
            scored(3.0, true),
            scored(3.9, true),
            scored(3.9, false),
            scored(3.9, false),
        ];
        let stats = StatsResponse::from_samples(&window);
        assert_eq!(
            stats,
            StatsResponse {
                critical: 2,
                warning: 1,
                normal: 2
            }
        );
        assert_eq!(StatsResponse::from_samples(&[]), StatsResponse::default());
    }

    #[test]
    fn request_uses_type_key() {
        let req: InjectRequest = serde_json::from_str(r#"{"type":"comm"}"#).unwrap();
        assert_eq!(req.kind, "comm");

        let resp = InjectResponse {
            status: "injected".into(),
            kind: AnomalyKind::Comm,
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"status":"injected","type":"comm"}"#
        );
    }
}
