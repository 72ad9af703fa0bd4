//! Telemetry sample records
//!
//! A [`TelemetrySample`] is one observation of the spacecraft bus at one
//! instant. It carries exactly 19 numeric fields: 11 fixed housekeeping
//! channels plus 8 free-form auxiliary channels. The field order here is the
//! order used on the wire (see [`crate::codec`]) and must not change without
//! a format version bump.
//!
//! A [`ScoredSample`] wraps a sample with the verdicts of the three anomaly
//! detectors. The combined verdict is derived, never stored on its own, so
//! `combined_flag == rule_flag | iso_flag | residual_flag` holds for every
//! value that can be constructed.

use serde::{Deserialize, Serialize};

use crate::rules::RuleViolations;

/// Number of auxiliary `extra` channels
pub const EXTRA_CHANNELS: usize = 8;

/// Number of numeric fields in a sample (11 fixed + 8 extra)
pub const FIELD_COUNT: usize = 11 + EXTRA_CHANNELS;

/// Number of features fed to the multivariate detector
pub const FEATURE_COUNT: usize = 4 + EXTRA_CHANNELS;

/// Feature vector in detector order:
/// `[battery_v, solar_i, temp, cpu, extra0..extra7]`
pub type FeatureVector = [f32; FEATURE_COUNT];

/// Column names of the sample fields, in wire order
#[rustfmt::skip]
pub const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "timestamp", "battery_v", "solar_i", "temp", "cpu", "comm", "flags",
    "qx", "qy", "qz", "qw",
    "extra0", "extra1", "extra2", "extra3", "extra4", "extra5", "extra6", "extra7",
];

/// Communication link status codes
pub mod comm {
    /// Link nominal
    pub const OK: u8 = 0;
    /// Link lost
    pub const LOSS: u8 = 2;
}

/// One telemetry observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Seconds since the Unix epoch
    pub timestamp: u32,
    /// Battery bus voltage (V)
    pub battery_v: f32,
    /// Solar array current (A)
    pub solar_i: f32,
    /// Board temperature (°C)
    pub temp: f32,
    /// CPU load, 0-100
    pub cpu: u8,
    /// Link status, see [`comm`]
    pub comm: u8,
    /// Reserved bitfield
    pub flags: u16,
    /// Attitude quaternion, x component
    pub qx: f32,
    /// Attitude quaternion, y component
    pub qy: f32,
    /// Attitude quaternion, z component
    pub qz: f32,
    /// Attitude quaternion, w component
    pub qw: f32,
    /// Auxiliary channels
    pub extra: [f32; EXTRA_CHANNELS],
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self {
            timestamp: 0,
            battery_v: 0.0,
            solar_i: 0.0,
            temp: 0.0,
            cpu: 0,
            comm: comm::OK,
            flags: 0,
            qx: 1.0,
            qy: 0.0,
            qz: 0.0,
            qw: 0.0,
            extra: [0.0; EXTRA_CHANNELS],
        }
    }
}

impl TelemetrySample {
    /// Build the detector feature vector.
    ///
    /// Non-finite readings are treated as missing and filled with 0.0.
    pub fn features(&self) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        out[0] = self.battery_v;
        out[1] = self.solar_i;
        out[2] = self.temp;
        out[3] = self.cpu as f32;
        out[4..].copy_from_slice(&self.extra);

        for value in out.iter_mut() {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
        out
    }

    /// Battery voltage, or `None` when the reading is missing (non-finite)
    pub fn battery_reading(&self) -> Option<f32> {
        self.battery_v.is_finite().then_some(self.battery_v)
    }
}

/// Per-detector verdicts for one sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Verdicts {
    /// Hard threshold rules fired
    pub rule_flag: bool,
    /// Multivariate detector flagged the sample
    pub iso_flag: bool,
    /// Multivariate anomaly score (higher = more anomalous, 0.0 without a model)
    pub iso_score: f32,
    /// Battery residual detector flagged the sample
    pub residual_flag: bool,
}

impl Verdicts {
    /// Logical OR of the three detector flags
    pub fn combined(&self) -> bool {
        self.rule_flag || self.iso_flag || self.residual_flag
    }
}

/// A telemetry sample annotated with detector verdicts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "ScoredRecord", try_from = "ScoredRecord")]
pub struct ScoredSample {
    sample: TelemetrySample,
    verdicts: Verdicts,
    violations: RuleViolations,
}

impl ScoredSample {
    /// Annotate a sample. The rule verdict is taken from `violations`.
    pub fn new(
        sample: TelemetrySample,
        violations: RuleViolations,
        iso_flag: bool,
        iso_score: f32,
        residual_flag: bool,
    ) -> Self {
        Self {
            sample,
            verdicts: Verdicts {
                rule_flag: violations.any(),
                iso_flag,
                iso_score,
                residual_flag,
            },
            violations,
        }
    }

    /// The underlying sample
    pub fn sample(&self) -> &TelemetrySample {
        &self.sample
    }

    /// All detector verdicts
    pub fn verdicts(&self) -> &Verdicts {
        &self.verdicts
    }

    /// Which rule thresholds were crossed
    pub fn violations(&self) -> &RuleViolations {
        &self.violations
    }

    /// Rule engine verdict
    pub fn rule_flag(&self) -> bool {
        self.verdicts.rule_flag
    }

    /// Multivariate detector verdict
    pub fn iso_flag(&self) -> bool {
        self.verdicts.iso_flag
    }

    /// Multivariate anomaly score
    pub fn iso_score(&self) -> f32 {
        self.verdicts.iso_score
    }

    /// Battery residual verdict
    pub fn residual_flag(&self) -> bool {
        self.verdicts.residual_flag
    }

    /// OR of all verdicts
    pub fn combined_flag(&self) -> bool {
        self.verdicts.combined()
    }
}

/// Flat serialized form of a [`ScoredSample`], flags as 0/1 integers
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoredRecord {
    #[serde(flatten)]
    sample: TelemetrySample,
    rule_flag: u8,
    iso_flag: u8,
    iso_score: f32,
    residual_flag: u8,
    combined_flag: u8,
}

impl From<ScoredSample> for ScoredRecord {
    fn from(scored: ScoredSample) -> Self {
        Self {
            sample: scored.sample,
            rule_flag: scored.rule_flag() as u8,
            iso_flag: scored.iso_flag() as u8,
            iso_score: scored.iso_score(),
            residual_flag: scored.residual_flag() as u8,
            combined_flag: scored.combined_flag() as u8,
        }
    }
}

impl TryFrom<ScoredRecord> for ScoredSample {
    type Error = String;

    fn try_from(record: ScoredRecord) -> Result<Self, Self::Error> {
        let scored = ScoredSample::new(
            record.sample,
            RuleViolations::check(&record.sample),
            record.iso_flag != 0,
            record.iso_score,
            record.residual_flag != 0,
        );
        if scored.combined_flag() != (record.combined_flag != 0) {
            return Err("combined_flag does not match detector flags".into());
        }
        Ok(scored)
    }
}
