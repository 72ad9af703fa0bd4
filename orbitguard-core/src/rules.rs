//! Hard threshold rules
//!
//! The rule check is the one detector that is always available. It is a pure
//! function of a single sample with a fixed policy:
//!
//! | Rule             | Fires when        |
//! |------------------|-------------------|
//! | Low battery      | `battery_v < 3.2` |
//! | Over temperature | `temp > 70.0`     |
//! | Comm loss        | `comm == 2`       |
//!
//! The thresholds are policy constants, not learned values.

use serde::{Deserialize, Serialize};

use crate::constants::rules::{BATTERY_MIN_V, COMM_LOSS_CODE, TEMP_MAX_C};
use crate::sample::TelemetrySample;

/// Which rule thresholds a sample crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleViolations {
    /// `battery_v` below the minimum bus voltage
    pub low_battery: bool,
    /// `temp` above the thermal limit
    pub over_temperature: bool,
    /// Link reported loss of signal
    pub comm_loss: bool,
}

impl RuleViolations {
    /// Evaluate every rule against `sample`
    pub fn check(sample: &TelemetrySample) -> Self {
        // NaN comparisons are false, so a missing reading never fires a rule
        Self {
            low_battery: sample.battery_v < BATTERY_MIN_V,
            over_temperature: sample.temp > TEMP_MAX_C,
            comm_loss: sample.comm == COMM_LOSS_CODE,
        }
    }

    /// True if at least one rule fired
    pub fn any(&self) -> bool {
        self.low_battery || self.over_temperature || self.comm_loss
    }

    /// Names of the rules that fired
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.low_battery {
            names.push("low_battery");
        }
        if self.over_temperature {
            names.push("over_temperature");
        }
        if self.comm_loss {
            names.push("comm_loss");
        }
        names
    }
}

/// Rule verdict for one sample
pub fn rule_flag(sample: &TelemetrySample) -> bool {
    RuleViolations::check(sample).any()
}
