//! Operator-triggered fault injection
//!
//! An injection perturbs the next [`INJECTION_TICKS`] generated samples and
//! then reverts on its own. Injecting again while one is active replaces it
//! and restarts the countdown.

use std::fmt;
use std::str::FromStr;

use orbitguard_core::comm;
use orbitguard_core::constants::live::INJECTION_TICKS;
use orbitguard_core::TelemetrySample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::InvalidAnomalyKind;

/// Kind of injected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    /// Battery voltage drop of 0.5 to 1.2 V
    Battery,
    /// Temperature spike of 15 to 50 °C
    Temp,
    /// Link loss (comm = 2)
    Comm,
}

impl AnomalyKind {
    /// Every kind, in a fixed order
    pub const ALL: [Self; 3] = [Self::Battery, Self::Temp, Self::Comm];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Battery => "battery",
            Self::Temp => "temp",
            Self::Comm => "comm",
        }
    }

    /// Uniformly random kind
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    fn apply<R: Rng + ?Sized>(&self, sample: &mut TelemetrySample, rng: &mut R) {
        match self {
            Self::Battery => sample.battery_v -= rng.gen_range(0.5..1.2),
            Self::Temp => sample.temp += rng.gen_range(15.0..50.0),
            Self::Comm => sample.comm = comm::LOSS,
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyKind {
    type Err = InvalidAnomalyKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| InvalidAnomalyKind(s.to_string()))
    }
}

/// An injection in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveInjection {
    /// Fault being applied
    pub kind: AnomalyKind,
    /// Samples still to be perturbed
    pub remaining: u32,
}

/// Injection countdown owned by the simulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectionState {
    active: Option<ActiveInjection>,
}

impl InjectionState {
    /// Start (or restart) an injection
    pub fn activate(&mut self, kind: AnomalyKind) {
        self.active = Some(ActiveInjection {
            kind,
            remaining: INJECTION_TICKS,
        });
    }

    /// The injection in progress, if any
    pub fn active(&self) -> Option<ActiveInjection> {
        self.active
    }

    /// Check if an injection is in progress
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Perturb `sample` if an injection is active and count it down.
    ///
    /// Returns the kind applied to this sample.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        sample: &mut TelemetrySample,
        rng: &mut R,
    ) -> Option<AnomalyKind> {
        let active = self.active.as_mut()?;
        let kind = active.kind;
        kind.apply(sample, rng);

        active.remaining = active.remaining.saturating_sub(1);
        if active.remaining == 0 {
            self.active = None;
            log::debug!("{} injection finished", kind);
        }
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn nominal() -> TelemetrySample {
        TelemetrySample {
            battery_v: 3.9,
            temp: 25.0,
            ..Default::default()
        }
    }

    #[test]
    fn parses_known_kinds() {
        for kind in AnomalyKind::ALL {
            assert_eq!(kind.to_string().parse::<AnomalyKind>(), Ok(kind));
        }
        assert_eq!(
            "Battery".parse::<AnomalyKind>(),
            Err(InvalidAnomalyKind("Battery".into()))
        );
        assert!("".parse::<AnomalyKind>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&AnomalyKind::Temp).unwrap(), "\"temp\"");
    }

    #[test]
    fn comm_lasts_exactly_five_samples() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut state = InjectionState::default();
        state.activate(AnomalyKind::Comm);

        for i in 0..INJECTION_TICKS {
            let mut s = nominal();
            assert_eq!(state.advance(&mut s, &mut rng), Some(AnomalyKind::Comm));
            assert_eq!(s.comm, comm::LOSS, "sample {}", i);
        }
        let mut s = nominal();
        assert_eq!(state.advance(&mut s, &mut rng), None);
        assert_eq!(s, nominal());
        assert!(!state.is_active());
    }

    #[test]
    fn perturbations_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let mut s = nominal();
            AnomalyKind::Battery.apply(&mut s, &mut rng);
            assert!(s.battery_v <= 3.4 + 1e-6 && s.battery_v > 2.7 - 1e-6);

            let mut s = nominal();
            AnomalyKind::Temp.apply(&mut s, &mut rng);
            assert!(s.temp >= 40.0 && s.temp < 75.0);
        }
    }

    #[test]
    fn reinjection_restarts_countdown() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut state = InjectionState::default();
        state.activate(AnomalyKind::Temp);
        state.advance(&mut nominal(), &mut rng);
        state.activate(AnomalyKind::Battery);
        assert_eq!(
            state.active(),
            Some(ActiveInjection {
                kind: AnomalyKind::Battery,
                remaining: INJECTION_TICKS
            })
        );
    }
}
