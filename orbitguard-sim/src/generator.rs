//! Synthetic spacecraft telemetry
//!
//! ## Orbital Model
//!
//! A 90-sample orbit drives the sunlit/eclipse cycle:
//!
//! ```text
//! orbit   = sin(2πt / 90)
//! battery = 3.9 - 0.0002·(t mod 1440) + 0.05·max(0, orbit) + N(0, σ_b)
//! solar   = 0.2 + 0.15·max(0, orbit)                       + N(0, σ_s)
//! temp    = 25 + 4·orbit                                   + N(0, σ_t)
//! cpu     = clamp(20 + ⌊N(0, 5)⌋, 1, 95)
//! ```
//!
//! Auxiliary channels are N(0, 1), the link is nominal and the attitude
//! quaternion is the packer's default (qx = 1).
//!
//! Noise levels differ between the live feed ([`NoiseProfile::LIVE`]) and
//! generated datasets ([`NoiseProfile::DATASET`]).

use std::f32::consts::PI;

use orbitguard_core::{comm, TelemetrySample, EXTRA_CHANNELS};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Orbit period in samples
pub const ORBIT_PERIOD: f32 = 90.0;

/// Battery ageing period in samples
pub const DRIFT_PERIOD: u64 = 1440;

/// Share of a generated dataset that carries injected anomalies, in percent
pub const DATASET_ANOMALY_PERCENT: usize = 2;

/// Source of sample timestamps (epoch seconds)
pub trait Clock: Send {
    /// Timestamp for the next sample
    fn now(&mut self) -> u32;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> u32 {
        u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX)
    }
}

/// Deterministic clock advancing a fixed step per sample
#[derive(Debug, Clone, Copy)]
pub struct StepClock {
    next: u32,
    step: u32,
}

impl StepClock {
    /// Start at `start`, advancing `step` seconds per call
    pub fn new(start: u32, step: u32) -> Self {
        Self { next: start, step }
    }
}

impl Clock for StepClock {
    fn now(&mut self) -> u32 {
        let ts = self.next;
        self.next = self.next.wrapping_add(self.step);
        ts
    }
}

/// Something that produces one sample per simulator tick
pub trait SampleSource: Send {
    /// Produce the sample for `tick`
    fn next_sample(&mut self, tick: u64) -> TelemetrySample;
}

/// Standard deviations of the additive noise terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseProfile {
    /// Battery voltage noise (V)
    pub battery: f32,
    /// Solar current noise (A)
    pub solar: f32,
    /// Temperature noise (°C)
    pub temp: f32,
}

impl NoiseProfile {
    /// Live feed, noisy enough to see on a chart
    pub const LIVE: Self = Self {
        battery: 0.02,
        solar: 0.02,
        temp: 0.8,
    };

    /// Generated datasets
    pub const DATASET: Self = Self {
        battery: 0.01,
        solar: 0.01,
        temp: 0.5,
    };
}

/// Seedable orbital telemetry generator
pub struct OrbitalGenerator {
    rng: StdRng,
    clock: Box<dyn Clock>,
    noise: NoiseProfile,
}

impl std::fmt::Debug for OrbitalGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrbitalGenerator")
            .field("noise", &self.noise)
            .finish_non_exhaustive()
    }
}

impl OrbitalGenerator {
    /// Create with an explicit clock and noise profile
    pub fn new(seed: u64, clock: impl Clock + 'static, noise: NoiseProfile) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            clock: Box::new(clock),
            noise,
        }
    }

    /// Live feed stamped with wall-clock time; `None` seeds from entropy
    pub fn live(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self::new(seed, SystemClock, NoiseProfile::LIVE)
    }

    fn gaussian(&mut self, sd: f32) -> f32 {
        gaussian(&mut self.rng, sd)
    }

    /// Sample at orbital time `t` (in samples)
    pub fn sample_at(&mut self, t: u64) -> TelemetrySample {
        let orbit = (2.0 * PI * (t as f32) / ORBIT_PERIOD).sin();
        let sunlit = orbit.max(0.0);
        let aged = (t % DRIFT_PERIOD) as f32;

        let noise = self.noise;
        let battery_v = 3.9 - 0.0002 * aged + 0.05 * sunlit + self.gaussian(noise.battery);
        let solar_i = 0.2 + 0.15 * sunlit + self.gaussian(noise.solar);
        let temp = 25.0 + 4.0 * orbit + self.gaussian(noise.temp);
        let cpu = (20.0 + self.gaussian(5.0).trunc()).clamp(1.0, 95.0) as u8;

        let mut extra = [0.0; EXTRA_CHANNELS];
        for value in extra.iter_mut() {
            *value = self.gaussian(1.0);
        }

        TelemetrySample {
            timestamp: self.clock.now(),
            battery_v,
            solar_i,
            temp,
            cpu,
            comm: comm::OK,
            extra,
            ..Default::default()
        }
    }
}

impl SampleSource for OrbitalGenerator {
    fn next_sample(&mut self, tick: u64) -> TelemetrySample {
        self.sample_at(tick)
    }
}

/// Normal deviate via Box-Muller
pub(crate) fn gaussian<R: Rng + ?Sized>(rng: &mut R, sd: f32) -> f32 {
    if sd <= 0.0 {
        return 0.0;
    }
    // 1 - U keeps the log argument in (0, 1]
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    (z as f32) * sd
}

/// Generate a dataset of `n` samples spaced `interval` seconds apart.
///
/// With `inject_anomalies`, about 2% of samples (at least one) get a
/// combined fault: battery drop, temperature spike and link loss.
pub fn synthetic_series(
    n: usize,
    start: u32,
    interval: u32,
    inject_anomalies: bool,
    seed: u64,
) -> Vec<TelemetrySample> {
    let mut generator =
        OrbitalGenerator::new(seed, StepClock::new(start, interval), NoiseProfile::DATASET);
    let mut series: Vec<TelemetrySample> = (0..n as u64).map(|t| generator.sample_at(t)).collect();

    if inject_anomalies && n > 0 {
        let count = (n * DATASET_ANOMALY_PERCENT / 100).max(1);
        let rng = &mut generator.rng;
        for idx in index::sample(&mut *rng, n, count).into_iter() {
            let sample = &mut series[idx];
            sample.battery_v -= rng.gen_range(0.3..1.0);
            sample.temp += rng.gen_range(10.0..40.0);
            sample.comm = comm::LOSS;
        }
        log::debug!("Injected {} anomalies into {} samples", count, n);
    }
    series
}
