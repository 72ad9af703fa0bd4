//! Live telemetry simulator
//!
//! ## Threading Model
//!
//! One producer thread generates, scores and appends one sample per tick.
//! Any number of readers copy the newest entries out of the ring buffer.
//!
//! ```text
//!  producer                       state lock             readers
//!  ────────                       ──────────             ───────
//!  lock: next sample, injection,  ┌──────────────┐
//!        trailing battery ───────▶│ ring buffer  │◀──── get_latest(n)
//!  unlock, score (slow)           │ injection    │◀──── inject(kind)
//!  lock: append, tick += 1 ──────▶│ tick counter │◀──── status()
//!                                 │ generator    │
//!                                 └──────────────┘
//! ```
//!
//! Scoring happens outside the state lock so readers are never held up by
//! the detectors. A second lock, the tick lock, is held for a whole tick and
//! only by producers; it keeps the live residual population consistent
//! when [`LiveSimulator::tick_once`] runs alongside the producer thread.
//!
//! Stopping is cooperative: the loop finishes its current tick, then exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use orbitguard_core::constants::live::{DEFAULT_BUFFER_CAPACITY, DEFAULT_TICK_INTERVAL_MS};
use orbitguard_core::{RingBuffer, ScoredSample};
use orbitguard_ml::{AnomalyPipeline, StreamingResidual};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::generator::{OrbitalGenerator, SampleSource};
use crate::injection::{ActiveInjection, AnomalyKind, InjectionState};
use crate::SimError;

/// Simulator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Ring buffer capacity
    pub capacity: usize,
    /// Delay between ticks in milliseconds
    pub tick_interval_ms: u64,
    /// Per-tick chance of a random injection while none is active (0 disables)
    pub auto_inject_probability: f64,
    /// Seed for the generator and injections; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_CAPACITY,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            auto_inject_probability: 0.02,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// Set ring buffer capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set tick interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set automatic injection probability
    pub fn with_auto_inject(mut self, probability: f64) -> Self {
        self.auto_inject_probability = probability;
        self
    }

    /// Set seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Tick interval as a duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorState {
    /// No producer thread
    Stopped,
    /// Producer thread ticking
    Running,
}

/// Snapshot of the simulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatorStatus {
    /// Lifecycle state
    pub state: SimulatorState,
    /// Ticks completed since creation
    pub ticks: u64,
    /// Samples currently buffered
    pub buffered: usize,
    /// Buffer capacity
    pub capacity: usize,
    /// Injection in progress
    pub injection: Option<ActiveInjection>,
}

struct SimState {
    buffer: RingBuffer<ScoredSample>,
    injection: InjectionState,
    ticks: u64,
    source: Box<dyn SampleSource>,
    rng: StdRng,
}

struct Shared {
    state: Mutex<SimState>,
    ticker: Mutex<StreamingResidual>,
    pipeline: AnomalyPipeline,
    running: AtomicBool,
    tick_interval: Duration,
    auto_inject_probability: f64,
}

impl Shared {
    fn tick(&self) -> ScoredSample {
        let mut live = self.ticker.lock();
        let window = self.pipeline.config().window;

        let (sample, trailing) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let mut sample = state.source.next_sample(state.ticks);
            if !state.injection.is_active()
                && self.auto_inject_probability > 0.0
                && state.rng.gen::<f64>() < self.auto_inject_probability
            {
                let kind = AnomalyKind::random(&mut state.rng);
                state.injection.activate(kind);
                log::info!("Auto-injected {} anomaly at tick {}", kind, state.ticks);
            }
            state.injection.advance(&mut sample, &mut state.rng);

            let skip = state.buffer.len().saturating_sub(window);
            let trailing: Vec<f32> = state
                .buffer
                .iter()
                .skip(skip)
                .map(|s| s.sample().battery_v)
                .collect();
            (sample, trailing)
        };

        let started = Instant::now();
        let scored = self.pipeline.score_live(&sample, &trailing, &mut live);
        let elapsed = started.elapsed();
        if elapsed > self.tick_interval {
            log::error!(
                "Scoring took {:?}, longer than the {:?} tick interval",
                elapsed,
                self.tick_interval
            );
        }

        let mut state = self.state.lock();
        state.buffer.push(scored);
        state.ticks += 1;
        log::debug!(
            "tick {}: battery={:.3} temp={:.1} combined={}",
            state.ticks,
            sample.battery_v,
            sample.temp,
            scored.combined_flag()
        );
        scored
    }

    fn run(&self) {
        let _guard = ProducerGuard(&self.running);
        log::info!("Simulator started");
        while self.running.load(Ordering::Acquire) {
            self.tick();

            let deadline = Instant::now() + self.tick_interval;
            while self.running.load(Ordering::Acquire) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::park_timeout(deadline - now);
            }
        }
        log::info!("Simulator stopped");
    }
}

/// Clears the running flag if the producer thread unwinds
struct ProducerGuard<'a>(&'a AtomicBool);

impl Drop for ProducerGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(false, Ordering::Release);
            log::error!("Simulator producer panicked; simulator stopped");
        }
    }
}

/// Generates, scores and buffers telemetry in the background
pub struct LiveSimulator {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LiveSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSimulator")
            .field("status", &self.status())
            .finish()
    }
}

impl LiveSimulator {
    /// Create a stopped simulator fed by the orbital generator
    pub fn new(config: SimulatorConfig, pipeline: AnomalyPipeline) -> Self {
        let source = OrbitalGenerator::live(config.seed);
        Self::with_source(config, pipeline, source)
    }

    /// Create a stopped simulator with a custom sample source
    pub fn with_source(
        config: SimulatorConfig,
        pipeline: AnomalyPipeline,
        source: impl SampleSource + 'static,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        let live = pipeline.streaming_state();

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SimState {
                    buffer: RingBuffer::with_capacity(config.capacity),
                    injection: InjectionState::default(),
                    ticks: 0,
                    source: Box::new(source),
                    rng,
                }),
                ticker: Mutex::new(live),
                pipeline,
                running: AtomicBool::new(false),
                tick_interval: config.tick_interval(),
                auto_inject_probability: config.auto_inject_probability.clamp(0.0, 1.0),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start the producer thread; no-op when already running
    pub fn start(&self) -> Result<(), SimError> {
        let mut handle = self.handle.lock();
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("orbitguard-sim".into())
            .spawn(move || shared.run());
        match spawned {
            Ok(h) => {
                *handle = Some(h);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                Err(SimError::Spawn(e))
            }
        }
    }

    /// Stop the producer after its current tick and wait for it
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("Simulator thread panicked");
            }
        }
    }

    /// Check if the producer thread is running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Inject a fault into the next samples
    pub fn inject(&self, kind: AnomalyKind) {
        self.shared.state.lock().injection.activate(kind);
        log::info!("Injected {} anomaly", kind);
    }

    /// Copy of the newest `min(n, len)` samples, oldest first
    pub fn get_latest(&self, n: usize) -> Vec<ScoredSample> {
        self.shared.state.lock().buffer.latest(n)
    }

    /// Run one tick synchronously
    pub fn tick_once(&self) -> ScoredSample {
        self.shared.tick()
    }

    /// Run `n` ticks without sleeping
    pub fn prefill(&self, n: usize) {
        for _ in 0..n {
            self.shared.tick();
        }
        log::debug!("Pre-filled {} samples", n);
    }

    /// Current lifecycle, buffer and injection snapshot
    pub fn status(&self) -> SimulatorStatus {
        let state = self.shared.state.lock();
        SimulatorStatus {
            state: if self.is_running() {
                SimulatorState::Running
            } else {
                SimulatorState::Stopped
            },
            ticks: state.ticks,
            buffered: state.buffer.len(),
            capacity: state.buffer.capacity(),
            injection: state.injection.active(),
        }
    }

    /// The scoring pipeline
    pub fn pipeline(&self) -> &AnomalyPipeline {
        &self.shared.pipeline
    }
}

impl Drop for LiveSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}
