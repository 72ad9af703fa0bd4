//! Live simulator and query surface scenarios
//!
//! Deterministic tests drive the simulator with `tick_once`/`prefill` and a
//! fixed sample source; only the lifecycle test lets the producer thread run.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use orbitguard_core::constants::live::INJECTION_TICKS;
use orbitguard_core::{comm, FeatureVector, TelemetrySample};
use orbitguard_ml::{
    AnomalyPipeline, MLResult, PersistencePredictor, PipelineConfig, ScoreBatch, Scorer,
    StreamingConfig,
};
use orbitguard_sim::{
    AnomalyKind, InjectRequest, LiveSimulator, SampleSource, ServiceError, SimulatorConfig,
    SimulatorState, StatsResponse, TelemetryService,
};

// ===== TEST CONSTANTS =====

/// Pre-fill used by the operator console at start-up
const PREFILL: usize = 50;

/// Fast tick for lifecycle tests
const FAST_TICK: Duration = Duration::from_millis(5);

/// Healthy spacecraft: constant readings well inside limits
struct Nominal;

impl SampleSource for Nominal {
    fn next_sample(&mut self, tick: u64) -> TelemetrySample {
        TelemetrySample {
            timestamp: 1_700_000_000 + tick as u32,
            battery_v: 3.9 + 0.001 * (tick % 3) as f32,
            solar_i: 0.3,
            temp: 28.0,
            cpu: 22,
            comm: comm::OK,
            ..Default::default()
        }
    }
}

/// Multivariate detector that blows up on every call
struct Broken;

impl Scorer for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn score(&self, _batch: &[FeatureVector]) -> MLResult<ScoreBatch> {
        panic!("bad model")
    }
}

fn quiet_config() -> SimulatorConfig {
    SimulatorConfig::default().with_auto_inject(0.0).with_seed(99)
}

fn rule_only_sim(capacity: usize) -> Arc<LiveSimulator> {
    Arc::new(LiveSimulator::with_source(
        quiet_config().with_capacity(capacity),
        AnomalyPipeline::new(PipelineConfig::default()),
        Nominal,
    ))
}

#[test]
fn comm_injection_lasts_five_ticks_then_reverts() {
    let sim = rule_only_sim(1000);
    sim.prefill(PREFILL);
    sim.inject(AnomalyKind::Comm);

    let injected: Vec<_> = (0..INJECTION_TICKS).map(|_| sim.tick_once()).collect();
    for s in &injected {
        assert_eq!(s.sample().comm, comm::LOSS);
        assert!(s.rule_flag());
        assert!(s.violations().comm_loss);
    }

    let after = sim.tick_once();
    assert_eq!(after.sample().comm, comm::OK);
    assert!(!after.combined_flag());
    assert!(sim.status().injection.is_none());
}

#[test]
fn battery_injection_drops_voltage() {
    let sim = rule_only_sim(100);
    sim.prefill(10);
    sim.inject(AnomalyKind::Battery);
    let s = sim.tick_once();
    // Nominal 3.901 minus 0.5 to 1.2 V
    let v = s.sample().battery_v;
    assert!(v <= 3.41 && v >= 2.70, "battery {}", v);
    assert_eq!(s.violations().low_battery, v < 3.2);
}

#[test]
fn full_buffer_drops_oldest_first() {
    let sim = rule_only_sim(3);
    sim.prefill(4);
    let stamps: Vec<u32> = sim
        .get_latest(100)
        .iter()
        .map(|s| s.sample().timestamp - 1_700_000_000)
        .collect();
    assert_eq!(stamps, vec![1, 2, 3]);
}

#[test]
fn service_rejects_unknown_type_without_side_effects() {
    let sim = rule_only_sim(100);
    let service = TelemetryService::new(Arc::clone(&sim));
    sim.prefill(5);

    let err = service
        .inject_anomaly(&InjectRequest {
            kind: "solar".into(),
        })
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidAnomalyType(_)));
    assert_eq!(err.status_code(), 400);
    assert!(sim.status().injection.is_none());
    assert!(!sim.tick_once().combined_flag());
}

#[test]
fn stats_split_critical_from_warning() {
    let config = PipelineConfig::default().with_streaming(StreamingConfig {
        population: 100,
        refresh_every: 10,
        min_population: 20,
    });
    let pipeline = AnomalyPipeline::new(config).with_predictor(PersistencePredictor::new(5));
    let sim = Arc::new(LiveSimulator::with_source(quiet_config(), pipeline, Nominal));
    let service = TelemetryService::new(Arc::clone(&sim));

    sim.prefill(PREFILL);
    assert_eq!(
        service.stats(),
        StatsResponse {
            critical: 0,
            warning: 0,
            normal: PREFILL
        }
    );

    let response = service
        .inject_anomaly(&InjectRequest {
            kind: "comm".into(),
        })
        .unwrap();
    assert_eq!(response.status, "injected");
    assert_eq!(response.kind, AnomalyKind::Comm);
    sim.prefill(INJECTION_TICKS as usize);

    let stats = service.stats();
    assert_eq!(stats.critical, INJECTION_TICKS as usize);
    assert_eq!(stats.critical + stats.warning + stats.normal, service.telemetry().len());
}

#[test]
fn telemetry_window_is_capped() {
    let sim = rule_only_sim(1000);
    let service = TelemetryService::new(Arc::clone(&sim));
    sim.prefill(350);
    let window = service.telemetry();
    assert_eq!(window.len(), 300);
    assert_eq!(
        window.last().map(|s| s.sample().timestamp),
        Some(1_700_000_000 + 349)
    );
}

#[test]
fn producer_thread_lifecycle() {
    let sim = Arc::new(LiveSimulator::with_source(
        quiet_config().with_tick_interval(FAST_TICK),
        AnomalyPipeline::new(PipelineConfig::default()),
        Nominal,
    ));

    sim.start().unwrap();
    sim.start().unwrap();

    // Concurrent readers never see a torn or oversized buffer
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let sim = Arc::clone(&sim);
            thread::spawn(move || {
                for _ in 0..50 {
                    let batch = sim.get_latest(10);
                    assert!(batch.len() <= 10);
                    assert!(batch
                        .windows(2)
                        .all(|w| w[0].sample().timestamp < w[1].sample().timestamp));
                }
            })
        })
        .collect();
    for r in readers {
        r.join().unwrap();
    }

    thread::sleep(Duration::from_millis(40));
    sim.stop();
    let status = sim.status();
    assert_eq!(status.state, SimulatorState::Stopped);
    assert!(status.ticks > 0);

    // Restart after stop
    sim.start().unwrap();
    assert!(sim.is_running());
    sim.stop();
}

#[test]
fn panicking_scorer_does_not_stop_ingestion() {
    let pipeline = AnomalyPipeline::new(PipelineConfig::default()).with_scorer(Broken);
    let sim = Arc::new(LiveSimulator::with_source(
        quiet_config().with_tick_interval(FAST_TICK),
        pipeline,
        Nominal,
    ));

    sim.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    let status = sim.status();
    assert_eq!(status.state, SimulatorState::Running);
    assert!(status.ticks >= 2, "ticks {}", status.ticks);
    assert_eq!(status.buffered as u64, status.ticks);
    sim.stop();

    let latest = sim.get_latest(10);
    assert!(latest.iter().all(|s| !s.iso_flag() && s.iso_score() == 0.0));
}
