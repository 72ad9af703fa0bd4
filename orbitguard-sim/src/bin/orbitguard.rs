//! OrbitGuard command line
//!
//! ```text
//! orbitguard generate --output data/telemetry.bin --anomalies
//! orbitguard train    --input data/telemetry.bin --model-dir model
//! orbitguard batch    --input data/telemetry.bin --output data/processed.csv
//! orbitguard simulate --seconds 30 --inject battery
//! orbitguard schedule --interval-secs 60
//! ```
//!
//! Logging honours `RUST_LOG` (default `info`).

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orbitguard_core::{PacketReader, PacketWriter, TelemetrySample};
use orbitguard_ml::{train_bundle, ModelBundle};
use orbitguard_sim::{
    synthetic_series, AnomalyKind, AppConfig, BatchProcessor, BatchScheduler, Clock,
    InjectRequest, LiveSimulator, SystemClock, TelemetryService,
};

#[derive(Parser, Debug)]
#[command(name = "orbitguard", version, about = "Spacecraft telemetry anomaly detection")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a synthetic packet stream
    Generate {
        /// Output .bin file
        #[arg(long, default_value = "data/telemetry.bin")]
        output: PathBuf,
        /// Number of samples
        #[arg(long, default_value_t = 1440)]
        samples: usize,
        /// Seconds between samples
        #[arg(long, default_value_t = 60)]
        interval: u32,
        /// Inject combined faults into ~2% of samples
        #[arg(long)]
        anomalies: bool,
        /// Random seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Fit the detectors and save them to a model directory
    Train {
        /// Input .bin file (defaults to the configured batch input)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Model directory (defaults to the configured one)
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Score a stored packet stream once
    Batch {
        /// Input .bin file
        #[arg(long)]
        input: Option<PathBuf>,
        /// Full CSV output; flagged rows go next to it
        #[arg(long)]
        output: Option<PathBuf>,
        /// Model directory
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Run the live simulator for a while and print what it saw
    Simulate {
        /// Run time in seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        /// Samples generated before starting
        #[arg(long, default_value_t = 50)]
        prefill: usize,
        /// Fault to inject once running (battery, temp, comm)
        #[arg(long)]
        inject: Option<String>,
        /// Newest samples to print
        #[arg(long, default_value_t = 5)]
        latest: usize,
        /// Model directory
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Run the batch job on an interval until Ctrl-C
    Schedule {
        /// Seconds between runs
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Generate {
            output,
            samples,
            interval,
            anomalies,
            seed,
        } => generate(&output, samples, interval, anomalies, seed),
        Command::Train { input, model_dir } => {
            let input = input.unwrap_or_else(|| config.batch.input.clone());
            let model_dir = model_dir.unwrap_or_else(|| config.batch.model_dir.clone());
            train(&config, &input, &model_dir)
        }
        Command::Batch {
            input,
            output,
            model_dir,
        } => {
            let mut batch = config.batch.clone();
            batch.input = input.unwrap_or(batch.input);
            batch.output = output.unwrap_or(batch.output);
            batch.model_dir = model_dir.unwrap_or(batch.model_dir);

            let processor = BatchProcessor::from_model_dir(&batch.model_dir, config.pipeline);
            let summary = processor.run_files(&batch.input, &batch.output)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Simulate {
            seconds,
            prefill,
            inject,
            latest,
            model_dir,
        } => {
            let model_dir = model_dir.unwrap_or_else(|| config.batch.model_dir.clone());
            simulate(&config, &model_dir, seconds, prefill, inject, latest)
        }
        Command::Schedule { interval_secs } => {
            let mut batch = config.batch.clone();
            if let Some(secs) = interval_secs {
                batch.interval_secs = secs.max(1);
            }
            schedule(BatchScheduler::new(batch, config.pipeline))
        }
    }
}

fn generate(output: &Path, n: usize, interval: u32, anomalies: bool, seed: u64) -> Result<()> {
    let series = synthetic_series(n, SystemClock.now(), interval, anomalies, seed);
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = PacketWriter::new(file);
    writer.write_all_samples(&series)?;
    writer.into_inner()?;
    log::info!("Wrote {} samples to {}", series.len(), output.display());
    Ok(())
}

fn read_samples(path: &Path) -> Result<Vec<TelemetrySample>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let samples = PacketReader::new(BufReader::new(file))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(samples)
}

fn train(config: &AppConfig, input: &Path, model_dir: &Path) -> Result<()> {
    let history = read_samples(input)?;
    let bundle = train_bundle(&history, &config.training)
        .with_context(|| format!("training on {}", input.display()))?;
    bundle
        .save(model_dir)
        .with_context(|| format!("saving models to {}", model_dir.display()))?;
    log::info!("Saved models to {}", model_dir.display());
    Ok(())
}

fn simulate(
    config: &AppConfig,
    model_dir: &Path,
    seconds: u64,
    prefill: usize,
    inject: Option<String>,
    latest: usize,
) -> Result<()> {
    let pipeline = ModelBundle::load(model_dir).into_pipeline(config.pipeline);
    let simulator = Arc::new(LiveSimulator::new(config.simulator.clone(), pipeline));
    let service = TelemetryService::new(Arc::clone(&simulator));

    simulator.prefill(prefill);
    simulator.start()?;
    if let Some(kind) = inject {
        let response = service
            .inject_anomaly(&InjectRequest { kind })
            .with_context(|| format!("choose one of {:?}", AnomalyKind::ALL.map(|k| k.as_str())))?;
        println!("{}", serde_json::to_string(&response)?);
    }

    thread::sleep(Duration::from_secs(seconds));
    simulator.stop();

    println!("{}", serde_json::to_string_pretty(&simulator.status())?);
    println!("{}", serde_json::to_string_pretty(&service.stats())?);
    let samples = simulator.get_latest(latest);
    println!("{}", serde_json::to_string_pretty(&samples)?);
    Ok(())
}

fn schedule(scheduler: BatchScheduler) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;

    runtime.block_on(async move {
        let (tx, rx) = tokio::sync::watch::channel(false);
        let task = tokio::spawn(scheduler.run(rx));

        tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
        log::info!("Shutting down scheduler");
        let _ = tx.send(true);
        task.await.context("scheduler task")?;
        Ok::<(), anyhow::Error>(())
    })
}
