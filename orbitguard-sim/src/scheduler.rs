//! Periodic batch runs
//!
//! Each run reloads the model directory, so a retrain between runs is picked
//! up without a restart. Runs execute on the blocking pool and are awaited
//! before the next tick; ticks missed while a run is in progress are skipped.

use std::time::Duration;

use orbitguard_ml::PipelineConfig;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::batch::{BatchConfig, BatchProcessor, BatchSummary};
use crate::BatchError;

/// Runs the batch processor on a fixed interval
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch: BatchConfig,
    pipeline: PipelineConfig,
    interval: Duration,
}

impl BatchScheduler {
    /// Schedule `batch` every `batch.interval_secs` seconds
    pub fn new(batch: BatchConfig, pipeline: PipelineConfig) -> Self {
        let interval = Duration::from_secs(batch.interval_secs.max(1));
        Self {
            batch,
            pipeline,
            interval,
        }
    }

    /// Override the interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one batch synchronously
    pub fn run_once(&self) -> Result<BatchSummary, BatchError> {
        let processor = BatchProcessor::from_model_dir(&self.batch.model_dir, self.pipeline);
        processor.run_files(&self.batch.input, &self.batch.output)
    }

    /// Run until `shutdown` turns true (or its sender is dropped).
    ///
    /// The first run starts immediately. Returns the number of completed
    /// runs, failed ones included.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!(
            "Batch scheduler started: {} every {:?}",
            self.batch.input.display(),
            self.interval
        );

        let mut runs = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let job = self.clone();
                    match tokio::task::spawn_blocking(move || job.run_once()).await {
                        Ok(Ok(summary)) => log::info!(
                            "Scheduled batch: {} records, {} flagged",
                            summary.records,
                            summary.flagged
                        ),
                        Ok(Err(e)) => log::error!("Scheduled batch failed: {}", e),
                        Err(e) => log::error!("Scheduled batch panicked: {}", e),
                    }
                    runs += 1;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        log::info!("Batch scheduler stopped after {} runs", runs);
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbitguard_core::PacketWriter;
    use std::fs::File;

    #[tokio::test]
    async fn runs_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("telemetry.bin");
        let samples = crate::generator::synthetic_series(20, 0, 60, false, 1);
        let mut writer = PacketWriter::new(File::create(&input).unwrap());
        writer.write_all_samples(&samples).unwrap();
        writer.into_inner().unwrap();

        let batch = BatchConfig {
            input,
            output: dir.path().join("out/processed.csv"),
            model_dir: dir.path().join("model"),
            interval_secs: 1,
        };
        let flagged = batch.flagged_path();
        let scheduler = BatchScheduler::new(batch, PipelineConfig::default())
            .with_interval(Duration::from_millis(20));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler.run(rx));
        time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let runs = task.await.unwrap();
        assert!(runs >= 1);
        assert!(flagged.exists());
    }

    #[tokio::test]
    async fn failing_runs_do_not_stop_the_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let batch = BatchConfig {
            input: dir.path().join("absent.bin"),
            output: dir.path().join("processed.csv"),
            model_dir: dir.path().join("model"),
            interval_secs: 1,
        };
        let scheduler = BatchScheduler::new(batch, PipelineConfig::default())
            .with_interval(Duration::from_millis(10));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler.run(rx));
        time::sleep(Duration::from_millis(80)).await;
        drop(tx);

        assert!(task.await.unwrap() >= 2);
    }
}
