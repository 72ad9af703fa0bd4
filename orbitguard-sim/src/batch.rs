//! Offline batch processing
//!
//! Decodes a stored packet stream, scores it with the full pipeline and
//! writes two CSV tables: every scored sample, and only the flagged ones.
//!
//! ## Output Format
//!
//! ```csv
//! timestamp,battery_v,solar_i,temp,cpu,comm,flags,qx,qy,qz,qw,extra0,...,extra7,iso_flag,iso_score,lr_batt_flag,rule_flag,combined_flag
//! 1700000000,3.91,0.34,27.2,21,0,0,1,0,0,0,0.12,...,-0.4,0,-0.081,0,0,0
//! ```
//!
//! Flags are written as 0/1. Missing (non-finite) readings are left empty.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use orbitguard_core::{PacketReader, ScoredSample, TelemetrySample, FIELD_NAMES};
use orbitguard_ml::{AnomalyPipeline, ModelBundle, PipelineConfig};
use serde::{Deserialize, Serialize};

use crate::BatchError;

/// File name of the flagged-events table, written next to the full output
pub const FLAGGED_FILE: &str = "flagged_events.csv";

/// Verdict columns appended after the sample fields
pub const VERDICT_COLUMNS: [&str; 5] = [
    "iso_flag",
    "iso_score",
    "lr_batt_flag",
    "rule_flag",
    "combined_flag",
];

/// Batch job locations and schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Packet stream to process
    pub input: PathBuf,
    /// Full scored table
    pub output: PathBuf,
    /// Directory holding the model artifacts
    pub model_dir: PathBuf,
    /// Seconds between scheduled runs
    pub interval_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/telemetry.bin"),
            output: PathBuf::from("data/processed.csv"),
            model_dir: PathBuf::from("model"),
            interval_secs: 60,
        }
    }
}

impl BatchConfig {
    /// Flagged table path: [`FLAGGED_FILE`] in the output's directory
    pub fn flagged_path(&self) -> PathBuf {
        flagged_path_for(&self.output)
    }
}

fn flagged_path_for(output: &Path) -> PathBuf {
    output
        .parent()
        .map(|dir| dir.join(FLAGGED_FILE))
        .unwrap_or_else(|| PathBuf::from(FLAGGED_FILE))
}

/// Counts from one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Complete records decoded
    pub records: usize,
    /// Records with the combined flag set
    pub flagged: usize,
    /// Records failing a hard rule
    pub rule_flags: usize,
    /// Records flagged by the multivariate detector
    pub iso_flags: usize,
    /// Records flagged by the battery residual detector
    pub residual_flags: usize,
    /// Bytes after the last complete record
    pub trailing_bytes: usize,
}

/// Scores stored telemetry with a fixed pipeline
#[derive(Debug)]
pub struct BatchProcessor {
    pipeline: AnomalyPipeline,
}

impl BatchProcessor {
    /// Use an already-built pipeline
    pub fn new(pipeline: AnomalyPipeline) -> Self {
        Self { pipeline }
    }

    /// Load whatever models `model_dir` holds
    pub fn from_model_dir(model_dir: impl AsRef<Path>, config: PipelineConfig) -> Self {
        Self::new(ModelBundle::load(model_dir).into_pipeline(config))
    }

    /// The scoring pipeline
    pub fn pipeline(&self) -> &AnomalyPipeline {
        &self.pipeline
    }

    /// Decode `input`, score it and write both tables
    pub fn run<R, F, G>(&self, input: R, full: F, flagged: G) -> Result<BatchSummary, BatchError>
    where
        R: Read,
        F: Write,
        G: Write,
    {
        let mut reader = PacketReader::new(input);
        let samples = reader.by_ref().collect::<io::Result<Vec<TelemetrySample>>>()?;
        let trailing_bytes = reader.stats().trailing_bytes;

        let scored = self.pipeline.score_batch(&samples);

        let mut full = CsvWriter::new(full)?;
        let mut flagged = CsvWriter::new(flagged)?;
        let mut summary = BatchSummary {
            records: scored.len(),
            trailing_bytes,
            ..Default::default()
        };

        for s in &scored {
            full.write_row(s)?;
            if s.rule_flag() {
                summary.rule_flags += 1;
            }
            if s.iso_flag() {
                summary.iso_flags += 1;
            }
            if s.residual_flag() {
                summary.residual_flags += 1;
            }
            if s.combined_flag() {
                summary.flagged += 1;
                flagged.write_row(s)?;
            }
        }
        full.finish()?;
        flagged.finish()?;

        Ok(summary)
    }

    /// Run on files; the flagged table is written next to `output`
    pub fn run_files(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<BatchSummary, BatchError> {
        let input = input.as_ref();
        let output = output.as_ref();

        let source = File::open(input).map_err(|source| BatchError::Input {
            path: input.to_path_buf(),
            source,
        })?;

        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| BatchError::Output {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let flagged_path = flagged_path_for(output);
        let full = create(output)?;
        let flagged = create(&flagged_path)?;

        let summary = self.run(BufReader::new(source), full, flagged)?;
        log::info!(
            "Batch {}: {} records, {} flagged (rule={}, iso={}, battery={}) -> {}, {}",
            input.display(),
            summary.records,
            summary.flagged,
            summary.rule_flags,
            summary.iso_flags,
            summary.residual_flags,
            output.display(),
            flagged_path.display()
        );
        Ok(summary)
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, BatchError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| BatchError::Output {
            path: path.to_path_buf(),
            source,
        })
}

struct CsvWriter<W: Write> {
    out: W,
}

impl<W: Write> CsvWriter<W> {
    fn new(mut out: W) -> io::Result<Self> {
        let header: Vec<&str> = FIELD_NAMES.iter().chain(VERDICT_COLUMNS.iter()).copied().collect();
        writeln!(out, "{}", header.join(","))?;
        Ok(Self { out })
    }

    fn write_row(&mut self, scored: &ScoredSample) -> io::Result<()> {
        let s = scored.sample();
        write!(self.out, "{},", s.timestamp)?;
        for v in [s.battery_v, s.solar_i, s.temp] {
            write_float(&mut self.out, v)?;
        }
        write!(self.out, "{},{},{},", s.cpu, s.comm, s.flags)?;
        for v in [s.qx, s.qy, s.qz, s.qw].into_iter().chain(s.extra) {
            write_float(&mut self.out, v)?;
        }
        writeln!(
            self.out,
            "{},{},{},{},{}",
            u8::from(scored.iso_flag()),
            scored.iso_score(),
            u8::from(scored.residual_flag()),
            u8::from(scored.rule_flag()),
            u8::from(scored.combined_flag())
        )
    }

    fn finish(mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn write_float<W: Write>(out: &mut W, v: f32) -> io::Result<()> {
    if v.is_finite() {
        write!(out, "{},", v)
    } else {
        out.write_all(b",")
    }
}
