//! Error types for the simulator, batch processor and query surface

use std::io;
use std::path::PathBuf;

use orbitguard_core::CodecError;
use thiserror::Error;

/// Live simulator errors
#[derive(Debug, Error)]
pub enum SimError {
    /// Producer thread could not be spawned
    #[error("Failed to spawn simulator thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Anomaly kind name not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid anomaly type '{0}' (expected battery, temp or comm)")]
pub struct InvalidAnomalyKind(pub String);

/// Batch processing errors
#[derive(Debug, Error)]
pub enum BatchError {
    /// Input file could not be opened
    #[error("Cannot read batch input {}: {source}", path.display())]
    Input {
        /// Offending path
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: io::Error,
    },

    /// Output file or directory could not be created
    #[error("Cannot write batch output {}: {source}", path.display())]
    Output {
        /// Offending path
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: io::Error,
    },

    /// Read or write failed mid-run
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Packet codec failure
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Client-facing query surface errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Unknown anomaly type in an inject request
    #[error(transparent)]
    InvalidAnomalyType(#[from] InvalidAnomalyKind),
}

impl ServiceError {
    /// HTTP-style status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidAnomalyType(_) => 400,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read config {}: {source}", path.display())]
    Read {
        /// Offending path
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: io::Error,
    },

    /// Config file is not valid JSON for [`AppConfig`](crate::AppConfig)
    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        /// Offending path
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
