//! Error types for the packet codec
//!
//! Short or truncated input is deliberately *not* an error: decoding reports
//! "no more complete records" through `Option`/iterator exhaustion, so a
//! reader stops cleanly when the last write to a file was interrupted. Only
//! caller mistakes (an output slice that cannot hold a block) and real I/O
//! failures are surfaced here.

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Packet codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// Output slice cannot hold one encoded block
    #[error("Output buffer too small: need {required} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes needed for one block
        required: usize,
        /// Bytes the caller provided
        available: usize,
    },

    /// Underlying reader or writer failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
