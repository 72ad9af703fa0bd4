//! Core data model and wire format for OrbitGuard
//!
//! Handles the telemetry sample record, its fixed 62-byte big-endian packet
//! codec, the hard threshold rule check and the bounded ring buffer that
//! backs the live telemetry window.
//!
//! ```no_run
//! use orbitguard_core::{codec, rules, TelemetrySample};
//!
//! let bytes = std::fs::read("data/telemetry.bin").unwrap();
//! for sample in codec::decode_all(&bytes) {
//!     if rules::rule_flag(&sample) {
//!         // battery low, overheating or link lost
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod codec;
pub mod constants;
pub mod errors;
pub mod rules;
pub mod sample;

// Public API
pub use buffer::RingBuffer;
pub use codec::{decode, decode_all, encode, PacketReader, PacketWriter, PACKET_SIZE};
pub use errors::{CodecError, CodecResult};
pub use rules::{rule_flag, RuleViolations};
pub use sample::{
    comm, FeatureVector, ScoredSample, TelemetrySample, Verdicts, EXTRA_CHANNELS, FEATURE_COUNT,
    FIELD_COUNT, FIELD_NAMES,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
