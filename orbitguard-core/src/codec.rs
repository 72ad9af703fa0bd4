//! Fixed-width binary packet codec
//!
//! ## Wire Layout
//!
//! Every telemetry sample is a 62-byte big-endian block with no padding,
//! header, footer or length prefix. A stream is a plain concatenation of
//! blocks; the record count is `len / 62`.
//!
//! ```text
//! offset  size  field
//! ------  ----  ---------------------------
//!      0     4  timestamp   u32
//!      4     4  battery_v   f32
//!      8     4  solar_i     f32
//!     12     4  temp        f32
//!     16     1  cpu         u8
//!     17     1  comm        u8
//!     18     2  flags       u16
//!     20    16  qx qy qz qw f32 × 4
//!     36    32  extra0..7   f32 × 8
//! ```
//!
//! Floats are stored bit-for-bit (`to_bits`/`from_bits`), so
//! `decode(encode(s)) == s` is exact for every sample with finite fields and
//! NaN payloads survive unchanged.
//!
//! ## Partial Data
//!
//! A block shorter than [`PACKET_SIZE`] decodes to `None`. Streams whose
//! length is not a multiple of the block size yield `floor(len / 62)`
//! records; the trailing bytes are counted in [`ReaderStats::trailing_bytes`]
//! and otherwise ignored.
//!
//! ## Example
//!
//! ```rust
//! use orbitguard_core::codec::{decode, encode, PACKET_SIZE};
//! use orbitguard_core::TelemetrySample;
//!
//! let sample = TelemetrySample { timestamp: 42, battery_v: 3.87, ..Default::default() };
//! let block = encode(&sample);
//! assert_eq!(block.len(), PACKET_SIZE);
//! assert_eq!(decode(&block), Some(sample));
//! assert_eq!(decode(&block[..40]), None);
//! ```

use std::io::{self, Read, Write};

use crate::errors::{CodecError, CodecResult};
use crate::sample::{TelemetrySample, EXTRA_CHANNELS};

pub use crate::constants::wire::PACKET_SIZE;

/// One encoded telemetry block
pub type Packet = [u8; PACKET_SIZE];

/// Encode a sample into a new block
pub fn encode(sample: &TelemetrySample) -> Packet {
    let mut block = [0u8; PACKET_SIZE];
    write_fields(sample, &mut block);
    block
}

/// Encode a sample into the first [`PACKET_SIZE`] bytes of `out`
pub fn encode_into(sample: &TelemetrySample, out: &mut [u8]) -> CodecResult<()> {
    let available = out.len();
    let block: &mut Packet = out
        .get_mut(..PACKET_SIZE)
        .and_then(|s| s.try_into().ok())
        .ok_or(CodecError::BufferTooSmall {
            required: PACKET_SIZE,
            available,
        })?;
    write_fields(sample, block);
    Ok(())
}

fn write_fields(sample: &TelemetrySample, block: &mut Packet) {
    let mut w = FieldWriter { block, pos: 0 };
    w.put(&sample.timestamp.to_be_bytes());
    w.put(&sample.battery_v.to_bits().to_be_bytes());
    w.put(&sample.solar_i.to_bits().to_be_bytes());
    w.put(&sample.temp.to_bits().to_be_bytes());
    w.put(&[sample.cpu, sample.comm]);
    w.put(&sample.flags.to_be_bytes());
    for q in [sample.qx, sample.qy, sample.qz, sample.qw] {
        w.put(&q.to_bits().to_be_bytes());
    }
    for extra in sample.extra {
        w.put(&extra.to_bits().to_be_bytes());
    }
    debug_assert_eq!(w.pos, PACKET_SIZE);
}

struct FieldWriter<'a> {
    block: &'a mut Packet,
    pos: usize,
}

impl FieldWriter<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.block[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }
}

/// Decode the first block of `bytes`.
///
/// Returns `None` when fewer than [`PACKET_SIZE`] bytes are available.
/// Bytes past the first block are ignored.
pub fn decode(bytes: &[u8]) -> Option<TelemetrySample> {
    let block: &Packet = bytes.get(..PACKET_SIZE)?.try_into().ok()?;
    let mut r = FieldReader { block, pos: 0 };

    let timestamp = u32::from_be_bytes(r.take());
    let battery_v = r.f32();
    let solar_i = r.f32();
    let temp = r.f32();
    let [cpu, comm] = r.take();
    let flags = u16::from_be_bytes(r.take());
    let qx = r.f32();
    let qy = r.f32();
    let qz = r.f32();
    let qw = r.f32();
    let mut extra = [0.0; EXTRA_CHANNELS];
    for slot in extra.iter_mut() {
        *slot = r.f32();
    }

    Some(TelemetrySample {
        timestamp,
        battery_v,
        solar_i,
        temp,
        cpu,
        comm,
        flags,
        qx,
        qy,
        qz,
        qw,
        extra,
    })
}

struct FieldReader<'a> {
    block: &'a Packet,
    pos: usize,
}

impl FieldReader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.block[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn f32(&mut self) -> f32 {
        f32::from_bits(u32::from_be_bytes(self.take()))
    }
}

/// Decode every complete block in `bytes`, ignoring a trailing partial block
pub fn decode_all(bytes: &[u8]) -> Vec<TelemetrySample> {
    bytes.chunks_exact(PACKET_SIZE).filter_map(decode).collect()
}

/// Number of bytes after the last complete block
pub fn trailing_bytes(len: usize) -> usize {
    len % PACKET_SIZE
}

/// Statistics for a [`PacketReader`]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReaderStats {
    /// Complete records decoded
    pub records_read: usize,
    /// Bytes consumed from the source
    pub bytes_read: usize,
    /// Bytes of an incomplete final record, ignored
    pub trailing_bytes: usize,
}

/// Streaming decoder over any byte source
///
/// Yields one sample per complete block and ends cleanly at end-of-file,
/// even when the final block is cut short.
///
/// ```rust
/// use orbitguard_core::codec::{encode, PacketReader};
/// use orbitguard_core::TelemetrySample;
///
/// let mut bytes = encode(&TelemetrySample::default()).to_vec();
/// bytes.extend_from_slice(&[0xAB; 10]); // interrupted write
///
/// let mut reader = PacketReader::new(bytes.as_slice());
/// let samples: Vec<_> = reader.by_ref().collect::<Result<_, _>>().unwrap();
/// assert_eq!(samples.len(), 1);
/// assert_eq!(reader.stats().trailing_bytes, 10);
/// ```
pub struct PacketReader<R> {
    source: R,
    stats: ReaderStats,
    done: bool,
}

impl<R: Read> PacketReader<R> {
    /// Create a reader over `source`
    pub fn new(source: R) -> Self {
        Self {
            source,
            stats: ReaderStats::default(),
            done: false,
        }
    }

    /// Get statistics
    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    /// Recover the underlying source
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Fill `block` as far as possible; returns the byte count read
    fn fill(&mut self, block: &mut Packet) -> io::Result<usize> {
        let mut filled = 0;
        while filled < PACKET_SIZE {
            match self.source.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for PacketReader<R> {
    type Item = io::Result<TelemetrySample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut block = [0u8; PACKET_SIZE];
        let filled = match self.fill(&mut block) {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        self.stats.bytes_read += filled;

        if filled < PACKET_SIZE {
            self.done = true;
            self.stats.trailing_bytes = filled;
            if filled > 0 {
                log::debug!("ignoring {} trailing bytes of a partial record", filled);
            }
            return None;
        }

        self.stats.records_read += 1;
        decode(&block).map(Ok)
    }
}

/// Streaming encoder into any byte sink
pub struct PacketWriter<W> {
    sink: W,
    records_written: usize,
}

impl<W: Write> PacketWriter<W> {
    /// Create a writer over `sink`
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            records_written: 0,
        }
    }

    /// Append one sample
    pub fn write_sample(&mut self, sample: &TelemetrySample) -> CodecResult<()> {
        self.sink.write_all(&encode(sample))?;
        self.records_written += 1;
        Ok(())
    }

    /// Append every sample in order
    pub fn write_all_samples(&mut self, samples: &[TelemetrySample]) -> CodecResult<()> {
        for sample in samples {
            self.write_sample(sample)?;
        }
        Ok(())
    }

    /// Records written so far
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Flush and recover the sink
    pub fn into_inner(mut self) -> CodecResult<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u32) -> TelemetrySample {
        TelemetrySample {
            timestamp: ts,
            battery_v: 3.871,
            solar_i: 0.312,
            temp: 27.25,
            cpu: 37,
            comm: 0,
            flags: 0xBEEF,
            qx: 1.0,
            qy: -0.25,
            qz: 0.5,
            qw: 0.0,
            extra: [0.1, -0.2, 0.3, -0.4, 0.5, -0.6, 0.7, -0.8],
        }
    }

    #[test]
    fn packet_size_matches_layout() {
        assert_eq!(PACKET_SIZE, 4 + 4 + 4 + 4 + 1 + 1 + 2 + 4 * 4 + 4 * 8);
        assert_eq!(encode(&sample(1)).len(), 62);
    }

    #[test]
    fn layout_is_big_endian_in_field_order() {
        let block = encode(&sample(0x0102_0304));
        assert_eq!(&block[0..4], &[1, 2, 3, 4]);
        assert_eq!(&block[4..8], &3.871f32.to_be_bytes());
        assert_eq!(block[16], 37);
        assert_eq!(block[17], 0);
        assert_eq!(&block[18..20], &[0xBE, 0xEF]);
        assert_eq!(&block[20..24], &1.0f32.to_be_bytes());
        assert_eq!(&block[58..62], &(-0.8f32).to_be_bytes());
    }

    #[test]
    fn round_trip_is_exact() {
        let s = sample(1_700_000_123);
        assert_eq!(decode(&encode(&s)), Some(s));
    }

    #[test]
    fn nan_bits_preserved() {
        let mut s = sample(5);
        s.temp = f32::from_bits(0x7FC0_1234);
        let back = decode(&encode(&s)).unwrap();
        assert_eq!(back.temp.to_bits(), 0x7FC0_1234);
    }

    #[test]
    fn short_block_is_no_record() {
        let block = encode(&sample(1));
        assert_eq!(decode(&block[..PACKET_SIZE - 1]), None);
        assert_eq!(decode(&[]), None);
    }

    #[test]
    fn encode_into_rejects_small_buffer() {
        let mut out = [0u8; 10];
        let err = encode_into(&sample(1), &mut out).unwrap_err();
        assert!(matches!(err, CodecError::BufferTooSmall { required: 62, available: 10 }));

        let mut big = [0u8; 100];
        encode_into(&sample(1), &mut big).unwrap();
        assert_eq!(decode(&big), Some(sample(1)));
    }

    #[test]
    fn decode_all_ignores_partial_tail() {
        let mut bytes = Vec::new();
        for ts in 0..3 {
            bytes.extend_from_slice(&encode(&sample(ts)));
        }
        bytes.extend_from_slice(&[0u8; 17]);

        let samples = decode_all(&bytes);
        assert_eq!(samples.len(), bytes.len() / PACKET_SIZE);
        assert_eq!(samples[2].timestamp, 2);
        assert_eq!(trailing_bytes(bytes.len()), 17);
    }

    #[test]
    fn reader_stops_cleanly_on_truncated_file() {
        let mut bytes = Vec::new();
        for ts in 0..4 {
            bytes.extend_from_slice(&encode(&sample(ts)));
        }
        bytes.truncate(bytes.len() - 5);

        let mut reader = PacketReader::new(bytes.as_slice());
        let samples: Vec<_> = reader.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(reader.stats().records_read, 3);
        assert_eq!(reader.stats().trailing_bytes, PACKET_SIZE - 5);
        assert!(reader.next().is_none());
    }

    #[test]
    fn reader_on_empty_source() {
        let mut reader = PacketReader::new(io::empty());
        assert!(reader.next().is_none());
        assert_eq!(reader.stats(), &ReaderStats::default());
    }

    #[test]
    fn writer_then_reader() {
        let samples: Vec<_> = (10..15).map(sample).collect();
        let mut writer = PacketWriter::new(Vec::new());
        writer.write_all_samples(&samples).unwrap();
        assert_eq!(writer.records_written(), 5);
        let bytes = writer.into_inner().unwrap();
        assert_eq!(bytes.len(), 5 * PACKET_SIZE);

        let read: Vec<_> = PacketReader::new(bytes.as_slice())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(read, samples);
    }
}
