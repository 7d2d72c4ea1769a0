//! Pluggable compression for persisted content
//!
//! Persistence only sees the narrow [`Compressor`] trait, so algorithms can
//! be swapped without touching capture or save/load logic. Two
//! implementations ship with the crate:
//!
//! - [`Lz4Compressor`]: LZ4 block compression (default)
//! - [`NoCompression`]: identity transform
//!
//! ## Format
//!
//! `Lz4Compressor` output starts with a 4-byte header:
//! - `LZ4F` (0x4C5A3446): LZ4 block with prepended size follows
//! - `\0\0\0\0`: uncompressed data follows
//!
//! Inputs that do not shrink are stored behind the null header, so
//! `decompress(compress(x)) == x` holds for every input, the empty buffer
//! included.
//!
//! ```rust
//! use filesnap::compression::{Compressor, Lz4Compressor};
//!
//! let lz4 = Lz4Compressor::default();
//! let data = b"Hello, world! Hello, world! Hello, world!".repeat(10);
//! let compressed = lz4.compress(&data).unwrap();
//! assert!(compressed.len() < data.len());
//! assert_eq!(lz4.decompress(&compressed).unwrap(), data);
//! ```

use crate::error::{Result, SnapError};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::trace;

/// Reversible byte transform applied to persisted content
///
/// Implementations must be exact inverses for all inputs and safe to call
/// from many threads at once.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Short name recorded in persisted snapshots
    fn name(&self) -> &'static str;

    /// Transform bytes for storage
    ///
    /// # Errors
    ///
    /// - [`SnapError::Compression`] if the input cannot be encoded
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Undo [`Compressor::compress`]
    ///
    /// # Errors
    ///
    /// - [`SnapError::Decompression`] if the input was not produced by this compressor
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Identity compressor
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Compression statistics for monitoring
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompressionStats {
    /// Number of buffers compressed
    pub buffers_compressed: usize,
    /// Number of buffers stored raw
    pub buffers_stored_raw: usize,
    /// Total bytes saved by compression
    pub bytes_saved: u64,
    /// Total compression time in microseconds
    pub compression_time_us: u64,
}

impl CompressionStats {
    /// Fraction of buffers that were actually compressed (0.0 to 1.0)
    pub fn compression_ratio(&self) -> f64 {
        let total = self.buffers_compressed + self.buffers_stored_raw;
        if total == 0 {
            return 0.0;
        }
        self.buffers_compressed as f64 / total as f64
    }
}

const LZ4_MAGIC: &[u8] = b"LZ4F";
const RAW_MAGIC: &[u8] = &[0, 0, 0, 0];

/// Largest input the 32-bit LZ4 size prefix can describe
const MAX_FRAME_LEN: u64 = u32::MAX as u64;

fn check_frame_len(len: usize) -> Result<()> {
    if len as u64 > MAX_FRAME_LEN {
        return Err(SnapError::compression(format!(
            "Buffer of {} bytes exceeds the LZ4 frame limit of {} bytes",
            len, MAX_FRAME_LEN
        )));
    }
    Ok(())
}

/// LZ4 block compressor
///
/// Buffers smaller than `min_size` are stored raw without a compression
/// attempt.
#[derive(Debug)]
pub struct Lz4Compressor {
    min_size: usize,
    buffers_compressed: AtomicUsize,
    buffers_stored_raw: AtomicUsize,
    bytes_saved: AtomicU64,
    compression_time_us: AtomicU64,
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Lz4Compressor {
    /// Create a compressor that skips buffers below `min_size` bytes
    pub fn new(min_size: usize) -> Self {
        Self {
            min_size,
            buffers_compressed: AtomicUsize::new(0),
            buffers_stored_raw: AtomicUsize::new(0),
            bytes_saved: AtomicU64::new(0),
            compression_time_us: AtomicU64::new(0),
        }
    }

    /// Statistics accumulated since creation
    pub fn stats(&self) -> CompressionStats {
        CompressionStats {
            buffers_compressed: self.buffers_compressed.load(Ordering::Relaxed),
            buffers_stored_raw: self.buffers_stored_raw.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
            compression_time_us: self.compression_time_us.load(Ordering::Relaxed),
        }
    }

    fn store_raw(&self, data: &[u8]) -> Vec<u8> {
        self.buffers_stored_raw.fetch_add(1, Ordering::Relaxed);
        let mut result = Vec::with_capacity(RAW_MAGIC.len() + data.len());
        result.extend_from_slice(RAW_MAGIC);
        result.extend_from_slice(data);
        result
    }
}

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < self.min_size {
            trace!("Buffer of {} bytes below threshold, storing raw", data.len());
            return Ok(self.store_raw(data));
        }
        check_frame_len(data.len())?;

        let start = Instant::now();
        let compressed = compress_prepend_size(data);
        self.compression_time_us
            .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);

        if compressed.len() + LZ4_MAGIC.len() >= data.len() + RAW_MAGIC.len() {
            trace!("Compression not beneficial for {} bytes, storing raw", data.len());
            return Ok(self.store_raw(data));
        }

        self.buffers_compressed.fetch_add(1, Ordering::Relaxed);
        self.bytes_saved
            .fetch_add((data.len() - compressed.len()) as u64, Ordering::Relaxed);

        let mut result = Vec::with_capacity(LZ4_MAGIC.len() + compressed.len());
        result.extend_from_slice(LZ4_MAGIC);
        result.extend_from_slice(&compressed);
        Ok(result)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 4 {
            return Err(SnapError::decompression("Content too short"));
        }

        if let Some(body) = data.strip_prefix(LZ4_MAGIC) {
            decompress_size_prepended(body)
                .map_err(|e| SnapError::decompression(format!("LZ4 decompression failed: {}", e)))
        } else if let Some(body) = data.strip_prefix(RAW_MAGIC) {
            Ok(body.to_vec())
        } else {
            Err(SnapError::decompression("Unknown compression header"))
        }
    }
}
