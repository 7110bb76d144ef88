//! Storage engine configuration.
//!
//! Mirrors the teacher's `EngineConfig`: a plain struct with a `Default`
//! impl matching the defaults named in the design, validated once at
//! `HourlyStorageManager::open` before any I/O takes place.

use crate::codec::CompressionAlgorithm;
use crate::error::SpectreError;

/// Target uncompressed size per block, in bytes (default 256 KiB).
pub const DEFAULT_BLOCK_SIZE: u32 = 256 * 1024;

/// Default Bloom filter false-positive rate.
pub const DEFAULT_BLOOM_FALSE_POSITIVE_RATE: f64 = 0.05;

/// Default retention window (days) for DELETE final-state snapshots.
pub const DEFAULT_STATE_RETENTION_DAYS: u32 = 14;

/// Default within-block reorder tolerance, in milliseconds.
pub const DEFAULT_REORDER_WINDOW_MS: u64 = 2_000;

/// Default writer mailbox capacity.
pub const DEFAULT_WRITER_MAILBOX_CAPACITY: usize = 4_096;

/// Configuration for a [`crate::manager::HourlyStorageManager`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Target uncompressed size per block, in bytes.
    pub block_size: u32,

    /// Compression algorithm applied to every block in a file.
    pub compression: CompressionAlgorithm,

    /// Target Bloom filter false-positive rate, in `(0.0, 1.0)`.
    pub bloom_false_positive_rate: f64,

    /// Days after which DELETE final-state snapshots become eligible for
    /// cleanup. Live (non-DELETE) snapshots are retained indefinitely
    /// while their owning file is retained.
    pub state_retention_days: u32,

    /// Within-block event reordering tolerance, in milliseconds.
    pub reorder_window_ms: u64,

    /// Bound on the writer mailbox; `0` is rejected at validation time.
    pub writer_mailbox_capacity: usize,

    /// Whether block checksums are computed and verified.
    pub block_checksums_enabled: bool,

    /// Number of worker threads used to decompress candidate blocks
    /// during query execution. `1` degrades to sequential scanning.
    pub query_thread_pool_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            compression: CompressionAlgorithm::ZstdEquivalent,
            bloom_false_positive_rate: DEFAULT_BLOOM_FALSE_POSITIVE_RATE,
            state_retention_days: DEFAULT_STATE_RETENTION_DAYS,
            reorder_window_ms: DEFAULT_REORDER_WINDOW_MS,
            writer_mailbox_capacity: DEFAULT_WRITER_MAILBOX_CAPACITY,
            block_checksums_enabled: true,
            query_thread_pool_size: 4,
        }
    }
}

impl StorageConfig {
    /// Validates configuration, surfacing violations as
    /// `SpectreError::InvalidArgument` before any I/O occurs.
    pub fn validate(&self) -> Result<(), SpectreError> {
        if self.block_size == 0 {
            return Err(SpectreError::invalid_argument("block_size must be > 0"));
        }
        if !(self.bloom_false_positive_rate > 0.0 && self.bloom_false_positive_rate < 1.0) {
            return Err(SpectreError::invalid_argument(
                "bloom_false_positive_rate must be in (0.0, 1.0)",
            ));
        }
        if self.writer_mailbox_capacity == 0 {
            return Err(SpectreError::invalid_argument(
                "writer_mailbox_capacity must be > 0",
            ));
        }
        if self.query_thread_pool_size == 0 {
            return Err(SpectreError::invalid_argument(
                "query_thread_pool_size must be > 0",
            ));
        }
        Ok(())
    }
}
