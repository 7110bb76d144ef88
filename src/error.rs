//! Unified error taxonomy for the storage engine and query executor.
//!
//! `SpectreError` is the single error currency for every fallible public
//! operation — the seven semantic kinds enumerated by the storage design,
//! each carrying the context needed to both log and answer programmatically.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the storage engine and query executor.
#[derive(Debug, Error)]
pub enum SpectreError {
    /// Malformed query, out-of-order or negative time range, bad cursor.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted on a file that has already been finalized.
    #[error("file already closed: {path}")]
    AlreadyClosed {
        /// Path of the finalized file.
        path: PathBuf,
    },

    /// Transient or permanent underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block failed its checksum or failed to decompress; isolated to
    /// that block, other blocks in the same file remain usable.
    #[error("corrupt block {block_id} in {path}: {reason}")]
    CorruptBlock {
        /// Path of the file containing the corrupt block.
        path: PathBuf,
        /// Id of the corrupt block.
        block_id: u32,
        /// Human-readable cause.
        reason: String,
    },

    /// Header invalid, footer invalid, or index unparseable; the whole
    /// file is quarantined.
    #[error("corrupt file {path}: {reason}")]
    CorruptFile {
        /// Path of the corrupt file.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// File-format major version is not supported by this build.
    #[error("unsupported format version {found} in {path} (supported major: {supported_major})")]
    UnsupportedVersion {
        /// Path of the file with the unsupported version.
        path: PathBuf,
        /// The version string found in the file header.
        found: String,
        /// The major version this build supports.
        supported_major: u32,
    },

    /// The writer mailbox is full; the caller must retry or accept
    /// back-pressure (never silently dropped).
    #[error("writer mailbox capacity exceeded (capacity: {capacity})")]
    CapacityExceeded {
        /// Configured mailbox capacity.
        capacity: usize,
    },
}

impl SpectreError {
    /// Convenience constructor for [`SpectreError::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Convenience constructor for [`SpectreError::CorruptFile`].
    pub fn corrupt_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`SpectreError::CorruptBlock`].
    pub fn corrupt_block(path: impl Into<PathBuf>, block_id: u32, reason: impl Into<String>) -> Self {
        Self::CorruptBlock {
            path: path.into(),
            block_id,
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error represents a per-block or per-file
    /// condition the query path can recover from by skipping the offending
    /// unit and continuing over the rest.
    pub fn is_recoverable_in_query(&self) -> bool {
        matches!(
            self,
            Self::CorruptBlock { .. } | Self::CorruptFile { .. } | Self::UnsupportedVersion { .. }
        )
    }
}
