//! Block payload compression.
//!
//! Compression is block-independent: each block carries its own complete
//! compressed frame, with zero cross-block dictionary state, so random
//! block access never requires decompressing anything but the target
//! block. A single algorithm is selected per file and stored in the file
//! header's `algo_tag`; readers reject files whose tag is unknown.

#[cfg(test)]
mod tests;

use crate::error::SpectreError;

/// The compression algorithm applied to every block in a file.
///
/// Two concrete members, matching the two named in the storage
/// configuration: a zstd-equivalent (default, `zstd` crate) and a
/// gzip-equivalent (`flate2` crate, zlib/deflate backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// zstd-equivalent compression (default).
    ZstdEquivalent,
    /// gzip-equivalent compression.
    GzipEquivalent,
}

impl CompressionAlgorithm {
    /// Fixed-width ASCII tag stored in the file header's `algo_tag` field.
    pub fn tag(self) -> &'static str {
        match self {
            Self::ZstdEquivalent => "zstd",
            Self::GzipEquivalent => "gzip",
        }
    }

    /// Parses a tag read back from a file header.
    ///
    /// Readers reject files whose tag is unknown by surfacing
    /// `SpectreError::UnsupportedVersion` would be wrong here — an
    /// unrecognised algorithm tag is a corrupt/foreign file, not a version
    /// mismatch, so it is reported as `CorruptFile` by the caller that
    /// knows the file path.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "zstd" => Some(Self::ZstdEquivalent),
            "gzip" => Some(Self::GzipEquivalent),
            _ => None,
        }
    }

    /// Returns the [`Codec`] implementing this algorithm.
    pub fn codec(self) -> Box<dyn Codec> {
        match self {
            Self::ZstdEquivalent => Box::new(ZstdCodec::default()),
            Self::GzipEquivalent => Box::new(GzipCodec::default()),
        }
    }
}

/// Compress/decompress a single block payload.
///
/// Implementations must be deterministic on `compress` (same input bytes
/// always produce the same output bytes) and must treat empty input as a
/// legal, round-trippable special case.
pub trait Codec: Send + Sync {
    /// Compresses `bytes` into a self-contained frame.
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, SpectreError>;

    /// Decompresses a frame produced by `compress`.
    ///
    /// Returns `SpectreError::CorruptBlock`-shaped context is the caller's
    /// job (this layer has no block id or file path); implementations
    /// return a plain `SpectreError::Io`/`InvalidArgument` style failure
    /// on a malformed frame, which `block::BlockReader` wraps with block
    /// identity before returning it to callers.
    fn decompress(&self, frame: &[u8]) -> Result<Vec<u8>, SpectreError>;

    /// The algorithm this codec implements, for header/tag bookkeeping.
    fn algorithm(&self) -> CompressionAlgorithm;
}

/// zstd-equivalent codec, backed by the `zstd` crate.
pub struct ZstdCodec {
    level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        // Level 3 is zstd's own default: a good speed/ratio tradeoff for
        // small, frequently-read blocks.
        Self { level: 3 }
    }
}

impl Codec for ZstdCodec {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, SpectreError> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        zstd::encode_all(bytes, self.level).map_err(SpectreError::Io)
    }

    fn decompress(&self, frame: &[u8]) -> Result<Vec<u8>, SpectreError> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        zstd::decode_all(frame).map_err(SpectreError::Io)
    }

    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::ZstdEquivalent
    }
}

/// gzip-equivalent codec, backed by the `flate2` crate's zlib encoder.
pub struct GzipCodec {
    level: flate2::Compression,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }
}

impl Codec for GzipCodec {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, SpectreError> {
        use std::io::Write;

        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), self.level);
        encoder.write_all(bytes)?;
        encoder.finish().map_err(SpectreError::Io)
    }

    fn decompress(&self, frame: &[u8]) -> Result<Vec<u8>, SpectreError> {
        use std::io::Read;

        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let mut decoder = flate2::read::GzDecoder::new(frame);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::GzipEquivalent
    }
}
