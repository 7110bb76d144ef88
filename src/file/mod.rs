//! Bit-exact on-disk file header and footer.
//!
//! Grounded on the teacher's `sstable::SSTableHeader`/`SSTableFooter`
//! (fixed-size structures with a magic number, version, and embedded
//! CRC32) and `wal::WalHeader`'s fixed-ASCII-field approach, generalized
//! to the larger header this format carries (codec tag, block-size
//! target, encoding identifier) and a footer pointing at a trailing
//! index section instead of a metaindex/index block pair.

use crate::codec::CompressionAlgorithm;
use crate::encoding::{Decode, Encode, EncodingError};
use crate::error::SpectreError;

/// Header magic: `"RPKBLOCK"`.
pub const MAGIC_HEADER: [u8; 8] = *b"RPKBLOCK";
/// Footer magic: `"RPKEND"`, padded to 8 bytes.
pub const MAGIC_FOOTER: [u8; 8] = *b"RPKEND\0\0";
/// Identifies the hand-rolled wire format used for block and index
/// contents (see [`crate::encoding`]).
const ENCODING_TAG: [u8; 8] = *b"SPECTRE1";

/// Total on-disk size of [`FileHeader`], in bytes.
pub const HEADER_SIZE: usize = 77;
/// Total on-disk size of [`FileFooter`], in bytes.
///
/// The field list (`index_offset: 8`, `index_length: 4`, `checksum:
/// 256`, `reserved: 16`, `magic: 8`) sums to 292; that per-field
/// accounting is authoritative over any rounder figure quoted in prose.
pub const FOOTER_SIZE: usize = 292;

/// Major format version this build reads and writes.
pub const CURRENT_MAJOR: u32 = 1;
/// Minor format version this build writes.
pub const CURRENT_MINOR: u32 = 0;

fn ascii_field<const N: usize>(value: &str) -> Result<[u8; N], SpectreError> {
    if value.len() > N {
        return Err(SpectreError::invalid_argument(format!(
            "ascii field '{value}' exceeds {N} bytes"
        )));
    }
    let mut field = [0u8; N];
    field[..value.len()].copy_from_slice(value.as_bytes());
    Ok(field)
}

fn ascii_field_to_string<const N: usize>(field: &[u8; N]) -> Result<String, SpectreError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(N);
    String::from_utf8(field[..end].to_vec())
        .map_err(|e| SpectreError::invalid_argument(format!("ascii field is not valid utf-8: {e}")))
}

/// A two-part `major.minor` format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatVersion {
    /// Incompatible-change version. Readers reject a file whose major
    /// version differs from any they support.
    pub major: u32,
    /// Compatible-evolution version: new optional fields, new bloom
    /// parameters, etc. may appear within a minor bump.
    pub minor: u32,
}

impl FormatVersion {
    /// The version this build stamps into newly-created files.
    pub const CURRENT: FormatVersion = FormatVersion {
        major: CURRENT_MAJOR,
        minor: CURRENT_MINOR,
    };

    /// Parses a `"major.minor"` string, e.g. `"1.0"`.
    pub fn parse(text: &str) -> Result<Self, SpectreError> {
        let (major, minor) = text
            .split_once('.')
            .ok_or_else(|| SpectreError::invalid_argument(format!("malformed format version: {text}")))?;
        let major = major
            .parse::<u32>()
            .map_err(|_| SpectreError::invalid_argument(format!("malformed major version: {major}")))?;
        let minor = minor
            .parse::<u32>()
            .map_err(|_| SpectreError::invalid_argument(format!("malformed minor version: {minor}")))?;
        Ok(Self { major, minor })
    }

    /// `true` if a reader supporting major version `supported_major` can
    /// open a file at this version. Only the major component gates
    /// compatibility; minor bumps must be additive and backwards-read.
    pub fn is_compatible_with(&self, supported_major: u32) -> bool {
        self.major == supported_major
    }

    fn to_ascii_field(self) -> Result<[u8; 8], SpectreError> {
        ascii_field(&format!("{}.{}", self.major, self.minor))
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Fixed-size header written once, immediately on file creation.
#[derive(Debug, Clone)]
pub struct FileHeader {
    magic: [u8; 8],
    version: FormatVersion,
    /// Nanoseconds since epoch at file creation.
    pub created_at: u64,
    algo: CompressionAlgorithm,
    /// Target uncompressed size of a block, in bytes.
    pub block_size: u32,
}

impl FileHeader {
    /// Builds a new header stamped with the current format version and
    /// encoding tag.
    pub fn new(created_at: u64, algo: CompressionAlgorithm, block_size: u32) -> Self {
        Self {
            magic: MAGIC_HEADER,
            version: FormatVersion::CURRENT,
            created_at,
            algo,
            block_size,
        }
    }

    /// The format version recorded in this header.
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// The compression algorithm this file's blocks are encoded with.
    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algo
    }

    /// Validates the magic and version fields, rejecting unknown or
    /// incompatible files.
    pub fn validate(&self) -> Result<(), SpectreError> {
        if self.magic != MAGIC_HEADER {
            return Err(SpectreError::invalid_argument("invalid file header magic"));
        }
        if !self.version.is_compatible_with(CURRENT_MAJOR) {
            return Err(SpectreError::invalid_argument(format!(
                "unsupported format version {} (supported major: {CURRENT_MAJOR})",
                self.version
            )));
        }
        Ok(())
    }

    /// Serializes the header to exactly [`HEADER_SIZE`] bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SpectreError> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        encode_fixed(&self.magic, &mut buf)?;
        encode_fixed(&self.version.to_ascii_field()?, &mut buf)?;
        encode_fixed(&self.created_at, &mut buf)?;
        encode_fixed(&ascii_field::<8>(self.algo.tag())?, &mut buf)?;
        encode_fixed(&self.block_size, &mut buf)?;
        encode_fixed(&ENCODING_TAG, &mut buf)?;
        let reserved = [0u8; 33];
        encode_fixed(&reserved, &mut buf)?;
        debug_assert_eq!(buf.len(), HEADER_SIZE);
        Ok(buf)
    }

    /// Parses a header from the first [`HEADER_SIZE`] bytes of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, SpectreError> {
        if buf.len() < HEADER_SIZE {
            return Err(SpectreError::invalid_argument("buffer too short for file header"));
        }
        let mut off = 0;
        let (magic, n) = <[u8; 8]>::decode_from(&buf[off..]).map_err(encoding_err)?;
        off += n;
        let (version_field, n) = <[u8; 8]>::decode_from(&buf[off..]).map_err(encoding_err)?;
        off += n;
        let version = FormatVersion::parse(&ascii_field_to_string(&version_field)?)?;
        let (created_at, n) = u64::decode_from(&buf[off..]).map_err(encoding_err)?;
        off += n;
        let (algo_field, n) = <[u8; 8]>::decode_from(&buf[off..]).map_err(encoding_err)?;
        off += n;
        let algo_tag = ascii_field_to_string(&algo_field)?;
        let algo = CompressionAlgorithm::from_tag(&algo_tag)
            .ok_or_else(|| SpectreError::invalid_argument(format!("unknown algorithm tag: {algo_tag}")))?;
        let (block_size, n) = u32::decode_from(&buf[off..]).map_err(encoding_err)?;
        off += n;
        // encoding tag and reserved padding are validated for length only;
        // unknown future values inside a compatible minor version are
        // accepted without interpretation.
        let _ = &buf[off..HEADER_SIZE];

        let header = Self {
            magic,
            version,
            created_at,
            algo,
            block_size,
        };
        header.validate()?;
        Ok(header)
    }
}

/// Fixed-size footer written once, at the tail of a finalized file.
#[derive(Debug, Clone)]
pub struct FileFooter {
    /// Byte offset of the index section within the file.
    pub index_offset: u64,
    /// Byte length of the index section.
    pub index_length: u32,
    /// CRC32 of the index section, zero if checksums are disabled.
    pub index_checksum: u32,
    magic: [u8; 8],
}

impl FileFooter {
    /// Builds a new footer. `index_checksum` should be `0` when checksums
    /// are disabled — the spec's "zero-filled if disabled" rule doubles
    /// as the enabled/disabled signal, since a CRC32 of genuine content
    /// is a zero value with negligible probability.
    pub fn new(index_offset: u64, index_length: u32, index_checksum: u32) -> Self {
        Self {
            index_offset,
            index_length,
            index_checksum,
            magic: MAGIC_FOOTER,
        }
    }

    /// Validates the footer magic.
    pub fn validate(&self) -> Result<(), SpectreError> {
        if self.magic != MAGIC_FOOTER {
            return Err(SpectreError::invalid_argument("invalid file footer magic"));
        }
        Ok(())
    }

    /// Serializes the footer to exactly [`FOOTER_SIZE`] bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SpectreError> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        encode_fixed(&self.index_offset, &mut buf)?;
        encode_fixed(&self.index_length, &mut buf)?;
        let mut checksum_field = [0u8; 256];
        checksum_field[..4].copy_from_slice(&self.index_checksum.to_le_bytes());
        encode_fixed(&checksum_field, &mut buf)?;
        let reserved = [0u8; 16];
        encode_fixed(&reserved, &mut buf)?;
        encode_fixed(&self.magic, &mut buf)?;
        debug_assert_eq!(buf.len(), FOOTER_SIZE);
        Ok(buf)
    }

    /// Parses a footer from the final [`FOOTER_SIZE`] bytes of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, SpectreError> {
        if buf.len() < FOOTER_SIZE {
            return Err(SpectreError::invalid_argument("buffer too short for file footer"));
        }
        let tail = &buf[buf.len() - FOOTER_SIZE..];
        let mut off = 0;
        let (index_offset, n) = u64::decode_from(&tail[off..]).map_err(encoding_err)?;
        off += n;
        let (index_length, n) = u32::decode_from(&tail[off..]).map_err(encoding_err)?;
        off += n;
        let (checksum_field, n) = <[u8; 256]>::decode_from(&tail[off..]).map_err(encoding_err)?;
        off += n;
        let mut checksum_bytes = [0u8; 4];
        checksum_bytes.copy_from_slice(&checksum_field[..4]);
        let index_checksum = u32::from_le_bytes(checksum_bytes);
        let (_reserved, n) = <[u8; 16]>::decode_from(&tail[off..]).map_err(encoding_err)?;
        off += n;
        let (magic, n) = <[u8; 8]>::decode_from(&tail[off..]).map_err(encoding_err)?;
        off += n;

        let footer = Self {
            index_offset,
            index_length,
            index_checksum,
            magic,
        };
        footer.validate()?;
        Ok(footer)
    }
}

fn encode_fixed<T: Encode>(value: &T, buf: &mut Vec<u8>) -> Result<(), SpectreError> {
    value.encode_to(buf).map_err(|e| SpectreError::invalid_argument(e.to_string()))
}

fn encoding_err(e: EncodingError) -> SpectreError {
    SpectreError::invalid_argument(e.to_string())
}
