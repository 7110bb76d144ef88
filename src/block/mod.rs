//! Block builder and reader.
//!
//! A block is a self-contained compressed run of events. Blocks carry
//! their own metadata (time range, counts, attribute sets, Bloom
//! filters) so the query executor can decide to skip a block without
//! ever decompressing it. Grounded on the teacher's `sstable` data-block
//! flush/read loop (`sstable::builder.rs::write_data_blocks`,
//! `sstable::mod.rs::read_block_bytes`), generalized from a single sorted
//! key-value table to a time-ordered run of events with three attribute
//! dimensions instead of one sort key.

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::path::Path;

use crate::bloom::BlockBloom;
use crate::codec::Codec;
use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::error::SpectreError;
use crate::event::Event;

/// Per-block metadata recorded in a file's [`crate::index::IndexSection`].
pub struct BlockMetadata {
    /// Sequential 0-based id within the owning file.
    pub id: u32,
    /// Uncompressed size of the block's serialized events, in bytes.
    pub uncompressed_size: u64,
    /// Compressed size as stored on disk, in bytes.
    pub compressed_size: u64,
    /// Number of events in the block.
    pub event_count: u32,
    /// Minimum event timestamp in the block (closed interval).
    pub timestamp_min: u64,
    /// Maximum event timestamp in the block (closed interval).
    pub timestamp_max: u64,
    /// Deduplicated, sorted set of `kind` values present in the block.
    pub kind_set: Vec<String>,
    /// Deduplicated, sorted set of `namespace` values present in the block.
    pub namespace_set: Vec<String>,
    /// Deduplicated, sorted set of `group` values present in the block.
    pub group_set: Vec<String>,
    /// Bloom filter over `kind` values.
    pub bloom_kind: BlockBloom,
    /// Bloom filter over `namespace` values.
    pub bloom_namespace: BlockBloom,
    /// Bloom filter over `group` values.
    pub bloom_group: BlockBloom,
    /// Byte offset of the compressed frame in the file.
    pub offset: u64,
    /// Byte length of the compressed frame in the file.
    pub length: u64,
    /// CRC32 of the compressed frame, if checksums are enabled.
    pub checksum: Option<u32>,
}

impl Encode for BlockMetadata {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.id.encode_to(buf)?;
        self.uncompressed_size.encode_to(buf)?;
        self.compressed_size.encode_to(buf)?;
        self.event_count.encode_to(buf)?;
        self.timestamp_min.encode_to(buf)?;
        self.timestamp_max.encode_to(buf)?;
        encoding::encode_vec(&self.kind_set, buf)?;
        encoding::encode_vec(&self.namespace_set, buf)?;
        encoding::encode_vec(&self.group_set, buf)?;
        self.bloom_kind.encode_to(buf)?;
        self.bloom_namespace.encode_to(buf)?;
        self.bloom_group.encode_to(buf)?;
        self.offset.encode_to(buf)?;
        self.length.encode_to(buf)?;
        self.checksum.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BlockMetadata {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (id, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (uncompressed_size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (compressed_size, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (event_count, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (timestamp_min, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (timestamp_max, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (kind_set, n) = encoding::decode_vec::<String>(&buf[off..])?;
        off += n;
        let (namespace_set, n) = encoding::decode_vec::<String>(&buf[off..])?;
        off += n;
        let (group_set, n) = encoding::decode_vec::<String>(&buf[off..])?;
        off += n;
        let (bloom_kind, n) = BlockBloom::decode_from(&buf[off..])?;
        off += n;
        let (bloom_namespace, n) = BlockBloom::decode_from(&buf[off..])?;
        off += n;
        let (bloom_group, n) = BlockBloom::decode_from(&buf[off..])?;
        off += n;
        let (offset, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (length, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (checksum, n) = Option::<u32>::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                id,
                uncompressed_size,
                compressed_size,
                event_count,
                timestamp_min,
                timestamp_max,
                kind_set,
                namespace_set,
                group_set,
                bloom_kind,
                bloom_namespace,
                bloom_group,
                offset,
                length,
                checksum,
            },
            off,
        ))
    }
}

/// Accumulates events into a buffer, sealing a [`BlockMetadata`] and a
/// compressed frame once the target uncompressed size is reached.
pub struct BlockBuilder {
    id: u32,
    target_size: u64,
    reorder_window_ms: u64,
    checksums_enabled: bool,
    bloom_false_positive_rate: f64,
    events: Vec<Event>,
    uncompressed_size: u64,
    kinds: BTreeSet<String>,
    namespaces: BTreeSet<String>,
    groups: BTreeSet<String>,
}

impl BlockBuilder {
    /// Creates a new, empty builder for block `id`.
    pub fn new(
        id: u32,
        target_size: u32,
        reorder_window_ms: u64,
        checksums_enabled: bool,
        bloom_false_positive_rate: f64,
    ) -> Self {
        Self {
            id,
            target_size: target_size as u64,
            reorder_window_ms,
            checksums_enabled,
            bloom_false_positive_rate,
            events: Vec::new(),
            uncompressed_size: 0,
            kinds: BTreeSet::new(),
            namespaces: BTreeSet::new(),
            groups: BTreeSet::new(),
        }
    }

    /// Appends an event to the buffer, updating running attribute sets.
    pub fn add_event(&mut self, event: Event) -> Result<(), SpectreError> {
        self.kinds.insert(event.resource.kind.clone());
        self.namespaces.insert(event.resource.namespace.clone());
        self.groups.insert(event.resource.group.clone());
        // Approximate the serialized size up front so `should_seal` is
        // cheap to poll without re-encoding on every event.
        self.uncompressed_size += encoding::encode_to_vec(&event)
            .map(|b| b.len() as u64)
            .unwrap_or(0);
        self.events.push(event);
        Ok(())
    }

    /// `true` once the buffered uncompressed size has reached the target.
    pub fn should_seal(&self) -> bool {
        self.uncompressed_size >= self.target_size
    }

    /// `true` if no events have been buffered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events currently buffered.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Read-only snapshot of the buffered events, in their current
    /// (unsorted) arrival order — used by the query executor to scan the
    /// in-progress block of the current, unfinalized file without
    /// waiting for a seal.
    pub fn buffered_events(&self) -> &[Event] {
        &self.events
    }

    /// Seals the buffer: sorts within the reorder window, compresses, and
    /// produces the [`BlockMetadata`] plus the compressed frame to append
    /// to the file at `offset`.
    ///
    /// Consumes `self`; callers construct a fresh [`BlockBuilder`] for the
    /// next block.
    pub fn seal(mut self, codec: &dyn Codec, offset: u64) -> Result<(BlockMetadata, Vec<u8>), SpectreError> {
        sort_within_reorder_window(&mut self.events, self.reorder_window_ms);

        let mut raw = Vec::with_capacity(self.uncompressed_size as usize);
        let mut bloom_kind = BlockBloom::new(self.kinds.len(), self.bloom_false_positive_rate);
        let mut bloom_namespace = BlockBloom::new(self.namespaces.len(), self.bloom_false_positive_rate);
        let mut bloom_group = BlockBloom::new(self.groups.len(), self.bloom_false_positive_rate);

        let mut timestamp_min = u64::MAX;
        let mut timestamp_max = 0u64;

        for event in &self.events {
            event
                .encode_to(&mut raw)
                .map_err(|e| SpectreError::invalid_argument(format!("failed to encode event: {e}")))?;
            bloom_kind.add(&event.resource.kind);
            bloom_namespace.add(&event.resource.namespace);
            bloom_group.add(&event.resource.group);
            timestamp_min = timestamp_min.min(event.timestamp);
            timestamp_max = timestamp_max.max(event.timestamp);
        }

        if self.events.is_empty() {
            timestamp_min = 0;
            timestamp_max = 0;
        }

        let uncompressed_size = raw.len() as u64;
        let compressed = codec.compress(&raw)?;
        let compressed_size = compressed.len() as u64;
        let checksum = self.checksums_enabled.then(|| crc32fast::hash(&compressed));

        let metadata = BlockMetadata {
            id: self.id,
            uncompressed_size,
            compressed_size,
            event_count: self.events.len() as u32,
            timestamp_min,
            timestamp_max,
            kind_set: self.kinds.into_iter().collect(),
            namespace_set: self.namespaces.into_iter().collect(),
            group_set: self.groups.into_iter().collect(),
            bloom_kind,
            bloom_namespace,
            bloom_group,
            offset,
            length: compressed_size,
            checksum,
        };

        Ok((metadata, compressed))
    }
}

/// Sorts buffered events within contiguous runs whose timestamps fall
/// within `window_ms` of the running maximum. Events separated by a gap
/// larger than the window are left at their arrival-order boundary —
/// only *local* reordering is corrected, matching the spec's "small
/// reorder window" tolerance rather than a full sort.
fn sort_within_reorder_window(events: &mut [Event], window_ms: u64) {
    if events.len() < 2 {
        return;
    }
    let window_ns = window_ms.saturating_mul(1_000_000);
    let mut start = 0usize;
    for i in 1..=events.len() {
        let run_closed = i == events.len() || {
            let run_max = events[start..i].iter().map(|e| e.timestamp).max().unwrap_or(0);
            events[i].timestamp.saturating_sub(run_max) > window_ns
        };
        if run_closed {
            events[start..i].sort_by_key(|e| e.timestamp);
            start = i;
        }
    }
}

/// Reads events back out of a sealed block.
pub struct BlockReader;

impl BlockReader {
    /// Reads and decompresses the block described by `metadata` out of
    /// `file_bytes`, validating the checksum if present.
    ///
    /// `path` is used only to attribute errors to the owning file.
    pub fn read(
        file_bytes: &[u8],
        metadata: &BlockMetadata,
        codec: &dyn Codec,
        path: &Path,
    ) -> Result<Vec<Event>, SpectreError> {
        let start = metadata.offset as usize;
        let end = start
            .checked_add(metadata.length as usize)
            .ok_or_else(|| SpectreError::corrupt_block(path, metadata.id, "offset+length overflow"))?;
        if end > file_bytes.len() {
            return Err(SpectreError::corrupt_block(
                path,
                metadata.id,
                "block extends past end of file",
            ));
        }
        let frame = &file_bytes[start..end];

        if let Some(expected) = metadata.checksum {
            let actual = crc32fast::hash(frame);
            if actual != expected {
                return Err(SpectreError::corrupt_block(
                    path,
                    metadata.id,
                    format!("checksum mismatch: expected {expected:08x}, got {actual:08x}"),
                ));
            }
        }

        let raw = codec
            .decompress(frame)
            .map_err(|e| SpectreError::corrupt_block(path, metadata.id, format!("decompression failed: {e}")))?;

        let mut events = Vec::with_capacity(metadata.event_count as usize);
        let mut off = 0usize;
        while off < raw.len() {
            let (event, consumed) = Event::decode_from(&raw[off..])
                .map_err(|e| SpectreError::corrupt_block(path, metadata.id, format!("malformed event: {e}")))?;
            events.push(event);
            off += consumed;
        }
        Ok(events)
    }
}
