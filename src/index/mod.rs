//! Per-file inverted indexes, final-resource-state snapshots, and the
//! [`IndexSection`] that bundles them with block metadata.
//!
//! Grounded on the teacher's `sstable::SSTableIndexEntry`/`MetaIndexEntry`
//! (per-block/per-section metadata bookkeeping) and `manifest::mod.rs`'s
//! checkpoint-on-rotation pattern (the carry-forward of final-resource
//! state across files mirrors the manifest's durable-snapshot model, one
//! level up).

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use crate::block::BlockMetadata;
use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::event::{Event, EventType};

/// Sequential 0-based block id within a file.
pub type BlockId = u32;

/// Per-file mapping from attribute value to the ascending, deduplicated
/// list of block ids that may contain it.
///
/// Block-id lists only include blocks whose Bloom filter would also
/// admit the key — true by construction here, since both the list and
/// the per-block Bloom filter are derived from the same observed
/// attribute sets at block-seal time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvertedIndex {
    /// `kind` value → candidate block ids.
    pub kind_to_blocks: BTreeMap<String, Vec<BlockId>>,
    /// `namespace` value → candidate block ids.
    pub namespace_to_blocks: BTreeMap<String, Vec<BlockId>>,
    /// `group` value → candidate block ids.
    pub group_to_blocks: BTreeMap<String, Vec<BlockId>>,
}

impl InvertedIndex {
    fn record(map: &mut BTreeMap<String, Vec<BlockId>>, value: &str, block_id: BlockId) {
        let entry = map.entry(value.to_string()).or_default();
        if entry.last() != Some(&block_id) {
            entry.push(block_id);
        }
    }

    /// Registers that block `block_id` contains events for each attribute
    /// value declared in the block's (already deduplicated) attribute
    /// sets.
    pub fn record_block(&mut self, metadata: &BlockMetadata) {
        for kind in &metadata.kind_set {
            Self::record(&mut self.kind_to_blocks, kind, metadata.id);
        }
        for namespace in &metadata.namespace_set {
            Self::record(&mut self.namespace_to_blocks, namespace, metadata.id);
        }
        for group in &metadata.group_set {
            Self::record(&mut self.group_to_blocks, group, metadata.id);
        }
    }

    /// Looks up candidate block ids for `kind`, if any.
    pub fn blocks_for_kind(&self, kind: &str) -> Option<&[BlockId]> {
        self.kind_to_blocks.get(kind).map(Vec::as_slice)
    }

    /// Looks up candidate block ids for `namespace`, if any.
    pub fn blocks_for_namespace(&self, namespace: &str) -> Option<&[BlockId]> {
        self.namespace_to_blocks.get(namespace).map(Vec::as_slice)
    }

    /// Looks up candidate block ids for `group`, if any.
    pub fn blocks_for_group(&self, group: &str) -> Option<&[BlockId]> {
        self.group_to_blocks.get(group).map(Vec::as_slice)
    }
}

fn encode_string_map(map: &BTreeMap<String, Vec<BlockId>>, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
    encoding::Encode::encode_to(&(map.len() as u32), buf)?;
    for (key, ids) in map {
        key.encode_to(buf)?;
        encoding::encode_vec(ids, buf)?;
    }
    Ok(())
}

fn decode_string_map(buf: &[u8]) -> Result<(BTreeMap<String, Vec<BlockId>>, usize), EncodingError> {
    let mut off = 0;
    let (count, n) = u32::decode_from(&buf[off..])?;
    off += n;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let (key, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (ids, n) = encoding::decode_vec::<BlockId>(&buf[off..])?;
        off += n;
        map.insert(key, ids);
    }
    Ok((map, off))
}

impl Encode for InvertedIndex {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encode_string_map(&self.kind_to_blocks, buf)?;
        encode_string_map(&self.namespace_to_blocks, buf)?;
        encode_string_map(&self.group_to_blocks, buf)?;
        Ok(())
    }
}

impl Decode for InvertedIndex {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (kind_to_blocks, n) = decode_string_map(&buf[off..])?;
        off += n;
        let (namespace_to_blocks, n) = decode_string_map(&buf[off..])?;
        off += n;
        let (group_to_blocks, n) = decode_string_map(&buf[off..])?;
        off += n;
        Ok((
            Self {
                kind_to_blocks,
                namespace_to_blocks,
                group_to_blocks,
            },
            off,
        ))
    }
}

/// Carry-forward snapshot of a resource's latest known state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLastState {
    /// Kubernetes UID of the resource at this snapshot.
    pub uid: String,
    /// The type of the latest event observed for this resource.
    pub event_type: EventType,
    /// Timestamp of the latest event observed for this resource.
    pub timestamp: u64,
    /// Opaque payload of the latest event (empty for DELETE).
    pub resource_data: Vec<u8>,
}

impl Encode for ResourceLastState {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.uid.encode_to(buf)?;
        self.event_type.encode_to(buf)?;
        self.timestamp.encode_to(buf)?;
        self.resource_data.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for ResourceLastState {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (uid, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (event_type, n) = EventType::decode_from(&buf[off..])?;
        off += n;
        let (timestamp, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (resource_data, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                uid,
                event_type,
                timestamp,
                resource_data,
            },
            off,
        ))
    }
}

/// Aggregate counters carried alongside a file's index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStatistics {
    /// Total number of events across all blocks in the file.
    pub total_events: u64,
}

impl Encode for IndexStatistics {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.total_events.encode_to(buf)
    }
}

impl Decode for IndexStatistics {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (total_events, n) = u64::decode_from(buf)?;
        Ok((Self { total_events }, n))
    }
}

/// The full per-file index: block metadata, inverted indexes, the
/// final-resource-state map, and aggregate statistics.
pub struct IndexSection {
    /// Block metadata, ordered by `id`.
    pub blocks: Vec<BlockMetadata>,
    /// Attribute → candidate-block-ids mapping.
    pub inverted_index: InvertedIndex,
    /// Resource key → latest known state, as of the end of this file.
    pub final_resource_states: BTreeMap<String, ResourceLastState>,
    /// Aggregate statistics.
    pub stats: IndexStatistics,
}

impl Encode for IndexSection {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::encode_vec(&self.blocks, buf)?;
        self.inverted_index.encode_to(buf)?;
        encoding::Encode::encode_to(&(self.final_resource_states.len() as u32), buf)?;
        for (key, state) in &self.final_resource_states {
            key.encode_to(buf)?;
            state.encode_to(buf)?;
        }
        self.stats.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for IndexSection {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (blocks, n) = encoding::decode_vec::<BlockMetadata>(&buf[off..])?;
        off += n;
        let (inverted_index, n) = InvertedIndex::decode_from(&buf[off..])?;
        off += n;
        let (count, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let mut final_resource_states = BTreeMap::new();
        for _ in 0..count {
            let (key, n) = String::decode_from(&buf[off..])?;
            off += n;
            let (state, n) = ResourceLastState::decode_from(&buf[off..])?;
            off += n;
            final_resource_states.insert(key, state);
        }
        let (stats, n) = IndexStatistics::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                blocks,
                inverted_index,
                final_resource_states,
                stats,
            },
            off,
        ))
    }
}

/// Builds an [`IndexSection`] incrementally as blocks are sealed.
pub struct IndexSectionBuilder {
    blocks: Vec<BlockMetadata>,
    inverted_index: InvertedIndex,
    final_resource_states: BTreeMap<String, ResourceLastState>,
    total_events: u64,
}

impl IndexSectionBuilder {
    /// Creates a builder with no carried-forward state (the first file in
    /// a storage directory).
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            inverted_index: InvertedIndex::default(),
            final_resource_states: BTreeMap::new(),
            total_events: 0,
        }
    }

    /// Creates a builder pre-populated with carried-forward final-resource
    /// states from the prior hour file, per §4.4's rotation rule.
    pub fn with_initial_state(initial: BTreeMap<String, ResourceLastState>) -> Self {
        Self {
            blocks: Vec::new(),
            inverted_index: InvertedIndex::default(),
            final_resource_states: initial,
            total_events: 0,
        }
    }

    /// Records a newly-sealed block's metadata and the events it
    /// contains, updating the inverted index and final-resource-state
    /// map.
    pub fn record_block(&mut self, metadata: BlockMetadata, events: &[Event]) {
        self.inverted_index.record_block(&metadata);
        self.total_events += metadata.event_count as u64;

        for event in events {
            let key = event.resource.key();
            let should_update = self
                .final_resource_states
                .get(&key)
                .map(|existing| event.timestamp >= existing.timestamp)
                .unwrap_or(true);
            if should_update {
                self.final_resource_states.insert(
                    key,
                    ResourceLastState {
                        uid: event.resource.uid.clone(),
                        event_type: event.event_type,
                        timestamp: event.timestamp,
                        resource_data: event.data.clone(),
                    },
                );
            }
        }

        self.blocks.push(metadata);
    }

    /// The current final-resource-state map, for carrying forward into
    /// the next file at rotation time.
    pub fn final_resource_states(&self) -> &BTreeMap<String, ResourceLastState> {
        &self.final_resource_states
    }

    /// Block metadata recorded so far, ordered by id.
    pub fn blocks(&self) -> &[BlockMetadata] {
        &self.blocks
    }

    /// The inverted index built so far.
    pub fn inverted_index(&self) -> &InvertedIndex {
        &self.inverted_index
    }

    /// Removes aged DELETE snapshots from the in-progress final-state map
    /// (see [`cleanup_aged_delete_states`]).
    pub fn cleanup_aged_delete_states(&mut self, cutoff_timestamp: u64) -> usize {
        cleanup_aged_delete_states(&mut self.final_resource_states, cutoff_timestamp)
    }

    /// Resumes a builder from a previously finalized file's index, so a
    /// reopened file can continue recording newly-sealed blocks on top of
    /// the existing state.
    pub fn resume(section: IndexSection) -> Self {
        Self {
            blocks: section.blocks,
            inverted_index: section.inverted_index,
            final_resource_states: section.final_resource_states,
            total_events: section.stats.total_events,
        }
    }

    /// Consumes the builder, producing the finished [`IndexSection`].
    pub fn finalize(self) -> IndexSection {
        IndexSection {
            blocks: self.blocks,
            inverted_index: self.inverted_index,
            final_resource_states: self.final_resource_states,
            stats: IndexStatistics {
                total_events: self.total_events,
            },
        }
    }
}

impl Default for IndexSectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes DELETE final-state snapshots older than `cutoff_timestamp`,
/// matching §4.7's cleanup hook. Live (non-DELETE) snapshots are never
/// removed by this pass.
pub fn cleanup_aged_delete_states(
    states: &mut BTreeMap<String, ResourceLastState>,
    cutoff_timestamp: u64,
) -> usize {
    let before = states.len();
    states.retain(|_, state| !(state.event_type == EventType::Delete && state.timestamp < cutoff_timestamp));
    before - states.len()
}
