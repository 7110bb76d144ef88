//! A single block-structured file: the writer and reader for one
//! hour-bucket's worth of events.
//!
//! Grounded on the teacher's `sstable::SSTable::open()` (mmap-based
//! header/footer validation and staged block loading) for reads, and
//! `wal::Wal::append()` (length-prefixed, checksummed, `sync_all`-backed
//! appends through a single owned `File`) for writes. Unlike the
//! teacher's SSTable, a `BlockStorageFile` is writable again after being
//! finalized — `reopen()` is the state-machine transition the teacher's
//! immutable SSTables never needed.


use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, info, instrument, warn};

use crate::block::{BlockBuilder, BlockMetadata, BlockReader};
use crate::codec::{Codec, CompressionAlgorithm};
use crate::config::StorageConfig;
use crate::encoding::{self, Decode};
use crate::error::SpectreError;
use crate::event::Event;
use crate::file::{FileFooter, FileHeader, FOOTER_SIZE, HEADER_SIZE};
use crate::index::{IndexSection, IndexSectionBuilder, ResourceLastState};

use std::collections::BTreeMap;

/// Lifecycle state of a [`BlockStorageFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Newly created, header written, accepting writes.
    Fresh,
    /// Accepting `write_event` calls.
    Writing,
    /// Index and footer written; read-only until `reopen()`.
    Finalized,
    /// Footer validation failed on open; dead end, preserved for
    /// forensic recovery. No further writes are accepted.
    Incomplete,
}

/// Rolled-up attribute coverage and time range for a file, used by the
/// Hourly Storage Manager's `metadata()` aggregation.
#[derive(Debug, Clone, Default)]
pub struct FileMetadataSummary {
    /// Distinct `kind` values observed.
    pub kinds: Vec<String>,
    /// Distinct `namespace` values observed.
    pub namespaces: Vec<String>,
    /// Distinct `group` values observed.
    pub groups: Vec<String>,
    /// Earliest event timestamp, if any events have been sealed.
    pub earliest_timestamp: Option<u64>,
    /// Latest event timestamp, if any events have been sealed.
    pub latest_timestamp: Option<u64>,
    /// Total sealed event count.
    pub total_events: u64,
}

/// A single on-disk block-structured file.
pub struct BlockStorageFile {
    path: PathBuf,
    file: File,
    state: FileState,
    header: FileHeader,
    codec: Box<dyn Codec>,
    target_block_size: u32,
    reorder_window_ms: u64,
    checksums_enabled: bool,
    bloom_false_positive_rate: f64,
    write_offset: u64,
    next_block_id: u32,
    builder: Option<BlockBuilder>,
    index_builder: IndexSectionBuilder,
}

impl BlockStorageFile {
    /// Opens `path`, creating a fresh file if it does not exist (or is
    /// empty), or loading an existing file's header, footer, and index
    /// otherwise.
    ///
    /// A freshly created file is returned in [`FileState::Writing`],
    /// ready to accept events immediately. An existing, properly
    /// finalized file is returned in [`FileState::Finalized`]; call
    /// [`reopen`](Self::reopen) to resume writing to it.
    #[instrument(skip(config, initial_state), fields(path = %path.as_ref().display()))]
    pub fn open(
        path: impl AsRef<Path>,
        config: &StorageConfig,
        algo: CompressionAlgorithm,
        initial_state: BTreeMap<String, ResourceLastState>,
    ) -> Result<Self, SpectreError> {
        let path = path.as_ref().to_path_buf();
        let exists_nonempty = path
            .metadata()
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        if !exists_nonempty {
            return Self::create_fresh(path, config, algo, initial_state);
        }

        Self::open_existing(path, config, algo)
    }

    fn create_fresh(
        path: PathBuf,
        config: &StorageConfig,
        algo: CompressionAlgorithm,
        initial_state: BTreeMap<String, ResourceLastState>,
    ) -> Result<Self, SpectreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        let header = FileHeader::new(now_ns(), algo, config.block_size);
        let header_bytes = header.to_bytes()?;
        file.write_all(&header_bytes)?;
        file.sync_all()?;

        info!(path = %path.display(), algo = algo.tag(), "storage file created");

        Ok(Self {
            path,
            file,
            state: FileState::Writing,
            header,
            codec: algo.codec(),
            target_block_size: config.block_size,
            reorder_window_ms: config.reorder_window_ms,
            checksums_enabled: config.block_checksums_enabled,
            bloom_false_positive_rate: config.bloom_false_positive_rate,
            write_offset: header_bytes.len() as u64,
            next_block_id: 0,
            builder: Some(BlockBuilder::new(
                0,
                config.block_size,
                config.reorder_window_ms,
                config.block_checksums_enabled,
                config.bloom_false_positive_rate,
            )),
            index_builder: IndexSectionBuilder::with_initial_state(initial_state),
        })
    }

    fn open_existing(path: PathBuf, config: &StorageConfig, algo: CompressionAlgorithm) -> Result<Self, SpectreError> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(SpectreError::Io)?;

        if mmap.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(SpectreError::corrupt_file(&path, "file shorter than header+footer"));
        }

        let header = FileHeader::from_bytes(&mmap[..HEADER_SIZE])
            .map_err(|e| SpectreError::corrupt_file(&path, format!("invalid header: {e}")))?;

        let footer = match FileFooter::from_bytes(&mmap) {
            Ok(footer) => footer,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "footer validation failed, file is incomplete");
                return Err(SpectreError::corrupt_file(&path, format!("invalid footer: {e}")));
            }
        };

        let section = read_index_section(&mmap, &footer, &path)?;

        let next_block_id = section.blocks.last().map(|b| b.id + 1).unwrap_or(0);
        let write_offset = section
            .blocks
            .last()
            .map(|b| b.offset + b.length)
            .unwrap_or(HEADER_SIZE as u64);

        debug!(path = %path.display(), blocks = section.blocks.len(), "storage file opened (finalized)");

        Ok(Self {
            path,
            file,
            state: FileState::Finalized,
            header,
            codec: algo.codec(),
            target_block_size: config.block_size,
            reorder_window_ms: config.reorder_window_ms,
            checksums_enabled: config.block_checksums_enabled,
            bloom_false_positive_rate: config.bloom_false_positive_rate,
            write_offset,
            next_block_id,
            builder: None,
            index_builder: IndexSectionBuilder::resume(section),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FileState {
        self.state
    }

    /// The format version and compression algorithm recorded in the
    /// file's header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Appends `event` to the current block buffer, sealing a block when
    /// the configured threshold is reached.
    #[instrument(skip(self, event), fields(path = %self.path.display()))]
    pub fn write_event(&mut self, event: Event) -> Result<(), SpectreError> {
        if self.state != FileState::Writing && self.state != FileState::Fresh {
            return Err(SpectreError::AlreadyClosed {
                path: self.path.clone(),
            });
        }
        event.validate()?;

        let builder = self
            .builder
            .as_mut()
            .expect("builder present while state is Writing");
        builder.add_event(event)?;

        if builder.should_seal() {
            self.seal_current_block()?;
        }
        Ok(())
    }

    fn seal_current_block(&mut self) -> Result<(), SpectreError> {
        let builder = self.builder.take().expect("seal requires an active builder");
        if builder.is_empty() {
            self.builder = Some(builder);
            return Ok(());
        }
        let events_snapshot = builder.buffered_events().to_vec();
        let offset = self.write_offset;
        let (metadata, frame) = builder.seal(self.codec.as_ref(), offset)?;

        self.file.write_all(&frame)?;
        self.file.sync_all()?;
        self.write_offset += frame.len() as u64;

        debug!(
            path = %self.path.display(),
            block_id = metadata.id,
            events = metadata.event_count,
            "block sealed"
        );

        let sealed_id = metadata.id;
        self.index_builder.record_block(metadata, &events_snapshot);
        self.next_block_id = sealed_id + 1;
        self.builder = Some(BlockBuilder::new(
            self.next_block_id,
            self.target_block_size,
            self.reorder_window_ms,
            self.checksums_enabled,
            self.bloom_false_positive_rate,
        ));
        Ok(())
    }

    /// Seals any tail block, writes the index section and footer, and
    /// flushes. A file that is already finalized rejects a second call.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn finalize(&mut self) -> Result<(), SpectreError> {
        if self.state == FileState::Finalized {
            return Err(SpectreError::AlreadyClosed {
                path: self.path.clone(),
            });
        }
        if self.state == FileState::Incomplete {
            return Err(SpectreError::corrupt_file(&self.path, "cannot finalize an incomplete file"));
        }

        if let Some(builder) = self.builder.take() {
            if !builder.is_empty() {
                self.builder = Some(builder);
                self.seal_current_block()?;
            }
        }

        let index_offset = self.write_offset;
        let section = std::mem::replace(&mut self.index_builder, IndexSectionBuilder::new()).finalize();
        let body = encoding::encode_to_vec(&section).map_err(|e| SpectreError::invalid_argument(e.to_string()))?;
        let checksum = if self.checksums_enabled {
            crc32fast::hash(&body)
        } else {
            0
        };

        self.file.write_all(&(body.len() as u32).to_le_bytes())?;
        self.file.write_all(&body)?;

        let footer = FileFooter::new(index_offset, body.len() as u32, checksum);
        self.file.write_all(&footer.to_bytes()?)?;
        self.file.sync_all()?;

        self.state = FileState::Finalized;
        info!(path = %self.path.display(), events = section.stats.total_events, "storage file finalized");

        // Keep the finalized index resident so reads keep working without
        // a re-open.
        self.index_builder = IndexSectionBuilder::resume(section);
        Ok(())
    }

    /// Transitions a [`FileState::Finalized`] file back to
    /// [`FileState::Writing`] so new blocks may be appended, truncating
    /// the file to the end of the last sealed block (dropping the old
    /// index and footer tail).
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn reopen(&mut self) -> Result<(), SpectreError> {
        if self.state != FileState::Finalized {
            return Err(SpectreError::invalid_argument("reopen requires a finalized file"));
        }
        let truncate_to = self
            .index_builder
            .blocks()
            .last()
            .map(|b| b.offset + b.length)
            .unwrap_or(HEADER_SIZE as u64);

        self.file.set_len(truncate_to)?;
        self.write_offset = truncate_to;
        self.builder = Some(BlockBuilder::new(
            self.next_block_id,
            self.target_block_size,
            self.reorder_window_ms,
            self.checksums_enabled,
            self.bloom_false_positive_rate,
        ));
        self.state = FileState::Writing;
        info!(path = %self.path.display(), "storage file reopened for writing");
        Ok(())
    }

    /// Reads the events of each named block id, in the order given.
    /// Opens an independent read view of the file so this is safe to call
    /// concurrently with other readers.
    pub fn read_blocks(&self, ids: &[u32]) -> Result<Vec<Event>, SpectreError> {
        let file = File::open(&self.path)?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(SpectreError::Io)?;

        let mut events = Vec::new();
        for id in ids {
            let metadata = self
                .index_builder
                .blocks()
                .iter()
                .find(|b| b.id == *id)
                .ok_or_else(|| SpectreError::invalid_argument(format!("unknown block id {id}")))?;
            events.extend(BlockReader::read(&mmap, metadata, self.codec.as_ref(), &self.path)?);
        }
        Ok(events)
    }

    /// The events buffered in the current, not-yet-sealed block, if this
    /// file is in [`FileState::Writing`].
    pub fn buffered_events(&self) -> &[Event] {
        self.builder.as_ref().map(BlockBuilder::buffered_events).unwrap_or(&[])
    }

    /// Metadata for every block sealed so far (read-only; does not
    /// include the in-progress buffer).
    pub fn sealed_blocks(&self) -> &[BlockMetadata] {
        self.index_builder.blocks()
    }

    /// The inverted index built from blocks sealed so far.
    pub fn inverted_index(&self) -> &crate::index::InvertedIndex {
        self.index_builder.inverted_index()
    }

    /// The final-resource-state map as of the last sealed block (or the
    /// carried-forward initial state if no blocks have been sealed yet).
    pub fn final_resource_states(&self) -> &BTreeMap<String, ResourceLastState> {
        self.index_builder.final_resource_states()
    }

    /// Rolled-up attribute coverage and time range, for manager-level
    /// metadata aggregation.
    pub fn metadata_summary(&self) -> FileMetadataSummary {
        let index = self.index_builder.inverted_index();
        let blocks = self.index_builder.blocks();
        FileMetadataSummary {
            kinds: index.kind_to_blocks.keys().cloned().collect(),
            namespaces: index.namespace_to_blocks.keys().cloned().collect(),
            groups: index.group_to_blocks.keys().cloned().collect(),
            earliest_timestamp: blocks.iter().map(|b| b.timestamp_min).min(),
            latest_timestamp: blocks.iter().map(|b| b.timestamp_max).max(),
            total_events: blocks.iter().map(|b| b.event_count as u64).sum(),
        }
    }

    /// The path this file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes aged DELETE snapshots from the current in-memory
    /// final-resource-state map. Only meaningful while the file is
    /// writable; a no-op on a file with no carried-forward state.
    pub fn cleanup_aged_delete_states(&mut self, cutoff_timestamp: u64) -> usize {
        self.index_builder.cleanup_aged_delete_states(cutoff_timestamp)
    }
}

/// Outcome of inspecting an existing file without taking a write lock on
/// it, used by the Hourly Storage Manager's startup discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClassification {
    /// Header and footer both validate; safe to open normally.
    Finalized,
    /// Header is valid but the footer failed validation — a block was
    /// likely being written when the process stopped.
    Incomplete,
    /// The header itself failed validation.
    Corrupted,
}

/// Classifies an existing file by inspecting its header and footer,
/// without opening it for writing. Used at manager startup to decide
/// whether a file is safe to treat as finalized or should be quarantined.
pub fn classify(path: &Path) -> Result<FileClassification, SpectreError> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(SpectreError::Io)?;

    if mmap.len() < HEADER_SIZE {
        return Ok(FileClassification::Corrupted);
    }
    if FileHeader::from_bytes(&mmap[..HEADER_SIZE]).is_err() {
        return Ok(FileClassification::Corrupted);
    }
    if mmap.len() < HEADER_SIZE + FOOTER_SIZE || FileFooter::from_bytes(&mmap).is_err() {
        return Ok(FileClassification::Incomplete);
    }
    Ok(FileClassification::Finalized)
}

fn read_index_section(mmap: &Mmap, footer: &FileFooter, path: &Path) -> Result<IndexSection, SpectreError> {
    let offset = footer.index_offset as usize;
    let prefix_end = offset
        .checked_add(4)
        .ok_or_else(|| SpectreError::corrupt_file(path, "index offset overflow"))?;
    if prefix_end > mmap.len() {
        return Err(SpectreError::corrupt_file(path, "index offset out of bounds"));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&mmap[offset..prefix_end]);
    let body_len = u32::from_le_bytes(len_bytes) as usize;
    if body_len != footer.index_length as usize {
        return Err(SpectreError::corrupt_file(path, "index length mismatch between prefix and footer"));
    }
    let body_end = prefix_end
        .checked_add(body_len)
        .ok_or_else(|| SpectreError::corrupt_file(path, "index length overflow"))?;
    if body_end > mmap.len() {
        return Err(SpectreError::corrupt_file(path, "index body extends past end of file"));
    }
    let body = &mmap[prefix_end..body_end];

    if footer.index_checksum != 0 {
        let actual = crc32fast::hash(body);
        if actual != footer.index_checksum {
            return Err(SpectreError::corrupt_file(path, "index checksum mismatch"));
        }
    }

    let (section, _) = IndexSection::decode_from(body)
        .map_err(|e| SpectreError::corrupt_file(path, format!("malformed index section: {e}")))?;
    Ok(section)
}

fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_nanos() as u64
}
