//! Query planning and execution over one or more hour-bucket files.
//!
//! Grounded on the teacher's `engine::Engine::scan()` (merge across
//! memtable + SSTable sources) and `sstable::mod.rs`'s bloom-then-index
//! narrowing before any block is actually read. The combination here —
//! per-dimension inverted-index intersection, a Bloom consistency
//! double-check, then a worker-pool block scan — has no single teacher
//! analogue, so it is built from those two ingredients directly.


use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{instrument, warn};

use crate::block::BlockMetadata;
use crate::error::SpectreError;
use crate::event::{Event, EventType, Resource};
use crate::index::{InvertedIndex, ResourceLastState};
use crate::manager::HourlyStorageManager;
use crate::storage::BlockStorageFile;

/// A query over the event store.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Inclusive start of the time range, nanoseconds since epoch.
    pub start_timestamp: u64,
    /// Inclusive end of the time range, nanoseconds since epoch.
    pub end_timestamp: u64,
    /// Restrict to this resource kind, if set.
    pub kind: Option<String>,
    /// Restrict to this namespace, if set.
    pub namespace: Option<String>,
    /// Restrict to this API group, if set.
    pub group: Option<String>,
    /// Restrict to this resource name, if set.
    pub name: Option<String>,
    /// Restrict to this resource UID, if set.
    pub uid: Option<String>,
    /// Maximum number of events to return.
    pub page_size: Option<usize>,
    /// Opaque continuation token from a previous [`QueryResult`].
    pub cursor: Option<String>,
}

impl Query {
    fn validate(&self) -> Result<(), SpectreError> {
        if self.start_timestamp > self.end_timestamp {
            return Err(SpectreError::invalid_argument(
                "start_timestamp must be <= end_timestamp",
            ));
        }
        if let Some(0) = self.page_size {
            return Err(SpectreError::invalid_argument("page_size must be > 0"));
        }
        Ok(())
    }

    fn matches_attributes(&self, resource: &Resource) -> bool {
        if let Some(kind) = &self.kind {
            if &resource.kind != kind {
                return false;
            }
        }
        if let Some(namespace) = &self.namespace {
            if &resource.namespace != namespace {
                return false;
            }
        }
        if let Some(group) = &self.group {
            if &resource.group != group {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &resource.name != name {
                return false;
            }
        }
        if let Some(uid) = &self.uid {
            if &resource.uid != uid {
                return false;
            }
        }
        true
    }
}

/// Execution statistics returned alongside a [`QueryResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryStats {
    /// Number of files opened (finalized or current) during execution.
    pub files_searched: u32,
    /// Number of blocks actually decompressed.
    pub blocks_scanned: u32,
    /// Number of blocks skipped without decompression by index/Bloom
    /// planning.
    pub blocks_skipped: u32,
    /// Wall-clock execution time, in milliseconds.
    pub execution_time_ms: u64,
}

/// The result of [`QueryExecutor::execute`].
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Matching events, in ascending timestamp order (ties broken by
    /// resource key then event id).
    pub events: Vec<Event>,
    /// Execution statistics.
    pub stats: QueryStats,
    /// Opaque cursor for the next page, if more results remain.
    pub next_cursor: Option<String>,
}

/// Plans and executes [`Query`]s against a [`HourlyStorageManager`].
pub struct QueryExecutor<'a> {
    manager: &'a HourlyStorageManager,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor bound to `manager`.
    pub fn new(manager: &'a HourlyStorageManager) -> Self {
        Self { manager }
    }

    /// Runs `query` to completion: file selection, per-file index
    /// planning, block scan, carry-forward state augmentation, merge,
    /// and pagination.
    #[instrument(skip(self, query))]
    pub fn execute(&self, query: Query) -> Result<QueryResult, SpectreError> {
        let started = Instant::now();
        query.validate()?;
        let cursor = match &query.cursor {
            Some(token) => Some(decode_cursor(token)?),
            None => None,
        };

        let mut events: Vec<Event> = Vec::new();
        let mut stats = QueryStats::default();
        let mut carried_state: BTreeMap<String, ResourceLastState> = BTreeMap::new();
        let pool_size = self.manager.query_thread_pool_size()?.max(1);

        // Step 1: file selection (historical finalized files overlapping
        // the range).
        let historical_paths = self
            .manager
            .historical_files_overlapping(query.start_timestamp, query.end_timestamp)?;

        for path in historical_paths {
            match self.manager.open_historical_file(&path) {
                Ok(file) => {
                    stats.files_searched += 1;
                    scan_file(&file, &query, &mut events, &mut stats, pool_size)?;
                    merge_carried_state(&mut carried_state, file.final_resource_states());
                }
                Err(e) if e.is_recoverable_in_query() => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file during query");
                }
                Err(e) => return Err(e),
            }
        }

        // Current (unfinalized) file: scanned in-place under a single
        // read lock, including its buffered (not-yet-sealed) events.
        self.manager.with_current_file(|current| -> Result<(), SpectreError> {
            if let Some(file) = current {
                stats.files_searched += 1;
                scan_file(file, &query, &mut events, &mut stats, pool_size)?;
                for event in file.buffered_events() {
                    if within_range(&query, event.timestamp) && query.matches_attributes(&event.resource) {
                        events.push(event.clone());
                    }
                }
                merge_carried_state(&mut carried_state, file.final_resource_states());
            }
            Ok(())
        })??;

        // Step 4: carry-forward state augmentation.
        let present_keys: std::collections::HashSet<String> =
            events.iter().map(|e| e.resource.key()).collect();
        for (key, state) in &carried_state {
            if present_keys.contains(key) {
                continue;
            }
            if state.event_type == EventType::Delete {
                continue;
            }
            // Deliberately not `within_range`: a carried snapshot predating
            // `start_timestamp` is exactly the "unchanged since before the
            // window" case this step exists for. Only a state updated after
            // `end_timestamp` is excluded.
            if state.timestamp > query.end_timestamp {
                continue;
            }
            let Some(resource) = resource_from_key(key, &state.uid) else {
                continue;
            };
            if !query.matches_attributes(&resource) {
                continue;
            }
            events.push(Event {
                id: format!("synthetic:{key}:{}", state.timestamp),
                timestamp: state.timestamp,
                event_type: state.event_type,
                resource,
                data: state.resource_data.clone(),
            });
        }

        // Step 5: merge in ascending timestamp order, ties broken by
        // resource key then event id.
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.resource.key().cmp(&b.resource.key()))
                .then_with(|| a.id.cmp(&b.id))
        });

        // Step 6: pagination.
        if let Some((cursor_ts, cursor_id)) = &cursor {
            events.retain(|e| (e.timestamp, &e.id) > (*cursor_ts, cursor_id));
        }

        let next_cursor = match query.page_size {
            Some(page_size) if events.len() > page_size => {
                let last = &events[page_size - 1];
                let token = Some(encode_cursor(last.timestamp, &last.id));
                events.truncate(page_size);
                token
            }
            _ => None,
        };

        stats.execution_time_ms = started.elapsed().as_millis() as u64;

        Ok(QueryResult {
            events,
            stats,
            next_cursor,
        })
    }
}

fn within_range(query: &Query, timestamp: u64) -> bool {
    timestamp >= query.start_timestamp && timestamp <= query.end_timestamp
}

/// Intersects two ascending, deduplicated id lists.
fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    out
}

/// Plans candidate block ids for `query` against `blocks`/`index`,
/// per §4.8 steps 1-2: inverted-index intersection across present
/// filter dimensions (falling back to every time-overlapping block when
/// no indexed dimension is filtered), narrowed by time-range overlap and
/// the per-block Bloom consistency check.
fn plan_candidate_blocks(blocks: &[BlockMetadata], index: &InvertedIndex, query: &Query) -> Vec<u32> {
    let mut dimension_lists: Vec<&[u32]> = Vec::new();
    let mut any_dimension_filtered = false;

    if let Some(kind) = &query.kind {
        any_dimension_filtered = true;
        match index.blocks_for_kind(kind) {
            Some(ids) => dimension_lists.push(ids),
            None => return Vec::new(),
        }
    }
    if let Some(namespace) = &query.namespace {
        any_dimension_filtered = true;
        match index.blocks_for_namespace(namespace) {
            Some(ids) => dimension_lists.push(ids),
            None => return Vec::new(),
        }
    }
    if let Some(group) = &query.group {
        any_dimension_filtered = true;
        match index.blocks_for_group(group) {
            Some(ids) => dimension_lists.push(ids),
            None => return Vec::new(),
        }
    }

    let candidate_ids: Vec<u32> = if any_dimension_filtered {
        let mut acc = dimension_lists[0].to_vec();
        for list in &dimension_lists[1..] {
            acc = intersect_sorted(&acc, list);
        }
        acc
    } else {
        blocks.iter().map(|b| b.id).collect()
    };

    candidate_ids
        .into_iter()
        .filter_map(|id| blocks.iter().find(|b| b.id == id).map(|b| (id, b)))
        .filter(|(_, b)| b.timestamp_min <= query.end_timestamp && b.timestamp_max >= query.start_timestamp)
        .filter(|(_, b)| {
            (query.kind.as_deref().is_none_or(|k| b.bloom_kind.might_contain(k)))
                && (query.namespace.as_deref().is_none_or(|n| b.bloom_namespace.might_contain(n)))
                && (query.group.as_deref().is_none_or(|g| b.bloom_group.might_contain(g)))
        })
        .map(|(id, _)| id)
        .collect()
}

/// Scans every candidate block of `file` for events matching `query`,
/// spread across a small worker pool (`pool_size`, the generalized form
/// of the teacher's `thread_pool_size` config concept). `read_blocks`
/// opens an independent read view per call, so candidate blocks can be
/// scanned concurrently without any shared mutable state. `pool_size <= 1`
/// degrades to the same sequential merge logic on a single worker.
fn scan_file(
    file: &BlockStorageFile,
    query: &Query,
    out: &mut Vec<Event>,
    stats: &mut QueryStats,
    pool_size: usize,
) -> Result<(), SpectreError> {
    let blocks = file.sealed_blocks();
    let candidates = plan_candidate_blocks(blocks, file.inverted_index(), query);
    stats.blocks_skipped += (blocks.len() - candidates.len()) as u32;

    if candidates.is_empty() {
        return Ok(());
    }

    let worker_count = pool_size.max(1).min(candidates.len());
    let chunk_size = candidates.len().div_ceil(worker_count).max(1);

    let chunk_results: Vec<Result<(Vec<Event>, u32), SpectreError>> = if worker_count <= 1 {
        vec![scan_block_chunk(file, query, &candidates)]
    } else {
        std::thread::scope(|scope| {
            candidates
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(|| scan_block_chunk(file, query, chunk)))
                .collect::<Vec<_>>()
                .into_iter()
                .map(|handle| handle.join().expect("block scan worker panicked"))
                .collect()
        })
    };

    for result in chunk_results {
        let (chunk_events, scanned) = result?;
        stats.blocks_scanned += scanned;
        out.extend(chunk_events);
    }
    Ok(())
}

/// Scans one chunk of block ids sequentially within a single worker.
fn scan_block_chunk(file: &BlockStorageFile, query: &Query, ids: &[u32]) -> Result<(Vec<Event>, u32), SpectreError> {
    let mut events = Vec::new();
    let mut scanned = 0u32;
    for &id in ids {
        match file.read_blocks(&[id]) {
            Ok(block_events) => {
                scanned += 1;
                for event in block_events {
                    if within_range(query, event.timestamp) && query.matches_attributes(&event.resource) {
                        events.push(event);
                    }
                }
            }
            Err(e) if e.is_recoverable_in_query() => {
                warn!(path = %file.path().display(), block_id = id, error = %e, "skipping corrupt block during query");
            }
            Err(e) => return Err(e),
        }
    }
    Ok((events, scanned))
}

fn merge_carried_state(acc: &mut BTreeMap<String, ResourceLastState>, incoming: &BTreeMap<String, ResourceLastState>) {
    for (key, state) in incoming {
        let should_update = acc
            .get(key)
            .map(|existing| state.timestamp >= existing.timestamp)
            .unwrap_or(true);
        if should_update {
            acc.insert(key.clone(), state.clone());
        }
    }
}

/// Reconstructs a [`Resource`] from a resource key
/// (`group/version/kind/namespace/name`) and its carried UID.
fn resource_from_key(key: &str, uid: &str) -> Option<Resource> {
    let mut parts = key.splitn(5, '/');
    let group = parts.next()?.to_string();
    let version = parts.next()?.to_string();
    let kind = parts.next()?.to_string();
    let namespace = parts.next()?.to_string();
    let name = parts.next()?.to_string();
    Some(Resource {
        group,
        version,
        kind,
        namespace,
        name,
        uid: uid.to_string(),
    })
}

fn encode_cursor(timestamp: u64, id: &str) -> String {
    format!("{timestamp:020}:{id}")
}

fn decode_cursor(token: &str) -> Result<(u64, String), SpectreError> {
    let (ts_part, id_part) = token
        .split_once(':')
        .ok_or_else(|| SpectreError::invalid_argument("malformed pagination cursor"))?;
    let timestamp: u64 = ts_part
        .parse()
        .map_err(|_| SpectreError::invalid_argument("malformed pagination cursor"))?;
    Ok((timestamp, id_part.to_string()))
}
