//! The Hourly Storage Manager: hour-bucket routing, rotation, and the
//! single-writer ingest mailbox.
//!
//! Grounded on the teacher's `Engine { inner: Arc<RwLock<EngineInner>> }`
//! for the concurrency backbone (`engine::mod.rs`), and on
//! `wal::Wal::append()`'s pattern of serializing writes behind one owned
//! handle. Unlike the teacher's `Engine`, which takes writes directly
//! under its `RwLock`, this manager routes every ingest through a bounded
//! `crossbeam::channel` mailbox serviced by one dedicated writer thread
//! (§5's "no locks exposed to callers" rule) — `crossbeam` is a teacher
//! dependency that the teacher itself never ends up calling.


use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use chrono::{DateTime, Datelike, Timelike, Utc};
use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{error, info, instrument, warn};

use crate::codec::CompressionAlgorithm;
use crate::config::StorageConfig;
use crate::error::SpectreError;
use crate::event::Event;
use crate::index::ResourceLastState;
use crate::storage::{self, BlockStorageFile, FileClassification, FileMetadataSummary, FileState};

const FILE_SUFFIX: &str = ".bin";

/// Converts a nanosecond timestamp into its UTC hour-bucket id (hours
/// since epoch) and the canonical `YYYY-MM-DD-HH.bin` filename.
fn hour_bucket(timestamp_ns: u64) -> Result<(i64, String), SpectreError> {
    let secs = (timestamp_ns / 1_000_000_000) as i64;
    let dt = DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| SpectreError::invalid_argument("timestamp out of representable range"))?;
    let bucket_id = secs.div_euclid(3600);
    let filename = format!(
        "{:04}-{:02}-{:02}-{:02}{FILE_SUFFIX}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour()
    );
    Ok((bucket_id, filename))
}

fn parse_bucket_from_filename(name: &str) -> Option<i64> {
    let stem = name.strip_suffix(FILE_SUFFIX)?;
    let mut parts = stem.splitn(4, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let hour: u32 = parts.next()?.parse().ok()?;
    let date = chrono::NaiveDate::from_ymd_opt(year, month, day)?;
    let datetime = date.and_hms_opt(hour, 0, 0)?;
    Some(datetime.and_utc().timestamp().div_euclid(3600))
}

/// Aggregate view over every known file, for callers that want a
/// dataset-wide summary without running a query.
#[derive(Debug, Clone, Default)]
pub struct ManagerMetadata {
    /// Distinct `kind` values observed across all files.
    pub kinds: Vec<String>,
    /// Distinct `namespace` values observed across all files.
    pub namespaces: Vec<String>,
    /// Distinct `group` values observed across all files.
    pub groups: Vec<String>,
    /// Earliest event timestamp across all files, if any.
    pub earliest_timestamp: Option<u64>,
    /// Latest event timestamp across all files, if any.
    pub latest_timestamp: Option<u64>,
    /// Total event count across all files.
    pub total_events: u64,
}

struct ManagerInner {
    data_dir: PathBuf,
    config: StorageConfig,
    algo: CompressionAlgorithm,
    current_bucket: Option<i64>,
    current_file: Option<BlockStorageFile>,
    /// Every bucket id this manager has observed, whether currently open
    /// or already finalized on disk.
    known_buckets: BTreeMap<i64, PathBuf>,
    /// Paths moved aside during startup discovery or crash recovery.
    quarantined: Vec<PathBuf>,
}

impl ManagerInner {
    fn route_and_write(&mut self, event: Event) -> Result<(), SpectreError> {
        let (bucket_id, filename) = hour_bucket(event.timestamp)?;
        if self.current_bucket != Some(bucket_id) {
            self.rotate_to(bucket_id, &filename)?;
        }
        self.current_file
            .as_mut()
            .expect("rotate_to always installs a current file")
            .write_event(event)
    }

    #[instrument(skip(self), fields(data_dir = %self.data_dir.display(), bucket_id))]
    fn rotate_to(&mut self, bucket_id: i64, filename: &str) -> Result<(), SpectreError> {
        let mut carry_forward = BTreeMap::new();
        if let Some(mut outgoing) = self.current_file.take() {
            carry_forward = outgoing.final_resource_states().clone();
            if outgoing.state() != FileState::Finalized {
                outgoing.finalize()?;
            }
            if let Some(outgoing_bucket) = self.current_bucket {
                self.known_buckets.insert(outgoing_bucket, outgoing.path().to_path_buf());
            }
            info!(path = %outgoing.path().display(), "rotated out hour file");
        }

        let path = self.data_dir.join(filename);
        let mut file = if let Some(existing_path) = self.known_buckets.get(&bucket_id).cloned() {
            BlockStorageFile::open(&existing_path, &self.config, self.algo, carry_forward)?
        } else {
            BlockStorageFile::open(&path, &self.config, self.algo, carry_forward)?
        };
        if file.state() == FileState::Finalized {
            file.reopen()?;
        }

        self.known_buckets.insert(bucket_id, file.path().to_path_buf());
        self.current_bucket = Some(bucket_id);
        self.current_file = Some(file);
        Ok(())
    }

    /// On a fail-fast I/O error the current file is no longer trusted: move
    /// it aside and drop it from rotation bookkeeping so the next event
    /// opens a fresh file at the same bucket instead of continuing to
    /// target a broken one.
    fn quarantine_current_file(&mut self) -> Result<(), SpectreError> {
        let Some(file) = self.current_file.take() else {
            return Ok(());
        };
        let path = file.path().to_path_buf();
        drop(file);
        if let Some(bucket_id) = self.current_bucket.take() {
            self.known_buckets.remove(&bucket_id);
        }
        let quarantined_path = quarantine_path(&path, "io-error")?;
        warn!(path = %path.display(), moved_to = %quarantined_path.display(), "current file quarantined after I/O error");
        self.quarantined.push(quarantined_path);
        Ok(())
    }
}

enum MailboxMessage {
    Ingest(Box<Event>),
    /// Blocks the sender until every previously enqueued message has been
    /// processed; used by [`HourlyStorageManager::flush`] and tests.
    Barrier(Sender<()>),
    Shutdown,
}

/// Maps event timestamps to hour-bucket files, rotating the current
/// writable file on boundary crossing and carrying forward final
/// resource state across the rotation.
///
/// Cheaply `Clone`-able: clones share the same background writer thread
/// and the same `Arc<RwLock<ManagerInner>>`, mirroring the teacher's
/// `Engine` handle.
pub struct HourlyStorageManager {
    inner: Arc<RwLock<ManagerInner>>,
    mailbox: Sender<MailboxMessage>,
    writer_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Clone for HourlyStorageManager {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            mailbox: self.mailbox.clone(),
            writer_handle: Arc::clone(&self.writer_handle),
        }
    }
}

impl HourlyStorageManager {
    /// Opens (or creates) a manager rooted at `data_dir`. Existing files
    /// are enumerated and classified; incomplete or corrupted files are
    /// quarantined by renaming them aside. No current file is opened
    /// until the first event is ingested.
    pub fn open(data_dir: impl AsRef<Path>, config: StorageConfig, algo: CompressionAlgorithm) -> Result<Self, SpectreError> {
        config.validate()?;
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let mut known_buckets = BTreeMap::new();
        let mut quarantined = Vec::new();

        for entry in fs::read_dir(&data_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(FILE_SUFFIX) {
                continue;
            }
            let Some(bucket_id) = parse_bucket_from_filename(name) else {
                continue;
            };

            match storage::classify(&path)? {
                FileClassification::Finalized => {
                    known_buckets.insert(bucket_id, path);
                }
                FileClassification::Incomplete => {
                    let quarantined_path = quarantine_path(&path, "incomplete")?;
                    warn!(path = %path.display(), moved_to = %quarantined_path.display(), "incomplete file quarantined at startup");
                    quarantined.push(quarantined_path);
                }
                FileClassification::Corrupted => {
                    let quarantined_path = quarantine_path(&path, "corrupted")?;
                    warn!(path = %path.display(), moved_to = %quarantined_path.display(), "corrupted file quarantined at startup");
                    quarantined.push(quarantined_path);
                }
            }
        }

        info!(data_dir = %data_dir.display(), files = known_buckets.len(), "hourly storage manager opened");

        let inner = Arc::new(RwLock::new(ManagerInner {
            data_dir,
            config,
            algo,
            current_bucket: None,
            current_file: None,
            known_buckets,
            quarantined,
        }));

        let (tx, rx) = bounded(std::cmp::max(1, inner.read().expect("lock").config.writer_mailbox_capacity));
        let writer_inner = Arc::clone(&inner);
        let handle = std::thread::spawn(move || writer_loop(writer_inner, rx));

        Ok(Self {
            inner,
            mailbox: tx,
            writer_handle: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// Enqueues `event` onto the writer mailbox. Blocks if the mailbox is
    /// full (backpressure); never drops an event.
    pub fn ingest_event(&self, event: Event) -> Result<(), SpectreError> {
        event.validate()?;
        self.mailbox
            .send(MailboxMessage::Ingest(Box::new(event)))
            .map_err(|_| SpectreError::invalid_argument("writer thread has shut down"))
    }

    /// Blocks until every event enqueued before this call has been
    /// durably written (or has failed and been logged).
    pub fn flush(&self) -> Result<(), SpectreError> {
        let (tx, rx) = bounded(1);
        self.mailbox
            .send(MailboxMessage::Barrier(tx))
            .map_err(|_| SpectreError::invalid_argument("writer thread has shut down"))?;
        rx.recv()
            .map_err(|_| SpectreError::invalid_argument("writer thread has shut down"))
    }

    /// Shuts down the writer thread, finalizing the current file if one
    /// is open. Idempotent: subsequent calls are no-ops.
    pub fn close(&self) -> Result<(), SpectreError> {
        let _ = self.mailbox.send(MailboxMessage::Shutdown);
        if let Some(handle) = self
            .writer_handle
            .lock()
            .map_err(|_| SpectreError::invalid_argument("writer handle lock poisoned"))?
            .take()
        {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Runs the cleanup hook: removes DELETE snapshots older than
    /// `cutoff_timestamp` from the current file's carried-forward state.
    pub fn cleanup_aged_delete_states(&self, cutoff_timestamp: u64) -> Result<usize, SpectreError> {
        self.flush()?;
        let mut inner = self
            .inner
            .write()
            .map_err(|_| SpectreError::invalid_argument("manager lock poisoned"))?;
        Ok(inner
            .current_file
            .as_mut()
            .map(|f| f.cleanup_aged_delete_states(cutoff_timestamp))
            .unwrap_or(0))
    }

    /// Aggregates attribute coverage and time range across every known
    /// file (finalized and current).
    pub fn metadata(&self) -> Result<ManagerMetadata, SpectreError> {
        self.flush()?;
        let inner = self
            .inner
            .read()
            .map_err(|_| SpectreError::invalid_argument("manager lock poisoned"))?;

        let mut kinds = std::collections::BTreeSet::new();
        let mut namespaces = std::collections::BTreeSet::new();
        let mut groups = std::collections::BTreeSet::new();
        let mut earliest = None;
        let mut latest = None;
        let mut total_events = 0u64;

        let mut fold = |summary: FileMetadataSummary| {
            kinds.extend(summary.kinds);
            namespaces.extend(summary.namespaces);
            groups.extend(summary.groups);
            earliest = match (earliest, summary.earliest_timestamp) {
                (None, b) => b,
                (a, None) => a,
                (Some(a), Some(b)) => Some(a.min(b)),
            };
            latest = match (latest, summary.latest_timestamp) {
                (None, b) => b,
                (a, None) => a,
                (Some(a), Some(b)) => Some(a.max(b)),
            };
            total_events += summary.total_events;
        };

        if let Some(current) = &inner.current_file {
            fold(current.metadata_summary());
        }
        for (bucket_id, path) in &inner.known_buckets {
            if inner.current_file.is_some() && inner.current_bucket == Some(*bucket_id) {
                continue;
            }
            let file = BlockStorageFile::open(path, &inner.config, inner.algo, BTreeMap::new())?;
            fold(file.metadata_summary());
        }

        Ok(ManagerMetadata {
            kinds: kinds.into_iter().collect(),
            namespaces: namespaces.into_iter().collect(),
            groups: groups.into_iter().collect(),
            earliest_timestamp: earliest,
            latest_timestamp: latest,
            total_events,
        })
    }

    /// Paths of every known *finalized* file whose time range could
    /// overlap `[start, end]`. Excludes the current file — callers scan
    /// that through [`with_current_file`](Self::with_current_file)
    /// instead, since it requires holding the manager's read lock for
    /// the duration of the scan (§5's "consistent snapshot" rule).
    pub fn historical_files_overlapping(&self, start: u64, end: u64) -> Result<Vec<PathBuf>, SpectreError> {
        self.flush()?;
        let inner = self
            .inner
            .read()
            .map_err(|_| SpectreError::invalid_argument("manager lock poisoned"))?;

        let mut paths = Vec::new();
        for (bucket_id, path) in &inner.known_buckets {
            if inner.current_file.is_some() && inner.current_bucket == Some(*bucket_id) {
                continue;
            }
            let file = BlockStorageFile::open(path, &inner.config, inner.algo, BTreeMap::new())?;
            let summary = file.metadata_summary();
            let overlaps = match (summary.earliest_timestamp, summary.latest_timestamp) {
                (Some(min), Some(max)) => min <= end && max >= start,
                _ => false,
            };
            if overlaps {
                paths.push(path.clone());
            }
        }
        Ok(paths)
    }

    /// Opens a finalized historical file read-only, using this manager's
    /// configured codec and compression algorithm.
    pub fn open_historical_file(&self, path: &Path) -> Result<BlockStorageFile, SpectreError> {
        let (config, algo) = {
            let inner = self
                .inner
                .read()
                .map_err(|_| SpectreError::invalid_argument("manager lock poisoned"))?;
            (inner.config.clone(), inner.algo)
        };
        BlockStorageFile::open(path, &config, algo, BTreeMap::new())
    }

    /// Runs `f` against the current file under a single read lock,
    /// giving the query executor a consistent snapshot of sealed blocks
    /// plus the in-progress builder's buffered events without requiring
    /// `BlockStorageFile` (or its `BlockMetadata`) to implement `Clone`.
    pub fn with_current_file<R>(&self, f: impl FnOnce(Option<&BlockStorageFile>) -> R) -> Result<R, SpectreError> {
        self.flush()?;
        let inner = self
            .inner
            .read()
            .map_err(|_| SpectreError::invalid_argument("manager lock poisoned"))?;
        Ok(f(inner.current_file.as_ref()))
    }

    /// The data directory this manager is rooted at.
    pub fn data_dir(&self) -> Result<PathBuf, SpectreError> {
        Ok(self
            .inner
            .read()
            .map_err(|_| SpectreError::invalid_argument("manager lock poisoned"))?
            .data_dir
            .clone())
    }

    /// The configured worker-pool size for block scanning during query
    /// execution. `1` degrades the query executor to sequential scanning.
    pub fn query_thread_pool_size(&self) -> Result<usize, SpectreError> {
        Ok(self
            .inner
            .read()
            .map_err(|_| SpectreError::invalid_argument("manager lock poisoned"))?
            .config
            .query_thread_pool_size)
    }

    /// The path of the file currently open for writing, if any.
    pub fn current_file_path(&self) -> Result<Option<PathBuf>, SpectreError> {
        Ok(self
            .inner
            .read()
            .map_err(|_| SpectreError::invalid_argument("manager lock poisoned"))?
            .current_file
            .as_ref()
            .map(|f| f.path().to_path_buf()))
    }

    /// Paths quarantined during startup discovery.
    pub fn quarantined_paths(&self) -> Result<Vec<PathBuf>, SpectreError> {
        Ok(self
            .inner
            .read()
            .map_err(|_| SpectreError::invalid_argument("manager lock poisoned"))?
            .quarantined
            .clone())
    }
}

fn writer_loop(inner: Arc<RwLock<ManagerInner>>, rx: Receiver<MailboxMessage>) {
    for message in rx.iter() {
        match message {
            MailboxMessage::Ingest(event) => {
                let mut guard = match inner.write() {
                    Ok(guard) => guard,
                    Err(_) => {
                        error!("manager lock poisoned, dropping event");
                        continue;
                    }
                };
                if let Err(e) = guard.route_and_write(*event) {
                    error!(error = %e, "failed to write event");
                    if matches!(e, SpectreError::Io(_)) {
                        if let Err(qe) = guard.quarantine_current_file() {
                            error!(error = %qe, "failed to quarantine broken current file");
                        }
                    }
                }
            }
            MailboxMessage::Barrier(ack) => {
                let _ = ack.send(());
            }
            MailboxMessage::Shutdown => {
                if let Ok(mut guard) = inner.write() {
                    if let Some(mut file) = guard.current_file.take() {
                        if file.state() != FileState::Finalized {
                            if let Err(e) = file.finalize() {
                                error!(error = %e, "failed to finalize current file on shutdown");
                            }
                        }
                        if let Some(bucket_id) = guard.current_bucket.take() {
                            guard.known_buckets.insert(bucket_id, file.path().to_path_buf());
                        }
                    }
                }
                break;
            }
        }
    }
}

fn quarantine_path(path: &Path, suffix: &str) -> Result<PathBuf, SpectreError> {
    let now_ns = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_nanos();
    let quarantined = path.with_extension(format!("bin.{suffix}.{now_ns}"));
    fs::rename(path, &quarantined)?;
    Ok(quarantined)
}
