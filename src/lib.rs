//! # spectre-store
//!
//! An embeddable, append-only event storage engine and query executor for
//! Kubernetes resource events. Events are routed into hour-bucketed files
//! made of independent, compressed blocks — no cross-block references, so
//! a single corrupt block never takes down the rest of a file.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                  HourlyStorageManager                     │
//! │   ┌──────────────┐   rotate on hour   ┌──────────────┐    │
//! │   │ current file │ ─────boundary────► │  next file   │    │
//! │   │ (Writing)     │                    │  (Writing)   │    │
//! │   └──────┬───────┘                    └──────────────┘    │
//! │          │ finalize()                                     │
//! │          ▼                                                 │
//! │   ┌──────────────────────────────────────────────────┐     │
//! │   │   block  │  block  │  block  │ ... │ IndexSection │     │
//! │   │ (bloom + │ (bloom + │ (bloom + │     │  + footer   │     │
//! │   │  events) │  events) │  events) │     │             │     │
//! │   └──────────────────────────────────────────────────┘     │
//! └───────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//!                    QueryExecutor
//!        (file selection → index planning → block scan →
//!         carry-forward augmentation → merge → paginate)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`manager`] | Hour-bucket routing, rotation, and the single-writer ingest mailbox |
//! | [`storage`] | One block-structured file: writer and reader for one hour bucket |
//! | [`query`] | Query planning and execution over one or more files |
//! | [`block`] | Block assembly, sealing, and decoding |
//! | [`index`] | Per-file inverted index and carry-forward resource state |
//! | [`file`] | On-disk header/footer layout and format versioning |
//! | [`codec`] | Pluggable block compression (zstd, deflate) |
//! | [`bloom`] | Per-block Bloom filters over resource attributes |
//! | [`event`] | The event data model |
//! | [`config`] | Storage engine configuration |
//! | [`error`] | Unified error taxonomy |
//! | [`encoding`] | Binary encode/decode primitives |
//!
//! ## Key Features
//!
//! - **Append-only, block-structured files** — each hour's events are
//!   packed into independently-compressed blocks; no block ever needs
//!   another to decode.
//! - **Carry-forward resource state** — the last known state of every
//!   resource is tracked across hour-file boundaries, so queries can
//!   reconstruct "as of" views without scanning every prior file.
//! - **Bloom filter lookups** — each block carries Bloom filters over
//!   `kind`, `namespace`, and `group` for fast negative skips during
//!   query planning.
//! - **Block-level CRC32 integrity** — a corrupt block is isolated and
//!   skipped; the rest of the file remains queryable.
//! - **Crash recovery by classification** — files are classified
//!   finalized / incomplete / corrupted at startup and quarantined
//!   accordingly, never silently trusted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spectre_store::config::StorageConfig;
//! use spectre_store::codec::CompressionAlgorithm;
//! use spectre_store::manager::HourlyStorageManager;
//! use spectre_store::event::{Event, EventType, Resource};
//!
//! let manager = HourlyStorageManager::open(
//!     "/tmp/spectre-data",
//!     StorageConfig::default(),
//!     CompressionAlgorithm::ZstdEquivalent,
//! ).unwrap();
//!
//! manager.ingest_event(Event {
//!     id: "evt-1".into(),
//!     timestamp: 1_700_000_000_000_000_000,
//!     event_type: EventType::Create,
//!     resource: Resource {
//!         group: "apps".into(),
//!         version: "v1".into(),
//!         kind: "Deployment".into(),
//!         namespace: "default".into(),
//!         name: "web".into(),
//!         uid: "uid-1".into(),
//!     },
//!     data: b"{}".to_vec(),
//! }).unwrap();
//!
//! manager.flush().unwrap();
//! manager.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod block;
pub mod bloom;
pub mod codec;
pub mod config;
pub mod encoding;
pub mod error;
pub mod event;
pub mod file;
pub mod index;
pub mod manager;
pub mod query;
pub mod storage;
