//! Workload-mix macro-benchmarks for spectre-store.
//!
//! Measures sustained throughput under mixed ingest/query patterns that a
//! real Kubernetes-event consumer would generate, in the spirit of the
//! Yahoo Cloud Serving Benchmark's mixed-workload suite — adapted from
//! point reads/writes to an append-only, time-ranged event store.
//!
//! # Workloads
//!
//! | Name | Mix | Description |
//! |------|-----|-------------|
//! | **A** | 100% ingest | Event firehose — controller reconcile loop under load |
//! | **B** | 90% ingest, 10% filtered query | Live dashboard polling a hot namespace |
//! | **C** | 100% filtered query | Analytics backfill over a stable historical window |
//! | **D** | ingest across an hour boundary | Rotation under sustained write pressure |
//! | **E** | paginated scan | Full-window export via cursor-driven pagination |
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench ycsb               # all workloads
//! cargo bench --bench ycsb -- "A"        # workload A only
//! ```

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};

use spectre_store::codec::CompressionAlgorithm;
use spectre_store::config::StorageConfig;
use spectre_store::event::{Event, EventType, Resource};
use spectre_store::manager::HourlyStorageManager;
use spectre_store::query::{Query, QueryExecutor};
use tempfile::TempDir;

/// Events loaded before running a workload.
const RECORD_COUNT: u64 = 5_000;

/// Operations performed per measured iteration.
const OP_COUNT: u64 = 500;

const KINDS: &[&str] = &["Pod", "Deployment", "Service", "ConfigMap", "Secret"];
const NAMESPACES: &[&str] = &["default", "kube-system", "monitoring", "app-prod"];

fn make_value(rng: &mut impl Rng) -> Vec<u8> {
    let len = 128 + rng.random_range(0..128);
    (0..len).map(|_| rng.random()).collect()
}

fn make_event(seq: u64, base_ts: u64, rng: &mut impl Rng) -> Event {
    let kind = KINDS[rng.random_range(0..KINDS.len())];
    let namespace = NAMESPACES[rng.random_range(0..NAMESPACES.len())];
    Event {
        id: format!("evt-{seq:016}"),
        timestamp: base_ts + seq,
        event_type: EventType::Create,
        resource: Resource {
            group: "apps".into(),
            version: "v1".into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: format!("res-{seq:016}"),
            uid: format!("uid-{seq:016}"),
        },
        data: make_value(rng),
    }
}

/// Open a manager tuned for benchmarking: small blocks so index planning has
/// something to prune, default everything else.
fn open_bench_manager(dir: &std::path::Path) -> HourlyStorageManager {
    HourlyStorageManager::open(
        dir,
        StorageConfig {
            block_size: 8 * 1024,
            ..StorageConfig::default()
        },
        CompressionAlgorithm::ZstdEquivalent,
    )
    .expect("open")
}

/// Load phase: ingest [`RECORD_COUNT`] events spread across a single hour,
/// mixing kinds and namespaces uniformly, then flush.
fn load_manager(manager: &HourlyStorageManager, base_ts: u64) {
    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..RECORD_COUNT {
        manager.ingest_event(make_event(i, base_ts, &mut rng)).unwrap();
    }
    manager.flush().unwrap();
}

// ================================================================================================
// Workload A — pure ingest
// ================================================================================================

/// **Real-world analogy:** A cluster's audit-log sidecar under a reconcile
/// storm — every event gets written, nothing reads back concurrently.
///
/// **What it measures:** Sustained ingest throughput with no read
/// contention on the manager's `RwLock`.
///
/// **Expected behaviour:** Close to the raw `ingest_event` micro-benchmark;
/// should not degrade as the file grows within one hour bucket.
fn run_workload_a(manager: &HourlyStorageManager, base_ts: u64) {
    let mut rng = StdRng::seed_from_u64(7);
    for i in 0..OP_COUNT {
        manager.ingest_event(make_event(RECORD_COUNT + i, base_ts, &mut rng)).unwrap();
    }
}

fn bench_workload_a(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("A_pure_ingest", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let manager = open_bench_manager(dir.path());
                let base_ts = 1_700_000_000_000_000_000u64;
                load_manager(&manager, base_ts);
                (dir, manager, base_ts)
            },
            |(_dir, manager, base_ts)| run_workload_a(&manager, base_ts),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

// ================================================================================================
// Workload B — ingest-heavy with light filtered querying
// ================================================================================================

fn run_workload_b(manager: &HourlyStorageManager, base_ts: u64) {
    let mut rng = StdRng::seed_from_u64(11);
    let executor = QueryExecutor::new(manager);
    for i in 0..OP_COUNT {
        if rng.random_ratio(1, 10) {
            let result = executor
                .execute(Query {
                    start_timestamp: base_ts,
                    end_timestamp: base_ts + RECORD_COUNT + OP_COUNT,
                    kind: Some("Secret".into()),
                    ..Default::default()
                })
                .unwrap();
            criterion::black_box(result.events.len());
        } else {
            manager.ingest_event(make_event(RECORD_COUNT + i, base_ts, &mut rng)).unwrap();
        }
    }
}

fn bench_workload_b(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("B_90ingest_10query", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let manager = open_bench_manager(dir.path());
                let base_ts = 1_700_000_000_000_000_000u64;
                load_manager(&manager, base_ts);
                (dir, manager, base_ts)
            },
            |(_dir, manager, base_ts)| run_workload_b(&manager, base_ts),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

// ================================================================================================
// Workload C — pure filtered query
// ================================================================================================

fn run_workload_c(manager: &HourlyStorageManager, base_ts: u64) {
    let executor = QueryExecutor::new(manager);
    for namespace in NAMESPACES.iter().cycle().take(OP_COUNT as usize) {
        let result = executor
            .execute(Query {
                start_timestamp: base_ts,
                end_timestamp: base_ts + RECORD_COUNT,
                namespace: Some((*namespace).into()),
                ..Default::default()
            })
            .unwrap();
        criterion::black_box(result.events.len());
    }
}

fn bench_workload_c(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("C_pure_filtered_query", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let manager = open_bench_manager(dir.path());
                let base_ts = 1_700_000_000_000_000_000u64;
                load_manager(&manager, base_ts);
                manager.flush().unwrap();
                (dir, manager, base_ts)
            },
            |(_dir, manager, base_ts)| run_workload_c(&manager, base_ts),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

// ================================================================================================
// Workload D — ingest across an hour boundary
// ================================================================================================

/// **Real-world analogy:** A cluster that never stops generating events;
/// the manager must rotate files mid-stream without blocking the writer
/// thread for long.
///
/// **What it measures:** The one-time cost of `rotate_to` — finalizing the
/// outgoing file (sealing the last block, writing the index section and
/// footer) and opening the next bucket — amortized against ordinary ingest.
fn run_workload_d(manager: &HourlyStorageManager) {
    let hour_one = 1_700_000_000_000_000_000u64;
    let hour_two = hour_one + 3_600_000_000_000;
    let mut rng = StdRng::seed_from_u64(99);

    for i in 0..(OP_COUNT / 2) {
        manager.ingest_event(make_event(i, hour_one, &mut rng)).unwrap();
    }
    for i in 0..(OP_COUNT / 2) {
        manager.ingest_event(make_event(i, hour_two, &mut rng)).unwrap();
    }
}

fn bench_workload_d(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("D_ingest_across_rotation", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let manager = open_bench_manager(dir.path());
                (dir, manager)
            },
            |(_dir, manager)| run_workload_d(&manager),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

// ================================================================================================
// Workload E — paginated full-window export
// ================================================================================================

fn run_workload_e(manager: &HourlyStorageManager, base_ts: u64) {
    let executor = QueryExecutor::new(manager);
    let mut cursor = None;
    loop {
        let result = executor
            .execute(Query {
                start_timestamp: base_ts,
                end_timestamp: base_ts + RECORD_COUNT,
                page_size: Some(200),
                cursor: cursor.take(),
                ..Default::default()
            })
            .unwrap();
        criterion::black_box(result.events.len());
        cursor = result.next_cursor;
        if cursor.is_none() {
            break;
        }
    }
}

fn bench_workload_e(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("E_paginated_export", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let manager = open_bench_manager(dir.path());
                let base_ts = 1_700_000_000_000_000_000u64;
                load_manager(&manager, base_ts);
                manager.flush().unwrap();
                (dir, manager, base_ts)
            },
            |(_dir, manager, base_ts)| run_workload_e(&manager, base_ts),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

// ================================================================================================
// Group registration
// ================================================================================================

criterion_group!(
    benches,
    bench_workload_a,
    bench_workload_b,
    bench_workload_c,
    bench_workload_d,
    bench_workload_e,
);

criterion_main!(benches);
