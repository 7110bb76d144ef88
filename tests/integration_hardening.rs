//! Public API hardening tests.
//!
//! These exercise exact boundary values for `StorageConfig` fields and
//! `Event::validate` edge cases not covered by the base integration suite.
//!
//! ## See also
//! - [`integration`] — end-to-end scenarios, concurrency

use spectre_store::codec::CompressionAlgorithm;
use spectre_store::config::StorageConfig;
use spectre_store::error::SpectreError;
use spectre_store::event::{Event, EventType, Resource};
use spectre_store::manager::HourlyStorageManager;
use tempfile::TempDir;

fn resource() -> Resource {
    Resource {
        group: "apps".into(),
        version: "v1".into(),
        kind: "Pod".into(),
        namespace: "default".into(),
        name: "a".into(),
        uid: "uid-a".into(),
    }
}

// ================================================================================================
// StorageConfig — block_size boundaries
// ================================================================================================

/// `block_size` at the exact minimum (1) is accepted.
#[test]
fn config_block_size_exact_min_accepted() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        block_size: 1,
        ..StorageConfig::default()
    };
    let manager = HourlyStorageManager::open(dir.path(), config, CompressionAlgorithm::ZstdEquivalent).unwrap();
    manager.close().unwrap();
}

/// `block_size` of zero is rejected.
#[test]
fn config_block_size_zero_rejected() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        block_size: 0,
        ..StorageConfig::default()
    };
    assert!(matches!(
        HourlyStorageManager::open(dir.path(), config, CompressionAlgorithm::ZstdEquivalent).unwrap_err(),
        SpectreError::InvalidArgument(_)
    ));
}

// ================================================================================================
// StorageConfig — bloom_false_positive_rate boundaries
// ================================================================================================

/// A rate just inside `(0.0, 1.0)` is accepted.
#[test]
fn config_bloom_rate_just_above_zero_accepted() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        bloom_false_positive_rate: 0.0001,
        ..StorageConfig::default()
    };
    let manager = HourlyStorageManager::open(dir.path(), config, CompressionAlgorithm::ZstdEquivalent).unwrap();
    manager.close().unwrap();
}

/// Exactly `0.0` is rejected — the range is open at both ends.
#[test]
fn config_bloom_rate_zero_rejected() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        bloom_false_positive_rate: 0.0,
        ..StorageConfig::default()
    };
    assert!(matches!(
        HourlyStorageManager::open(dir.path(), config, CompressionAlgorithm::ZstdEquivalent).unwrap_err(),
        SpectreError::InvalidArgument(_)
    ));
}

/// Exactly `1.0` is rejected.
#[test]
fn config_bloom_rate_one_rejected() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        bloom_false_positive_rate: 1.0,
        ..StorageConfig::default()
    };
    assert!(matches!(
        HourlyStorageManager::open(dir.path(), config, CompressionAlgorithm::ZstdEquivalent).unwrap_err(),
        SpectreError::InvalidArgument(_)
    ));
}

// ================================================================================================
// StorageConfig — writer_mailbox_capacity and query_thread_pool_size boundaries
// ================================================================================================

/// Mailbox capacity of exactly 1 is accepted (fully synchronous ingest).
#[test]
fn config_writer_mailbox_capacity_exact_min_accepted() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        writer_mailbox_capacity: 1,
        ..StorageConfig::default()
    };
    let manager = HourlyStorageManager::open(dir.path(), config, CompressionAlgorithm::ZstdEquivalent).unwrap();
    manager.close().unwrap();
}

#[test]
fn config_writer_mailbox_capacity_zero_rejected() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        writer_mailbox_capacity: 0,
        ..StorageConfig::default()
    };
    assert!(matches!(
        HourlyStorageManager::open(dir.path(), config, CompressionAlgorithm::ZstdEquivalent).unwrap_err(),
        SpectreError::InvalidArgument(_)
    ));
}

#[test]
fn config_query_thread_pool_size_zero_rejected() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        query_thread_pool_size: 0,
        ..StorageConfig::default()
    };
    assert!(matches!(
        HourlyStorageManager::open(dir.path(), config, CompressionAlgorithm::ZstdEquivalent).unwrap_err(),
        SpectreError::InvalidArgument(_)
    ));
}

// ================================================================================================
// Event::validate edge cases
// ================================================================================================

#[test]
fn delete_event_with_nonempty_data_is_rejected() {
    let event = Event {
        id: "1".into(),
        timestamp: 1,
        event_type: EventType::Delete,
        resource: resource(),
        data: b"should be empty".to_vec(),
    };
    assert!(matches!(event.validate(), Err(SpectreError::InvalidArgument(_))));
}

#[test]
fn update_event_with_empty_data_is_rejected() {
    let event = Event {
        id: "1".into(),
        timestamp: 1,
        event_type: EventType::Update,
        resource: resource(),
        data: Vec::new(),
    };
    assert!(matches!(event.validate(), Err(SpectreError::InvalidArgument(_))));
}

#[test]
fn event_with_empty_id_is_rejected() {
    let event = Event {
        id: String::new(),
        timestamp: 1,
        event_type: EventType::Create,
        resource: resource(),
        data: b"v1".to_vec(),
    };
    assert!(matches!(event.validate(), Err(SpectreError::InvalidArgument(_))));
}

#[test]
fn event_with_empty_resource_kind_is_rejected() {
    let mut resource = resource();
    resource.kind = String::new();
    let event = Event {
        id: "1".into(),
        timestamp: 1,
        event_type: EventType::Create,
        resource,
        data: b"v1".to_vec(),
    };
    assert!(matches!(event.validate(), Err(SpectreError::InvalidArgument(_))));
}

#[test]
fn event_with_empty_resource_name_is_rejected() {
    let mut resource = resource();
    resource.name = String::new();
    let event = Event {
        id: "1".into(),
        timestamp: 1,
        event_type: EventType::Create,
        resource,
        data: b"v1".to_vec(),
    };
    assert!(matches!(event.validate(), Err(SpectreError::InvalidArgument(_))));
}

#[test]
fn minimal_valid_create_event_is_accepted() {
    let event = Event {
        id: "1".into(),
        timestamp: 0,
        event_type: EventType::Create,
        resource: resource(),
        data: b"x".to_vec(),
    };
    assert!(event.validate().is_ok());
}
