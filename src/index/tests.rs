use super::*;
use crate::block::BlockBuilder;
use crate::codec::ZstdCodec;
use crate::event::{EventType, Resource};

fn event(id: &str, ts: u64, kind: &str, namespace: &str, event_type: EventType, data: &[u8]) -> Event {
    Event {
        id: id.to_string(),
        timestamp: ts,
        event_type,
        resource: Resource {
            group: "apps".into(),
            version: "v1".into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: format!("name-{id}"),
            uid: format!("uid-{id}"),
        },
        data: data.to_vec(),
    }
}

fn sealed_block(id: u32, events: Vec<Event>) -> (BlockMetadata, Vec<Event>) {
    let mut builder = BlockBuilder::new(id, 1024 * 1024, 0, true, 0.05);
    for e in events.clone() {
        builder.add_event(e).unwrap();
    }
    let codec = ZstdCodec::default();
    let (metadata, _frame) = builder.seal(&codec, 0).unwrap();
    (metadata, events)
}

#[test]
fn record_block_populates_inverted_index_for_observed_attributes() {
    let mut builder = IndexSectionBuilder::new();
    let events = vec![
        event("1", 10, "Pod", "default", EventType::Create, b"a"),
        event("2", 20, "Deployment", "kube-system", EventType::Create, b"b"),
    ];
    let (metadata, events) = sealed_block(0, events);
    builder.record_block(metadata, &events);

    let section = builder.finalize();
    assert_eq!(section.inverted_index.blocks_for_kind("Pod"), Some(&[0u32][..]));
    assert_eq!(
        section.inverted_index.blocks_for_kind("Deployment"),
        Some(&[0u32][..])
    );
    assert_eq!(section.inverted_index.blocks_for_kind("Service"), None);
    assert_eq!(section.stats.total_events, 2);
    assert_eq!(section.blocks.len(), 1);
}

#[test]
fn final_resource_state_keeps_latest_timestamp_per_resource_key() {
    let mut builder = IndexSectionBuilder::new();
    let events = vec![
        event("1", 10, "Pod", "default", EventType::Create, b"v1"),
        event("2", 30, "Pod", "default", EventType::Update, b"v2"),
        event("3", 20, "Pod", "default", EventType::Update, b"stale"),
    ];
    let key = events[0].resource.key();
    let (metadata, events) = sealed_block(0, events);
    builder.record_block(metadata, &events);

    let states = builder.final_resource_states();
    let latest = states.get(&key).unwrap();
    assert_eq!(latest.timestamp, 30);
    assert_eq!(latest.resource_data, b"v2".to_vec());
    assert_eq!(latest.event_type, EventType::Update);
}

#[test]
fn delete_event_overwrites_final_state_with_empty_data() {
    let mut builder = IndexSectionBuilder::new();
    let events = vec![
        event("1", 10, "Pod", "default", EventType::Create, b"v1"),
        event("2", 20, "Pod", "default", EventType::Delete, b""),
    ];
    let key = events[0].resource.key();
    let (metadata, events) = sealed_block(0, events);
    builder.record_block(metadata, &events);

    let latest = builder.final_resource_states().get(&key).unwrap();
    assert_eq!(latest.event_type, EventType::Delete);
    assert!(latest.resource_data.is_empty());
}

#[test]
fn with_initial_state_seeds_carry_forward() {
    let mut initial = BTreeMap::new();
    initial.insert(
        "apps/v1/Pod/default/name-1".to_string(),
        ResourceLastState {
            uid: "uid-1".into(),
            event_type: EventType::Create,
            timestamp: 5,
            resource_data: b"carried".to_vec(),
        },
    );
    let builder = IndexSectionBuilder::with_initial_state(initial.clone());
    assert_eq!(builder.final_resource_states(), &initial);
}

#[test]
fn index_section_encode_decode_round_trip() {
    let mut builder = IndexSectionBuilder::new();
    let events = vec![event("1", 10, "Pod", "default", EventType::Create, b"v1")];
    let (metadata, events) = sealed_block(0, events);
    builder.record_block(metadata, &events);
    let section = builder.finalize();

    let bytes = encoding::encode_to_vec(&section).unwrap();
    let (decoded, consumed) = IndexSection::decode_from(&bytes).unwrap();
    assert_eq!(consumed, bytes.len());
    assert_eq!(decoded.stats.total_events, 1);
    assert_eq!(decoded.blocks.len(), 1);
    assert_eq!(
        decoded.inverted_index.blocks_for_kind("Pod"),
        Some(&[0u32][..])
    );
}

#[test]
fn cleanup_removes_only_aged_delete_states() {
    let mut states = BTreeMap::new();
    states.insert(
        "old-delete".to_string(),
        ResourceLastState {
            uid: "u1".into(),
            event_type: EventType::Delete,
            timestamp: 5,
            resource_data: Vec::new(),
        },
    );
    states.insert(
        "recent-delete".to_string(),
        ResourceLastState {
            uid: "u2".into(),
            event_type: EventType::Delete,
            timestamp: 50,
            resource_data: Vec::new(),
        },
    );
    states.insert(
        "live".to_string(),
        ResourceLastState {
            uid: "u3".into(),
            event_type: EventType::Update,
            timestamp: 1,
            resource_data: b"x".to_vec(),
        },
    );

    let removed = cleanup_aged_delete_states(&mut states, 10);
    assert_eq!(removed, 1);
    assert!(!states.contains_key("old-delete"));
    assert!(states.contains_key("recent-delete"));
    assert!(states.contains_key("live"));
}
