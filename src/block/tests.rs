use super::*;
use crate::codec::ZstdCodec;
use crate::event::{EventType, Resource};

fn event(id: &str, ts: u64, kind: &str, namespace: &str) -> Event {
    Event {
        id: id.to_string(),
        timestamp: ts,
        event_type: EventType::Create,
        resource: Resource {
            group: "apps".into(),
            version: "v1".into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: format!("name-{id}"),
            uid: format!("uid-{id}"),
        },
        data: b"payload".to_vec(),
    }
}

#[test]
fn seal_produces_consistent_metadata_and_round_trips_events() {
    let mut builder = BlockBuilder::new(0, 64 * 1024, 0, true, 0.05);
    for i in 0..50 {
        builder
            .add_event(event(&i.to_string(), 1000 + i, "Pod", "default"))
            .unwrap();
    }
    let codec = ZstdCodec::default();
    let (metadata, frame) = builder.seal(&codec, 0).unwrap();

    assert_eq!(metadata.event_count, 50);
    assert_eq!(metadata.timestamp_min, 1000);
    assert_eq!(metadata.timestamp_max, 1049);
    assert_eq!(metadata.kind_set, vec!["Pod".to_string()]);
    assert!(metadata.bloom_kind.might_contain("Pod"));
    assert!(!metadata.bloom_kind.might_contain("Deployment"));

    let mut file_bytes = vec![0u8; 0];
    file_bytes.extend_from_slice(&frame);

    let events = BlockReader::read(&file_bytes, &metadata, &codec, std::path::Path::new("test.bin")).unwrap();
    assert_eq!(events.len(), 50);
    for (i, e) in events.iter().enumerate() {
        assert_eq!(e.timestamp, 1000 + i as u64);
    }
}

#[test]
fn timestamps_stay_within_min_max_for_every_event() {
    let mut builder = BlockBuilder::new(1, 64 * 1024, 0, true, 0.05);
    let timestamps = [500u64, 200, 900, 100, 700];
    for (i, ts) in timestamps.iter().enumerate() {
        builder.add_event(event(&i.to_string(), *ts, "Pod", "default")).unwrap();
    }
    let codec = ZstdCodec::default();
    let (metadata, frame) = builder.seal(&codec, 0).unwrap();

    let events = BlockReader::read(&frame, &metadata, &codec, std::path::Path::new("t.bin")).unwrap();
    for e in &events {
        assert!(e.timestamp >= metadata.timestamp_min);
        assert!(e.timestamp <= metadata.timestamp_max);
    }
}

#[test]
fn corrupted_frame_is_reported_as_corrupt_block() {
    let mut builder = BlockBuilder::new(3, 64 * 1024, 0, true, 0.05);
    builder.add_event(event("1", 10, "Pod", "default")).unwrap();
    let codec = ZstdCodec::default();
    let (metadata, mut frame) = builder.seal(&codec, 0).unwrap();

    // Flip a byte inside the compressed payload without updating the
    // recorded checksum.
    if let Some(byte) = frame.first_mut() {
        *byte ^= 0xFF;
    }

    let err = BlockReader::read(&frame, &metadata, &codec, std::path::Path::new("t.bin")).unwrap_err();
    assert!(matches!(err, SpectreError::CorruptBlock { block_id: 3, .. }));
}

#[test]
fn reorder_window_sorts_small_local_jitter_but_not_far_jumps() {
    let mut builder = BlockBuilder::new(0, 64 * 1024, 50, true, 0.05);
    // Within a 50ms window (50_000_000 ns), jittered arrival order.
    for (i, ts) in [100u64, 80, 120, 90].iter().enumerate() {
        builder.add_event(event(&i.to_string(), *ts, "Pod", "default")).unwrap();
    }
    let codec = ZstdCodec::default();
    let (metadata, frame) = builder.seal(&codec, 0).unwrap();
    let events = BlockReader::read(&frame, &metadata, &codec, std::path::Path::new("t.bin")).unwrap();
    let timestamps: Vec<u64> = events.iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, vec![80, 90, 100, 120]);
}

#[test]
fn should_seal_reports_once_target_reached() {
    let mut builder = BlockBuilder::new(0, 64, 0, true, 0.05);
    assert!(!builder.should_seal());
    for i in 0..20 {
        builder.add_event(event(&i.to_string(), i as u64, "Pod", "default")).unwrap();
    }
    assert!(builder.should_seal());
}
