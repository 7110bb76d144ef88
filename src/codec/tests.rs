use super::*;

#[test]
fn zstd_round_trips_arbitrary_bytes() {
    let codec = ZstdCodec::default();
    let payload = b"the quick brown fox jumps over the lazy dog".repeat(64);
    let frame = codec.compress(&payload).unwrap();
    assert!(frame.len() < payload.len(), "repetitive input should compress");
    let back = codec.decompress(&frame).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn gzip_round_trips_arbitrary_bytes() {
    let codec = GzipCodec::default();
    let payload = b"the quick brown fox jumps over the lazy dog".repeat(64);
    let frame = codec.compress(&payload).unwrap();
    let back = codec.decompress(&frame).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn empty_input_round_trips_to_empty() {
    for algo in [CompressionAlgorithm::ZstdEquivalent, CompressionAlgorithm::GzipEquivalent] {
        let codec = algo.codec();
        let frame = codec.compress(&[]).unwrap();
        assert!(frame.is_empty());
        assert!(codec.decompress(&frame).unwrap().is_empty());
    }
}

#[test]
fn decompress_of_garbage_fails() {
    for algo in [CompressionAlgorithm::ZstdEquivalent, CompressionAlgorithm::GzipEquivalent] {
        let codec = algo.codec();
        let garbage = vec![0xDEu8, 0xAD, 0xBE, 0xEF, 1, 2, 3];
        assert!(codec.decompress(&garbage).is_err());
    }
}

#[test]
fn tag_round_trips() {
    assert_eq!(
        CompressionAlgorithm::from_tag(CompressionAlgorithm::ZstdEquivalent.tag()),
        Some(CompressionAlgorithm::ZstdEquivalent)
    );
    assert_eq!(
        CompressionAlgorithm::from_tag(CompressionAlgorithm::GzipEquivalent.tag()),
        Some(CompressionAlgorithm::GzipEquivalent)
    );
    assert_eq!(CompressionAlgorithm::from_tag("lz4"), None);
}
