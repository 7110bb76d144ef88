//! Space-efficient membership test for a block's attribute values.
//!
//! Thin wrapper around the `bloomfilter` crate — the same dependency the
//! teacher uses for its single whole-table bloom (`sstable::mod.rs`,
//! `SST_BLOOM_FILTER_FALSE_POSITIVE_RATE`), generalized here so a single
//! block carries three independent instances (kind, namespace, group).

use bloomfilter::Bloom as BloomFilterImpl;

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::error::SpectreError;

/// A probabilistic set with no false negatives, sized for an expected
/// element count and a target false-positive rate.
pub struct BlockBloom {
    inner: Option<BloomFilterImpl<str>>,
    expected_elements: usize,
    false_positive_rate: f64,
}

impl BlockBloom {
    /// Creates a filter sized for `expected_elements` distinct items at
    /// the given target false-positive rate.
    ///
    /// `expected_elements == 0` yields an always-empty filter whose
    /// `might_contain` unconditionally returns `false`, matching the
    /// spec's "empty filters return false" guarantee without asking the
    /// underlying crate to size a zero-capacity bitmap.
    pub fn new(expected_elements: usize, false_positive_rate: f64) -> Self {
        let inner = if expected_elements == 0 {
            None
        } else {
            BloomFilterImpl::new_for_fp_rate(expected_elements, false_positive_rate).ok()
        };
        Self {
            inner,
            expected_elements,
            false_positive_rate,
        }
    }

    /// Records that `item` is a member of the set.
    ///
    /// Lazily sizes the filter on first use if construction at `new()`
    /// time declared zero expected elements but a caller adds one anyway
    /// (defensive: builders should size correctly up front).
    pub fn add(&mut self, item: &str) {
        if self.inner.is_none() {
            self.inner = BloomFilterImpl::new_for_fp_rate(
                self.expected_elements.max(1),
                self.false_positive_rate,
            )
            .ok();
        }
        if let Some(filter) = self.inner.as_mut() {
            filter.set(&item);
        }
    }

    /// Returns `true` if `item` may be a member; `false` is a guarantee of
    /// non-membership (no false negatives). Always `false` for an empty
    /// filter.
    pub fn might_contain(&self, item: &str) -> bool {
        match &self.inner {
            Some(filter) => filter.check(&item),
            None => false,
        }
    }

    /// Serializes the filter's bitmap and sizing parameters for on-disk
    /// storage.
    pub fn serialize(&self) -> Vec<u8> {
        match &self.inner {
            Some(filter) => filter.as_slice().to_vec(),
            None => Vec::new(),
        }
    }

    /// Reconstructs a filter from bytes previously produced by
    /// [`serialize`](Self::serialize), given the same sizing parameters
    /// used at construction time.
    pub fn deserialize(
        bytes: &[u8],
        expected_elements: usize,
        false_positive_rate: f64,
    ) -> Result<Self, SpectreError> {
        if bytes.is_empty() {
            return Ok(Self::new(0, false_positive_rate));
        }
        let inner = BloomFilterImpl::from_slice(bytes)
            .map_err(|e| SpectreError::invalid_argument(format!("malformed bloom filter: {e}")))?;
        Ok(Self {
            inner: Some(inner),
            expected_elements,
            false_positive_rate,
        })
    }
}

impl Encode for BlockBloom {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::Encode::encode_to(&self.serialize(), buf)?;
        encoding::Encode::encode_to(&(self.expected_elements as u64), buf)?;
        encoding::Encode::encode_to(&self.false_positive_rate.to_bits(), buf)?;
        Ok(())
    }
}

impl Decode for BlockBloom {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (bytes, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        let (expected_elements, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (rate_bits, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let false_positive_rate = f64::from_bits(rate_bits);
        let bloom = BlockBloom::deserialize(&bytes, expected_elements as usize, false_positive_rate)
            .map_err(|e| EncodingError::Custom(e.to_string()))?;
        Ok((bloom, off))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_false_negatives() {
        let mut bloom = BlockBloom::new(100, 0.05);
        for kind in ["Pod", "Deployment", "Service"] {
            bloom.add(kind);
        }
        for kind in ["Pod", "Deployment", "Service"] {
            assert!(bloom.might_contain(kind));
        }
    }

    #[test]
    fn empty_filter_never_contains() {
        let bloom = BlockBloom::new(0, 0.05);
        assert!(!bloom.might_contain("Pod"));
    }

    #[test]
    fn serialize_round_trip_preserves_membership() {
        let mut bloom = BlockBloom::new(50, 0.05);
        bloom.add("default");
        bloom.add("kube-system");

        let bytes = bloom.serialize();
        let restored = BlockBloom::deserialize(&bytes, 50, 0.05).unwrap();
        assert!(restored.might_contain("default"));
        assert!(restored.might_contain("kube-system"));
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut bloom = BlockBloom::new(10, 0.05);
        bloom.add("apps");

        let encoded = encoding::encode_to_vec(&bloom).unwrap();
        let (decoded, consumed) = BlockBloom::decode_from(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert!(decoded.might_contain("apps"));
        assert!(!decoded.might_contain("batch"));
    }
}
