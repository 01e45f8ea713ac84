//! Build-time configuration and shared constants.
//!
//! The filter is parameterized at build time: whether the upper trie
//! levels use the dense (bitmap) encoding, the dense/sparse trade-off
//! ratio, and the suffix configuration that controls the false-positive
//! rate. All of these travel with the filter when it is serialized so a
//! stored filter is self-describing.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fanout of a trie node: one potential edge per byte value.
pub const FANOUT: usize = 256;

/// Reserved label marking "this node is itself a stored key" in the
/// sparse encoding. Always the first label of its node.
pub const TERMINATOR: u8 = 0xFF;

/// Default ratio steering the dense/sparse cutover: a level is promoted
/// to the dense encoding while dense size times this ratio stays below
/// the sparse size of the remaining levels.
pub const DEFAULT_SPARSE_DENSE_RATIO: u32 = 16;

/// Number of low hash bits discarded before taking hash-suffix bits.
pub const DEFAULT_HASH_SHIFT: u32 = 7;

/// Sentinel compare result: a hash suffix matched, so the two keys are
/// equal as far as the filter can tell, but the match may still be a
/// false positive.
pub const COULD_BE_POSITIVE: i32 = 2018;

/// Width in bits of an optional per-key value.
pub const VALUE_WIDTH: u32 = 64;

/// Rank directory granularity in bits.
pub(crate) const RANK_BLOCK_BITS: usize = 512;

/// Every n-th set bit position is sampled by the select directory.
pub(crate) const SELECT_SAMPLE_INTERVAL: usize = 64;

/// What a leaf stores beyond the trie path, trading space for a lower
/// false-positive rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SuffixType {
    /// No suffix bits. Every key sharing a stored path is reported present.
    None,
    /// Bits taken from a hash of the whole key. Lowers the point-query
    /// false-positive rate but cannot help range queries.
    Hash,
    /// Bits taken from the key itself just below the branching point.
    /// Helps both point and range queries.
    Real,
    /// Hash bits followed by real bits.
    Mixed,
}

impl SuffixType {
    pub(crate) fn to_u32(self) -> u32 {
        match self {
            SuffixType::None => 0,
            SuffixType::Hash => 1,
            SuffixType::Real => 2,
            SuffixType::Mixed => 3,
        }
    }

    pub(crate) fn from_u32(tag: u32) -> Option<SuffixType> {
        match tag {
            0 => Some(SuffixType::None),
            1 => Some(SuffixType::Hash),
            2 => Some(SuffixType::Real),
            3 => Some(SuffixType::Mixed),
            _ => None,
        }
    }
}

/// Parameters for [`Surf::build`](crate::Surf::build).
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BuildOptions {
    /// Encode the upper trie levels with per-node bitmaps.
    pub include_dense: bool,
    /// Dense/sparse trade-off; see [`DEFAULT_SPARSE_DENSE_RATIO`].
    /// Lower values promote more levels to the dense encoding.
    pub sparse_dense_ratio: u32,
    /// Kind of suffix bits stored at each leaf.
    pub suffix_type: SuffixType,
    /// Number of hash suffix bits per leaf.
    pub hash_suffix_len: u32,
    /// Number of real suffix bits per leaf.
    pub real_suffix_len: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            include_dense: true,
            sparse_dense_ratio: DEFAULT_SPARSE_DENSE_RATIO,
            suffix_type: SuffixType::None,
            hash_suffix_len: 0,
            real_suffix_len: 0,
        }
    }
}

impl BuildOptions {
    /// Options with the given suffix configuration and defaults for the
    /// rest.
    pub fn with_suffix(suffix_type: SuffixType, hash_len: u32, real_len: u32) -> Self {
        BuildOptions {
            suffix_type,
            hash_suffix_len: hash_len,
            real_suffix_len: real_len,
            ..BuildOptions::default()
        }
    }
}

/// Resolved configuration carried by a built filter and stored in the
/// serialized header.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilterConfig {
    pub include_dense: bool,
    pub sparse_dense_ratio: u32,
    pub suffix_type: SuffixType,
    pub hash_suffix_len: u32,
    pub real_suffix_len: u32,
    pub hash_shift: u32,
    pub could_be_positive: i32,
    pub has_values: bool,
}

impl FilterConfig {
    pub(crate) fn from_options(opts: &BuildOptions, has_values: bool) -> Self {
        FilterConfig {
            include_dense: opts.include_dense,
            sparse_dense_ratio: opts.sparse_dense_ratio,
            suffix_type: opts.suffix_type,
            hash_suffix_len: opts.hash_suffix_len,
            real_suffix_len: opts.real_suffix_len,
            hash_shift: DEFAULT_HASH_SHIFT,
            could_be_positive: COULD_BE_POSITIVE,
            has_values,
        }
    }
}

/// Encode a `u64` as an 8-byte key whose bytewise order matches the
/// integer order.
#[inline]
pub fn u64_to_key(word: u64) -> [u8; 8] {
    word.to_be_bytes()
}

/// Decode a key produced by [`u64_to_key`]. The slice must hold at least
/// 8 bytes.
#[inline]
pub fn key_to_u64(key: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_key_roundtrip() {
        for word in [0u64, 1, 255, 256, u64::MAX, 0x0123_4567_89AB_CDEF] {
            assert_eq!(key_to_u64(&u64_to_key(word)), word);
        }
    }

    #[test]
    fn test_u64_key_order() {
        let mut words = vec![3u64, 1 << 40, 255, 1 << 8, u64::MAX, 0];
        let mut keys: Vec<[u8; 8]> = words.iter().map(|&w| u64_to_key(w)).collect();
        words.sort_unstable();
        keys.sort_unstable();
        let decoded: Vec<u64> = keys.iter().map(|k| key_to_u64(k)).collect();
        assert_eq!(words, decoded);
    }

    #[test]
    fn test_suffix_type_tags() {
        for t in [
            SuffixType::None,
            SuffixType::Hash,
            SuffixType::Real,
            SuffixType::Mixed,
        ] {
            assert_eq!(SuffixType::from_u32(t.to_u32()), Some(t));
        }
        assert_eq!(SuffixType::from_u32(7), None);
    }
}
