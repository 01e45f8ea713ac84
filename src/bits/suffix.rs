//! Per-leaf suffix bits and fixed-width values.
//!
//! A leaf keeps up to 64 bits beyond the trie path: hash bits of the
//! whole key, real key bits just below the branching point, or both.
//! Suffixes of all leaves are packed back to back and addressed by leaf
//! index. Construction is deterministic in `(key, level)`, so a stored
//! key always reproduces its own suffix and membership never yields a
//! false negative.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::binary::{ByteReader, ByteWriter, SizeTally};
use crate::bits::BitVec;
use crate::config::{SuffixType, COULD_BE_POSITIVE, DEFAULT_HASH_SHIFT, VALUE_WIDTH};
use crate::error::FormatError;

/// 64-bit FNV-1a over the whole key.
#[inline]
pub(crate) fn suffix_hash(key: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &byte in key {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[inline]
fn mask(len: u32) -> u64 {
    if len >= 64 {
        u64::MAX
    } else {
        (1u64 << len) - 1
    }
}

/// `len` key bits starting at byte `level`, highest bit first, zero
/// padded when the key runs out.
pub(crate) fn construct_real_suffix(key: &[u8], level: usize, len: u32) -> u64 {
    if len == 0 || key.len() <= level {
        return 0;
    }
    let mut value = 0u64;
    let mut got = 0u32;
    let mut idx = level;
    while got < len && idx < key.len() {
        let take = (len - got).min(8);
        let byte = key[idx] as u64;
        value = (value << take) | (byte >> (8 - take));
        got += take;
        idx += 1;
    }
    value << (len - got)
}

/// Suffix word for `key` whose leaf sits just above byte `level`.
pub(crate) fn construct_suffix(
    suffix_type: SuffixType,
    key: &[u8],
    level: usize,
    hash_len: u32,
    real_len: u32,
) -> u64 {
    match suffix_type {
        SuffixType::None => 0,
        SuffixType::Hash => (suffix_hash(key) >> DEFAULT_HASH_SHIFT) & mask(hash_len),
        SuffixType::Real => construct_real_suffix(key, level, real_len),
        SuffixType::Mixed => {
            let hash = (suffix_hash(key) >> DEFAULT_HASH_SHIFT) & mask(hash_len);
            (hash << real_len) | construct_real_suffix(key, level, real_len)
        }
    }
}

/// Packed per-leaf suffix bits.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SuffixVector {
    suffix_type: SuffixType,
    hash_len: u32,
    real_len: u32,
    bits: BitVec,
}

impl SuffixVector {
    pub(crate) fn new(suffix_type: SuffixType, hash_len: u32, real_len: u32, bits: BitVec) -> Self {
        SuffixVector {
            suffix_type,
            hash_len,
            real_len,
            bits,
        }
    }

    pub fn empty() -> Self {
        SuffixVector {
            suffix_type: SuffixType::None,
            hash_len: 0,
            real_len: 0,
            bits: BitVec::default(),
        }
    }

    #[inline]
    pub fn suffix_type(&self) -> SuffixType {
        self.suffix_type
    }

    #[inline]
    pub fn suffix_len(&self) -> u32 {
        self.hash_len + self.real_len
    }

    /// Number of stored suffix slots.
    pub fn len(&self) -> usize {
        match self.suffix_len() {
            0 => 0,
            len => self.bits.num_bits() / len as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored suffix bits of leaf `idx`.
    #[inline]
    pub fn read(&self, idx: usize) -> u64 {
        let len = self.suffix_len();
        self.bits.read_bits(idx * len as usize, len)
    }

    /// Whether the stored suffix is consistent with `key`. A `true` from
    /// a hash suffix may be a false positive.
    pub fn check_equality(&self, idx: usize, key: &[u8], level: usize) -> bool {
        if self.suffix_type == SuffixType::None {
            return true;
        }
        if idx * self.suffix_len() as usize >= self.bits.num_bits() {
            return false;
        }
        let stored = self.read(idx);
        let queried = construct_suffix(self.suffix_type, key, level, self.hash_len, self.real_len);
        stored == queried
    }

    /// Order the stored suffix of leaf `idx` against `key`.
    ///
    /// Returns a negative, zero or positive value like a comparator, or
    /// [`COULD_BE_POSITIVE`] when the configuration cannot order the two
    /// (no suffix bits, or matching hash bits).
    pub fn compare(&self, idx: usize, key: &[u8], level: usize) -> i32 {
        if self.suffix_type == SuffixType::None
            || idx * self.suffix_len() as usize >= self.bits.num_bits()
        {
            return COULD_BE_POSITIVE;
        }
        let stored = self.read(idx);
        let queried = construct_suffix(self.suffix_type, key, level, self.hash_len, self.real_len);
        if self.suffix_type == SuffixType::Hash && stored == queried {
            return COULD_BE_POSITIVE;
        }
        let (stored, queried) = if self.suffix_type == SuffixType::Mixed {
            (stored & mask(self.real_len), queried & mask(self.real_len))
        } else {
            (stored, queried)
        };
        match stored.cmp(&queried) {
            core::cmp::Ordering::Less => -1,
            core::cmp::Ordering::Equal => 0,
            core::cmp::Ordering::Greater => 1,
        }
    }

    /// Real-suffix portion of leaf `idx`, for extending a reconstructed
    /// key. Returns the bits and their count.
    pub fn real_suffix(&self, idx: usize) -> (u64, u32) {
        match self.suffix_type {
            SuffixType::Real | SuffixType::Mixed => {
                (self.read(idx) & mask(self.real_len), self.real_len)
            }
            _ => (0, 0),
        }
    }

    pub fn heap_size(&self) -> usize {
        self.bits.heap_size()
    }

    pub(crate) fn tally(&self, t: &mut SizeTally) {
        t.scalar32(4);
        t.align8();
        t.words(self.bits.words().len());
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.suffix_type.to_u32());
        w.put_u32(self.hash_len);
        w.put_u32(self.real_len);
        w.put_u32(self.bits.num_bits() as u32);
        w.align8();
        w.put_words(self.bits.words());
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let tag = r.get_u32()?;
        let suffix_type = SuffixType::from_u32(tag).ok_or(FormatError::Invalid {
            what: "suffix type tag",
        })?;
        let hash_len = r.get_u32()?;
        let real_len = r.get_u32()?;
        if hash_len + real_len > 64 {
            return Err(FormatError::Invalid {
                what: "suffix width",
            });
        }
        let num_bits = r.get_u32()? as usize;
        r.align8()?;
        let words = r.get_words(num_bits.div_ceil(64))?;
        Ok(SuffixVector {
            suffix_type,
            hash_len,
            real_len,
            bits: BitVec::from_words(words, num_bits),
        })
    }
}

/// Packed 64-bit values, parallel to the suffix store.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ValueVector {
    bits: BitVec,
}

impl ValueVector {
    pub(crate) fn new(bits: BitVec) -> Self {
        ValueVector { bits }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bits.num_bits() / VALUE_WIDTH as usize
    }

    #[inline]
    pub fn read(&self, idx: usize) -> u64 {
        self.bits.read_bits(idx * VALUE_WIDTH as usize, VALUE_WIDTH)
    }

    pub fn heap_size(&self) -> usize {
        self.bits.heap_size()
    }

    pub(crate) fn tally(&self, t: &mut SizeTally) {
        t.scalar32(2);
        t.align8();
        t.words(self.bits.words().len());
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.put_u32(VALUE_WIDTH);
        w.put_u32(self.len() as u32);
        w.align8();
        w.put_words(self.bits.words());
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let width = r.get_u32()?;
        if width != VALUE_WIDTH {
            return Err(FormatError::Invalid {
                what: "value width",
            });
        }
        let count = r.get_u32()? as usize;
        r.align8()?;
        let words = r.get_words(count)?;
        Ok(ValueVector {
            bits: BitVec::from_words(words, count * 64),
        })
    }
}
