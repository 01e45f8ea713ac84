//! Bit vector with a precomputed rank directory.
//!
//! Rank is answered from a single level of cumulative block counts: one
//! `u32` per 512-bit block plus a popcount over the partial block. That
//! is a fixed 6.25% overhead, kept deliberately simple because the same
//! directory layout is what goes to disk.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::binary::{ByteReader, ByteWriter, SizeTally};
use crate::bits::BitVec;
use crate::config::RANK_BLOCK_BITS;
use crate::error::FormatError;
use crate::util::popcount_prefix;

const BLOCK_WORDS: usize = RANK_BLOCK_BITS / 64;

/// Bit vector answering `rank1` in constant time.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RankVector {
    bits: BitVec,
    /// Cumulative set-bit count before each 512-bit block.
    block_rank: Vec<u32>,
    num_ones: usize,
}

impl RankVector {
    pub fn new(bits: BitVec) -> Self {
        let num_blocks = bits.num_bits().div_ceil(RANK_BLOCK_BITS);
        let mut block_rank = Vec::with_capacity(num_blocks);
        let mut cumulative = 0u32;
        for block in 0..num_blocks {
            block_rank.push(cumulative);
            let start = block * BLOCK_WORDS;
            let end = (start + BLOCK_WORDS).min(bits.words().len());
            for &word in &bits.words()[start..end] {
                cumulative += word.count_ones();
            }
        }
        RankVector {
            bits,
            block_rank,
            num_ones: cumulative as usize,
        }
    }

    #[inline]
    pub fn num_bits(&self) -> usize {
        self.bits.num_bits()
    }

    #[inline]
    pub fn num_ones(&self) -> usize {
        self.num_ones
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        self.bits.get(i)
    }

    /// Number of set bits in `[0, i)`. Positions past the end saturate
    /// to the total count.
    #[inline]
    pub fn rank1(&self, i: usize) -> usize {
        if i == 0 || self.bits.num_bits() == 0 {
            return 0;
        }
        if i >= self.bits.num_bits() {
            return self.num_ones;
        }
        let block = i / RANK_BLOCK_BITS;
        let block_start = block * BLOCK_WORDS;
        self.block_rank[block] as usize
            + popcount_prefix(&self.bits.words()[block_start..], i - block * RANK_BLOCK_BITS)
    }

    /// Number of zero bits in `[0, i)`.
    #[inline]
    pub fn rank0(&self, i: usize) -> usize {
        let i = i.min(self.bits.num_bits());
        i - self.rank1(i)
    }

    /// Whether every set bit here is also set in `other`.
    pub fn is_subset_of(&self, other: &RankVector) -> bool {
        self.bits.num_bits() == other.bits.num_bits()
            && self
                .bits
                .words()
                .iter()
                .zip(other.bits.words())
                .all(|(mine, theirs)| mine & !theirs == 0)
    }

    #[inline]
    pub fn next_one(&self, pos: usize) -> Option<usize> {
        self.bits.next_one(pos)
    }

    #[inline]
    pub fn prev_one(&self, pos: usize) -> Option<usize> {
        self.bits.prev_one(pos)
    }

    pub fn heap_size(&self) -> usize {
        self.bits.heap_size() + self.block_rank.capacity() * 4
    }

    pub(crate) fn tally(&self, t: &mut SizeTally) {
        t.scalar32(3);
        t.align8();
        t.words(self.bits.words().len());
        t.scalar32(self.block_rank.len());
        t.align8();
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.bits.num_bits() as u32);
        w.put_u32(self.block_rank.len() as u32);
        w.put_u32(RANK_BLOCK_BITS as u32);
        w.align8();
        w.put_words(self.bits.words());
        w.put_u32_slice(&self.block_rank);
        w.align8();
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let num_bits = r.get_u32()? as usize;
        let num_blocks = r.get_u32()? as usize;
        let block_size = r.get_u32()? as usize;
        if block_size != RANK_BLOCK_BITS {
            return Err(FormatError::Invalid {
                what: "rank block size",
            });
        }
        if num_blocks != num_bits.div_ceil(RANK_BLOCK_BITS) {
            return Err(FormatError::Invalid {
                what: "rank block count",
            });
        }
        r.align8()?;
        let words = r.get_words(num_bits.div_ceil(64))?;
        let block_rank = r.get_u32_vec(num_blocks)?;
        r.align8()?;
        if stray_trailing_bits(&words, num_bits) {
            return Err(FormatError::Invalid {
                what: "rank trailing bits",
            });
        }
        // rebuild the directory; a corrupt copy must not drive rank
        // arithmetic off the rails later
        let rebuilt = RankVector::new(BitVec::from_words(words, num_bits));
        if rebuilt.block_rank != block_rank {
            return Err(FormatError::Invalid {
                what: "rank directory",
            });
        }
        Ok(rebuilt)
    }
}

/// Whether any bit beyond `num_bits` is set in the last word.
pub(crate) fn stray_trailing_bits(words: &[u64], num_bits: usize) -> bool {
    if num_bits % 64 == 0 {
        return false;
    }
    match words.last() {
        Some(&last) => last >> (num_bits % 64) != 0,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::bitvec::BitStream;

    fn vector_of(pattern: impl Fn(usize) -> bool, len: usize) -> RankVector {
        let mut s = BitStream::new();
        for i in 0..len {
            s.push(pattern(i));
        }
        RankVector::new(BitVec::from_streams([&s]))
    }

    #[test]
    fn test_rank_empty() {
        let rv = RankVector::new(BitVec::default());
        assert_eq!(rv.rank1(0), 0);
        assert_eq!(rv.rank1(100), 0);
    }

    #[test]
    fn test_rank_against_naive() {
        let pattern = |i: usize| i % 7 == 0 || i % 11 == 3;
        let len = 3000;
        let rv = vector_of(pattern, len);
        let mut naive = 0usize;
        for i in 0..=len {
            assert_eq!(rv.rank1(i), naive, "rank1({})", i);
            if i < len && pattern(i) {
                naive += 1;
            }
        }
        assert_eq!(rv.num_ones(), naive);
        assert_eq!(rv.rank0(len), len - naive);
    }

    #[test]
    fn test_rank_saturates() {
        let rv = vector_of(|i| i % 2 == 0, 100);
        assert_eq!(rv.rank1(100), 50);
        assert_eq!(rv.rank1(5000), 50);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let rv = vector_of(|i| i % 3 == 1, 1700);
        let mut w = ByteWriter::new();
        rv.write(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len() % 8, 0);

        let mut tally = SizeTally::new();
        rv.tally(&mut tally);
        assert_eq!(tally.total(), bytes.len());

        let mut r = ByteReader::new(&bytes);
        let back = RankVector::read(&mut r).unwrap();
        r.finish().unwrap();
        assert_eq!(back.num_bits(), rv.num_bits());
        for i in 0..=1700 {
            assert_eq!(back.rank1(i), rv.rank1(i));
        }
    }

    #[test]
    fn test_rejects_bad_block_size() {
        let rv = vector_of(|i| i % 3 == 1, 64);
        let mut w = ByteWriter::new();
        rv.write(&mut w);
        let mut bytes = w.into_bytes();
        bytes[8] = 0xFF;
        let mut r = ByteReader::new(&bytes);
        assert!(RankVector::read(&mut r).is_err());
    }
}
