//! Bit vector with a sampled select directory.
//!
//! Every 64th set-bit position is recorded. A query starts from the
//! nearest sample and scans forward by whole-word popcounts, finishing
//! with an in-word select, so at most `64 / 64 + 1` words are touched
//! for evenly spread bits.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::binary::{ByteReader, ByteWriter, SizeTally};
use crate::bits::BitVec;
use crate::config::SELECT_SAMPLE_INTERVAL;
use crate::error::FormatError;
use crate::util::select_in_word;

/// Bit vector answering `select1` from sampled positions.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelectVector {
    bits: BitVec,
    /// Position of every 64th set bit: `samples[j]` is where the
    /// `j * 64`-th one (0-indexed) lives.
    samples: Vec<u32>,
    num_ones: usize,
}

impl SelectVector {
    pub fn new(bits: BitVec) -> Self {
        let mut samples = Vec::new();
        let mut seen = 0usize;
        for (word_idx, &word) in bits.words().iter().enumerate() {
            let mut w = word;
            while w != 0 {
                let bit = w.trailing_zeros() as usize;
                if seen % SELECT_SAMPLE_INTERVAL == 0 {
                    samples.push((word_idx * 64 + bit) as u32);
                }
                seen += 1;
                w &= w - 1;
            }
        }
        SelectVector {
            bits,
            samples,
            num_ones: seen,
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

    #[inline]
    pub fn next_one(&self, pos: usize) -> Option<usize> {
        self.bits.next_one(pos)
    }

    /// Position of the `k`-th (0-indexed) set bit. `k` must be below
    /// [`num_ones`](Self::num_ones).
    pub fn select1(&self, k: usize) -> usize {
        debug_assert!(k < self.num_ones);
        let sample = k / SELECT_SAMPLE_INTERVAL;
        let pos = self.samples[sample] as usize;
        let mut remaining = (k % SELECT_SAMPLE_INTERVAL) as u32;
        if remaining == 0 {
            return pos;
        }
        let words = self.bits.words();
        let mut word_idx = pos / 64;
        let offset = pos % 64;
        let mut word = if offset == 63 {
            0
        } else {
            words[word_idx] & (!0u64 << (offset + 1))
        };
        loop {
            let ones = word.count_ones();
            if ones >= remaining {
                return word_idx * 64 + select_in_word(word, remaining - 1) as usize;
            }
            remaining -= ones;
            word_idx += 1;
            word = words[word_idx];
        }
    }

    pub fn heap_size(&self) -> usize {
        self.bits.heap_size() + self.samples.capacity() * 4
    }

    pub(crate) fn tally(&self, t: &mut SizeTally) {
        t.scalar32(4);
        t.align8();
        t.words(self.bits.words().len());
        t.scalar32(self.samples.len());
        t.align8();
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.bits.num_bits() as u32);
        w.put_u32(self.num_ones as u32);
        w.put_u32(self.samples.len() as u32);
        w.put_u32(SELECT_SAMPLE_INTERVAL as u32);
        w.align8();
        w.put_words(self.bits.words());
        w.put_u32_slice(&self.samples);
        w.align8();
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let num_bits = r.get_u32()? as usize;
        let num_ones = r.get_u32()? as usize;
        let num_samples = r.get_u32()? as usize;
        let interval = r.get_u32()? as usize;
        if interval != SELECT_SAMPLE_INTERVAL {
            return Err(FormatError::Invalid {
                what: "select sample interval",
            });
        }
        if num_samples != num_ones.div_ceil(SELECT_SAMPLE_INTERVAL) {
            return Err(FormatError::Invalid {
                what: "select sample count",
            });
        }
        r.align8()?;
        let words = r.get_words(num_bits.div_ceil(64))?;
        let samples = r.get_u32_vec(num_samples)?;
        r.align8()?;
        if crate::bits::rank::stray_trailing_bits(&words, num_bits) {
            return Err(FormatError::Invalid {
                what: "select trailing bits",
            });
        }
        // rebuild the directory so corrupt samples cannot send a
        // select query out of bounds later
        let rebuilt = SelectVector::new(BitVec::from_words(words, num_bits));
        if rebuilt.num_ones != num_ones || rebuilt.samples != samples {
            return Err(FormatError::Invalid {
                what: "select directory",
            });
        }
        Ok(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::bitvec::BitStream;

    fn vector_of(pattern: impl Fn(usize) -> bool, len: usize) -> SelectVector {
        let mut s = BitStream::new();
        for i in 0..len {
            s.push(pattern(i));
        }
        SelectVector::new(BitVec::from_streams([&s]))
    }

    #[test]
    fn test_select_against_naive() {
        let pattern = |i: usize| i % 3 == 0 || i % 17 == 5;
        let len = 5000;
        let sv = vector_of(pattern, len);
        let positions: Vec<usize> = (0..len).filter(|&i| pattern(i)).collect();
        assert_eq!(sv.num_ones(), positions.len());
        for (k, &p) in positions.iter().enumerate() {
            assert_eq!(sv.select1(k), p, "select1({})", k);
        }
    }

    #[test]
    fn test_select_sparse_bits() {
        // far apart bits force multi-word scans between samples
        let sv = vector_of(|i| i % 613 == 0, 65_000);
        let positions: Vec<usize> = (0..65_000).filter(|&i| i % 613 == 0).collect();
        for (k, &p) in positions.iter().enumerate() {
            assert_eq!(sv.select1(k), p, "select1({})", k);
        }
    }

    #[test]
    fn test_empty() {
        let sv = SelectVector::new(BitVec::default());
        assert_eq!(sv.num_ones(), 0);
        assert_eq!(sv.num_bits(), 0);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let sv = vector_of(|i| i % 5 == 2, 2100);
        let mut w = ByteWriter::new();
        sv.write(&mut w);
        let bytes = w.into_bytes();

        let mut tally = SizeTally::new();
        sv.tally(&mut tally);
        assert_eq!(tally.total(), bytes.len());

        let mut r = ByteReader::new(&bytes);
        let back = SelectVector::read(&mut r).unwrap();
        r.finish().unwrap();
        assert_eq!(back.num_ones(), sv.num_ones());
        for k in 0..sv.num_ones() {
            assert_eq!(back.select1(k), sv.select1(k));
        }
    }
}
