//! Byte-level encoding helpers for the on-disk filter format.
//!
//! The format is a flat sequence of little-endian scalar fields and
//! `u64` word arrays. Every word array starts on an 8-byte boundary;
//! writers emit zero padding and readers skip it. Word arrays are cast
//! to and from bytes with `bytemuck`, so files are exchanged between
//! hosts of the same endianness (the scalar fields are always
//! little-endian).

use crate::error::FormatError;

/// Append-only byte buffer with alignment tracking.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32_slice(&mut self, vs: &[u32]) {
        for &v in vs {
            self.put_u32(v);
        }
    }

    /// Append a word array. The caller is responsible for aligning
    /// first; this is asserted in debug builds.
    pub fn put_words(&mut self, words: &[u64]) {
        debug_assert_eq!(self.buf.len() % 8, 0);
        self.buf.extend_from_slice(bytemuck::cast_slice(words));
    }

    /// Pad with zero bytes to the next 8-byte boundary.
    pub fn align8(&mut self) {
        while self.buf.len() % 8 != 0 {
            self.buf.push(0);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked cursor over a serialized filter region.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if self.remaining() < n {
            return Err(FormatError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u32(&mut self) -> Result<u32, FormatError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64, FormatError> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    pub fn get_u32_vec(&mut self, count: usize) -> Result<Vec<u32>, FormatError> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.get_u32()?);
        }
        Ok(out)
    }

    /// Read `count` words. The cursor must be 8-byte aligned.
    pub fn get_words(&mut self, count: usize) -> Result<Vec<u64>, FormatError> {
        if self.pos % 8 != 0 {
            return Err(FormatError::Misaligned { offset: self.pos });
        }
        let bytes = self.take(count * 8)?;
        // The source region carries no alignment guarantee, so copy.
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }

    /// Skip padding up to the next 8-byte boundary.
    pub fn align8(&mut self) -> Result<(), FormatError> {
        let target = self.pos.div_ceil(8) * 8;
        self.take(target - self.pos)?;
        Ok(())
    }

    /// Fail unless the region was fully consumed.
    pub fn finish(&self) -> Result<(), FormatError> {
        if self.remaining() != 0 {
            return Err(FormatError::Invalid {
                what: "trailing bytes after filter block",
            });
        }
        Ok(())
    }
}

/// Serialized size bookkeeping that mirrors [`ByteWriter`] without
/// producing bytes.
#[derive(Default)]
pub(crate) struct SizeTally {
    bytes: usize,
}

impl SizeTally {
    pub(crate) fn new() -> Self {
        SizeTally::default()
    }

    #[inline]
    pub(crate) fn scalar32(&mut self, count: usize) {
        self.bytes += 4 * count;
    }

    #[inline]
    pub(crate) fn scalar64(&mut self, count: usize) {
        self.bytes += 8 * count;
    }

    #[inline]
    pub(crate) fn words(&mut self, count: usize) {
        debug_assert_eq!(self.bytes % 8, 0);
        self.bytes += 8 * count;
    }

    #[inline]
    pub(crate) fn align8(&mut self) {
        self.bytes = self.bytes.div_ceil(8) * 8;
    }

    #[inline]
    pub(crate) fn total(&self) -> usize {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_roundtrip() {
        let mut w = ByteWriter::new();
        w.put_u64(0xDEAD_BEEF_CAFE_BABE);
        w.put_u32(7);
        w.align8();
        w.put_words(&[1, 2, 3]);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 8 + 4 + 4 + 24);

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.get_u64().unwrap(), 0xDEAD_BEEF_CAFE_BABE);
        assert_eq!(r.get_u32().unwrap(), 7);
        r.align8().unwrap();
        assert_eq!(r.get_words(3).unwrap(), vec![1, 2, 3]);
        r.finish().unwrap();
    }

    #[test]
    fn test_truncated() {
        let mut w = ByteWriter::new();
        w.put_u32(1);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.get_u32().unwrap(), 1);
        assert!(matches!(
            r.get_u32(),
            Err(FormatError::Truncated {
                needed: 4,
                available: 0
            })
        ));
    }

    #[test]
    fn test_misaligned_words() {
        let bytes = [0u8; 16];
        let mut r = ByteReader::new(&bytes);
        r.get_u32().unwrap();
        assert!(matches!(
            r.get_words(1),
            Err(FormatError::Misaligned { offset: 4 })
        ));
    }

    #[test]
    fn test_size_tally_matches_writer() {
        let mut w = ByteWriter::new();
        let mut t = SizeTally::new();
        w.put_u32(1);
        t.scalar32(1);
        w.put_u32(2);
        t.scalar32(1);
        w.align8();
        t.align8();
        w.put_words(&[9; 5]);
        t.words(5);
        w.put_u32_slice(&[1, 2, 3]);
        t.scalar32(3);
        w.align8();
        t.align8();
        assert_eq!(w.len(), t.total());
    }
}
