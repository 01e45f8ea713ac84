//! Edge labels of the sparse trie encoding.
//!
//! One byte per edge, concatenated across nodes in level order. Within a
//! node the labels are sorted ascending, except that a leading
//! [`TERMINATOR`] marks the node itself as a stored key and is skipped
//! when matching edges.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::binary::{ByteReader, ByteWriter, SizeTally};
use crate::config::TERMINATOR;
use crate::error::FormatError;

/// Threshold below which a node is scanned linearly instead of by
/// binary search.
const LINEAR_SEARCH_MAX: usize = 12;

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelVector {
    labels: Vec<u8>,
}

impl LabelVector {
    pub(crate) fn from_levels<'a, I>(levels: I) -> Self
    where
        I: IntoIterator<Item = &'a Vec<u8>>,
    {
        let mut labels = Vec::new();
        for level in levels {
            labels.extend_from_slice(level);
        }
        LabelVector { labels }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn read(&self, pos: usize) -> u8 {
        self.labels[pos]
    }

    /// Find `target` among the `search_len` labels of the node starting
    /// at `pos`. Returns the absolute position of the match.
    pub fn search(&self, target: u8, pos: usize, search_len: usize) -> Option<usize> {
        let (start, len) = self.skip_terminator(pos, search_len);
        let node = &self.labels[start..start + len];
        if len < LINEAR_SEARCH_MAX {
            node.iter().position(|&l| l == target).map(|i| start + i)
        } else {
            node.binary_search(&target).ok().map(|i| start + i)
        }
    }

    /// Find the smallest label strictly greater than `target` in the
    /// node starting at `pos`.
    pub fn search_greater_than(&self, target: u8, pos: usize, search_len: usize) -> Option<usize> {
        let (start, len) = self.skip_terminator(pos, search_len);
        let node = &self.labels[start..start + len];
        let idx = if len < LINEAR_SEARCH_MAX {
            node.iter().position(|&l| l > target)
        } else {
            let i = node.partition_point(|&l| l <= target);
            (i < len).then_some(i)
        };
        idx.map(|i| start + i)
    }

    /// A leading terminator is the node's own key, not an edge.
    #[inline]
    fn skip_terminator(&self, pos: usize, search_len: usize) -> (usize, usize) {
        if search_len > 1 && self.labels[pos] == TERMINATOR {
            (pos + 1, search_len - 1)
        } else {
            (pos, search_len)
        }
    }

    pub fn heap_size(&self) -> usize {
        self.labels.capacity()
    }

    pub(crate) fn tally(&self, t: &mut SizeTally) {
        t.scalar32(1);
        t.align8();
        t.scalar64(self.labels.len().div_ceil(8));
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.labels.len() as u32);
        w.align8();
        let mut padded = self.labels.clone();
        padded.resize(self.labels.len().div_ceil(8) * 8, 0);
        // byte buffers carry no u64 alignment, so collect into words
        let words: Vec<u64> = bytemuck::pod_collect_to_vec(&padded);
        w.put_words(&words);
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let num_labels = r.get_u32()? as usize;
        r.align8()?;
        let words = r.get_words(num_labels.div_ceil(8))?;
        let mut labels: Vec<u8> = bytemuck::cast_slice(&words).to_vec();
        labels.truncate(num_labels);
        Ok(LabelVector { labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(levels: &[&[u8]]) -> LabelVector {
        let owned: Vec<Vec<u8>> = levels.iter().map(|l| l.to_vec()).collect();
        LabelVector::from_levels(&owned)
    }

    #[test]
    fn test_search_small_node() {
        let lv = vector(&[b"adr"]);
        assert_eq!(lv.search(b'a', 0, 3), Some(0));
        assert_eq!(lv.search(b'd', 0, 3), Some(1));
        assert_eq!(lv.search(b'r', 0, 3), Some(2));
        assert_eq!(lv.search(b'b', 0, 3), None);
    }

    #[test]
    fn test_search_large_node_binary() {
        let labels: Vec<u8> = (0..40).map(|i| (i * 5) as u8).collect();
        let lv = LabelVector::from_levels(&[labels.clone()]);
        for (i, &l) in labels.iter().enumerate() {
            assert_eq!(lv.search(l, 0, 40), Some(i));
        }
        assert_eq!(lv.search(7, 0, 40), None);
    }

    #[test]
    fn test_search_skips_terminator() {
        let mut node = vec![TERMINATOR];
        node.extend_from_slice(b"bcd");
        let lv = LabelVector::from_levels(&[node]);
        assert_eq!(lv.search(b'b', 0, 4), Some(1));
        // a genuine 0xFF edge sorts last and is still found
        let node2 = vec![TERMINATOR, b'x', 0xFF];
        let lv2 = LabelVector::from_levels(&[node2]);
        assert_eq!(lv2.search(0xFF, 0, 3), Some(2));
    }

    #[test]
    fn test_search_greater_than() {
        let lv = vector(&[b"bdf"]);
        assert_eq!(lv.search_greater_than(b'a', 0, 3), Some(0));
        assert_eq!(lv.search_greater_than(b'b', 0, 3), Some(1));
        assert_eq!(lv.search_greater_than(b'e', 0, 3), Some(2));
        assert_eq!(lv.search_greater_than(b'f', 0, 3), None);

        let node = vec![TERMINATOR, b'm'];
        let lv = LabelVector::from_levels(&[node]);
        assert_eq!(lv.search_greater_than(b'a', 0, 2), Some(1));
        assert_eq!(lv.search_greater_than(b'm', 0, 2), None);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let lv = vector(&[b"abc", b"defgh", b"z"]);
        let mut w = ByteWriter::new();
        lv.write(&mut w);
        let bytes = w.into_bytes();

        let mut tally = SizeTally::new();
        lv.tally(&mut tally);
        assert_eq!(tally.total(), bytes.len());

        let mut r = ByteReader::new(&bytes);
        let back = LabelVector::read_from(&mut r).unwrap();
        r.finish().unwrap();
        assert_eq!(back.len(), 9);
        for pos in 0..lv.len() {
            assert_eq!(back.read(pos), lv.read(pos));
        }
    }
}
