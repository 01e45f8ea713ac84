//! Lower trie levels in the LOUDS-sparse encoding.
//!
//! Three parallel sequences over the existing edges only: a byte label,
//! a child bit (set when the edge continues into another node) and a
//! louds bit (set on the first label of every node). Select over the
//! louds bits locates a node's label run, rank over the child bits
//! numbers the children. Node numbering continues from the dense levels
//! above, so a walk handed over at the boundary needs no translation.

use crate::binary::{ByteReader, ByteWriter, SizeTally};
use crate::bits::{BitVec, LabelVector, RankVector, SelectVector, SuffixVector, ValueVector};
use crate::builder::Builder;
use crate::config::{COULD_BE_POSITIVE, TERMINATOR};
use crate::error::FormatError;

#[derive(Debug)]
pub(crate) struct LoudsSparse {
    /// Total trie height, including the dense levels above.
    height: usize,
    /// First level encoded sparsely.
    start_level: usize,
    /// Number of nodes absorbed into the dense encoding.
    node_count_dense: usize,
    /// Number of child bits in the dense encoding.
    child_count_dense: usize,
    /// Position of the last label of each level; dense levels stay zero.
    level_cuts: Vec<u32>,
    labels: LabelVector,
    has_child: RankVector,
    louds: SelectVector,
    suffixes: SuffixVector,
    values: ValueVector,
}

impl LoudsSparse {
    pub(crate) fn from_builder(b: &Builder) -> Self {
        let height = b.tree_height();
        let start_level = b.sparse_start_level();
        let node_count_dense: usize = b.node_counts()[..start_level].iter().sum();
        let child_count_dense: usize = b.child_indicator_bits()[..start_level]
            .iter()
            .map(|s| s.count_ones())
            .sum();
        let mut level_cuts = vec![0u32; height];
        let mut total = 0usize;
        for level in start_level..height {
            total += b.num_items(level);
            level_cuts[level] = total as u32 - 1;
        }
        LoudsSparse {
            height,
            start_level,
            node_count_dense,
            child_count_dense,
            level_cuts,
            labels: LabelVector::from_levels(&b.labels()[start_level..]),
            has_child: RankVector::new(BitVec::from_streams(
                &b.child_indicator_bits()[start_level..],
            )),
            louds: SelectVector::new(BitVec::from_streams(&b.louds_bits()[start_level..])),
            suffixes: SuffixVector::new(
                b.suffix_type(),
                b.hash_suffix_len(),
                b.real_suffix_len(),
                BitVec::from_streams(&b.suffixes()[start_level..]),
            ),
            values: ValueVector::new(BitVec::from_streams(&b.values()[start_level..])),
        }
    }

    #[inline]
    pub(crate) fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub(crate) fn start_level(&self) -> usize {
        self.start_level
    }

    pub(crate) fn node_count_dense(&self) -> usize {
        self.node_count_dense
    }

    pub(crate) fn child_count_dense(&self) -> usize {
        self.child_count_dense
    }

    pub(crate) fn suffixes(&self) -> &SuffixVector {
        &self.suffixes
    }

    pub(crate) fn values(&self) -> &ValueVector {
        &self.values
    }

    /// Point lookup continuing a walk that the dense levels routed to
    /// node `in_node_num`.
    pub(crate) fn lookup_key(&self, key: &[u8], in_node_num: usize) -> bool {
        if self.labels.is_empty() {
            return false;
        }
        let mut pos = self.first_label_pos(in_node_num);
        let mut level = self.start_level;
        while level < key.len() {
            let node_size = self.node_size(pos);
            pos = match self.labels.search(key[level], pos, node_size) {
                Some(p) => p,
                None => return false,
            };
            if !self.has_child.get(pos) {
                return self
                    .suffixes
                    .check_equality(self.suffix_pos(pos), key, level + 1);
            }
            let node_num = self.child_node_num(pos);
            pos = self.first_label_pos(node_num);
            level += 1;
        }
        // out of key bytes: only a terminator here can match
        self.labels.read(pos) == TERMINATOR
            && !self.has_child.get(pos)
            && self
                .suffixes
                .check_equality(self.suffix_pos(pos), key, level + 1)
    }

    /// Position the iterator at the smallest key not less than `key`
    /// (not greater when `inclusive` is false and the match is exact),
    /// starting the walk at the iterator's hand-over node. Returns
    /// whether the landing position may be a false positive.
    pub(crate) fn move_to_key_greater_than(
        &self,
        key: &[u8],
        inclusive: bool,
        iter: &mut SparseIter<'_>,
    ) -> bool {
        if self.labels.is_empty() {
            iter.is_valid = false;
            return false;
        }
        let mut pos = self.first_label_pos(iter.start_node_num);
        let mut level = self.start_level;
        while level < key.len() {
            let node_size = self.node_size(pos);
            match self.labels.search(key[level], pos, node_size) {
                Some(p) => pos = p,
                None => {
                    self.move_to_left_in_next_subtrie(pos, node_size, key[level], iter);
                    return false;
                }
            }
            iter.append_pos(pos);
            if !self.has_child.get(pos) {
                return self.compare_suffix_greater_than(pos, key, level + 1, inclusive, iter);
            }
            let node_num = self.child_node_num(pos);
            pos = self.first_label_pos(node_num);
            level += 1;
        }
        if self.labels.read(pos) == TERMINATOR
            && !self.has_child.get(pos)
            && !self.is_end_of_node(pos)
        {
            iter.append_pos(pos);
            iter.is_at_terminator = true;
            if !inclusive {
                iter.next();
            } else {
                iter.is_valid = true;
            }
            return false;
        }
        // every key below this node extends the query prefix
        iter.move_to_leftmost_key();
        false
    }

    /// Keys strictly between the two iterator paths within the sparse
    /// levels. `left_in`/`right_in` carry the dense bounds over as
    /// global node numbers for paths that ended above the cutover.
    pub(crate) fn approx_count(
        &self,
        left: &SparseIter<'_>,
        right: &SparseIter<'_>,
        left_in: usize,
        right_in: usize,
    ) -> u64 {
        if self.labels.is_empty() {
            return 0;
        }
        let levels = self.height - self.start_level;
        let mut count = 0u64;
        let mut lo_prev = 0usize;
        let mut hi_prev = 0usize;
        for level in 0..levels {
            let lo = if left.is_valid && level < left.key_len {
                left.pos_in_trie[level] + 1
            } else if level == 0 && !left.is_valid {
                self.node_bound(left_in)
            } else {
                let node = self.has_child.rank1(lo_prev) + self.child_count_dense;
                self.node_bound(node)
            };
            let hi = if right.is_valid && level < right.key_len {
                right.pos_in_trie[level] + 1
            } else if level == 0 && !right.is_valid {
                self.node_bound(right_in)
            } else {
                let node = self.has_child.rank1(hi_prev) + self.child_count_dense;
                self.node_bound(node)
            };
            if hi > lo {
                count += ((hi - lo) - (self.has_child.rank1(hi) - self.has_child.rank1(lo))) as u64;
            }
            lo_prev = lo;
            hi_prev = hi;
        }
        count
    }

    #[inline]
    fn child_node_num(&self, pos: usize) -> usize {
        self.has_child.rank1(pos + 1) + self.child_count_dense
    }

    #[inline]
    fn first_label_pos(&self, node_num: usize) -> usize {
        self.louds.select1(node_num - self.node_count_dense)
    }

    /// Last label position of the node, or the end of the labels for
    /// the final node.
    fn last_label_pos(&self, node_num: usize) -> usize {
        let next = node_num - self.node_count_dense + 1;
        if next >= self.louds.num_ones() {
            self.louds.num_bits() - 1
        } else {
            self.louds.select1(next) - 1
        }
    }

    /// One past the labels of `global_node`, clamped to the end.
    fn node_bound(&self, global_node: usize) -> usize {
        let idx = (global_node + 1).saturating_sub(self.node_count_dense);
        if idx < self.louds.num_ones() {
            self.louds.select1(idx)
        } else {
            self.louds.num_bits()
        }
    }

    #[inline]
    fn suffix_pos(&self, pos: usize) -> usize {
        pos - self.has_child.rank1(pos + 1)
    }

    fn node_size(&self, pos: usize) -> usize {
        debug_assert!(self.louds.get(pos));
        match self.louds.next_one(pos + 1) {
            Some(next) => next - pos,
            None => self.louds.num_bits() - pos,
        }
    }

    fn is_end_of_node(&self, pos: usize) -> bool {
        pos == self.louds.num_bits() - 1 || self.louds.get(pos + 1)
    }

    fn move_to_left_in_next_subtrie(
        &self,
        pos: usize,
        node_size: usize,
        label: u8,
        iter: &mut SparseIter<'_>,
    ) {
        match self.labels.search_greater_than(label, pos, node_size) {
            Some(next) => {
                iter.append_pos(next);
                iter.move_to_leftmost_key();
            }
            None => {
                // nothing larger here; climb from the node's last label
                iter.append_pos(pos + node_size - 1);
                iter.next();
            }
        }
    }

    fn compare_suffix_greater_than(
        &self,
        pos: usize,
        key: &[u8],
        level: usize,
        inclusive: bool,
        iter: &mut SparseIter<'_>,
    ) -> bool {
        let suffix_pos = self.suffix_pos(pos);
        let cmp = self.suffixes.compare(suffix_pos, key, level);
        if cmp != COULD_BE_POSITIVE && (cmp < 0 || (cmp == 0 && !inclusive)) {
            iter.next();
            return false;
        }
        iter.is_valid = true;
        cmp == COULD_BE_POSITIVE
    }

    pub(crate) fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.level_cuts.capacity() * 4
            + self.labels.heap_size()
            + self.has_child.heap_size()
            + self.louds.heap_size()
            + self.suffixes.heap_size()
            + self.values.heap_size()
    }

    pub(crate) fn tally(&self, t: &mut SizeTally) {
        t.scalar32(4 + self.height);
        t.align8();
        self.labels.tally(t);
        self.has_child.tally(t);
        self.louds.tally(t);
        self.suffixes.tally(t);
        self.values.tally(t);
        t.align8();
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.height as u32);
        w.put_u32(self.start_level as u32);
        w.put_u32(self.node_count_dense as u32);
        w.put_u32(self.child_count_dense as u32);
        w.put_u32_slice(&self.level_cuts);
        w.align8();
        self.labels.write(w);
        self.has_child.write(w);
        self.louds.write(w);
        self.suffixes.write(w);
        self.values.write(w);
        w.align8();
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let height = r.get_u32()? as usize;
        let start_level = r.get_u32()? as usize;
        if start_level > height {
            return Err(FormatError::Invalid {
                what: "sparse start level",
            });
        }
        let node_count_dense = r.get_u32()? as usize;
        let child_count_dense = r.get_u32()? as usize;
        let level_cuts = r.get_u32_vec(height)?;
        r.align8()?;
        let labels = LabelVector::read_from(r)?;
        let has_child = RankVector::read(r)?;
        let louds = SelectVector::read(r)?;
        let suffixes = SuffixVector::read_from(r)?;
        let values = ValueVector::read_from(r)?;
        r.align8()?;
        if has_child.num_bits() != labels.len() || louds.num_bits() != labels.len() {
            return Err(FormatError::Invalid {
                what: "sparse stream sizes",
            });
        }
        let leaves = labels.len() - has_child.num_ones();
        if (suffixes.suffix_len() > 0 && suffixes.len() != leaves)
            || (!values.is_empty() && values.len() != leaves)
        {
            return Err(FormatError::Invalid {
                what: "sparse leaf counts",
            });
        }
        // node numbering must close: every child bit names a node
        if height > 0 {
            if node_count_dense > child_count_dense + 1
                || louds.num_ones() + node_count_dense
                    != child_count_dense + has_child.num_ones() + 1
            {
                return Err(FormatError::Invalid {
                    what: "sparse node counts",
                });
            }
        } else if node_count_dense != 0 || child_count_dense != 0 || !labels.is_empty() {
            return Err(FormatError::Invalid {
                what: "sparse counts without levels",
            });
        }
        Ok(LoudsSparse {
            height,
            start_level,
            node_count_dense,
            child_count_dense,
            level_cuts,
            labels,
            has_child,
            louds,
            suffixes,
            values,
        })
    }
}

/// Traversal state over the sparse levels. The key and position buffers
/// are sized once to the sparse depth and reused.
pub(crate) struct SparseIter<'a> {
    trie: &'a LoudsSparse,
    pub(crate) is_valid: bool,
    start_node_num: usize,
    pub(crate) key_len: usize,
    key: Vec<u8>,
    pub(crate) pos_in_trie: Vec<usize>,
    pub(crate) is_at_terminator: bool,
}

impl<'a> SparseIter<'a> {
    pub(crate) fn new(trie: &'a LoudsSparse) -> Self {
        let depth = trie.height - trie.start_level;
        SparseIter {
            trie,
            is_valid: false,
            start_node_num: trie.node_count_dense,
            key_len: 0,
            key: vec![0; depth],
            pos_in_trie: vec![0; depth],
            is_at_terminator: false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.is_valid = false;
        self.start_node_num = self.trie.node_count_dense;
        self.key_len = 0;
        self.is_at_terminator = false;
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub(crate) fn set_start_node_num(&mut self, node_num: usize) {
        self.start_node_num = node_num;
    }

    /// Key bytes accumulated below the cutover level. A terminator
    /// landing excludes the marker byte.
    pub(crate) fn key(&self) -> &[u8] {
        let len = if self.is_at_terminator {
            self.key_len - 1
        } else {
            self.key_len
        };
        &self.key[..len]
    }

    /// Descend along first labels until a leaf is reached. With an empty
    /// path, descent starts at the hand-over node.
    pub(crate) fn move_to_leftmost_key(&mut self) {
        if self.trie.labels.is_empty() {
            self.is_valid = false;
            return;
        }
        if self.key_len == 0 {
            let pos = self.trie.first_label_pos(self.start_node_num);
            self.append_pos(pos);
        }
        let depth = self.trie.height - self.trie.start_level;
        loop {
            let pos = self.pos_in_trie[self.key_len - 1];
            if !self.trie.has_child.get(pos) {
                if self.trie.labels.read(pos) == TERMINATOR && !self.trie.is_end_of_node(pos) {
                    self.is_at_terminator = true;
                }
                self.is_valid = true;
                return;
            }
            if self.key_len >= depth {
                self.is_valid = false;
                return;
            }
            let node_num = self.trie.child_node_num(pos);
            self.append_pos(self.trie.first_label_pos(node_num));
        }
    }

    /// Descend along last labels until a leaf is reached.
    pub(crate) fn move_to_rightmost_key(&mut self) {
        if self.trie.labels.is_empty() {
            self.is_valid = false;
            return;
        }
        if self.key_len == 0 {
            let pos = self.trie.last_label_pos(self.start_node_num);
            self.append_pos(pos);
        }
        let depth = self.trie.height - self.trie.start_level;
        loop {
            let pos = self.pos_in_trie[self.key_len - 1];
            if !self.trie.has_child.get(pos) {
                if self.trie.labels.read(pos) == TERMINATOR && !self.trie.is_end_of_node(pos) {
                    self.is_at_terminator = true;
                }
                self.is_valid = true;
                return;
            }
            if self.key_len >= depth {
                self.is_valid = false;
                return;
            }
            let node_num = self.trie.child_node_num(pos);
            self.append_pos(self.trie.last_label_pos(node_num));
        }
    }

    /// Advance to the next key below the hand-over node; turns invalid
    /// when the subtree is exhausted.
    pub(crate) fn next(&mut self) {
        if self.key_len == 0 {
            self.is_valid = false;
            return;
        }
        self.is_at_terminator = false;
        let mut pos = self.pos_in_trie[self.key_len - 1] + 1;
        while pos >= self.trie.louds.num_bits() || self.trie.louds.get(pos) {
            // crossed into the next node; climb
            self.key_len -= 1;
            if self.key_len == 0 {
                self.is_valid = false;
                return;
            }
            pos = self.pos_in_trie[self.key_len - 1] + 1;
        }
        self.set_pos(self.key_len - 1, pos);
        self.move_to_leftmost_key();
    }

    /// Step back to the previous key below the hand-over node.
    pub(crate) fn prev(&mut self) {
        if self.key_len == 0 {
            self.is_valid = false;
            return;
        }
        self.is_at_terminator = false;
        let mut pos = self.pos_in_trie[self.key_len - 1];
        while self.trie.louds.get(pos) {
            // first label of its node; climb
            self.key_len -= 1;
            if self.key_len == 0 {
                self.is_valid = false;
                return;
            }
            pos = self.pos_in_trie[self.key_len - 1];
        }
        self.set_pos(self.key_len - 1, pos - 1);
        self.move_to_rightmost_key();
    }

    /// Order the iterator position against the part of `key` below the
    /// cutover level.
    pub(crate) fn compare(&self, key: &[u8]) -> i32 {
        let start = self.trie.start_level;
        let suffix_len = key.len().saturating_sub(start);
        if self.is_at_terminator && self.key_len - 1 < suffix_len {
            return -1;
        }
        let iter_key = self.key();
        let key_sparse = key.get(start..).unwrap_or(&[]);
        let shared = &key_sparse[..key_sparse.len().min(iter_key.len())];
        match iter_key.cmp(shared) {
            core::cmp::Ordering::Less => return -1,
            core::cmp::Ordering::Greater => return 1,
            core::cmp::Ordering::Equal => {}
        }
        let pos = self.pos_in_trie[self.key_len - 1];
        if self.trie.has_child.get(pos) {
            return 0;
        }
        let suffix_pos = self.trie.suffix_pos(pos);
        self.trie
            .suffixes
            .compare(suffix_pos, key, start + self.key_len)
    }

    /// Suffix-store index of the leaf under the iterator.
    pub(crate) fn suffix_index(&self) -> usize {
        debug_assert!(self.key_len > 0);
        self.trie.suffix_pos(self.pos_in_trie[self.key_len - 1])
    }

    #[inline]
    fn append_pos(&mut self, pos: usize) {
        self.key[self.key_len] = self.trie.labels.read(pos);
        self.pos_in_trie[self.key_len] = pos;
        self.key_len += 1;
    }

    #[inline]
    fn set_pos(&mut self, level: usize, pos: usize) {
        self.key[level] = self.trie.labels.read(pos);
        self.pos_in_trie[level] = pos;
        self.key_len = level + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;

    fn paper_keys() -> Vec<&'static [u8]> {
        vec![
            b"f", b"far", b"fas", b"fast", b"fat", b"s", b"to", b"toy", b"trie", b"trip", b"try",
        ]
    }

    fn all_sparse(keys: &[&[u8]]) -> LoudsSparse {
        let mut opts = BuildOptions::default();
        opts.include_dense = false;
        let mut b = Builder::new(&opts);
        b.build(keys, None, None).unwrap();
        LoudsSparse::from_builder(&b)
    }

    #[test]
    fn test_lookup_members() {
        let trie = all_sparse(&paper_keys());
        for key in paper_keys() {
            assert!(
                trie.lookup_key(key, 0),
                "missing {:?}",
                core::str::from_utf8(key)
            );
        }
    }

    #[test]
    fn test_lookup_rejects() {
        let trie = all_sparse(&paper_keys());
        for key in [&b"fa"[..], b"fase", b"tor", b"z", b""] {
            assert!(!trie.lookup_key(key, 0), "false hit {:?}", key);
        }
        // shared paths without suffix bits are reported present; that is
        // the filter's one-sided error, not a membership guarantee
        assert!(trie.lookup_key(b"triple", 0));
    }

    #[test]
    fn test_iterate_forward_in_order() {
        let trie = all_sparse(&paper_keys());
        let mut iter = SparseIter::new(&trie);
        iter.move_to_leftmost_key();
        let mut seen = Vec::new();
        while iter.is_valid() {
            seen.push(iter.key().to_vec());
            iter.next();
        }
        let expect: Vec<Vec<u8>> = paper_keys().iter().map(|k| k.to_vec()).collect();
        assert_eq!(seen, expect);
    }

    #[test]
    fn test_iterate_backward_in_order() {
        let trie = all_sparse(&paper_keys());
        let mut iter = SparseIter::new(&trie);
        iter.move_to_rightmost_key();
        let mut seen = Vec::new();
        while iter.is_valid() {
            seen.push(iter.key().to_vec());
            iter.prev();
        }
        let mut expect: Vec<Vec<u8>> = paper_keys().iter().map(|k| k.to_vec()).collect();
        expect.reverse();
        assert_eq!(seen, expect);
    }

    #[test]
    fn test_move_to_key_greater_than() {
        let trie = all_sparse(&paper_keys());

        let mut iter = SparseIter::new(&trie);
        trie.move_to_key_greater_than(b"fase", true, &mut iter);
        assert!(iter.is_valid());
        assert_eq!(iter.key(), b"fast");

        let mut iter = SparseIter::new(&trie);
        trie.move_to_key_greater_than(b"f", true, &mut iter);
        assert!(iter.is_valid());
        assert_eq!(iter.key(), b"f");

        let mut iter = SparseIter::new(&trie);
        trie.move_to_key_greater_than(b"f", false, &mut iter);
        assert!(iter.is_valid());
        assert_eq!(iter.key(), b"far");

        let mut iter = SparseIter::new(&trie);
        trie.move_to_key_greater_than(b"g", true, &mut iter);
        assert!(iter.is_valid());
        assert_eq!(iter.key(), b"s");

        let mut iter = SparseIter::new(&trie);
        trie.move_to_key_greater_than(b"tz", true, &mut iter);
        assert!(!iter.is_valid());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let trie = all_sparse(&paper_keys());
        let mut w = ByteWriter::new();
        trie.write(&mut w);
        let bytes = w.into_bytes();

        let mut tally = SizeTally::new();
        trie.tally(&mut tally);
        assert_eq!(tally.total(), bytes.len());

        let mut r = ByteReader::new(&bytes);
        let back = LoudsSparse::read(&mut r).unwrap();
        r.finish().unwrap();
        for key in paper_keys() {
            assert!(back.lookup_key(key, 0));
        }
        assert!(!back.lookup_key(b"fz", 0));
    }

    #[test]
    fn test_truncated_rejected() {
        let trie = all_sparse(&paper_keys());
        let mut w = ByteWriter::new();
        trie.write(&mut w);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes[..bytes.len() / 2]);
        assert!(LoudsSparse::read(&mut r).is_err());
    }
}
