//! Upper trie levels in the dense (bitmap) encoding.
//!
//! Each node owns two aligned 256-bit bitmaps laid out in level order:
//! one marking which edge labels exist and one marking which of those
//! edges lead to a child node rather than terminating in a leaf. A third
//! vector holds one bit per node marking nodes that are themselves
//! stored keys. Child node numbers fall out of `rank1` over the child
//! bitmap, so a walk costs one rank per level.

use crate::binary::{ByteReader, ByteWriter, SizeTally};
use crate::bits::{BitVec, RankVector, SuffixVector, ValueVector};
use crate::builder::Builder;
use crate::config::{COULD_BE_POSITIVE, FANOUT};
use crate::error::FormatError;

/// Outcome of a point lookup in the dense levels.
pub(crate) enum DenseLookup {
    /// The key cannot be in the filter.
    Miss,
    /// The walk ended at a leaf whose suffix is consistent with the key.
    Hit,
    /// The walk ran below the dense levels; continue at this sparse node.
    Continue(usize),
}

#[derive(Debug)]
pub(crate) struct LoudsDense {
    height: usize,
    /// Position of the last bitmap bit of each level.
    level_cuts: Vec<u32>,
    labels: RankVector,
    has_child: RankVector,
    prefix_key: RankVector,
    suffixes: SuffixVector,
    values: ValueVector,
}

impl LoudsDense {
    pub(crate) fn from_builder(b: &Builder) -> Self {
        let height = b.sparse_start_level();
        let mut level_cuts = Vec::with_capacity(height);
        let mut total_bits = 0usize;
        for level in 0..height {
            total_bits += b.node_counts()[level] * FANOUT;
            level_cuts.push(total_bits as u32 - 1);
        }
        LoudsDense {
            height,
            level_cuts,
            labels: RankVector::new(BitVec::from_streams(&b.bitmap_labels()[..height])),
            has_child: RankVector::new(BitVec::from_streams(
                &b.bitmap_child_indicator_bits()[..height],
            )),
            prefix_key: RankVector::new(BitVec::from_streams(
                &b.prefixkey_indicator_bits()[..height],
            )),
            suffixes: SuffixVector::new(
                b.suffix_type(),
                b.hash_suffix_len(),
                b.real_suffix_len(),
                BitVec::from_streams(&b.suffixes()[..height]),
            ),
            values: ValueVector::new(BitVec::from_streams(&b.values()[..height])),
        }
    }

    #[inline]
    pub(crate) fn height(&self) -> usize {
        self.height
    }

    /// Number of nodes across the dense levels.
    pub(crate) fn node_count(&self) -> usize {
        self.prefix_key.num_bits()
    }

    /// Number of set child bits across the dense levels.
    pub(crate) fn child_count(&self) -> usize {
        self.has_child.num_ones()
    }

    pub(crate) fn suffixes(&self) -> &SuffixVector {
        &self.suffixes
    }

    pub(crate) fn values(&self) -> &ValueVector {
        &self.values
    }

    pub(crate) fn lookup_key(&self, key: &[u8]) -> DenseLookup {
        let mut node_num = 0usize;
        for level in 0..self.height {
            let node_base = node_num * FANOUT;
            if level >= key.len() {
                // out of key bytes; only a prefix key can match
                if self.prefix_key.get(node_num)
                    && self
                        .suffixes
                        .check_equality(self.suffix_pos(node_base, true), key, level + 1)
                {
                    return DenseLookup::Hit;
                }
                return DenseLookup::Miss;
            }
            let pos = node_base + key[level] as usize;
            if !self.labels.get(pos) {
                return DenseLookup::Miss;
            }
            if !self.has_child.get(pos) {
                if self
                    .suffixes
                    .check_equality(self.suffix_pos(pos, false), key, level + 1)
                {
                    return DenseLookup::Hit;
                }
                return DenseLookup::Miss;
            }
            node_num = self.child_node_num(pos);
        }
        DenseLookup::Continue(node_num)
    }

    /// Position the iterator at the smallest key not less than `key`
    /// (not greater when `inclusive` is false and the match is exact).
    /// Returns whether the landing position may be a false positive.
    pub(crate) fn move_to_key_greater_than(
        &self,
        key: &[u8],
        inclusive: bool,
        iter: &mut DenseIter<'_>,
    ) -> bool {
        let mut node_num = 0usize;
        for level in 0..self.height {
            let node_base = node_num * FANOUT;
            if level >= key.len() {
                // out of key bytes: every key below this node is greater
                let first = self
                    .labels
                    .next_one(node_base)
                    .filter(|&p| p < node_base + FANOUT);
                if self.prefix_key.get(node_num) {
                    if let Some(pos) = first {
                        iter.append(pos);
                    }
                    iter.is_at_prefix_key = true;
                    iter.set_flags(true, true, true, true);
                    if !inclusive {
                        // the node's key equals the query exactly
                        iter.next();
                    }
                } else {
                    match first {
                        Some(pos) => {
                            iter.append(pos);
                            iter.move_to_leftmost_key();
                        }
                        None => iter.set_flags(false, true, true, true),
                    }
                }
                return false;
            }
            let pos = node_base + key[level] as usize;
            iter.append(pos);
            if !self.labels.get(pos) {
                iter.next();
                return false;
            }
            if !self.has_child.get(pos) {
                return self.compare_suffix_greater_than(pos, key, level + 1, inclusive, iter);
            }
            node_num = self.child_node_num(pos);
        }
        iter.send_out_node_num = node_num;
        iter.set_flags(true, false, true, true);
        false
    }

    /// Keys strictly between the two iterator paths, counted level by
    /// level with rank arithmetic. Also returns the child counts at the
    /// final bounds, which seed the sparse continuation.
    pub(crate) fn approx_count(
        &self,
        left: &DenseIter<'_>,
        right: &DenseIter<'_>,
    ) -> (u64, usize, usize) {
        if self.height == 0 {
            return (0, 0, 0);
        }
        let mut count = 0u64;
        let mut lo = 0usize;
        let mut hi = 0usize;
        let mut lo_prev = 0usize;
        let mut hi_prev = 0usize;
        for level in 0..self.height {
            lo = match left.bound_at(level) {
                Some(b) => b,
                None => (self.has_child.rank1(lo_prev) + 1) * FANOUT,
            };
            hi = match right.bound_at(level) {
                Some(b) => b,
                None => (self.has_child.rank1(hi_prev) + 1) * FANOUT,
            };
            if level > 0 {
                // keys ending at nodes strictly inside the window
                let first = self.has_child.rank1(lo_prev);
                let last = self.has_child.rank1(hi_prev);
                if last > first {
                    count += (self.prefix_key.rank1(last + 1) - self.prefix_key.rank1(first + 1))
                        as u64;
                }
            }
            if hi > lo {
                let leaves = (self.labels.rank1(hi) - self.labels.rank1(lo))
                    - (self.has_child.rank1(hi) - self.has_child.rank1(lo));
                count += leaves as u64;
            }
            lo_prev = lo;
            hi_prev = hi;
        }
        (count, self.has_child.rank1(lo), self.has_child.rank1(hi))
    }

    #[inline]
    fn child_node_num(&self, pos: usize) -> usize {
        self.has_child.rank1(pos + 1)
    }

    /// Index of the leaf's suffix: leaves before `pos` plus prefix keys
    /// of nodes up to and including this one.
    fn suffix_pos(&self, pos: usize, is_prefix_key: bool) -> usize {
        let node_num = pos / FANOUT;
        let mut suffix_pos = self.labels.rank1(pos + 1) - self.has_child.rank1(pos + 1)
            + self.prefix_key.rank1(node_num + 1)
            - 1;
        // a prefix key sorts before the node's label leaves
        if is_prefix_key && self.labels.get(pos) && !self.has_child.get(pos) {
            suffix_pos -= 1;
        }
        suffix_pos
    }

    fn compare_suffix_greater_than(
        &self,
        pos: usize,
        key: &[u8],
        level: usize,
        inclusive: bool,
        iter: &mut DenseIter<'_>,
    ) -> bool {
        let suffix_pos = self.suffix_pos(pos, false);
        let cmp = self.suffixes.compare(suffix_pos, key, level);
        if cmp != COULD_BE_POSITIVE && (cmp < 0 || (cmp == 0 && !inclusive)) {
            iter.next();
            return false;
        }
        iter.set_flags(true, true, true, true);
        cmp == COULD_BE_POSITIVE
    }

    pub(crate) fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.level_cuts.capacity() * 4
            + self.labels.heap_size()
            + self.has_child.heap_size()
            + self.prefix_key.heap_size()
            + self.suffixes.heap_size()
            + self.values.heap_size()
    }

    pub(crate) fn tally(&self, t: &mut SizeTally) {
        t.scalar32(1 + self.height);
        t.align8();
        self.labels.tally(t);
        self.has_child.tally(t);
        self.prefix_key.tally(t);
        self.suffixes.tally(t);
        self.values.tally(t);
        t.align8();
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.height as u32);
        w.put_u32_slice(&self.level_cuts);
        w.align8();
        self.labels.write(w);
        self.has_child.write(w);
        self.prefix_key.write(w);
        self.suffixes.write(w);
        self.values.write(w);
        w.align8();
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, FormatError> {
        let height = r.get_u32()? as usize;
        let level_cuts = r.get_u32_vec(height)?;
        r.align8()?;
        let labels = RankVector::read(r)?;
        let has_child = RankVector::read(r)?;
        let prefix_key = RankVector::read(r)?;
        let suffixes = SuffixVector::read_from(r)?;
        let values = ValueVector::read_from(r)?;
        r.align8()?;
        if labels.num_bits() != has_child.num_bits()
            || labels.num_bits() != prefix_key.num_bits() * FANOUT
        {
            return Err(FormatError::Invalid {
                what: "dense bitmap sizes",
            });
        }
        if !has_child.is_subset_of(&labels) {
            return Err(FormatError::Invalid {
                what: "dense child bitmap exceeds labels",
            });
        }
        if height > 0 {
            // every level boundary and interior child must map to a node
            let last_cut = *level_cuts.last().unwrap_or(&0) as usize;
            if last_cut + 1 != labels.num_bits() {
                return Err(FormatError::Invalid {
                    what: "dense level cuts",
                });
            }
            let interior_children = if height >= 2 {
                has_child.rank1(level_cuts[height - 2] as usize + 1)
            } else {
                0
            };
            if interior_children + 1 != prefix_key.num_bits() {
                return Err(FormatError::Invalid {
                    what: "dense node count",
                });
            }
        } else if labels.num_bits() != 0 {
            return Err(FormatError::Invalid {
                what: "dense bitmap without levels",
            });
        }
        let leaves = labels.num_ones() - has_child.num_ones() + prefix_key.num_ones();
        if (suffixes.suffix_len() > 0 && suffixes.len() != leaves)
            || (!values.is_empty() && values.len() != leaves)
        {
            return Err(FormatError::Invalid {
                what: "dense leaf counts",
            });
        }
        Ok(LoudsDense {
            height,
            level_cuts,
            labels,
            has_child,
            prefix_key,
            suffixes,
            values,
        })
    }
}

/// Traversal state over the dense levels.
///
/// `key` and `pos_in_trie` are fixed-capacity buffers sized to the dense
/// height; movement never allocates.
pub(crate) struct DenseIter<'a> {
    trie: &'a LoudsDense,
    pub(crate) is_valid: bool,
    is_search_complete: bool,
    is_move_left_complete: bool,
    is_move_right_complete: bool,
    pub(crate) send_out_node_num: usize,
    pub(crate) key_len: usize,
    key: Vec<u8>,
    pub(crate) pos_in_trie: Vec<usize>,
    pub(crate) is_at_prefix_key: bool,
}

impl<'a> DenseIter<'a> {
    pub(crate) fn new(trie: &'a LoudsDense) -> Self {
        DenseIter {
            trie,
            is_valid: false,
            is_search_complete: false,
            is_move_left_complete: false,
            is_move_right_complete: false,
            send_out_node_num: 0,
            key_len: 0,
            key: vec![0; trie.height],
            pos_in_trie: vec![0; trie.height],
            is_at_prefix_key: false,
        }
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.is_valid
    }

    #[inline]
    pub(crate) fn is_search_complete(&self) -> bool {
        self.is_search_complete
    }

    #[inline]
    pub(crate) fn is_move_left_complete(&self) -> bool {
        self.is_move_left_complete
    }

    #[inline]
    pub(crate) fn is_move_right_complete(&self) -> bool {
        self.is_move_right_complete
    }

    /// Whether the operation finished inside the dense levels; when
    /// false, the sparse side must pick up at `send_out_node_num`.
    #[inline]
    pub(crate) fn is_complete(&self) -> bool {
        self.is_search_complete && self.is_move_left_complete && self.is_move_right_complete
    }

    /// Key bytes accumulated so far. A prefix-key landing excludes the
    /// marker position.
    pub(crate) fn key(&self) -> &[u8] {
        let len = if self.is_at_prefix_key {
            self.key_len.saturating_sub(1)
        } else {
            self.key_len
        };
        &self.key[..len]
    }

    fn set_to_first_label_in_root(&mut self) {
        if let Some(pos) = self.trie.labels.next_one(0) {
            self.key_len = 0;
            self.append(pos);
        } else {
            self.is_valid = false;
        }
    }

    fn set_to_last_label_in_root(&mut self) {
        if let Some(pos) = self.trie.labels.prev_one(FANOUT - 1) {
            self.key_len = 0;
            self.append(pos);
        } else {
            self.is_valid = false;
        }
    }

    /// Position at the smallest stored key, which may be the root's own
    /// (empty) key.
    pub(crate) fn move_to_first(&mut self) {
        self.set_to_first_label_in_root();
        if self.trie.prefix_key.num_bits() > 0 && self.trie.prefix_key.get(0) {
            self.is_at_prefix_key = true;
            return self.set_flags(true, true, true, true);
        }
        if self.key_len == 0 {
            self.is_valid = false;
            return;
        }
        self.move_to_leftmost_key();
    }

    /// Position at the largest stored key.
    pub(crate) fn move_to_last(&mut self) {
        self.set_to_last_label_in_root();
        if self.key_len == 0 {
            // no labels at all; the root may still hold the empty key
            if self.trie.prefix_key.num_bits() > 0 && self.trie.prefix_key.get(0) {
                self.is_at_prefix_key = true;
                return self.set_flags(true, true, true, true);
            }
            self.is_valid = false;
            return;
        }
        self.move_to_rightmost_key();
    }

    /// Descend along the smallest labels until a leaf or the sparse
    /// boundary is reached.
    pub(crate) fn move_to_leftmost_key(&mut self) {
        debug_assert!(self.key_len > 0);
        loop {
            let level = self.key_len - 1;
            let pos = self.pos_in_trie[level];
            if !self.trie.has_child.get(pos) {
                return self.set_flags(true, true, true, true);
            }
            if level == self.trie.height - 1 {
                self.send_out_node_num = self.trie.child_node_num(pos);
                return self.set_flags(true, true, false, true);
            }
            let node_num = self.trie.child_node_num(pos);
            let node_base = node_num * FANOUT;
            if self.trie.prefix_key.get(node_num) {
                // the node's own key is the smallest below it
                match self.trie.labels.next_one(node_base) {
                    Some(first) => self.append(first),
                    None => {
                        self.is_valid = false;
                        return;
                    }
                }
                self.is_at_prefix_key = true;
                return self.set_flags(true, true, true, true);
            }
            match self.trie.labels.next_one(node_base) {
                Some(first) => self.append(first),
                None => {
                    self.is_valid = false;
                    return;
                }
            }
        }
    }

    /// Descend along the largest labels; prefix keys are never the
    /// largest key below a node.
    pub(crate) fn move_to_rightmost_key(&mut self) {
        debug_assert!(self.key_len > 0);
        loop {
            let level = self.key_len - 1;
            let pos = self.pos_in_trie[level];
            if !self.trie.has_child.get(pos) {
                return self.set_flags(true, true, true, true);
            }
            if level == self.trie.height - 1 {
                self.send_out_node_num = self.trie.child_node_num(pos);
                return self.set_flags(true, true, true, false);
            }
            let node_num = self.trie.child_node_num(pos);
            match self.trie.labels.prev_one(node_num * FANOUT + FANOUT - 1) {
                Some(last) if last >= node_num * FANOUT => self.append(last),
                _ => {
                    self.is_valid = false;
                    return;
                }
            }
        }
    }

    /// Advance to the next key in order.
    pub(crate) fn next(&mut self) {
        if self.key_len == 0 {
            self.is_valid = false;
            return;
        }
        if self.is_at_prefix_key {
            // the recorded position is the node's first label
            self.is_at_prefix_key = false;
            return self.move_to_leftmost_key();
        }
        let mut pos = self.pos_in_trie[self.key_len - 1];
        loop {
            match self.trie.labels.next_one(pos + 1) {
                Some(next) if next / FANOUT == pos / FANOUT => {
                    self.set(self.key_len - 1, next);
                    return self.move_to_leftmost_key();
                }
                _ => {
                    self.key_len -= 1;
                    if self.key_len == 0 {
                        self.is_valid = false;
                        return;
                    }
                    pos = self.pos_in_trie[self.key_len - 1];
                }
            }
        }
    }

    /// Step back to the previous key in order.
    pub(crate) fn prev(&mut self) {
        if self.key_len == 0 {
            self.is_valid = false;
            return;
        }
        if self.is_at_prefix_key {
            self.is_at_prefix_key = false;
            self.key_len -= 1;
            if self.key_len == 0 {
                self.is_valid = false;
                return;
            }
        }
        let mut pos = self.pos_in_trie[self.key_len - 1];
        loop {
            let prev = if pos % FANOUT == 0 {
                None
            } else {
                self.trie
                    .labels
                    .prev_one(pos - 1)
                    .filter(|p| p / FANOUT == pos / FANOUT)
            };
            match prev {
                Some(prev_pos) => {
                    self.set(self.key_len - 1, prev_pos);
                    return self.move_to_rightmost_key();
                }
                None => {
                    // crossed the node boundary; the node's own key
                    // precedes all of its labels
                    let node_num = pos / FANOUT;
                    if self.trie.prefix_key.get(node_num) {
                        self.is_at_prefix_key = true;
                        return self.set_flags(true, true, true, true);
                    }
                    self.key_len -= 1;
                    if self.key_len == 0 {
                        self.is_valid = false;
                        return;
                    }
                    pos = self.pos_in_trie[self.key_len - 1];
                }
            }
        }
    }

    /// Order the iterator position against `key`, returning zero when
    /// the dense prefix alone cannot decide and the walk continues in
    /// the sparse levels.
    pub(crate) fn compare(&self, key: &[u8]) -> i32 {
        if self.is_at_prefix_key && self.key_len.saturating_sub(1) < key.len() {
            return -1;
        }
        let iter_key = self.key();
        let shared = &key[..key.len().min(iter_key.len())];
        match iter_key.cmp(shared) {
            core::cmp::Ordering::Less => return -1,
            core::cmp::Ordering::Greater => return 1,
            core::cmp::Ordering::Equal => {}
        }
        if self.is_complete() {
            let suffix_pos = self.suffix_index();
            return self.trie.suffixes.compare(suffix_pos, key, self.key_len);
        }
        0
    }

    /// Suffix-store index of the leaf under the iterator.
    pub(crate) fn suffix_index(&self) -> usize {
        let pos = if self.key_len == 0 {
            0
        } else {
            self.pos_in_trie[self.key_len - 1]
        };
        self.trie.suffix_pos(pos, self.is_at_prefix_key)
    }

    /// Half-open counting bound at `level`, or `None` once the recorded
    /// path ends and the bound must be derived from the level above.
    fn bound_at(&self, level: usize) -> Option<usize> {
        if level >= self.key_len {
            return None;
        }
        if self.is_at_prefix_key && level == self.key_len - 1 {
            Some((self.pos_in_trie[level] / FANOUT) * FANOUT)
        } else {
            Some(self.pos_in_trie[level] + 1)
        }
    }

    #[inline]
    fn append(&mut self, pos: usize) {
        self.key[self.key_len] = (pos % FANOUT) as u8;
        self.pos_in_trie[self.key_len] = pos;
        self.key_len += 1;
    }

    #[inline]
    fn set(&mut self, level: usize, pos: usize) {
        self.key[level] = (pos % FANOUT) as u8;
        self.pos_in_trie[level] = pos;
        self.key_len = level + 1;
    }

    #[inline]
    fn set_flags(
        &mut self,
        is_valid: bool,
        is_search_complete: bool,
        is_move_left_complete: bool,
        is_move_right_complete: bool,
    ) {
        self.is_valid = is_valid;
        self.is_search_complete = is_search_complete;
        self.is_move_left_complete = is_move_left_complete;
        self.is_move_right_complete = is_move_right_complete;
    }
}
