//! Single-pass construction of the trie encodings from sorted keys.
//!
//! The builder streams the key set once. For every key it walks the
//! shared prefix with its predecessor, then appends labels until the key
//! is distinguishable from its successor; a key that is a proper prefix
//! of the next one ends in a [`TERMINATOR`] label. The per-level label,
//! child and louds streams are the sparse encoding; once the cutover
//! level is known the upper levels are re-expressed as per-node bitmaps
//! for the dense encoding.

use core::cmp::Ordering;

use crate::bits::bitvec::BitStream;
use crate::bits::construct_suffix;
use crate::config::{BuildOptions, SuffixType, FANOUT, TERMINATOR, VALUE_WIDTH};
use crate::error::BuildError;

pub(crate) struct Builder {
    include_dense: bool,
    sparse_dense_ratio: u32,
    suffix_type: SuffixType,
    hash_suffix_len: u32,
    real_suffix_len: u32,

    // sparse encoding, one entry per level
    labels: Vec<Vec<u8>>,
    child_indicator_bits: Vec<BitStream>,
    louds_bits: Vec<BitStream>,
    terminator_bits: Vec<BitStream>,

    suffixes: Vec<BitStream>,
    values: Vec<BitStream>,

    node_counts: Vec<usize>,
    is_last_item_terminator: Vec<bool>,

    // dense encoding of the levels above the cutover
    bitmap_labels: Vec<BitStream>,
    bitmap_child_indicator_bits: Vec<BitStream>,
    prefixkey_indicator_bits: Vec<BitStream>,

    sparse_start_level: usize,
    num_keys: usize,
}

impl Builder {
    pub(crate) fn new(opts: &BuildOptions) -> Self {
        // only the widths the suffix type actually uses are kept
        let (hash_len, real_len) = match opts.suffix_type {
            SuffixType::None => (0, 0),
            SuffixType::Hash => (opts.hash_suffix_len, 0),
            SuffixType::Real => (0, opts.real_suffix_len),
            SuffixType::Mixed => (opts.hash_suffix_len, opts.real_suffix_len),
        };
        Builder {
            include_dense: opts.include_dense,
            sparse_dense_ratio: opts.sparse_dense_ratio,
            suffix_type: opts.suffix_type,
            hash_suffix_len: hash_len,
            real_suffix_len: real_len,
            labels: Vec::new(),
            child_indicator_bits: Vec::new(),
            louds_bits: Vec::new(),
            terminator_bits: Vec::new(),
            suffixes: Vec::new(),
            values: Vec::new(),
            node_counts: Vec::new(),
            is_last_item_terminator: Vec::new(),
            bitmap_labels: Vec::new(),
            bitmap_child_indicator_bits: Vec::new(),
            prefixkey_indicator_bits: Vec::new(),
            sparse_start_level: 0,
            num_keys: 0,
        }
    }

    /// Consume the sorted key set and freeze the per-level streams.
    ///
    /// `ext_suffixes` and `ext_values`, when given, carry one word per
    /// input key; the low suffix-width bits of a provided word replace
    /// the bits otherwise derived from the key.
    pub(crate) fn build<K: AsRef<[u8]>>(
        &mut self,
        keys: &[K],
        ext_suffixes: Option<&[u64]>,
        ext_values: Option<&[u64]>,
    ) -> Result<(), BuildError> {
        let width = self.hash_suffix_len + self.real_suffix_len;
        if width > 64 {
            return Err(BuildError::SuffixTooLong { bits: width });
        }
        for ext in [ext_suffixes, ext_values].into_iter().flatten() {
            if ext.len() != keys.len() {
                return Err(BuildError::LengthMismatch {
                    keys: keys.len(),
                    provided: ext.len(),
                });
            }
        }

        let mut prev: Option<&[u8]> = None;
        for (i, entry) in keys.iter().enumerate() {
            let key = entry.as_ref();
            if let Some(p) = prev {
                match key.cmp(p) {
                    Ordering::Less => return Err(BuildError::UnorderedKey { index: i }),
                    Ordering::Equal => continue,
                    Ordering::Greater => {}
                }
            }
            let next_key = keys
                .get(i + 1)
                .map(|k| k.as_ref())
                .unwrap_or(&[]);
            let level = if key.is_empty() {
                // the empty key is the root's own key
                let start = self.is_level_empty(0);
                self.insert_key_byte(TERMINATOR, 0, start, true);
                1
            } else {
                let level = self.skip_common_prefix(key);
                self.insert_key_bytes_until_unique(key, next_key, level)
            };
            self.insert_suffix(key, level, ext_suffixes.map(|s| s[i]));
            if let Some(vals) = ext_values {
                self.values[level - 1].append_bits(vals[i], VALUE_WIDTH);
            }
            self.num_keys += 1;
            prev = Some(key);
        }

        self.determine_cutoff_level();
        self.build_dense();
        Ok(())
    }

    // ------------------------------------------------------------------
    // sparse construction
    // ------------------------------------------------------------------

    fn skip_common_prefix(&mut self, key: &[u8]) -> usize {
        let mut level = 0;
        while level < key.len() && self.is_char_common_prefix(key[level], level) {
            // the shared path continues one level deeper
            let pos = self.num_items(level) - 1;
            self.child_indicator_bits[level].set(pos);
            level += 1;
        }
        level
    }

    fn is_char_common_prefix(&self, c: u8, level: usize) -> bool {
        level < self.tree_height()
            && !self.is_last_item_terminator[level]
            && self.labels[level].last() == Some(&c)
    }

    fn insert_key_bytes_until_unique(
        &mut self,
        key: &[u8],
        next_key: &[u8],
        start_level: usize,
    ) -> usize {
        debug_assert!(start_level < key.len());
        let mut level = start_level;
        // the first diverging byte joins the previous key's node
        let is_start = self.is_level_empty(level);
        self.insert_key_byte(key[level], level, is_start, false);
        level += 1;
        if level > next_key.len() || key[..level] != next_key[..level] {
            return level;
        }
        // every byte still shared with the next key opens a new node
        while level < key.len() && level < next_key.len() && key[level] == next_key[level] {
            self.insert_key_byte(key[level], level, true, false);
            level += 1;
        }
        if level < key.len() {
            self.insert_key_byte(key[level], level, true, false);
        } else {
            self.insert_key_byte(TERMINATOR, level, true, true);
        }
        level + 1
    }

    fn insert_key_byte(&mut self, c: u8, level: usize, is_start_of_node: bool, is_term: bool) {
        self.ensure_level(level);
        if level > 0 {
            // the parent's most recent item gains a child
            let parent = self.num_items(level - 1) - 1;
            self.child_indicator_bits[level - 1].set(parent);
        }
        self.labels[level].push(c);
        self.child_indicator_bits[level].push(false);
        self.louds_bits[level].push(is_start_of_node);
        self.terminator_bits[level].push(is_term);
        if is_start_of_node {
            self.node_counts[level] += 1;
        }
        self.is_last_item_terminator[level] = is_term;
    }

    fn insert_suffix(&mut self, key: &[u8], level: usize, ext: Option<u64>) {
        let width = self.hash_suffix_len + self.real_suffix_len;
        let word = match ext {
            Some(w) => w,
            None => construct_suffix(
                self.suffix_type,
                key,
                level,
                self.hash_suffix_len,
                self.real_suffix_len,
            ),
        };
        self.suffixes[level - 1].append_bits(word, width);
    }

    fn ensure_level(&mut self, level: usize) {
        while self.tree_height() <= level {
            self.labels.push(Vec::new());
            self.child_indicator_bits.push(BitStream::new());
            self.louds_bits.push(BitStream::new());
            self.terminator_bits.push(BitStream::new());
            self.suffixes.push(BitStream::new());
            self.values.push(BitStream::new());
            self.node_counts.push(0);
            self.is_last_item_terminator.push(false);
        }
    }

    fn is_level_empty(&self, level: usize) -> bool {
        level >= self.tree_height() || self.labels[level].is_empty()
    }

    // ------------------------------------------------------------------
    // dense cutover and bitmap construction
    // ------------------------------------------------------------------

    fn determine_cutoff_level(&mut self) {
        if !self.include_dense {
            self.sparse_start_level = 0;
            return;
        }
        let height = self.tree_height();
        let mut cutoff = 0usize;
        let mut dense_bits = 0u64;
        let mut sparse_bits: u64 = (0..height).map(|l| self.sparse_level_bits(l)).sum();
        while cutoff < height && dense_bits * (self.sparse_dense_ratio as u64) < sparse_bits {
            dense_bits += self.dense_level_bits(cutoff);
            sparse_bits -= self.sparse_level_bits(cutoff);
            cutoff += 1;
        }
        self.sparse_start_level = cutoff;
    }

    fn dense_level_bits(&self, level: usize) -> u64 {
        // two bitmaps plus one prefix-key bit per node
        (self.node_counts[level] * (2 * FANOUT + 1)) as u64
    }

    fn sparse_level_bits(&self, level: usize) -> u64 {
        // a byte label plus the child and louds bits per item
        (self.labels[level].len() * 10) as u64
    }

    fn build_dense(&mut self) {
        for level in 0..self.sparse_start_level {
            let mut label_bitmap = BitStream::new();
            let mut child_bitmap = BitStream::new();
            let mut prefixkey_bits = BitStream::new();
            label_bitmap.resize(self.node_counts[level] * FANOUT);
            child_bitmap.resize(self.node_counts[level] * FANOUT);
            prefixkey_bits.resize(self.node_counts[level]);

            let mut node_num = 0usize;
            for pos in 0..self.num_items(level) {
                if pos > 0 && self.louds_bits[level].get(pos) {
                    node_num += 1;
                }
                if self.terminator_bits[level].get(pos) {
                    prefixkey_bits.set(node_num);
                    continue;
                }
                let offset = node_num * FANOUT + self.labels[level][pos] as usize;
                label_bitmap.set(offset);
                if self.child_indicator_bits[level].get(pos) {
                    child_bitmap.set(offset);
                }
            }

            self.bitmap_labels.push(label_bitmap);
            self.bitmap_child_indicator_bits.push(child_bitmap);
            self.prefixkey_indicator_bits.push(prefixkey_bits);
        }
    }

    // ------------------------------------------------------------------
    // accessors for the tier constructors
    // ------------------------------------------------------------------

    pub(crate) fn tree_height(&self) -> usize {
        self.labels.len()
    }

    pub(crate) fn sparse_start_level(&self) -> usize {
        self.sparse_start_level
    }

    pub(crate) fn num_items(&self, level: usize) -> usize {
        self.labels[level].len()
    }

    pub(crate) fn num_keys(&self) -> usize {
        self.num_keys
    }

    pub(crate) fn node_counts(&self) -> &[usize] {
        &self.node_counts
    }

    pub(crate) fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    pub(crate) fn child_indicator_bits(&self) -> &[BitStream] {
        &self.child_indicator_bits
    }

    pub(crate) fn louds_bits(&self) -> &[BitStream] {
        &self.louds_bits
    }

    pub(crate) fn bitmap_labels(&self) -> &[BitStream] {
        &self.bitmap_labels
    }

    pub(crate) fn bitmap_child_indicator_bits(&self) -> &[BitStream] {
        &self.bitmap_child_indicator_bits
    }

    pub(crate) fn prefixkey_indicator_bits(&self) -> &[BitStream] {
        &self.prefixkey_indicator_bits
    }

    pub(crate) fn suffixes(&self) -> &[BitStream] {
        &self.suffixes
    }

    pub(crate) fn values(&self) -> &[BitStream] {
        &self.values
    }

    pub(crate) fn suffix_type(&self) -> SuffixType {
        self.suffix_type
    }

    pub(crate) fn hash_suffix_len(&self) -> u32 {
        self.hash_suffix_len
    }

    pub(crate) fn real_suffix_len(&self) -> u32 {
        self.real_suffix_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper_keys() -> Vec<&'static [u8]> {
        vec![
            b"f", b"far", b"fas", b"fast", b"fat", b"s", b"to", b"toy", b"trie", b"trip", b"try",
        ]
    }

    fn built(keys: &[&[u8]], opts: BuildOptions) -> Builder {
        let mut b = Builder::new(&opts);
        b.build(keys, None, None).unwrap();
        b
    }

    #[test]
    fn test_level_streams() {
        let b = built(&paper_keys(), BuildOptions::default());
        assert_eq!(b.tree_height(), 4);
        assert_eq!(b.node_counts(), &[1, 2, 3, 2]);

        assert_eq!(b.labels()[0], b"fst");
        assert_eq!(b.labels()[1], &[TERMINATOR, b'a', b'o', b'r']);
        assert_eq!(
            b.labels()[2],
            &[b'r', b's', b't', TERMINATOR, b'y', b'i', b'y']
        );
        assert_eq!(b.labels()[3], &[TERMINATOR, b't', b'e', b'p']);

        let louds2: Vec<bool> = (0..7).map(|i| b.louds_bits()[2].get(i)).collect();
        assert_eq!(louds2, [true, false, false, true, false, true, false]);

        let child0: Vec<bool> = (0..3).map(|i| b.child_indicator_bits()[0].get(i)).collect();
        assert_eq!(child0, [true, false, true]);
        let child2: Vec<bool> = (0..7).map(|i| b.child_indicator_bits()[2].get(i)).collect();
        assert_eq!(
            child2,
            [false, true, false, false, false, true, false]
        );
    }

    #[test]
    fn test_key_count_matches_leaves() {
        let b = built(&paper_keys(), BuildOptions::default());
        let mut leaves = 0;
        for level in 0..b.tree_height() {
            for pos in 0..b.num_items(level) {
                if !b.child_indicator_bits()[level].get(pos) {
                    leaves += 1;
                }
            }
        }
        assert_eq!(leaves, paper_keys().len());
        assert_eq!(b.num_keys(), paper_keys().len());
    }

    #[test]
    fn test_rejects_unsorted() {
        let mut b = Builder::new(&BuildOptions::default());
        let err = b.build(&[b"b".as_slice(), b"a"], None, None).unwrap_err();
        assert_eq!(err, BuildError::UnorderedKey { index: 1 });
    }

    #[test]
    fn test_ignores_duplicates() {
        let mut b = Builder::new(&BuildOptions::default());
        b.build(&[b"aa".as_slice(), b"aa", b"ab"], None, None).unwrap();
        assert_eq!(b.num_keys(), 2);
        assert_eq!(b.labels()[1], b"ab");
    }

    #[test]
    fn test_empty_input() {
        let mut b = Builder::new(&BuildOptions::default());
        b.build::<&[u8]>(&[], None, None).unwrap();
        assert_eq!(b.tree_height(), 0);
        assert_eq!(b.num_keys(), 0);
    }

    #[test]
    fn test_dense_bitmaps() {
        let mut opts = BuildOptions::default();
        opts.sparse_dense_ratio = 1_000_000; // dense pays off for the root only
        let b = built(&paper_keys(), opts);
        assert_eq!(b.sparse_start_level(), 1);

        let mut opts = BuildOptions::default();
        opts.sparse_dense_ratio = 0; // promote every level
        let b = built(&paper_keys(), opts);
        assert_eq!(b.sparse_start_level(), 4);

        // root bitmap has exactly f, s, t
        let bm = &b.bitmap_labels()[0];
        for c in 0..FANOUT {
            let expect = c == b'f' as usize || c == b's' as usize || c == b't' as usize;
            assert_eq!(bm.get(c), expect, "label {}", c);
        }
        // prefix keys at level 1 ("f") and level 2 ("to")
        assert!(b.prefixkey_indicator_bits()[1].get(0));
        assert!(b.prefixkey_indicator_bits()[2].get(1));

        // terminator labels never leak into the bitmaps
        for level in 0..4 {
            let bm = &b.bitmap_labels()[level];
            for node in 0..b.node_counts()[level] {
                if level == 3 {
                    assert!(!bm.get(node * FANOUT + TERMINATOR as usize));
                }
            }
        }
    }

    #[test]
    fn test_cutoff_balances_sizes() {
        // a single deep chain is cheap in sparse form, so a high ratio
        // still promotes it fully while ratio zero keeps it sparse
        let key = vec![b'x'; 40];
        let keys: Vec<&[u8]> = vec![&key];
        let b = built(&keys, BuildOptions::default());
        assert!(b.sparse_start_level() <= b.tree_height());
    }

    #[test]
    fn test_suffix_stream_widths() {
        let opts = BuildOptions::with_suffix(SuffixType::Mixed, 4, 4);
        let b = built(&paper_keys(), opts);
        let total_bits: usize = b.suffixes().iter().map(|s| s.len()).sum();
        assert_eq!(total_bits, paper_keys().len() * 8);
    }

    #[test]
    fn test_external_values() {
        let keys: Vec<&[u8]> = vec![b"aa", b"ab", b"b"];
        let vals = vec![10u64, 20, 30];
        let mut b = Builder::new(&BuildOptions::default());
        b.build(&keys, None, Some(&vals)).unwrap();
        let total_bits: usize = b.values().iter().map(|s| s.len()).sum();
        assert_eq!(total_bits, 3 * 64);
    }

    #[test]
    fn test_length_mismatch() {
        let keys: Vec<&[u8]> = vec![b"aa", b"ab"];
        let vals = vec![1u64];
        let mut b = Builder::new(&BuildOptions::default());
        assert!(matches!(
            b.build(&keys, None, Some(&vals)),
            Err(BuildError::LengthMismatch { .. })
        ));
    }
}
