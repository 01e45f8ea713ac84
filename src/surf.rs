//! The filter facade: builds, queries and splices the two trie tiers.
//!
//! A query walks the dense levels first; the dense side either resolves
//! it or hands a node number across the cutover for the sparse side to
//! finish. Iterators pair one cursor per tier and keep the hand-off
//! state in the dense cursor's completion flags.

use crate::binary::{ByteReader, ByteWriter, SizeTally};
use crate::builder::Builder;
use crate::config::{
    BuildOptions, FilterConfig, SuffixType, COULD_BE_POSITIVE, DEFAULT_HASH_SHIFT,
};
use crate::dense::{DenseIter, DenseLookup, LoudsDense};
use crate::error::{BuildError, FormatError};
use crate::sparse::{LoudsSparse, SparseIter};

/// Magic number opening every serialized filter block.
pub const MAGIC: u64 = 0x5375_5246_5472_6965; // "SuRFTrie"

/// On-disk format version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// An immutable, succinct, ordered set of byte keys with one-sided
/// membership error.
///
/// Built once from a sorted key set, then read-only; shared references
/// may be used from any number of threads. Lookups may report a key
/// that was never inserted (bounded by the suffix configuration), but
/// never miss a key that was.
///
/// # Example
///
/// ```
/// use surf_trie::{BuildOptions, Surf, SuffixType};
///
/// let keys: Vec<&[u8]> = vec![b"apple", b"banana", b"cherry"];
/// let opts = BuildOptions::with_suffix(SuffixType::Real, 0, 8);
/// let filter = Surf::build(&keys, opts).unwrap();
///
/// assert!(filter.lookup_key(b"banana"));
/// assert!(!filter.lookup_key(b"grape"));
/// assert!(filter.lookup_range(b"ba", true, b"bb", true));
/// ```
#[derive(Debug)]
pub struct Surf {
    config: FilterConfig,
    dense: LoudsDense,
    sparse: LoudsSparse,
}

impl Surf {
    /// Build a filter from sorted keys. Consecutive duplicates are
    /// ignored; an out-of-order key fails the build.
    pub fn build<K: AsRef<[u8]>>(keys: &[K], opts: BuildOptions) -> Result<Surf, BuildError> {
        Self::build_full(keys, None, None, opts)
    }

    /// Build a filter carrying one 64-bit value per key.
    pub fn build_with_values<K: AsRef<[u8]>>(
        keys: &[K],
        values: &[u64],
        opts: BuildOptions,
    ) -> Result<Surf, BuildError> {
        Self::build_full(keys, None, Some(values), opts)
    }

    /// Build with caller-supplied suffix words and/or values, one per
    /// key. Provided suffix words replace the bits the builder would
    /// otherwise derive from the key; queries must then be resolved by
    /// the same provider for hash modes to be meaningful.
    pub fn build_full<K: AsRef<[u8]>>(
        keys: &[K],
        suffixes: Option<&[u64]>,
        values: Option<&[u64]>,
        opts: BuildOptions,
    ) -> Result<Surf, BuildError> {
        let mut builder = Builder::new(&opts);
        builder.build(keys, suffixes, values)?;
        let dense = LoudsDense::from_builder(&builder);
        let sparse = LoudsSparse::from_builder(&builder);
        Ok(Surf {
            config: FilterConfig::from_options(&opts, values.is_some()),
            dense,
            sparse,
        })
    }

    /// Whether `key` may be in the set. `false` is definitive.
    pub fn lookup_key(&self, key: impl AsRef<[u8]>) -> bool {
        let key = key.as_ref();
        match self.dense.lookup_key(key) {
            DenseLookup::Miss => false,
            DenseLookup::Hit => true,
            DenseLookup::Continue(node_num) => self.sparse.lookup_key(key, node_num),
        }
    }

    /// Whether some key in `[left, right]` (bounds included per flag)
    /// may be in the set. `false` is definitive.
    pub fn lookup_range(
        &self,
        left_key: impl AsRef<[u8]>,
        left_inclusive: bool,
        right_key: impl AsRef<[u8]>,
        right_inclusive: bool,
    ) -> bool {
        let iter = self.move_to_key_greater_than(left_key, left_inclusive);
        if !iter.is_valid() {
            return false;
        }
        let cmp = iter.compare(right_key.as_ref());
        if cmp == COULD_BE_POSITIVE {
            return true;
        }
        if right_inclusive {
            cmp <= 0
        } else {
            cmp < 0
        }
    }

    /// Iterator at the smallest stored key not less than `key` (or
    /// strictly greater when `inclusive` is false). When the suffix
    /// configuration cannot prove an exact match the iterator stays at
    /// the candidate and reports [`SurfIter::could_be_fp`].
    pub fn move_to_key_greater_than(
        &self,
        key: impl AsRef<[u8]>,
        inclusive: bool,
    ) -> SurfIter<'_> {
        let key = key.as_ref();
        let mut iter = SurfIter::new(self);
        if self.dense.height() == 0 {
            iter.could_be_fp = self
                .sparse
                .move_to_key_greater_than(key, inclusive, &mut iter.sparse);
            return iter;
        }
        iter.could_be_fp = self
            .dense
            .move_to_key_greater_than(key, inclusive, &mut iter.dense);
        if !iter.dense.is_valid() || iter.dense.is_complete() {
            return iter;
        }
        if !iter.dense.is_search_complete() {
            iter.pass_to_sparse();
            iter.could_be_fp = self
                .sparse
                .move_to_key_greater_than(key, inclusive, &mut iter.sparse);
            if !iter.sparse.is_valid() {
                iter.increment_dense();
            }
        } else if !iter.dense.is_move_left_complete() {
            iter.pass_to_sparse();
            iter.sparse.move_to_leftmost_key();
        }
        iter
    }

    /// Iterator at the largest stored key not greater than `key` (or
    /// strictly less when `inclusive` is false).
    pub fn move_to_key_less_than(&self, key: impl AsRef<[u8]>, inclusive: bool) -> SurfIter<'_> {
        let key = key.as_ref();
        let mut iter = self.move_to_key_greater_than(key, false);
        if !iter.is_valid() {
            return self.move_to_last();
        }
        if !iter.could_be_fp() {
            iter.prev();
            if !inclusive && iter.is_valid() && iter.compare(key) == 0 {
                iter.prev();
            }
        }
        iter
    }

    /// Iterator at the smallest stored key.
    pub fn move_to_first(&self) -> SurfIter<'_> {
        let mut iter = SurfIter::new(self);
        if self.dense.height() > 0 {
            iter.dense.move_to_first();
            if !iter.dense.is_valid() || iter.dense.is_move_left_complete() {
                return iter;
            }
            iter.pass_to_sparse();
            iter.sparse.move_to_leftmost_key();
        } else {
            iter.sparse.move_to_leftmost_key();
        }
        iter
    }

    /// Iterator at the largest stored key.
    pub fn move_to_last(&self) -> SurfIter<'_> {
        let mut iter = SurfIter::new(self);
        if self.dense.height() > 0 {
            iter.dense.move_to_last();
            if !iter.dense.is_valid() || iter.dense.is_move_right_complete() {
                return iter;
            }
            iter.pass_to_sparse();
            iter.sparse.move_to_rightmost_key();
        } else {
            iter.sparse.move_to_rightmost_key();
        }
        iter
    }

    /// Approximate count of stored keys in `[left_key, right_key]`,
    /// exact except at the two boundary leaves.
    pub fn approx_count(
        &self,
        left_key: impl AsRef<[u8]>,
        right_key: impl AsRef<[u8]>,
    ) -> u64 {
        let left = self.move_to_key_greater_than(left_key, true);
        if !left.is_valid() {
            return 0;
        }
        let mut right = self.move_to_key_greater_than(right_key, true);
        if !right.is_valid() {
            right = self.move_to_last();
            if !right.is_valid() {
                return 0;
            }
        }
        self.approx_count_iters(&left, &right)
    }

    /// Approximate count of stored keys between two iterator positions,
    /// both included.
    pub fn approx_count_iters(&self, left: &SurfIter<'_>, right: &SurfIter<'_>) -> u64 {
        if !left.is_valid() || !right.is_valid() {
            return 0;
        }
        let (dense_count, left_out, right_out) = self.dense.approx_count(&left.dense, &right.dense);
        let sparse_count = self
            .sparse
            .approx_count(&left.sparse, &right.sparse, left_out, right_out);
        // the strictly-between sum plus the left boundary key itself
        dense_count + sparse_count + 1
    }

    /// Number of bytes [`serialize`](Self::serialize) will produce.
    pub fn serialized_size(&self) -> usize {
        let mut t = SizeTally::new();
        t.scalar64(1);
        t.scalar32(9);
        t.align8();
        self.dense.tally(&mut t);
        self.sparse.tally(&mut t);
        t.total()
    }

    /// Encode the filter into a self-describing byte block.
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u64(MAGIC);
        w.put_u32(FORMAT_VERSION);
        w.put_u32(self.config.include_dense as u32);
        w.put_u32(self.config.sparse_dense_ratio);
        w.put_u32(self.config.suffix_type.to_u32());
        w.put_u32(self.config.hash_suffix_len);
        w.put_u32(self.config.real_suffix_len);
        w.put_u32(self.config.hash_shift);
        w.put_u32(self.config.could_be_positive as u32);
        w.put_u32(self.config.has_values as u32);
        w.align8();
        self.dense.write(&mut w);
        self.sparse.write(&mut w);
        let bytes = w.into_bytes();
        debug_assert_eq!(bytes.len(), self.serialized_size());
        bytes
    }

    /// Decode a filter from a byte block produced by
    /// [`serialize`](Self::serialize). The decoded filter owns its
    /// storage; the input region may be dropped afterwards.
    pub fn deserialize(bytes: &[u8]) -> Result<Surf, FormatError> {
        let mut r = ByteReader::new(bytes);
        let magic = r.get_u64()?;
        if magic != MAGIC {
            return Err(FormatError::BadMagic { found: magic });
        }
        let version = r.get_u32()?;
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion { found: version });
        }
        let include_dense = r.get_u32()? != 0;
        let sparse_dense_ratio = r.get_u32()?;
        let suffix_type = SuffixType::from_u32(r.get_u32()?).ok_or(FormatError::Invalid {
            what: "suffix type tag",
        })?;
        let hash_suffix_len = r.get_u32()?;
        let real_suffix_len = r.get_u32()?;
        let hash_shift = r.get_u32()?;
        if hash_shift != DEFAULT_HASH_SHIFT {
            return Err(FormatError::Invalid {
                what: "hash shift",
            });
        }
        let could_be_positive = r.get_u32()? as i32;
        let has_values = r.get_u32()? != 0;
        r.align8()?;
        let dense = LoudsDense::read(&mut r)?;
        let sparse = LoudsSparse::read(&mut r)?;
        r.finish()?;
        // the two tiers must agree on the cutover bookkeeping
        if sparse.start_level() != dense.height()
            || sparse.node_count_dense() != dense.node_count()
            || sparse.child_count_dense() != dense.child_count()
            || sparse.height() < sparse.start_level()
        {
            return Err(FormatError::Invalid {
                what: "tier boundary mismatch",
            });
        }
        Ok(Surf {
            config: FilterConfig {
                include_dense,
                sparse_dense_ratio,
                suffix_type,
                hash_suffix_len,
                real_suffix_len,
                hash_shift,
                could_be_positive,
                has_values,
            },
            dense,
            sparse,
        })
    }

    /// Resolved build configuration carried by the filter.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Trie height in levels.
    pub fn height(&self) -> usize {
        self.sparse.height()
    }

    /// First level held in the sparse encoding.
    pub fn sparse_start_level(&self) -> usize {
        self.sparse.start_level()
    }

    /// Approximate resident memory in bytes.
    pub fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>() + self.dense.memory_usage() + self.sparse.memory_usage()
    }
}

/// Ordered cursor over the stored keys.
///
/// Obtained from the `move_to_*` methods on [`Surf`]. An invalid
/// iterator means the requested position is past either end.
pub struct SurfIter<'a> {
    surf: &'a Surf,
    dense: DenseIter<'a>,
    sparse: SparseIter<'a>,
    could_be_fp: bool,
}

impl<'a> SurfIter<'a> {
    fn new(surf: &'a Surf) -> Self {
        SurfIter {
            surf,
            dense: DenseIter::new(&surf.dense),
            sparse: SparseIter::new(&surf.sparse),
            could_be_fp: false,
        }
    }

    /// Whether the iterator points at a stored key.
    pub fn is_valid(&self) -> bool {
        if self.surf.dense.height() == 0 {
            return self.sparse.is_valid();
        }
        self.dense.is_valid() && (self.dense.is_complete() || self.sparse.is_valid())
    }

    /// Whether the position was reached through a hash suffix that
    /// could not rule out a false positive.
    pub fn could_be_fp(&self) -> bool {
        self.could_be_fp
    }

    /// The key under the iterator. Empty when invalid.
    pub fn key(&self) -> Vec<u8> {
        if !self.is_valid() {
            return Vec::new();
        }
        if self.surf.dense.height() == 0 {
            return self.sparse.key().to_vec();
        }
        let mut key = self.dense.key().to_vec();
        if !self.dense.is_complete() {
            key.extend_from_slice(self.sparse.key());
        }
        key
    }

    /// Order the iterator position against `key`, with
    /// [`COULD_BE_POSITIVE`] when a hash suffix cannot decide or the
    /// iterator is invalid.
    pub fn compare(&self, key: &[u8]) -> i32 {
        if !self.is_valid() {
            return COULD_BE_POSITIVE;
        }
        if self.surf.dense.height() == 0 {
            return self.sparse.compare(key);
        }
        let cmp = self.dense.compare(key);
        if self.dense.is_complete() || cmp != 0 {
            return cmp;
        }
        self.sparse.compare(key)
    }

    /// Stored suffix bits and their width at the current position.
    pub fn suffix(&self) -> (u64, u32) {
        if !self.is_valid() {
            return (0, 0);
        }
        if self.at_dense_leaf() {
            let store = self.surf.dense.suffixes();
            (store.read(self.dense.suffix_index()), store.suffix_len())
        } else {
            let store = self.surf.sparse.suffixes();
            (store.read(self.sparse.suffix_index()), store.suffix_len())
        }
    }

    /// Stored value at the current position, when the filter carries
    /// values.
    pub fn value(&self) -> Option<u64> {
        if !self.is_valid() || !self.surf.config.has_values {
            return None;
        }
        if self.at_dense_leaf() {
            Some(self.surf.dense.values().read(self.dense.suffix_index()))
        } else {
            Some(self.surf.sparse.values().read(self.sparse.suffix_index()))
        }
    }

    /// The key extended by its stored real-suffix bits, plus the total
    /// length in bits.
    pub fn key_with_suffix(&self) -> (Vec<u8>, u32) {
        let mut key = self.key();
        let mut bit_len = key.len() as u32 * 8;
        if !self.is_valid() {
            return (key, bit_len);
        }
        let (bits, len) = if self.at_dense_leaf() {
            self.surf.dense.suffixes().real_suffix(self.dense.suffix_index())
        } else {
            self.surf
                .sparse
                .suffixes()
                .real_suffix(self.sparse.suffix_index())
        };
        let mut remaining = len;
        while remaining >= 8 {
            key.push(((bits >> (remaining - 8)) & 0xFF) as u8);
            remaining -= 8;
        }
        if remaining > 0 {
            key.push(((bits << (8 - remaining)) & 0xFF) as u8);
        }
        bit_len += len;
        (key, bit_len)
    }

    /// Advance to the next key in order. Returns whether the iterator
    /// is still valid.
    pub fn next(&mut self) -> bool {
        if !self.is_valid() {
            return false;
        }
        if self.increment_sparse() {
            return true;
        }
        self.increment_dense();
        self.is_valid()
    }

    /// Step back to the previous key in order. Returns whether the
    /// iterator is still valid.
    pub fn prev(&mut self) -> bool {
        if !self.is_valid() {
            return false;
        }
        if self.decrement_sparse() {
            return true;
        }
        self.decrement_dense();
        self.is_valid()
    }

    fn at_dense_leaf(&self) -> bool {
        self.surf.dense.height() > 0 && self.dense.is_complete()
    }

    fn pass_to_sparse(&mut self) {
        let node_num = self.dense.send_out_node_num;
        self.sparse.clear();
        self.sparse.set_start_node_num(node_num);
    }

    fn increment_sparse(&mut self) -> bool {
        if !self.sparse.is_valid() {
            return false;
        }
        self.sparse.next();
        self.sparse.is_valid()
    }

    fn increment_dense(&mut self) {
        if !self.dense.is_valid() {
            return;
        }
        self.dense.next();
        if !self.dense.is_valid() || self.dense.is_move_left_complete() {
            return;
        }
        self.pass_to_sparse();
        self.sparse.move_to_leftmost_key();
    }

    fn decrement_sparse(&mut self) -> bool {
        if !self.sparse.is_valid() {
            return false;
        }
        self.sparse.prev();
        self.sparse.is_valid()
    }

    fn decrement_dense(&mut self) {
        if !self.dense.is_valid() {
            return;
        }
        self.dense.prev();
        if !self.dense.is_valid() || self.dense.is_move_right_complete() {
            return;
        }
        self.pass_to_sparse();
        self.sparse.move_to_rightmost_key();
    }
}
