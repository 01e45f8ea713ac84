//! Bitvector family backing the trie encodings.
//!
//! - [`BitVec`]: packed bits over `u64` words
//! - [`RankVector`]: adds a rank directory for O(1) `rank1`
//! - [`SelectVector`]: adds sampled positions for O(1) `select1`
//! - [`LabelVector`]: edge labels of the sparse encoding
//! - [`SuffixVector`] / [`ValueVector`]: packed per-leaf payloads

pub(crate) mod bitvec;
mod label;
mod rank;
mod select;
mod suffix;

pub use bitvec::BitVec;
pub use label::LabelVector;
pub use rank::RankVector;
pub use select::SelectVector;
pub use suffix::{SuffixVector, ValueVector};

pub(crate) use suffix::construct_suffix;
