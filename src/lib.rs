//! # surf-trie
//!
//! A Succinct Range Filter (SuRF): an immutable, ordered set of byte
//! keys with one-sided membership error, supporting point lookups,
//! range lookups, ordered iteration and approximate range counts.
//!
//! Keys live in a trie encoded on two tiers: the upper levels use one
//! 256-bit bitmap pair per node (LOUDS-dense), the lower levels use
//! parallel label/child/louds streams over existing edges only
//! (LOUDS-sparse). Rank and select directories make navigation constant
//! time per level. Optional per-leaf suffix bits trade space for a
//! lower false-positive rate, and an optional 64-bit value can ride
//! along with every key.
//!
//! ## Module Organization
//!
//! - [`bits`] - Bitvector family: rank, select, labels, suffixes
//! - [`binary`] - Byte-level encoding of the on-disk format
//! - [`host`] - Completion interface toward an embedding storage engine
//! - Crate root - [`Surf`], [`SurfIter`], [`BuildOptions`] and errors
//!
//! ## Quick Start
//!
//! ```
//! use surf_trie::{BuildOptions, Surf, SuffixType};
//!
//! let keys: Vec<&[u8]> = vec![b"apple", b"apply", b"approve"];
//! let opts = BuildOptions::with_suffix(SuffixType::Hash, 8, 0);
//! let filter = Surf::build(&keys, opts).unwrap();
//!
//! // no false negatives
//! assert!(filter.lookup_key(b"apply"));
//!
//! // ordered iteration over the stored paths
//! let mut iter = filter.move_to_first();
//! assert_eq!(iter.key(), b"apple");
//! iter.next();
//! assert_eq!(iter.key(), b"apply");
//!
//! // a serialized filter answers the same queries after decoding
//! let bytes = filter.serialize();
//! let decoded = Surf::deserialize(&bytes).unwrap();
//! assert!(decoded.lookup_key(b"approve"));
//! ```
//!
//! ## Features
//!
//! - `serde` - Serialize/Deserialize derives on the in-memory
//!   structures. The compact block format from [`Surf::serialize`]
//!   works without it.

pub mod binary;
pub mod bits;
pub mod host;

mod builder;
mod config;
mod dense;
mod error;
mod sparse;
mod surf;

pub(crate) mod util;

pub use config::{
    key_to_u64, u64_to_key, BuildOptions, FilterConfig, SuffixType, COULD_BE_POSITIVE,
    DEFAULT_HASH_SHIFT, DEFAULT_SPARSE_DENSE_RATIO, FANOUT, TERMINATOR, VALUE_WIDTH,
};
pub use error::{BuildError, FormatError};
pub use surf::{Surf, SurfIter, FORMAT_VERSION, MAGIC};
