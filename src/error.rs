//! Error types for building and decoding filters.
//!
//! Queries never fail: lookups return `bool` and iterator movement is
//! reported through `is_valid`. Only the builder and the on-disk decoder
//! can reject their input.

use core::fmt;

/// Errors reported while building a filter from a key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A key was smaller than its predecessor. The builder requires the
    /// input to be sorted; consecutive duplicates are tolerated and
    /// ignored.
    UnorderedKey {
        /// Index of the offending key in the input slice.
        index: usize,
    },
    /// The configured suffix width does not fit in a 64-bit word.
    SuffixTooLong {
        /// Requested hash plus real suffix bits.
        bits: u32,
    },
    /// A per-key suffix or value slice did not match the key count.
    LengthMismatch {
        keys: usize,
        provided: usize,
    },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnorderedKey { index } => {
                write!(f, "key at index {} is not in sorted order", index)
            }
            Self::SuffixTooLong { bits } => {
                write!(f, "suffix width of {} bits exceeds 64", bits)
            }
            Self::LengthMismatch { keys, provided } => {
                write!(
                    f,
                    "expected one entry per key ({}), got {}",
                    keys, provided
                )
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Errors reported while decoding a serialized filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The byte region ended before the structure it describes.
    Truncated {
        /// Bytes required by the next field.
        needed: usize,
        /// Bytes left in the region.
        available: usize,
    },
    /// A section did not start on an 8-byte boundary.
    Misaligned { offset: usize },
    /// The region does not start with the filter magic number.
    BadMagic { found: u64 },
    /// The format version is not understood by this crate.
    UnsupportedVersion { found: u32 },
    /// A field held a value inconsistent with the rest of the region.
    Invalid { what: &'static str },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(
                    f,
                    "truncated filter block: needed {} bytes, {} available",
                    needed, available
                )
            }
            Self::Misaligned { offset } => {
                write!(f, "section at offset {} is not 8-byte aligned", offset)
            }
            Self::BadMagic { found } => {
                write!(f, "bad magic number 0x{:016X}", found)
            }
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported format version {}", found)
            }
            Self::Invalid { what } => write!(f, "invalid field: {}", what),
        }
    }
}

impl std::error::Error for FormatError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = BuildError::UnorderedKey { index: 3 };
        assert_eq!(e.to_string(), "key at index 3 is not in sorted order");
        let e = FormatError::Truncated {
            needed: 16,
            available: 7,
        };
        assert!(e.to_string().contains("needed 16"));
    }
}
