//! Property tests for the filter invariants.

use std::collections::BTreeSet;

use proptest::prelude::*;
use surf_trie::{BuildOptions, Surf, SuffixType};

fn key_sets() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::btree_set(prop::collection::vec(any::<u8>(), 0..10), 1..80)
        .prop_map(|set: BTreeSet<Vec<u8>>| set.into_iter().collect())
}

fn suffix_configs() -> impl Strategy<Value = BuildOptions> {
    prop_oneof![
        Just(BuildOptions::default()),
        Just(BuildOptions::with_suffix(SuffixType::Hash, 8, 0)),
        Just(BuildOptions::with_suffix(SuffixType::Real, 0, 8)),
        Just(BuildOptions::with_suffix(SuffixType::Mixed, 4, 4)),
    ]
}

proptest! {
    /// Every built key is found again.
    #[test]
    fn prop_no_false_negatives(keys in key_sets(), opts in suffix_configs()) {
        let filter = Surf::build(&keys, opts).unwrap();
        for key in &keys {
            prop_assert!(filter.lookup_key(key), "lost {:?}", key);
        }
    }

    /// Decoding a serialized filter preserves membership and iteration.
    #[test]
    fn prop_serialization_roundtrip(keys in key_sets(), opts in suffix_configs()) {
        let filter = Surf::build(&keys, opts).unwrap();
        let bytes = filter.serialize();
        prop_assert_eq!(bytes.len(), filter.serialized_size());
        let decoded = Surf::deserialize(&bytes).unwrap();
        for key in &keys {
            prop_assert!(decoded.lookup_key(key));
        }

        let mut a = filter.move_to_first();
        let mut b = decoded.move_to_first();
        while a.is_valid() {
            prop_assert!(b.is_valid());
            prop_assert_eq!(a.key(), b.key());
            a.next();
            b.next();
        }
        prop_assert!(!b.is_valid());
    }

    /// Iteration visits one leaf per key, in order, each a prefix of
    /// its key.
    #[test]
    fn prop_iteration_order(keys in key_sets()) {
        let filter = Surf::build(&keys, BuildOptions::default()).unwrap();
        let mut iter = filter.move_to_first();
        let mut walked = Vec::new();
        while iter.is_valid() {
            walked.push(iter.key());
            iter.next();
        }
        prop_assert_eq!(walked.len(), keys.len());
        for (path, key) in walked.iter().zip(&keys) {
            prop_assert!(key.starts_with(path), "{:?} not a prefix of {:?}", path, key);
        }
        // paths themselves come out sorted
        let mut sorted = walked.clone();
        sorted.sort();
        prop_assert_eq!(&walked, &sorted);
    }

    /// Stepping forward then back (and back then forward) returns to
    /// the same position.
    #[test]
    fn prop_iterator_symmetry(keys in key_sets()) {
        let filter = Surf::build(&keys, BuildOptions::default()).unwrap();
        let mut iter = filter.move_to_first();
        while iter.is_valid() {
            let here = iter.key();
            if !iter.next() {
                break;
            }
            let there = iter.key();
            iter.prev();
            prop_assert_eq!(iter.key(), here.clone());
            iter.next();
            prop_assert_eq!(iter.key(), there);
        }
    }

    /// Range emptiness is never wrongly reported: whenever a stored key
    /// lies in [lo, hi], the filter answers true.
    #[test]
    fn prop_range_no_false_negatives(
        keys in key_sets(),
        lo in prop::collection::vec(any::<u8>(), 0..10),
        hi in prop::collection::vec(any::<u8>(), 0..10),
    ) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let filter = Surf::build(&keys, BuildOptions::with_suffix(SuffixType::Real, 0, 8)).unwrap();
        let contains = keys.iter().any(|k| *k >= lo && *k <= hi);
        if contains {
            prop_assert!(filter.lookup_range(&lo, true, &hi, true));
        }
    }

    /// The approximate count is within 2 of the true count when both
    /// boundaries are stored keys.
    #[test]
    fn prop_approx_count_bound(keys in key_sets(), a in any::<prop::sample::Index>(), b in any::<prop::sample::Index>()) {
        let filter = Surf::build(&keys, BuildOptions::default()).unwrap();
        let i = a.index(keys.len());
        let j = b.index(keys.len());
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        let truth = (j - i + 1) as u64;
        let approx = filter.approx_count(&keys[i], &keys[j]);
        prop_assert!(
            approx.abs_diff(truth) <= 2,
            "approx {} truth {} for [{:?}, {:?}]",
            approx,
            truth,
            keys[i],
            keys[j]
        );
    }
}
