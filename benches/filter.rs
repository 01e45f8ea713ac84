//! Benchmarks for build, point lookups and range queries.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use surf_trie::{u64_to_key, BuildOptions, Surf, SuffixType};

fn sorted_random_keys(n: usize, seed: u64) -> Vec<[u8; 8]> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut words: Vec<u64> = (0..n).map(|_| rng.gen()).collect();
    words.sort_unstable();
    words.dedup();
    words.into_iter().map(u64_to_key).collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for n in [10_000, 100_000] {
        let keys = sorted_random_keys(n, 42);
        group.bench_with_input(BenchmarkId::from_parameter(n), &keys, |b, keys| {
            b.iter(|| {
                Surf::build(
                    black_box(keys),
                    BuildOptions::with_suffix(SuffixType::Hash, 8, 0),
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let keys = sorted_random_keys(100_000, 42);
    let filter = Surf::build(&keys, BuildOptions::with_suffix(SuffixType::Hash, 8, 0)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let misses: Vec<[u8; 8]> = (0..1024).map(|_| u64_to_key(rng.gen())).collect();

    let mut group = c.benchmark_group("lookup");
    group.bench_function("hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 997) % keys.len();
            black_box(filter.lookup_key(black_box(keys[i])))
        })
    });
    group.bench_function("miss", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % misses.len();
            black_box(filter.lookup_key(black_box(misses[i])))
        })
    });
    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let keys = sorted_random_keys(100_000, 42);
    let filter = Surf::build(&keys, BuildOptions::with_suffix(SuffixType::Real, 0, 8)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let ranges: Vec<([u8; 8], [u8; 8])> = (0..1024)
        .map(|_| {
            let lo: u64 = rng.gen();
            let hi = lo.saturating_add(1 << 48);
            (u64_to_key(lo), u64_to_key(hi))
        })
        .collect();

    let mut group = c.benchmark_group("range");
    group.bench_function("lookup_range", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % ranges.len();
            let (lo, hi) = &ranges[i];
            black_box(filter.lookup_range(black_box(lo), true, black_box(hi), true))
        })
    });
    group.bench_function("approx_count", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % ranges.len();
            let (lo, hi) = &ranges[i];
            black_box(filter.approx_count(black_box(lo), black_box(hi)))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_lookup, bench_range);
criterion_main!(benches);
