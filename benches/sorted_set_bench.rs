use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;
use zset_engine::SortedSet;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn name(n: u64) -> Vec<u8> {
    format!("m{:016x}", n).into_bytes()
}

fn score(n: u64) -> f64 {
    (n >> 40) as f64
}

fn populated(seed: u64, n: usize) -> (SortedSet, Vec<Vec<u8>>) {
    let mut z = SortedSet::new();
    let names: Vec<_> = lcg(seed).take(n).map(name).collect();
    for (x, nm) in lcg(seed).zip(&names) {
        z.add(nm, score(x)).unwrap();
    }
    (z, names)
}

// Precompute 10k random picks from `names` using a second LCG.
fn picks(names: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let n = names.len();
    let mut s = 0x9e3779b97f4a7c15u64;
    (0..10_000)
        .map(|_| {
            s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
            names[(s as usize) % n].clone()
        })
        .collect()
}

fn bench_add_fresh_100k(c: &mut Criterion) {
    c.bench_function("zset::add_fresh_100k", |b| {
        b.iter_batched(
            SortedSet::new,
            |mut z| {
                for x in lcg(1).take(100_000) {
                    let _ = z.add(&name(x), score(x)).unwrap();
                }
                black_box(z)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_update_scores_10k(c: &mut Criterion) {
    c.bench_function("zset::update_scores_10k_of_100k", |b| {
        b.iter_batched(
            || {
                let (z, names) = populated(2, 100_000);
                let targets = picks(&names);
                (z, targets)
            },
            |(mut z, targets)| {
                for (i, nm) in targets.iter().enumerate() {
                    let _ = z.add(nm, i as f64).unwrap();
                }
                black_box(z)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_lookup_hit_10k(c: &mut Criterion) {
    c.bench_function("zset::lookup_hit_10k_on_100k", |b| {
        let (mut z, names) = populated(7, 100_000);
        let queries = picks(&names);
        b.iter(|| {
            for q in &queries {
                black_box(z.lookup(q).map(|m| m.score()));
            }
        })
    });
}

fn bench_rank_10k(c: &mut Criterion) {
    c.bench_function("zset::rank_10k_on_100k", |b| {
        let (mut z, names) = populated(11, 100_000);
        let queries = picks(&names);
        b.iter(|| {
            for q in &queries {
                black_box(z.rank(q));
            }
        })
    });
}

fn bench_query_and_range(c: &mut Criterion) {
    let (z, _) = populated(13, 100_000);
    c.bench_function("zset::query_offset_10k_on_100k", |b| {
        let mut s = lcg(0xdead_beef);
        b.iter(|| {
            for _ in 0..10_000 {
                let x = s.next().unwrap();
                black_box(z.query(score(x), b"", (x % 64) as i64 - 32));
            }
        })
    });

    c.bench_function("zset::range_100_x_1k_on_100k", |b| {
        let mut s = lcg(0xfeed);
        b.iter(|| {
            for _ in 0..1_000 {
                let x = s.next().unwrap();
                let total: f64 = z.range(score(x), b"", 0, 100).map(|m| m.score()).sum();
                black_box(total);
            }
        })
    });

    c.bench_function("zset::count_10k_on_100k", |b| {
        let mut s = lcg(0xc0ffee);
        b.iter(|| {
            for _ in 0..10_000 {
                let x = s.next().unwrap() >> 40;
                black_box(z.count(x as i64, x as i64 + 1_000));
            }
        })
    });
}

fn bench_pop_random_10k(c: &mut Criterion) {
    c.bench_function("zset::pop_random_10k_of_110k", |b| {
        b.iter_batched(
            || {
                let (z, names) = populated(5, 110_000);
                // Distinct targets so every pop hits.
                let targets: Vec<_> = names.into_iter().step_by(11).take(10_000).collect();
                (z, targets)
            },
            |(mut z, targets)| {
                for nm in &targets {
                    black_box(z.pop(nm));
                }
                black_box(z)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_write;
    config = bench_config();
    targets = bench_add_fresh_100k, bench_update_scores_10k, bench_pop_random_10k
}
criterion_group! {
    name = benches_read;
    config = bench_config();
    targets = bench_lookup_hit_10k,
              bench_rank_10k,
              bench_query_and_range
}
criterion_main!(benches_write, benches_read);
