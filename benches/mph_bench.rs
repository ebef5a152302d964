use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use brz_mph::{BrzBuilder, BrzConfig, BrzMphf, SliceKeySource};

fn make_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            format!("key_{}_{:08x}", i, (i as u32).wrapping_mul(0x9e3779b9)).into_bytes()
        })
        .collect()
}

fn build_mphf(keys: &[Vec<u8>]) -> BrzMphf {
    let config = BrzConfig::new().tmp_dir(std::env::temp_dir());
    let mut source = SliceKeySource::new(keys);
    BrzBuilder::new(config).unwrap().build(&mut source).unwrap()
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for size in [1_000usize, 100_000].iter() {
        let keys = make_keys(*size);
        let mphf = build_mphf(&keys);

        group.bench_with_input(BenchmarkId::new("sequential_keys", size), size, |b, _| {
            let mut idx = 0;
            b.iter(|| {
                let key = &keys[idx % keys.len()];
                idx = idx.wrapping_add(1);
                black_box(mphf.index(black_box(key)))
            })
        });
    }

    group.finish();
}

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");
    group.sample_size(10);

    for size in [1_000usize, 100_000].iter() {
        let keys = make_keys(*size);
        group.bench_with_input(BenchmarkId::new("build", size), size, |b, _| {
            b.iter(|| black_box(build_mphf(&keys)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lookup, bench_construction);
criterion_main!(benches);
