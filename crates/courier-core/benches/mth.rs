//! MTH throughput in both modes, and the cost of replaying a prefix.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use courier_core::{MthFat, MthSeq, TreeHash, BLOCK_SIZE};

fn data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("mth");

    for size in [BLOCK_SIZE, 1024 * 1024, 16 * 1024 * 1024] {
        let input = data(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("fat", size), &input, |b, input| {
            b.iter(|| {
                let mut mth = MthFat::new();
                mth.update(black_box(input));
                mth.sum()
            })
        });

        group.bench_with_input(BenchmarkId::new("seq", size), &input, |b, input| {
            b.iter(|| {
                let mut mth = MthSeq::new(input.len() as u64, 0);
                mth.update(black_box(input));
                mth.sum()
            })
        });
    }

    group.finish();
}

/// Small writes exercise the partial-block buffer.
fn bench_small_writes(c: &mut Criterion) {
    let input = data(1024 * 1024);

    c.bench_function("mth_fat_4k_writes", |b| {
        b.iter(|| {
            let mut mth = MthFat::new();
            for piece in input.chunks(4096) {
                mth.update(black_box(piece));
            }
            mth.sum()
        })
    });
}

fn bench_resume(c: &mut Criterion) {
    let input = data(8 * 1024 * 1024);
    let offset = (input.len() / 2) as u64;

    c.bench_function("mth_seq_resume_half", |b| {
        b.iter(|| {
            let mut mth = MthSeq::new(input.len() as u64, offset);
            mth.replay_prefix(&input[..]).unwrap();
            mth.update(&input[offset as usize..]);
            mth.sum()
        })
    });
}

criterion_group!(benches, bench_modes, bench_small_writes, bench_resume);
criterion_main!(benches);
