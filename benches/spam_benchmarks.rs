//! SPAM and chi-square benchmarks
//!
//! Run with: cargo bench --bench spam_benchmarks

use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use ndarray::{Array2, Array3};
use stego_detect::analysis::{chi_square::ChiSquareAnalyzer, spam::SpamExtractor};

fn textured(size: usize) -> Array2<f32> {
    Array2::from_shape_fn((size, size), |(y, x)| ((x * 31 + y * 17 + x * y) % 256) as f32)
}

/// Feature extraction on the canonical 512x512 plane
fn bench_spam(c: &mut Criterion) {
    let mut group = c.benchmark_group("spam");
    let pixels = textured(512);
    group.throughput(Throughput::Elements((512 * 512) as u64));

    let parallel = SpamExtractor::default();
    group.bench_function("extract_512_parallel", |b| {
        b.iter(|| parallel.extract(black_box(&pixels)))
    });

    let serial = SpamExtractor::default().with_parallel(false);
    group.bench_function("extract_512_serial", |b| {
        b.iter(|| serial.extract(black_box(&pixels)))
    });

    group.finish();
}

fn bench_chi_square(c: &mut Criterion) {
    let mut group = c.benchmark_group("chi_square");
    let pixels = Array3::from_shape_fn((512, 512, 3), |(y, x, ch)| ((x ^ y) + ch) as u8);
    let analyzer = ChiSquareAnalyzer::new().unwrap();
    group.throughput(Throughput::Elements((512 * 512 * 3) as u64));

    group.bench_function("rgb_512", |b| b.iter(|| analyzer.analyze(black_box(&pixels))));

    group.finish();
}

criterion_group!(benches, bench_spam, bench_chi_square);
criterion_main!(benches);
