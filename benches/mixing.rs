//! Criterion benchmarks for stream mixing
//!
//! Measures `StreamAdder::read` throughput for a growing number of children
//! and for nested adders.
//!
//! Run with: `cargo bench -- mixing/`

use audiometry::stream::buffer::{SampleBufferStream, ToneStream};
use audiometry::{AnalyticSample, AnalyticStream, StreamAdder};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const SAMPLING_RATE: f64 = 48000.0;
const BLOCK_SIZE: usize = 4096;
const CHILD_COUNTS: &[usize] = &[1, 4, 16, 64];

fn tone_adder(children: usize) -> StreamAdder {
    let mut adder = StreamAdder::new();
    for i in 0..children {
        let frequency = 250.0 * (i + 1) as f64;
        adder
            .add_stream(ToneStream::new(frequency, 0.1, 10.0, SAMPLING_RATE))
            .unwrap();
    }
    adder
}

fn bench_flat(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixing/flat");
    let mut data = vec![AnalyticSample::new(0.0, 0.0); BLOCK_SIZE];

    for &children in CHILD_COUNTS {
        let mut adder = tone_adder(children);
        group.bench_with_input(BenchmarkId::from_parameter(children), &children, |b, _| {
            b.iter(|| {
                if adder.read(&mut data) == 0 {
                    adder.reset();
                }
                black_box(&data);
            })
        });
    }
    group.finish();
}

fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixing/nested");
    let mut data = vec![AnalyticSample::new(0.0, 0.0); BLOCK_SIZE];

    let mut outer = StreamAdder::new();
    for _ in 0..4 {
        outer.add_stream(tone_adder(4)).unwrap();
    }
    let noise: Vec<f64> = (0..SAMPLING_RATE as usize)
        .map(|i| ((i * 7919) % 1000) as f64 / 1000.0 - 0.5)
        .collect();
    outer
        .add_stream(SampleBufferStream::from_real(&noise, SAMPLING_RATE))
        .unwrap();

    group.bench_function("4x4+buffer", |b| {
        b.iter(|| {
            if outer.read(&mut data) == 0 {
                outer.reset();
            }
            black_box(&data);
        })
    });
    group.finish();
}

criterion_group!(benches, bench_flat, bench_nested);
criterion_main!(benches);
