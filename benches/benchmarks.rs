use border_nuller::{build_sum, mask_granule, GeoReference, Granule, DEFAULT_NULL};
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use std::hint::black_box;

const SIZE: (usize, usize) = (2048, 2048);
const BORDER: usize = 64;

fn framed_granule() -> Granule<u16> {
    let bands = [40u16, 80, 120]
        .into_iter()
        .map(|value| {
            Array2::from_shape_fn(SIZE, |(row, col)| {
                let border = row < BORDER
                    || col < BORDER
                    || row >= SIZE.0 - BORDER
                    || col >= SIZE.1 - BORDER;
                if border {
                    0
                } else {
                    value
                }
            })
        })
        .collect();
    Granule::new("bench", GeoReference::default(), bands)
}

fn bench_build_sum(c: &mut Criterion) {
    let granule = framed_granule();
    c.bench_function("build_sum", |b| {
        b.iter(|| build_sum(black_box(&granule)).unwrap())
    });
}

fn bench_mask_granule(c: &mut Criterion) {
    let granule = framed_granule();
    let sum = build_sum(&granule).unwrap();
    c.bench_function("mask_granule", |b| {
        b.iter(|| mask_granule(black_box(&granule), &sum, DEFAULT_NULL).unwrap())
    });
}

criterion_group!(benches, bench_build_sum, bench_mask_granule);
criterion_main!(benches);
