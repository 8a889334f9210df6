use criterion::{black_box, criterion_group, Criterion};
use hfdmft::fast_update::GreenMatrix;
use hfdmft::ising::lambda;

use super::toy_weiss;

const L: usize = 64;

pub fn clean_build(c: &mut Criterion) {
    let g0 = toy_weiss(L);
    let lam = lambda(0.25, 2.0);
    let v: Vec<f64> = (0..L).map(|l| if l % 3 == 0 { lam } else { -lam }).collect();
    c.bench_function("Clean build G 64x64", |b| {
        b.iter(|| GreenMatrix::clean_build(black_box(&g0), black_box(&v)))
    });
}

pub fn single_flip(c: &mut Criterion) {
    let g0 = toy_weiss(L);
    let lam = lambda(0.25, 2.0);
    let v: Vec<f64> = (0..L).map(|l| if l % 3 == 0 { lam } else { -lam }).collect();
    let mut g = match GreenMatrix::clean_build(&g0, &v) {
        Ok(g) => g,
        Err(e) => panic!("{}", e),
    };
    // Flipping the same entry twice returns to the start.
    let mut sign = 1.0;
    c.bench_function("Rank one update G 64x64", |b| {
        b.iter(|| {
            g.apply_single_flip(black_box(7), sign * 2.0 * lam);
            sign = -sign;
        })
    });
}

pub fn double_flip(c: &mut Criterion) {
    let g0 = toy_weiss(L);
    let lam = lambda(0.25, 2.0);
    let v: Vec<f64> = (0..L).map(|l| if l % 2 == 0 { lam } else { -lam }).collect();
    let mut g = match GreenMatrix::clean_build(&g0, &v) {
        Ok(g) => g,
        Err(e) => panic!("{}", e),
    };
    let mut sign = 1.0;
    c.bench_function("Rank two update G 64x64", |b| {
        b.iter(|| {
            g.apply_double_flip(black_box(4), black_box(9), -sign * 2.0 * lam, sign * 2.0 * lam);
            sign = -sign;
        })
    });
}

criterion_group!(benches, clean_build, single_flip, double_flip);
