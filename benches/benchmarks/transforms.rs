use criterion::{black_box, criterion_group, Criterion};
use hfdmft::matsubara::{gt_fouriertrans, gw_invfouriertrans, matsubara_frequencies, semicircle, Tail};

pub fn fourier(c: &mut Criterion) {
    let beta = 64.0;
    let wn = matsubara_frequencies(beta, 1024);
    let giw = semicircle(&wn, 0.0, 1.0);
    let taus: Vec<f64> = (0..2048).map(|l| l as f64 * beta / 2048.0).collect();
    let tail = Tail::new(1.0, 0.0, 0.25);
    c.bench_function("Matsubara to tau 1024 -> 2048", |b| {
        b.iter(|| gw_invfouriertrans(black_box(&giw), &taus, &wn, &tail, beta))
    });
    let gtau = gw_invfouriertrans(&giw, &taus, &wn, &tail, beta);
    c.bench_function("Tau to Matsubara 2048 -> 1024", |b| {
        b.iter(|| gt_fouriertrans(black_box(&gtau), &taus, &wn, &tail, beta))
    });
}

criterion_group!(benches, fourier);
