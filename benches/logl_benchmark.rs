use std::time::Duration;

use angfit::{
    likelihoods::{ChiSquare, LogLikelihood},
    sample::LegendreSampler,
    ExecutionContext, Histogram, Objective, ThreadPolicy, UniformAxis, WeightedValue,
};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const N_EVENTS: usize = 100_000;
const TRUTH: [f64; 4] = [0.3, -0.2, 0.1, 0.4];

fn events() -> Vec<WeightedValue> {
    LegendreSampler::new(&TRUTH, 1.0, 0)
        .unwrap()
        .take(N_EVENTS)
        .map(|x| WeightedValue::new(x.abs(), 1.0))
        .collect()
}

fn random_point(rng: &mut ChaCha8Rng) -> Vec<f64> {
    vec![
        rng.gen_range(-0.5..0.5),
        rng.gen_range(-0.5..0.5),
        rng.gen_range(-0.5..0.5),
        rng.gen_range(-3.0..3.0),
    ]
}

fn logl_benchmark(c: &mut Criterion) {
    let events = events();
    let mut group = c.benchmark_group("LogL Performance");
    let max_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let n_threads: Vec<usize> = (0..)
        .map(|x| 1 << x)
        .take_while(|&p| p <= max_threads)
        .collect();
    for threads in n_threads {
        let ctx = ExecutionContext::new(ThreadPolicy::from_threads(threads)).unwrap();
        let logl = LogLikelihood::new(&events, 1.0).unwrap().with_context(&ctx);
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            &threads,
            |b, &_threads| {
                let mut rng = ChaCha8Rng::seed_from_u64(1);
                b.iter_batched(
                    || random_point(&mut rng),
                    |p| black_box(logl.evaluate(&p)),
                    BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

fn chi2_benchmark(c: &mut Criterion) {
    let events = events();
    let mut histogram = Histogram::new(UniformAxis::new(50, 0.0, 1.0).unwrap());
    for event in &events {
        histogram.fill(event.x, event.w);
    }
    let chi2 = ChiSquare::new(&histogram);
    let scale = N_EVENTS as f64 / 50.0;
    c.bench_function("Chi2 Performance", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        b.iter_batched(
            || {
                let mut p = random_point(&mut rng);
                p.push(scale);
                p
            },
            |p| black_box(chi2.evaluate(&p)),
            BatchSize::SmallInput,
        )
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10)).sample_size(500);
    targets = logl_benchmark, chi2_benchmark
}
criterion_main!(benches);
