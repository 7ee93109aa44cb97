#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use nn_builder::cnn::{Cnn, CnnConfig, LayerSpec};
use nn_builder::Initialiser;
use std::time::{Duration, Instant};
use tch::kind::Kind;
use tch::{nn, no_grad, Device, Tensor};

fn benchmark_config() -> CnnConfig {
    CnnConfig {
        input_dim: 3,
        batch_norm: true,
        initialiser: Initialiser::XavierUniform,
        ..CnnConfig::new(
            vec![
                LayerSpec::conv(32, 3, 1, 1),
                LayerSpec::max_pool(2, 2, 0),
                LayerSpec::conv(64, 3, 1, 1),
                LayerSpec::adaptive_avg_pool(4, 4),
                LayerSpec::linear(1024, 128),
            ],
            vec![10, 1].into(),
        )
    }
}

fn build_network(iters: u64, config: &CnnConfig) -> Duration {
    let mut duration = Duration::new(0, 0);
    for _i in 0..iters {
        let vs = nn::VarStore::new(Device::Cpu);
        let start = Instant::now();
        let _ = Cnn::new(vs.root(), config).unwrap();
        duration = duration.checked_add(start.elapsed()).unwrap();
    }
    duration
}

fn forward_pass(iters: u64, cnn: &Cnn, input: &Tensor) -> Duration {
    let mut duration = Duration::new(0, 0);
    for _i in 0..iters {
        let start = Instant::now();
        let _ = no_grad(|| cnn.forward_t(input, false)).unwrap();
        duration = duration.checked_add(start.elapsed()).unwrap();
    }
    duration
}

fn bench_cnn(c: &mut Criterion) {
    //    Set-up network
    let config = benchmark_config();
    let vs = nn::VarStore::new(Device::cuda_if_available());
    let cnn = Cnn::new(vs.root(), &config).unwrap();
    let input = Tensor::rand(&[32, 3, 32, 32], (Kind::Float, vs.device()));

    let _ = no_grad(|| cnn.forward_t(&input, false)).unwrap();
    c.bench_function("Build CNN", |b| {
        b.iter_custom(|iters| black_box(build_network(iters, &config)))
    });
    c.bench_function("CNN forward pass", |b| {
        b.iter_custom(|iters| black_box(forward_pass(iters, &cnn, &input)))
    });
}

criterion_group! {
name = benches;
config = Criterion::default().sample_size(20);
targets = bench_cnn
}

criterion_main!(benches);
