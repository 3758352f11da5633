//! Benchmarks for ResNet forward passes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use resnet_sparsity::nn::Module;
use resnet_sparsity::{Diagnostics, DiagnosticsConfig, ResNet, ResNetConfig, ResNetDepth, Tensor};

fn cifar_batch(batch: usize) -> Tensor {
    Tensor::from_fn(&[batch, 3, 32, 32], |i| ((i * 31 % 97) as f32 / 97.0) - 0.5)
}

fn bench_resnet18_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("resnet18_forward");
    group.sample_size(10);

    let net = ResNet::new(ResNetConfig::for_depth(ResNetDepth::ResNet18).with_seed(0))
        .expect("valid config");

    for batch in [1, 4].iter() {
        let x = cifar_batch(*batch);
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, _| {
            b.iter(|| net.forward(black_box(&x)).expect("forward"));
        });
    }

    group.finish();
}

fn bench_resnet18_diagnostics(c: &mut Criterion) {
    let mut group = c.benchmark_group("resnet18_diagnostics");
    group.sample_size(10);

    let net = ResNet::new(ResNetConfig::for_depth(ResNetDepth::ResNet18).with_seed(0))
        .expect("valid config");
    let x = cifar_batch(1);
    let config = DiagnosticsConfig::default().with_feature_dumps(false);

    group.bench_function("counter", |b| {
        b.iter(|| {
            let mut diagnostics = Diagnostics::with_writer(&config, std::io::sink());
            net.forward_with(black_box(&x), &mut diagnostics)
                .expect("forward")
        });
    });

    group.finish();
}

criterion_group!(benches, bench_resnet18_forward, bench_resnet18_diagnostics);
criterion_main!(benches);
