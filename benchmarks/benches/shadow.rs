//! Shadow subsystem benchmarks (criterion - wall-clock time).
//!
//! Run all:    cargo bench --manifest-path benchmarks/Cargo.toml --bench shadow
//! Filter:     cargo bench --manifest-path benchmarks/Cargo.toml --bench shadow -- matrices

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::Vec3;
use rein_shadow::shadow::{
    directional_light_matrix, point_light_matrices, spot_light_matrix, ShadowConfig,
};
use rein_shadow::Light;
use rein_shadow_bench::*;
use std::hint::black_box;

// ---------------------------------------------------------------------------
// Light-space matrices
// ---------------------------------------------------------------------------

fn bench_matrices(c: &mut Criterion) {
    let config = ShadowConfig::default();
    let mut group = c.benchmark_group("matrices");

    let directional = Light::directional(Vec3::new(2.0, 10.0, -3.0), Vec3::new(-0.2, -1.0, 0.3));
    group.bench_function("directional", |b| {
        b.iter(|| directional_light_matrix(black_box(&directional), &config.directional));
    });

    let spot = Light::spot(Vec3::new(0.0, 6.0, 0.0), Vec3::new(0.1, -1.0, 0.0), 30.0);
    group.bench_function("spot", |b| {
        b.iter(|| spot_light_matrix(black_box(&spot), &config.spot));
    });

    group.bench_function("point_six_faces", |b| {
        b.iter(|| point_light_matrices(black_box(Vec3::new(1.0, 3.0, -2.0)), 1.0, 25.0));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Frame protocol (headless)
// ---------------------------------------------------------------------------

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame/headless");
    for &lights in &[3, 9, 24] {
        let (mut device, mut shadows) = setup_shadows();
        let objects = cube_field(&mut device, 64);
        let lights = light_ring(lights);
        shadows.reconcile(&mut device, &lights);

        group.bench_with_input(BenchmarkId::from_parameter(lights.len()), &lights, |b, lights| {
            b.iter(|| {
                device.reset_frame();
                shadows.frame(&mut device, lights, &objects)
            });
        });
        shadows.shutdown(&mut device);
    }
    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let lights = light_ring(24);
    group.bench_function("create_and_shutdown_24", |b| {
        b.iter_batched(
            setup_shadows,
            |(mut device, mut shadows)| {
                shadows.reconcile(&mut device, &lights);
                shadows.shutdown(&mut device);
            },
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_matrices, bench_frame, bench_reconcile);
criterion_main!(benches);
