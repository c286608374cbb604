//! Criterion benchmarks for the simulation step.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use neuroswarm::record;
use neuroswarm::simulation::{SimConfig, Simulation};

fn make_sim(unit_count: usize, seed: u64) -> Simulation {
    Simulation::new(SimConfig::new(unit_count, 800.0, 600.0, 80.0).with_seed(seed))
}

/// Benchmark step() across population sizes. Connection discovery is quadratic.
fn bench_step_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_size");

    for size in [50, 100, 200, 400, 800].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("step", size), size, |b, &size| {
            let mut sim = make_sim(size, 42);
            // Let the synapse lists fill up before timing.
            sim.run(200);

            b.iter(|| {
                sim.step();
                black_box(sim.firing_count())
            });
        });
    }

    group.finish();
}

/// Benchmark step() at a fixed size with different connection radii.
fn bench_step_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_threshold");

    for threshold in [20.0, 80.0, 200.0] {
        group.bench_function(format!("units_200_r{threshold}"), |b| {
            let cfg = SimConfig::new(200, 800.0, 600.0, threshold).with_seed(7);
            let mut sim = Simulation::new(cfg);
            sim.run(200);

            b.iter(|| {
                sim.step();
                black_box(sim.total_active_synapses())
            });
        });
    }

    group.finish();
}

/// Benchmark record and image encoding of a warmed-up simulation.
fn bench_persistence(c: &mut Criterion) {
    let mut group = c.benchmark_group("persistence");

    let mut sim = make_sim(400, 3);
    sim.run(500);

    group.bench_function("record_save", |b| {
        b.iter(|| {
            let mut bytes = Vec::new();
            record::save_to(&sim, &mut bytes).unwrap();
            black_box(bytes.len())
        });
    });

    group.bench_function("image_save", |b| {
        b.iter(|| {
            let mut bytes = Vec::new();
            sim.save_image_to(&mut bytes).unwrap();
            black_box(bytes.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_step_sizes,
    bench_step_threshold,
    bench_persistence
);
criterion_main!(benches);
