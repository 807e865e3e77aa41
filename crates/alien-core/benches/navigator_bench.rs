use std::collections::HashMap;
use std::time::Duration;

use alien_core::{
    CellDescription, ClusterDescription, DataChangeDescription, DataDescription,
    DescriptionNavigator, EntityId, ParticleDescription, Vec2,
};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

fn sample_world(clusters: usize, cells_per_cluster: usize, seed: u64) -> DataDescription {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut data = DataDescription::new();
    let mut next_id: EntityId = 1;
    for _ in 0..clusters {
        let origin = Vec2::new(rng.random_range(0.0..1_000.0), rng.random_range(0.0..1_000.0));
        let mut cluster = ClusterDescription::new(next_id);
        next_id += 1;
        for index in 0..cells_per_cluster {
            cluster.add_cell(
                CellDescription::new(next_id)
                    .with_pos(origin + Vec2::new(index as f32, 0.0))
                    .with_energy(100.0)
                    .with_connections(Vec::new()),
            );
            next_id += 1;
        }
        let ids: Vec<EntityId> = cluster.cell_ids().collect();
        let mut cache = HashMap::new();
        for pair in ids.windows(2) {
            // Positions are always set above.
            let _ = cluster.add_connection(pair[0], pair[1], &mut cache);
        }
        data.add_cluster(cluster);
    }
    for _ in 0..clusters {
        data.add_particle(
            ParticleDescription::new(next_id)
                .with_pos(Vec2::new(rng.random_range(0.0..1_000.0), rng.random_range(0.0..1_000.0)))
                .with_energy(1.0),
        );
        next_id += 1;
    }
    data
}

fn bench_navigator(c: &mut Criterion) {
    let mut group = c.benchmark_group("navigator");
    group.sample_size(env_or("ALIEN_BENCH_SAMPLES", 30_usize).max(10));
    group.measurement_time(Duration::from_secs(env_or("ALIEN_BENCH_MEASURE_SECS", 5_u64)));

    for clusters in [100_usize, 1_000, 5_000] {
        let world = sample_world(clusters, 8, 0xA11E);
        group.bench_function(format!("rebuild_{clusters}_clusters"), |b| {
            let mut navigator = DescriptionNavigator::new();
            b.iter(|| navigator.update(&world));
        });
    }
    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta");
    group.sample_size(env_or("ALIEN_BENCH_SAMPLES", 30_usize).max(10));

    for clusters in [100_usize, 1_000] {
        let before = sample_world(clusters, 8, 0xA11E);
        let mut after = before.clone();
        after.shift(Vec2::new(0.5, 0.0));
        after.clusters.truncate(clusters / 2);

        group.bench_function(format!("diff_{clusters}_clusters"), |b| {
            b.iter(|| DataChangeDescription::diff(&before, &after));
        });
        group.bench_function(format!("apply_{clusters}_clusters"), |b| {
            let delta = DataChangeDescription::diff(&before, &after).ok();
            b.iter_batched(
                || before.clone(),
                |mut data| {
                    if let Some(delta) = &delta {
                        let _ = delta.apply(&mut data);
                    }
                    data
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_navigator, bench_diff);
criterion_main!(benches);
