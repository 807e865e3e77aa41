use std::collections::HashMap;

use alien_app::{Session, SessionConfig};
use alien_changer::ChangerConfig;
use alien_core::{
    CellDescription, ClusterDescription, DataDescription, EntityId, ParticleDescription,
    SimulationParameters, TokenDescription, Vec2,
};
use anyhow::{Context, Result};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde_json::Value;
use tracing::info;

const DEFAULT_SEED: u64 = 0xA11E_5EED_0123_4567;

fn main() -> Result<()> {
    init_tracing();
    let patch = std::env::args()
        .nth(1)
        .map(|raw| serde_json::from_str::<Value>(&raw))
        .transpose()
        .context("parameter patch must be a JSON object")?;
    let seed = env_or("ALIEN_SEED", DEFAULT_SEED);
    let timesteps = env_or("ALIEN_TIMESTEPS", 20_000_u64);
    let chunk = env_or("ALIEN_LOG_INTERVAL", 2_000_u64).max(1);

    let config = SessionConfig {
        changer: ChangerConfig {
            rng_seed: Some(seed),
            ..ChangerConfig::default()
        },
        ..SessionConfig::default()
    };
    let parameters = SimulationParameters::default();
    let mut rng = SmallRng::seed_from_u64(seed);
    let world = seed_world(&mut rng, config.world_size, &parameters)?;
    let mut session = Session::new(config, parameters, world)?;

    if let Some(patch) = patch {
        let parameters = session.apply_parameter_patch(&patch)?;
        info!(?parameters, "applied parameter patch");
    }
    session.refresh_editor()?;
    session.activate_changer();
    info!(seed, timesteps, "starting ALIEN session");

    let mut done = 0;
    while done < timesteps {
        let steps = chunk.min(timesteps - done);
        let report = session.run(steps)?;
        done += steps;
        let monitor = session.monitor_data();
        info!(
            timestep = session.timestep(),
            clusters = monitor.num_clusters,
            active_clusters = monitor.num_clusters_with_tokens,
            cells = monitor.num_cells,
            tokens = monitor.num_tokens,
            energy = monitor.total_internal_energy,
            samples = report.samples,
            parameter_changes = report.parameter_changes,
            changer_state = ?session.changer().state(),
            "progress"
        );
    }

    let summary = session.editor().selection_summary();
    info!(
        timestep = session.timestep(),
        parameters = ?session.parameters(),
        editor_clusters = session.editor().data().clusters.len(),
        selected_cells = summary.selected_cells,
        "session finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

/// Random chains of cells, half of them carrying a token, plus loose energy
/// particles.
fn seed_world(
    rng: &mut SmallRng,
    size: (i32, i32),
    parameters: &SimulationParameters,
) -> Result<DataDescription> {
    let mut data = DataDescription::new();
    let mut next_id: EntityId = 1;
    let mut take_id = || {
        let id = next_id;
        next_id += 1;
        id
    };
    let (width, height) = (size.0 as f32, size.1 as f32);
    let spacing = (parameters.cell_min_distance + parameters.cell_max_distance) / 2.0;

    for _ in 0..200 {
        let origin = Vec2::new(rng.random_range(0.0..width), rng.random_range(0.0..height));
        let vel = Vec2::new(rng.random_range(-0.05..0.05), rng.random_range(-0.05..0.05));
        let mut cluster = ClusterDescription::new(take_id());
        let length = rng.random_range(2..=6);
        for index in 0..length {
            let mut cell = CellDescription::new(take_id())
                .with_pos(origin + Vec2::new(index as f32 * spacing, 0.0))
                .with_vel(vel)
                .with_energy(parameters.cell_creation_energy)
                .with_max_connections(parameters.cell_creation_max_connection)
                .with_connections(Vec::new())
                .with_tokens(Vec::new());
            if index == 0 && rng.random_bool(0.5) {
                cell.add_token(TokenDescription::zeroed(
                    parameters.token_creation_energy,
                    parameters.token_memory_size,
                ));
            }
            cluster.add_cell(cell);
        }
        let ids: Vec<EntityId> = cluster.cell_ids().collect();
        let mut cache = HashMap::new();
        for pair in ids.windows(2) {
            cluster
                .add_connection(pair[0], pair[1], &mut cache)
                .context("seeding cell chain")?;
        }
        data.add_cluster(cluster);
    }

    for _ in 0..400 {
        data.add_particle(
            ParticleDescription::new(take_id())
                .with_pos(Vec2::new(rng.random_range(0.0..width), rng.random_range(0.0..height)))
                .with_vel(Vec2::new(rng.random_range(-0.5..0.5), rng.random_range(-0.5..0.5)))
                .with_energy(parameters.cell_min_energy / 2.0),
        );
    }
    Ok(data)
}
