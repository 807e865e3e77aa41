//! In-process engine serving snapshots and telemetry over the event bus.

use alien_changer::{MonitorData, SimulationMonitor};
use alien_core::{
    ChangeError, DataChangeDescription, DataDescription, IntRect, ResolveDescription,
    SimulationAccess, SimulationController, SimulationParameters, TimestepSnapshot, Vec2,
};
use tracing::{debug, trace};

use crate::command::{EngineEvent, EventSender, post_event};

/// Kinematic stand-in for the GPU engine.
///
/// Requests are answered right away, but completion is only announced through
/// the event bus, so callers observe the same queued delivery as with a
/// threaded engine.
pub struct LocalEngine {
    world: DataDescription,
    size: (i32, i32),
    timestep: u64,
    parameters: SimulationParameters,
    events: EventSender,
    prepared: Option<DataDescription>,
    sample: Option<MonitorData>,
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("size", &self.size)
            .field("timestep", &self.timestep)
            .field("clusters", &self.world.clusters.len())
            .field("particles", &self.world.particles.len())
            .finish_non_exhaustive()
    }
}

impl LocalEngine {
    pub fn new(
        world: DataDescription,
        size: (i32, i32),
        parameters: SimulationParameters,
        events: EventSender,
    ) -> Self {
        let mut engine = Self {
            world,
            size,
            timestep: 0,
            parameters,
            events,
            prepared: None,
            sample: None,
        };
        engine.wrap_positions();
        engine
    }

    pub fn world(&self) -> &DataDescription {
        &self.world
    }

    /// Replace the whole world, e.g. after a resize.
    pub fn replace_world(&mut self, world: DataDescription) {
        self.world = world;
        self.wrap_positions();
    }

    pub fn snapshot(&self) -> TimestepSnapshot {
        TimestepSnapshot {
            timestep: self.timestep,
            data: self.world.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: TimestepSnapshot) {
        debug!(timestep = snapshot.timestep, "restoring engine snapshot");
        self.timestep = snapshot.timestep;
        self.replace_world(snapshot.data);
    }

    /// Clusters whose center lies in `rect` and particles inside it.
    pub fn region(&self, rect: IntRect, resolve: ResolveDescription) -> DataDescription {
        let mut region = DataDescription::new();
        for cluster in &self.world.clusters {
            if cluster.cells.is_empty() || !rect.contains(cluster.cluster_pos_from_cells()) {
                continue;
            }
            let mut cluster = cluster.clone();
            if !resolve.resolve_cell_links {
                for cell in &mut cluster.cells {
                    cell.connections = None;
                }
            }
            region.add_cluster(cluster);
        }
        region.add_particles(
            self.world
                .particles
                .iter()
                .filter(|particle| particle.pos.is_some_and(|pos| rect.contains(pos)))
                .cloned(),
        );
        region
    }

    /// Population counts of the current world.
    pub fn monitor_data(&self) -> MonitorData {
        let mut data = MonitorData {
            num_clusters: self.world.clusters.len() as u64,
            num_particles: self.world.particles.len() as u64,
            ..MonitorData::default()
        };
        for cluster in &self.world.clusters {
            let mut has_tokens = false;
            for cell in &cluster.cells {
                data.num_cells += 1;
                data.total_internal_energy += cell.energy.unwrap_or(0.0);
                if let Some(tokens) = &cell.tokens {
                    has_tokens |= !tokens.is_empty();
                    data.num_tokens += tokens.len() as u64;
                    data.total_internal_energy +=
                        tokens.iter().map(|token| token.energy).sum::<f64>();
                }
            }
            if has_tokens {
                data.num_clusters_with_tokens += 1;
            }
        }
        data.total_internal_energy += self
            .world
            .particles
            .iter()
            .filter_map(|particle| particle.energy)
            .sum::<f64>();
        data
    }

    fn wrap_positions(&mut self) {
        let size = self.size;
        for cell in self.world.cells_mut() {
            cell.pos = cell.pos.map(|pos| wrap_into(size, pos));
        }
        for particle in &mut self.world.particles {
            particle.pos = particle.pos.map(|pos| wrap_into(size, pos));
        }
    }
}

fn wrap_into(size: (i32, i32), pos: Vec2) -> Vec2 {
    let (width, height) = (size.0.max(1) as f32, size.1.max(1) as f32);
    Vec2::new(pos.x.rem_euclid(width), pos.y.rem_euclid(height))
}

impl SimulationAccess for LocalEngine {
    fn require_data(&mut self, rect: IntRect, resolve: ResolveDescription) {
        self.prepared = Some(self.region(rect, resolve));
        post_event(&self.events, EngineEvent::DataReadyToRetrieve);
    }

    fn retrieve_data(&mut self) -> DataDescription {
        self.prepared.take().unwrap_or_default()
    }

    fn update_data(&mut self, delta: &DataChangeDescription) -> Result<(), ChangeError> {
        delta.apply(&mut self.world)?;
        debug!(summary = ?delta.summary(), "applied delta to engine world");
        Ok(())
    }
}

impl SimulationMonitor for LocalEngine {
    fn require_data(&mut self) {
        self.sample = Some(self.monitor_data());
        post_event(&self.events, EngineEvent::MonitorDataReady);
    }

    fn retrieve_data(&mut self) -> Option<MonitorData> {
        self.sample.take()
    }
}

impl SimulationController for LocalEngine {
    fn current_timestep(&self) -> u64 {
        self.timestep
    }

    fn set_current_timestep(&mut self, timestep: u64) {
        self.timestep = timestep;
    }

    fn calc_single_timestep(&mut self) {
        let size = self.size;
        for cell in self.world.cells_mut() {
            if let (Some(pos), Some(vel)) = (cell.pos, cell.vel) {
                cell.pos = Some(wrap_into(size, pos + vel));
            }
        }
        for particle in &mut self.world.particles {
            if let (Some(pos), Some(vel)) = (particle.pos, particle.vel) {
                particle.pos = Some(wrap_into(size, pos + vel));
            }
        }
        self.timestep += 1;
        trace!(timestep = self.timestep, "engine timestep");
    }

    fn world_size(&self) -> (i32, i32) {
        self.size
    }

    fn set_world_size(&mut self, size: (i32, i32)) {
        self.size = size;
        self.wrap_positions();
    }

    fn simulation_parameters(&self) -> &SimulationParameters {
        &self.parameters
    }

    fn set_simulation_parameters(&mut self, parameters: SimulationParameters) {
        self.parameters = parameters;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{create_event_bus, drain_pending_events};
    use alien_core::{CellDescription, ClusterDescription, ParticleDescription, TokenDescription};

    fn world() -> DataDescription {
        let mut data = DataDescription::new();
        data.add_cluster(
            ClusterDescription::new(1)
                .with_cell(
                    CellDescription::new(2)
                        .with_pos(Vec2::new(9.5, 5.0))
                        .with_vel(Vec2::new(1.0, 0.0))
                        .with_energy(100.0)
                        .with_tokens(vec![TokenDescription::new(10.0, vec![0; 4])]),
                ),
        );
        data.add_cluster(
            ClusterDescription::new(3).with_cell(
                CellDescription::new(4)
                    .with_pos(Vec2::new(2.0, 2.0))
                    .with_energy(50.0),
            ),
        );
        data.add_particle(
            ParticleDescription::new(5)
                .with_pos(Vec2::new(1.0, 8.0))
                .with_vel(Vec2::new(0.0, -2.0))
                .with_energy(1.0),
        );
        data
    }

    #[test]
    fn timestep_integrates_and_wraps() {
        let (sender, _receiver) = create_event_bus(4);
        let mut engine = LocalEngine::new(world(), (10, 10), SimulationParameters::default(), sender);
        engine.calc_single_timestep();
        assert_eq!(engine.current_timestep(), 1);
        let moving = engine.world().clusters[0].cells[0].pos.expect("pos");
        assert!(moving.approx_eq(Vec2::new(0.5, 5.0), 1e-5));
        let resting = engine.world().clusters[1].cells[0].pos.expect("pos");
        assert_eq!(resting, Vec2::new(2.0, 2.0));
        let particle = engine.world().particles[0].pos.expect("pos");
        assert!(particle.approx_eq(Vec2::new(1.0, 6.0), 1e-5));
    }

    #[test]
    fn requests_are_announced_on_the_bus() {
        let (sender, receiver) = create_event_bus(4);
        let mut engine = LocalEngine::new(world(), (10, 10), SimulationParameters::default(), sender);

        SimulationAccess::require_data(
            &mut engine,
            IntRect::new((0, 0), (5, 5)),
            ResolveDescription::default(),
        );
        SimulationMonitor::require_data(&mut engine);
        assert_eq!(
            drain_pending_events(&receiver),
            vec![EngineEvent::DataReadyToRetrieve, EngineEvent::MonitorDataReady]
        );

        let region = SimulationAccess::retrieve_data(&mut engine);
        assert_eq!(region.clusters.len(), 1);
        assert_eq!(region.clusters[0].id, 3);
        assert!(region.particles.is_empty());
        assert!(SimulationAccess::retrieve_data(&mut engine).is_empty());

        let sample = SimulationMonitor::retrieve_data(&mut engine).expect("sample");
        assert_eq!(sample.num_clusters, 2);
        assert_eq!(sample.num_clusters_with_tokens, 1);
        assert_eq!(sample.num_tokens, 1);
        assert!((sample.total_internal_energy - 161.0).abs() < 1e-9);
        assert!(SimulationMonitor::retrieve_data(&mut engine).is_none());
    }
}
