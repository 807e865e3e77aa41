//! Geometry transforms applied to whole snapshots.
//!
//! The editor only depends on [`DescriptionHelper`]; the engine may bring its
//! own implementation. [`LocalDescriptionHelper`] runs entirely on snapshot
//! values and is used by the headless app and the tests.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::description::{
    CellDescription, ClusterDescription, DataDescription, ParticleDescription, make_connection,
};
use crate::navigator::DescriptionNavigator;
use crate::settings::SimulationParameters;
use crate::{EntityId, IdGenerator, Vec2};

/// Transforms that need global knowledge of the snapshot.
pub trait DescriptionHelper {
    /// Pick up changed distance and connection limits.
    fn set_parameters(&mut self, parameters: &SimulationParameters);
    /// Assign fresh ids to the cluster and its cells, remapping connections.
    fn make_valid_cluster(&self, cluster: &mut ClusterDescription);
    fn make_valid_particle(&self, particle: &mut ParticleDescription);
    /// Re-derive cluster membership of the given clusters from connectivity.
    fn recluster(&self, data: &mut DataDescription, cluster_ids: &HashSet<EntityId>);
    /// Replace the connections of the given cells by fresh ones to their
    /// nearest neighbours.
    fn reconnect(&self, data: &mut DataDescription, cell_ids: &HashSet<EntityId>);
    /// Wrap positions into a world of `world_size` and drop connections that
    /// became too long.
    fn correct_connections(&self, data: &mut DataDescription, world_size: (i32, i32));
    /// Tile the content of a world of `old_size` over a world of `new_size`.
    fn duplicate(&self, data: &mut DataDescription, old_size: (i32, i32), new_size: (i32, i32));
}

/// In-process helper working purely on descriptions.
#[derive(Debug)]
pub struct LocalDescriptionHelper {
    ids: Arc<IdGenerator>,
    max_distance: f32,
    default_max_connections: u32,
}

impl LocalDescriptionHelper {
    #[must_use]
    pub fn new(ids: Arc<IdGenerator>, parameters: &SimulationParameters) -> Self {
        Self {
            ids,
            max_distance: parameters.cell_max_distance,
            default_max_connections: parameters.cell_creation_max_connection,
        }
    }

    #[must_use]
    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    fn max_connections_of(&self, cell: &CellDescription) -> usize {
        cell.max_connections
            .unwrap_or(self.default_max_connections) as usize
    }

    /// Copy of `cluster` with fresh ids everywhere, connections remapped.
    fn renumbered(&self, cluster: &ClusterDescription) -> ClusterDescription {
        let mut copy = cluster.clone();
        self.make_valid_cluster(&mut copy);
        copy
    }
}

impl DescriptionHelper for LocalDescriptionHelper {
    fn set_parameters(&mut self, parameters: &SimulationParameters) {
        self.max_distance = parameters.cell_max_distance;
        self.default_max_connections = parameters.cell_creation_max_connection;
    }

    fn make_valid_cluster(&self, cluster: &mut ClusterDescription) {
        cluster.id = self.ids.next_id();
        let mapping: HashMap<EntityId, EntityId> = cluster
            .cells
            .iter_mut()
            .map(|cell| {
                let old = cell.id;
                cell.id = self.ids.next_id();
                (old, cell.id)
            })
            .collect();
        for cell in &mut cluster.cells {
            if let Some(connections) = cell.connections.as_mut() {
                for connection in connections {
                    if let Some(&new_id) = mapping.get(&connection.cell_id) {
                        connection.cell_id = new_id;
                    }
                }
            }
        }
    }

    fn make_valid_particle(&self, particle: &mut ParticleDescription) {
        particle.id = self.ids.next_id();
    }

    fn recluster(&self, data: &mut DataDescription, cluster_ids: &HashSet<EntityId>) {
        if cluster_ids.is_empty() {
            return;
        }
        let navigator = DescriptionNavigator::from_data(data);

        // Clusters reachable over connections from the affected ones are
        // merged into the same pass.
        let mut affected: BTreeSet<EntityId> = cluster_ids
            .iter()
            .copied()
            .filter(|id| navigator.contains_cluster(*id).unwrap_or(false))
            .collect();
        let mut pending: VecDeque<EntityId> = affected.iter().copied().collect();
        while let Some(cluster_id) = pending.pop_front() {
            let Ok(index) = navigator.cluster_index(cluster_id) else {
                continue;
            };
            for cell in &data.clusters[index].cells {
                for target in cell.connected_ids() {
                    if let Ok(owner) = navigator.cluster_id_of_cell(target)
                        && affected.insert(owner)
                    {
                        pending.push_back(owner);
                    }
                }
            }
        }

        let mut cells: Vec<CellDescription> = Vec::new();
        let mut owner_by_cell: HashMap<EntityId, EntityId> = HashMap::new();
        let mut remaining = Vec::with_capacity(data.clusters.len());
        for cluster in data.clusters.drain(..) {
            if affected.contains(&cluster.id) {
                for cell in cluster.cells {
                    owner_by_cell.insert(cell.id, cluster.id);
                    cells.push(cell);
                }
            } else {
                remaining.push(cluster);
            }
        }
        data.clusters = remaining;

        let index_by_id: HashMap<EntityId, usize> = cells
            .iter()
            .enumerate()
            .map(|(index, cell)| (cell.id, index))
            .collect();
        let mut component_of = vec![usize::MAX; cells.len()];
        let mut components: Vec<Vec<usize>> = Vec::new();
        for start in 0..cells.len() {
            if component_of[start] != usize::MAX {
                continue;
            }
            let component = components.len();
            let mut members = vec![start];
            component_of[start] = component;
            let mut cursor = 0;
            while cursor < members.len() {
                let current = members[cursor];
                cursor += 1;
                for target in cells[current].connected_ids() {
                    if let Some(&next) = index_by_id.get(&target)
                        && component_of[next] == usize::MAX
                    {
                        component_of[next] = component;
                        members.push(next);
                    }
                }
            }
            members.sort_unstable();
            components.push(members);
        }

        let mut reused: HashSet<EntityId> = HashSet::new();
        let mut slots: Vec<Option<CellDescription>> = cells.into_iter().map(Some).collect();
        let mut rebuilt = 0usize;
        for members in components {
            let cluster_id = members
                .iter()
                .filter_map(|&index| {
                    slots[index]
                        .as_ref()
                        .and_then(|cell| owner_by_cell.get(&cell.id).copied())
                })
                .find(|owner| !reused.contains(owner))
                .unwrap_or_else(|| self.ids.next_id());
            reused.insert(cluster_id);
            let cluster = ClusterDescription::new(cluster_id)
                .with_cells(members.into_iter().filter_map(|index| slots[index].take()));
            data.add_cluster(cluster);
            rebuilt += 1;
        }
        debug!(
            merged = affected.len(),
            rebuilt, "reclustered affected clusters"
        );
    }

    fn reconnect(&self, data: &mut DataDescription, cell_ids: &HashSet<EntityId>) {
        if cell_ids.is_empty() {
            return;
        }
        let navigator = DescriptionNavigator::from_data(data);
        let locate = |id: EntityId| -> Option<(usize, usize)> {
            Some((
                navigator.cluster_index_of_cell(id).ok()?,
                navigator.cell_index(id).ok()?,
            ))
        };

        let mut touched_clusters: HashSet<EntityId> = HashSet::new();
        let mut selected: Vec<EntityId> = cell_ids
            .iter()
            .copied()
            .filter(|id| navigator.contains_cell(*id).unwrap_or(false))
            .collect();
        selected.sort_unstable();

        // Drop old bonds on both sides.
        for &id in &selected {
            let Some((ci, cj)) = locate(id) else { continue };
            touched_clusters.insert(data.clusters[ci].id);
            let former: Vec<EntityId> = data.clusters[ci].cells[cj].connected_ids().collect();
            data.clusters[ci].cells[cj].connections = Some(Vec::new());
            for neighbour in former {
                if let Some((ni, nj)) = locate(neighbour) {
                    data.clusters[ni].cells[nj].retain_connections(|target| target != id);
                    touched_clusters.insert(data.clusters[ni].id);
                }
            }
        }

        let positions: HashMap<EntityId, Vec2> = data
            .cells()
            .filter_map(|cell| cell.pos.map(|pos| (cell.id, pos)))
            .collect();

        for &id in &selected {
            let Some(&origin) = positions.get(&id) else {
                continue;
            };
            let mut candidates: Vec<(f32, EntityId, Vec2)> = positions
                .iter()
                .filter(|&(&other, _)| other != id)
                .map(|(&other, &pos)| (origin.distance(pos), other, pos))
                .filter(|&(distance, _, _)| distance <= self.max_distance)
                .collect();
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            for (_, other, other_pos) in candidates {
                let (Some((ci, cj)), Some((oi, oj))) = (locate(id), locate(other)) else {
                    continue;
                };
                let cell = &data.clusters[ci].cells[cj];
                if cell.connection_count() >= self.max_connections_of(cell) {
                    break;
                }
                let neighbour = &data.clusters[oi].cells[oj];
                if neighbour.connection_count() >= self.max_connections_of(neighbour)
                    || cell.is_connected_to(other)
                {
                    continue;
                }
                let previous = last_target_pos(cell, &positions);
                let forward = make_connection(origin, other, other_pos, previous);
                let previous = last_target_pos(neighbour, &positions);
                let backward = make_connection(other_pos, id, origin, previous);
                data.clusters[ci].cells[cj]
                    .connections
                    .get_or_insert_with(Vec::new)
                    .push(forward);
                data.clusters[oi].cells[oj]
                    .connections
                    .get_or_insert_with(Vec::new)
                    .push(backward);
                touched_clusters.insert(data.clusters[oi].id);
            }
        }

        self.recluster(data, &touched_clusters);
    }

    fn correct_connections(&self, data: &mut DataDescription, world_size: (i32, i32)) {
        let (width, height) = (world_size.0.max(1) as f32, world_size.1.max(1) as f32);
        let wrap = |pos: Vec2| Vec2::new(pos.x.rem_euclid(width), pos.y.rem_euclid(height));
        for cell in data.cells_mut() {
            if let Some(pos) = cell.pos.as_mut() {
                *pos = wrap(*pos);
            }
        }
        for particle in &mut data.particles {
            if let Some(pos) = particle.pos.as_mut() {
                *pos = wrap(*pos);
            }
        }

        let positions: HashMap<EntityId, Vec2> = data
            .cells()
            .filter_map(|cell| cell.pos.map(|pos| (cell.id, pos)))
            .collect();
        let max_distance = self.max_distance;
        let mut touched_clusters = HashSet::new();
        let mut dropped = 0usize;
        for cluster in &mut data.clusters {
            for cell in &mut cluster.cells {
                let Some(origin) = cell.pos else { continue };
                let before = cell.connection_count();
                cell.retain_connections(|target| {
                    positions
                        .get(&target)
                        .is_some_and(|pos| origin.distance(*pos) <= max_distance)
                });
                if cell.connection_count() != before {
                    dropped += before - cell.connection_count();
                    touched_clusters.insert(cluster.id);
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, "dropped over-long connections");
        }
        self.recluster(data, &touched_clusters);
    }

    fn duplicate(&self, data: &mut DataDescription, old_size: (i32, i32), new_size: (i32, i32)) {
        if old_size.0 <= 0 || old_size.1 <= 0 {
            return;
        }
        let tiles_x = (new_size.0 + old_size.0 - 1) / old_size.0;
        let tiles_y = (new_size.1 + old_size.1 - 1) / old_size.1;
        let inside = |pos: Vec2| {
            pos.x >= 0.0 && pos.y >= 0.0 && pos.x < new_size.0 as f32 && pos.y < new_size.1 as f32
        };

        let original = data.clone();
        for tile_x in 0..tiles_x {
            for tile_y in 0..tiles_y {
                if tile_x == 0 && tile_y == 0 {
                    continue;
                }
                let offset = Vec2::new(
                    (tile_x * old_size.0) as f32,
                    (tile_y * old_size.1) as f32,
                );
                for cluster in &original.clusters {
                    if !inside(cluster.cluster_pos_from_cells() + offset) {
                        continue;
                    }
                    let mut copy = self.renumbered(cluster);
                    for cell in &mut copy.cells {
                        if let Some(pos) = cell.pos.as_mut() {
                            *pos += offset;
                        }
                    }
                    data.add_cluster(copy);
                }
                for particle in &original.particles {
                    let Some(pos) = particle.pos.map(|pos| pos + offset) else {
                        continue;
                    };
                    if !inside(pos) {
                        continue;
                    }
                    let mut copy = particle.clone();
                    copy.pos = Some(pos);
                    self.make_valid_particle(&mut copy);
                    data.add_particle(copy);
                }
            }
        }
    }
}

fn last_target_pos(cell: &CellDescription, positions: &HashMap<EntityId, Vec2>) -> Option<Vec2> {
    let last = cell.connections.as_ref()?.last()?.cell_id;
    positions.get(&last).copied()
}
