//! Description values for cells, clusters, particles and whole snapshots.
//!
//! Every attribute other than the id is optional: in a delta context an unset
//! field means "leave as is", never "zero".

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EntityId, Vec2, normalize_degrees};

/// Errors raised while editing descriptions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DescriptionError {
    #[error("cell {cell} is not part of cluster {cluster}")]
    UnknownCell { cell: EntityId, cluster: EntityId },
    #[error("cell {0} cannot be connected to itself")]
    SelfConnection(EntityId),
    #[error("cell {0} has no position")]
    MissingPosition(EntityId),
    #[error("token index {index} out of range for cell {cell} holding {len} tokens")]
    TokenIndexOutOfRange {
        cell: EntityId,
        index: usize,
        len: usize,
    },
    #[error("cell id {0} occurs more than once in the snapshot")]
    DuplicateCellId(EntityId),
    #[error("cluster id {0} occurs more than once in the snapshot")]
    DuplicateClusterId(EntityId),
    #[error("particle id {0} occurs more than once in the snapshot")]
    DuplicateParticleId(EntityId),
}

/// Closed set of functions a cell can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum CellFunction {
    #[default]
    Computer,
    Propulsion,
    Scanner,
    Weapon,
    Constructor,
    Sensor,
    Communicator,
    Muscle,
}

impl CellFunction {
    /// Number of known variants.
    pub const COUNT: u8 = 8;

    pub const ALL: [Self; Self::COUNT as usize] = [
        Self::Computer,
        Self::Propulsion,
        Self::Scanner,
        Self::Weapon,
        Self::Constructor,
        Self::Sensor,
        Self::Communicator,
        Self::Muscle,
    ];

    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Decode a persisted tag. Out-of-range tags wrap into the known set.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self::ALL[(raw % Self::COUNT) as usize]
    }
}

/// Cell function together with its opaque payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CellFeatureDescription {
    #[serde(rename = "type")]
    raw_type: u8,
    pub volatile_data: Vec<u8>,
    pub const_data: Vec<u8>,
}

impl CellFeatureDescription {
    #[must_use]
    pub fn new(function: CellFunction) -> Self {
        Self::from_raw_type(function.raw())
    }

    /// Keep a raw tag exactly as persisted; decoding happens in [`Self::function`].
    #[must_use]
    pub fn from_raw_type(raw_type: u8) -> Self {
        Self {
            raw_type,
            volatile_data: Vec::new(),
            const_data: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_volatile_data(mut self, data: Vec<u8>) -> Self {
        self.volatile_data = data;
        self
    }

    #[must_use]
    pub fn with_const_data(mut self, data: Vec<u8>) -> Self {
        self.const_data = data;
        self
    }

    /// Logical function, with the stored tag taken modulo [`CellFunction::COUNT`].
    #[must_use]
    pub const fn function(&self) -> CellFunction {
        CellFunction::from_raw(self.raw_type)
    }

    #[must_use]
    pub const fn raw_type(&self) -> u8 {
        self.raw_type
    }

    pub fn set_function(&mut self, function: CellFunction) {
        self.raw_type = function.raw();
    }
}

/// Payload-carrying unit that sits on exactly one cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TokenDescription {
    pub energy: f64,
    pub data: Vec<u8>,
}

impl TokenDescription {
    #[must_use]
    pub fn new(energy: f64, data: Vec<u8>) -> Self {
        Self { energy, data }
    }

    /// Token with an all-zero memory of `memory_size` bytes.
    #[must_use]
    pub fn zeroed(energy: f64, memory_size: usize) -> Self {
        Self::new(energy, vec![0; memory_size])
    }
}

/// One side of a bond between two cells.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConnectionDescription {
    pub cell_id: EntityId,
    pub distance: f32,
    pub angle_from_previous: f32,
}

/// Build the connection record pointing from a cell at `origin` to `target_id`.
///
/// The angle is measured against the direction of the cell's previous
/// connection; the first connection of a cell gets an angle of zero.
pub(crate) fn make_connection(
    origin: Vec2,
    target_id: EntityId,
    target_pos: Vec2,
    previous_target_pos: Option<Vec2>,
) -> ConnectionDescription {
    let delta = target_pos - origin;
    let angle_from_previous = previous_target_pos.map_or(0.0, |previous| {
        normalize_degrees(delta.angle_degrees() - (previous - origin).angle_degrees())
    });
    ConnectionDescription {
        cell_id: target_id,
        distance: delta.length(),
        angle_from_previous,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CellMetadata {
    pub name: String,
    pub description: String,
    pub source_code: String,
    pub color: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ParticleMetadata {
    pub color: u8,
}

/// Sparse description of a single cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CellDescription {
    pub id: EntityId,
    pub pos: Option<Vec2>,
    pub vel: Option<Vec2>,
    pub energy: Option<f64>,
    pub max_connections: Option<u32>,
    pub connections: Option<Vec<ConnectionDescription>>,
    pub token_blocked: Option<bool>,
    pub token_branch_number: Option<u32>,
    pub metadata: Option<CellMetadata>,
    pub feature: Option<CellFeatureDescription>,
    pub tokens: Option<Vec<TokenDescription>>,
    pub token_usages: Option<u32>,
}

impl CellDescription {
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_pos(mut self, pos: Vec2) -> Self {
        self.pos = Some(pos);
        self
    }

    #[must_use]
    pub fn with_vel(mut self, vel: Vec2) -> Self {
        self.vel = Some(vel);
        self
    }

    #[must_use]
    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    #[must_use]
    pub fn with_connections(mut self, connections: Vec<ConnectionDescription>) -> Self {
        self.connections = Some(connections);
        self
    }

    #[must_use]
    pub fn with_token_blocked(mut self, blocked: bool) -> Self {
        self.token_blocked = Some(blocked);
        self
    }

    #[must_use]
    pub fn with_token_branch_number(mut self, branch: u32) -> Self {
        self.token_branch_number = Some(branch);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: CellMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn with_feature(mut self, feature: CellFeatureDescription) -> Self {
        self.feature = Some(feature);
        self
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: Vec<TokenDescription>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    #[must_use]
    pub fn with_token_usages(mut self, usages: u32) -> Self {
        self.token_usages = Some(usages);
        self
    }

    /// Whether one of this cell's connections points at `id`.
    #[must_use]
    pub fn is_connected_to(&self, id: EntityId) -> bool {
        self.connections
            .as_ref()
            .is_some_and(|connections| connections.iter().any(|c| c.cell_id == id))
    }

    /// Ids of all connected cells in insertion order.
    pub fn connected_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.connections.iter().flatten().map(|c| c.cell_id)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.as_ref().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.as_ref().map_or(0, Vec::len)
    }

    /// Append a token at the end of the token sequence.
    pub fn add_token(&mut self, token: TokenDescription) {
        self.tokens.get_or_insert_with(Vec::new).push(token);
    }

    /// Insert a token in front of position `index`; `index == len` appends.
    pub fn insert_token(
        &mut self,
        index: usize,
        token: TokenDescription,
    ) -> Result<(), DescriptionError> {
        let len = self.token_count();
        if index > len {
            return Err(DescriptionError::TokenIndexOutOfRange {
                cell: self.id,
                index,
                len,
            });
        }
        self.tokens.get_or_insert_with(Vec::new).insert(index, token);
        Ok(())
    }

    /// Remove and return the token at `index`.
    pub fn remove_token(&mut self, index: usize) -> Result<TokenDescription, DescriptionError> {
        let len = self.token_count();
        match self.tokens.as_mut() {
            Some(tokens) if index < len => Ok(tokens.remove(index)),
            _ => Err(DescriptionError::TokenIndexOutOfRange {
                cell: self.id,
                index,
                len,
            }),
        }
    }

    /// Drop every connection whose target does not satisfy `keep`.
    pub fn retain_connections(&mut self, mut keep: impl FnMut(EntityId) -> bool) {
        if let Some(connections) = self.connections.as_mut() {
            connections.retain(|c| keep(c.cell_id));
        }
    }
}

/// A set of cells that belong together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClusterDescription {
    pub id: EntityId,
    pub cells: Vec<CellDescription>,
}

impl ClusterDescription {
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            cells: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cell(mut self, cell: CellDescription) -> Self {
        self.cells.push(cell);
        self
    }

    #[must_use]
    pub fn with_cells(mut self, cells: impl IntoIterator<Item = CellDescription>) -> Self {
        self.cells.extend(cells);
        self
    }

    pub fn add_cell(&mut self, cell: CellDescription) -> &mut Self {
        self.cells.push(cell);
        self
    }

    pub fn add_cells(&mut self, cells: impl IntoIterator<Item = CellDescription>) -> &mut Self {
        self.cells.extend(cells);
        self
    }

    #[must_use]
    pub fn cell(&self, id: EntityId) -> Option<&CellDescription> {
        self.cells.iter().find(|cell| cell.id == id)
    }

    pub fn cell_mut(&mut self, id: EntityId) -> Option<&mut CellDescription> {
        self.cells.iter_mut().find(|cell| cell.id == id)
    }

    /// Connect two cells of this cluster in both directions.
    ///
    /// `cache` maps cell ids to their index in [`Self::cells`]; entries are
    /// verified and missing ones are filled in on the way. Connecting two
    /// cells that are already connected leaves them untouched.
    pub fn add_connection(
        &mut self,
        first: EntityId,
        second: EntityId,
        cache: &mut HashMap<EntityId, usize>,
    ) -> Result<&mut Self, DescriptionError> {
        if first == second {
            return Err(DescriptionError::SelfConnection(first));
        }
        let first_index = self.cell_index(first, cache)?;
        let second_index = self.cell_index(second, cache)?;

        let first_pos = self.cells[first_index]
            .pos
            .ok_or(DescriptionError::MissingPosition(first))?;
        let second_pos = self.cells[second_index]
            .pos
            .ok_or(DescriptionError::MissingPosition(second))?;

        if !self.cells[first_index].is_connected_to(second) {
            let previous = self.previous_target_pos(first_index, cache);
            let connection = make_connection(first_pos, second, second_pos, previous);
            self.cells[first_index]
                .connections
                .get_or_insert_with(Vec::new)
                .push(connection);
        }
        if !self.cells[second_index].is_connected_to(first) {
            let previous = self.previous_target_pos(second_index, cache);
            let connection = make_connection(second_pos, first, first_pos, previous);
            self.cells[second_index]
                .connections
                .get_or_insert_with(Vec::new)
                .push(connection);
        }
        Ok(self)
    }

    fn cell_index(
        &self,
        id: EntityId,
        cache: &mut HashMap<EntityId, usize>,
    ) -> Result<usize, DescriptionError> {
        if let Some(&index) = cache.get(&id)
            && self.cells.get(index).is_some_and(|cell| cell.id == id)
        {
            return Ok(index);
        }
        let index = self
            .cells
            .iter()
            .position(|cell| cell.id == id)
            .ok_or(DescriptionError::UnknownCell {
                cell: id,
                cluster: self.id,
            })?;
        cache.insert(id, index);
        Ok(index)
    }

    fn previous_target_pos(
        &self,
        index: usize,
        cache: &mut HashMap<EntityId, usize>,
    ) -> Option<Vec2> {
        let last = self.cells[index].connections.as_ref()?.last()?.cell_id;
        let target = self.cell_index(last, cache).ok()?;
        self.cells[target].pos
    }

    /// Centroid of the cells' positions; cells without a position are ignored.
    #[must_use]
    pub fn cluster_pos_from_cells(&self) -> Vec2 {
        let (sum, count) = self
            .cells
            .iter()
            .filter_map(|cell| cell.pos)
            .fold((Vec2::ZERO, 0usize), |(sum, count), pos| (sum + pos, count + 1));
        if count == 0 {
            Vec2::ZERO
        } else {
            sum / count as f32
        }
    }

    pub fn cell_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.cells.iter().map(|cell| cell.id)
    }
}

/// A free energy quantum without connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ParticleDescription {
    pub id: EntityId,
    pub pos: Option<Vec2>,
    pub vel: Option<Vec2>,
    pub energy: Option<f64>,
    pub metadata: Option<ParticleMetadata>,
}

impl ParticleDescription {
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_pos(mut self, pos: Vec2) -> Self {
        self.pos = Some(pos);
        self
    }

    #[must_use]
    pub fn with_vel(mut self, vel: Vec2) -> Self {
        self.vel = Some(vel);
        self
    }

    #[must_use]
    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: ParticleMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Snapshot of the editor-visible world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DataDescription {
    pub clusters: Vec<ClusterDescription>,
    pub particles: Vec<ParticleDescription>,
}

impl DataDescription {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cluster(&mut self, cluster: ClusterDescription) -> &mut Self {
        self.clusters.push(cluster);
        self
    }

    pub fn add_clusters(
        &mut self,
        clusters: impl IntoIterator<Item = ClusterDescription>,
    ) -> &mut Self {
        self.clusters.extend(clusters);
        self
    }

    pub fn add_particle(&mut self, particle: ParticleDescription) -> &mut Self {
        self.particles.push(particle);
        self
    }

    pub fn add_particles(
        &mut self,
        particles: impl IntoIterator<Item = ParticleDescription>,
    ) -> &mut Self {
        self.particles.extend(particles);
        self
    }

    pub fn clear(&mut self) {
        self.clusters.clear();
        self.particles.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.particles.is_empty()
    }

    /// Iterate over every cell of every cluster.
    pub fn cells(&self) -> impl Iterator<Item = &CellDescription> {
        self.clusters.iter().flat_map(|cluster| cluster.cells.iter())
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut CellDescription> {
        self.clusters
            .iter_mut()
            .flat_map(|cluster| cluster.cells.iter_mut())
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.clusters.iter().map(|cluster| cluster.cells.len()).sum()
    }

    /// Mean position over all positioned cells and particles.
    #[must_use]
    pub fn calc_center(&self) -> Vec2 {
        let positions = self
            .cells()
            .filter_map(|cell| cell.pos)
            .chain(self.particles.iter().filter_map(|particle| particle.pos));
        let (sum, count) = positions.fold((Vec2::ZERO, 0usize), |(sum, count), pos| {
            (sum + pos, count + 1)
        });
        if count == 0 {
            Vec2::ZERO
        } else {
            sum / count as f32
        }
    }

    /// Translate every cell and particle by `delta`.
    pub fn shift(&mut self, delta: Vec2) {
        for cell in self.cells_mut() {
            if let Some(pos) = cell.pos.as_mut() {
                *pos += delta;
            }
        }
        for particle in &mut self.particles {
            if let Some(pos) = particle.pos.as_mut() {
                *pos += delta;
            }
        }
    }

    /// Largest id used by any entity of the snapshot.
    #[must_use]
    pub fn max_id(&self) -> Option<EntityId> {
        self.clusters
            .iter()
            .map(|cluster| cluster.id)
            .chain(self.cells().map(|cell| cell.id))
            .chain(self.particles.iter().map(|particle| particle.id))
            .max()
    }

    /// Check that cluster ids and cell ids are unique across the whole
    /// snapshot and particle ids are unique among particles.
    pub fn validate_ids(&self) -> Result<(), DescriptionError> {
        let mut cluster_ids = HashSet::with_capacity(self.clusters.len());
        let mut cell_ids = HashSet::with_capacity(self.cell_count());
        for cluster in &self.clusters {
            if !cluster_ids.insert(cluster.id) {
                return Err(DescriptionError::DuplicateClusterId(cluster.id));
            }
            for cell in &cluster.cells {
                if !cell_ids.insert(cell.id) {
                    return Err(DescriptionError::DuplicateCellId(cell.id));
                }
            }
        }
        let mut particle_ids = HashSet::with_capacity(self.particles.len());
        for particle in &self.particles {
            if !particle_ids.insert(particle.id) {
                return Err(DescriptionError::DuplicateParticleId(particle.id));
            }
        }
        Ok(())
    }

    /// Equality keyed by ids: ordering of clusters, cells and particles is
    /// ignored, every field of matching entities must be equal.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        if self.clusters.len() != other.clusters.len()
            || self.particles.len() != other.particles.len()
        {
            return false;
        }
        let other_clusters: HashMap<EntityId, &ClusterDescription> = other
            .clusters
            .iter()
            .map(|cluster| (cluster.id, cluster))
            .collect();
        let clusters_match = self.clusters.iter().all(|cluster| {
            other_clusters.get(&cluster.id).is_some_and(|other_cluster| {
                cluster.cells.len() == other_cluster.cells.len()
                    && cluster
                        .cells
                        .iter()
                        .all(|cell| other_cluster.cell(cell.id) == Some(cell))
            })
        });
        if !clusters_match {
            return false;
        }
        let other_particles: HashMap<EntityId, &ParticleDescription> = other
            .particles
            .iter()
            .map(|particle| (particle.id, particle))
            .collect();
        self.particles
            .iter()
            .all(|particle| other_particles.get(&particle.id) == Some(&particle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_at(id: EntityId, x: f32, y: f32) -> CellDescription {
        CellDescription::new(id)
            .with_pos(Vec2::new(x, y))
            .with_max_connections(4)
            .with_connections(Vec::new())
    }

    #[test]
    fn feature_tag_wraps_into_known_functions() {
        let feature = CellFeatureDescription::from_raw_type(CellFunction::COUNT + 3);
        assert_eq!(feature.function(), CellFunction::Weapon);
        assert_eq!(feature.raw_type(), 11);
        assert_ne!(feature, CellFeatureDescription::new(CellFunction::Weapon));
    }

    #[test]
    fn add_connection_is_symmetric() {
        let mut cluster = ClusterDescription::new(1)
            .with_cell(cell_at(10, 0.0, 0.0))
            .with_cell(cell_at(11, 3.0, 4.0));
        let mut cache = HashMap::new();
        cluster.add_connection(10, 11, &mut cache).expect("connect");

        let a = cluster.cell(10).expect("a");
        let b = cluster.cell(11).expect("b");
        assert!(a.is_connected_to(11));
        assert!(b.is_connected_to(10));
        let a_to_b = a.connections.as_ref().expect("connections")[0];
        let b_to_a = b.connections.as_ref().expect("connections")[0];
        assert!((a_to_b.distance - 5.0).abs() < 1e-5);
        assert_eq!(a_to_b.distance, b_to_a.distance);
        assert_eq!(cache.get(&11), Some(&1));
    }

    #[test]
    fn second_connection_measures_angle_from_previous() {
        let mut cluster = ClusterDescription::new(1)
            .with_cell(cell_at(1, 0.0, 0.0))
            .with_cell(cell_at(2, 0.0, -1.0))
            .with_cell(cell_at(3, 1.0, 0.0));
        let mut cache = HashMap::new();
        cluster.add_connection(1, 2, &mut cache).expect("first");
        cluster.add_connection(1, 3, &mut cache).expect("second");
        let connections = cluster.cell(1).and_then(|c| c.connections.clone()).expect("conns");
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].angle_from_previous, 0.0);
        assert!((connections[1].angle_from_previous - 90.0).abs() < 1e-3);
    }

    #[test]
    fn add_connection_rejects_unknown_and_self() {
        let mut cluster = ClusterDescription::new(7).with_cell(cell_at(1, 0.0, 0.0));
        let mut cache = HashMap::new();
        assert_eq!(
            cluster.add_connection(1, 99, &mut cache).err(),
            Some(DescriptionError::UnknownCell {
                cell: 99,
                cluster: 7
            })
        );
        assert_eq!(
            cluster.add_connection(1, 1, &mut cache).err(),
            Some(DescriptionError::SelfConnection(1))
        );
        assert!(!cluster.cells[0].is_connected_to(99));
    }

    #[test]
    fn stale_cache_entries_are_corrected() {
        let mut cluster = ClusterDescription::new(1)
            .with_cell(cell_at(1, 0.0, 0.0))
            .with_cell(cell_at(2, 1.0, 0.0));
        let mut cache = HashMap::from([(1, 1), (2, 0)]);
        cluster.add_connection(1, 2, &mut cache).expect("connect");
        assert_eq!(cache.get(&1), Some(&0));
        assert_eq!(cache.get(&2), Some(&1));
    }

    #[test]
    fn is_connected_to_without_connections_is_false() {
        assert!(!CellDescription::new(1).is_connected_to(2));
    }

    #[test]
    fn token_insert_and_remove_respect_bounds() {
        let mut cell = CellDescription::new(3);
        cell.insert_token(0, TokenDescription::zeroed(1.0, 4)).expect("insert");
        cell.insert_token(0, TokenDescription::zeroed(2.0, 4)).expect("insert");
        assert_eq!(cell.token_count(), 2);
        assert_eq!(cell.tokens.as_ref().expect("tokens")[0].energy, 2.0);
        assert!(cell.insert_token(5, TokenDescription::default()).is_err());
        let removed = cell.remove_token(1).expect("remove");
        assert_eq!(removed.energy, 1.0);
        assert_eq!(
            cell.remove_token(1),
            Err(DescriptionError::TokenIndexOutOfRange {
                cell: 3,
                index: 1,
                len: 1
            })
        );
    }

    #[test]
    fn centroid_and_shift() {
        let mut data = DataDescription::new();
        data.add_cluster(
            ClusterDescription::new(1)
                .with_cell(cell_at(1, 0.0, 0.0))
                .with_cell(cell_at(2, 2.0, 0.0)),
        );
        data.add_particle(ParticleDescription::new(5).with_pos(Vec2::new(4.0, 3.0)));
        assert_eq!(data.clusters[0].cluster_pos_from_cells(), Vec2::new(1.0, 0.0));
        assert_eq!(data.calc_center(), Vec2::new(2.0, 1.0));

        data.shift(Vec2::new(1.0, -1.0));
        assert_eq!(data.particles[0].pos, Some(Vec2::new(5.0, 2.0)));
        assert_eq!(data.calc_center(), Vec2::new(3.0, 0.0));
    }

    #[test]
    fn empty_snapshot_reports_empty() {
        let mut data = DataDescription::new();
        assert!(data.is_empty());
        data.add_particle(ParticleDescription::new(1));
        assert!(!data.is_empty());
        data.clear();
        assert!(data.is_empty());
    }

    #[test]
    fn validate_ids_checks_cells_across_clusters() {
        let mut data = DataDescription::new();
        data.add_cluster(ClusterDescription::new(1).with_cell(cell_at(5, 0.0, 0.0)));
        data.add_cluster(ClusterDescription::new(2).with_cell(cell_at(5, 1.0, 0.0)));
        assert_eq!(data.validate_ids(), Err(DescriptionError::DuplicateCellId(5)));
    }

    #[test]
    fn structural_equality_ignores_order() {
        let mut a = DataDescription::new();
        a.add_cluster(
            ClusterDescription::new(1)
                .with_cell(cell_at(1, 0.0, 0.0))
                .with_cell(cell_at(2, 1.0, 0.0)),
        );
        a.add_particle(ParticleDescription::new(9).with_energy(1.0));
        a.add_particle(ParticleDescription::new(8).with_energy(2.0));

        let mut b = a.clone();
        b.clusters[0].cells.reverse();
        b.particles.reverse();
        assert!(a.structurally_eq(&b));

        b.particles[0].energy = Some(3.0);
        assert!(!a.structurally_eq(&b));
    }
}
