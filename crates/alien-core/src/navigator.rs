//! Id lookup tables derived from a [`DataDescription`] snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use crate::EntityId;
use crate::description::DataDescription;

/// Errors raised by navigator lookups.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorError {
    #[error("navigator queried before the first update")]
    NotInitialized,
    #[error("cell {0} not found")]
    CellNotFound(EntityId),
    #[error("cluster {0} not found")]
    ClusterNotFound(EntityId),
    #[error("particle {0} not found")]
    ParticleNotFound(EntityId),
}

#[derive(Debug, Clone, Default)]
struct NavigatorIndex {
    cell_ids: HashSet<EntityId>,
    particle_ids: HashSet<EntityId>,
    cluster_ids_by_cell_ids: BTreeMap<EntityId, EntityId>,
    cluster_indices_by_cluster_ids: HashMap<EntityId, usize>,
    cluster_indices_by_cell_ids: HashMap<EntityId, usize>,
    cell_indices_by_cell_ids: HashMap<EntityId, usize>,
    particle_indices_by_particle_ids: HashMap<EntityId, usize>,
}

/// Disposable index over one snapshot.
///
/// The index is never patched; any structural change to the snapshot must be
/// followed by a full [`DescriptionNavigator::update`].
#[derive(Debug, Clone, Default)]
pub struct DescriptionNavigator {
    index: Option<NavigatorIndex>,
}

impl DescriptionNavigator {
    /// Create an empty navigator; every query fails until [`Self::update`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a navigator for `data` in one step.
    #[must_use]
    pub fn from_data(data: &DataDescription) -> Self {
        let mut navigator = Self::new();
        navigator.update(data);
        navigator
    }

    /// Rebuild every table from `data` in a single linear pass.
    pub fn update(&mut self, data: &DataDescription) {
        let mut index = NavigatorIndex {
            cell_ids: HashSet::with_capacity(data.cell_count()),
            particle_ids: HashSet::with_capacity(data.particles.len()),
            ..NavigatorIndex::default()
        };

        for (cluster_index, cluster) in data.clusters.iter().enumerate() {
            index
                .cluster_indices_by_cluster_ids
                .insert(cluster.id, cluster_index);
            for (cell_index, cell) in cluster.cells.iter().enumerate() {
                index.cluster_ids_by_cell_ids.insert(cell.id, cluster.id);
                index
                    .cluster_indices_by_cell_ids
                    .insert(cell.id, cluster_index);
                index.cell_indices_by_cell_ids.insert(cell.id, cell_index);
                index.cell_ids.insert(cell.id);
            }
        }

        for (particle_index, particle) in data.particles.iter().enumerate() {
            index
                .particle_indices_by_particle_ids
                .insert(particle.id, particle_index);
            index.particle_ids.insert(particle.id);
        }

        self.index = Some(index);
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.index.is_some()
    }

    fn index(&self) -> Result<&NavigatorIndex, NavigatorError> {
        self.index.as_ref().ok_or(NavigatorError::NotInitialized)
    }

    pub fn contains_cell(&self, cell_id: EntityId) -> Result<bool, NavigatorError> {
        Ok(self.index()?.cell_ids.contains(&cell_id))
    }

    pub fn contains_particle(&self, particle_id: EntityId) -> Result<bool, NavigatorError> {
        Ok(self.index()?.particle_ids.contains(&particle_id))
    }

    pub fn contains_cluster(&self, cluster_id: EntityId) -> Result<bool, NavigatorError> {
        Ok(self
            .index()?
            .cluster_indices_by_cluster_ids
            .contains_key(&cluster_id))
    }

    pub fn cell_ids(&self) -> Result<&HashSet<EntityId>, NavigatorError> {
        Ok(&self.index()?.cell_ids)
    }

    pub fn particle_ids(&self) -> Result<&HashSet<EntityId>, NavigatorError> {
        Ok(&self.index()?.particle_ids)
    }

    /// Id of the cluster owning `cell_id`.
    pub fn cluster_id_of_cell(&self, cell_id: EntityId) -> Result<EntityId, NavigatorError> {
        self.index()?
            .cluster_ids_by_cell_ids
            .get(&cell_id)
            .copied()
            .ok_or(NavigatorError::CellNotFound(cell_id))
    }

    /// Position of the cluster owning `cell_id` in the cluster sequence.
    pub fn cluster_index_of_cell(&self, cell_id: EntityId) -> Result<usize, NavigatorError> {
        self.index()?
            .cluster_indices_by_cell_ids
            .get(&cell_id)
            .copied()
            .ok_or(NavigatorError::CellNotFound(cell_id))
    }

    /// Position of `cell_id` inside its cluster.
    pub fn cell_index(&self, cell_id: EntityId) -> Result<usize, NavigatorError> {
        self.index()?
            .cell_indices_by_cell_ids
            .get(&cell_id)
            .copied()
            .ok_or(NavigatorError::CellNotFound(cell_id))
    }

    pub fn cluster_index(&self, cluster_id: EntityId) -> Result<usize, NavigatorError> {
        self.index()?
            .cluster_indices_by_cluster_ids
            .get(&cluster_id)
            .copied()
            .ok_or(NavigatorError::ClusterNotFound(cluster_id))
    }

    pub fn particle_index(&self, particle_id: EntityId) -> Result<usize, NavigatorError> {
        self.index()?
            .particle_indices_by_particle_ids
            .get(&particle_id)
            .copied()
            .ok_or(NavigatorError::ParticleNotFound(particle_id))
    }

    /// `(cell id, cluster id)` pairs ordered by cell id.
    pub fn cluster_ids_by_cell_ids(
        &self,
    ) -> Result<impl Iterator<Item = (EntityId, EntityId)> + '_, NavigatorError> {
        Ok(self
            .index()?
            .cluster_ids_by_cell_ids
            .iter()
            .map(|(&cell, &cluster)| (cell, cluster)))
    }
}
