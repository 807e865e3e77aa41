//! Field-level deltas between two snapshots.
//!
//! A delta is computed against the last snapshot known to the engine and
//! carries only what differs: created entities in full, modified entities
//! with just their changed fields set, and ids of deleted entities.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EntityId;
use crate::description::{
    CellDescription, ClusterDescription, DataDescription, DescriptionError, ParticleDescription,
};

/// State of one entity in a delta.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Change<T> {
    Created(T),
    Modified(T),
    Deleted(EntityId),
}

impl<T> Change<T> {
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    #[must_use]
    pub const fn is_modified(&self) -> bool {
        matches!(self, Self::Modified(_))
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}

/// Sparse cell description: set fields are the ones that changed.
pub type CellChange = CellDescription;

/// Sparse particle description: set fields are the ones that changed.
pub type ParticleChange = ParticleDescription;

/// Cell-level changes inside one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClusterChange {
    pub id: EntityId,
    pub cells: Vec<Change<CellChange>>,
}

impl ClusterChange {
    /// Change that creates `cluster` with all of its cells.
    #[must_use]
    pub fn created(cluster: &ClusterDescription) -> Self {
        Self {
            id: cluster.id,
            cells: cluster.cells.iter().cloned().map(Change::Created).collect(),
        }
    }

    fn to_created_cluster(&self) -> Result<ClusterDescription, ChangeConflict> {
        let mut cluster = ClusterDescription::new(self.id);
        for change in &self.cells {
            match change {
                Change::Created(cell) => {
                    cluster.add_cell(cell.clone());
                }
                Change::Modified(cell) => {
                    return Err(ChangeConflict::UnexpectedCellChange {
                        cluster: self.id,
                        cell: cell.id,
                    });
                }
                Change::Deleted(cell) => {
                    return Err(ChangeConflict::UnexpectedCellChange {
                        cluster: self.id,
                        cell: *cell,
                    });
                }
            }
        }
        Ok(cluster)
    }
}

/// A single inconsistency found while applying a delta.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChangeConflict {
    #[error("cluster {0} does not exist")]
    UnknownCluster(EntityId),
    #[error("cell {cell} does not exist in cluster {cluster}")]
    UnknownCell { cluster: EntityId, cell: EntityId },
    #[error("particle {0} does not exist")]
    UnknownParticle(EntityId),
    #[error("cluster {0} already exists")]
    ClusterExists(EntityId),
    #[error("cell {cell} already exists in cluster {cluster}")]
    CellExists { cluster: EntityId, cell: EntityId },
    #[error("particle {0} already exists")]
    ParticleExists(EntityId),
    #[error("created cluster {cluster} carries a non-creation change for cell {cell}")]
    UnexpectedCellChange { cluster: EntityId, cell: EntityId },
    #[error(transparent)]
    Invariant(#[from] DescriptionError),
}

/// Errors produced by the delta engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChangeError {
    #[error("snapshot violates id invariants: {0}")]
    InvalidSnapshot(#[from] DescriptionError),
    #[error("delta rejected with {} conflict(s)", .0.len())]
    Conflicts(Vec<ChangeConflict>),
}

/// Entity counts of a delta, mostly for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub created_clusters: usize,
    pub modified_clusters: usize,
    pub deleted_clusters: usize,
    pub created_cells: usize,
    pub modified_cells: usize,
    pub deleted_cells: usize,
    pub created_particles: usize,
    pub modified_particles: usize,
    pub deleted_particles: usize,
}

/// Minimal difference between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DataChangeDescription {
    pub clusters: Vec<Change<ClusterChange>>,
    pub particles: Vec<Change<ParticleChange>>,
}

impl DataChangeDescription {
    /// Compute the delta turning `unchanged` into `current`.
    pub fn diff(
        unchanged: &DataDescription,
        current: &DataDescription,
    ) -> Result<Self, ChangeError> {
        unchanged.validate_ids()?;
        current.validate_ids()?;

        let before_clusters: HashMap<EntityId, &ClusterDescription> = unchanged
            .clusters
            .iter()
            .map(|cluster| (cluster.id, cluster))
            .collect();
        let current_cluster_ids: HashSet<EntityId> =
            current.clusters.iter().map(|cluster| cluster.id).collect();

        let mut clusters = Vec::new();
        for cluster in &current.clusters {
            match before_clusters.get(&cluster.id) {
                None => clusters.push(Change::Created(ClusterChange::created(cluster))),
                Some(before) => {
                    let cells = diff_cells(&before.cells, &cluster.cells);
                    if !cells.is_empty() {
                        clusters.push(Change::Modified(ClusterChange {
                            id: cluster.id,
                            cells,
                        }));
                    }
                }
            }
        }
        clusters.extend(
            unchanged
                .clusters
                .iter()
                .filter(|cluster| !current_cluster_ids.contains(&cluster.id))
                .map(|cluster| Change::Deleted(cluster.id)),
        );

        let before_particles: HashMap<EntityId, &ParticleDescription> = unchanged
            .particles
            .iter()
            .map(|particle| (particle.id, particle))
            .collect();
        let current_particle_ids: HashSet<EntityId> =
            current.particles.iter().map(|particle| particle.id).collect();

        let mut particles = Vec::new();
        for particle in &current.particles {
            match before_particles.get(&particle.id) {
                None => particles.push(Change::Created(particle.clone())),
                Some(before) if particle_clears_field(before, particle) => {
                    particles.push(Change::Deleted(particle.id));
                    particles.push(Change::Created(particle.clone()));
                }
                Some(before) => {
                    if let Some(change) = diff_particle(before, particle) {
                        particles.push(Change::Modified(change));
                    }
                }
            }
        }
        particles.extend(
            unchanged
                .particles
                .iter()
                .filter(|particle| !current_particle_ids.contains(&particle.id))
                .map(|particle| Change::Deleted(particle.id)),
        );

        Ok(Self {
            clusters,
            particles,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.particles.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for change in &self.clusters {
            match change {
                Change::Created(cluster) => {
                    summary.created_clusters += 1;
                    summary.created_cells += cluster.cells.len();
                }
                Change::Modified(cluster) => {
                    summary.modified_clusters += 1;
                    for cell in &cluster.cells {
                        match cell {
                            Change::Created(_) => summary.created_cells += 1,
                            Change::Modified(_) => summary.modified_cells += 1,
                            Change::Deleted(_) => summary.deleted_cells += 1,
                        }
                    }
                }
                Change::Deleted(_) => summary.deleted_clusters += 1,
            }
        }
        for change in &self.particles {
            match change {
                Change::Created(_) => summary.created_particles += 1,
                Change::Modified(_) => summary.modified_particles += 1,
                Change::Deleted(_) => summary.deleted_particles += 1,
            }
        }
        summary
    }

    /// Apply the delta to `data`.
    ///
    /// Either every change is applied or `data` is left untouched and all
    /// conflicts are reported together.
    pub fn apply(&self, data: &mut DataDescription) -> Result<(), ChangeError> {
        let mut next = data.clone();
        let mut conflicts = Vec::new();

        for change in &self.clusters {
            if let Change::Deleted(id) = change {
                match next.clusters.iter().position(|cluster| cluster.id == *id) {
                    Some(index) => {
                        next.clusters.remove(index);
                    }
                    None => conflicts.push(ChangeConflict::UnknownCluster(*id)),
                }
            }
        }

        let mut cluster_indices: HashMap<EntityId, usize> = next
            .clusters
            .iter()
            .enumerate()
            .map(|(index, cluster)| (cluster.id, index))
            .collect();
        for change in &self.clusters {
            match change {
                Change::Modified(cluster_change) => {
                    match cluster_indices.get(&cluster_change.id) {
                        Some(&index) => apply_cell_changes(
                            &mut next.clusters[index],
                            &cluster_change.cells,
                            &mut conflicts,
                        ),
                        None => conflicts.push(ChangeConflict::UnknownCluster(cluster_change.id)),
                    }
                }
                Change::Created(cluster_change) => {
                    if cluster_indices.contains_key(&cluster_change.id) {
                        conflicts.push(ChangeConflict::ClusterExists(cluster_change.id));
                        continue;
                    }
                    match cluster_change.to_created_cluster() {
                        Ok(cluster) => {
                            cluster_indices.insert(cluster.id, next.clusters.len());
                            next.clusters.push(cluster);
                        }
                        Err(conflict) => conflicts.push(conflict),
                    }
                }
                Change::Deleted(_) => {}
            }
        }

        for change in &self.particles {
            if let Change::Deleted(id) = change {
                match next.particles.iter().position(|particle| particle.id == *id) {
                    Some(index) => {
                        next.particles.remove(index);
                    }
                    None => conflicts.push(ChangeConflict::UnknownParticle(*id)),
                }
            }
        }
        let mut particle_indices: HashMap<EntityId, usize> = next
            .particles
            .iter()
            .enumerate()
            .map(|(index, particle)| (particle.id, index))
            .collect();
        for change in &self.particles {
            match change {
                Change::Modified(particle_change) => {
                    match particle_indices.get(&particle_change.id) {
                        Some(&index) => merge_particle(&mut next.particles[index], particle_change),
                        None => {
                            conflicts.push(ChangeConflict::UnknownParticle(particle_change.id));
                        }
                    }
                }
                Change::Created(particle) => {
                    if particle_indices.contains_key(&particle.id) {
                        conflicts.push(ChangeConflict::ParticleExists(particle.id));
                    } else {
                        particle_indices.insert(particle.id, next.particles.len());
                        next.particles.push(particle.clone());
                    }
                }
                Change::Deleted(_) => {}
            }
        }

        if conflicts.is_empty()
            && let Err(err) = next.validate_ids()
        {
            conflicts.push(err.into());
        }
        if !conflicts.is_empty() {
            return Err(ChangeError::Conflicts(conflicts));
        }
        *data = next;
        Ok(())
    }
}

fn diff_cells(before: &[CellDescription], current: &[CellDescription]) -> Vec<Change<CellChange>> {
    let before_by_id: HashMap<EntityId, &CellDescription> =
        before.iter().map(|cell| (cell.id, cell)).collect();
    let current_ids: HashSet<EntityId> = current.iter().map(|cell| cell.id).collect();

    let mut changes = Vec::new();
    for cell in current {
        match before_by_id.get(&cell.id) {
            None => changes.push(Change::Created(cell.clone())),
            // A sparse change cannot unset a field, so the cell is replaced.
            Some(previous) if cell_clears_field(previous, cell) => {
                changes.push(Change::Deleted(cell.id));
                changes.push(Change::Created(cell.clone()));
            }
            Some(previous) => {
                if let Some(change) = diff_cell(previous, cell) {
                    changes.push(Change::Modified(change));
                }
            }
        }
    }
    changes.extend(
        before
            .iter()
            .filter(|cell| !current_ids.contains(&cell.id))
            .map(|cell| Change::Deleted(cell.id)),
    );
    changes
}

/// Value of `current` when it is set and differs from `before`.
fn changed<T: PartialEq + Clone>(before: &Option<T>, current: &Option<T>) -> Option<T> {
    match current {
        Some(value) if before.as_ref() != Some(value) => Some(value.clone()),
        _ => None,
    }
}

fn cleared<T>(before: &Option<T>, current: &Option<T>) -> bool {
    before.is_some() && current.is_none()
}

fn cell_clears_field(before: &CellDescription, current: &CellDescription) -> bool {
    cleared(&before.pos, &current.pos)
        || cleared(&before.vel, &current.vel)
        || cleared(&before.energy, &current.energy)
        || cleared(&before.max_connections, &current.max_connections)
        || cleared(&before.connections, &current.connections)
        || cleared(&before.token_blocked, &current.token_blocked)
        || cleared(&before.token_branch_number, &current.token_branch_number)
        || cleared(&before.metadata, &current.metadata)
        || cleared(&before.feature, &current.feature)
        || cleared(&before.tokens, &current.tokens)
        || cleared(&before.token_usages, &current.token_usages)
}

fn particle_clears_field(before: &ParticleDescription, current: &ParticleDescription) -> bool {
    cleared(&before.pos, &current.pos)
        || cleared(&before.vel, &current.vel)
        || cleared(&before.energy, &current.energy)
        || cleared(&before.metadata, &current.metadata)
}

/// Unset change fields never overwrite.
fn overwrite<T: Clone>(target: &mut Option<T>, change: &Option<T>) {
    if let Some(value) = change {
        *target = Some(value.clone());
    }
}

fn diff_cell(before: &CellDescription, current: &CellDescription) -> Option<CellChange> {
    let change = CellChange {
        id: current.id,
        pos: changed(&before.pos, &current.pos),
        vel: changed(&before.vel, &current.vel),
        energy: changed(&before.energy, &current.energy),
        max_connections: changed(&before.max_connections, &current.max_connections),
        connections: changed(&before.connections, &current.connections),
        token_blocked: changed(&before.token_blocked, &current.token_blocked),
        token_branch_number: changed(&before.token_branch_number, &current.token_branch_number),
        metadata: changed(&before.metadata, &current.metadata),
        feature: changed(&before.feature, &current.feature),
        tokens: changed(&before.tokens, &current.tokens),
        token_usages: changed(&before.token_usages, &current.token_usages),
    };
    (change != CellChange::new(current.id)).then_some(change)
}

fn merge_cell(target: &mut CellDescription, change: &CellChange) {
    overwrite(&mut target.pos, &change.pos);
    overwrite(&mut target.vel, &change.vel);
    overwrite(&mut target.energy, &change.energy);
    overwrite(&mut target.max_connections, &change.max_connections);
    overwrite(&mut target.connections, &change.connections);
    overwrite(&mut target.token_blocked, &change.token_blocked);
    overwrite(&mut target.token_branch_number, &change.token_branch_number);
    overwrite(&mut target.metadata, &change.metadata);
    overwrite(&mut target.feature, &change.feature);
    overwrite(&mut target.tokens, &change.tokens);
    overwrite(&mut target.token_usages, &change.token_usages);
}

fn diff_particle(
    before: &ParticleDescription,
    current: &ParticleDescription,
) -> Option<ParticleChange> {
    let change = ParticleChange {
        id: current.id,
        pos: changed(&before.pos, &current.pos),
        vel: changed(&before.vel, &current.vel),
        energy: changed(&before.energy, &current.energy),
        metadata: changed(&before.metadata, &current.metadata),
    };
    (change != ParticleChange::new(current.id)).then_some(change)
}

fn merge_particle(target: &mut ParticleDescription, change: &ParticleChange) {
    overwrite(&mut target.pos, &change.pos);
    overwrite(&mut target.vel, &change.vel);
    overwrite(&mut target.energy, &change.energy);
    overwrite(&mut target.metadata, &change.metadata);
}

fn apply_cell_changes(
    cluster: &mut ClusterDescription,
    changes: &[Change<CellChange>],
    conflicts: &mut Vec<ChangeConflict>,
) {
    for change in changes {
        if let Change::Deleted(id) = change {
            match cluster.cells.iter().position(|cell| cell.id == *id) {
                Some(index) => {
                    cluster.cells.remove(index);
                }
                None => conflicts.push(ChangeConflict::UnknownCell {
                    cluster: cluster.id,
                    cell: *id,
                }),
            }
        }
    }
    let mut cell_indices: HashMap<EntityId, usize> = cluster
        .cells
        .iter()
        .enumerate()
        .map(|(index, cell)| (cell.id, index))
        .collect();
    for change in changes {
        match change {
            Change::Modified(cell_change) => match cell_indices.get(&cell_change.id) {
                Some(&index) => merge_cell(&mut cluster.cells[index], cell_change),
                None => conflicts.push(ChangeConflict::UnknownCell {
                    cluster: cluster.id,
                    cell: cell_change.id,
                }),
            },
            Change::Created(cell) => {
                if cell_indices.contains_key(&cell.id) {
                    conflicts.push(ChangeConflict::CellExists {
                        cluster: cluster.id,
                        cell: cell.id,
                    });
                } else {
                    cell_indices.insert(cell.id, cluster.cells.len());
                    cluster.cells.push(cell.clone());
                }
            }
            Change::Deleted(_) => {}
        }
    }
}
