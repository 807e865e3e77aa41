//! Editing session over one snapshot.
//!
//! [`DataEditor`] owns the live snapshot, the last engine-synced baseline, the
//! navigator over the live snapshot and the current selection. Deltas are only
//! pushed to the engine when a notification explicitly targets
//! [`Receiver::Simulation`].

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::access::{IntRect, ResolveDescription, SimulationAccess};
use crate::change::{ChangeError, ChangeSummary, DataChangeDescription};
use crate::description::{
    CellDescription, CellFeatureDescription, CellFunction, CellMetadata, ClusterDescription,
    DataDescription, DescriptionError, ParticleDescription, TokenDescription,
};
use crate::helper::DescriptionHelper;
use crate::navigator::{DescriptionNavigator, NavigatorError};
use crate::settings::SimulationParameters;
use crate::{EntityId, Vec2};

/// Errors raised by editor operations.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Navigator(#[from] NavigatorError),
    #[error(transparent)]
    Description(#[from] DescriptionError),
    #[error(transparent)]
    Change(#[from] ChangeError),
    #[error("operation requires a non-empty selection")]
    EmptySelection,
    #[error("operation requires exactly one selected cell, {0} selected")]
    SingleCellRequired(usize),
    #[error("operation requires a selected token")]
    NoTokenSelected,
    #[error("cell {cell} already holds the maximum of {limit} tokens")]
    TokenLimitReached { cell: EntityId, limit: u32 },
}

/// Components that can be targeted by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Receiver {
    Simulation,
    VisualEditor,
    DataEditor,
    ActionController,
    Toolbar,
}

/// Which parts of the targets need refreshing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UpdateDescription {
    #[default]
    All,
    AllExceptToolbar,
    AllExceptSymbols,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub targets: BTreeSet<Receiver>,
    pub update: UpdateDescription,
}

impl Notification {
    #[must_use]
    pub fn new(targets: impl IntoIterator<Item = Receiver>, update: UpdateDescription) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            update,
        }
    }

    #[must_use]
    pub fn targets(&self, receiver: Receiver) -> bool {
        self.targets.contains(&receiver)
    }
}

/// Selection counts for status displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSummary {
    pub selected_cells: usize,
    /// Cells of every cluster touched by the selection.
    pub extended_cells: usize,
    pub selected_particles: usize,
}

pub struct DataEditor {
    data: DataDescription,
    unchanged: DataDescription,
    navigator: DescriptionNavigator,
    helper: Box<dyn DescriptionHelper + Send>,
    parameters: SimulationParameters,
    rect: IntRect,
    selected_cell_ids: HashSet<EntityId>,
    selected_cluster_ids: HashSet<EntityId>,
    selected_particle_ids: HashSet<EntityId>,
    selected_token_index: Option<usize>,
}

impl std::fmt::Debug for DataEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataEditor")
            .field("clusters", &self.data.clusters.len())
            .field("particles", &self.data.particles.len())
            .field("selected_cells", &self.selected_cell_ids.len())
            .field("selected_particles", &self.selected_particle_ids.len())
            .finish_non_exhaustive()
    }
}

impl DataEditor {
    #[must_use]
    pub fn new(
        helper: Box<dyn DescriptionHelper + Send>,
        parameters: SimulationParameters,
    ) -> Self {
        let data = DataDescription::new();
        Self {
            navigator: DescriptionNavigator::from_data(&data),
            unchanged: data.clone(),
            data,
            helper,
            parameters,
            rect: IntRect::default(),
            selected_cell_ids: HashSet::new(),
            selected_cluster_ids: HashSet::new(),
            selected_particle_ids: HashSet::new(),
            selected_token_index: None,
        }
    }

    #[must_use]
    pub fn data(&self) -> &DataDescription {
        &self.data
    }

    /// Baseline the next delta is computed against.
    #[must_use]
    pub fn unchanged_data(&self) -> &DataDescription {
        &self.unchanged
    }

    #[must_use]
    pub fn navigator(&self) -> &DescriptionNavigator {
        &self.navigator
    }

    #[must_use]
    pub fn parameters(&self) -> &SimulationParameters {
        &self.parameters
    }

    pub fn set_parameters(&mut self, parameters: SimulationParameters) {
        self.helper.set_parameters(&parameters);
        self.parameters = parameters;
    }

    /// Region of the last data request; new entities are placed around its
    /// centre.
    #[must_use]
    pub fn rect(&self) -> IntRect {
        self.rect
    }

    pub fn cell(&self, cell_id: EntityId) -> Result<&CellDescription, EditorError> {
        let cluster = self.navigator.cluster_index_of_cell(cell_id)?;
        let cell = self.navigator.cell_index(cell_id)?;
        Ok(&self.data.clusters[cluster].cells[cell])
    }

    fn cell_mut(&mut self, cell_id: EntityId) -> Result<&mut CellDescription, EditorError> {
        let cluster = self.navigator.cluster_index_of_cell(cell_id)?;
        let cell = self.navigator.cell_index(cell_id)?;
        Ok(&mut self.data.clusters[cluster].cells[cell])
    }

    pub fn cluster_of_cell(&self, cell_id: EntityId) -> Result<&ClusterDescription, EditorError> {
        let cluster = self.navigator.cluster_index_of_cell(cell_id)?;
        Ok(&self.data.clusters[cluster])
    }

    pub fn particle(&self, particle_id: EntityId) -> Result<&ParticleDescription, EditorError> {
        let index = self.navigator.particle_index(particle_id)?;
        Ok(&self.data.particles[index])
    }

    #[must_use]
    pub fn selected_token_index(&self) -> Option<usize> {
        self.selected_token_index
    }

    pub fn set_selected_token_index(&mut self, index: Option<usize>) {
        self.selected_token_index = index;
    }

    /// Create a single-cell cluster at `pos_delta` from the view centre and
    /// select it.
    pub fn add_and_select_cell(&mut self, pos_delta: Vec2) -> EntityId {
        let pos = self.rect.center() + pos_delta;
        let memory_size = self.parameters.cell_function_computer_cell_memory_size;
        let feature = CellFeatureDescription::new(CellFunction::Computer)
            .with_volatile_data(vec![0; memory_size]);
        let cell = CellDescription::new(0)
            .with_pos(pos)
            .with_vel(Vec2::ZERO)
            .with_energy(self.parameters.cell_creation_energy)
            .with_max_connections(self.parameters.cell_creation_max_connection)
            .with_connections(Vec::new())
            .with_metadata(CellMetadata::default())
            .with_token_blocked(false)
            .with_token_branch_number(0)
            .with_feature(feature)
            .with_tokens(Vec::new())
            .with_token_usages(0);
        let mut cluster = ClusterDescription::new(0).with_cell(cell);
        self.helper.make_valid_cluster(&mut cluster);

        let cell_id = cluster.cells[0].id;
        self.selected_cell_ids = HashSet::from([cell_id]);
        self.selected_cluster_ids = HashSet::from([cluster.id]);
        self.selected_particle_ids.clear();
        self.data.add_cluster(cluster);
        self.navigator.update(&self.data);
        debug!(cell_id, %pos, "added cell");
        cell_id
    }

    pub fn add_and_select_particle(&mut self, pos_delta: Vec2) -> EntityId {
        let pos = self.rect.center() + pos_delta;
        let mut particle = ParticleDescription::new(0)
            .with_pos(pos)
            .with_vel(Vec2::ZERO)
            .with_energy(self.parameters.cell_min_energy / 2.0);
        self.helper.make_valid_particle(&mut particle);

        let particle_id = particle.id;
        self.selected_cell_ids.clear();
        self.selected_cluster_ids.clear();
        self.selected_particle_ids = HashSet::from([particle_id]);
        self.data.add_particle(particle);
        self.navigator.update(&self.data);
        debug!(particle_id, %pos, "added particle");
        particle_id
    }

    /// Remove the selected cells and particles.
    ///
    /// Connections pointing at removed cells are pruned, clusters left empty
    /// disappear, and the remaining cells of touched clusters are reclustered.
    pub fn delete_selection(&mut self) {
        let mut modified_cluster_ids = HashSet::new();
        let mut clusters = Vec::with_capacity(self.data.clusters.len());
        for mut cluster in std::mem::take(&mut self.data.clusters) {
            if self.selected_cluster_ids.contains(&cluster.id) {
                cluster
                    .cells
                    .retain(|cell| !self.selected_cell_ids.contains(&cell.id));
                if cluster.cells.is_empty() {
                    continue;
                }
                modified_cluster_ids.insert(cluster.id);
            }
            clusters.push(cluster);
        }
        self.data.clusters = clusters;

        let deleted = &self.selected_cell_ids;
        for cell in self.data.cells_mut() {
            cell.retain_connections(|target| !deleted.contains(&target));
        }
        if !modified_cluster_ids.is_empty() {
            self.helper.recluster(&mut self.data, &modified_cluster_ids);
        }

        self.data
            .particles
            .retain(|particle| !self.selected_particle_ids.contains(&particle.id));
        self.clear_selection();
        self.navigator.update(&self.data);
    }

    /// Remove every cluster touched by the selection plus the selected
    /// particles.
    pub fn delete_extended_selection(&mut self) {
        self.data
            .clusters
            .retain(|cluster| !self.selected_cluster_ids.contains(&cluster.id));
        self.data
            .particles
            .retain(|particle| !self.selected_particle_ids.contains(&particle.id));
        self.clear_selection();
        self.navigator.update(&self.data);
    }

    /// Insert a fresh token into the single selected cell, at the selected
    /// token index or at the end.
    pub fn add_token(&mut self) -> Result<(), EditorError> {
        let cell_id = self.single_selected_cell()?;
        let limit = self.parameters.cell_max_token;
        let token = TokenDescription::zeroed(
            self.parameters.token_creation_energy,
            self.parameters.token_memory_size,
        );
        let selected_index = self.selected_token_index;
        let cell = self.cell_mut(cell_id)?;
        let count = cell.token_count();
        if count >= limit as usize {
            return Err(EditorError::TokenLimitReached {
                cell: cell_id,
                limit,
            });
        }
        cell.insert_token(selected_index.unwrap_or(count), token)?;
        Ok(())
    }

    /// Remove the selected token from the single selected cell.
    pub fn delete_token(&mut self) -> Result<TokenDescription, EditorError> {
        let cell_id = self.single_selected_cell()?;
        let index = self.selected_token_index.ok_or(EditorError::NoTokenSelected)?;
        Ok(self.cell_mut(cell_id)?.remove_token(index)?)
    }

    fn single_selected_cell(&self) -> Result<EntityId, EditorError> {
        match self.selected_cell_ids.len() {
            1 => self
                .selected_cell_ids
                .iter()
                .next()
                .copied()
                .ok_or(EditorError::SingleCellRequired(0)),
            count => Err(EditorError::SingleCellRequired(count)),
        }
    }

    #[must_use]
    pub fn is_cell_present(&self, cell_id: EntityId) -> bool {
        self.navigator.contains_cell(cell_id).unwrap_or(false)
    }

    #[must_use]
    pub fn is_particle_present(&self, particle_id: EntityId) -> bool {
        self.navigator.contains_particle(particle_id).unwrap_or(false)
    }

    /// Replace the selection; clusters are derived from the selected cells.
    pub fn set_selection(
        &mut self,
        cell_ids: impl IntoIterator<Item = EntityId>,
        particle_ids: impl IntoIterator<Item = EntityId>,
    ) {
        self.selected_cell_ids = cell_ids.into_iter().collect();
        self.selected_particle_ids = particle_ids.into_iter().collect();
        self.refresh_selected_clusters();
    }

    pub fn clear_selection(&mut self) {
        self.selected_cell_ids.clear();
        self.selected_cluster_ids.clear();
        self.selected_particle_ids.clear();
    }

    fn refresh_selected_clusters(&mut self) {
        self.selected_cluster_ids = self
            .selected_cell_ids
            .iter()
            .filter_map(|&cell_id| self.navigator.cluster_id_of_cell(cell_id).ok())
            .collect();
    }

    #[must_use]
    pub fn is_in_selection(&self, id: EntityId) -> bool {
        self.selected_cell_ids.contains(&id) || self.selected_particle_ids.contains(&id)
    }

    #[must_use]
    pub fn are_all_in_selection(&self, ids: &[EntityId]) -> bool {
        ids.iter().all(|&id| self.is_in_selection(id))
    }

    /// Whether `id` is a selected particle or a cell of a selected cluster.
    #[must_use]
    pub fn is_in_extended_selection(&self, id: EntityId) -> bool {
        match self.navigator.cluster_id_of_cell(id) {
            Ok(cluster_id) => self.selected_cluster_ids.contains(&cluster_id),
            Err(_) => self.selected_particle_ids.contains(&id),
        }
    }

    #[must_use]
    pub fn are_entities_selected(&self) -> bool {
        !self.selected_cell_ids.is_empty() || !self.selected_particle_ids.is_empty()
    }

    #[must_use]
    pub fn selected_cell_ids(&self) -> &HashSet<EntityId> {
        &self.selected_cell_ids
    }

    #[must_use]
    pub fn selected_cluster_ids(&self) -> &HashSet<EntityId> {
        &self.selected_cluster_ids
    }

    #[must_use]
    pub fn selected_particle_ids(&self) -> &HashSet<EntityId> {
        &self.selected_particle_ids
    }

    #[must_use]
    pub fn selection_summary(&self) -> SelectionSummary {
        let extended_cells = self
            .selected_cluster_ids
            .iter()
            .filter_map(|&id| self.navigator.cluster_index(id).ok())
            .map(|index| self.data.clusters[index].cells.len())
            .sum();
        SelectionSummary {
            selected_cells: self.selected_cell_ids.len(),
            extended_cells,
            selected_particles: self.selected_particle_ids.len(),
        }
    }

    pub fn move_selection(&mut self, delta: Vec2) {
        let cell_ids: Vec<EntityId> = self.selected_cell_ids.iter().copied().collect();
        for cell_id in cell_ids {
            if let Ok(cell) = self.cell_mut(cell_id)
                && let Some(pos) = cell.pos.as_mut()
            {
                *pos += delta;
            }
        }
        self.move_selected_particles(delta);
    }

    /// Move every cell of the selected clusters and the selected particles.
    pub fn move_extended_selection(&mut self, delta: Vec2) {
        for index in self.selected_cluster_indices() {
            for cell in &mut self.data.clusters[index].cells {
                if let Some(pos) = cell.pos.as_mut() {
                    *pos += delta;
                }
            }
        }
        self.move_selected_particles(delta);
    }

    fn move_selected_particles(&mut self, delta: Vec2) {
        for &particle_id in &self.selected_particle_ids {
            if let Ok(index) = self.navigator.particle_index(particle_id)
                && let Some(pos) = self.data.particles[index].pos.as_mut()
            {
                *pos += delta;
            }
        }
    }

    fn selected_cluster_indices(&self) -> Vec<usize> {
        self.selected_cluster_ids
            .iter()
            .filter_map(|&id| self.navigator.cluster_index(id).ok())
            .collect()
    }

    /// Rebond the selected cells to their nearest neighbours and re-derive
    /// cluster membership.
    pub fn reconnect_selected_cells(&mut self) {
        self.helper
            .reconnect(&mut self.data, &self.selected_cell_ids);
        self.navigator.update(&self.data);
        self.refresh_selected_clusters();
    }

    /// Rotate the extended selection by `degrees` about its centroid.
    pub fn rotate_selection(&mut self, degrees: f32) -> Result<(), EditorError> {
        let center = self.selection_center()?;
        for index in self.selected_cluster_indices() {
            for cell in &mut self.data.clusters[index].cells {
                if let Some(pos) = cell.pos.as_mut() {
                    *pos = pos.rotated_around(center, degrees);
                }
            }
        }
        for &particle_id in &self.selected_particle_ids {
            if let Ok(index) = self.navigator.particle_index(particle_id)
                && let Some(pos) = self.data.particles[index].pos.as_mut()
            {
                *pos = pos.rotated_around(center, degrees);
            }
        }
        Ok(())
    }

    fn selection_center(&self) -> Result<Vec2, EditorError> {
        let cluster_positions = self
            .selected_cluster_indices()
            .into_iter()
            .flat_map(|index| self.data.clusters[index].cells.iter())
            .filter_map(|cell| cell.pos);
        let particle_positions = self
            .selected_particle_ids
            .iter()
            .filter_map(|&id| self.navigator.particle_index(id).ok())
            .filter_map(|index| self.data.particles[index].pos);
        let (sum, count) = cluster_positions
            .chain(particle_positions)
            .fold((Vec2::ZERO, 0usize), |(sum, count), pos| (sum + pos, count + 1));
        if count == 0 {
            return Err(EditorError::EmptySelection);
        }
        Ok(sum / count as f32)
    }

    /// Replace the cluster with the same id.
    pub fn update_cluster(&mut self, cluster: ClusterDescription) -> Result<(), EditorError> {
        let index = self.navigator.cluster_index(cluster.id)?;
        self.data.clusters[index] = cluster;
        self.navigator.update(&self.data);
        Ok(())
    }

    pub fn update_particle(&mut self, particle: ParticleDescription) -> Result<(), EditorError> {
        let index = self.navigator.particle_index(particle.id)?;
        self.data.particles[index] = particle;
        self.navigator.update(&self.data);
        Ok(())
    }

    /// Ask the engine for a fresh snapshot of `rect`; completion arrives as a
    /// data-ready notification.
    pub fn require_data_update_from_simulation(
        &mut self,
        access: &mut dyn SimulationAccess,
        rect: IntRect,
    ) {
        self.rect = rect;
        access.require_data(
            rect,
            ResolveDescription {
                resolve_cell_links: true,
            },
        );
    }

    /// Pull the prepared snapshot and tell the views to refresh.
    pub fn data_from_simulation_available(
        &mut self,
        access: &mut dyn SimulationAccess,
    ) -> Notification {
        self.update_internals(access.retrieve_data());
        Notification::new(
            [Receiver::DataEditor, Receiver::VisualEditor, Receiver::Toolbar],
            UpdateDescription::All,
        )
    }

    /// Push pending edits when `targets` include the simulation.
    ///
    /// Returns the summary of the flushed delta, `None` when the notification
    /// was not meant for the simulation.
    pub fn send_data_changes_to_simulation(
        &mut self,
        access: &mut dyn SimulationAccess,
        targets: &BTreeSet<Receiver>,
    ) -> Result<Option<ChangeSummary>, EditorError> {
        if !targets.contains(&Receiver::Simulation) {
            return Ok(None);
        }
        let delta = DataChangeDescription::diff(&self.unchanged, &self.data)?;
        let summary = delta.summary();
        if !delta.is_empty() {
            access.update_data(&delta)?;
        }
        self.unchanged = self.data.clone();
        info!(
            created_clusters = summary.created_clusters,
            modified_clusters = summary.modified_clusters,
            deleted_clusters = summary.deleted_clusters,
            created_particles = summary.created_particles,
            modified_particles = summary.modified_particles,
            deleted_particles = summary.deleted_particles,
            "flushed edits to simulation"
        );
        Ok(Some(summary))
    }

    /// Replace snapshot and baseline, rebuild the navigator and drop selected
    /// ids that no longer exist.
    pub fn update_internals(&mut self, data: DataDescription) {
        self.unchanged = data.clone();
        self.data = data;
        self.navigator.update(&self.data);

        let navigator = &self.navigator;
        self.selected_cell_ids
            .retain(|&id| navigator.contains_cell(id).unwrap_or(false));
        self.selected_cluster_ids
            .retain(|&id| navigator.contains_cluster(id).unwrap_or(false));
        self.selected_particle_ids
            .retain(|&id| navigator.contains_particle(id).unwrap_or(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdGenerator;
    use crate::helper::LocalDescriptionHelper;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingAccess {
        snapshot: DataDescription,
        requests: Vec<(IntRect, ResolveDescription)>,
        deltas: Vec<DataChangeDescription>,
    }

    impl SimulationAccess for RecordingAccess {
        fn require_data(&mut self, rect: IntRect, resolve: ResolveDescription) {
            self.requests.push((rect, resolve));
        }

        fn retrieve_data(&mut self) -> DataDescription {
            self.snapshot.clone()
        }

        fn update_data(&mut self, delta: &DataChangeDescription) -> Result<(), ChangeError> {
            delta.apply(&mut self.snapshot)?;
            self.deltas.push(delta.clone());
            Ok(())
        }
    }

    fn editor() -> DataEditor {
        let parameters = SimulationParameters::default();
        let helper = LocalDescriptionHelper::new(Arc::new(IdGenerator::starting_at(500)), &parameters);
        DataEditor::new(Box::new(helper), parameters)
    }

    fn cell_at(id: EntityId, x: f32) -> CellDescription {
        CellDescription::new(id)
            .with_pos(Vec2::new(x, 0.0))
            .with_max_connections(4)
            .with_connections(Vec::new())
            .with_tokens(Vec::new())
    }

    fn connected_world() -> DataDescription {
        let mut cluster = ClusterDescription::new(1)
            .with_cell(cell_at(10, 0.0))
            .with_cell(cell_at(11, 1.0))
            .with_cell(cell_at(12, 2.0));
        let mut cache = HashMap::new();
        cluster
            .add_connection(10, 11, &mut cache)
            .expect("10-11")
            .add_connection(11, 12, &mut cache)
            .expect("11-12");
        let mut data = DataDescription::new();
        data.add_cluster(cluster);
        data.add_cluster(ClusterDescription::new(2).with_cell(cell_at(20, 9.0)));
        data.add_particle(ParticleDescription::new(30).with_pos(Vec2::new(4.0, 4.0)));
        data
    }

    #[test]
    fn added_cell_uses_creation_defaults_and_is_selected() {
        let mut editor = editor();
        editor.update_internals(DataDescription::new());
        let id = editor.add_and_select_cell(Vec2::new(1.0, 2.0));
        let cell = editor.cell(id).expect("added cell");
        assert_eq!(cell.energy, Some(100.0));
        assert_eq!(cell.max_connections, Some(4));
        assert_eq!(cell.pos, Some(Vec2::new(1.0, 2.0)));
        assert_eq!(
            cell.feature.as_ref().map(CellFeatureDescription::function),
            Some(CellFunction::Computer)
        );
        assert!(editor.is_in_selection(id));
        assert_eq!(editor.selection_summary().extended_cells, 1);
    }

    #[test]
    fn added_particle_gets_half_min_energy() {
        let mut editor = editor();
        let id = editor.add_and_select_particle(Vec2::ZERO);
        assert_eq!(editor.particle(id).expect("particle").energy, Some(25.0));
        assert!(editor.selected_cell_ids().is_empty());
    }

    #[test]
    fn delete_selection_prunes_connections_and_empty_clusters() {
        let mut editor = editor();
        editor.update_internals(connected_world());
        editor.set_selection([11, 20], [30]);
        editor.delete_selection();

        let data = editor.data();
        assert!(data.clusters.iter().all(|cluster| cluster.id != 2));
        assert!(data.particles.is_empty());
        assert!(data.cells().all(|cell| !cell.is_connected_to(11)));
        assert!(!editor.is_cell_present(11));
        assert!(editor.is_cell_present(10));
        // 10 and 12 lost their only bond and end up in separate clusters.
        assert_ne!(
            editor.navigator().cluster_id_of_cell(10),
            editor.navigator().cluster_id_of_cell(12)
        );
        assert!(!editor.are_entities_selected());
    }

    #[test]
    fn delete_extended_selection_removes_whole_cluster() {
        let mut editor = editor();
        editor.update_internals(connected_world());
        editor.set_selection([10], []);
        assert!(editor.is_in_extended_selection(12));
        assert!(!editor.is_in_extended_selection(20));
        editor.delete_extended_selection();
        assert_eq!(editor.data().cell_count(), 1);
    }

    #[test]
    fn tokens_respect_limit_and_selected_index() {
        let mut editor = editor();
        editor.update_internals(connected_world());
        editor.set_selection([10], []);
        editor.add_token().expect("first");
        editor.add_token().expect("second");
        editor.set_selected_token_index(Some(0));
        editor.add_token().expect("third");
        assert!(matches!(
            editor.add_token(),
            Err(EditorError::TokenLimitReached { cell: 10, limit: 3 })
        ));
        editor.delete_token().expect("delete");
        assert_eq!(editor.cell(10).expect("cell").token_count(), 2);

        editor.set_selection([10, 11], []);
        assert!(matches!(
            editor.add_token(),
            Err(EditorError::SingleCellRequired(2))
        ));
    }

    #[test]
    fn move_and_rotate_extended_selection() {
        let mut editor = editor();
        editor.update_internals(connected_world());
        editor.set_selection([11], []);

        editor.move_selection(Vec2::new(0.0, 1.0));
        assert_eq!(editor.cell(11).expect("cell").pos, Some(Vec2::new(1.0, 1.0)));
        assert_eq!(editor.cell(10).expect("cell").pos, Some(Vec2::new(0.0, 0.0)));

        editor.move_extended_selection(Vec2::new(1.0, 0.0));
        assert_eq!(editor.cell(10).expect("cell").pos, Some(Vec2::new(1.0, 0.0)));

        editor.set_selection([10], []);
        editor.rotate_selection(180.0).expect("rotate");
        let center = Vec2::new(2.0, 1.0 / 3.0);
        let rotated = editor.cell(10).expect("cell").pos.expect("pos");
        assert!(rotated.approx_eq(Vec2::new(3.0, 2.0 / 3.0), 1e-4));
        assert!((center.distance(rotated) - center.distance(Vec2::new(1.0, 0.0))).abs() < 1e-4);
    }

    #[test]
    fn rotate_without_selection_fails() {
        let mut editor = editor();
        assert!(matches!(
            editor.rotate_selection(90.0),
            Err(EditorError::EmptySelection)
        ));
    }

    #[test]
    fn flush_only_when_simulation_is_targeted() {
        let mut access = RecordingAccess {
            snapshot: connected_world(),
            ..RecordingAccess::default()
        };
        let mut editor = editor();
        editor.require_data_update_from_simulation(&mut access, IntRect::covering((20, 20)));
        assert!(access.requests[0].1.resolve_cell_links);
        let notification = editor.data_from_simulation_available(&mut access);
        assert!(notification.targets(Receiver::VisualEditor));
        assert!(!notification.targets(Receiver::Simulation));

        editor.set_selection([20], []);
        editor.move_selection(Vec2::new(1.0, 0.0));
        let skipped = editor
            .send_data_changes_to_simulation(&mut access, &notification.targets)
            .expect("no flush");
        assert!(skipped.is_none());
        assert!(access.deltas.is_empty());

        let targets = BTreeSet::from([Receiver::Simulation]);
        let summary = editor
            .send_data_changes_to_simulation(&mut access, &targets)
            .expect("flush")
            .expect("summary");
        assert_eq!(summary.modified_cells, 1);
        assert!(access.snapshot.structurally_eq(editor.data()));
        assert_eq!(editor.unchanged_data(), editor.data());
    }

    #[test]
    fn inbound_snapshot_drops_stale_selection() {
        let mut editor = editor();
        editor.update_internals(connected_world());
        editor.set_selection([10, 20], [30]);
        let mut next = connected_world();
        next.clusters.remove(1);
        next.particles.clear();
        editor.update_internals(next);
        assert_eq!(editor.selected_cell_ids(), &HashSet::from([10]));
        assert_eq!(editor.selected_cluster_ids(), &HashSet::from([1]));
        assert!(editor.selected_particle_ids().is_empty());
    }
}
