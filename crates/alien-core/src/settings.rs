//! Explicit configuration objects handed to the components that need them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating configuration values.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Tunable physics and creation parameters of a running simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationParameters {
    /// Energy given to cells created from the editor.
    pub cell_creation_energy: f64,
    /// Maximum connection count of editor-created cells.
    pub cell_creation_max_connection: u32,
    /// Cells below this energy decay into particles.
    pub cell_min_energy: f64,
    /// Maximum number of tokens a single cell may hold.
    pub cell_max_token: u32,
    /// Maximum number of distinct token branch numbers.
    pub cell_max_token_branch_number: u32,
    /// Energy of tokens created from the editor.
    pub token_creation_energy: f64,
    /// Size of a token's data buffer in bytes.
    pub token_memory_size: usize,
    /// Size of a computer cell's memory in bytes.
    pub cell_function_computer_cell_memory_size: usize,
    /// Longest allowed connection between two cells.
    pub cell_max_distance: f32,
    /// Shortest distance two cells may approach before repelling.
    pub cell_min_distance: f32,
    /// Upper bound of force a cell can exert.
    pub cell_max_force: f32,
    /// Relative velocity above which colliding clusters fuse.
    pub cell_fusion_velocity: f32,
    /// Strength of the weapon cell function.
    pub cell_function_weapon_strength: f32,
    /// Probability per step that a cell emits a radiation particle.
    pub radiation_prob: f32,
    pub radiation_exponent: f32,
    pub radiation_factor: f32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            cell_creation_energy: 100.0,
            cell_creation_max_connection: 4,
            cell_min_energy: 50.0,
            cell_max_token: 3,
            cell_max_token_branch_number: 6,
            token_creation_energy: 60.0,
            token_memory_size: 256,
            cell_function_computer_cell_memory_size: 8,
            cell_max_distance: 1.3,
            cell_min_distance: 0.3,
            cell_max_force: 0.8,
            cell_fusion_velocity: 0.4,
            cell_function_weapon_strength: 0.1,
            radiation_prob: 0.03,
            radiation_exponent: 1.0,
            radiation_factor: 0.0002,
        }
    }
}

impl SimulationParameters {
    /// Check ranges; returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cell_creation_energy > 0.0 && self.token_creation_energy > 0.0) {
            return Err(ConfigError::InvalidConfig(
                "cell and token creation energies must be positive",
            ));
        }
        if self.cell_min_energy < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "cell_min_energy must be non-negative",
            ));
        }
        if self.cell_max_token_branch_number == 0 {
            return Err(ConfigError::InvalidConfig(
                "cell_max_token_branch_number must be positive",
            ));
        }
        if !(self.cell_max_distance > 0.0) {
            return Err(ConfigError::InvalidConfig(
                "cell_max_distance must be positive",
            ));
        }
        if self.cell_min_distance < 0.0 || self.cell_min_distance >= self.cell_max_distance {
            return Err(ConfigError::InvalidConfig(
                "cell_min_distance must lie in [0, cell_max_distance)",
            ));
        }
        if self.cell_max_force < 0.0
            || self.cell_fusion_velocity < 0.0
            || self.cell_function_weapon_strength < 0.0
        {
            return Err(ConfigError::InvalidConfig(
                "force, fusion velocity and weapon strength must be non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.radiation_prob) {
            return Err(ConfigError::InvalidConfig(
                "radiation_prob must lie in [0, 1]",
            ));
        }
        if self.radiation_exponent < 0.0 || self.radiation_factor < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "radiation exponent and factor must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Persisted engine and UI toggles.
///
/// Owned by the session and passed by reference to whoever needs it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsStore {
    bool_states: BTreeMap<String, bool>,
}

impl SettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored flag under `name`, or `default` when never set.
    #[must_use]
    pub fn bool_state(&self, name: &str, default: bool) -> bool {
        self.bool_states.get(name).copied().unwrap_or(default)
    }

    pub fn set_bool_state(&mut self, name: impl Into<String>, value: bool) {
        self.bool_states.insert(name.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_validate() {
        SimulationParameters::default()
            .validate()
            .expect("defaults are valid");
    }

    #[test]
    fn validation_rejects_inverted_distances() {
        let params = SimulationParameters {
            cell_min_distance: 2.0,
            cell_max_distance: 1.0,
            ..SimulationParameters::default()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigError::InvalidConfig(
                "cell_min_distance must lie in [0, cell_max_distance)"
            ))
        );
    }

    #[test]
    fn validation_rejects_nan_distance() {
        let params = SimulationParameters {
            cell_max_distance: f32::NAN,
            ..SimulationParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn settings_store_falls_back_to_defaults() {
        let mut store = SettingsStore::new();
        assert!(store.bool_state("editMode", true));

        store.set_bool_state("editMode", false);
        assert!(!store.bool_state("editMode", true));
        assert!(!store.bool_state("editMode", false));
    }
}
