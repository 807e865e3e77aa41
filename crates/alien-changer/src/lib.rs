//! Adaptive controller that keeps a long-running simulation in a healthy
//! population regime.
//!
//! The controller samples the number of token-carrying clusters at a fixed
//! cadence, walks the simulation parameters towards random targets in small
//! steps and retreats to earlier parameter sets when the population crashes.

use alien_core::{ConfigError, SimulationParameters};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub mod calculator;
pub mod monitor;

pub use calculator::{
    CalculatorFactory, LinearCalculatorFactory, LinearParametersCalculator, ParametersCalculator,
};
pub use monitor::{MonitorData, SimulationMonitor};

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChangerState {
    #[default]
    Deactivated,
    Init,
    FindEpochTarget,
    Epoch,
    Retreat,
    EmergencyRetreat,
}

/// Timing and threshold constants of the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChangerConfig {
    /// Simulation timesteps between two telemetry requests.
    pub timesteps_for_monitor: u64,
    /// Samples collected before the reference population is taken.
    pub init_duration: u64,
    /// Samples between two epoch steps.
    pub step_duration: u64,
    /// Samples after which a retreat ends regardless of recovery.
    pub retreat_duration: u64,
    /// Fraction of the reference below which an epoch is aborted.
    pub retreat_start_factor: f64,
    /// Fraction of the reference above which a retreat ends.
    pub retreat_end_factor: f64,
    /// Fraction of the reference below which the baseline is restored.
    pub emergency_retreat_start_factor: f64,
    /// Retreats per epoch before a new target is chosen.
    pub max_retreats: u32,
    /// Optional RNG seed for reproducible targets.
    pub rng_seed: Option<u64>,
}

impl Default for ChangerConfig {
    fn default() -> Self {
        Self {
            timesteps_for_monitor: 1000,
            init_duration: 400,
            step_duration: 100,
            retreat_duration: 400,
            retreat_start_factor: 0.35,
            retreat_end_factor: 0.6,
            emergency_retreat_start_factor: 0.25,
            max_retreats: 5,
            rng_seed: None,
        }
    }
}

impl ChangerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timesteps_for_monitor == 0 || self.init_duration == 0 || self.step_duration == 0 {
            return Err(ConfigError::InvalidConfig(
                "monitor cadence, init duration and step duration must be positive",
            ));
        }
        if !(0.0 <= self.emergency_retreat_start_factor
            && self.emergency_retreat_start_factor <= self.retreat_start_factor
            && self.retreat_start_factor < self.retreat_end_factor)
        {
            return Err(ConfigError::InvalidConfig(
                "factors must satisfy 0 <= emergency <= retreat start < retreat end",
            ));
        }
        if self.max_retreats == 0 {
            return Err(ConfigError::InvalidConfig("max_retreats must be positive"));
        }
        Ok(())
    }

    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Closed-loop parameter controller.
///
/// Every telemetry sample is processed as one atomic step of the state
/// machine. At most one telemetry request is outstanding at any time.
pub struct SimulationChanger {
    config: ChangerConfig,
    factory: Box<dyn CalculatorFactory>,
    rng: SmallRng,
    state: ChangerState,
    parameters: SimulationParameters,
    initial_parameters: SimulationParameters,
    calculator: Option<Box<dyn ParametersCalculator>>,
    reference_count: Option<u64>,
    num_retreats: u32,
    timesteps_since_beginning: u64,
    measurements_since_beginning: u64,
    measurements_of_current_epoch: u64,
    measurements_of_current_retreat: u64,
    data_required: bool,
    parameter_revision: u64,
}

impl std::fmt::Debug for SimulationChanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationChanger")
            .field("state", &self.state)
            .field("reference_count", &self.reference_count)
            .field("num_retreats", &self.num_retreats)
            .field("measurements", &self.measurements_since_beginning)
            .field("data_required", &self.data_required)
            .finish_non_exhaustive()
    }
}

impl SimulationChanger {
    /// Create a deactivated controller.
    pub fn new(
        config: ChangerConfig,
        factory: Box<dyn CalculatorFactory>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            rng: config.seeded_rng(),
            config,
            factory,
            state: ChangerState::Deactivated,
            parameters: SimulationParameters::default(),
            initial_parameters: SimulationParameters::default(),
            calculator: None,
            reference_count: None,
            num_retreats: 0,
            timesteps_since_beginning: 0,
            measurements_since_beginning: 0,
            measurements_of_current_epoch: 0,
            measurements_of_current_retreat: 0,
            data_required: false,
            parameter_revision: 0,
        })
    }

    /// Controller using [`LinearCalculatorFactory`] defaults.
    pub fn with_linear_calculator(config: ChangerConfig) -> Result<Self, ConfigError> {
        Self::new(config, Box::new(LinearCalculatorFactory::default()))
    }

    /// Start controlling from `current` parameters, which also become the
    /// emergency baseline.
    pub fn activate(&mut self, current: SimulationParameters) {
        self.state = ChangerState::Init;
        self.parameters = current.clone();
        self.initial_parameters = current;
        self.calculator = None;
        self.reference_count = None;
        self.num_retreats = 0;
        self.timesteps_since_beginning = 0;
        self.measurements_since_beginning = 0;
        self.measurements_of_current_epoch = 0;
        self.measurements_of_current_retreat = 0;
        info!("parameter controller activated");
    }

    pub fn deactivate(&mut self) {
        if self.state == ChangerState::Deactivated {
            return;
        }
        self.state = ChangerState::Deactivated;
        info!("parameter controller deactivated");
    }

    /// Count one simulated timestep and request telemetry at the monitor
    /// cadence unless a request is still pending.
    pub fn notify_next_timestep(&mut self, monitor: &mut dyn SimulationMonitor) {
        if self.state == ChangerState::Deactivated {
            return;
        }
        self.timesteps_since_beginning += 1;
        if self.timesteps_since_beginning % self.config.timesteps_for_monitor == 0 {
            if self.data_required {
                debug!(
                    timestep = self.timesteps_since_beginning,
                    "telemetry still pending, skipping request"
                );
                return;
            }
            self.data_required = true;
            monitor.require_data();
        }
    }

    /// Consume a ready telemetry sample and advance the state machine.
    ///
    /// Returns `true` when the parameters were reassigned.
    pub fn on_monitor_data_available(&mut self, monitor: &mut dyn SimulationMonitor) -> bool {
        if !self.data_required {
            return false;
        }
        let Some(data) = monitor.retrieve_data() else {
            return false;
        };
        self.data_required = false;
        if self.state == ChangerState::Deactivated {
            return false;
        }
        self.measurements_since_beginning += 1;
        self.process_sample(data.num_clusters_with_tokens)
    }

    fn process_sample(&mut self, active_clusters: u64) -> bool {
        let reference = self.reference_count.unwrap_or_default() as f64;
        let active = active_clusters as f64;
        match self.state {
            ChangerState::Deactivated => false,
            ChangerState::Init => {
                if self.measurements_since_beginning == self.config.init_duration {
                    self.reference_count = Some(active_clusters);
                    info!(active_clusters, "reference measurement finished");
                    self.enter(ChangerState::FindEpochTarget, active_clusters);
                }
                false
            }
            ChangerState::FindEpochTarget => {
                self.calculator = Some(
                    self.factory
                        .create_with_random_target(&self.parameters, &mut self.rng),
                );
                self.measurements_of_current_epoch = self.measurements_since_beginning;
                self.num_retreats = 0;
                self.enter(ChangerState::Epoch, active_clusters);
                false
            }
            ChangerState::Epoch => {
                let Some(calculator) = self.calculator.as_mut() else {
                    warn!("epoch without calculator, choosing a new target");
                    self.enter(ChangerState::FindEpochTarget, active_clusters);
                    return false;
                };
                if active < reference * self.config.retreat_start_factor {
                    while !calculator.is_source_reached() {
                        calculator.previous();
                    }
                    self.parameters = calculator.source().clone();
                    self.num_retreats += 1;
                    self.measurements_of_current_retreat = self.measurements_since_beginning;
                    warn!(
                        active_clusters,
                        reference = self.reference_count,
                        retreats = self.num_retreats,
                        "critical number of active clusters"
                    );
                    self.enter(ChangerState::Retreat, active_clusters);
                    return self.parameters_changed();
                }
                let since_epoch =
                    self.measurements_since_beginning - self.measurements_of_current_epoch;
                if since_epoch % self.config.step_duration == 0 {
                    self.parameters = calculator.next();
                    let target_reached = calculator.is_target_reached();
                    debug!(active_clusters, "epoch step");
                    if target_reached {
                        self.enter(ChangerState::FindEpochTarget, active_clusters);
                    }
                    return self.parameters_changed();
                }
                false
            }
            ChangerState::Retreat => {
                if active < reference * self.config.emergency_retreat_start_factor {
                    self.parameters = self.initial_parameters.clone();
                    warn!(
                        active_clusters,
                        reference = self.reference_count,
                        "very critical number of active clusters"
                    );
                    self.enter(ChangerState::EmergencyRetreat, active_clusters);
                    return self.parameters_changed();
                }
                let recovered = active > reference * self.config.retreat_end_factor;
                let expired = self.measurements_of_current_retreat + self.config.retreat_duration
                    < self.measurements_since_beginning;
                if recovered || expired {
                    info!(active_clusters, recovered, "retreat finished");
                    if self.num_retreats >= self.config.max_retreats {
                        self.enter(ChangerState::FindEpochTarget, active_clusters);
                    } else {
                        self.enter(ChangerState::Epoch, active_clusters);
                    }
                }
                false
            }
            ChangerState::EmergencyRetreat => {
                if active > reference * self.config.retreat_end_factor {
                    self.enter(ChangerState::FindEpochTarget, active_clusters);
                }
                false
            }
        }
    }

    fn enter(&mut self, state: ChangerState, active_clusters: u64) {
        info!(
            from = ?self.state,
            to = ?state,
            active_clusters,
            measurements = self.measurements_since_beginning,
            "parameter controller state change"
        );
        self.state = state;
    }

    fn parameters_changed(&mut self) -> bool {
        self.parameter_revision += 1;
        true
    }

    #[must_use]
    pub fn state(&self) -> ChangerState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state != ChangerState::Deactivated
    }

    /// Parameters the engine should currently run with.
    #[must_use]
    pub fn parameters(&self) -> &SimulationParameters {
        &self.parameters
    }

    #[must_use]
    pub fn initial_parameters(&self) -> &SimulationParameters {
        &self.initial_parameters
    }

    /// Incremented on every parameter reassignment.
    #[must_use]
    pub fn parameter_revision(&self) -> u64 {
        self.parameter_revision
    }

    #[must_use]
    pub fn reference_count(&self) -> Option<u64> {
        self.reference_count
    }

    #[must_use]
    pub fn num_retreats(&self) -> u32 {
        self.num_retreats
    }

    #[must_use]
    pub fn is_data_required(&self) -> bool {
        self.data_required
    }

    #[must_use]
    pub fn measurements(&self) -> u64 {
        self.measurements_since_beginning
    }

    #[must_use]
    pub fn timesteps(&self) -> u64 {
        self.timesteps_since_beginning
    }

    #[must_use]
    pub fn config(&self) -> &ChangerConfig {
        &self.config
    }
}
