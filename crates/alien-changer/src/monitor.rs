//! Population telemetry consumed by the controller.

use serde::{Deserialize, Serialize};

/// One telemetry sample.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorData {
    pub num_clusters: u64,
    /// Clusters holding at least one token; the controller's health signal.
    pub num_clusters_with_tokens: u64,
    pub num_cells: u64,
    pub num_particles: u64,
    pub num_tokens: u64,
    pub total_internal_energy: f64,
}

/// Asynchronous telemetry source.
///
/// `require_data` schedules a sample; the engine announces when it is ready
/// and `retrieve_data` then hands it out. `None` means the sample has not
/// arrived yet.
pub trait SimulationMonitor {
    fn require_data(&mut self);
    fn retrieve_data(&mut self) -> Option<MonitorData>;
}
