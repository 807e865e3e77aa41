//! Narrow contracts towards the simulation engine.

use serde::{Deserialize, Serialize};

use crate::Vec2;
use crate::change::{ChangeError, DataChangeDescription};
use crate::description::DataDescription;
use crate::settings::SimulationParameters;

/// Axis-aligned integer region of the world, corners inclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IntRect {
    pub p1: (i32, i32),
    pub p2: (i32, i32),
}

impl IntRect {
    #[must_use]
    pub const fn new(p1: (i32, i32), p2: (i32, i32)) -> Self {
        Self { p1, p2 }
    }

    /// Region covering a whole world of `size`.
    #[must_use]
    pub const fn covering(size: (i32, i32)) -> Self {
        Self::new((0, 0), (size.0 - 1, size.1 - 1))
    }

    #[must_use]
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.p1.0 + self.p2.0) as f32 / 2.0,
            (self.p1.1 + self.p2.1) as f32 / 2.0,
        )
    }

    #[must_use]
    pub fn contains(&self, pos: Vec2) -> bool {
        pos.x >= self.p1.0 as f32
            && pos.x <= self.p2.0 as f32
            && pos.y >= self.p1.1 as f32
            && pos.y <= self.p2.1 as f32
    }
}

/// Options controlling how much detail a region snapshot carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResolveDescription {
    /// Include connections between cells.
    pub resolve_cell_links: bool,
}

/// Snapshot exchange with the engine.
///
/// `require_data` only schedules the request; the engine announces completion
/// through its notification channel, after which `retrieve_data` hands out the
/// prepared snapshot.
pub trait SimulationAccess {
    fn require_data(&mut self, rect: IntRect, resolve: ResolveDescription);
    fn retrieve_data(&mut self) -> DataDescription;
    fn update_data(&mut self, delta: &DataChangeDescription) -> Result<(), ChangeError>;
}

/// Timestep and parameter control of the engine.
pub trait SimulationController {
    fn current_timestep(&self) -> u64;
    fn set_current_timestep(&mut self, timestep: u64);
    fn calc_single_timestep(&mut self);
    fn world_size(&self) -> (i32, i32);
    fn set_world_size(&mut self, size: (i32, i32));
    fn simulation_parameters(&self) -> &SimulationParameters;
    fn set_simulation_parameters(&mut self, parameters: SimulationParameters);
}
