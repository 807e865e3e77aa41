//! Step-back history of world snapshots.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::description::DataDescription;

/// Snapshot tagged with the timestep it was taken at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TimestepSnapshot {
    pub timestep: u64,
    pub data: DataDescription,
}

/// Bounded stack of snapshots recorded before single steps, plus one
/// independently saved snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    capacity: usize,
    steps: VecDeque<TimestepSnapshot>,
    saved: Option<TimestepSnapshot>,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::with_capacity(64)
    }
}

impl SnapshotHistory {
    /// Keep at most `capacity` step snapshots; older ones are discarded.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            steps: VecDeque::with_capacity(capacity.min(256)),
            saved: None,
        }
    }

    pub fn push(&mut self, snapshot: TimestepSnapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.steps.len() == self.capacity {
            self.steps.pop_front();
        }
        self.steps.push_back(snapshot);
    }

    /// Pop the most recent step snapshot.
    pub fn step_back(&mut self) -> Option<TimestepSnapshot> {
        self.steps.pop_back()
    }

    #[must_use]
    pub fn can_step_back(&self) -> bool {
        !self.steps.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Forget the step history, e.g. once the simulation runs freely.
    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn save(&mut self, snapshot: TimestepSnapshot) {
        self.saved = Some(snapshot);
    }

    #[must_use]
    pub fn saved(&self) -> Option<&TimestepSnapshot> {
        self.saved.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::ParticleDescription;

    fn snapshot(timestep: u64) -> TimestepSnapshot {
        let mut data = DataDescription::new();
        data.add_particle(ParticleDescription::new(timestep));
        TimestepSnapshot { timestep, data }
    }

    #[test]
    fn step_back_returns_latest_first() {
        let mut history = SnapshotHistory::with_capacity(4);
        history.push(snapshot(1));
        history.push(snapshot(2));
        assert_eq!(history.step_back().map(|s| s.timestep), Some(2));
        assert_eq!(history.step_back().map(|s| s.timestep), Some(1));
        assert!(history.step_back().is_none());
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut history = SnapshotHistory::with_capacity(2);
        for timestep in 0..5 {
            history.push(snapshot(timestep));
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.step_back().map(|s| s.timestep), Some(4));
        assert_eq!(history.step_back().map(|s| s.timestep), Some(3));
    }

    #[test]
    fn saved_snapshot_survives_clear() {
        let mut history = SnapshotHistory::default();
        history.push(snapshot(7));
        history.save(snapshot(3));
        history.clear();
        assert!(!history.can_step_back());
        assert_eq!(history.saved().map(|s| s.timestep), Some(3));
    }
}
