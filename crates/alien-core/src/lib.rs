//! Core types shared across the ALIEN workspace.
//!
//! The crate models the editor-visible world as plain description values
//! (clusters of connected cells plus free particles), indexes them for id
//! lookups, and computes the field-level deltas that are pushed back into the
//! simulation engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::sync::atomic::{AtomicU64, Ordering};

pub mod access;
pub mod change;
pub mod description;
pub mod editor;
pub mod helper;
pub mod history;
pub mod navigator;
pub mod settings;

pub use access::{IntRect, ResolveDescription, SimulationAccess, SimulationController};
pub use change::{
    CellChange, Change, ChangeConflict, ChangeError, ChangeSummary, ClusterChange,
    DataChangeDescription, ParticleChange,
};
pub use description::{
    CellDescription, CellFeatureDescription, CellFunction, CellMetadata, ClusterDescription,
    ConnectionDescription, DataDescription, DescriptionError, ParticleDescription,
    ParticleMetadata, TokenDescription,
};
pub use editor::{DataEditor, EditorError, Notification, Receiver, SelectionSummary, UpdateDescription};
pub use helper::{DescriptionHelper, LocalDescriptionHelper};
pub use history::{SnapshotHistory, TimestepSnapshot};
pub use navigator::{DescriptionNavigator, NavigatorError};
pub use settings::{ConfigError, SettingsStore, SimulationParameters};

/// Process-unique identifier shared by cells, clusters and particles.
pub type EntityId = u64;

const FULL_TURN_DEGREES: f32 = 360.0;

/// Wrap an angle in degrees into `[0, 360)`.
#[must_use]
pub fn normalize_degrees(mut angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    angle %= FULL_TURN_DEGREES;
    if angle < 0.0 {
        angle += FULL_TURN_DEGREES;
    }
    if angle >= FULL_TURN_DEGREES {
        angle = 0.0;
    }
    angle
}

/// 2D real vector used for positions and velocities.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Construct a new vector.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    /// Direction of the vector in degrees, clockwise from "up" (negative y).
    #[must_use]
    pub fn angle_degrees(self) -> f32 {
        if self.x == 0.0 && self.y == 0.0 {
            return 0.0;
        }
        normalize_degrees(self.x.atan2(-self.y).to_degrees())
    }

    /// Rotate this point by `degrees` around `center`.
    #[must_use]
    pub fn rotated_around(self, center: Self, degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let rel = self - center;
        center + Self::new(rel.x * cos - rel.y * sin, rel.x * sin + rel.y * cos)
    }

    /// Approximate equality for positions that went through float arithmetic.
    #[must_use]
    pub fn approx_eq(self, other: Self, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

/// Thread-safe source of fresh entity ids.
///
/// Ids are handed out in increasing order and never reused by the same
/// generator.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start handing out ids from `first`. Useful when resuming after a
    /// snapshot whose ids are already taken.
    #[must_use]
    pub fn starting_at(first: EntityId) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> EntityId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Make sure ids below `floor` are never produced.
    pub fn reserve_below(&self, floor: EntityId) {
        self.next.fetch_max(floor, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_points_clockwise_from_up() {
        assert!((Vec2::new(0.0, -1.0).angle_degrees() - 0.0).abs() < 1e-4);
        assert!((Vec2::new(1.0, 0.0).angle_degrees() - 90.0).abs() < 1e-4);
        assert!((Vec2::new(0.0, 1.0).angle_degrees() - 180.0).abs() < 1e-4);
        assert!((Vec2::new(-1.0, 0.0).angle_degrees() - 270.0).abs() < 1e-4);
    }

    #[test]
    fn rotation_around_center_keeps_distance() {
        let center = Vec2::new(10.0, 10.0);
        let point = Vec2::new(13.0, 14.0);
        let rotated = point.rotated_around(center, 90.0);
        assert!((center.distance(point) - center.distance(rotated)).abs() < 1e-4);
        assert!(rotated.approx_eq(Vec2::new(6.0, 13.0), 1e-4));
    }

    #[test]
    fn normalize_wraps_negative_and_large_angles() {
        assert!((normalize_degrees(-90.0) - 270.0).abs() < 1e-4);
        assert!((normalize_degrees(720.0 + 45.0) - 45.0).abs() < 1e-4);
        assert_eq!(normalize_degrees(f32::NAN), 0.0);
    }

    #[test]
    fn id_generator_is_monotonic() {
        let ids = IdGenerator::starting_at(5);
        assert_eq!(ids.next_id(), 5);
        assert_eq!(ids.next_id(), 6);
        ids.reserve_below(100);
        assert_eq!(ids.next_id(), 100);
        ids.reserve_below(10);
        assert_eq!(ids.next_id(), 101);
    }
}
