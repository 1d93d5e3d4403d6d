//! Stone identifiers and per-stone physical state.
//!
//! Stones are always addressed by id into fixed-capacity arrays of
//! optional slots. An empty slot is a stone that is not in play.

use std::fmt;
use serde::{Serialize, Deserialize};

use super::vec2::Vector2;

/// Number of stones in one end (8 per team).
pub const STONE_MAX: usize = 16;

/// Identifier of one of the [`STONE_MAX`] stones.
///
/// Stone `i` is delivered as shot `i` of an end.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoneId(u8);

impl StoneId {
    /// Create an id, returning `None` outside `0..STONE_MAX`.
    pub fn new(index: usize) -> Option<Self> {
        (index < STONE_MAX).then_some(Self(index as u8))
    }

    /// Slot index of this stone.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stone#{}", self.0)
    }
}

/// Physical state of one stone while it is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StoneData {
    /// Centre position (m)
    pub position: Vector2,
    /// Heading (rad)
    pub angle: f32,
    /// Linear velocity (m/s)
    pub linear_velocity: Vector2,
    /// Angular velocity (rad/s, counter-clockwise positive)
    pub angular_velocity: f32,
}

impl StoneData {
    /// A stone resting at `position`.
    pub fn at_rest(position: Vector2, angle: f32) -> Self {
        Self {
            position,
            angle,
            linear_velocity: Vector2::ZERO,
            angular_velocity: 0.0,
        }
    }
}

/// Physical state of every stone. `None` means not in play.
pub type AllStoneData = [Option<StoneData>; STONE_MAX];

/// Resting positions of every stone. `None` means not in play.
pub type StonePositions = [Option<Vector2>; STONE_MAX];

/// Contact between two stones during the most recent step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoneCollision {
    /// First stone
    pub a_id: StoneId,
    /// Second stone
    pub b_id: StoneId,
    /// Centre of `a` at the contact
    pub a_position: Vector2,
    /// Centre of `b` at the contact
    pub b_position: Vector2,
    /// Impulse along the contact normal (N*s)
    pub normal_impulse: f32,
    /// Impulse along the contact tangent (N*s)
    pub tangent_impulse: f32,
}

impl StoneCollision {
    /// Point of contact, halfway between the two centres.
    pub fn contact_point(&self) -> Vector2 {
        (self.a_position + self.b_position) * 0.5
    }
}
