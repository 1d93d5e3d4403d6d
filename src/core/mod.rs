//! Geometry primitives.
//!
//! Value types shared by the physics engine, the rule engine and the
//! wire protocol.

pub mod vec2;
pub mod stone;

// Re-export core types
pub use vec2::Vector2;
pub use stone::{StoneId, StoneData, AllStoneData, StonePositions, StoneCollision, STONE_MAX};
