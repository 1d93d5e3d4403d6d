//! Moves and move results.
//!
//! Wire form of a move is internally tagged on `"type"`:
//!
//! ```json
//! {"type": "shot", "velocity": [0.1, 2.4], "rotation": "ccw"}
//! {"type": "concede"}
//! {"type": "time_limit"}
//! ```

use std::f32::consts::FRAC_PI_2;
use serde::{Serialize, Deserialize};

use crate::core::stone::StonePositions;
use crate::core::vec2::Vector2;
use super::state::TeamId;

/// Spin direction of a delivered stone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    /// Counter-clockwise, curls left
    Ccw,
    /// Clockwise, curls right
    Cw,
}

impl Rotation {
    /// Initial angular velocity (rad/s, counter-clockwise positive).
    #[inline]
    pub fn angular_velocity(self) -> f32 {
        match self {
            Rotation::Ccw => FRAC_PI_2,
            Rotation::Cw => -FRAC_PI_2,
        }
    }
}

/// A delivery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    /// Initial velocity in shot coordinates (m/s)
    pub velocity: Vector2,
    /// Spin direction
    pub rotation: Rotation,
}

/// One turn's action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Move {
    /// Deliver a stone.
    Shot(Shot),

    /// Give up the match.
    Concede,

    /// Out of thinking time. Only ever produced by the server.
    TimeLimit,
}

/// Outcome of one applied move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveResult {
    /// Team that moved
    pub team: TeamId,
    /// Shot index the move was applied at
    pub shot: u8,
    /// End the move was applied in
    pub end: u8,
    /// Resting stones after the move, shot coordinates
    pub stone_positions: StonePositions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_move_wire_round_trip() {
        let moves = [
            Move::Shot(Shot { velocity: Vector2::new(0.125, 2.5), rotation: Rotation::Ccw }),
            Move::Shot(Shot { velocity: Vector2::new(-0.5, 1.75), rotation: Rotation::Cw }),
            Move::Concede,
            Move::TimeLimit,
        ];
        for mv in moves {
            let text = serde_json::to_string(&mv).unwrap();
            let back: Move = serde_json::from_str(&text).unwrap();
            assert_eq!(back, mv);
        }
    }

    #[test]
    fn test_move_wire_shape() {
        let shot = Move::Shot(Shot { velocity: Vector2::new(0.5, 2.0), rotation: Rotation::Cw });
        assert_eq!(
            serde_json::to_value(shot).unwrap(),
            json!({"type": "shot", "velocity": [0.5, 2.0], "rotation": "cw"})
        );
        assert_eq!(serde_json::to_value(Move::TimeLimit).unwrap(), json!({"type": "time_limit"}));

        let parsed: Move = serde_json::from_value(json!({"type": "concede"})).unwrap();
        assert_eq!(parsed, Move::Concede);
        assert!(serde_json::from_value::<Move>(json!({"type": "sweep"})).is_err());
    }

    #[test]
    fn test_rotation_sign() {
        assert!(Rotation::Ccw.angular_velocity() > 0.0);
        assert_eq!(Rotation::Cw.angular_velocity(), -Rotation::Ccw.angular_velocity());
    }
}
