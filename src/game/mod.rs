//! Game Logic Module
//!
//! Curling rules on top of the simulator contract. Deterministic for a
//! given simulator and noise source.
//!
//! ## Module Structure
//!
//! - `state`: Match setting, state and result
//! - `moves`: Moves and move results
//! - `sheet`: Sheet geometry and coordinate transforms
//! - `scoring`: End scoring
//! - `apply`: The move-application state transition

pub mod state;
pub mod moves;
pub mod sheet;
pub mod scoring;
pub mod apply;

// Re-export key types
pub use state::{MatchSetting, MatchState, TeamId, GameResult, GameResultReason, END_MAX, EXTRA_END_MAX};
pub use moves::{Move, MoveResult, Shot, Rotation};
pub use sheet::SheetSide;
pub use apply::{apply_move, apply_move_observed, Game};
