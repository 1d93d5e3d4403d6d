//! # Curling Match Server
//!
//! Authoritative server for two-player digital curling matches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CURLING SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Geometry primitives                       │
//! │  ├── vec2.rs     - 2D vector, [x, y] on the wire             │
//! │  └── stone.rs    - Stone ids, snapshots, collisions          │
//! │                                                              │
//! │  simulation/     - Physics engines                           │
//! │  ├── mod.rs      - Simulator / SimulatorSetting traits       │
//! │  ├── registry.rs - "type" discriminator -> decoder           │
//! │  └── simple1.rs  - Reference engine (rapier2d)               │
//! │                                                              │
//! │  game/           - Rules (deterministic given the noise)     │
//! │  ├── state.rs    - Match setting, state and result           │
//! │  ├── moves.rs    - Moves and move results                    │
//! │  ├── sheet.rs    - Sheet lines and side transforms           │
//! │  ├── scoring.rs  - End scoring                               │
//! │  └── apply.rs    - apply_move                                │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - One task per socket                       │
//! │  ├── channel.rs  - Handshake, turns, time budgets            │
//! │  └── server.rs   - Listeners and match teardown              │
//! │                                                              │
//! │  config.rs       - JSON configuration file                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Coordinates
//!
//! Rules and clients work in shot-local coordinates: the thrower stands
//! at the origin and delivers towards +y, the tee sits at (0, 38.405).
//! The physics engine works in sheet coordinates, and ends alternate
//! between the two ends of the sheet. [`game::SheetSide`] converts.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod simulation;
pub mod game;
pub mod network;
pub mod config;

// Re-export commonly used types
pub use crate::core::vec2::Vector2;
pub use crate::core::stone::{StoneId, StoneData, AllStoneData, STONE_MAX};
pub use simulation::{Simulator, SimulatorSetting, SimulatorRegistry};
pub use game::{apply_move, Game, GameResult, MatchSetting, MatchState, Move, TeamId};
pub use network::{Server, ServerError};
pub use config::{ConfigError, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
