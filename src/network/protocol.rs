//! Protocol Messages
//!
//! Wire format for client-server communication. One JSON object per line,
//! discriminated by its `"cmd"` field.
//!
//! ```text
//!  server                       client
//!    | -- dc {version} ----------> |
//!    | <--------- dc_ok {version} - |
//!    | -- is_ready {...} --------> |
//!    | <----------- ready_ok {name} |
//!    | -- new_game {teams} ------> |   (once both are ready)
//!    | -- update {...} ----------> |   (every turn, both clients)
//!    | <-------------- move {...} - |   (client on move only)
//!    | -- game_over -------------> |
//! ```

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::game::moves::{Move, MoveResult};
use crate::game::state::{MatchSetting, MatchState, TeamId};

/// Protocol version spoken by this server.
pub const PROTOCOL_VERSION: u32 = 1;

/// Rule set announced in `is_ready`.
pub const RULE_NORMAL: &str = "normal";

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting with the protocol version.
    Dc {
        /// Protocol version
        version: u32,
    },

    /// Match configuration; the client answers `ready_ok`.
    IsReady(IsReady),

    /// Both clients are ready.
    NewGame {
        /// Team names in slot order
        teams: [TeamInfo; 2],
    },

    /// State after a move (or the initial state).
    Update(Box<Update>),

    /// The match is over.
    GameOver,
}

/// Body of `is_ready`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsReady {
    /// Match identifier
    pub game_id: String,
    /// Rule set
    pub rule: String,
    /// Match rules
    pub game_setting: MatchSetting,
    /// Simulator setting, `"type"`-tagged
    pub simulator_setting: Value,
    /// Team assigned to this client
    pub team_id: TeamId,
    /// Thinking time for regular ends (s)
    pub time_limit: f64,
    /// Thinking time per extra end (s)
    pub extra_time_limit: f64,
}

/// One team in `new_game`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamInfo {
    /// Display name sent in `ready_ok`
    pub name: String,
}

/// Body of `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Match state
    pub state: MatchState,
    /// Remaining thinking time per team (s)
    pub remaining_times: [f64; 2],
    /// Move just applied, as simulated
    pub last_move: Option<Move>,
    /// Result of that move
    pub last_move_result: Option<MoveResult>,
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Answer to `dc`.
    DcOk {
        /// Protocol version spoken by the client
        version: u32,
    },

    /// Answer to `is_ready`.
    ReadyOk {
        /// Display name
        name: String,
    },

    /// The client's move, flattened: `{"cmd": "move", "type": ...}`.
    Move(Move),
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ServerMessage {
    /// Serialize to one JSON line (without the newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ClientMessage {
    /// Serialize to one JSON line (without the newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
