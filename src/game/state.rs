//! Match State Definitions
//!
//! Setting, state and result types of one match. `MatchState` is the
//! single source of truth broadcast to both clients after every move.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::stone::{StonePositions, STONE_MAX};

/// Regular ends at most (length of [`MatchState::scores`]).
pub const END_MAX: usize = 10;

/// Hard ceiling on the end counter including extra ends.
pub const EXTRA_END_MAX: u8 = 255;

// =============================================================================
// TEAM ID
// =============================================================================

/// One of the two teams. Serialized as `0` or `1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TeamId {
    /// Team 0
    #[default]
    Team0,
    /// Team 1
    Team1,
}

impl TeamId {
    /// The other team.
    #[inline]
    pub fn opponent(self) -> Self {
        match self {
            TeamId::Team0 => TeamId::Team1,
            TeamId::Team1 => TeamId::Team0,
        }
    }

    /// Slot index (0 or 1).
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Team from a slot index; anything odd is team 1.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        if index % 2 == 0 {
            TeamId::Team0
        } else {
            TeamId::Team1
        }
    }
}

impl From<TeamId> for u8 {
    fn from(team: TeamId) -> u8 {
        team as u8
    }
}

impl TryFrom<u8> for TeamId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TeamId::Team0),
            1 => Ok(TeamId::Team1),
            other => Err(format!("invalid team id: {other}")),
        }
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team{}", self.index())
    }
}

// =============================================================================
// MATCH SETTING
// =============================================================================

/// Rules of one match. Immutable once the match starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSetting {
    /// Perturb shot velocity with normal noise
    pub randomize_initial_shot_velocity: bool,
    /// Number of regular ends (1..=10)
    pub end: u8,
    /// Sheet width (m)
    pub sheet_width: f32,
    /// Five-rock free-guard-zone rule (four-rock when false)
    pub five_rock_rule: bool,
    /// Shot speed ceiling (m/s)
    pub max_shot_speed: f32,
    /// Standard deviation of the speed noise (m/s)
    pub stddev_shot_speed: f32,
    /// Standard deviation of the direction noise (rad)
    pub stddev_shot_angle: f32,
}

impl MatchSetting {
    /// Number of leading shots of an end protected by the free-guard zone.
    #[inline]
    pub fn free_guard_shots(&self) -> u8 {
        if self.five_rock_rule {
            5
        } else {
            4
        }
    }
}

impl Default for MatchSetting {
    fn default() -> Self {
        Self {
            randomize_initial_shot_velocity: true,
            end: 10,
            sheet_width: 4.75,
            five_rock_rule: true,
            max_shot_speed: 3.0,
            stddev_shot_speed: 0.001,
            stddev_shot_angle: 0.001,
        }
    }
}

// =============================================================================
// GAME RESULT
// =============================================================================

/// Why the match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResultReason {
    /// Final score decided it
    Score,
    /// A team conceded
    Concede,
    /// A team ran out of thinking time
    TimeLimit,
    /// Extra-end ceiling reached with the score level
    Invalid,
}

/// Final outcome. Set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// Winning team, `None` for no winner
    pub win: Option<TeamId>,
    /// Reason
    pub reason: GameResultReason,
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete match state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    /// Resting stones in shot-local coordinates, indexed by shot
    pub stone_positions: StonePositions,
    /// Regular-end scores, positive for team 0
    pub scores: [i8; END_MAX],
    /// Shot index within the end (0..16)
    pub current_shot: u8,
    /// Team throwing first in the current end
    pub current_end_first: TeamId,
    /// End index, may exceed the regular end count
    pub current_end: u8,
    /// Score of the latest extra end, positive for team 0
    pub extra_end_score: i8,
    /// Set when the match is over
    pub game_result: Option<GameResult>,
}

impl MatchState {
    /// Fresh state: end 0, shot 0, team 0 throws first.
    pub fn new() -> Self {
        Self {
            stone_positions: [None; STONE_MAX],
            scores: [0; END_MAX],
            current_shot: 0,
            current_end_first: TeamId::Team0,
            current_end: 0,
            extra_end_score: 0,
            game_result: None,
        }
    }

    /// Team on move.
    #[inline]
    pub fn current_team(&self) -> TeamId {
        if self.current_shot % 2 == 0 {
            self.current_end_first
        } else {
            self.current_end_first.opponent()
        }
    }

    /// Total points scored by `team` so far.
    pub fn score(&self, team: TeamId) -> u32 {
        let points = |s: i8| -> u32 {
            match team {
                TeamId::Team0 if s > 0 => s as u32,
                TeamId::Team1 if s < 0 => s.unsigned_abs() as u32,
                _ => 0,
            }
        };
        self.scores.iter().copied().map(points).sum::<u32>() + points(self.extra_end_score)
    }

    /// Total score difference, positive when team 0 leads.
    pub fn score_difference(&self) -> i32 {
        self.scores.iter().map(|&s| s as i32).sum::<i32>() + self.extra_end_score as i32
    }

    /// True once a result is set.
    #[inline]
    pub fn is_over(&self) -> bool {
        self.game_result.is_some()
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
