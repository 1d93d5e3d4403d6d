//! Move Application
//!
//! The single state-transition function of a match. Given the setting,
//! the current state, the physics engine and one move, it runs the shot
//! to rest, applies removal and free-guard-zone rules, scores finished
//! ends and decides the match.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::core::stone::{AllStoneData, StoneData, StonePositions, STONE_MAX};
use crate::core::vec2::Vector2;
use crate::simulation::{Simulator, SimulatorSetting};
use super::moves::{Move, MoveResult, Shot};
use super::scoring::check_score;
use super::sheet::{
    is_in_free_guard_zone, is_in_play_area, is_valid_in_motion, SheetSide,
};
use super::state::{
    GameResult, GameResultReason, MatchSetting, MatchState, TeamId, END_MAX, EXTRA_END_MAX,
};

/// Index of the last shot of an end.
const LAST_SHOT: u8 = (STONE_MAX - 1) as u8;

/// Apply one move.
///
/// Shots are clamped to the maximum speed and, when enabled, perturbed with
/// normal noise; the perturbed velocity is written back into `mv`.
/// Returns `None` without touching anything if the match is already over.
pub fn apply_move<R: Rng + ?Sized>(
    setting: &MatchSetting,
    state: &mut MatchState,
    simulator: &mut dyn Simulator,
    rng: &mut R,
    mv: &mut Move,
) -> Option<MoveResult> {
    apply_move_observed(setting, state, simulator, rng, mv, |_| {})
}

/// [`apply_move`] with a callback run after every physics frame.
pub fn apply_move_observed<R, F>(
    setting: &MatchSetting,
    state: &mut MatchState,
    simulator: &mut dyn Simulator,
    rng: &mut R,
    mv: &mut Move,
    mut on_step: F,
) -> Option<MoveResult>
where
    R: Rng + ?Sized,
    F: FnMut(&dyn Simulator),
{
    if state.is_over() {
        return None;
    }

    let team = state.current_team();
    let shot_index = state.current_shot;
    let end = state.current_end;
    let side = SheetSide::for_end(end);

    let shot = match mv {
        Move::Shot(shot) => shot,
        Move::Concede => return Some(forfeit(state, GameResultReason::Concede)),
        Move::TimeLimit => return Some(forfeit(state, GameResultReason::TimeLimit)),
    };

    // 1. Rebuild the resting stones on the sheet
    let initial = initial_stones(state, simulator, side);

    // 2. Clamp and perturb the delivery
    clamp_and_perturb(setting, shot, rng);

    // 3. Run the shot until everything stops
    let mut delivered = initial;
    delivered[shot_index as usize] = Some(StoneData {
        position: side.to_sheet(Vector2::ZERO),
        angle: side.angle_to_sheet(0.0),
        linear_velocity: side.velocity_to_sheet(shot.velocity),
        angular_velocity: shot.rotation.angular_velocity(),
    });
    simulator.set_stones(&delivered);
    let radius = simulator.stone_radius();

    let mut frames: u64 = 0;
    while !simulator.are_all_stones_stopped() {
        simulator.step();
        frames += 1;
        remove_stones(simulator, shot_index, |p| {
            is_valid_in_motion(p, setting.sheet_width, radius, side)
        });
        on_step(&*simulator);
    }

    // 4. Stones short of the hog line are out
    remove_stones(simulator, shot_index, |p| is_in_play_area(p, radius, side));

    // 5. Free-guard-zone rule
    if shot_index < setting.free_guard_shots() {
        let after = simulator.stones();
        let mut opponent_guards = ((shot_index as usize + 1) % 2..shot_index as usize).step_by(2);
        let foul = opponent_guards.any(|i| {
            matches!(initial[i], Some(guard) if is_in_free_guard_zone(guard.position, radius, side))
                && after[i].is_none()
        });
        if foul {
            debug!(shot = shot_index, "free guard zone violation, shot reverted");
            simulator.set_stones(&initial);
        }
    }

    debug!(%team, shot = shot_index, end, frames, "shot settled");

    let stone_positions = shot_positions(&simulator.stones(), side);
    let result = MoveResult {
        team,
        shot: shot_index,
        end,
        stone_positions,
    };

    // 6. Close the end or advance the shot
    if shot_index == LAST_SHOT {
        let score = check_score(&simulator.stones(), radius, side, state.current_end_first);
        finish_end(setting, state, score);
    } else {
        state.stone_positions = stone_positions;
        state.current_shot += 1;
    }

    Some(result)
}

/// Resting stones of the current end as simulator input.
///
/// Headings are carried over from the simulator so that stones do not
/// snap back to zero rotation between shots.
fn initial_stones(state: &MatchState, simulator: &dyn Simulator, side: SheetSide) -> AllStoneData {
    let current = simulator.stones();
    let mut stones: AllStoneData = [None; STONE_MAX];
    for (i, slot) in stones.iter_mut().enumerate().take(state.current_shot as usize) {
        if let Some(p) = state.stone_positions[i] {
            let angle = current[i].map_or(0.0, |s| s.angle);
            *slot = Some(StoneData::at_rest(side.to_sheet(p), angle));
        }
    }
    stones
}

fn clamp_and_perturb<R: Rng + ?Sized>(setting: &MatchSetting, shot: &mut Shot, rng: &mut R) {
    let speed = shot.velocity.length();
    if speed > setting.max_shot_speed {
        shot.velocity = shot.velocity * (setting.max_shot_speed / speed);
    }

    if setting.randomize_initial_shot_velocity {
        let speed = shot.velocity.length() + normal_noise(setting.stddev_shot_speed, rng);
        let angle = shot.velocity.y.atan2(shot.velocity.x)
            + normal_noise(setting.stddev_shot_angle, rng);
        shot.velocity = Vector2::new(angle.cos(), angle.sin()) * speed;
    }
}

fn normal_noise<R: Rng + ?Sized>(stddev: f32, rng: &mut R) -> f32 {
    match Normal::new(0.0f32, stddev) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

/// Take every stone up to `last` that fails `keep` out of play.
fn remove_stones(simulator: &mut dyn Simulator, last: u8, keep: impl Fn(Vector2) -> bool) {
    let mut stones = simulator.stones();
    let mut removed = false;
    for slot in stones.iter_mut().take(last as usize + 1) {
        if matches!(slot, Some(s) if !keep(s.position)) {
            *slot = None;
            removed = true;
        }
    }
    if removed {
        simulator.set_stones(&stones);
    }
}

fn shot_positions(stones: &AllStoneData, side: SheetSide) -> StonePositions {
    let mut positions: StonePositions = [None; STONE_MAX];
    for (p, s) in positions.iter_mut().zip(stones.iter()) {
        *p = s.map(|s| side.to_shot(s.position));
    }
    positions
}

/// The mover gives up. Nothing on the sheet changes.
fn forfeit(state: &mut MatchState, reason: GameResultReason) -> MoveResult {
    let team = state.current_team();
    state.game_result = Some(GameResult {
        win: Some(team.opponent()),
        reason,
    });
    debug!(%team, ?reason, "match forfeited");
    MoveResult {
        team,
        shot: state.current_shot,
        end: state.current_end,
        stone_positions: state.stone_positions,
    }
}

/// Record the end score, pass the first throw and check for a result.
fn finish_end(setting: &MatchSetting, state: &mut MatchState, score: i8) {
    let end = state.current_end as usize;
    if state.current_end < setting.end && end < END_MAX {
        state.scores[end] = score;
    } else {
        state.extra_end_score = score;
    }

    // Blank ends keep the hammer
    if score > 0 {
        state.current_end_first = TeamId::Team1;
    } else if score < 0 {
        state.current_end_first = TeamId::Team0;
    }

    state.stone_positions = [None; STONE_MAX];
    state.current_shot = 0;
    state.current_end = state.current_end.saturating_add(1);

    debug!(end = state.current_end, score, "end finished");

    if state.current_end < setting.end {
        return;
    }

    let total = state.score_difference();
    let (win, reason) = if total > 0 {
        (Some(TeamId::Team0), GameResultReason::Score)
    } else if total < 0 {
        (Some(TeamId::Team1), GameResultReason::Score)
    } else if state.current_end >= EXTRA_END_MAX {
        (None, GameResultReason::Invalid)
    } else {
        return;
    };
    state.game_result = Some(GameResult { win, reason });
}

// =============================================================================
// MATCH BUNDLE
// =============================================================================

/// Everything needed to advance one match.
pub struct Game {
    /// Rules
    pub setting: MatchSetting,
    /// Current state
    pub state: MatchState,
    /// Physics engine
    pub simulator: Box<dyn Simulator>,
    /// Shot noise source
    pub rng: ChaCha8Rng,
}

impl Game {
    /// New match. Entropy-seeded unless `seed` is given.
    pub fn new(setting: MatchSetting, simulator_setting: &dyn SimulatorSetting, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            setting,
            state: MatchState::new(),
            simulator: simulator_setting.create_simulator(),
            rng,
        }
    }

    /// Apply one move to this match.
    pub fn apply(&mut self, mv: &mut Move) -> Option<MoveResult> {
        apply_move(&self.setting, &mut self.state, self.simulator.as_mut(), &mut self.rng, mv)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stone::StoneCollision;
    use crate::game::moves::Rotation;
    use crate::game::sheet::{HACK_LINE_Y, TEE_LINE_Y};
    use crate::simulation::{Simple1Setting, Simple1Simulator};
    use proptest::prelude::*;
    use rand::rngs::mock::StepRng;
    use rand::Rng;

    /// Seconds a scripted stone glides before stopping.
    const GLIDE: f32 = 16.0;

    /// Tee in shot coordinates.
    const TEE_SHOT_Y: f32 = TEE_LINE_Y + HACK_LINE_Y;

    /// Scripted engine: a moving stone stops at `position + velocity * GLIDE`
    /// in one frame and knocks any stone it lands on off the side of the sheet.
    struct GlideSimulator {
        stones: AllStoneData,
        setting: Simple1Setting,
    }

    impl GlideSimulator {
        fn new() -> Self {
            Self { stones: [None; STONE_MAX], setting: Simple1Setting::default() }
        }
    }

    impl Simulator for GlideSimulator {
        fn set_stones(&mut self, stones: &AllStoneData) {
            self.stones = *stones;
        }

        fn step(&mut self) {
            let radius = self.stone_radius();
            for i in 0..STONE_MAX {
                let Some(mut s) = self.stones[i] else { continue };
                if s.linear_velocity == Vector2::ZERO {
                    continue;
                }
                s.position += s.linear_velocity * GLIDE;
                s.linear_velocity = Vector2::ZERO;
                s.angular_velocity = 0.0;
                self.stones[i] = Some(s);
                for (j, other) in self.stones.iter_mut().enumerate() {
                    if let Some(o) = other {
                        if j != i && o.position.distance(s.position) < 2.0 * radius {
                            o.position.x = 10.0;
                        }
                    }
                }
            }
        }

        fn stones(&self) -> AllStoneData {
            self.stones
        }

        fn collisions(&self) -> &[StoneCollision] {
            &[]
        }

        fn are_all_stones_stopped(&self) -> bool {
            self.stones.iter().flatten().all(|s| s.linear_velocity == Vector2::ZERO)
        }

        fn stone_radius(&self) -> f32 {
            0.145
        }

        fn seconds_per_frame(&self) -> f32 {
            1.0
        }

        fn setting(&self) -> &dyn SimulatorSetting {
            &self.setting
        }
    }

    fn exact() -> MatchSetting {
        MatchSetting { randomize_initial_shot_velocity: false, ..MatchSetting::default() }
    }

    /// Shot that comes to rest at `target` (shot coordinates) on the glide engine.
    fn to(target: Vector2) -> Move {
        Move::Shot(Shot { velocity: target / GLIDE, rotation: Rotation::Ccw })
    }

    fn rng() -> StepRng {
        StepRng::new(0, 1)
    }

    fn near(a: Option<Vector2>, b: Vector2) -> bool {
        a.is_some_and(|a| (a - b).length() < 1e-3)
    }

    #[test]
    fn test_shot_rests_and_advances() {
        let setting = exact();
        let mut state = MatchState::new();
        let mut sim = GlideSimulator::new();
        let target = Vector2::new(0.3, 36.0);

        let result = apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(target)).unwrap();

        assert_eq!(result.team, TeamId::Team0);
        assert_eq!(result.shot, 0);
        assert_eq!(result.end, 0);
        assert!(near(result.stone_positions[0], target));
        assert!(near(state.stone_positions[0], target));
        assert_eq!(state.current_shot, 1);
        assert_eq!(state.current_team(), TeamId::Team1);
    }

    #[test]
    fn test_short_of_hog_is_removed() {
        let setting = exact();
        let mut state = MatchState::new();
        let mut sim = GlideSimulator::new();

        // Hog line is at 32.004 in shot coordinates
        let result = apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(Vector2::new(0.0, 31.0))).unwrap();

        assert!(result.stone_positions[0].is_none());
        assert_eq!(state.current_shot, 1);
    }

    #[test]
    fn test_speed_is_clamped() {
        let setting = exact();
        let mut state = MatchState::new();
        let mut sim = GlideSimulator::new();
        let mut mv = Move::Shot(Shot { velocity: Vector2::new(0.0, 30.0), rotation: Rotation::Cw });

        apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut mv).unwrap();

        let Move::Shot(shot) = mv else { panic!("shot expected") };
        assert!((shot.velocity.length() - setting.max_shot_speed).abs() < 1e-5);
    }

    #[test]
    fn test_noise_is_written_back() {
        let setting = MatchSetting { stddev_shot_speed: 0.1, stddev_shot_angle: 0.1, ..MatchSetting::default() };
        let mut state = MatchState::new();
        let mut sim = GlideSimulator::new();
        let sent = Vector2::new(0.0, 2.3);
        let mut mv = Move::Shot(Shot { velocity: sent, rotation: Rotation::Ccw });

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        apply_move(&setting, &mut state, &mut sim, &mut rng, &mut mv).unwrap();

        let Move::Shot(shot) = mv else { panic!("shot expected") };
        assert_ne!(shot.velocity, sent);
        assert!((shot.velocity - sent).length() < 1.5);
    }

    #[test]
    fn test_free_guard_zone_foul_reverts_shot() {
        let setting = exact();
        let mut state = MatchState::new();
        let guard = Vector2::new(0.0, 35.0);
        state.stone_positions[0] = Some(guard);
        state.current_shot = 1;
        let mut sim = GlideSimulator::new();

        let result = apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(guard)).unwrap();

        // Guard restored, delivered stone not in play
        assert!(near(result.stone_positions[0], guard));
        assert!(result.stone_positions[1].is_none());
        assert!(near(state.stone_positions[0], guard));
        assert!(state.stone_positions[1].is_none());
        assert!(near(sim.stones()[0].map(|s| SheetSide::Mirrored.to_shot(s.position)), guard));
        assert!(sim.stones()[1].is_none());
        assert_eq!(state.current_shot, 2);
    }

    #[test]
    fn test_takeout_after_free_guard_shots_stands() {
        let setting = exact();
        let mut state = MatchState::new();
        let guard = Vector2::new(0.0, 35.0);
        state.stone_positions[4] = Some(guard);
        state.current_shot = 5;
        let mut sim = GlideSimulator::new();

        let result = apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(guard)).unwrap();

        assert!(result.stone_positions[4].is_none());
        assert!(near(result.stone_positions[5], guard));
    }

    #[test]
    fn test_four_rock_rule_allows_fifth_shot_takeout() {
        let setting = MatchSetting { five_rock_rule: false, ..exact() };
        let mut state = MatchState::new();
        let guard = Vector2::new(0.0, 35.0);
        state.stone_positions[3] = Some(guard);
        state.current_shot = 4;
        let mut sim = GlideSimulator::new();

        let result = apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(guard)).unwrap();
        assert!(result.stone_positions[3].is_none());

        // Same shot under the five-rock rule is a foul
        let setting = exact();
        let mut state = MatchState::new();
        state.stone_positions[3] = Some(guard);
        state.current_shot = 4;
        let mut sim = GlideSimulator::new();
        let result = apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(guard)).unwrap();
        assert!(near(result.stone_positions[3], guard));
    }

    #[test]
    fn test_last_shot_scores_and_passes_hammer() {
        let setting = exact();
        let mut state = MatchState::new();
        state.current_shot = 15;
        // Team 0 (even shots) sits one metre back, team 1 draws to the button
        state.stone_positions[0] = Some(Vector2::new(0.0, TEE_SHOT_Y + 1.0));
        let mut sim = GlideSimulator::new();

        let result = apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(Vector2::new(0.0, TEE_SHOT_Y))).unwrap();

        assert_eq!(result.team, TeamId::Team1);
        assert_eq!(result.shot, 15);
        assert!(result.stone_positions[15].is_some());
        assert_eq!(state.scores[0], -1);
        assert_eq!(state.current_end, 1);
        assert_eq!(state.current_shot, 0);
        assert_eq!(state.current_end_first, TeamId::Team0);
        assert!(state.stone_positions.iter().all(Option::is_none));
        assert!(!state.is_over());
    }

    #[test]
    fn test_blank_end_keeps_hammer() {
        let setting = exact();
        let mut state = MatchState::new();
        state.current_shot = 15;
        state.current_end_first = TeamId::Team1;
        let mut sim = GlideSimulator::new();

        apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(Vector2::new(0.0, 33.0))).unwrap();

        assert_eq!(state.scores[0], 0);
        assert_eq!(state.current_end_first, TeamId::Team1);
        assert_eq!(state.current_end, 1);
    }

    #[test]
    fn test_last_regular_end_decides_match() {
        let setting = MatchSetting { end: 1, ..exact() };
        let mut state = MatchState::new();
        state.current_shot = 15;
        let mut sim = GlideSimulator::new();

        apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(Vector2::new(0.0, TEE_SHOT_Y))).unwrap();

        assert_eq!(
            state.game_result,
            Some(GameResult { win: Some(TeamId::Team1), reason: GameResultReason::Score })
        );
        // Terminal: further moves are ignored
        let before = state.clone();
        assert!(apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut Move::Concede).is_none());
        assert_eq!(state, before);
    }

    #[test]
    fn test_tied_match_goes_to_extra_end() {
        let setting = MatchSetting { end: 1, ..exact() };
        let mut state = MatchState::new();
        state.current_shot = 15;
        let mut sim = GlideSimulator::new();

        apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(Vector2::new(0.0, 33.0))).unwrap();
        assert!(!state.is_over());
        assert_eq!(state.current_end, 1);

        // Extra end: score goes to the extra-end slot
        state.current_shot = 15;
        apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(Vector2::new(0.0, TEE_SHOT_Y))).unwrap();
        assert_eq!(state.extra_end_score, -1);
        assert_eq!(state.scores, [0; 10]);
        assert_eq!(state.game_result.map(|r| r.win), Some(Some(TeamId::Team1)));
    }

    #[test]
    fn test_extra_end_ceiling_is_invalid_draw() {
        let setting = MatchSetting { end: 1, ..exact() };
        let mut state = MatchState::new();
        state.current_end = EXTRA_END_MAX - 1;
        state.current_shot = 15;
        let mut sim = GlideSimulator::new();

        apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut to(Vector2::new(0.0, 33.0))).unwrap();

        assert_eq!(state.current_end, EXTRA_END_MAX);
        assert_eq!(state.game_result, Some(GameResult { win: None, reason: GameResultReason::Invalid }));
    }

    fn arbitrary_state() -> impl Strategy<Value = MatchState> {
        (
            0u8..16,
            any::<bool>(),
            0u8..10,
            proptest::collection::vec(-3i8..=3, 10),
            proptest::collection::vec(proptest::option::of((-2.0f32..2.0, 30.0f32..40.0)), 16),
        )
            .prop_map(|(shot, first, end, scores, stones)| {
                let mut state = MatchState::new();
                state.current_shot = shot;
                state.current_end_first = if first { TeamId::Team1 } else { TeamId::Team0 };
                state.current_end = end;
                state.scores.copy_from_slice(&scores);
                for (slot, s) in state.stone_positions.iter_mut().zip(stones) {
                    *slot = s.map(|(x, y)| Vector2::new(x, y));
                }
                state
            })
    }

    proptest! {
        #[test]
        fn test_forfeit_hands_win_to_opponent(state in arbitrary_state(), concede in any::<bool>()) {
            let setting = exact();
            let mut state = state;
            let before = state.clone();
            let mut sim = GlideSimulator::new();
            let mut mv = if concede { Move::Concede } else { Move::TimeLimit };

            let result = apply_move(&setting, &mut state, &mut sim, &mut rng(), &mut mv).unwrap();

            let reason = if concede { GameResultReason::Concede } else { GameResultReason::TimeLimit };
            prop_assert_eq!(state.game_result, Some(GameResult { win: Some(before.current_team().opponent()), reason }));
            prop_assert_eq!(state.stone_positions, before.stone_positions);
            prop_assert_eq!(state.scores, before.scores);
            prop_assert_eq!(result.team, before.current_team());
        }
    }

    #[test]
    fn test_draw_to_the_house_on_reference_engine() {
        let setting = exact();
        let mut state = MatchState::new();
        let mut sim = Simple1Simulator::new(Simple1Setting::default());
        let angle: f32 = 0.0548;
        let mut mv = Move::Shot(Shot {
            velocity: Vector2::new(angle.sin(), angle.cos()) * 2.4,
            rotation: Rotation::Ccw,
        });

        let mut frames = 0;
        let result = apply_move_observed(&setting, &mut state, &mut sim, &mut rng(), &mut mv, |_| frames += 1).unwrap();

        let rest = result.stone_positions[0].expect("stone in play");
        let tee = Vector2::new(0.0, TEE_SHOT_Y);
        assert!(rest.distance(tee) < 1.0, "stopped at {rest}");
        assert!(frames > 10_000);
    }

    #[test]
    fn test_game_bundle_is_seeded() {
        let setting = MatchSetting::default();
        let mut a = Game::new(setting, &Simple1Setting::default(), Some(42));
        let mut b = Game::new(setting, &Simple1Setting::default(), Some(42));
        assert_eq!(a.rng.gen::<u64>(), b.rng.gen::<u64>());
        assert_eq!(a.state, MatchState::new());
    }
}
