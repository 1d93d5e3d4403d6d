//! Reference Physics Engine (`"simple1"`)
//!
//! Every frame each moving stone is decelerated along its heading and its
//! velocity is rotated slightly towards its spin (the curl). Spin decays
//! faster as the stone slows down. Stone-stone contacts are then resolved
//! by rapier with fully elastic restitution.
//!
//! The empirical curves are fitted to measured stone behaviour on ice:
//!
//! ```text
//! a_long(v) = -(0.00200985 / (v + 0.06385782) + 0.00626286) * g
//! yaw(v, w) = sign(w) * 0.00820 * v^-0.8        (0 if w == 0)
//! a_ang(v)  = -0.025 / max(v, 0.001)
//! ```

use std::any::Any;
use std::cell::Cell;
use std::f32::consts::PI;

use rapier2d::prelude::*;
use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::core::stone::{AllStoneData, StoneCollision, StoneData, StoneId, STONE_MAX};
use crate::core::vec2::Vector2;
use super::registry::SettingError;
use super::{tagged_json, Simulator, SimulatorSetting};

/// Stone radius (m).
pub const STONE_RADIUS: f32 = 0.145;

/// Stone mass (kg).
pub const STONE_MASS: f32 = 19.96;

/// Standard gravity (m/s^2).
const GRAVITY: f32 = 9.80665;

/// Stone-stone friction coefficient.
const STONE_FRICTION: f32 = 0.2;

/// Stone-stone restitution.
const STONE_RESTITUTION: f32 = 1.0;

const EPSILON: f32 = f32::EPSILON;

// =============================================================================
// SETTING
// =============================================================================

fn default_seconds_per_frame() -> f32 {
    0.001
}

/// Setting of the reference engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Simple1Setting {
    /// Frame duration (s)
    #[serde(default = "default_seconds_per_frame")]
    pub seconds_per_frame: f32,
}

impl Simple1Setting {
    /// Discriminator of this engine.
    pub const TYPE_NAME: &'static str = "simple1";

    /// Registry decoder.
    pub fn decode(value: &Value) -> Result<Box<dyn SimulatorSetting>, SettingError> {
        let setting: Simple1Setting = serde_json::from_value(value.clone())?;
        if !(setting.seconds_per_frame.is_finite() && setting.seconds_per_frame > 0.0) {
            return Err(SettingError::Invalid {
                field: "seconds_per_frame",
                reason: format!("{} is not a positive frame duration", setting.seconds_per_frame),
            });
        }
        Ok(Box::new(setting))
    }
}

impl Default for Simple1Setting {
    fn default() -> Self {
        Self {
            seconds_per_frame: default_seconds_per_frame(),
        }
    }
}

impl SimulatorSetting for Simple1Setting {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn create_simulator(&self) -> Box<dyn Simulator> {
        Box::new(Simple1Simulator::new(*self))
    }

    fn to_json(&self) -> Result<Value, SettingError> {
        tagged_json(Self::TYPE_NAME, self)
    }

    fn clone_box(&self) -> Box<dyn SimulatorSetting> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// EMPIRICAL CURVES
// =============================================================================

/// Deceleration along the direction of travel (m/s^2, negative).
#[inline]
fn longitudinal_acceleration(speed: f32) -> f32 {
    -(0.00200985 / (speed + 0.06385782) + 0.00626286) * GRAVITY
}

/// Rate at which the velocity vector turns (rad/s).
#[inline]
fn yaw_rate(speed: f32, angular_velocity: f32) -> f32 {
    if angular_velocity.abs() <= EPSILON {
        return 0.0;
    }
    angular_velocity.signum() * 0.00820 * speed.powf(-0.8)
}

/// Spin deceleration magnitude (rad/s^2, negative).
#[inline]
fn angular_acceleration(linear_speed: f32) -> f32 {
    -0.025 / linear_speed.max(0.001)
}

// =============================================================================
// ENGINE
// =============================================================================

/// Reference engine. Owns one rapier world with 16 ball bodies.
pub struct Simple1Simulator {
    setting: Simple1Setting,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    handles: [RigidBodyHandle; STONE_MAX],
    pipeline: PhysicsPipeline,
    params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    collisions: Vec<StoneCollision>,
    /// Snapshot cache, cleared on every mutation.
    stones_cache: Cell<Option<AllStoneData>>,
    /// Stopped-check cache, cleared on every mutation.
    stopped_cache: Cell<Option<bool>>,
}

impl Simple1Simulator {
    /// Build an engine with every stone out of play.
    pub fn new(setting: Simple1Setting) -> Self {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();
        let density = STONE_MASS / (PI * STONE_RADIUS * STONE_RADIUS);

        let handles: [RigidBodyHandle; STONE_MAX] = std::array::from_fn(|i| {
            let body = RigidBodyBuilder::dynamic()
                .ccd_enabled(true)
                .can_sleep(false)
                .enabled(false)
                .build();
            let handle = bodies.insert(body);
            let collider = ColliderBuilder::ball(STONE_RADIUS)
                .friction(STONE_FRICTION)
                .restitution(STONE_RESTITUTION)
                .density(density)
                .user_data(i as u128)
                .build();
            colliders.insert_with_parent(collider, handle, &mut bodies);
            handle
        });

        let params = IntegrationParameters {
            dt: setting.seconds_per_frame,
            ..IntegrationParameters::default()
        };

        Self {
            setting,
            bodies,
            colliders,
            handles,
            pipeline: PhysicsPipeline::new(),
            params,
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            collisions: Vec::new(),
            stones_cache: Cell::new(None),
            stopped_cache: Cell::new(None),
        }
    }

    fn invalidate(&mut self) {
        self.stones_cache.set(None);
        self.stopped_cache.set(None);
    }

    /// Apply deceleration, curl and spin decay to one body.
    fn apply_ice(body: &mut RigidBody, dt: f32) {
        let velocity = *body.linvel();
        let speed = velocity.norm();
        let angular_velocity = body.angvel();

        if speed > EPSILON {
            let new_speed = speed + longitudinal_acceleration(speed) * dt;
            if new_speed <= 0.0 {
                body.set_linvel(vector![0.0, 0.0], true);
            } else {
                let yaw = yaw_rate(speed, angular_velocity) * dt;
                let e_long = velocity / speed;
                let e_trans = vector![-e_long.y, e_long.x];
                let new_velocity =
                    e_long * (new_speed * yaw.cos()) + e_trans * (new_speed * yaw.sin());
                body.set_linvel(new_velocity, true);
            }
        }

        if angular_velocity.abs() > EPSILON {
            let decay = angular_acceleration(speed) * dt;
            let new_angular_velocity = if angular_velocity.abs() <= decay.abs() {
                0.0
            } else {
                angular_velocity + decay * angular_velocity.signum()
            };
            body.set_angvel(new_angular_velocity, true);
        }
    }

    fn stone_id_of(&self, collider: ColliderHandle) -> Option<StoneId> {
        let user_data = self.colliders.get(collider)?.user_data;
        StoneId::new(usize::try_from(user_data).ok()?)
    }

    fn position_of(&self, id: StoneId) -> Vector2 {
        self.bodies
            .get(self.handles[id.index()])
            .map(|b| Vector2::new(b.translation().x, b.translation().y))
            .unwrap_or_default()
    }

    fn record_collisions(&mut self) {
        let mut collisions = Vec::new();
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let (Some(a_id), Some(b_id)) =
                (self.stone_id_of(pair.collider1), self.stone_id_of(pair.collider2))
            else {
                continue;
            };

            let mut normal_impulse = 0.0;
            let mut tangent_impulse = 0.0;
            for manifold in &pair.manifolds {
                for point in &manifold.points {
                    normal_impulse += point.data.impulse;
                    tangent_impulse += point.data.tangent_impulse[0];
                }
            }

            collisions.push(StoneCollision {
                a_id,
                b_id,
                a_position: self.position_of(a_id),
                b_position: self.position_of(b_id),
                normal_impulse,
                tangent_impulse,
            });
        }
        self.collisions = collisions;
    }
}

impl Simulator for Simple1Simulator {
    fn set_stones(&mut self, stones: &AllStoneData) {
        for (handle, stone) in self.handles.iter().zip(stones.iter()) {
            let Some(body) = self.bodies.get_mut(*handle) else {
                continue;
            };
            match stone {
                Some(stone) => {
                    body.set_enabled(true);
                    body.set_translation(vector![stone.position.x, stone.position.y], true);
                    body.set_rotation(Rotation::new(stone.angle), true);
                    body.set_linvel(
                        vector![stone.linear_velocity.x, stone.linear_velocity.y],
                        true,
                    );
                    body.set_angvel(stone.angular_velocity, true);
                }
                None => body.set_enabled(false),
            }
        }
        self.invalidate();
    }

    fn step(&mut self) {
        let dt = self.setting.seconds_per_frame;
        for handle in &self.handles {
            if let Some(body) = self.bodies.get_mut(*handle) {
                if body.is_enabled() {
                    Self::apply_ice(body, dt);
                }
            }
        }

        self.collisions.clear();

        self.pipeline.step(
            &vector![0.0, 0.0],
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );

        self.record_collisions();
        self.invalidate();
    }

    fn stones(&self) -> AllStoneData {
        if let Some(stones) = self.stones_cache.get() {
            return stones;
        }

        let mut stones: AllStoneData = [None; STONE_MAX];
        for (slot, handle) in stones.iter_mut().zip(self.handles.iter()) {
            let Some(body) = self.bodies.get(*handle) else {
                continue;
            };
            if !body.is_enabled() {
                continue;
            }
            let t = body.translation();
            let v = body.linvel();
            *slot = Some(StoneData {
                position: Vector2::new(t.x, t.y),
                angle: body.rotation().angle(),
                linear_velocity: Vector2::new(v.x, v.y),
                angular_velocity: body.angvel(),
            });
        }

        self.stones_cache.set(Some(stones));
        stones
    }

    fn collisions(&self) -> &[StoneCollision] {
        &self.collisions
    }

    fn are_all_stones_stopped(&self) -> bool {
        if let Some(stopped) = self.stopped_cache.get() {
            return stopped;
        }

        let stopped = self
            .handles
            .iter()
            .filter_map(|h| self.bodies.get(*h))
            .filter(|b| b.is_enabled())
            .all(|b| b.linvel().norm_squared() <= EPSILON && b.angvel().abs() <= EPSILON);

        self.stopped_cache.set(Some(stopped));
        stopped
    }

    fn stone_radius(&self) -> f32 {
        STONE_RADIUS
    }

    fn seconds_per_frame(&self) -> f32 {
        self.setting.seconds_per_frame
    }

    fn setting(&self) -> &dyn SimulatorSetting {
        &self.setting
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn single(data: StoneData) -> AllStoneData {
        let mut stones: AllStoneData = [None; STONE_MAX];
        stones[0] = Some(data);
        stones
    }

    fn run_until_stopped(sim: &mut Simple1Simulator) -> usize {
        let mut frames = 0;
        while !sim.are_all_stones_stopped() {
            sim.step();
            frames += 1;
            assert!(frames < 100_000, "stone never stopped");
        }
        frames
    }

    #[test]
    fn test_curves() {
        assert!(longitudinal_acceleration(2.0) < 0.0);
        // Slower stones decelerate harder
        assert!(longitudinal_acceleration(0.1) < longitudinal_acceleration(2.0));
        assert_eq!(yaw_rate(2.0, 0.0), 0.0);
        assert!(yaw_rate(2.0, 1.0) > 0.0);
        assert!(yaw_rate(2.0, -1.0) < 0.0);
        assert_eq!(angular_acceleration(0.0), angular_acceleration(0.001));
    }

    #[test]
    fn test_new_simulator_is_empty() {
        let sim = Simple1Simulator::new(Simple1Setting::default());
        assert!(sim.stones().iter().all(Option::is_none));
        assert!(sim.are_all_stones_stopped());
        assert_eq!(sim.stone_radius(), STONE_RADIUS);
        assert_eq!(sim.seconds_per_frame(), 0.001);
    }

    #[test]
    fn test_set_stones_round_trip() {
        let mut sim = Simple1Simulator::new(Simple1Setting::default());
        let rest = StoneData::at_rest(Vector2::new(0.5, 3.0), 0.25);
        let mut stones: AllStoneData = [None; STONE_MAX];
        stones[3] = Some(rest);
        sim.set_stones(&stones);

        let out = sim.stones();
        assert!(out[0].is_none());
        let got = out[3].unwrap();
        assert!((got.position - rest.position).length() < 1e-6);
        assert!((got.angle - 0.25).abs() < 1e-6);
        assert!(sim.are_all_stones_stopped());
    }

    #[test]
    fn test_queries_are_idempotent_between_steps() {
        let mut sim = Simple1Simulator::new(Simple1Setting::default());
        sim.set_stones(&single(StoneData {
            position: Vector2::ZERO,
            angle: 0.0,
            linear_velocity: Vector2::new(0.0, 2.0),
            angular_velocity: FRAC_PI_2,
        }));
        for _ in 0..50 {
            sim.step();
        }
        let first = sim.stones();
        assert_eq!(sim.stones(), first);
        assert_eq!(sim.stones(), first);
        let stopped = sim.are_all_stones_stopped();
        assert_eq!(sim.are_all_stones_stopped(), stopped);
        assert!(!stopped);

        sim.step();
        assert_ne!(sim.stones(), first);
    }

    #[test]
    fn test_single_stone_curls_with_spin() {
        let launch = |angular_velocity: f32| {
            let mut sim = Simple1Simulator::new(Simple1Setting::default());
            sim.set_stones(&single(StoneData {
                position: Vector2::ZERO,
                angle: 0.0,
                linear_velocity: Vector2::new(0.0, 2.0),
                angular_velocity,
            }));
            run_until_stopped(&mut sim);
            sim.stones()[0].unwrap().position
        };

        let ccw = launch(FRAC_PI_2);
        let cw = launch(-FRAC_PI_2);

        // Counter-clockwise spin curls to the left
        assert!(ccw.x < -0.5, "ccw ended at {ccw}");
        assert!(cw.x > 0.5, "cw ended at {cw}");
        assert!((ccw.x + cw.x).abs() < 1e-2);
        assert!(ccw.y > 20.0 && ccw.y < 30.0, "travel {}", ccw.y);
    }

    #[test]
    fn test_head_on_collision_transfers_momentum() {
        let mut sim = Simple1Simulator::new(Simple1Setting::default());
        let mut stones: AllStoneData = [None; STONE_MAX];
        stones[0] = Some(StoneData {
            position: Vector2::ZERO,
            angle: 0.0,
            linear_velocity: Vector2::new(0.0, 1.5),
            angular_velocity: 0.0,
        });
        stones[1] = Some(StoneData::at_rest(Vector2::new(0.0, 1.0), 0.0));
        sim.set_stones(&stones);

        let mut saw_collision = false;
        let mut frames = 0;
        while !sim.are_all_stones_stopped() {
            sim.step();
            for c in sim.collisions() {
                let ids = [c.a_id.index(), c.b_id.index()];
                assert!(ids.contains(&0) && ids.contains(&1));
                saw_collision = true;
            }
            frames += 1;
            assert!(frames < 100_000);
        }

        assert!(saw_collision);
        let out = sim.stones();
        let shooter = out[0].unwrap().position;
        let target = out[1].unwrap().position;
        // Nearly elastic: the struck stone carries on, the shooter stays behind
        assert!(target.y > 1.5, "target at {target}");
        assert!(shooter.y < target.y);
    }

    #[test]
    fn test_removed_stone_is_disabled() {
        let mut sim = Simple1Simulator::new(Simple1Setting::default());
        sim.set_stones(&single(StoneData::at_rest(Vector2::new(0.0, 5.0), 0.0)));
        assert!(sim.stones()[0].is_some());
        sim.set_stones(&[None; STONE_MAX]);
        assert!(sim.stones()[0].is_none());
        sim.step();
        assert!(sim.stones()[0].is_none());
    }
}
