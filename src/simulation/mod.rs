//! Simulator Contract
//!
//! The rule engine only sees stones through [`Simulator`]. Concrete
//! engines are created from a [`SimulatorSetting`], which is a plain
//! serializable value carrying a `"type"` discriminator so it can be
//! shipped to clients and decoded back through a [`SimulatorRegistry`].
//!
//! ## Module Structure
//!
//! - `registry`: discriminator -> decoder table
//! - `simple1`: reference engine backed by a rigid-body contact solver

pub mod registry;
pub mod simple1;

use std::any::Any;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::core::stone::{AllStoneData, StoneCollision};

pub use registry::{RegistryEntry, SettingError, SimulatorRegistry};
pub use simple1::{Simple1Setting, Simple1Simulator};

/// Fixed-step physics engine owning the 16 stone bodies of one match.
///
/// Implementations must be deterministic for a given sequence of calls.
pub trait Simulator: Send {
    /// Install a stone configuration. Absent stones are taken out of the world.
    fn set_stones(&mut self, stones: &AllStoneData);

    /// Advance exactly one frame of [`Simulator::seconds_per_frame`] seconds.
    fn step(&mut self);

    /// Current state of every stone, copied out.
    fn stones(&self) -> AllStoneData;

    /// Contacts resolved during the most recent [`Simulator::step`].
    fn collisions(&self) -> &[StoneCollision];

    /// True when no stone in play is translating or spinning.
    fn are_all_stones_stopped(&self) -> bool;

    /// Stone radius (m).
    fn stone_radius(&self) -> f32;

    /// Duration of one frame (s).
    fn seconds_per_frame(&self) -> f32;

    /// The setting this engine was created from.
    fn setting(&self) -> &dyn SimulatorSetting;
}

/// Immutable configuration of a simulator type.
pub trait SimulatorSetting: fmt::Debug + Send + Sync {
    /// Discriminator written to the `"type"` field.
    fn type_name(&self) -> &'static str;

    /// Build a fresh engine with every stone out of play.
    fn create_simulator(&self) -> Box<dyn Simulator>;

    /// JSON form including the `"type"` field.
    fn to_json(&self) -> Result<Value, SettingError>;

    /// Clone behind a box.
    fn clone_box(&self) -> Box<dyn SimulatorSetting>;

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn SimulatorSetting> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Serialize `setting` and stamp it with its discriminator.
pub fn tagged_json<T: Serialize>(type_name: &str, setting: &T) -> Result<Value, SettingError> {
    let mut value = serde_json::to_value(setting)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert("type".to_string(), Value::String(type_name.to_string()));
            Ok(value)
        }
        None => Err(SettingError::NotAnObject),
    }
}
