//! Simulator setting registry.
//!
//! Maps a `"type"` discriminator string to the decoder of the concrete
//! setting schema. The table is static data handed to the registry at
//! construction; nothing is registered at runtime.

use serde_json::Value;
use thiserror::Error;

use super::simple1::Simple1Setting;
use super::SimulatorSetting;

/// Decoder for one concrete setting schema.
pub type SettingDecoder = fn(&Value) -> Result<Box<dyn SimulatorSetting>, SettingError>;

/// One discriminator and its decoder.
#[derive(Clone, Copy)]
pub struct RegistryEntry {
    /// Value of the `"type"` field.
    pub type_name: &'static str,
    /// Decoder for that schema.
    pub decode: SettingDecoder,
}

/// Engines shipped with the server.
static BUILTIN: &[RegistryEntry] = &[RegistryEntry {
    type_name: Simple1Setting::TYPE_NAME,
    decode: Simple1Setting::decode,
}];

/// Setting encode/decode errors.
#[derive(Debug, Error)]
pub enum SettingError {
    /// No `"type"` string in the object.
    #[error("simulator setting has no \"type\" field")]
    MissingType,

    /// Discriminator not present in the registry.
    #[error("unknown simulator type: {0}")]
    UnknownType(String),

    /// Setting did not serialize to a JSON object.
    #[error("simulator setting is not a JSON object")]
    NotAnObject,

    /// Schema mismatch.
    #[error("invalid simulator setting: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("simulator setting {field}: {reason}")]
    Invalid {
        /// Offending key
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Discriminator-dispatched setting decoder.
#[derive(Clone, Copy)]
pub struct SimulatorRegistry {
    entries: &'static [RegistryEntry],
}

impl SimulatorRegistry {
    /// Registry over an explicit table.
    pub const fn new(entries: &'static [RegistryEntry]) -> Self {
        Self { entries }
    }

    /// Registry of the engines shipped with the server.
    pub const fn builtin() -> Self {
        Self::new(BUILTIN)
    }

    /// Registered discriminators.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.type_name)
    }

    /// Decode a setting by its `"type"` field.
    pub fn decode(&self, value: &Value) -> Result<Box<dyn SimulatorSetting>, SettingError> {
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(SettingError::MissingType)?;

        let entry = self
            .entries
            .iter()
            .find(|e| e.type_name == type_name)
            .ok_or_else(|| SettingError::UnknownType(type_name.to_string()))?;

        (entry.decode)(value)
    }
}

impl Default for SimulatorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
