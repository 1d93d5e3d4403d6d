//! Server Configuration
//!
//! One JSON file per match:
//!
//! ```json
//! {
//!     "port": [10000, 10001],
//!     "time_limit": 2280,
//!     "extra_time_limit": 270,
//!     "game_setting": { "end": 10 },
//!     "simulator_setting": { "type": "simple1", "seconds_per_frame": 0.001 }
//! }
//! ```
//!
//! Time limits are in seconds. Everything except `port` is optional.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::game::state::{MatchSetting, END_MAX};
use crate::simulation::{SettingError, SimulatorRegistry, SimulatorSetting, Simple1Setting};

/// Thinking time for the regular ends (38 min).
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(2280);

/// Thinking time per extra end (4 min 30 s).
pub const DEFAULT_EXTRA_TIME_LIMIT: Duration = Duration::from_secs(270);

/// Configuration errors. All of them are reported before any socket is bound.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not a valid configuration document.
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Simulator setting could not be decoded.
    #[error("simulator_setting: {0}")]
    Setting(#[from] SettingError),

    /// A value is out of range.
    #[error("{field}: {reason}")]
    Invalid {
        /// Offending key
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_time_limit() -> Duration {
    DEFAULT_TIME_LIMIT
}

fn default_extra_time_limit() -> Duration {
    DEFAULT_EXTRA_TIME_LIMIT
}

/// Durations as fractional seconds.
mod seconds {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listening ports for client 0 and client 1
    pub port: [u16; 2],

    /// Listening address
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Thinking time for the regular ends
    #[serde(default = "default_time_limit", with = "seconds")]
    pub time_limit: Duration,

    /// Thinking time per extra end
    #[serde(default = "default_extra_time_limit", with = "seconds")]
    pub extra_time_limit: Duration,

    /// Match identifier, generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,

    /// Shot noise seed, entropy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Match rules
    #[serde(default)]
    pub game_setting: MatchSetting,

    /// `"type"`-tagged simulator setting, `simple1` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulator_setting: Option<Value>,
}

impl ServerConfig {
    /// Configuration with defaults for everything but the ports.
    pub fn new(port: [u16; 2]) -> Self {
        Self {
            port,
            host: default_host(),
            time_limit: DEFAULT_TIME_LIMIT,
            extra_time_limit: DEFAULT_EXTRA_TIME_LIMIT,
            game_id: None,
            seed: None,
            game_setting: MatchSetting::default(),
            simulator_setting: None,
        }
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parse and validate a configuration document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value and decode the simulator setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.game_setting;

        if g.end == 0 || g.end as usize > END_MAX {
            return Err(invalid("game_setting.end", format!("{} is not in 1..={}", g.end, END_MAX)));
        }
        if !(g.sheet_width.is_finite() && g.sheet_width > 0.0) {
            return Err(invalid("game_setting.sheet_width", format!("{} is not positive", g.sheet_width)));
        }
        if !(g.max_shot_speed.is_finite() && g.max_shot_speed > 0.0) {
            return Err(invalid("game_setting.max_shot_speed", format!("{} is not positive", g.max_shot_speed)));
        }
        for (field, value) in [
            ("game_setting.stddev_shot_speed", g.stddev_shot_speed),
            ("game_setting.stddev_shot_angle", g.stddev_shot_angle),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(field, format!("{} is not a standard deviation", value)));
            }
        }

        if self.port[0] == self.port[1] && self.port[0] != 0 {
            return Err(invalid("port", format!("both clients on port {}", self.port[0])));
        }

        self.simulator(&SimulatorRegistry::builtin())?;
        Ok(())
    }

    /// Decode the simulator setting through `registry`.
    pub fn simulator(&self, registry: &SimulatorRegistry) -> Result<Box<dyn SimulatorSetting>, ConfigError> {
        match &self.simulator_setting {
            Some(value) => Ok(registry.decode(value)?),
            None => Ok(Box::new(Simple1Setting::default())),
        }
    }

    /// Listening address of one client slot.
    pub fn listen_addr(&self, client: usize) -> SocketAddr {
        SocketAddr::new(self.host, self.port[client])
    }

    /// Configured match id, or a fresh one.
    pub fn game_id_or_generate(&self) -> String {
        self.game_id.clone().unwrap_or_else(generate_game_id)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

/// `YYYYmmdd_HHMMSS_xxxxxxxx` in local time.
pub fn generate_game_id() -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", stamp, &suffix[..8])
}
