//! Configuration file parsing and structures.
//!
//! lumend is configured from one TOML file: the bound Backend entity, the
//! MQTT link to both protocols, and the initial values of the
//! runtime-settable tunables.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;

use crate::engine::session::ColorOnConfig;
use crate::engine::session::DeviceSession;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    pub device: DeviceConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub color_on: ColorOnConfig,
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub log_level: LogLevel,
}

/// The device this instance is bound to.
#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    /// Backend entity id (e.g., "light.living_room")
    pub entity_id: String,

    /// Path of the scene persistence file
    #[serde(default = "default_scene_store")]
    pub scene_store: PathBuf,
}

fn default_scene_store() -> PathBuf {
    PathBuf::from("lumend-scenes.json")
}

/// MQTT link configuration, covering both protocol sides.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub broker: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Controller commands arrive here
    pub command_topic: String,

    /// Runtime configuration updates arrive here
    pub config_topic: String,

    /// Notifications to the Controller are published here
    pub notify_topic: String,

    /// Backend state events arrive here
    pub state_topic: String,

    /// Backend service calls are published here
    pub call_topic: String,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "lumend".to_string()
}

/// Initial values for the runtime-settable tunables.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub brightness_rate_ms: u32,
    pub color_rate_ms: u32,
    pub color_trace_tolerance: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            brightness_rate_ms: 0,
            color_rate_ms: 0,
            color_trace_tolerance: 1.0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Build the initial device session from the configured values.
    pub fn initial_session(&self) -> DeviceSession {
        let mut session = DeviceSession::new(self.device.entity_id.clone());
        session.color_on = self.color_on.clone();
        session.tunables.default_brightness_rate_ms = self.defaults.brightness_rate_ms;
        session.tunables.default_color_rate_ms = self.defaults.color_rate_ms;
        session
            .tunables
            .set_color_trace_tolerance(self.defaults.color_trace_tolerance);
        session
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
