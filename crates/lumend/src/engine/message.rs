//! Wire and internal message types for the bridge engine.
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `ControllerCommand`: validated commands from the Controller
//! - `Notification`: changing/changed notifications back to the Controller
//! - `ServiceCall`: structured service invocations sent to the Backend
//! - `StateEvent`: state snapshots/events received from the Backend
//!
//! Controller payloads are loosely typed on the wire; they are validated once
//! here, at the boundary, and never re-parsed inside the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::scene::SceneDefinition;
use super::session::ColorOnConfig;

/// Color representation carried by a command or state observation.
///
/// When the mode is `ColorTemperature`, the `x` coordinate carries the
/// temperature in Kelvin and `y` is unused. Both protocols multiplex the two
/// representations over the same field pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColorMode {
    #[default]
    FullColor,
    ColorTemperature,
}

impl ColorMode {
    /// The Controller wire encodes mode as a bare integer (0 = full color,
    /// 1 = color temperature). Unknown values default to full color.
    fn from_wire(v: Option<&Value>) -> Self {
        match v.and_then(Value::as_u64) {
            Some(1) => ColorMode::ColorTemperature,
            _ => ColorMode::FullColor,
        }
    }
}

/// Direction for scene-relative ramping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampDirection {
    Up,
    Down,
}

/// A validated command from the Controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCommand {
    TurnOn,
    TurnOff,
    SetBrightness {
        target: u8,
        rate_ms: Option<u32>,
        preset_id: Option<String>,
    },
    SetColor {
        x: f64,
        y: f64,
        mode: ColorMode,
        rate_ms: Option<u32>,
    },
    Synchronize,
    PushScene {
        id: String,
        scene: SceneDefinition,
    },
    ActivateScene {
        id: String,
    },
    DeleteScene {
        id: String,
    },
    RampScene {
        id: String,
        rate_ms: Option<u32>,
        direction: RampDirection,
    },
    StopRamp,
    SelectEffect {
        name: String,
    },
}

impl ControllerCommand {
    /// Decode a Controller wire payload: `{"cmd": "...", ...params}`.
    ///
    /// Missing or non-numeric parameters substitute documented defaults and
    /// never fail the decode; only an absent or unknown `cmd` yields `None`.
    pub fn from_wire(payload: &Value) -> Option<Self> {
        let cmd = payload.get("cmd").and_then(Value::as_str)?;

        let command = match cmd {
            "turn_on" => ControllerCommand::TurnOn,
            "turn_off" => ControllerCommand::TurnOff,
            // `set_level` is the legacy alias for level-setting.
            "set_brightness" | "set_level" => ControllerCommand::SetBrightness {
                target: pct_param(payload, "level"),
                rate_ms: rate_param(payload, "rate_ms"),
                preset_id: str_param(payload, "preset_id"),
            },
            "set_color" => ControllerCommand::SetColor {
                x: num_param(payload, "x").unwrap_or(0.0),
                y: num_param(payload, "y").unwrap_or(0.0),
                mode: ColorMode::from_wire(payload.get("mode")),
                rate_ms: rate_param(payload, "rate_ms"),
            },
            "sync" | "synchronize" => ControllerCommand::Synchronize,
            "push_scene" => ControllerCommand::PushScene {
                id: str_param(payload, "id")?,
                scene: SceneDefinition::from_elements(
                    payload.get("elements").unwrap_or(&Value::Null),
                ),
            },
            "activate_scene" => ControllerCommand::ActivateScene {
                id: str_param(payload, "id")?,
            },
            "delete_scene" => ControllerCommand::DeleteScene {
                id: str_param(payload, "id")?,
            },
            "ramp_scene_up" => ControllerCommand::RampScene {
                id: str_param(payload, "id")?,
                rate_ms: rate_param(payload, "rate_ms"),
                direction: RampDirection::Up,
            },
            "ramp_scene_down" => ControllerCommand::RampScene {
                id: str_param(payload, "id")?,
                rate_ms: rate_param(payload, "rate_ms"),
                direction: RampDirection::Down,
            },
            // `stop` is the legacy alias; the scene id, when present, is
            // irrelevant to stopping the single active ramp.
            "stop_scene_ramp" | "stop" => ControllerCommand::StopRamp,
            "select_effect" => ControllerCommand::SelectEffect {
                name: str_param(payload, "name")?,
            },
            _ => return None,
        };

        Some(command)
    }
}

fn num_param(payload: &Value, key: &str) -> Option<f64> {
    payload.get(key).and_then(Value::as_f64)
}

fn str_param(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Brightness level parameter: clamped to 0-100, defaulting to 0.
fn pct_param(payload: &Value, key: &str) -> u8 {
    num_param(payload, key).unwrap_or(0.0).clamp(0.0, 100.0) as u8
}

/// Transition rate parameter: `None` means "use the configured default".
fn rate_param(payload: &Value, key: &str) -> Option<u32> {
    num_param(payload, key).map(|v| v.max(0.0) as u32)
}

/// Notifications sent to the Controller.
///
/// Duplicate `*Changed` notifications are tolerated by the Controller
/// protocol; exactly-once delivery is not a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    BrightnessChanging {
        current: u8,
        target: u8,
        rate_ms: u32,
    },
    BrightnessChanged {
        current: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        preset_id: Option<String>,
    },
    ColorChanging {
        target_x: f64,
        target_y: f64,
        mode: ColorMode,
        rate_ms: u32,
    },
    ColorChanged {
        current_x: f64,
        current_y: f64,
        mode: ColorMode,
    },
    CapabilitiesChanged {
        dimmable: bool,
        supports_color: bool,
        supports_color_temperature: bool,
        temp_range_min: u32,
        temp_range_max: u32,
        has_effects: bool,
        color_trace_tolerance: f64,
    },
    OnlineChanged {
        state: bool,
    },
    EffectCatalogChanged {
        effects: Vec<String>,
    },
    EffectChanged {
        effect: String,
    },
}

/// Service kinds accepted by the Backend's light domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Service {
    TurnOn,
    TurnOff,
}

/// Target of a Backend service call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub entity_id: String,
}

/// Optional data attached to a Backend service call.
///
/// Brightness is always carried on the wire in the Backend's 0-255 range;
/// transitions are carried in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temp_kelvin: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy_color: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

/// A structured service invocation sent to the Backend.
///
/// Fire-and-forget: no response is awaited or required for correctness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: Service,
    pub target: ServiceTarget,
    pub service_data: ServiceData,
}

impl ServiceCall {
    pub fn turn_on(entity_id: &str, data: ServiceData) -> Self {
        Self {
            domain: "light".to_string(),
            service: Service::TurnOn,
            target: ServiceTarget {
                entity_id: entity_id.to_string(),
            },
            service_data: data,
        }
    }

    pub fn turn_off(entity_id: &str, transition: Option<f64>) -> Self {
        Self {
            domain: "light".to_string(),
            service: Service::TurnOff,
            target: ServiceTarget {
                entity_id: entity_id.to_string(),
            },
            service_data: ServiceData {
                transition,
                ..ServiceData::default()
            },
        }
    }
}

/// A state snapshot or event pushed by the Backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateEvent {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: StateAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateAttributes {
    #[serde(default)]
    pub brightness: Option<u8>,
    #[serde(default)]
    pub xy_color: Option<[f64; 2]>,
    #[serde(default)]
    pub color_temp_kelvin: Option<u32>,
    #[serde(default)]
    pub color_mode: Option<String>,
    #[serde(default)]
    pub supported_color_modes: Option<Vec<String>>,
    #[serde(default)]
    pub min_color_temp_kelvin: Option<u32>,
    #[serde(default)]
    pub max_color_temp_kelvin: Option<u32>,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub effect_list: Option<Vec<String>>,
}

/// Configuration updates applied while the daemon is running.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigUpdate {
    ColorTraceTolerance { value: f64 },
    DefaultRates { brightness_ms: u32, color_ms: u32 },
    ColorOnMode(ColorOnConfig),
}

/// Rescale a Controller brightness percent (0-100) to the Backend wire
/// range (0-255), rounding to nearest.
pub fn pct_to_wire(pct: u8) -> u8 {
    ((u32::from(pct.min(100)) * 255 + 50) / 100) as u8
}

/// Rescale a Backend wire brightness (0-255) to percent (0-100), rounding
/// to nearest.
pub fn wire_to_pct(wire: u8) -> u8 {
    ((u32::from(wire) * 100 + 127) / 255) as u8
}
