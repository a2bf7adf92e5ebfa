//! Per-device session state.
//!
//! All the mutable singletons of the engine live in one owned aggregate,
//! injected into the dispatcher and ingest paths rather than accessed as
//! ambient globals. This keeps the engine trivially instantiable per
//! physical device.

use serde::{Deserialize, Serialize};

use super::message::ColorMode;

/// Cached view of the physical device.
///
/// Mutated by state ingest on every Backend observation, and optimistically
/// by the dispatcher when a command is issued.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub is_on: bool,
    /// Brightness percent, 0-100. Invariant: 0 implies `!is_on` after any
    /// completed (non-transitioning) observation.
    pub brightness_pct: u8,
    /// Chromaticity pair, or `(kelvin, 0.0)` in color-temperature mode.
    pub color: Option<(f64, f64)>,
    pub color_mode: ColorMode,
    pub effect: Option<String>,
    pub effect_catalog: Vec<String>,
}

/// The device's supported feature set as last reported by the Backend.
///
/// Replaced wholesale whenever the Backend reports a changed capability
/// list; never partially mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilitySnapshot {
    pub supports_brightness: bool,
    pub supports_full_color: bool,
    pub supports_color_temperature: bool,
    /// Kelvin range for color-temperature commands.
    pub color_temp_range: (u32, u32),
    pub supports_effects: bool,
}

impl Default for CapabilitySnapshot {
    fn default() -> Self {
        Self {
            supports_brightness: false,
            supports_full_color: false,
            supports_color_temperature: false,
            color_temp_range: (DEFAULT_MIN_KELVIN, DEFAULT_MAX_KELVIN),
            supports_effects: false,
        }
    }
}

pub const DEFAULT_MIN_KELVIN: u32 = 2000;
pub const DEFAULT_MAX_KELVIN: u32 = 6500;

/// Whether the Controller UI should offer a color-temperature affordance.
///
/// Any full-color support is treated as sufficient to also claim
/// color-temperature capability. This only gates a UI slider, never command
/// routing, and is deliberately isolated here as a single named policy.
pub fn color_temp_ui_available(caps: &CapabilitySnapshot) -> bool {
    caps.supports_color_temperature || caps.supports_full_color
}

/// How color should originate when a brightness command turns the light on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorOnOrigin {
    #[default]
    None,
    RestorePrevious,
    UsePreset,
}

/// Color-on-mode configuration, set externally and replaced atomically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorOnConfig {
    #[serde(default)]
    pub origin: ColorOnOrigin,
    /// Chromaticity preset used at full brightness.
    #[serde(default)]
    pub on_color: Option<(f64, f64)>,
    /// Chromaticity preset used at minimum brightness.
    #[serde(default)]
    pub dim_color: Option<(f64, f64)>,
    /// Whether the dim-to-warm fade feature is armed.
    #[serde(default)]
    pub fade_armed: bool,
}

impl ColorOnConfig {
    /// Fade is in effect only when armed and both presets are present.
    pub fn fade_enabled(&self) -> bool {
        self.fade_armed && self.on_color.is_some() && self.dim_color.is_some()
    }
}

/// Brightness preset tracking.
///
/// Cleared whenever a brightness command arrives without a preset id; used
/// only to annotate outbound notifications, never to gate behavior.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetTracking {
    pub preset_id: Option<String>,
}

/// Tunables settable at runtime through configuration updates.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunables {
    /// Color trace tolerance reported to the Controller, 0.5-10.0.
    pub color_trace_tolerance: f64,
    /// Default transition used when a brightness command omits a rate.
    pub default_brightness_rate_ms: u32,
    /// Default transition used when a color command omits a rate.
    pub default_color_rate_ms: u32,
}

pub const TRACE_TOLERANCE_MIN: f64 = 0.5;
pub const TRACE_TOLERANCE_MAX: f64 = 10.0;

impl Default for Tunables {
    fn default() -> Self {
        Self {
            color_trace_tolerance: 1.0,
            default_brightness_rate_ms: 0,
            default_color_rate_ms: 0,
        }
    }
}

impl Tunables {
    pub fn set_color_trace_tolerance(&mut self, value: f64) {
        self.color_trace_tolerance = value.clamp(TRACE_TOLERANCE_MIN, TRACE_TOLERANCE_MAX);
    }
}

/// The full per-device session aggregate.
#[derive(Debug, Clone, Default)]
pub struct DeviceSession {
    /// The Backend entity this instance is bound to.
    pub entity_id: String,
    pub state: DeviceState,
    pub caps: CapabilitySnapshot,
    pub color_on: ColorOnConfig,
    pub preset: PresetTracking,
    pub tunables: Tunables,
    /// Connectivity as observed from the Backend. The online notification is
    /// emitted exactly once per disconnect-reconnect cycle.
    pub online: bool,
    /// Last non-zero brightness, used as the turn-on restore level.
    pub last_on_level: u8,
}

impl DeviceSession {
    pub fn new(entity_id: String) -> Self {
        Self {
            entity_id,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_temp_ui_policy() {
        let mut caps = CapabilitySnapshot::default();
        assert!(!color_temp_ui_available(&caps));

        caps.supports_color_temperature = true;
        assert!(color_temp_ui_available(&caps));

        // Full-color support alone is sufficient to claim the affordance.
        caps.supports_color_temperature = false;
        caps.supports_full_color = true;
        assert!(color_temp_ui_available(&caps));
    }

    #[test]
    fn test_fade_enabled_requires_both_presets() {
        let mut cfg = ColorOnConfig {
            fade_armed: true,
            on_color: Some((0.40, 0.38)),
            dim_color: None,
            origin: ColorOnOrigin::UsePreset,
        };
        assert!(!cfg.fade_enabled());

        cfg.dim_color = Some((0.55, 0.41));
        assert!(cfg.fade_enabled());

        cfg.fade_armed = false;
        assert!(!cfg.fade_enabled());
    }

    #[test]
    fn test_trace_tolerance_clamped() {
        let mut t = Tunables::default();
        t.set_color_trace_tolerance(50.0);
        assert_eq!(t.color_trace_tolerance, TRACE_TOLERANCE_MAX);
        t.set_color_trace_tolerance(0.0);
        assert_eq!(t.color_trace_tolerance, TRACE_TOLERANCE_MIN);
        t.set_color_trace_tolerance(2.5);
        assert_eq!(t.color_trace_tolerance, 2.5);
    }
}
