//! Controller command dispatch.
//!
//! Each public operation composes the color negotiator, the ramp channels,
//! and the scene store into at most one Backend service call plus the
//! notifications the Controller protocol expects. No command ever returns an
//! error: malformed values degrade to documented defaults and unknown scene
//! ids are logged no-ops, because a crash here drops a physical light from
//! the system until manual recovery.

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::color;
use super::color::ColorRepresentation;
use super::engine::LightEngine;
use super::message::ColorMode;
use super::message::ControllerCommand;
use super::message::Notification;
use super::message::RampDirection;
use super::message::ServiceCall;
use super::message::ServiceData;
use super::message::pct_to_wire;
use super::scene::SceneDefinition;
use super::scheduler::Scheduler;
use super::session::ColorOnOrigin;
use super::session::color_temp_ui_available;

/// Transition field for the Backend wire: seconds, omitted when zero.
fn transition(rate_ms: u32) -> Option<f64> {
    (rate_ms > 0).then(|| f64::from(rate_ms) / 1000.0)
}

fn apply_representation(data: &mut ServiceData, rep: ColorRepresentation) {
    match rep {
        ColorRepresentation::Temperature(kelvin) => data.color_temp_kelvin = Some(kelvin),
        ColorRepresentation::Chromaticity(x, y) => data.xy_color = Some([x, y]),
    }
}

impl<S: Scheduler> LightEngine<S> {
    pub fn handle_command(&mut self, command: ControllerCommand) {
        debug!("controller command: {:?}", command);
        match command {
            ControllerCommand::TurnOn => self.turn_on(),
            ControllerCommand::TurnOff => self.turn_off(),
            ControllerCommand::SetBrightness {
                target,
                rate_ms,
                preset_id,
            } => {
                let rate = rate_ms.unwrap_or(self.session.tunables.default_brightness_rate_ms);
                self.set_brightness(target, rate, preset_id);
            }
            ControllerCommand::SetColor { x, y, mode, rate_ms } => {
                let rate = rate_ms.unwrap_or(self.session.tunables.default_color_rate_ms);
                self.set_color(x, y, mode, rate);
            }
            ControllerCommand::Synchronize => self.synchronize(),
            ControllerCommand::PushScene { id, scene } => self.push_scene(&id, &scene),
            ControllerCommand::ActivateScene { id } => self.activate_scene(&id),
            ControllerCommand::DeleteScene { id } => self.delete_scene(&id),
            ControllerCommand::RampScene {
                id,
                rate_ms,
                direction,
            } => {
                let rate = rate_ms.unwrap_or(self.session.tunables.default_brightness_rate_ms);
                self.ramp_to_scene_level(&id, rate, direction);
            }
            ControllerCommand::StopRamp => self.stop_ramp(),
            ControllerCommand::SelectEffect { name } => self.select_effect(&name),
        }
    }

    /// Turn on to the last non-zero level (full brightness if none is
    /// known), at the default brightness rate.
    fn turn_on(&mut self) {
        let level = match self.session.last_on_level {
            0 => 100,
            level => level,
        };
        let rate = self.session.tunables.default_brightness_rate_ms;
        self.set_brightness(level, rate, None);
    }

    fn turn_off(&mut self) {
        let rate = self.session.tunables.default_brightness_rate_ms;
        self.set_brightness(0, rate, None);
    }

    pub(super) fn set_brightness(&mut self, target: u8, rate_ms: u32, preset_id: Option<String>) {
        let target = target.min(100);
        let current = self.session.state.brightness_pct;

        // Preset tracking annotates notifications only; a command without a
        // preset id clears it.
        self.session.preset.preset_id = preset_id;

        self.notify(Notification::BrightnessChanging {
            current,
            target,
            rate_ms,
        });
        self.brightness_ramp.arm(
            &mut self.scheduler,
            f64::from(current),
            f64::from(target),
            rate_ms,
        );

        // Target 0 maps to power-off, preserving only the transition.
        let call = if target == 0 {
            ServiceCall::turn_off(&self.session.entity_id, transition(rate_ms))
        } else {
            let mut data = ServiceData {
                brightness: Some(pct_to_wire(target)),
                transition: transition(rate_ms),
                ..ServiceData::default()
            };
            if let Some(rep) = self.brightness_color(target) {
                apply_representation(&mut data, rep);
                if let ColorRepresentation::Chromaticity(x, y) = rep {
                    self.session.state.color = Some((x, y));
                    self.session.state.color_mode = ColorMode::FullColor;
                }
            }
            ServiceCall::turn_on(&self.session.entity_id, data)
        };

        // Optimistic update so back-to-back commands see the new target.
        self.session.state.brightness_pct = target;
        self.session.state.is_on = target > 0;
        if target > 0 {
            self.session.last_on_level = target;
        }

        self.send_call(call);

        // A zero rate leaves the channel idle, so the settle point is now.
        // The Backend echo will match the cache and stay silent.
        if rate_ms == 0 {
            self.notify(Notification::BrightnessChanged {
                current: target,
                preset_id: self.session.preset.preset_id.clone(),
            });
        }
    }

    /// Color to attach to a brightness command: the dim-to-warm blend when
    /// fade is enabled, or the restore/preset color on an off-to-on
    /// transition when it is not.
    fn brightness_color(&self, target: u8) -> Option<ColorRepresentation> {
        let session = &self.session;
        if session.color_on.fade_enabled() {
            // fade_enabled() guarantees both presets.
            let dim = session.color_on.dim_color?;
            let on = session.color_on.on_color?;
            let (x, y) = color::interpolate(dim, on, target);
            return color::choose_representation(x, y, ColorMode::FullColor, &session.caps);
        }
        if session.state.is_on {
            return None;
        }
        match session.color_on.origin {
            ColorOnOrigin::None => None,
            ColorOnOrigin::RestorePrevious => {
                let (x, y) = session.state.color?;
                color::choose_representation(x, y, session.state.color_mode, &session.caps)
            }
            ColorOnOrigin::UsePreset => {
                let (x, y) = session.color_on.on_color?;
                color::choose_representation(x, y, ColorMode::FullColor, &session.caps)
            }
        }
    }

    pub(super) fn set_color(&mut self, x: f64, y: f64, mode: ColorMode, rate_ms: u32) {
        // Preset echoes from the Backend-facing proxy would overwrite the
        // interpolated fade color with a stale fixed value.
        if mode == ColorMode::FullColor
            && self.session.color_on.fade_enabled()
            && color::should_suppress_echo(
                (x, y),
                self.session.color_on.on_color,
                self.session.color_on.dim_color,
                color::ECHO_TOLERANCE,
            )
        {
            debug!("suppressing preset echo ({x}, {y})");
            return;
        }

        let Some(rep) = color::choose_representation(x, y, mode, &self.session.caps) else {
            warn!("device has no color support, ignoring color command");
            return;
        };

        self.notify(Notification::ColorChanging {
            target_x: x,
            target_y: y,
            mode,
            rate_ms,
        });
        self.color_ramp.arm(&mut self.scheduler, 0.0, 0.0, rate_ms);

        let mut data = ServiceData {
            transition: transition(rate_ms),
            ..ServiceData::default()
        };
        apply_representation(&mut data, rep);

        self.session.state.color = Some((x, y));
        self.session.state.color_mode = mode;

        self.send_call(ServiceCall::turn_on(&self.session.entity_id, data));

        if rate_ms == 0 {
            self.notify(Notification::ColorChanged {
                current_x: x,
                current_y: y,
                mode,
            });
        }
    }

    /// Apply a stored scene. When both brightness and color are enabled the
    /// Backend receives one combined call; two sequential calls would
    /// produce a visible color flash while fade mode recomputes its blend.
    fn activate_scene(&mut self, id: &str) {
        let Some(scene) = self.scenes.load(id) else {
            warn!("activate for unknown scene {}", id);
            return;
        };
        info!("activating scene {}", id);

        match (scene.brightness_enabled, scene.color_enabled) {
            (true, true) => self.activate_combined(&scene),
            (true, false) => self.set_brightness(scene.brightness_level, scene.brightness_rate_ms, None),
            (false, true) => self.set_color(
                scene.color_x,
                scene.color_y,
                scene.color_mode,
                scene.color_rate_ms,
            ),
            (false, false) => debug!("scene {} has no enabled elements", id),
        }
    }

    fn activate_combined(&mut self, scene: &SceneDefinition) {
        let current = self.session.state.brightness_pct;
        self.session.preset = Default::default();

        // Level 0 with color enabled is still a power-off; only the
        // transition survives.
        if scene.brightness_level == 0 {
            self.notify(Notification::BrightnessChanging {
                current,
                target: 0,
                rate_ms: scene.brightness_rate_ms,
            });
            self.brightness_ramp.arm(
                &mut self.scheduler,
                f64::from(current),
                0.0,
                scene.brightness_rate_ms,
            );
            self.session.state.brightness_pct = 0;
            self.session.state.is_on = false;
            self.send_call(ServiceCall::turn_off(
                &self.session.entity_id,
                transition(scene.brightness_rate_ms),
            ));
            if scene.brightness_rate_ms == 0 {
                self.notify(Notification::BrightnessChanged {
                    current: 0,
                    preset_id: None,
                });
            }
            return;
        }

        // Both channels settle against the longer of the two rates.
        let rate_ms = scene.brightness_rate_ms.max(scene.color_rate_ms);
        let target = scene.brightness_level.min(100);

        self.notify(Notification::BrightnessChanging {
            current,
            target,
            rate_ms,
        });
        self.notify(Notification::ColorChanging {
            target_x: scene.color_x,
            target_y: scene.color_y,
            mode: scene.color_mode,
            rate_ms,
        });
        self.brightness_ramp.arm(
            &mut self.scheduler,
            f64::from(current),
            f64::from(target),
            rate_ms,
        );
        self.color_ramp.arm(&mut self.scheduler, 0.0, 0.0, rate_ms);

        let mut data = ServiceData {
            brightness: Some(pct_to_wire(target)),
            transition: transition(rate_ms),
            ..ServiceData::default()
        };
        if let Some(rep) = color::choose_representation(
            scene.color_x,
            scene.color_y,
            scene.color_mode,
            &self.session.caps,
        ) {
            apply_representation(&mut data, rep);
            self.session.state.color = Some((scene.color_x, scene.color_y));
            self.session.state.color_mode = scene.color_mode;
        }

        self.session.state.brightness_pct = target;
        self.session.state.is_on = true;
        self.session.last_on_level = target;

        self.send_call(ServiceCall::turn_on(&self.session.entity_id, data));

        if rate_ms == 0 {
            self.notify(Notification::BrightnessChanged {
                current: target,
                preset_id: None,
            });
            self.notify(Notification::ColorChanged {
                current_x: scene.color_x,
                current_y: scene.color_y,
                mode: scene.color_mode,
            });
        }
    }

    /// Substitute for continuous ramping, which the Backend protocol does
    /// not offer: a timed transition toward the scene's stored level (up)
    /// or zero (down).
    fn ramp_to_scene_level(&mut self, id: &str, rate_ms: u32, direction: RampDirection) {
        let Some(scene) = self.scenes.load(id) else {
            warn!("ramp for unknown scene {}", id);
            return;
        };
        let target = match direction {
            RampDirection::Up => scene.brightness_level,
            RampDirection::Down => 0,
        };
        self.set_brightness(target, rate_ms, None);
    }

    /// Freeze the active brightness ramp at its interpolated level.
    /// Idempotent: with no ramp active, nothing is touched and no call is
    /// issued.
    fn stop_ramp(&mut self) {
        let now = self.scheduler.now();
        let Some(level) = self.brightness_ramp.interpolated_value(now) else {
            debug!("stop with no active ramp");
            return;
        };
        self.brightness_ramp.cancel(&mut self.scheduler);
        self.set_brightness(level.round() as u8, 0, None);
    }

    /// Re-emit the full cached state for a Controller that resynchronizes.
    fn synchronize(&mut self) {
        self.notify(Notification::OnlineChanged {
            state: self.session.online,
        });
        self.notify(Notification::BrightnessChanged {
            current: self.session.state.brightness_pct,
            preset_id: self.session.preset.preset_id.clone(),
        });
        if let Some((x, y)) = self.session.state.color {
            self.notify(Notification::ColorChanged {
                current_x: x,
                current_y: y,
                mode: self.session.state.color_mode,
            });
        }
        self.notify(self.capabilities_notification());
        if !self.session.state.effect_catalog.is_empty() {
            self.notify(Notification::EffectCatalogChanged {
                effects: self.session.state.effect_catalog.clone(),
            });
        }
        if let Some(effect) = self.session.state.effect.clone() {
            self.notify(Notification::EffectChanged { effect });
        }
    }

    fn push_scene(&mut self, id: &str, scene: &SceneDefinition) {
        info!("storing scene {}", id);
        self.scenes.save(id, scene);
    }

    fn delete_scene(&mut self, id: &str) {
        info!("removing scene {}", id);
        self.scenes.remove(id);
    }

    fn select_effect(&mut self, name: &str) {
        if !self.session.caps.supports_effects {
            warn!("device reports no effects, ignoring {}", name);
            return;
        }
        let catalog = &self.session.state.effect_catalog;
        if !catalog.is_empty() && !catalog.iter().any(|e| e == name) {
            warn!("effect {} not in catalog, ignoring", name);
            return;
        }

        self.session.state.effect = Some(name.to_string());
        self.send_call(ServiceCall::turn_on(
            &self.session.entity_id,
            ServiceData {
                effect: Some(name.to_string()),
                ..ServiceData::default()
            },
        ));
    }

    pub(super) fn capabilities_notification(&self) -> Notification {
        let caps = &self.session.caps;
        Notification::CapabilitiesChanged {
            dimmable: caps.supports_brightness,
            supports_color: caps.supports_full_color,
            supports_color_temperature: color_temp_ui_available(caps),
            temp_range_min: caps.color_temp_range.0,
            temp_range_max: caps.color_temp_range.1,
            has_effects: caps.supports_effects,
            color_trace_tolerance: self.session.tunables.color_trace_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scheduler::ManualScheduler;
    use crate::engine::session::CapabilitySnapshot;
    use crate::engine::session::ColorOnConfig;
    use crate::engine::session::DeviceSession;
    use crate::engine::testutil::drain;
    use crate::engine::testutil::test_engine;
    use crate::persist::MemoryPersistence;
    use crate::engine::scene::SceneStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_set_brightness_issues_one_scaled_call() {
        let (mut engine, mut notify_rx, mut call_rx) = test_engine();

        engine.set_brightness(60, 2000, None);

        let calls = drain(&mut call_rx);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].service_data.brightness, Some(153));
        assert_eq!(calls[0].service_data.transition, Some(2.0));

        let notes = drain(&mut notify_rx);
        assert_eq!(
            notes,
            vec![Notification::BrightnessChanging {
                current: 0,
                target: 60,
                rate_ms: 2000,
            }]
        );
        assert!(engine.session().state.is_on);
        assert_eq!(engine.session().state.brightness_pct, 60);
    }

    #[test]
    fn test_zero_target_is_power_off() {
        let (mut engine, _notify_rx, mut call_rx) = test_engine();

        engine.set_brightness(0, 3000, None);

        let calls = drain(&mut call_rx);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].service, crate::engine::message::Service::TurnOff);
        assert_eq!(calls[0].service_data.brightness, None);
        assert_eq!(calls[0].service_data.transition, Some(3.0));
        assert!(!engine.session().state.is_on);
    }

    #[test]
    fn test_fade_attaches_interpolated_color() {
        let (mut engine, _notify_rx, mut call_rx) = test_engine();
        engine.session.color_on = ColorOnConfig {
            origin: crate::engine::session::ColorOnOrigin::UsePreset,
            on_color: Some((0.40, 0.38)),
            dim_color: Some((0.55, 0.41)),
            fade_armed: true,
        };

        engine.set_brightness(50, 0, None);

        let calls = drain(&mut call_rx);
        let xy = calls[0].service_data.xy_color.unwrap();
        assert!((xy[0] - 0.475).abs() < 1e-9);
        assert!((xy[1] - 0.395).abs() < 1e-9);
    }

    #[test]
    fn test_preset_color_on_off_to_on() {
        let (mut engine, _notify_rx, mut call_rx) = test_engine();
        engine.session.color_on = ColorOnConfig {
            origin: crate::engine::session::ColorOnOrigin::UsePreset,
            on_color: Some((0.40, 0.38)),
            dim_color: None,
            fade_armed: false,
        };

        engine.set_brightness(80, 0, None);
        let calls = drain(&mut call_rx);
        assert_eq!(calls[0].service_data.xy_color, Some([0.40, 0.38]));

        // Already on: no color rider on subsequent commands.
        engine.set_brightness(60, 0, None);
        let calls = drain(&mut call_rx);
        assert_eq!(calls[0].service_data.xy_color, None);
    }

    #[test]
    fn test_echo_suppression_is_a_no_op() {
        let (mut engine, mut notify_rx, mut call_rx) = test_engine();
        engine.session.color_on = ColorOnConfig {
            origin: crate::engine::session::ColorOnOrigin::UsePreset,
            on_color: Some((0.40, 0.38)),
            dim_color: Some((0.55, 0.41)),
            fade_armed: true,
        };

        engine.set_color(0.401, 0.381, ColorMode::FullColor, 0);
        assert!(drain(&mut call_rx).is_empty());
        assert!(drain(&mut notify_rx).is_empty());

        engine.set_color(0.30, 0.30, ColorMode::FullColor, 0);
        assert_eq!(drain(&mut call_rx).len(), 1);
    }

    #[test]
    fn test_full_color_fallback_to_temperature() {
        let (mut engine, _notify_rx, mut call_rx) = test_engine();
        engine.session.caps = CapabilitySnapshot {
            supports_brightness: true,
            supports_full_color: false,
            supports_color_temperature: true,
            color_temp_range: (2000, 6500),
            supports_effects: false,
        };

        engine.set_color(0.4366, 0.4041, ColorMode::FullColor, 0);

        let calls = drain(&mut call_rx);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].service_data.xy_color.is_none());
        let kelvin = calls[0].service_data.color_temp_kelvin.unwrap();
        assert!((2800..=3200).contains(&kelvin));
    }

    #[test]
    fn test_scene_combines_into_one_call() {
        let (mut engine, _notify_rx, mut call_rx) = test_engine();
        engine.scenes.save(
            "evening",
            &SceneDefinition {
                brightness_enabled: true,
                brightness_level: 60,
                brightness_rate_ms: 2000,
                color_enabled: true,
                color_x: 0.4,
                color_y: 0.38,
                color_mode: ColorMode::FullColor,
                color_rate_ms: 1000,
            },
        );

        engine.handle_command(ControllerCommand::ActivateScene {
            id: "evening".to_string(),
        });

        let calls = drain(&mut call_rx);
        assert_eq!(calls.len(), 1, "combined scene must issue exactly one call");
        assert_eq!(calls[0].service_data.brightness, Some(pct_to_wire(60)));
        assert_eq!(calls[0].service_data.xy_color, Some([0.4, 0.38]));
        // Transition follows the longer of the two rates.
        assert_eq!(calls[0].service_data.transition, Some(2.0));
    }

    #[test]
    fn test_scene_level_zero_with_color_powers_off() {
        let (mut engine, _notify_rx, mut call_rx) = test_engine();
        engine.scenes.save(
            "night",
            &SceneDefinition {
                brightness_enabled: true,
                brightness_level: 0,
                brightness_rate_ms: 5000,
                color_enabled: true,
                color_x: 0.5,
                color_y: 0.4,
                color_mode: ColorMode::FullColor,
                color_rate_ms: 1000,
            },
        );

        engine.handle_command(ControllerCommand::ActivateScene {
            id: "night".to_string(),
        });

        let calls = drain(&mut call_rx);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].service, crate::engine::message::Service::TurnOff);
        assert_eq!(calls[0].service_data.transition, Some(5.0));
        assert!(calls[0].service_data.xy_color.is_none());
    }

    #[test]
    fn test_zero_rate_brightness_settles_immediately() {
        let (mut engine, mut notify_rx, _call_rx) = test_engine();

        engine.set_brightness(60, 0, None);

        let notes = drain(&mut notify_rx);
        assert!(notes.contains(&Notification::BrightnessChanging {
            current: 0,
            target: 60,
            rate_ms: 0,
        }));
        assert!(notes.contains(&Notification::BrightnessChanged {
            current: 60,
            preset_id: None,
        }));

        // The Backend echo matches the cache and adds no duplicate.
        engine.handle_state_event(
            serde_json::from_value(serde_json::json!({
                "entity_id": "light.test",
                "state": "on",
                "attributes": {"brightness": 153},
            }))
            .unwrap(),
        );
        let notes = drain(&mut notify_rx);
        assert!(!notes
            .iter()
            .any(|n| matches!(n, Notification::BrightnessChanged { .. })));
    }

    #[test]
    fn test_zero_rate_color_settles_immediately() {
        let (mut engine, mut notify_rx, _call_rx) = test_engine();

        engine.set_color(0.4, 0.38, ColorMode::FullColor, 0);

        let notes = drain(&mut notify_rx);
        assert!(notes.contains(&Notification::ColorChanged {
            current_x: 0.4,
            current_y: 0.38,
            mode: ColorMode::FullColor,
        }));
    }

    #[test]
    fn test_zero_rate_scene_settles_both_channels() {
        let (mut engine, mut notify_rx, _call_rx) = test_engine();
        engine.scenes.save(
            "instant",
            &SceneDefinition {
                brightness_enabled: true,
                brightness_level: 60,
                color_enabled: true,
                color_x: 0.4,
                color_y: 0.38,
                ..SceneDefinition::default()
            },
        );

        engine.handle_command(ControllerCommand::ActivateScene {
            id: "instant".to_string(),
        });

        let notes = drain(&mut notify_rx);
        assert!(notes.contains(&Notification::BrightnessChanged {
            current: 60,
            preset_id: None,
        }));
        assert!(notes.contains(&Notification::ColorChanged {
            current_x: 0.4,
            current_y: 0.38,
            mode: ColorMode::FullColor,
        }));
    }

    #[test]
    fn test_delete_scene_forgets_it() {
        let (mut engine, mut notify_rx, mut call_rx) = test_engine();
        engine.scenes.save(
            "evening",
            &SceneDefinition {
                brightness_enabled: true,
                brightness_level: 60,
                ..SceneDefinition::default()
            },
        );

        engine.handle_command(ControllerCommand::DeleteScene {
            id: "evening".to_string(),
        });
        engine.handle_command(ControllerCommand::ActivateScene {
            id: "evening".to_string(),
        });

        assert!(drain(&mut call_rx).is_empty());
        assert!(drain(&mut notify_rx).is_empty());
    }

    #[test]
    fn test_unknown_scene_is_silent() {
        let (mut engine, mut notify_rx, mut call_rx) = test_engine();
        engine.handle_command(ControllerCommand::ActivateScene {
            id: "missing".to_string(),
        });
        assert!(drain(&mut call_rx).is_empty());
        assert!(drain(&mut notify_rx).is_empty());
    }

    #[test]
    fn test_ramp_scene_down_targets_zero() {
        let (mut engine, _notify_rx, mut call_rx) = test_engine();
        engine.session.state.is_on = true;
        engine.session.state.brightness_pct = 70;
        engine.scenes.save(
            "evening",
            &SceneDefinition {
                brightness_enabled: true,
                brightness_level: 60,
                ..SceneDefinition::default()
            },
        );

        engine.handle_command(ControllerCommand::RampScene {
            id: "evening".to_string(),
            rate_ms: Some(4000),
            direction: RampDirection::Down,
        });

        let calls = drain(&mut call_rx);
        assert_eq!(calls[0].service, crate::engine::message::Service::TurnOff);
        assert_eq!(calls[0].service_data.transition, Some(4.0));
    }

    #[test]
    fn test_stop_ramp_freezes_at_interpolated_level() {
        let (mut engine, mut notify_rx, mut call_rx) = test_engine();

        engine.set_brightness(80, 1000, None);
        drain(&mut call_rx);
        drain(&mut notify_rx);

        engine.scheduler.advance(Duration::from_millis(500));
        engine.handle_command(ControllerCommand::StopRamp);

        let calls = drain(&mut call_rx);
        assert_eq!(calls.len(), 1);
        // Started from 0, halfway to 80.
        assert_eq!(calls[0].service_data.brightness, Some(pct_to_wire(40)));
        assert_eq!(calls[0].service_data.transition, None);
        assert!(!engine.brightness_ramp.is_ramping());
    }

    #[test]
    fn test_stop_ramp_idempotent_when_idle() {
        let (mut engine, mut notify_rx, mut call_rx) = test_engine();
        let before = engine.session().state.clone();

        engine.handle_command(ControllerCommand::StopRamp);

        assert!(drain(&mut call_rx).is_empty());
        assert!(drain(&mut notify_rx).is_empty());
        assert_eq!(engine.session().state, before);
    }

    #[test]
    fn test_turn_on_restores_last_level() {
        let (mut engine, _notify_rx, mut call_rx) = test_engine();

        engine.set_brightness(35, 0, None);
        drain(&mut call_rx);
        engine.set_brightness(0, 0, None);
        drain(&mut call_rx);

        engine.handle_command(ControllerCommand::TurnOn);
        let calls = drain(&mut call_rx);
        assert_eq!(calls[0].service_data.brightness, Some(pct_to_wire(35)));
    }

    #[test]
    fn test_select_effect_checks_catalog() {
        let (mut engine, _notify_rx, mut call_rx) = test_engine();
        engine.session.caps.supports_effects = true;
        engine.session.state.effect_catalog =
            vec!["rainbow".to_string(), "candle".to_string()];

        engine.handle_command(ControllerCommand::SelectEffect {
            name: "strobe".to_string(),
        });
        assert!(drain(&mut call_rx).is_empty());

        engine.handle_command(ControllerCommand::SelectEffect {
            name: "candle".to_string(),
        });
        let calls = drain(&mut call_rx);
        assert_eq!(calls[0].service_data.effect.as_deref(), Some("candle"));
    }

    #[test]
    fn test_synchronize_replays_state() {
        let (mut engine, mut notify_rx, _call_rx) = test_engine();
        engine.session.online = true;
        engine.session.state.brightness_pct = 42;
        engine.session.state.color = Some((0.4, 0.38));

        engine.handle_command(ControllerCommand::Synchronize);

        let notes = drain(&mut notify_rx);
        assert!(notes.contains(&Notification::OnlineChanged { state: true }));
        assert!(notes.contains(&Notification::BrightnessChanged {
            current: 42,
            preset_id: None,
        }));
        assert!(notes.iter().any(|n| matches!(
            n,
            Notification::CapabilitiesChanged { .. }
        )));
    }

    #[test]
    fn test_commands_never_panic_on_defaults() {
        // A dispatcher fed decoded-with-defaults commands must stay up.
        let (notify_tx, _notify_rx) = mpsc::unbounded_channel();
        let (call_tx, _call_rx) = mpsc::unbounded_channel();
        let mut engine = LightEngine::new(
            DeviceSession::new("light.test".to_string()),
            SceneStore::new(Box::new(MemoryPersistence::new())),
            ManualScheduler::new(),
            notify_tx,
            call_tx,
        );

        engine.handle_command(ControllerCommand::SetBrightness {
            target: 200,
            rate_ms: None,
            preset_id: None,
        });
        engine.handle_command(ControllerCommand::SetColor {
            x: 0.0,
            y: 0.0,
            mode: ColorMode::FullColor,
            rate_ms: None,
        });
        engine.handle_command(ControllerCommand::StopRamp);
        assert_eq!(engine.session().state.brightness_pct, 100);
    }
}
