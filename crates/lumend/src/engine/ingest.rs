//! Backend state ingest.
//!
//! Consumes state snapshots/events from the Backend, diffs them against the
//! cached session state, and routes brightness and color changes through
//! their ramp channels instead of notifying immediately. Capability and
//! effect changes are never subject to ramp deferral.

use tracing::debug;
use tracing::info;

use super::engine::LightEngine;
use super::message::ColorMode;
use super::message::Notification;
use super::message::StateAttributes;
use super::message::StateEvent;
use super::message::wire_to_pct;
use super::scheduler::Scheduler;
use super::session::CapabilitySnapshot;
use super::session::DEFAULT_MAX_KELVIN;
use super::session::DEFAULT_MIN_KELVIN;

/// Chromaticity diffing epsilon. Distinct from the echo-suppression
/// tolerance: this only decides whether an observation is new information.
const COLOR_EPSILON: f64 = 1e-3;

impl<S: Scheduler> LightEngine<S> {
    pub fn handle_state_event(&mut self, event: StateEvent) {
        if event.entity_id != self.session.entity_id {
            debug!("ignoring event for {}", event.entity_id);
            return;
        }

        if event.state == "unavailable" {
            if self.session.online {
                info!("{} went offline", event.entity_id);
                self.session.online = false;
                self.notify(Notification::OnlineChanged { state: false });
            }
            return;
        }

        // Exactly once per disconnect-reconnect cycle.
        if !self.session.online {
            info!("{} is online", event.entity_id);
            self.session.online = true;
            self.notify(Notification::OnlineChanged { state: true });
        }

        self.ingest_capabilities(&event.attributes);
        self.ingest_brightness(&event);
        self.ingest_color(&event.attributes);
        self.ingest_effects(&event.attributes);
    }

    fn ingest_brightness(&mut self, event: &StateEvent) {
        let is_on = event.state == "on";
        // A non-dimmable device reports no brightness attribute; on means
        // full. Off always observes as zero, keeping the invariant that a
        // completed observation never shows brightness without power.
        let pct = if is_on {
            event.attributes.brightness.map(wire_to_pct).unwrap_or(100)
        } else {
            0
        };
        let is_on = is_on && pct > 0;

        // Commands update the cached state optimistically, so the echo of an
        // accepted transition matches it exactly. While a ramp is in flight
        // that echo is still the payload the timer must release.
        let ramping = self.brightness_ramp.is_ramping();
        let state = &mut self.session.state;
        if !ramping && state.is_on == is_on && state.brightness_pct == pct {
            return;
        }
        state.is_on = is_on;
        state.brightness_pct = pct;
        if pct > 0 {
            self.session.last_on_level = pct;
        }

        let payload = Notification::BrightnessChanged {
            current: pct,
            preset_id: self.session.preset.preset_id.clone(),
        };
        if let Some(notification) = self.brightness_ramp.on_backend_observation(payload) {
            self.notify(notification);
        }
    }

    fn ingest_color(&mut self, attrs: &StateAttributes) {
        let observed = match attrs.color_mode.as_deref() {
            Some("color_temp") => attrs
                .color_temp_kelvin
                .map(|k| (f64::from(k), 0.0, ColorMode::ColorTemperature)),
            _ => attrs.xy_color.map(|[x, y]| (x, y, ColorMode::FullColor)),
        };
        let Some((x, y, mode)) = observed else {
            return;
        };

        let ramping = self.color_ramp.is_ramping();
        let state = &mut self.session.state;
        let changed = match state.color {
            Some((cx, cy)) => {
                mode != state.color_mode
                    || (x - cx).abs() > COLOR_EPSILON
                    || (y - cy).abs() > COLOR_EPSILON
            }
            None => true,
        };
        if !ramping && !changed {
            return;
        }
        state.color = Some((x, y));
        state.color_mode = mode;

        let payload = Notification::ColorChanged {
            current_x: x,
            current_y: y,
            mode,
        };
        if let Some(notification) = self.color_ramp.on_backend_observation(payload) {
            self.notify(notification);
        }
    }

    /// Replace the capability snapshot wholesale when the Backend reports a
    /// changed capability list, and emit one consolidated notification.
    fn ingest_capabilities(&mut self, attrs: &StateAttributes) {
        let Some(modes) = &attrs.supported_color_modes else {
            return;
        };

        let supports_full_color = modes
            .iter()
            .any(|m| matches!(m.as_str(), "xy" | "hs" | "rgb" | "rgbw" | "rgbww"));
        let supports_color_temperature = modes.iter().any(|m| m == "color_temp");
        let supports_brightness = supports_full_color
            || supports_color_temperature
            || modes.iter().any(|m| m == "brightness");

        let snapshot = CapabilitySnapshot {
            supports_brightness,
            supports_full_color,
            supports_color_temperature,
            color_temp_range: (
                attrs.min_color_temp_kelvin.unwrap_or(DEFAULT_MIN_KELVIN),
                attrs.max_color_temp_kelvin.unwrap_or(DEFAULT_MAX_KELVIN),
            ),
            supports_effects: attrs.effect_list.is_some(),
        };

        if snapshot == self.session.caps {
            return;
        }
        info!("capabilities changed: {:?}", snapshot);
        self.session.caps = snapshot;
        let notification = self.capabilities_notification();
        self.notify(notification);
    }

    fn ingest_effects(&mut self, attrs: &StateAttributes) {
        if let Some(list) = &attrs.effect_list {
            if *list != self.session.state.effect_catalog {
                self.session.state.effect_catalog = list.clone();
                self.notify(Notification::EffectCatalogChanged {
                    effects: list.clone(),
                });
            }
        }

        if let Some(effect) = &attrs.effect {
            if self.session.state.effect.as_deref() != Some(effect) {
                self.session.state.effect = Some(effect.clone());
                self.notify(Notification::EffectChanged {
                    effect: effect.clone(),
                });
            }
        }
    }
}
