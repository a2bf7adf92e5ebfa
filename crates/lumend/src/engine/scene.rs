//! Named scene definitions and their persistence.
//!
//! A scene binds target brightness, color, and rates into one record that
//! activation applies atomically. Scenes survive restarts through the
//! external persistence collaborator, one namespaced record per scene id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::message::ColorMode;
use crate::persist::Persistence;

/// Namespace separating scene records from any other persisted data.
const SCENE_PREFIX: &str = "scene:";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDefinition {
    #[serde(default)]
    pub brightness_enabled: bool,
    #[serde(default)]
    pub brightness_level: u8,
    #[serde(default)]
    pub brightness_rate_ms: u32,
    #[serde(default)]
    pub color_enabled: bool,
    #[serde(default)]
    pub color_x: f64,
    #[serde(default)]
    pub color_y: f64,
    #[serde(default)]
    pub color_mode: ColorMode,
    #[serde(default)]
    pub color_rate_ms: u32,
}

impl SceneDefinition {
    /// Build a scene from the Controller's loosely-typed element map.
    /// Missing or malformed fields take their defaults; a push never fails.
    pub fn from_elements(elements: &Value) -> Self {
        let num = |key: &str| elements.get(key).and_then(Value::as_f64);
        let flag = |key: &str| elements.get(key).and_then(Value::as_bool).unwrap_or(false);

        Self {
            brightness_enabled: flag("brightness_enabled"),
            brightness_level: num("brightness_level").unwrap_or(0.0).clamp(0.0, 100.0) as u8,
            brightness_rate_ms: num("brightness_rate_ms").unwrap_or(0.0).max(0.0) as u32,
            color_enabled: flag("color_enabled"),
            color_x: num("color_x").unwrap_or(0.0),
            color_y: num("color_y").unwrap_or(0.0),
            color_mode: match elements.get("color_mode").and_then(Value::as_u64) {
                Some(1) => ColorMode::ColorTemperature,
                _ => ColorMode::FullColor,
            },
            color_rate_ms: num("color_rate_ms").unwrap_or(0.0).max(0.0) as u32,
        }
    }
}

/// Scene records keyed by opaque scene id, stored through the persistence
/// collaborator.
pub struct SceneStore {
    persistence: Box<dyn Persistence>,
}

impl SceneStore {
    pub fn new(persistence: Box<dyn Persistence>) -> Self {
        Self { persistence }
    }

    pub fn save(&mut self, id: &str, scene: &SceneDefinition) {
        let value = match serde_json::to_value(scene) {
            Ok(v) => v,
            Err(e) => {
                warn!("failed to serialize scene {}: {}", id, e);
                return;
            }
        };
        self.persistence.store(&format!("{SCENE_PREFIX}{id}"), value);
    }

    pub fn load(&self, id: &str) -> Option<SceneDefinition> {
        let value = self.persistence.load(&format!("{SCENE_PREFIX}{id}"))?;
        match serde_json::from_value(value) {
            Ok(scene) => Some(scene),
            Err(e) => {
                warn!("corrupt scene record {}: {}", id, e);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.persistence.remove(&format!("{SCENE_PREFIX}{id}"));
    }

    pub fn scene_ids(&self) -> Vec<String> {
        self.persistence
            .keys_with_prefix(SCENE_PREFIX)
            .into_iter()
            .map(|k| k[SCENE_PREFIX.len()..].to_string())
            .collect()
    }
}
