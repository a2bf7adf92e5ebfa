//! Shared helpers for engine unit tests.

use tokio::sync::mpsc;

use super::engine::LightEngine;
use super::message::Notification;
use super::message::ServiceCall;
use super::scene::SceneStore;
use super::scheduler::ManualScheduler;
use super::session::CapabilitySnapshot;
use super::session::DeviceSession;
use crate::persist::MemoryPersistence;

/// An engine bound to `light.test` with every capability enabled, a manual
/// scheduler, and channel receivers for its outputs.
pub(crate) fn test_engine() -> (
    LightEngine<ManualScheduler>,
    mpsc::UnboundedReceiver<Notification>,
    mpsc::UnboundedReceiver<ServiceCall>,
) {
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let (call_tx, call_rx) = mpsc::unbounded_channel();

    let mut session = DeviceSession::new("light.test".to_string());
    session.caps = CapabilitySnapshot {
        supports_brightness: true,
        supports_full_color: true,
        supports_color_temperature: true,
        color_temp_range: (2000, 6500),
        supports_effects: false,
    };

    let engine = LightEngine::new(
        session,
        SceneStore::new(Box::new(MemoryPersistence::new())),
        ManualScheduler::new(),
        notify_tx,
        call_tx,
    );
    (engine, notify_rx, call_rx)
}

/// Collect everything currently queued on an output channel.
pub(crate) fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}
