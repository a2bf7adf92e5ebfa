//! The per-device driver loop.
//!
//! One task owns the engine and processes its inputs serially; transports
//! feed the input channel and consume the output channels. This is the only
//! place the engine runs, so all session state stays on a single logical
//! thread.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::engine::message::Notification;
use crate::engine::message::ServiceCall;
use crate::engine::scene::SceneStore;
use crate::engine::scheduler::TokioScheduler;
use crate::engine::session::DeviceSession;
use crate::engine::EngineInput;
use crate::engine::LightEngine;

/// A running engine and the channel endpoints for wiring transports to it.
pub struct EngineRuntime {
    pub input_tx: mpsc::UnboundedSender<EngineInput>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
    pub service_calls: mpsc::UnboundedReceiver<ServiceCall>,
    task: JoinHandle<()>,
}

impl EngineRuntime {
    /// Spawn the driver loop for one device session.
    pub fn spawn(session: DeviceSession, scenes: SceneStore) -> Self {
        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        let (notify_tx, notifications) = mpsc::unbounded_channel();
        let (call_tx, service_calls) = mpsc::unbounded_channel();

        let scheduler = TokioScheduler::new(input_tx.clone());
        let entity_id = session.entity_id.clone();
        let mut engine = LightEngine::new(session, scenes, scheduler, notify_tx, call_tx);

        let task = tokio::spawn(async move {
            info!("engine for {} starting", entity_id);
            // The scheduler holds a sender clone, so this loop ends only on
            // explicit shutdown.
            while let Some(input) = input_rx.recv().await {
                engine.handle_input(input);
            }
            info!("engine for {} shutting down", entity_id);
        });

        Self {
            input_tx,
            notifications,
            service_calls,
            task,
        }
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}
