//! One-shot timer scheduling for the ramp coordinator.
//!
//! The engine's only suspension primitive. Timers are owned exclusively by
//! their ramp channel and cancelable before firing; `TokioScheduler` backs
//! them with spawned sleep tasks, `ManualScheduler` gives tests a
//! deterministic clock.

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::engine::EngineInput;

/// Identifies which ramp channel a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Brightness,
    Color,
}

/// Token delivered back to the engine when a timer fires.
///
/// The generation counter guards against a fire racing its own cancellation:
/// a sleep task may have already queued its token when the channel re-arms,
/// and the channel ignores tokens from a superseded generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub channel: ChannelKind,
    pub generation: u64,
}

/// Opaque handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

pub trait Scheduler {
    /// Arm a one-shot timer that delivers `token` after `after`.
    fn schedule(&mut self, after: Duration, token: TimerToken) -> TimerHandle;

    /// Cancel a timer. Cancellation before firing guarantees the token is
    /// not delivered; cancelling an already-fired timer is a no-op.
    fn cancel(&mut self, handle: TimerHandle);

    fn now(&self) -> Instant;
}

/// Production scheduler: each timer is a spawned sleep task that sends its
/// token back into the engine input channel, cancelled by aborting the task.
pub struct TokioScheduler {
    input_tx: mpsc::UnboundedSender<EngineInput>,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
    next_id: u64,
}

impl TokioScheduler {
    pub fn new(input_tx: mpsc::UnboundedSender<EngineInput>) -> Self {
        Self {
            input_tx,
            tasks: HashMap::new(),
            next_id: 0,
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, after: Duration, token: TimerToken) -> TimerHandle {
        // Reap finished tasks so the map does not grow with every ramp.
        self.tasks.retain(|_, task| !task.is_finished());

        let handle = TimerHandle(self.next_id);
        self.next_id += 1;

        let tx = self.input_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Receiver gone means the engine is shutting down.
            let _ = tx.send(EngineInput::Timer(token));
        });
        self.tasks.insert(handle, task);

        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
            debug!("timer {:?} cancelled", handle);
        }
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic scheduler for tests: records armed timers and exposes a
/// manually advanced clock. Tests pop due timers and feed the tokens back
/// into the engine themselves.
pub struct ManualScheduler {
    pub pending: Vec<(TimerHandle, Duration, TimerToken)>,
    now: Instant,
    next_id: u64,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            now: Instant::now(),
            next_id: 0,
        }
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the fake clock without firing anything.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Remove and return all armed timers, in arming order.
    pub fn take_pending(&mut self) -> Vec<(TimerHandle, Duration, TimerToken)> {
        std::mem::take(&mut self.pending)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, after: Duration, token: TimerToken) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.pending.push((handle, after, token));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.pending.retain(|(h, _, _)| *h != handle);
    }

    fn now(&self) -> Instant {
        self.now
    }
}
