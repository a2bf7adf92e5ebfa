//! The per-device reconciliation engine.
//!
//! One `LightEngine` exists per bound Backend entity. It has no internal
//! parallelism: the runtime delivers Controller commands, Backend events,
//! timer fires, and configuration updates serially through `EngineInput`,
//! and the engine mutates its session and emits outputs synchronously.
//! Output channels are unbounded because the engine must not block.

use tokio::sync::mpsc;
use tracing::warn;

use super::message::ConfigUpdate;
use super::message::ControllerCommand;
use super::message::Notification;
use super::message::ServiceCall;
use super::message::StateEvent;
use super::ramp::RampChannel;
use super::scene::SceneStore;
use super::scheduler::ChannelKind;
use super::scheduler::Scheduler;
use super::scheduler::TimerToken;
use super::session::DeviceSession;

/// Everything the engine reacts to, in arrival order.
#[derive(Debug)]
pub enum EngineInput {
    Command(ControllerCommand),
    Backend(StateEvent),
    Timer(TimerToken),
    Configure(ConfigUpdate),
}

pub struct LightEngine<S: Scheduler> {
    pub(super) session: DeviceSession,
    pub(super) brightness_ramp: RampChannel,
    pub(super) color_ramp: RampChannel,
    pub(super) scenes: SceneStore,
    pub(super) scheduler: S,
    notify_tx: mpsc::UnboundedSender<Notification>,
    call_tx: mpsc::UnboundedSender<ServiceCall>,
}

impl<S: Scheduler> LightEngine<S> {
    pub fn new(
        session: DeviceSession,
        scenes: SceneStore,
        scheduler: S,
        notify_tx: mpsc::UnboundedSender<Notification>,
        call_tx: mpsc::UnboundedSender<ServiceCall>,
    ) -> Self {
        Self {
            session,
            brightness_ramp: RampChannel::new(ChannelKind::Brightness),
            color_ramp: RampChannel::new(ChannelKind::Color),
            scenes,
            scheduler,
            notify_tx,
            call_tx,
        }
    }

    pub fn handle_input(&mut self, input: EngineInput) {
        match input {
            EngineInput::Command(cmd) => self.handle_command(cmd),
            EngineInput::Backend(event) => self.handle_state_event(event),
            EngineInput::Timer(token) => self.handle_timer(token),
            EngineInput::Configure(update) => self.apply_config(update),
        }
    }

    /// A ramp timer fired: release the channel's deferred notification, if
    /// any. Stale fires from superseded timers are dropped by the channel.
    fn handle_timer(&mut self, token: TimerToken) {
        let released = match token.channel {
            ChannelKind::Brightness => self
                .brightness_ramp
                .on_timer_fire(&mut self.scheduler, token.generation),
            ChannelKind::Color => self
                .color_ramp
                .on_timer_fire(&mut self.scheduler, token.generation),
        };
        if let Some(notification) = released {
            self.notify(notification);
        }
    }

    fn apply_config(&mut self, update: ConfigUpdate) {
        match update {
            ConfigUpdate::ColorTraceTolerance { value } => {
                self.session.tunables.set_color_trace_tolerance(value);
            }
            ConfigUpdate::DefaultRates {
                brightness_ms,
                color_ms,
            } => {
                self.session.tunables.default_brightness_rate_ms = brightness_ms;
                self.session.tunables.default_color_rate_ms = color_ms;
            }
            ConfigUpdate::ColorOnMode(cfg) => {
                // Replaced atomically, never partially mutated.
                self.session.color_on = cfg;
            }
        }
    }

    pub(super) fn notify(&self, notification: Notification) {
        if self.notify_tx.send(notification).is_err() {
            warn!("notification receiver dropped");
        }
    }

    pub(super) fn send_call(&self, call: ServiceCall) {
        if self.call_tx.send(call).is_err() {
            warn!("service call receiver dropped");
        }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Mutable access to the scheduler, for hosts that drive the engine
    /// with a deterministic clock.
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }
}
