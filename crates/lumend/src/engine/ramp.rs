//! Per-channel deferred-notification state machine.
//!
//! The Backend reports its *target* state the instant a transition command
//! is accepted, well before the physical device reaches it. Forwarding that
//! echo immediately would let a downstream scene-matching consumer believe
//! the transition is already complete, so while a ramp is in flight the
//! channel holds the observation back and releases it when the timer fires.
//!
//! Central invariant of the whole engine: at most one live timer per
//! channel. Arming always cancels the previous timer, so a rapid sequence
//! of commands collapses to the notification timing of the last one.

use std::time::Duration;
use std::time::Instant;

use super::message::Notification;
use super::scheduler::ChannelKind;
use super::scheduler::Scheduler;
use super::scheduler::TimerHandle;
use super::scheduler::TimerToken;

#[derive(Debug, Clone, Copy)]
struct RampStart {
    at: Instant,
    value: f64,
}

#[derive(Debug)]
pub struct RampChannel {
    kind: ChannelKind,
    timer: Option<TimerHandle>,
    generation: u64,
    pending: Option<Notification>,
    start: Option<RampStart>,
    target: f64,
    duration_ms: u32,
}

impl RampChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            timer: None,
            generation: 0,
            pending: None,
            start: None,
            target: 0.0,
            duration_ms: 0,
        }
    }

    pub fn is_ramping(&self) -> bool {
        self.timer.is_some()
    }

    /// Arm the channel for a new transition.
    ///
    /// Any in-flight timer and its pending payload are discarded; with a
    /// zero rate the channel stays idle and the caller notifies immediately.
    pub fn arm<S: Scheduler>(&mut self, scheduler: &mut S, start_value: f64, target: f64, rate_ms: u32) {
        if let Some(handle) = self.timer.take() {
            scheduler.cancel(handle);
        }
        self.pending = None;
        self.generation += 1;
        self.start = None;
        self.target = target;
        self.duration_ms = rate_ms;

        if rate_ms > 0 {
            self.start = Some(RampStart {
                at: scheduler.now(),
                value: start_value,
            });
            let token = TimerToken {
                channel: self.kind,
                generation: self.generation,
            };
            self.timer = Some(scheduler.schedule(Duration::from_millis(u64::from(rate_ms)), token));
        }
    }

    /// Route a Backend observation: deferred while ramping, passed through
    /// when idle. A later observation during the same ramp replaces the
    /// pending one.
    pub fn on_backend_observation(&mut self, payload: Notification) -> Option<Notification> {
        if self.is_ramping() {
            self.pending = Some(payload);
            None
        } else {
            Some(payload)
        }
    }

    /// Handle a timer fire, returning the deferred payload if one is held.
    ///
    /// Fires from a superseded generation are ignored; they belong to a
    /// timer whose cancellation raced its own delivery.
    pub fn on_timer_fire<S: Scheduler>(
        &mut self,
        scheduler: &mut S,
        generation: u64,
    ) -> Option<Notification> {
        if generation != self.generation {
            return None;
        }
        if let Some(handle) = self.timer.take() {
            scheduler.cancel(handle);
        }
        self.start = None;
        self.pending.take()
    }

    /// The instantaneously interpolated value of the active ramp, clamped to
    /// [0, 1] progress. `None` when no ramp is active.
    pub fn interpolated_value(&self, now: Instant) -> Option<f64> {
        if !self.is_ramping() {
            return None;
        }
        let start = self.start?;
        let elapsed = now.saturating_duration_since(start.at).as_millis() as f64;
        let progress = if self.duration_ms == 0 {
            1.0
        } else {
            (elapsed / f64::from(self.duration_ms)).clamp(0.0, 1.0)
        };
        Some(start.value + (self.target - start.value) * progress)
    }

    /// Cancel the active ramp and discard any pending payload.
    pub fn cancel<S: Scheduler>(&mut self, scheduler: &mut S) {
        if let Some(handle) = self.timer.take() {
            scheduler.cancel(handle);
        }
        self.generation += 1;
        self.pending = None;
        self.start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scheduler::ManualScheduler;

    fn changed(current: u8) -> Notification {
        Notification::BrightnessChanged {
            current,
            preset_id: None,
        }
    }

    #[test]
    fn test_idle_passes_through() {
        let mut channel = RampChannel::new(ChannelKind::Brightness);
        assert_eq!(channel.on_backend_observation(changed(60)), Some(changed(60)));
    }

    #[test]
    fn test_ramping_defers_until_fire() {
        let mut sched = ManualScheduler::new();
        let mut channel = RampChannel::new(ChannelKind::Brightness);

        channel.arm(&mut sched, 0.0, 50.0, 2000);
        assert!(channel.is_ramping());
        assert_eq!(channel.on_backend_observation(changed(50)), None);

        let fired = sched.take_pending();
        assert_eq!(fired.len(), 1);
        let token = fired[0].2;
        assert_eq!(
            channel.on_timer_fire(&mut sched, token.generation),
            Some(changed(50))
        );
        assert!(!channel.is_ramping());
    }

    #[test]
    fn test_rearm_collapses_to_last_command() {
        let mut sched = ManualScheduler::new();
        let mut channel = RampChannel::new(ChannelKind::Brightness);

        channel.arm(&mut sched, 0.0, 50.0, 2000);
        assert_eq!(channel.on_backend_observation(changed(50)), None);
        let first_token = sched.pending[0].2;

        // Second command supersedes the first; its timer replaces the old
        // one and the old pending payload is dropped.
        channel.arm(&mut sched, 10.0, 80.0, 1000);
        assert_eq!(sched.pending.len(), 1);
        assert_eq!(channel.on_backend_observation(changed(80)), None);

        // The stale fire from the first timer must be ignored.
        assert_eq!(channel.on_timer_fire(&mut sched, first_token.generation), None);

        let token = sched.take_pending()[0].2;
        assert_eq!(
            channel.on_timer_fire(&mut sched, token.generation),
            Some(changed(80))
        );
    }

    #[test]
    fn test_fire_without_pending_is_silent() {
        let mut sched = ManualScheduler::new();
        let mut channel = RampChannel::new(ChannelKind::Brightness);

        channel.arm(&mut sched, 0.0, 50.0, 500);
        let token = sched.take_pending()[0].2;
        assert_eq!(channel.on_timer_fire(&mut sched, token.generation), None);
        assert!(!channel.is_ramping());
    }

    #[test]
    fn test_zero_rate_stays_idle() {
        let mut sched = ManualScheduler::new();
        let mut channel = RampChannel::new(ChannelKind::Brightness);

        channel.arm(&mut sched, 0.0, 50.0, 0);
        assert!(!channel.is_ramping());
        assert!(sched.pending.is_empty());
        assert_eq!(channel.on_backend_observation(changed(50)), Some(changed(50)));
    }

    #[test]
    fn test_interpolated_value() {
        let mut sched = ManualScheduler::new();
        let mut channel = RampChannel::new(ChannelKind::Brightness);

        channel.arm(&mut sched, 20.0, 80.0, 1000);
        sched.advance(Duration::from_millis(500));
        let mid = channel.interpolated_value(sched.now()).unwrap();
        assert!((mid - 50.0).abs() < 1e-9);

        // Progress clamps at 1.0 past the duration.
        sched.advance(Duration::from_millis(5000));
        let done = channel.interpolated_value(sched.now()).unwrap();
        assert!((done - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolated_value_when_idle() {
        let sched = ManualScheduler::new();
        let channel = RampChannel::new(ChannelKind::Brightness);
        assert_eq!(channel.interpolated_value(sched.now()), None);
    }

    #[test]
    fn test_cancel_discards_pending() {
        let mut sched = ManualScheduler::new();
        let mut channel = RampChannel::new(ChannelKind::Brightness);

        channel.arm(&mut sched, 0.0, 50.0, 1000);
        let token = sched.pending[0].2;
        assert_eq!(channel.on_backend_observation(changed(50)), None);

        channel.cancel(&mut sched);
        assert!(!channel.is_ramping());
        assert!(sched.pending.is_empty());
        assert_eq!(channel.on_timer_fire(&mut sched, token.generation), None);
    }
}
