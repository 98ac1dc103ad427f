//! Fire-rate gating.
//!
//! Holding the trigger fires once immediately and then once per cooldown for
//! as long as the trigger stays held. Releasing it never cancels the running
//! cooldown, so tapping faster than the fire rate cannot beat the cap.

use crate::scheduler::{Scheduler, TimerHandle};
use log::trace;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireState {
    Idle,
    /// A cooldown timer is pending.
    Cooling,
}

#[derive(Debug, Clone)]
pub struct FireControl {
    fire_rate: Duration,
    is_firing: bool,
    pending_timer: Option<TimerHandle>,
}

impl FireControl {
    pub fn new(fire_rate: Duration) -> Self {
        Self {
            fire_rate,
            is_firing: false,
            pending_timer: None,
        }
    }

    /// Negative or NaN rates collapse to no cooldown; rates too long for a
    /// `Duration` saturate.
    pub fn from_seconds(fire_rate_seconds: f32) -> Self {
        let fire_rate = if fire_rate_seconds > 0.0 {
            Duration::try_from_secs_f32(fire_rate_seconds).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self::new(fire_rate)
    }

    pub fn fire_rate(&self) -> Duration {
        self.fire_rate
    }

    pub fn state(&self) -> FireState {
        if self.pending_timer.is_some() {
            FireState::Cooling
        } else {
            FireState::Idle
        }
    }

    pub fn is_firing(&self) -> bool {
        self.is_firing
    }

    pub fn pending_timer(&self) -> Option<TimerHandle> {
        self.pending_timer
    }

    /// Trigger pressed. Returns true if the caller should fire now.
    ///
    /// While cooling this does nothing: the press is neither queued nor
    /// allowed to arm a second timer.
    pub fn start<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) -> bool {
        if self.pending_timer.is_some() {
            trace!("Fire start ignored while cooling");
            return false;
        }

        self.is_firing = true;
        self.pending_timer = Some(scheduler.schedule(self.fire_rate));
        true
    }

    /// Trigger released. The cooldown keeps running.
    pub fn stop(&mut self) {
        self.is_firing = false;
    }

    /// Cooldown elapsed. Returns true if the caller should fire again.
    ///
    /// Handles that do not belong to this instance are ignored.
    pub fn on_timer_elapsed<S: Scheduler + ?Sized>(
        &mut self,
        handle: TimerHandle,
        scheduler: &mut S,
    ) -> bool {
        if self.pending_timer != Some(handle) {
            return false;
        }

        if self.is_firing {
            self.pending_timer = Some(scheduler.schedule(self.fire_rate));
            true
        } else {
            self.pending_timer = None;
            false
        }
    }

    /// Drops the pending timer, e.g. when the owning character despawns.
    pub fn cancel<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(handle) = self.pending_timer.take() {
            scheduler.cancel(handle);
        }
        self.is_firing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SimScheduler;

    const RATE: Duration = Duration::from_millis(500);

    /// Advances the clock and feeds elapsed timers back, counting re-fires.
    fn run(fire: &mut FireControl, scheduler: &mut SimScheduler, dt: Duration) -> u32 {
        let mut shots = 0;
        for handle in scheduler.advance(dt) {
            if fire.on_timer_elapsed(handle, scheduler) {
                shots += 1;
            }
        }
        shots
    }

    #[test]
    fn test_start_fires_and_cools() {
        let mut scheduler = SimScheduler::new();
        let mut fire = FireControl::new(RATE);

        assert_eq!(fire.state(), FireState::Idle);
        assert!(fire.start(&mut scheduler));
        assert!(fire.is_firing());
        assert_eq!(fire.state(), FireState::Cooling);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_double_start_keeps_single_timer() {
        let mut scheduler = SimScheduler::new();
        let mut fire = FireControl::new(RATE);

        assert!(fire.start(&mut scheduler));
        assert!(!fire.start(&mut scheduler));

        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_stop_does_not_cancel_cooldown() {
        let mut scheduler = SimScheduler::new();
        let mut fire = FireControl::new(RATE);

        fire.start(&mut scheduler);
        fire.stop();

        assert!(!fire.is_firing());
        assert_eq!(fire.state(), FireState::Cooling);
        assert!(!fire.start(&mut scheduler));
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_released_trigger_returns_to_idle() {
        let mut scheduler = SimScheduler::new();
        let mut fire = FireControl::new(RATE);

        fire.start(&mut scheduler);
        fire.stop();

        assert_eq!(run(&mut fire, &mut scheduler, RATE), 0);
        assert_eq!(fire.state(), FireState::Idle);
        assert_eq!(fire.pending_timer(), None);
        assert!(fire.start(&mut scheduler));
    }

    #[test]
    fn test_held_trigger_auto_fires_at_rate() {
        let mut scheduler = SimScheduler::new();
        let mut fire = FireControl::new(RATE);

        fire.start(&mut scheduler);
        let mut shots = 1;
        for _ in 0..10 {
            shots += run(&mut fire, &mut scheduler, Duration::from_millis(100));
        }

        // t = 0.0, 0.5, 1.0
        assert_eq!(shots, 3);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_foreign_handle_ignored() {
        let mut scheduler = SimScheduler::new();
        let mut fire = FireControl::new(RATE);
        let foreign = scheduler.schedule(Duration::ZERO);

        fire.start(&mut scheduler);
        assert!(!fire.on_timer_elapsed(foreign, &mut scheduler));
        assert_eq!(fire.state(), FireState::Cooling);
    }

    #[test]
    fn test_cancel_clears_timer() {
        let mut scheduler = SimScheduler::new();
        let mut fire = FireControl::new(RATE);

        fire.start(&mut scheduler);
        fire.cancel(&mut scheduler);

        assert_eq!(fire.state(), FireState::Idle);
        assert!(!fire.is_firing());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_invalid_rate_collapses_to_zero() {
        assert_eq!(FireControl::from_seconds(-1.0).fire_rate(), Duration::ZERO);
        assert_eq!(FireControl::from_seconds(f32::NAN).fire_rate(), Duration::ZERO);
        assert_eq!(FireControl::from_seconds(0.25).fire_rate(), Duration::from_millis(250));
    }

    #[test]
    fn test_huge_rate_saturates() {
        let mut scheduler = SimScheduler::new();
        let mut fire = FireControl::from_seconds(1e20);
        assert_eq!(fire.fire_rate(), Duration::MAX);

        scheduler.advance(Duration::from_secs(10));
        assert!(fire.start(&mut scheduler));
        assert!(scheduler.advance(Duration::from_secs(3600)).is_empty());
        assert_eq!(fire.state(), FireState::Cooling);
    }
}
