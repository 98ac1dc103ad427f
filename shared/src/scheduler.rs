//! Single-shot, cancelable timers on a process-local simulation clock.
//!
//! Timers never call back into their owner directly. [`SimScheduler::advance`]
//! returns the handles whose deadline has passed and the process that owns the
//! clock routes each handle to the component that scheduled it. Tests drive the
//! same type with hand-picked timestamps instead of wall time.

use std::time::Duration;

/// Opaque handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

pub trait Scheduler {
    /// Current simulation time.
    fn now(&self) -> Duration;

    /// Arms a timer that elapses `delay` from now.
    fn schedule(&mut self, delay: Duration) -> TimerHandle;

    /// Cancels a pending timer. Returns false if it already elapsed or was
    /// never scheduled here.
    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

#[derive(Debug, Default)]
pub struct SimScheduler {
    now: Duration,
    next_handle: u64,
    pending: Vec<(Duration, TimerHandle)>,
}

impl SimScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.iter().any(|(_, h)| *h == handle)
    }

    /// Moves the clock forward by `dt` and returns the elapsed timers.
    pub fn advance(&mut self, dt: Duration) -> Vec<TimerHandle> {
        self.advance_to(self.now.saturating_add(dt))
    }

    /// Moves the clock to `time` (never backwards) and returns every timer
    /// whose deadline is at or before it, earliest first.
    pub fn advance_to(&mut self, time: Duration) -> Vec<TimerHandle> {
        if time > self.now {
            self.now = time;
        }

        let now = self.now;
        let mut elapsed = Vec::new();
        self.pending.retain(|&(deadline, handle)| {
            if deadline <= now {
                elapsed.push((deadline, handle));
                false
            } else {
                true
            }
        });

        elapsed.sort();
        elapsed.into_iter().map(|(_, handle)| handle).collect()
    }
}

impl Scheduler for SimScheduler {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule(&mut self, delay: Duration) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.pending.push((self.now.saturating_add(delay), handle));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(_, h)| *h != handle);
        self.pending.len() != before
    }
}
