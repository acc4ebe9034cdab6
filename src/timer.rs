//! Monotonic clock and deadline waits.
//!
//! Provides a `Timer` trait and two implementations:
//! - `PrecisionTimer`, a coarse-sleep-then-spin wait on the real clock
//! - `ManualTimer` for testing, which jumps straight to each deadline

use std::thread;
use std::time::{Duration, Instant};

use crate::exec_context::CancelToken;

/// How a deadline wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    Cancelled,
}

/// Abstraction over the clock used by the scheduler.
pub trait Timer {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Block until `deadline`, returning early if `cancel` is set.
    fn wait_until(&self, deadline: Instant, cancel: &CancelToken) -> WaitOutcome;
}

impl<T: Timer + ?Sized> Timer for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn wait_until(&self, deadline: Instant, cancel: &CancelToken) -> WaitOutcome {
        (**self).wait_until(deadline, cancel)
    }
}

/// Two-phase waiter: sleeps in slices of at most `coarse_step` while more
/// than `spin_threshold` remains, then yield-spins to the deadline.
///
/// Cancellation is checked before every slice, so a cancelled wait returns
/// within one `coarse_step`.
#[derive(Debug, Clone, Copy)]
pub struct PrecisionTimer {
    coarse_step: Duration,
    spin_threshold: Duration,
}

impl Default for PrecisionTimer {
    fn default() -> Self {
        Self::new(Duration::from_millis(5), Duration::from_millis(2))
    }
}

impl PrecisionTimer {
    pub fn new(coarse_step: Duration, spin_threshold: Duration) -> Self {
        Self {
            coarse_step: coarse_step.max(Duration::from_micros(100)),
            spin_threshold,
        }
    }

    pub fn coarse_step(&self) -> Duration {
        self.coarse_step
    }
}

impl Timer for PrecisionTimer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, deadline: Instant, cancel: &CancelToken) -> WaitOutcome {
        loop {
            if cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::Reached;
            }
            let remaining = deadline - now;
            if remaining > self.spin_threshold {
                thread::sleep((remaining - self.spin_threshold).min(self.coarse_step));
            } else {
                thread::yield_now();
            }
        }
    }
}

/// Simulated clock: every wait moves time to the deadline (plus a fixed
/// overshoot) without sleeping, and the deadlines are recorded.
#[cfg(test)]
pub struct ManualTimer {
    now: std::cell::Cell<Instant>,
    pub overshoot: Duration,
    pub deadlines: std::cell::RefCell<Vec<Instant>>,
    pub start: Instant,
}

#[cfg(test)]
impl ManualTimer {
    pub fn new() -> Self {
        let start = Instant::now();
        Self {
            now: std::cell::Cell::new(start),
            overshoot: Duration::ZERO,
            deadlines: std::cell::RefCell::new(Vec::new()),
            start,
        }
    }

    pub fn with_overshoot(mut self, overshoot: Duration) -> Self {
        self.overshoot = overshoot;
        self
    }

    /// Recorded deadlines as offsets from the timer's creation.
    pub fn deadline_offsets(&self) -> Vec<Duration> {
        self.deadlines
            .borrow()
            .iter()
            .map(|d| d.duration_since(self.start))
            .collect()
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get().duration_since(self.start)
    }
}

#[cfg(test)]
impl Timer for ManualTimer {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn wait_until(&self, deadline: Instant, cancel: &CancelToken) -> WaitOutcome {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        self.deadlines.borrow_mut().push(deadline);
        if deadline > self.now.get() {
            self.now.set(deadline + self.overshoot);
        }
        WaitOutcome::Reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waits_until_deadline() {
        let timer = PrecisionTimer::default();
        let start = timer.now();
        let outcome = timer.wait_until(start + Duration::from_millis(20), &CancelToken::new());
        assert_eq!(outcome, WaitOutcome::Reached);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_past_deadline_returns_immediately() {
        let timer = PrecisionTimer::default();
        let start = Instant::now();
        let outcome = timer.wait_until(start, &CancelToken::new());
        assert_eq!(outcome, WaitOutcome::Reached);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_already_cancelled() {
        let timer = PrecisionTimer::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let deadline = Instant::now() + Duration::from_secs(10);
        assert_eq!(timer.wait_until(deadline, &cancel), WaitOutcome::Cancelled);
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let timer = PrecisionTimer::new(Duration::from_millis(5), Duration::from_millis(1));
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.cancel();
        });
        let start = Instant::now();
        let outcome = timer.wait_until(start + Duration::from_secs(5), &cancel);
        handle.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_manual_timer_jumps_to_deadline() {
        let timer = ManualTimer::new().with_overshoot(Duration::from_millis(1));
        let deadline = timer.now() + Duration::from_millis(40);
        assert_eq!(
            timer.wait_until(deadline, &CancelToken::new()),
            WaitOutcome::Reached
        );
        assert_eq!(timer.elapsed(), Duration::from_millis(41));
        assert_eq!(timer.deadline_offsets(), vec![Duration::from_millis(40)]);
    }
}
