//! Monotonic clocks for blocking hold windows
//!
//! The threshold search blocks for the hold window plus a margin. The wait
//! is a sleep to a monotonic deadline, never a poll loop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking deadline wait.
pub trait Clock {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Block until [`Clock::now`] reaches `deadline`.
    fn sleep_until(&self, deadline: Duration);

    /// Block for `duration` from now.
    fn sleep(&self, duration: Duration) {
        self.sleep_until(self.now() + duration);
    }
}

/// Wall-time clock backed by [`Instant`].
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Start a clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        // sleep may wake early; re-check against the deadline
        loop {
            let now = self.now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(deadline - now);
        }
    }
}

/// Virtual clock that jumps straight to each deadline.
///
/// Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Start a clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep_until(&self, deadline: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if *now < deadline {
            *now = deadline;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_jumps_to_deadline() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_millis(1_500));
        assert_eq!(clock.now(), Duration::from_millis(1_500));
        clock.sleep_until(Duration::from_millis(100));
        assert_eq!(clock.now(), Duration::from_millis(1_500));
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_millis(2_500));
    }

    #[test]
    fn test_system_clock_waits_at_least_deadline() {
        let clock = SystemClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(20));
        assert!(clock.now() - start >= Duration::from_millis(20));
    }
}
