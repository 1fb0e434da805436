//! Time source for the control loop.
//!
//! Every wait in the engine (pulse, settle, open-loop drive, poll interval)
//! goes through a [`Clock`], so the same code runs against wall time on a
//! real robot and against virtual time in the simulator.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock handle shared by the engine components of one session.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Monotonic time source that can block the control thread.
pub trait Clock {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Block the control thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Sleep for a duration given in (possibly fractional) seconds.
    ///
    /// Negative, non-finite and unrepresentable values are treated as zero.
    fn sleep_secs(&self, secs: f32) {
        if secs > 0.0
            && let Ok(duration) = Duration::try_from_secs_f32(secs)
        {
            self.sleep(duration);
        }
    }
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
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

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(5));
        assert!(clock.now() >= before + Duration::from_millis(5));
    }

    #[test]
    fn test_sleep_secs_ignores_negative() {
        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep_secs(-3.0);
        clock.sleep_secs(f32::NAN);
        assert!(clock.now() - before < Duration::from_millis(500));
    }
}
