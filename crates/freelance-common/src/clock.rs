//! Time sources.
//!
//! Every deadline in the runtime is a [`Duration`] measured from the origin of
//! a [`Clock`]. Production code uses [`MonotonicClock`]; tests either pause
//! tokio time (which drives `MonotonicClock` too) or step a [`ManualClock`]
//! explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Monotonic time source.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Time elapsed since the clock's origin. Never decreases.
    fn now(&self) -> Duration;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Clock backed by `tokio::time::Instant`.
///
/// Under `#[tokio::test(start_paused = true)]` this clock only moves when the
/// runtime auto-advances or a test calls `tokio::time::advance`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        tokio::time::Instant::now().saturating_duration_since(self.origin)
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Reads return the current value and then add the configured step, so a
/// non-zero step makes the clock tick on every observation.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
    step: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock starting at `start`.
    pub fn starting_at(start: Duration) -> Self {
        let clock = Self::new();
        clock.set(start);
        clock
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(as_nanos(by), Ordering::SeqCst);
    }

    /// Sets the clock to `to`. Ignored if `to` is in the past.
    pub fn set(&self, to: Duration) {
        self.nanos.fetch_max(as_nanos(to), Ordering::SeqCst);
    }

    /// Sets the amount added after every read.
    pub fn set_auto_increment(&self, step: Duration) {
        self.step.store(as_nanos(step), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        let step = self.step.load(Ordering::SeqCst);
        Duration::from_nanos(self.nanos.fetch_add(step, Ordering::SeqCst))
    }
}

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(250));

        clock.set(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));

        // never moves backward
        clock.set(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_manual_clock_auto_increment() {
        let clock = ManualClock::starting_at(Duration::from_secs(1));
        clock.set_auto_increment(Duration::from_millis(10));

        assert_eq!(clock.now(), Duration::from_millis(1000));
        assert_eq!(clock.now(), Duration::from_millis(1010));
        assert_eq!(clock.now(), Duration::from_millis(1020));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monotonic_clock_follows_paused_time() {
        let clock = MonotonicClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(clock.now(), Duration::from_secs(3));
    }
}
