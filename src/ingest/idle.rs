//! Idle strategies for the ingest poll loop
//!
//! A poll that returns fragments counts as work and resets the strategy.
//! A poll that returns nothing makes the strategy wait, so an idle
//! subscriber does not pin a core.

use std::fmt::Debug;
use std::time::Duration;

/// Shortest sleep of [`SleepingIdleStrategy`]
pub const MIN_SLEEP: Duration = Duration::from_micros(100);

/// Shortest park period of [`BackoffIdleStrategy`]
pub const MIN_PARK: Duration = Duration::from_micros(1);

/// How a polling loop waits between empty polls
pub trait IdleStrategy: Send + Debug {
    /// Called after every poll with the amount of work it did
    fn idle(&mut self, work_count: usize);

    /// Return to the most eager state
    fn reset(&mut self);

    /// Short name for logging
    fn name(&self) -> &'static str;
}

/// Sleep a fixed period whenever there is no work
///
/// Periods below [`MIN_SLEEP`] are raised to it.
#[derive(Debug, Clone)]
pub struct SleepingIdleStrategy {
    period: Duration,
}

impl SleepingIdleStrategy {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_SLEEP),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl IdleStrategy for SleepingIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count == 0 {
            std::thread::sleep(self.period);
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "sleeping"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackoffState {
    Spinning(u32),
    Yielding(u32),
    Parking,
}

/// Escalating wait: spin, then yield, then park with a doubling period
///
/// The park period grows from `min_park` (at least [`MIN_PARK`]) to
/// `max_park`. Any poll that did work drops straight back to spinning.
#[derive(Debug, Clone)]
pub struct BackoffIdleStrategy {
    max_spins: u32,
    max_yields: u32,
    min_park: Duration,
    max_park: Duration,
    park: Duration,
    state: BackoffState,
}

impl BackoffIdleStrategy {
    pub fn new(max_spins: u32, max_yields: u32, min_park: Duration, max_park: Duration) -> Self {
        let min_park = min_park.max(MIN_PARK);
        let max_park = max_park.max(min_park);
        Self {
            max_spins,
            max_yields,
            min_park,
            max_park,
            park: min_park,
            state: BackoffState::Spinning(0),
        }
    }

    /// Current park period, for tests and diagnostics
    pub fn park_period(&self) -> Duration {
        self.park
    }

    pub fn is_parking(&self) -> bool {
        self.state == BackoffState::Parking
    }
}

impl Default for BackoffIdleStrategy {
    fn default() -> Self {
        Self::new(10, 5, Duration::from_micros(1), Duration::from_millis(1))
    }
}

impl IdleStrategy for BackoffIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count > 0 {
            self.reset();
            return;
        }

        self.state = match self.state {
            BackoffState::Spinning(n) if n < self.max_spins => {
                std::hint::spin_loop();
                BackoffState::Spinning(n + 1)
            }
            BackoffState::Spinning(_) => BackoffState::Yielding(0),
            BackoffState::Yielding(n) if n < self.max_yields => {
                std::thread::yield_now();
                BackoffState::Yielding(n + 1)
            }
            BackoffState::Yielding(_) | BackoffState::Parking => {
                std::thread::park_timeout(self.park);
                self.park = self
                    .park
                    .checked_mul(2)
                    .unwrap_or(self.max_park)
                    .min(self.max_park);
                BackoffState::Parking
            }
        };
    }

    fn reset(&mut self) {
        self.state = BackoffState::Spinning(0);
        self.park = self.min_park;
    }

    fn name(&self) -> &'static str {
        "backoff"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_sleeping_only_sleeps_without_work() {
        let mut idle = SleepingIdleStrategy::new(Duration::from_millis(20));

        let start = Instant::now();
        idle.idle(3);
        assert!(start.elapsed() < Duration::from_millis(20));

        let start = Instant::now();
        idle.idle(0);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_backoff_escalates_to_parking() {
        let mut idle =
            BackoffIdleStrategy::new(2, 2, Duration::from_micros(10), Duration::from_micros(40));

        // 2 spins, transition, 2 yields, then park
        for _ in 0..5 {
            idle.idle(0);
            assert!(!idle.is_parking());
        }
        idle.idle(0);
        assert!(idle.is_parking());
        assert_eq!(idle.park_period(), Duration::from_micros(20));

        idle.idle(0);
        idle.idle(0);
        idle.idle(0);
        assert_eq!(idle.park_period(), Duration::from_micros(40));
    }

    #[test]
    fn test_backoff_resets_on_work() {
        let mut idle =
            BackoffIdleStrategy::new(0, 0, Duration::from_micros(1), Duration::from_micros(8));
        for _ in 0..6 {
            idle.idle(0);
        }
        assert!(idle.is_parking());

        idle.idle(1);
        assert!(!idle.is_parking());
        assert_eq!(idle.park_period(), Duration::from_micros(1));
    }

    #[test]
    fn test_zero_periods_are_raised() {
        let sleeping = SleepingIdleStrategy::new(Duration::ZERO);
        assert_eq!(sleeping.period(), MIN_SLEEP);

        let mut idle = BackoffIdleStrategy::new(0, 0, Duration::ZERO, Duration::from_micros(4));
        assert_eq!(idle.park_period(), MIN_PARK);
        for _ in 0..4 {
            idle.idle(0);
        }
        assert_eq!(idle.park_period(), Duration::from_micros(4));
    }
}
