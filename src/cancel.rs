//! Cooperative cancellation and bounded backoff
//!
//! Both the publish loop and the ingest loop receive a [`CancelToken`]
//! explicitly. The only place that flips it from outside is the top-level
//! interrupt handler installed by [`CancelToken::cancel_on_interrupt`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
}

/// Shared stop signal for long-running loops
///
/// Cloning is cheap; all clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake every sleeper
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for up to `timeout`, waking early on cancellation
    ///
    /// Returns `true` if the token was cancelled.
    pub fn sleep(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }

        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .inner
                .wakeup
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
    }

    /// Cancel this token when the process receives an interrupt
    pub fn cancel_on_interrupt(&self) -> std::io::Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            tracing::info!("Interrupt received, stopping");
            token.cancel();
        })
        .map_err(|e| std::io::Error::other(format!("Failed to install interrupt handler: {}", e)))
    }
}

/// Smallest delay a [`Backoff`] starts from
pub const MIN_BACKOFF: Duration = Duration::from_micros(1);

/// Bounded exponential backoff
///
/// Starts at `min` (raised to [`MIN_BACKOFF`]), doubles on every call to
/// [`Backoff::next_delay`] and saturates at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(MIN_BACKOFF);
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    /// Delay to wait now; the following delay doubles
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(2)
            .unwrap_or(self.max)
            .min(self.max)
            .max(self.min);
        delay
    }

    /// Sleep for the next delay unless cancelled first
    ///
    /// Returns `true` if the token was cancelled.
    pub fn wait(&mut self, cancel: &CancelToken) -> bool {
        let delay = self.next_delay();
        cancel.sleep(delay)
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// Longest single wait this backoff can produce
    pub fn max_delay(&self) -> Duration {
        self.max
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1), Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
    }

    #[test]
    fn test_backoff_zero_min_still_escalates() {
        let mut backoff = Backoff::new(Duration::ZERO, Duration::from_millis(3));
        let delays: Vec<_> = (0..16).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays[0], MIN_BACKOFF);
        assert!(delays.iter().all(|d| !d.is_zero()));
        assert_eq!(delays[15], Duration::from_millis(3));
    }

    #[test]
    fn test_sleep_without_cancel_runs_to_timeout() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_wakes_sleeper() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let cancelled = sleeper.sleep(Duration::from_secs(10));
            (cancelled, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let (cancelled, elapsed) = handle.join().unwrap();
        assert!(cancelled);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_cancelled_token_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.sleep(Duration::from_secs(10)));
    }
}
