//! Injected time source and debouncing
//!
//! Nothing in the crate reads ambient time directly. Production code uses
//! `SystemClock`; tests use `ManualClock`, whose `sleep` advances time
//! instantly so bounded retry budgets can be fast-forwarded.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Milliseconds since the Unix epoch plus an async sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;

    async fn sleep(&self, ms: u64);
}

/// Wall-clock time and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }

    async fn sleep(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

/// A clock that only moves when told to (or when slept on).
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, ms: u64) {
        self.advance(ms);
    }
}

/// Trailing-edge debounce over an injected clock.
///
/// Every `notify` restarts the quiet period; `take_ready` fires once the
/// period has elapsed since the last notification.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay_ms: u64,
    last_notified: Option<u64>,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            last_notified: None,
        }
    }

    pub fn notify(&mut self, now_ms: u64) {
        self.last_notified = Some(now_ms);
    }

    pub fn is_pending(&self) -> bool {
        self.last_notified.is_some()
    }

    pub fn ready(&self, now_ms: u64) -> bool {
        self.last_notified
            .map(|t| now_ms >= t.saturating_add(self.delay_ms))
            .unwrap_or(false)
    }

    /// True (and reset) if the quiet period has elapsed.
    pub fn take_ready(&mut self, now_ms: u64) -> bool {
        if self.ready(now_ms) {
            self.last_notified = None;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) {
        self.last_notified = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_clock_sleep_advances() {
        let clock = ManualClock::new(1_000);
        clock.sleep(250).await;
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(0);
        let other = clock.clone();
        clock.advance(10);
        assert_eq!(other.now_ms(), 10);
    }

    #[test]
    fn debouncer_waits_for_quiet_period() {
        let mut d = Debouncer::new(300);
        assert!(!d.take_ready(0));

        d.notify(0);
        assert!(!d.take_ready(100));
        d.notify(200);
        assert!(!d.take_ready(400));
        assert!(d.take_ready(500));
        assert!(!d.is_pending());
        assert!(!d.take_ready(900));
    }

    #[test]
    fn cancel_drops_pending_notification() {
        let mut d = Debouncer::new(10);
        d.notify(0);
        d.cancel();
        assert!(!d.ready(100));
    }
}
