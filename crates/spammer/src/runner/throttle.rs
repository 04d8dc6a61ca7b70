//! Per-second submission ceiling.

use tokio::time::{Duration, Instant};
use tracing::trace;

const WINDOW: Duration = Duration::from_secs(1);

/// Counts processed accounts and, every `tps`-th one, sleeps out whatever
/// is left of the current one-second window.
///
/// This is a ceiling only. A slow window is never compensated for later.
#[derive(Debug)]
pub struct RateLimiter {
    tps: u64,
    count: u64,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(tps: u64) -> Self {
        Self {
            tps: tps.max(1),
            count: 0,
            window_start: Instant::now(),
        }
    }

    /// Record one processed account, waiting if the window's quota is used up.
    /// Returns true if it slept.
    pub async fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count < self.tps {
            return false;
        }

        let elapsed = self.window_start.elapsed();
        let slept = elapsed < WINDOW;
        if slept {
            trace!(sent = self.count, wait = ?(WINDOW - elapsed), "Rate limit reached");
            tokio::time::sleep(WINDOW - elapsed).await;
        }

        self.count = 0;
        self.window_start = Instant::now();
        slept
    }

    pub fn tps(&self) -> u64 {
        self.tps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_out_the_window() {
        let mut limiter = RateLimiter::new(3);
        let start = Instant::now();

        assert!(!limiter.tick().await);
        assert!(!limiter.tick().await);
        assert!(limiter.tick().await);
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        // Next window starts after the sleep.
        for _ in 0..3 {
            limiter.tick().await;
        }
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_window_does_not_sleep() {
        let mut limiter = RateLimiter::new(2);
        let start = Instant::now();

        limiter.tick().await;
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(!limiter.tick().await);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_over_many_windows() {
        let mut limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..50 {
            limiter.tick().await;
        }
        // 50 ticks at 5 per second cannot finish in under ten seconds.
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[test]
    fn test_zero_tps_is_clamped() {
        assert_eq!(RateLimiter::new(0).tps(), 1);
    }
}
