//! Rate limiter implementation using token bucket algorithm
//!
//! Spaces outbound deliveries so the notification sink never sees more than
//! `burst` messages per refill interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Messages allowed per refill interval
    pub burst: usize,
    /// Refill interval for tokens. Zero disables limiting.
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            burst: 1,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    pub fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst.max(1);
        self
    }

    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }
}

/// Rate limiter using token bucket algorithm
///
/// # Example
///
/// ```
/// use orb_signal::common::{RateLimiter, RateLimiterConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let limiter = RateLimiter::new(
///         RateLimiterConfig::default().with_refill_interval(Duration::from_millis(10)),
///     );
///
///     // Wait for a token before each delivery
///     limiter.acquire().await;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    burst: usize,
    last_refill: Arc<Mutex<Instant>>,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let burst = config.burst.max(1);
        Self {
            permits: Arc::new(Semaphore::new(burst)),
            burst,
            last_refill: Arc::new(Mutex::new(Instant::now())),
            refill_interval: config.refill_interval,
        }
    }

    /// One delivery per `interval`
    pub fn per_interval(interval: Duration) -> Self {
        Self::new(RateLimiterConfig::default().with_refill_interval(interval))
    }

    /// Wait until a token is available and consume it
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire().await {
                return;
            }
            let wait = self.until_refill().await;
            sleep(wait).await;
        }
    }

    /// Consume a token if one is available right now
    pub async fn try_acquire(&self) -> bool {
        if self.refill_interval.is_zero() {
            return true;
        }
        self.try_refill().await;
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn burst(&self) -> usize {
        self.burst
    }

    async fn until_refill(&self) -> Duration {
        let last_refill = self.last_refill.lock().await;
        self.refill_interval
            .saturating_sub(last_refill.elapsed())
            .max(Duration::from_millis(1))
    }

    async fn try_refill(&self) {
        let mut last_refill = self.last_refill.lock().await;
        let elapsed = last_refill.elapsed();
        if elapsed < self.refill_interval {
            return;
        }

        let intervals = (elapsed.as_nanos() / self.refill_interval.as_nanos()).max(1);
        let current = self.permits.available_permits();
        let to_add = usize::try_from(intervals)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.burst)
            .min(self.burst.saturating_sub(current));
        if to_add > 0 {
            self.permits.add_permits(to_add);
        }
        *last_refill = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = RateLimiterConfig::default()
            .with_burst(0)
            .with_refill_interval(Duration::from_millis(500));
        assert_eq!(config.burst, 1);
        assert_eq!(config.refill_interval, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_try_acquire_exhausted() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_burst(2)
                .with_refill_interval(Duration::from_secs(60)),
        );
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert_eq!(limiter.available_permits(), 0);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::per_interval(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_refill_never_exceeds_burst() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::default()
                .with_burst(2)
                .with_refill_interval(Duration::from_millis(10)),
        );
        sleep(Duration::from_millis(50)).await;
        assert!(limiter.try_acquire().await);
        assert!(limiter.available_permits() <= 1);
    }

    #[tokio::test]
    async fn test_zero_interval_is_unlimited() {
        let limiter = RateLimiter::per_interval(Duration::ZERO);
        for _ in 0..100 {
            assert!(limiter.try_acquire().await);
        }
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let first = RateLimiter::per_interval(Duration::from_secs(60));
        let second = first.clone();
        assert!(first.try_acquire().await);
        assert!(!second.try_acquire().await);
    }
}
