use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// Jikan allows roughly two requests per second.
pub const JIKAN_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Spaces outbound requests at least `min_interval` apart across every caller
/// holding the same limiter. The lock is held through the wait, so callers are
/// released one at a time in lock order.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(JIKAN_MIN_INTERVAL)
    }
}
