use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterSnapshot {
    pub min_interval: Duration,
    /// Estimated wait until the next batch may start (ms), if any.
    pub estimated_wait_ms: Option<u64>,
}

/// Wait required before the next batch may start.
///
/// Zero when no batch has started yet or `min_interval` has already elapsed
/// since `last_start`.
pub fn wait_before_next(last_start: Option<Instant>, min_interval: Duration, now: Instant) -> Duration {
    match last_start {
        None => Duration::ZERO,
        Some(started) => (started + min_interval).saturating_duration_since(now),
    }
}

/// Batch-start spacer.
///
/// Holds the start time of the previous batch and enforces a minimum interval
/// before the next one. Only one batch runs under a limiter at a time; the
/// owner records the new start after each dispatch.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_start: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn last_start(&self) -> Option<Instant> {
        self.last_start
    }

    /// Pure: the wait required at `now`.
    pub fn wait_duration(&self, now: Instant) -> Duration {
        wait_before_next(self.last_start, self.min_interval, now)
    }

    /// Sleep until the next batch may start. Returns how long it slept.
    pub async fn wait(&self) -> Duration {
        let wait = self.wait_duration(Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        wait
    }

    /// Record the start of a dispatch. Later starts replace earlier ones.
    pub fn record_start(&mut self, at: Instant) {
        self.last_start = Some(match self.last_start {
            Some(prev) if prev > at => prev,
            _ => at,
        });
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let wait = self.wait_duration(Instant::now());
        RateLimiterSnapshot {
            min_interval: self.min_interval,
            estimated_wait_ms: (!wait.is_zero()).then(|| wait.as_millis() as u64),
        }
    }
}
