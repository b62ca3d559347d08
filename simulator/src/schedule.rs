use std::time::Duration;

/// Smallest step backoff grows from, so a zero interval still backs off.
const MIN_BACKOFF: Duration = Duration::from_secs(1);

/// Delay between cycles. Consecutive transient failures double the base
/// interval up to `max_backoff`; a success resets it.
#[derive(Debug, Clone)]
pub struct Schedule {
    interval: Duration,
    max_jitter: Duration,
    max_backoff: Duration,
    failures: u32,
}

impl Schedule {
    pub fn new(interval: Duration, max_jitter: Duration, max_backoff: Duration) -> Self {
        Self {
            interval,
            max_jitter,
            max_backoff,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// `jitter` is clamped to the configured maximum.
    pub fn next_delay(&self, jitter: Duration) -> Duration {
        let base = if self.failures == 0 {
            self.interval
        } else {
            let step = self.interval.max(MIN_BACKOFF);
            let factor = 1u32.checked_shl(self.failures.min(16)).unwrap_or(u32::MAX);
            step.saturating_mul(factor).min(self.max_backoff.max(step))
        };
        base.saturating_add(jitter.min(self.max_jitter))
    }
}
