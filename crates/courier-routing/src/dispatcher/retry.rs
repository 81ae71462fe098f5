use crate::config::RetryConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Exponential backoff between attempts against one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Policy starting at `base_delay` and never waiting longer than `max_delay`.
    pub const fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Policy from the retry section of the configuration.
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay after the `failed_attempt`-th failure: `base * 2^(n-1)`, capped.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1_u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Overall time budget of one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Starts the clock. `None` means unbounded.
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Configured budget.
    pub const fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Time since the dispatch started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.limit
            .map(|limit| limit.saturating_sub(self.started.elapsed()))
    }

    /// Whether the budget is used up.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|remaining| remaining.is_zero())
    }

    /// `bound` clipped to the time left, and whether clipping happened.
    pub fn clip(&self, bound: Duration) -> (Duration, bool) {
        match self.remaining() {
            Some(remaining) if remaining < bound => (remaining, true),
            _ => (bound, false),
        }
    }

    /// Whether a wait of `delay` still leaves time for another attempt.
    pub fn allows_wait(&self, delay: Duration) -> bool {
        self.remaining().is_none_or(|remaining| remaining > delay)
    }
}
