//! Retry budget for connection attempts.

use std::time::Duration;

/// Maximum RPC probes per attempt before giving up.
pub const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Base delay between probes (exponential backoff).
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Maximum delay between probes.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Wall-clock cap for one attempt, measured from `start`.
pub const MAX_CONNECT_DURATION: Duration = Duration::from_secs(120);

/// How long a daemon may keep answering "warming up".
pub const WARMUP_TIMEOUT: Duration = Duration::from_secs(600);

/// Poll interval while the daemon warms up.
pub const WARMUP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Interval between heartbeats once a session is established.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Bounds for one connection attempt.
///
/// Transport failures are absorbed until either `max_attempts` probes or
/// `max_duration` of wall-clock time have been spent. Warm-up answers do
/// not consume attempts; they have their own deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_duration: Duration,
    pub warmup_timeout: Duration,
    pub warmup_poll: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_CONNECT_ATTEMPTS,
            base_delay: RETRY_BASE_DELAY,
            max_delay: MAX_RETRY_DELAY,
            max_duration: MAX_CONNECT_DURATION,
            warmup_timeout: WARMUP_TIMEOUT,
            warmup_poll: WARMUP_POLL_INTERVAL,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Delay before probe number `failures + 1`.
    ///
    /// `base * 2^min(failures - 1, 6)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(6);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    #[must_use]
    pub fn exhausted(&self, failures: u32, elapsed: Duration) -> bool {
        failures >= self.max_attempts || elapsed >= self.max_duration
    }
}
