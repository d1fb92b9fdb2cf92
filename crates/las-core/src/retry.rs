//! Reconnect schedule for supervised stream loops.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential backoff with jitter for reconnecting long-lived streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Maximum consecutive reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectPolicy {
    /// True once `attempt` consecutive failures exhaust the budget.
    #[must_use]
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }

    /// Delay before reconnection `attempt` (1-based), without jitter.
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay_ms`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Delay before reconnection `attempt` with 0-1000ms jitter added.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + Duration::from_millis(jitter_ms())
    }
}

fn jitter_ms() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(400));
        assert_eq!(policy.base_delay(5), Duration::from_millis(1_000));
        assert_eq!(policy.base_delay(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = ReconnectPolicy::default();
        let delay = policy.delay(1);
        assert!(delay >= Duration::from_millis(1_000));
        assert!(delay < Duration::from_millis(2_000));
    }

    #[test]
    fn test_exhaustion() {
        let infinite = ReconnectPolicy::default();
        assert!(!infinite.is_exhausted(u32::MAX));

        let bounded = ReconnectPolicy {
            max_attempts: 3,
            ..ReconnectPolicy::default()
        };
        assert!(!bounded.is_exhausted(2));
        assert!(bounded.is_exhausted(3));
    }
}
