//! Bounded retry for UI steps

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no delay
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.delay_ms;
        let ms = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Linear => base.saturating_mul(attempt as u64),
            Backoff::Exponential => base.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16)),
        };
        Duration::from_millis(ms)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays() {
        let mut policy = RetryPolicy { max_attempts: 4, delay_ms: 100, backoff: Backoff::Fixed };
        assert_eq!(policy.delay_after(3), Duration::from_millis(100));
        policy.backoff = Backoff::Linear;
        assert_eq!(policy.delay_after(3), Duration::from_millis(300));
        policy.backoff = Backoff::Exponential;
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_attempts_never_zero() {
        let policy = RetryPolicy { max_attempts: 0, ..RetryPolicy::default() };
        assert_eq!(policy.attempts(), 1);
        assert_eq!(RetryPolicy::none().attempts(), 1);
    }
}
