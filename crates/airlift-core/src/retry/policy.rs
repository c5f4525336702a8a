//! Backoff policies and delay calculation

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy for a retried operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackoffPolicy {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff strategy
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Base delay in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: BackoffStrategy::default(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}

/// Backoff strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffStrategy {
    /// No delay between attempts
    None,

    /// Fixed delay between attempts
    Fixed,

    /// Exponential backoff (default)
    #[default]
    Exponential,
}

/// Calculate the delay before the next retry attempt
///
/// `attempt` is 1-indexed: the delay returned is the wait after that attempt
/// failed. Exponential delays are capped at `max_delay_ms`; jitter adds up to
/// 25% random variation to spread out retry storms.
pub fn delay_for_attempt(policy: &BackoffPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        BackoffStrategy::None => 0,
        BackoffStrategy::Fixed => policy.base_delay_ms,
        BackoffStrategy::Exponential => {
            let multiplier = policy.multiplier.powf(attempt_index as f64);
            (policy.base_delay_ms as f64 * multiplier) as u64
        }
    };

    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let final_delay_ms = if jitter && capped_delay_ms > 0 {
        let jitter_range = capped_delay_ms / 4;
        let jitter_value = rand::rng().random_range(0..=jitter_range);
        capped_delay_ms + jitter_value
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential_policy() -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: 5,
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_defaults_match_download_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 30_000);
        assert_eq!(policy.strategy, BackoffStrategy::Exponential);
    }

    #[test]
    fn test_none_strategy() {
        let policy = BackoffPolicy {
            strategy: BackoffStrategy::None,
            ..exponential_policy()
        };

        assert_eq!(delay_for_attempt(&policy, 1, false), Duration::ZERO);
        assert_eq!(delay_for_attempt(&policy, 3, false), Duration::ZERO);
    }

    #[test]
    fn test_fixed_strategy() {
        let policy = BackoffPolicy {
            strategy: BackoffStrategy::Fixed,
            ..exponential_policy()
        };

        assert_eq!(
            delay_for_attempt(&policy, 1, false),
            Duration::from_millis(1000)
        );
        assert_eq!(
            delay_for_attempt(&policy, 3, false),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_exponential_strategy() {
        let policy = exponential_policy();

        // attempt 1: 1000 * 2^0 = 1000
        assert_eq!(
            delay_for_attempt(&policy, 1, false),
            Duration::from_millis(1000)
        );
        // attempt 2: 1000 * 2^1 = 2000
        assert_eq!(
            delay_for_attempt(&policy, 2, false),
            Duration::from_millis(2000)
        );
        // attempt 4: 1000 * 2^3 = 8000
        assert_eq!(
            delay_for_attempt(&policy, 4, false),
            Duration::from_millis(8000)
        );
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = BackoffPolicy {
            max_attempts: 10,
            ..exponential_policy()
        };

        // attempt 7: 1000 * 2^6 = 64000, capped at 30000
        assert_eq!(
            delay_for_attempt(&policy, 7, false),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = BackoffPolicy {
            strategy: BackoffStrategy::Fixed,
            ..exponential_policy()
        };

        // With jitter, delay should be between base and base + 25%
        for _ in 0..100 {
            let delay = delay_for_attempt(&policy, 1, true);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_jitter_no_effect_on_zero_delay() {
        let policy = BackoffPolicy {
            strategy: BackoffStrategy::None,
            ..exponential_policy()
        };

        assert_eq!(delay_for_attempt(&policy, 1, true), Duration::ZERO);
    }
}
