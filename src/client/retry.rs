//! Connect retry policy
//!
//! `Client::start` makes up to `max_attempts` sequential connect attempts and
//! sleeps `delay_for(attempt)` after every failed attempt except the last.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay schedule between connect attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay after every failure
    Fixed { delay_ms: u64 },
    /// `initial_ms * multiplier^(attempt - 1)`, capped at `max_ms`
    Exponential {
        initial_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
    /// Explicit per-attempt delays, then `sustained_ms` once the steps run out
    Pattern { steps_ms: Vec<u64>, sustained_ms: u64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed { delay_ms: 5_000 }
    }
}

impl Backoff {
    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = match self {
            Backoff::Fixed { delay_ms } => *delay_ms,
            Backoff::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => {
                let exponent = attempt.saturating_sub(1).min(63) as i32;
                let scaled = (*initial_ms as f64) * multiplier.powi(exponent);
                if scaled.is_finite() {
                    (scaled as u64).min(*max_ms)
                } else {
                    *max_ms
                }
            }
            Backoff::Pattern {
                steps_ms,
                sustained_ms,
            } => {
                let index = attempt.saturating_sub(1) as usize;
                steps_ms.get(index).copied().unwrap_or(*sustained_ms)
            }
        };
        Duration::from_millis(millis)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Backoff::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => {
                if !multiplier.is_finite() || *multiplier < 1.0 {
                    return Err(format!(
                        "exponential backoff multiplier must be >= 1.0, got {multiplier}"
                    ));
                }
                if initial_ms > max_ms {
                    return Err(format!(
                        "exponential backoff initial_ms ({initial_ms}) exceeds max_ms ({max_ms})"
                    ));
                }
                Ok(())
            }
            Backoff::Fixed { .. } | Backoff::Pattern { .. } => Ok(()),
        }
    }
}

/// Bounded connect retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed {
                delay_ms: duration_millis(delay),
            },
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                initial_ms: duration_millis(initial),
                multiplier,
                max_ms: duration_millis(max),
            },
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay_for(attempt)
    }

    /// Whether another attempt follows failed attempt `attempt`
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Total time spent sleeping when every attempt fails
    pub fn max_total_delay(&self) -> Duration {
        (1..self.max_attempts).map(|attempt| self.delay_for(attempt)).sum()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        self.backoff.validate()
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_five_fixed_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
    }

    #[test]
    fn test_no_sleep_after_final_attempt() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
        assert_eq!(policy.max_total_delay(), Duration::from_secs(20));

        let single = RetryPolicy::fixed(1, Duration::from_secs(5));
        assert_eq!(single.max_total_delay(), Duration::ZERO);
    }

    #[test]
    fn test_exponential_backoff_caps_at_max() {
        let policy = RetryPolicy::exponential(
            10,
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(1_000),
        );
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_pattern_backoff_sustains_after_steps() {
        let backoff = Backoff::Pattern {
            steps_ms: vec![25, 50, 100, 250],
            sustained_ms: 250,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(25));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(5), Duration::from_millis(250));
        assert_eq!(backoff.delay_for(100), Duration::from_millis(250));
    }

    #[test]
    fn test_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::fixed(0, Duration::ZERO).validate().is_err());

        let shrinking = RetryPolicy::exponential(3, Duration::from_secs(1), 0.5, Duration::from_secs(2));
        assert!(shrinking.validate().is_err());

        let inverted =
            RetryPolicy::exponential(3, Duration::from_secs(5), 2.0, Duration::from_secs(1));
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: RetryPolicy = toml::from_str(
            r#"
max_attempts = 3

[backoff]
strategy = "pattern"
steps_ms = [10, 20]
sustained_ms = 40
"#,
        )
        .unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.max_total_delay(), Duration::from_millis(30));

        let defaulted: RetryPolicy = toml::from_str("max_attempts = 2").unwrap();
        assert_eq!(defaulted.backoff, Backoff::default());
    }
}
