//! Exponential backoff between connection attempts.
//!
//! The wait before a retry depends on how many consecutive failures have been
//! recorded for the address, not on the attempt number within one call, so a
//! TV that keeps refusing connections stays at the capped delay across calls.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tvremote_core::BackoffPolicy;
//!
//! let policy = BackoffPolicy::default();
//! assert_eq!(policy.delay_for_failures(1), Duration::from_secs(1));
//! assert_eq!(policy.delay_for_failures(2), Duration::from_secs(2));
//! assert_eq!(policy.delay_for_failures(3), Duration::from_secs(4));
//! assert_eq!(policy.delay_for_failures(9), Duration::from_secs(4));
//! ```

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

/// Configuration for backoff between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Backoff multiplier (2.0 doubles each time).
    pub multiplier: f64,
    /// Whether to add up to 25% random jitter (still capped at `max`).
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(4),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    /// No waiting between attempts.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Set the base delay.
    #[must_use]
    pub fn base(mut self, delay: Duration) -> Self {
        self.base = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub fn max(mut self, delay: Duration) -> Self {
        self.max = delay;
        self
    }

    /// Set the multiplier.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if self.max < self.base {
            return Err(Error::InvalidConfig(
                "max backoff must be >= base backoff".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::InvalidConfig(
                "backoff multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay to wait after `failures` consecutive failures.
    ///
    /// Zero failures yields the base delay (the fresh state).
    pub fn delay_for_failures(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max.as_secs_f64();
        let capped = delay.min(max);

        let final_delay = if self.jitter {
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            (capped * jitter_factor).min(max)
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_failures(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_failures(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_failures(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_failures(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_failures(4), Duration::from_secs(4));
    }

    #[test]
    fn test_non_decreasing_and_capped() {
        let policy = BackoffPolicy::default()
            .base(Duration::from_millis(300))
            .max(Duration::from_secs(10))
            .multiplier(1.5);
        let mut prev = Duration::ZERO;
        for n in 1..40 {
            let delay = policy.delay_for_failures(n);
            assert!(delay >= prev);
            assert!(delay <= policy.max);
            prev = delay;
        }
    }

    #[test]
    fn test_huge_failure_count_does_not_overflow() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_failures(u32::MAX), Duration::from_secs(4));
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let policy = BackoffPolicy::default().jitter(true);
        for _ in 0..100 {
            let delay = policy.delay_for_failures(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1250));
            assert!(policy.delay_for_failures(10) <= policy.max);
        }
    }

    #[test]
    fn test_validate() {
        assert!(BackoffPolicy::default().validate().is_ok());
        assert!(BackoffPolicy::none().validate().is_ok());

        let bad = BackoffPolicy::default().max(Duration::from_millis(10));
        assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))));

        let bad = BackoffPolicy::default().multiplier(0.5);
        assert!(bad.validate().is_err());
    }
}
