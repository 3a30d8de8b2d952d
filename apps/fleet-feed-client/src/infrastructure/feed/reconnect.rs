//! Reconnection Policy
//!
//! Implements capped exponential backoff for feed reconnection.
//!
//! The attempt counter is incremented before the delay is computed, so the
//! n-th retry waits `min(initial_delay * multiplier^n, max_delay)`. With the
//! defaults (1 s base, doubling, 30 s cap) the first retry waits 2 s.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay the exponential growth starts from.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `ReconnectSettings`.
    #[must_use]
    pub const fn from_settings(settings: &crate::ReconnectSettings) -> Self {
        Self {
            initial_delay: settings.delay_initial,
            max_delay: settings.delay_max,
            multiplier: settings.delay_multiplier,
            jitter_factor: settings.jitter_factor,
            max_attempts: settings.max_attempts,
        }
    }
}

/// Reconnection policy implementing capped exponential backoff.
///
/// # Example
///
/// ```rust
/// use fleet_feed_client::infrastructure::feed::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// assert_eq!(policy.attempt_count(), 1);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Count one more attempt and return the delay before it.
    ///
    /// Returns `None` once max attempts have been used up.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempt_count += 1;
        let delay = self.delay_for_attempt(self.attempt_count);
        Some(self.apply_jitter(delay))
    }

    /// Un-jittered delay for the given 1-based attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);

        #[allow(clippy::cast_precision_loss)]
        let base_millis = self.config.initial_delay.as_millis() as f64;
        let scaled = (base_millis * self.config.multiplier.powi(exponent)).round();

        let max_millis = self.config.max_delay.as_millis();
        let millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else if scaled.is_infinite() && scaled > 0.0 {
            max_millis
        } else {
            0
        };

        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Apply jitter to a duration, never exceeding `max_delay`.
    ///
    /// Factors above 1.0 are treated as 1.0; NaN, infinite and non-positive
    /// factors disable jitter.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * factor.min(1.0);
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64).min(self.config.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    fn exact(initial_ms: u64, max_ms: u64, max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.jitter_factor.abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn policy_exponential_backoff() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        // Counter increments before the delay is computed
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(4)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(8)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(16)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn policy_max_delay_cap() {
        let mut policy = ReconnectPolicy::new(exact(1000, 3000, 0));

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(2000)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(3000)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn policy_max_attempts() {
        let mut policy = ReconnectPolicy::new(exact(100, 1000, 3));

        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 1);

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 3);

        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
        assert_eq!(policy.attempt_count(), 3);
    }

    #[test]
    fn policy_reset() {
        let mut policy = ReconnectPolicy::new(exact(100, 10_000, 3));

        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert!(policy.should_retry());
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn policy_jitter_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                jitter_factor: 0.1,
                max_attempts: 0,
                ..ReconnectConfig::default()
            });

            let millis = policy.next_delay().unwrap().as_millis();

            assert!(millis >= 1800, "delay {millis}ms is below minimum 1800ms");
            assert!(millis <= 2200, "delay {millis}ms is above maximum 2200ms");
        }
    }

    #[test]
    fn jitter_stays_under_cap() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                jitter_factor: 0.5,
                max_attempts: 0,
                ..ReconnectConfig::default()
            });

            for _ in 0..8 {
                assert!(policy.next_delay().unwrap() <= Duration::from_secs(30));
            }
        }
    }

    #[test_case(f64::NAN ; "nan")]
    #[test_case(f64::INFINITY ; "infinity")]
    #[test_case(f64::NEG_INFINITY ; "negative infinity")]
    #[test_case(-0.5 ; "negative")]
    fn unusable_jitter_factor_is_ignored(jitter_factor: f64) {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            jitter_factor,
            ..ReconnectConfig::default()
        });

        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn unlimited_attempts() {
        let mut policy = ReconnectPolicy::new(exact(1000, 30_000, 0));

        for _ in 0..1000 {
            assert!(policy.should_retry());
            assert!(policy.next_delay().unwrap() <= Duration::from_secs(30));
        }
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(
            initial_ms in 1u64..10_000,
            max_ms in 1u64..120_000,
            attempt in 1u32..200,
        ) {
            let policy = ReconnectPolicy::new(exact(initial_ms, max_ms, 0));
            prop_assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(max_ms));
        }

        #[test]
        fn jittered_delay_never_exceeds_cap(
            initial_ms in 1u64..10_000,
            max_ms in 1u64..120_000,
            jitter_factor in 0.0f64..2.0,
            attempts in 1usize..20,
        ) {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                jitter_factor,
                ..exact(initial_ms, max_ms, 0)
            });
            for _ in 0..attempts {
                let delay = policy.next_delay().unwrap();
                prop_assert!(delay <= Duration::from_millis(max_ms));
            }
        }

        #[test]
        fn delay_is_monotonic(
            initial_ms in 1u64..10_000,
            max_ms in 1u64..120_000,
            attempt in 1u32..100,
        ) {
            let policy = ReconnectPolicy::new(exact(initial_ms, max_ms, 0));
            prop_assert!(policy.delay_for_attempt(attempt) <= policy.delay_for_attempt(attempt + 1));
        }
    }
}
