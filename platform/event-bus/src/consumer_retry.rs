//! Consumer retry policy with exponential backoff
//!
//! Decides how long a consumer waits before retrying a message that failed
//! to process, and when a message that keeps failing has used up its budget
//! and should be moved to the dead-letter store.

use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts allowed before a permanently failing message is dead-lettered.
    /// `0` means never give up.
    pub max_attempts: u32,
    /// Initial backoff duration (doubles on each retry)
    pub initial_backoff: Duration,
    /// Maximum backoff duration to cap exponential growth
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before the next try after `attempts` failed attempts
    ///
    /// `initial_backoff * 2^(attempts-1)`, capped at `max_backoff`.
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempts - 1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Whether a message that failed `attempts` times has used its budget
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        };

        assert_eq!(config.backoff_for(0), Duration::ZERO);
        assert_eq!(config.backoff_for(1), Duration::from_millis(10));
        assert_eq!(config.backoff_for(2), Duration::from_millis(20));
        assert_eq!(config.backoff_for(3), Duration::from_millis(40));
        // Capped
        assert_eq!(config.backoff_for(4), Duration::from_millis(50));
        assert_eq!(config.backoff_for(200), Duration::from_millis(50));
    }

    #[test]
    fn test_backoff_survives_overflow() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(u64::MAX / 2),
            max_backoff: Duration::from_secs(60),
        };
        assert_eq!(config.backoff_for(8), Duration::from_secs(60));
    }

    #[test]
    fn test_is_exhausted() {
        let config = RetryConfig::default();
        assert!(!config.is_exhausted(1));
        assert!(!config.is_exhausted(2));
        assert!(config.is_exhausted(3));
        assert!(config.is_exhausted(4));

        let unbounded = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert!(!unbounded.is_exhausted(1_000));
    }
}
