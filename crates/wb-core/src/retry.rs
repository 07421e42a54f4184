//! Transient-failure detection and retry backoff
//!
//! Whether a failed connection attempt is worth retrying is decided by a
//! fixed set of substrings. This is a heuristic, not a guarantee.

use std::time::Duration;

/// Lowercase substrings that mark an error as transient
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "timeout",
    "timed out",
    "temporary failure",
    "network unreachable",
    "network is unreachable",
    "service unavailable",
    "too many requests",
    "rate limit exceeded",
];

/// Check a rendered error message against the transient patterns
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Exponential backoff for caller-level retries
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    jitter: f64,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            current: initial,
            max,
            multiplier,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Get the next delay and advance the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.multiplier);
        self.current = std::cmp::min(next, self.max);

        let jitter_amount = delay.as_secs_f64() * self.jitter * rand::random::<f64>();
        delay + Duration::from_secs_f64(jitter_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_patterns() {
        assert!(is_transient_message("dial tcp: Connection refused"));
        assert!(is_transient_message("operation timed out"));
        assert!(is_transient_message("Temporary failure in name resolution"));
        assert!(is_transient_message("Network is unreachable (os error 101)"));
        assert!(is_transient_message("429 Too Many Requests"));
        assert!(!is_transient_message("authentication rejected for user 'bob'"));
        assert!(!is_transient_message("control socket not accessible"));
    }

    #[test]
    fn test_backoff_increases() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 2.0, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_max() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(30), Duration::from_secs(60), 2.0, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }
}
