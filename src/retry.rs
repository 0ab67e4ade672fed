use std::time::Duration;

/// Dial/redial policy: how many attempts, and the fixed delay between them.
///
/// Applied to the initial dial and to recovery dials after a broken
/// connection is detected. A read failure mid-stream triggers one recovery
/// dial cycle, not an unbounded loop of reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum dial attempts. 0 means retry until cancelled.
    pub max_attempts: u32,
    /// Fixed delay between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Retry forever (until the connection lifetime is cancelled).
    pub fn unlimited(delay: Duration) -> Self {
        Self {
            max_attempts: 0,
            delay,
        }
    }

    /// Returns true when `attempt` (0-based, counting performed dials) has
    /// reached the configured limit.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(2));
    }

    #[test]
    fn test_exhaustion_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        assert!(!policy.exhausted(0));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }

    #[test]
    fn test_unlimited_never_exhausts() {
        let policy = RetryPolicy::unlimited(Duration::from_millis(10));
        assert!(!policy.exhausted(0));
        assert!(!policy.exhausted(u32::MAX));
    }
}
