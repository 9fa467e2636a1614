use std::time::Duration;

/// Exponential backoff schedule for failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Unit delay; retry `n` waits `base_delay * 2^n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Delay before the next retry, or `None` once retries are exhausted
    pub fn next_delay(&self, retries_done: u32) -> Option<Duration> {
        if retries_done < self.max_retries {
            Some(self.delay_for(retries_done + 1))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..4)
            .filter_map(|done| policy.next_delay(done))
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![120, 240, 480]);
    }

    #[test]
    fn test_exhausted() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
        };
        assert_eq!(policy.next_delay(0), Some(Duration::from_millis(20)));
        assert_eq!(policy.next_delay(1), None);
    }

    #[test]
    fn test_no_retries() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..Default::default()
        };
        assert_eq!(policy.next_delay(0), None);
    }
}
