use std::time::Duration;

/// How often, and how patiently, a failing step is retried.
///
/// Retries are scoped to a single step: a step that exhausts its budget
/// aborts the run, and earlier steps are never re-executed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Fail on the first tool execution error.
    #[default]
    None,
    /// Fixed delay between retries.
    Fixed { max_retries: u32, delay: Duration },
    /// Delay grows by `multiplier` per retry, capped at `max_delay`.
    ExponentialBackoff {
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    },
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed { max_retries, delay }
    }

    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries() > 0
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { max_retries, .. } => *max_retries,
            RetryPolicy::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }

    /// Delay before retry number `retry + 1` (zero-based), or `None` when
    /// the budget is spent.
    pub fn delay_for_retry(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries() {
            return None;
        }
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let factor = multiplier.checked_pow(retry).unwrap_or(u32::MAX);
                let delay = initial_delay.checked_mul(factor).unwrap_or(*max_delay);
                Some(delay.min(*max_delay))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_retries() {
        let policy = RetryPolicy::None;
        assert!(!policy.is_enabled());
        assert_eq!(policy.delay_for_retry(0), None);
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_retry(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_retry(2), None);
    }

    #[test]
    fn test_exponential_is_capped() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_retries: 40,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 3,
        };
        assert_eq!(policy.delay_for_retry(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_retry(2), Some(Duration::from_millis(900)));
        assert_eq!(policy.delay_for_retry(3), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_retry(39), Some(Duration::from_secs(1)));
    }
}
