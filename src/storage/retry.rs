use std::time::Duration;

/// Decides what happens to a batch the backend refused to write.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Number of failed flushes after which an entry is given up on. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for the backoff.
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = constant delay, 2.0 = double each time).
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(8),
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Keeps retrying with a constant delay and never drops anything.
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Whether an entry that has already failed `failed_attempts` times may be queued again.
    pub fn allows(&self, failed_attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| failed_attempts < max)
    }

    /// Delay before the retry that follows the `failed_attempts`-th failure (counting from 1).
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}
