use std::time::Duration;

/// Bounded retry with a capped exponential delay.
///
/// A `multiplier` of 1 gives a fixed delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }

    /// Delay to wait after the given zero-based failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `f` until it succeeds or the attempt budget is spent.
    ///
    /// Intermediate failures are logged at debug level; the final one is
    /// returned to the caller untouched, who decides how loud to be.
    pub fn run<F, T, E>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: std::fmt::Display,
    {
        self.run_if(operation, |_| true, f)
    }

    /// Like [`RetryPolicy::run`], but gives up at once on errors that
    /// `retryable` rejects.
    pub fn run_if<F, R, T, E>(&self, operation: &str, retryable: R, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < attempts && retryable(&e) => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                        operation,
                        attempt + 1,
                        attempts,
                        e,
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
