//! Bounded retry with exponential backoff for model calls.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

/// How many times to attempt a call and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt` (0-based): `base_delay * 2^attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// Blocks the calling thread while backing off. The final error is returned
    /// with the attempt count attached.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(label, attempt = attempt + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt + 1 >= self.max_attempts => {
                    warn!(label, attempts = self.max_attempts, error = %format!("{err:#}"), "giving up");
                    return Err(err.context(format!(
                        "{label} failed after {} attempt(s)",
                        self.max_attempts
                    )));
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %format!("{err:#}"),
                        "attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    #[test]
    fn backoff_doubles_from_base_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.delay_after(0), Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = Cell::new(0);
        let value = policy
            .run("outline", |attempt| {
                calls.set(calls.get() + 1);
                if attempt < 2 {
                    Err(anyhow!("flaky"))
                } else {
                    Ok(attempt)
                }
            })
            .expect("third attempt succeeds");
        assert_eq!(value, 2);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn returns_last_error_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = Cell::new(0);
        let err = policy
            .run::<(), _>("outline", |attempt| {
                calls.set(calls.get() + 1);
                Err(anyhow!("boom {attempt}"))
            })
            .unwrap_err();
        assert_eq!(calls.get(), 3);
        let rendered = format!("{err:#}");
        assert!(rendered.contains("failed after 3 attempt(s)"));
        assert!(rendered.contains("boom 2"));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }
}
