//! Bounded retry with backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base × attempt`
    Linear(Duration),
    /// `base × 2^(attempt - 1)`
    Exponential(Duration),
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Backoff::Linear(base) => base.saturating_mul(attempt),
            Backoff::Exponential(base) => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear(base),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential(base),
        }
    }

    /// Single attempt, no waiting.
    pub fn once() -> Self {
        Self::linear(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. The error of the final
    /// attempt is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            log::debug!("{label}: attempt {attempt}/{max_attempts}");
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    log::warn!("{label}: attempt {attempt}/{max_attempts} failed, giving up: {e}");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.backoff.delay(attempt);
                    let cause = if e.is_transport() { "network" } else { "content" };
                    log::warn!(
                        "{label}: attempt {attempt}/{max_attempts} failed ({cause}): {e}; retrying in {:?}",
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_linear_delay() {
        let backoff = Backoff::Linear(Duration::from_secs(5));
        assert_eq!(backoff.delay(1), Duration::from_secs(5));
        assert_eq!(backoff.delay(2), Duration::from_secs(10));
        assert_eq!(backoff.delay(3), Duration::from_secs(15));
    }

    #[test]
    fn test_exponential_delay() {
        let backoff = Backoff::Exponential(Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert!(backoff.delay(64) >= Duration::from_secs(u32::MAX as u64));
    }

    #[tokio::test]
    async fn test_always_failing_op_runs_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(3, Duration::ZERO);

        let result: Result<()> = policy
            .run("always fails", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::status("https://a.example", 502)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(5, Duration::ZERO);

        let value = policy
            .run("flaky", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(AppError::status("https://a.example", 500))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(0, Duration::ZERO);
        let _ = policy
            .run("zero", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, AppError>(()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
