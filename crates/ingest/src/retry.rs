use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};
use triage_core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// `delay * attempt` after the n-th failed attempt.
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn linear(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Linear,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Linear => self.delay.saturating_mul(attempt),
        }
    }
}

/// Runs `call` until it succeeds, fails with a non-transient error, or the policy
/// runs out of attempts. Never sleeps after the last attempt.
pub async fn with_retries<T, F, Fut>(op: &str, policy: RetryPolicy, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    op,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error_kind = e.kind(),
                    error = %e,
                    retry_in = ?delay,
                    "attempt failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                error!(
                    op,
                    attempt,
                    error_kind = e.kind(),
                    error = %e,
                    "attempts exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                error!(
                    op,
                    attempt,
                    error_kind = e.kind(),
                    error = %e,
                    "failed without retry"
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;
    use triage_core::error::TriageError;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn exhausts_without_trailing_sleep() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let res: Result<()> = with_retries("test", RetryPolicy::fixed(3, Duration::from_secs(1)), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TriageError::Unavailable("connection reset".into()))
            }
        })
        .await;

        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn parse_errors_fail_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let res: Result<()> = with_retries("test", RetryPolicy::fixed(3, Duration::from_secs(1)), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TriageError::Parse("unexpected token".into()))
            }
        })
        .await;

        assert!(matches!(res, Err(TriageError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let res = with_retries("test", RetryPolicy::linear(3, Duration::from_secs(2)), || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TriageError::Unavailable("pod restarting".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(res.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn linear_backoff_grows() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(2));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }
}
