//! Retry with backoff for LLM calls, and cooperative cancellation.
//!
//! One [`RetryPolicy`] is shared by the generation accumulator and the
//! curation batcher. Only transient errors are retried; anything else is
//! returned after the first attempt. Cancellation is a
//! [`CancellationToken`] observed before every retry and during backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use synthkit_shared::{Result, RetrySettings};

/// How often and how patiently to retry a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    max_attempts: u32,
    backoff: Duration,
    exponential: bool,
    max_backoff: Duration,
}

/// The final result of a retried operation and how many calls it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
    /// Retries stopped because the token was cancelled; `result` holds the
    /// last error.
    pub cancelled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
            exponential: true,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff: settings.backoff,
            exponential: settings.exponential,
            max_backoff: settings.max_backoff,
        }
    }
}

impl RetryPolicy {
    /// Fixed backoff between `max_attempts` total attempts.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            exponential: false,
            max_backoff: backoff,
        }
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Double the delay after each failure, capped at `max_backoff`.
    pub fn exponential(mut self, max_backoff: Duration) -> Self {
        self.exponential = true;
        self.max_backoff = max_backoff.max(self.backoff);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.backoff;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with a non-transient error,
    /// runs out of attempts, or `cancel` fires between attempts.
    pub async fn run<F, Fut, T>(&self, cancel: &CancellationToken, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        cancelled: false,
                    };
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => err,
                Err(err) => {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                        cancelled: false,
                    };
                }
            };

            let delay = self.delay_after(attempt);
            debug!(
                attempt,
                max_attempts = self.max_attempts,
                backoff_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            let interrupted = cancel.is_cancelled()
                || tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
            if interrupted {
                debug!(attempt, "cancelled while waiting to retry");
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                    cancelled: true,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use synthkit_shared::SynthError;

    use super::*;

    #[test]
    fn exponential_delay_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100)).exponential(Duration::from_millis(350));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
        assert_eq!(policy.delay_after(40), Duration::from_millis(350));
    }

    #[test]
    fn fixed_delay_stays_fixed() {
        let policy = RetryPolicy::new(3, Duration::from_millis(50));
        assert_eq!(policy.delay_after(1), policy.delay_after(2));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let outcome = policy
            .run(&CancellationToken::new(), move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(SynthError::Provider("503".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let outcome: RetryOutcome<()> = policy
            .run(&CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SynthError::MalformedResponse("no json".into()))
            })
            .await;

        assert!(matches!(outcome.result, Err(SynthError::MalformedResponse(_))));
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_rejections() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(5, Duration::ZERO);

        let outcome: RetryOutcome<()> = policy
            .run(&CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SynthError::ProviderRejected("401".into()))
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::new(5, Duration::from_secs(30));

        let outcome: RetryOutcome<()> = policy
            .run(&cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SynthError::Provider("503".into()))
            })
            .await;

        assert!(outcome.cancelled);
        assert!(matches!(outcome.result, Err(SynthError::Provider(_))));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelling_mid_attempt_skips_the_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let policy = RetryPolicy::new(3, Duration::from_secs(3600));

        let started = std::time::Instant::now();
        let outcome: RetryOutcome<()> = policy
            .run(&cancel, move || {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    Err(SynthError::Provider("timeout".into()))
                }
            })
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.attempts, 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
