//! Bounded retry loop with exponential backoff and jitter.
//!
//! Retry behavior is modeled as an explicit state machine over attempts:
//! `Attempt(n)` either succeeds, fails fatally (no further attempts), or
//! fails transiently and moves to `Attempt(n+1)` after a capped backoff
//! delay. Both the attempt count and the total backoff duration are
//! bounded, so no operation retries indefinitely.
//!
//! Cancellation is observed between attempts and while sleeping; an
//! in-flight attempt is abandoned via `select!` and its result discarded.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Classification hook consumed by [`run_with_retry`].
///
/// Implemented by the crate error types; `true` means the failure is
/// worth another attempt (rate limit, server error, timeout).
pub trait Transience {
    /// Whether this failure should be retried with backoff.
    fn is_transient(&self) -> bool;
}

/// Backoff/attempt limits for one retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (≥ 1).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
    /// Upper bound on a single backoff delay.
    pub max_delay: Duration,
    /// Upper bound on the sum of all backoff delays.
    pub max_total_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            max_total_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Builds the policy from env with defaults:
    /// `RETRY_MAX_ATTEMPTS` (3), `RETRY_BASE_MS` (250),
    /// `RETRY_MAX_DELAY_MS` (5000), `RETRY_MAX_TOTAL_MS` (30000).
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(k: &str, dflt: T) -> T {
            std::env::var(k)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(dflt)
        }
        Self {
            max_attempts: parse("RETRY_MAX_ATTEMPTS", 3u32).max(1),
            base_delay: Duration::from_millis(parse("RETRY_BASE_MS", 250u64)),
            max_delay: Duration::from_millis(parse("RETRY_MAX_DELAY_MS", 5_000u64)),
            max_total_backoff: Duration::from_millis(parse("RETRY_MAX_TOTAL_MS", 30_000u64)),
        }
    }

    /// Exponential backoff for a 1-based attempt number, capped at
    /// `max_delay`, with up to +25% multiplicative jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(1u32 << exp);
        let capped = raw.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.0..0.25f64);
        capped.mul_f64(1.0 + jitter)
    }
}

/// Terminal outcome of a failed retry loop.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Non-transient failure; surfaced immediately without retrying.
    #[error("fatal provider error: {0}")]
    Fatal(E),

    /// Attempt or backoff budget exhausted; carries the last failure.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts performed.
        attempts: u32,
        /// The last transient failure observed.
        last: E,
    },

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// Returns the wrapped provider error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Fatal(e) | RetryError::Exhausted { last: e, .. } => Some(e),
            RetryError::Cancelled => None,
        }
    }
}

/// Runs `op` under the given policy until success, a fatal error, an
/// exhausted budget, or cancellation.
///
/// `op` is invoked once per attempt; results of attempts abandoned due
/// to cancellation are discarded.
///
/// # Errors
/// - [`RetryError::Fatal`] on the first non-transient failure
/// - [`RetryError::Exhausted`] when attempts or total backoff run out
/// - [`RetryError::Cancelled`] when `cancel` fires
pub async fn run_with_retry<T, E, Op, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transience + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut slept = Duration::ZERO;
    let mut attempt = 1u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            res = op() => res,
        };

        match outcome {
            Ok(v) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retries");
                }
                return Ok(v);
            }
            Err(e) if !e.is_transient() => {
                warn!(attempt, error = %e, "fatal provider error, not retrying");
                return Err(RetryError::Fatal(e));
            }
            Err(e) => {
                if attempt >= max_attempts {
                    warn!(attempt, error = %e, "retry attempts exhausted");
                    return Err(RetryError::Exhausted { attempts: attempt, last: e });
                }
                let delay = policy.backoff_delay(attempt);
                if slept + delay > policy.max_total_backoff {
                    warn!(attempt, error = %e, "retry backoff budget exhausted");
                    return Err(RetryError::Exhausted { attempts: attempt, last: e });
                }
                slept += delay;
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e,
                       "transient provider error, backing off");

                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestErr {
        transient: bool,
    }

    impl std::fmt::Display for TestErr {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient={})", self.transient)
        }
    }

    impl Transience for TestErr {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_total_backoff: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn two_transient_failures_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out = run_with_retry(&fast_policy(3), &CancellationToken::new(), move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestErr { transient: true })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out: Result<u32, _> =
            run_with_retry(&fast_policy(5), &CancellationToken::new(), move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestErr { transient: false })
                }
            })
            .await;
        assert!(matches!(out, Err(RetryError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_exhaust_attempts() {
        let out: Result<u32, _> =
            run_with_retry(&fast_policy(3), &CancellationToken::new(), || async {
                Err(TestErr { transient: true })
            })
            .await;
        match out {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out: Result<u32, RetryError<TestErr>> =
            run_with_retry(&fast_policy(3), &cancel, || async { Ok(1) }).await;
        assert!(matches!(out, Err(RetryError::Cancelled)));
    }
}
