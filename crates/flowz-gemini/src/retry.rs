//! Retry with exponential back-off and jitter for generation calls.
//!
//! [`retry_with_backoff`] wraps a fallible async operation and retries on
//! transient failures. The only failure that is never retried is
//! [`FailureKind::ContentBlocked`] — re-sending a refused prompt burns quota
//! for an identical refusal. Everything else, including empty payloads and
//! transport errors, takes the back-off path.

use std::future::Future;
use std::time::Duration;

use crate::error::{FailureKind, GeminiError};

/// Retry/back-off parameters for a client. Tests use a zero base to avoid
/// real sleeps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first (3 retries = 4 attempts total).
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_app_config(config: &flowz_core::AppConfig) -> Self {
        Self {
            max_retries: config.gemini_max_retries,
            backoff_base_ms: config.gemini_backoff_base_ms,
            backoff_cap_ms: config.gemini_backoff_cap_ms,
        }
    }
}

/// Returns `true` for errors worth retrying after a back-off delay.
pub(crate) fn is_retriable(err: &GeminiError) -> bool {
    !matches!(
        err,
        GeminiError::Api {
            kind: FailureKind::ContentBlocked,
            ..
        }
    )
}

/// Delay before the retry following failed attempt `attempt` (0-indexed):
/// `min(base × 2^attempt, cap)` scaled by a jitter factor in `0.75..=1.25`.
///
/// `jitter_unit` is a uniform sample from `[0, 1)`; it is a parameter so the
/// bounds are testable without randomness.
pub(crate) fn backoff_delay_ms(base_ms: u64, cap_ms: u64, attempt: u32, jitter_unit: f64) -> u64 {
    let computed = base_ms.saturating_mul(1u64 << attempt.min(10));
    let capped = computed.min(cap_ms);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    {
        (capped as f64 * (jitter_unit * 0.5 + 0.75)) as u64
    }
}

/// Runs `operation` with up to `policy.max_retries` additional attempts on
/// transient errors.
///
/// Back-off schedule with the default policy (base 1000 ms, cap 10 000 ms):
///
/// | Failed attempt | Sleep before next attempt      |
/// |----------------|--------------------------------|
/// | 1              | 1 000 ms × 2⁰ ± 25 % jitter    |
/// | 2              | 1 000 ms × 2¹ ± 25 % jitter    |
/// | 3              | 1 000 ms × 2² ± 25 % jitter    |
///
/// Exhausting retries returns the last error to the caller.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, GeminiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeminiError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay_ms = backoff_delay_ms(
                    policy.backoff_base_ms,
                    policy.backoff_cap_ms,
                    attempt,
                    rand::random::<f64>(),
                );
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms,
                    kind = %err.kind(),
                    error = %err,
                    "generation call failed — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked() -> GeminiError {
        GeminiError::Api {
            kind: FailureKind::ContentBlocked,
            status: None,
            message: "blocked due to safety".to_owned(),
        }
    }

    fn quota() -> GeminiError {
        GeminiError::Api {
            kind: FailureKind::QuotaExceeded,
            status: Some(429),
            message: "quota exceeded".to_owned(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff_base_ms: 0,
            backoff_cap_ms: 0,
        }
    }

    #[test]
    fn content_blocked_is_not_retriable() {
        assert!(!is_retriable(&blocked()));
    }

    #[test]
    fn quota_timeout_and_empty_are_retriable() {
        assert!(is_retriable(&quota()));
        assert!(is_retriable(&GeminiError::Api {
            kind: FailureKind::Timeout,
            status: None,
            message: "deadline exceeded".to_owned(),
        }));
        assert!(is_retriable(&GeminiError::EmptyResponse));
    }

    #[test]
    fn backoff_doubles_and_caps_at_ten_seconds() {
        // jitter_unit 0.5 lands exactly on d(n) = min(1000 * 2^n, 10000).
        assert_eq!(backoff_delay_ms(1_000, 10_000, 0, 0.5), 1_000);
        assert_eq!(backoff_delay_ms(1_000, 10_000, 1, 0.5), 2_000);
        assert_eq!(backoff_delay_ms(1_000, 10_000, 2, 0.5), 4_000);
        assert_eq!(backoff_delay_ms(1_000, 10_000, 3, 0.5), 8_000);
        assert_eq!(backoff_delay_ms(1_000, 10_000, 4, 0.5), 10_000);
        assert_eq!(backoff_delay_ms(1_000, 10_000, 9, 0.5), 10_000);
    }

    #[test]
    fn backoff_jitter_stays_within_quarter_band() {
        for attempt in 0..6 {
            let d = backoff_delay_ms(1_000, 10_000, attempt, 0.5);
            let low = backoff_delay_ms(1_000, 10_000, attempt, 0.0);
            let high = backoff_delay_ms(1_000, 10_000, attempt, 0.999_999);
            assert_eq!(low, d * 3 / 4, "lower bound at attempt {attempt}");
            assert!(
                high <= d * 5 / 4 && high >= d,
                "upper bound at attempt {attempt}: {high}"
            );
        }
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, GeminiError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_content_blocked() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(blocked())
            }
        })
        .await;
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "ContentBlocked must not be retried"
        );
        assert!(matches!(
            result,
            Err(GeminiError::Api {
                kind: FailureKind::ContentBlocked,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err::<u32, _>(quota())
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99, "should succeed after retries");
        assert_eq!(
            calls.load(Ordering::SeqCst),
            3,
            "should have been called 3 times (2 failures + 1 success)"
        );
    }

    #[tokio::test]
    async fn exhausts_retries_after_four_attempts() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(fast_policy(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(GeminiError::EmptyResponse)
            }
        })
        .await;
        assert_eq!(
            calls.load(Ordering::SeqCst),
            4,
            "3 retries means 4 attempts total"
        );
        assert!(matches!(result, Err(GeminiError::EmptyResponse)));
    }
}
