//! Bounded retry with a fixed pause
//!
//! Only instrument submissions go through this policy. Reads fail on the
//! first error and rely on the request timeout alone.

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;

/// Attempt counter handed to the retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub attempt_number: u32,
    /// Attempts allowed in total
    pub max_attempts: u32,
    /// Pause before the next attempt
    pub delay: Duration,
}

impl RetryAttempt {
    /// Whether a failure of this attempt ends the retry loop
    #[inline]
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.attempt_number >= self.max_attempts
    }
}

/// Retry an operation up to a fixed number of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create policy; zero attempts is treated as one
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Create policy from configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }

    /// Attempts allowed in total
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between attempts
    #[inline]
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds or the attempts are used up
    ///
    /// # Errors
    /// The error of the last attempt
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.retry_if(op, |_| true).await
    }

    /// Like [`run`](Self::run), but stops at the first error `should_retry`
    /// rejects
    ///
    /// # Errors
    /// The first non-retryable error, or the error of the last attempt
    pub async fn retry_if<T, E, F, Fut, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut(RetryAttempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt_number = 1;

        loop {
            let attempt = RetryAttempt {
                attempt_number,
                max_attempts: self.max_attempts,
                delay: self.delay,
            };

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt.is_last() || !should_retry(&e) => return Err(e),
                Err(_) => {
                    tracing::debug!(
                        attempt = attempt_number,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt_number += 1;
                }
            }
        }
    }
}

/// Invoke `op` at most `max_attempts` times with `delay` between failures
///
/// # Errors
/// The error of the last attempt
pub async fn try_at_most<T, E, F, Fut>(max_attempts: u32, delay: Duration, op: F) -> Result<T, E>
where
    F: FnMut(RetryAttempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryPolicy::new(max_attempts, delay).run(op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<u32, String> = try_at_most(5, Duration::from_secs(1), |attempt| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if attempt.attempt_number < 3 {
                    Err(format!("fail {}", attempt.attempt_number))
                } else {
                    Ok(attempt.attempt_number)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_last_error() {
        let result: Result<(), String> = try_at_most(3, Duration::from_secs(1), |attempt| async move {
            Err(format!("fail {}", attempt.attempt_number))
        })
        .await;

        assert_eq!(result, Err("fail 3".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_fixed_delay_between_attempts() {
        let start = tokio::time::Instant::now();

        let _: Result<(), ()> = try_at_most(4, Duration::from_millis(250), |_| async { Err(()) }).await;

        // three pauses, not exponential
        assert_eq!(start.elapsed(), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn zero_attempts_means_one() {
        let calls = AtomicU32::new(0);
        let _: Result<(), ()> = try_at_most(0, Duration::ZERO, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(()) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_early() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(1));

        let result: Result<(), &str> = policy
            .retry_if(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal") }
                },
                |e| *e != "fatal",
            )
            .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn prop_attempts_bounded(max in 1u32..10, succeed_at in 1u32..15) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            let calls = AtomicU32::new(0);
            let result: Result<u32, u32> = rt.block_on(try_at_most(max, Duration::ZERO, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt.attempt_number == succeed_at {
                        Ok(attempt.attempt_number)
                    } else {
                        Err(attempt.attempt_number)
                    }
                }
            }));

            let calls = calls.load(Ordering::SeqCst);
            prop_assert!(calls <= max);
            if succeed_at <= max {
                prop_assert_eq!(result, Ok(succeed_at));
                prop_assert_eq!(calls, succeed_at);
            } else {
                prop_assert_eq!(result, Err(max));
                prop_assert_eq!(calls, max);
            }
        }
    }
}
