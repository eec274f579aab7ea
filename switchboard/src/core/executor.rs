//! Resilient execution of provider operations
//!
//! Wraps any provider call with a deadline, bounded retry, and exponential
//! backoff. The wrapper is provider-agnostic: it has no idea what the
//! operation means, only whether its failure is transport-class (retry) or
//! terminal (surface immediately).

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};

use shared::ProviderFailure;

/// Timeout, attempt budget, and backoff schedule for one provider
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// First retry delay; doubles each attempt (1s, 2s, 4s...)
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Successful execution, with the bookkeeping callers record in metadata
#[derive(Debug)]
pub struct Execution<T> {
    pub value: T,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// How a policy-wrapped execution failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// Non-retryable failure; execution stops at its first occurrence
    #[error("operation failed: {failure}")]
    Terminal { failure: ProviderFailure },

    /// Transport failures persisted through the whole attempt budget
    #[error("operation failed after {attempts} attempts, last error: {last}")]
    RetriesExhausted { attempts: u32, last: ProviderFailure },
}

impl ExecutorError {
    pub fn last_failure(&self) -> &ProviderFailure {
        match self {
            ExecutorError::Terminal { failure } => failure,
            ExecutorError::RetriesExhausted { last, .. } => last,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ExecutorError::Terminal { .. } => 1,
            ExecutorError::RetriesExhausted { attempts, .. } => *attempts,
        }
    }
}

/// Run `op` under the given policy
///
/// Each attempt is raced against the policy deadline; a timeout counts as
/// a retryable transport failure. Delays are non-blocking waits, so a slow
/// provider never stalls probes or operations against another.
pub async fn execute_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<Execution<T>, ExecutorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderFailure>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = match timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderFailure::Timeout),
        };

        match result {
            Ok(value) => {
                return Ok(Execution {
                    value,
                    attempts: attempt,
                    elapsed: started.elapsed(),
                });
            }
            Err(failure) if failure.is_transport() => {
                if attempt >= policy.max_attempts {
                    return Err(ExecutorError::RetriesExhausted {
                        attempts: attempt,
                        last: failure,
                    });
                }
                let delay = policy.backoff_delay(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "transport failure, backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
            Err(failure) => {
                return Err(ExecutorError::Terminal { failure });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        // Connection reset twice, then success on the third attempt
        let result = execute_with_policy(&quick_policy(), move || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderFailure::NetworkError("connection reset".into()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result.value, 42);
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_reports_attempt_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let err = execute_with_policy(&quick_policy(), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ProviderFailure::ServiceUnavailable)
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            ExecutorError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, ProviderFailure::ServiceUnavailable);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_makes_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let err = execute_with_policy(&quick_policy(), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ProviderFailure::AuthenticationFailed)
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err, ExecutorError::Terminal {
            failure: ProviderFailure::AuthenticationFailed,
        });
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_classified_as_retryable() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let policy = RetryPolicy {
            timeout: Duration::from_millis(100),
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
        };

        let err = execute_with_policy(&policy, move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                // Never resolves inside the deadline
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<u32, ProviderFailure>(0)
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match err {
            ExecutorError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert_eq!(last, ProviderFailure::Timeout);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_non_decreasing() {
        let timestamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let timestamps_clone = timestamps.clone();

        let _ = execute_with_policy(&quick_policy(), move || {
            let timestamps = timestamps_clone.clone();
            async move {
                timestamps.lock().await.push(Instant::now());
                Err::<u32, _>(ProviderFailure::Timeout)
            }
        })
        .await;

        let stamps = timestamps.lock().await;
        assert_eq!(stamps.len(), 3);
        let first_gap = stamps[1] - stamps[0];
        let second_gap = stamps[2] - stamps[1];
        assert!(second_gap >= first_gap);
        // 1s then 2s under the paused clock
        assert_eq!(first_gap, Duration::from_secs(1));
        assert_eq!(second_gap, Duration::from_secs(2));
    }
}
