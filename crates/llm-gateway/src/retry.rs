//! Timeout and retry with exponential backoff for single backend attempts.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

/// Retry settings for transient failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries (0 = run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Outcome of [`run_with_retry`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: GatewayResult<T>,
    /// Attempts made (1 = no retries used).
    pub attempts: u32,
}

/// Run `op` with a per-attempt timeout, retrying transient failures.
///
/// Non-transient errors are returned immediately. When every attempt fails
/// transiently the result is [`GatewayError::BackendUnavailable`] carrying
/// the last failure reason.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    op: F,
) -> RetryOutcome<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let max_attempts = policy.max_retries + 1;
    let mut last_reason = String::new();

    for attempt in 1..=max_attempts {
        let err = match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Ok(Err(err)) if err.is_transient() => err,
            Ok(Err(err)) => {
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                }
            }
            Err(_elapsed) => {
                GatewayError::Transient(format!("timed out after {} ms", timeout.as_millis()))
            }
        };

        last_reason = match err {
            GatewayError::Transient(reason) => reason,
            other => other.to_string(),
        };
        if attempt < max_attempts {
            let delay = policy.backoff_delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, reason = %last_reason, "retrying backend call");
            tokio::time::sleep(delay).await;
        }
    }

    RetryOutcome {
        result: Err(GatewayError::BackendUnavailable {
            attempts: max_attempts,
            reason: last_reason,
        }),
        attempts: max_attempts,
    }
}
