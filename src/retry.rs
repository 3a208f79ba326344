use crate::logging;
use crate::oracle::OracleError;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Bounded retry around one oracle call.
///
/// `max_attempts` counts the first call. Every attempt gets its own timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay_ms: 250,
            max_delay_ms: 4_000,
            attempt_timeout_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_jitter()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms)))
            .with_max_times(self.max_attempts.max(1) - 1)
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the policy is
/// exhausted. The last error is returned.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    run_id: Option<&str>,
    mut call: F,
) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let timeout = policy.attempt_timeout();

    let attempt = || {
        let fut = call();
        async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(timeout)),
            }
        }
    };

    attempt
        .retry(policy.backoff())
        .notify(|err: &OracleError, dur: Duration| {
            logging::warn(
                logging::LogCategory::Oracle,
                run_id,
                &format!("{} failed ({}), retrying in {}ms", operation, err, dur.as_millis()),
            );
        })
        .when(|e: &OracleError| e.is_retryable())
        .await
}
