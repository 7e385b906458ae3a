// ABOUTME: Runs fallible async operations under a per-attempt deadline with bounded retries.
// ABOUTME: Used by the coordinator to drive save and load attempts.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::shutdown::ShutdownSignal;

/// Errors that know whether another attempt could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times to try, how long to wait between tries, and how long one try may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub attempt_timeout: Duration,
}

/// Why a single attempt did not produce a value.
#[derive(Debug, Error)]
pub enum AttemptError<E> {
    #[error("{0}")]
    Failed(E),

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    #[error("shutting down")]
    ShuttingDown,
}

/// A value together with the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// The last error seen once retries were given up.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: AttemptError<E>,
}

/// Run `fut`, abandoning it if it has not finished within `limit`.
///
/// An abandoned future is dropped at its current suspension point.
pub async fn run_with_timeout<T, E, F>(limit: Duration, fut: F) -> Result<T, AttemptError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AttemptError::Failed(e)),
        Err(_) => Err(AttemptError::TimedOut(limit)),
    }
}

/// Call `op` until it succeeds, fails with a non-retryable error, runs out of
/// attempts, or shutdown is requested. `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &ShutdownSignal,
    label: &str,
    mut op: F,
) -> Result<Attempted<T>, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if shutdown.is_triggered() {
            return Err(RetryFailure {
                attempts: attempt,
                error: AttemptError::ShuttingDown,
            });
        }

        attempt += 1;
        tracing::debug!(operation = label, attempt, max_attempts, "attempt started");

        let error = match run_with_timeout(policy.attempt_timeout, op(attempt)).await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) => error,
        };

        let retryable = match &error {
            AttemptError::Failed(e) => e.is_retryable(),
            AttemptError::TimedOut(_) => true,
            AttemptError::ShuttingDown => false,
        };

        if !retryable || attempt >= max_attempts {
            tracing::error!(operation = label, attempt, error = %error, "giving up");
            return Err(RetryFailure {
                attempts: attempt,
                error,
            });
        }

        tracing::warn!(
            operation = label,
            attempt,
            max_attempts,
            delay_ms = policy.delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );

        if shutdown.sleep(policy.delay).await.is_err() {
            return Err(RetryFailure {
                attempts: attempt,
                error: AttemptError::ShuttingDown,
            });
        }
    }
}
