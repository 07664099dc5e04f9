//! Time-bounded retry of platform calls.
//!
//! The platform is eventually consistent: a freshly created object may answer
//! 404 for a while, a deleted one may linger, and versioned writes can lose a
//! race. [`execute_with_retry`] repeats one operation at a fixed interval
//! until it succeeds, fails fatally, runs out of time, or is cancelled.
//!
//! ```ignore
//! let policy = RetryPolicy::read_after_write(ctx.timeouts.read)?;
//! let action = execute_with_retry(&ctx.cancel, &policy, || async {
//!     policy.classify(clients.actions.get_action(id).await)
//! })
//! .await
//! .map_err(|e| e.describe(format_args!("reading action {}", id)))?;
//! ```

mod error;
mod policy;

pub use error::RetryError;
pub use policy::{Classifier, RetryPolicy};

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ApiResult;
use crate::error::ProviderError;

/// The result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The attempt produced the final value.
    Success(T),
    /// The attempt failed in a way that may clear up.
    Retryable(E),
    /// The attempt failed for good.
    Fatal(E),
}

/// Per-invocation state of [`execute_with_retry`].
#[derive(Debug)]
pub struct RetrySession<E> {
    started: Instant,
    attempts: u32,
    last_error: Option<E>,
}

impl<E> RetrySession<E> {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            attempts: 0,
            last_error: None,
        }
    }

    /// Time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The most recent retryable failure.
    pub fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    fn timeout(&self, last: E) -> RetryError<E> {
        let elapsed = self.elapsed();
        warn!(
            attempts = self.attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            "Retry timed out"
        );
        RetryError::Timeout {
            last,
            attempts: self.attempts,
            elapsed,
        }
    }

    fn cancelled(&self, last: Option<E>) -> RetryError<E> {
        warn!(attempts = self.attempts, "Retry cancelled");
        RetryError::Cancelled {
            attempts: self.attempts,
            last,
        }
    }
}

/// Run `operation` until it succeeds, fails fatally, the policy's deadline
/// passes, or `cancel` fires.
///
/// Attempts are spaced by the policy's poll interval, shortened so that no
/// wait crosses the deadline. No attempt starts once the deadline is reached.
pub async fn execute_with_retry<T, E, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Outcome<T, E>>,
    E: std::fmt::Display,
{
    let max = policy.max_duration();
    let mut session = RetrySession::start();

    loop {
        if cancel.is_cancelled() {
            let last = session.last_error.take();
            return Err(session.cancelled(last));
        }

        session.attempts += 1;
        let error = match operation().await {
            Outcome::Success(value) => {
                if session.attempts > 1 {
                    debug!(
                        attempts = session.attempts,
                        elapsed_ms = session.elapsed().as_millis() as u64,
                        "Retry succeeded"
                    );
                }
                return Ok(value);
            },
            Outcome::Fatal(error) => {
                debug!(attempts = session.attempts, error = %error, "Attempt failed fatally");
                return Err(RetryError::Fatal {
                    error,
                    attempts: session.attempts,
                });
            },
            Outcome::Retryable(error) => error,
        };

        let elapsed = session.elapsed();
        if elapsed >= max {
            return Err(session.timeout(error));
        }
        debug!(attempts = session.attempts, error = %error, "Attempt failed, will retry");

        let wait = policy.poll_interval().min(max - elapsed);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(session.cancelled(Some(error))),
            _ = tokio::time::sleep(wait) => {}
        }

        if session.elapsed() >= max {
            return Err(session.timeout(error));
        }
        session.last_error = Some(error);
    }
}

/// Poll `probe` until the object it looks up is gone.
///
/// `probe` performs one lookup by id. A successful lookup means the object
/// still exists and another poll is due, a 404 confirms the deletion, and any
/// other error is fatal.
pub async fn confirm_deleted<F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    mut probe: F,
) -> Result<(), RetryError<ProviderError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<()>>,
{
    execute_with_retry(cancel, policy, || {
        let attempt = probe();
        async move {
            match attempt.await {
                Ok(()) => Outcome::Retryable(ProviderError::FailedPrecondition(
                    "object still exists".to_string(),
                )),
                Err(err) if err.is_not_found() => Outcome::Success(()),
                Err(err) => Outcome::Fatal(err.into()),
            }
        }
    })
    .await
}
