//! Retry policies and error classification.

use std::time::Duration;

use crate::client::ApiError;
use crate::config::RetryWindow;
use crate::error::ProviderError;

use super::Outcome;

/// Decides whether a platform error is worth another attempt.
pub type Classifier = fn(&ApiError) -> bool;

/// Timing and classification for one kind of retrying call.
///
/// The controller only looks at `max_duration` and `poll_interval`. The
/// classifier is applied by operation closures through [`RetryPolicy::classify`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_duration: Duration,
    poll_interval: Duration,
    classifier: Classifier,
}

impl RetryPolicy {
    /// Create a policy. Both durations must be non-zero.
    pub fn new(
        max_duration: Duration,
        poll_interval: Duration,
        classifier: Classifier,
    ) -> Result<Self, ProviderError> {
        if max_duration.is_zero() {
            return Err(ProviderError::Configuration(
                "retry max duration must be greater than zero".to_string(),
            ));
        }
        if poll_interval.is_zero() {
            return Err(ProviderError::Configuration(
                "retry poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_duration,
            poll_interval,
            classifier,
        })
    }

    /// Poll until the remote system reflects a write; "not found" is retryable.
    pub fn read_after_write(window: RetryWindow) -> Result<Self, ProviderError> {
        Self::new(window.timeout(), window.poll_interval(), ApiError::is_not_found)
    }

    /// Retry versioned writes that lost a race; "version mismatch" is retryable.
    pub fn optimistic_concurrency(window: RetryWindow) -> Result<Self, ProviderError> {
        Self::new(
            window.timeout(),
            window.poll_interval(),
            ApiError::is_version_mismatch,
        )
    }

    /// Retry creates rejected while a parent object settles; HTTP 400 is retryable.
    pub fn create_conflict(window: RetryWindow) -> Result<Self, ProviderError> {
        Self::new(window.timeout(), window.poll_interval(), ApiError::is_bad_request)
    }

    /// Poll until a deleted object disappears. Used with
    /// [`confirm_deleted`](super::confirm_deleted), which decides outcomes itself.
    pub fn delete_confirmation(window: RetryWindow) -> Result<Self, ProviderError> {
        Self::new(window.timeout(), window.poll_interval(), never)
    }

    /// Upper bound on total time spent retrying.
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Fixed delay between attempts.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether the classifier deems `err` retryable.
    pub fn is_retryable(&self, err: &ApiError) -> bool {
        (self.classifier)(err)
    }

    /// Turn one attempt's API result into an [`Outcome`].
    pub fn classify<T>(&self, result: Result<T, ApiError>) -> Outcome<T, ProviderError> {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) if self.is_retryable(&err) => Outcome::Retryable(err.into()),
            Err(err) => Outcome::Fatal(err.into()),
        }
    }
}

fn never(_: &ApiError) -> bool {
    false
}
