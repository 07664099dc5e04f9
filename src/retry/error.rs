//! Terminal errors of a retry session.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::error::ProviderError;

/// How a retry session ended without success.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    /// The operation reported a failure that must not be retried.
    #[error("{error}")]
    Fatal {
        /// The failure reported by the operation.
        #[source]
        error: E,
        /// Attempts made, including the failing one.
        attempts: u32,
    },
    /// Retryable failures persisted until the deadline.
    #[error("timeout after {attempts} attempts ({elapsed:?}): {last}")]
    Timeout {
        /// The last retryable failure.
        #[source]
        last: E,
        /// Attempts made.
        attempts: u32,
        /// Time spent in the session.
        elapsed: Duration,
    },
    /// The caller's cancellation token fired.
    #[error("cancelled after {attempts} attempts{}", last_suffix(.last))]
    Cancelled {
        /// Attempts made before cancellation.
        attempts: u32,
        /// The last retryable failure, if any attempt ran.
        #[source]
        last: Option<E>,
    },
}

fn last_suffix<E: fmt::Display>(last: &Option<E>) -> String {
    last.as_ref().map(|e| format!(": {}", e)).unwrap_or_default()
}

impl<E> RetryError<E> {
    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. }
            | Self::Timeout { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The most recent failure reported by the operation.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Fatal { error, .. } => Some(error),
            Self::Timeout { last, .. } => Some(last),
            Self::Cancelled { last, .. } => last.as_ref(),
        }
    }

    /// True for [`RetryError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True for [`RetryError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// True for [`RetryError::Fatal`].
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

impl RetryError<ProviderError> {
    /// Convert to a provider error that names what was being waited on.
    ///
    /// Fatal errors pass through unchanged.
    pub fn describe(self, what: impl fmt::Display) -> ProviderError {
        match self {
            Self::Fatal { error, .. } => error,
            timeout @ Self::Timeout { .. } => {
                ProviderError::DeadlineExceeded(format!("{}: {}", what, timeout))
            }
            cancelled @ Self::Cancelled { .. } => {
                ProviderError::Cancelled(format!("{}: {}", what, cancelled))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err: RetryError<String> = RetryError::Timeout {
            last: "version mismatch".into(),
            attempts: 2,
            elapsed: Duration::from_secs(10),
        };
        assert_eq!(
            err.to_string(),
            "timeout after 2 attempts (10s): version mismatch"
        );

        let err: RetryError<String> = RetryError::Cancelled {
            attempts: 3,
            last: None,
        };
        assert_eq!(err.to_string(), "cancelled after 3 attempts");

        let err: RetryError<String> = RetryError::Fatal {
            error: "invalid type".into(),
            attempts: 1,
        };
        assert_eq!(err.to_string(), "invalid type");

        let err: RetryError<String> = RetryError::Cancelled {
            attempts: 2,
            last: Some("not found".into()),
        };
        assert_eq!(err.to_string(), "cancelled after 2 attempts: not found");
    }

    #[test]
    fn test_source_is_last_failure() {
        use std::error::Error as _;

        let err = RetryError::Timeout {
            last: ProviderError::NotFound("integration i1".into()),
            attempts: 3,
            elapsed: Duration::from_secs(5),
        };
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("Resource not found: integration i1"));

        let err: RetryError<ProviderError> = RetryError::Cancelled {
            attempts: 0,
            last: None,
        };
        assert!(err.source().is_none());
    }

    #[test]
    fn test_accessors() {
        let err: RetryError<&str> = RetryError::Cancelled {
            attempts: 2,
            last: Some("not found"),
        };
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.last_error(), Some(&"not found"));
    }

    #[test]
    fn test_describe() {
        let fatal = RetryError::Fatal {
            error: ProviderError::InvalidRequest("bad contract".into()),
            attempts: 1,
        };
        assert!(matches!(
            fatal.describe("creating action"),
            ProviderError::InvalidRequest(_)
        ));

        let timeout = RetryError::Timeout {
            last: ProviderError::NotFound("integration i1".into()),
            attempts: 4,
            elapsed: Duration::from_secs(30),
        };
        let err = timeout.describe("waiting for integration i1");
        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert!(err.message().starts_with("waiting for integration i1: timeout after 4 attempts"));

        let cancelled: RetryError<ProviderError> = RetryError::Cancelled {
            attempts: 1,
            last: None,
        };
        assert!(matches!(
            cancelled.describe("deleting credential c1"),
            ProviderError::Cancelled(_)
        ));
    }
}
