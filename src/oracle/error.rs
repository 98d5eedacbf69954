//! Errors reported by comparison oracles.

use std::time::Duration;
use thiserror::Error;

/// A comparison the oracle could not answer.
///
/// Always recoverable from the driver's point of view: the session suspends
/// and waits for a retry signal. `is_retryable` only steers the automatic
/// retries of [`super::RetryingOracle`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    /// The oracle gave up waiting on its own backend.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The backend is temporarily unreachable (closed channel, busy human).
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle answered with an error that retrying will not fix.
    #[error("oracle failed: {0}")]
    Failed(String),
}

impl OracleError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }

    /// Short machine-readable code for logs and statistics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_variant() {
        assert!(OracleError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(OracleError::unavailable("busy").is_retryable());
        assert!(!OracleError::failed("bad pair").is_retryable());
        assert_eq!(OracleError::failed("x").code(), "failed");
    }
}
