//! Comparison oracle: the external source of pairwise judgements.
//!
//! The core never knows whether a human, a model, or a simulation sits behind
//! the trait. A call may take arbitrarily long; the driver awaits it and never
//! imposes a timeout of its own.

pub mod channel;
pub mod error;
pub mod simulated;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::state::ItemId;

pub use channel::{ChannelOracle, ComparisonRequest};
pub use error::OracleError;
pub use simulated::{CallbackOracle, PreferenceOracle, SimulatedOracle};

/// Answer to one `compare(a, b)` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum OracleVerdict {
    Winner {
        winner: ItemId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    /// The oracle declined this pair. Nothing is recorded.
    Skip,
}

impl OracleVerdict {
    pub fn winner(winner: impl Into<ItemId>) -> Self {
        Self::Winner {
            winner: winner.into(),
            confidence: None,
        }
    }

    pub fn winner_with_confidence(winner: impl Into<ItemId>, confidence: f64) -> Self {
        Self::Winner {
            winner: winner.into(),
            confidence: Some(confidence),
        }
    }
}

#[async_trait::async_trait]
pub trait ComparisonOracle: Send + Sync {
    async fn compare(&self, a: &ItemId, b: &ItemId) -> Result<OracleVerdict, OracleError>;
}

#[async_trait::async_trait]
impl<T: ComparisonOracle + ?Sized> ComparisonOracle for Arc<T> {
    async fn compare(&self, a: &ItemId, b: &ItemId) -> Result<OracleVerdict, OracleError> {
        (**self).compare(a, b).await
    }
}

// ---------------------------------------------------------------------
//  Automatic retries
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(250),
        }
    }
}

/// Retries retryable oracle errors with exponential backoff before the
/// driver ever sees them.
pub struct RetryingOracle<O> {
    inner: O,
    config: RetryConfig,
}

impl<O: ComparisonOracle> RetryingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self::with_config(inner, RetryConfig::default())
    }

    pub fn with_config(inner: O, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

#[async_trait::async_trait]
impl<O: ComparisonOracle> ComparisonOracle for RetryingOracle<O> {
    async fn compare(&self, a: &ItemId, b: &ItemId) -> Result<OracleVerdict, OracleError> {
        let mut attempt = 0;
        loop {
            match self.inner.compare(a, b).await {
                Ok(verdict) => return Ok(verdict),
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    tracing::debug!(%a, %b, attempt, error = %err, ?delay, "retrying oracle call");
                    attempt += 1;
                    sleep(delay).await;
                }
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.pow(attempt.min(5));
    base * multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
        error: OracleError,
    }

    #[async_trait::async_trait]
    impl ComparisonOracle for Flaky {
        async fn compare(&self, a: &ItemId, _b: &ItemId) -> Result<OracleVerdict, OracleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(OracleVerdict::winner(a.clone()))
            }
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let oracle = RetryingOracle::with_config(
            Flaky {
                failures: 2,
                calls: AtomicUsize::new(0),
                error: OracleError::unavailable("busy"),
            },
            fast(),
        );
        let (a, b) = (ItemId::from("a"), ItemId::from("b"));
        assert_eq!(oracle.compare(&a, &b).await.unwrap(), OracleVerdict::winner("a"));
        assert_eq!(oracle.into_inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_surface_immediately() {
        let oracle = RetryingOracle::with_config(
            Flaky {
                failures: 5,
                calls: AtomicUsize::new(0),
                error: OracleError::failed("nope"),
            },
            fast(),
        );
        let (a, b) = (ItemId::from("a"), ItemId::from("b"));
        assert!(oracle.compare(&a, &b).await.is_err());
        assert_eq!(oracle.into_inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(10);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(10));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(40));
    }
}
