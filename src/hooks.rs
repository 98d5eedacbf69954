//! Extension hooks for wiring a ranking session into a host application.
//!
//! The engine stays storage-agnostic. Callers can inject a per-comparison side
//! effect (persistence, progress reporting) through [`ComparisonObserver`];
//! warm starts go through `SessionController::start_from_log`.

use chrono::{DateTime, Utc};

use crate::state::Comparison;

/// Emitted after a comparison has been recorded and the model refitted.
#[derive(Debug, Clone)]
pub struct ComparisonEvent {
    pub session_id: uuid::Uuid,
    /// 1-based position in the log.
    pub index: usize,
    pub comparison: Comparison,
    pub pass: usize,
    pub aggregate_confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    #[error("{0}")]
    Message(String),
}

/// Failures are logged and never stop the session.
#[async_trait::async_trait]
pub trait ComparisonObserver: Send + Sync {
    async fn on_comparison(&self, event: ComparisonEvent) -> Result<(), ObserverError>;
}
