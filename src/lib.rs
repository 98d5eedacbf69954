#![forbid(unsafe_code)]

//! # ordinal-harness
//!
//! Discover a ranking over opaque items with as few pairwise comparisons as
//! possible.
//!
//! A sort-like traversal of the item set is interleaved with live statistical
//! modeling: every answer from the comparison oracle (a human, a scorer, a
//! simulation) is appended to a log, a Bradley-Terry model is refitted, and a
//! bootstrap estimates how sure each strength is. A query selector decides
//! which pair to ask next, moving from broad coverage to information gain as
//! evidence accumulates. Sessions can be paused, retried after oracle faults,
//! and cancelled without losing recorded comparisons.

pub mod bradley_terry;
pub mod config;
pub mod driver;
pub mod error;
pub mod evaluation;
pub mod hooks;
pub mod oracle;
pub mod query;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod trace;
pub mod uncertainty;

pub use bradley_terry::{BradleyTerryConfig, BradleyTerryModel, Strength, StrengthModel};
pub use config::EngineConfig;
pub use driver::{
    AdaptiveSortDriver, DriverConfig, DriverControl, DriverOutcome, DriverState,
    DriverStopReason, Suspension,
};
pub use error::{ConfigurationError, InvalidComparisonError, LifecycleError, ModelFitError};
pub use hooks::{ComparisonEvent, ComparisonObserver, ObserverError};
pub use oracle::{
    CallbackOracle, ChannelOracle, ComparisonOracle, ComparisonRequest, OracleError,
    OracleVerdict, PreferenceOracle, RetryingOracle, SimulatedOracle,
};
pub use query::{QuerySelector, QueryStrategy, SelectorConfig, Stage};
pub use session::{
    Session, SessionController, SessionError, SessionStatistics, SessionStatus, Transition,
};
pub use snapshot::{aggregate_confidence, RankedEntry, RankingSnapshot, SessionSnapshot};
pub use state::{Comparison, ItemId, RankingState, StateReplayError, WinMatrix};
pub use trace::{
    read_comparison_log, write_comparison_log, ComparisonLogWorker, ComparisonSink,
    JsonlComparisonSink, TraceError,
};
pub use uncertainty::{
    normalized_uncertainty, Uncertainty, UncertaintyConfig, UncertaintyEstimate,
    UncertaintyEstimator,
};
