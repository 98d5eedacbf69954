//! Adaptive sort driver.
//!
//! Runs repeated quicksort passes over the item set. Every comparison a
//! partition step needs is chosen by the [`QuerySelector`] among the pairs that
//! step can use, answered by the oracle, appended to the log, and followed by a
//! refit. The loop is a plain state machine over an explicit [`Worklist`], so
//! pausing, retrying and cancelling never unwind a recursion.
//!
//! Cancellation is cooperative: the flag is read only at the top of the loop.
//! An oracle call that is already in flight is awaited, recorded and refitted
//! before the driver reports `Cancelled`.

pub mod control;
pub mod refresh;
pub mod worklist;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::bradley_terry::{BradleyTerryModel, StrengthModel};
use crate::config::EngineConfig;
use crate::error::{ConfigurationError, InvalidComparisonError};
use crate::hooks::{ComparisonEvent, ComparisonObserver};
use crate::oracle::{ComparisonOracle, OracleVerdict};
use crate::query::QuerySelector;
use crate::session::Session;
use crate::snapshot::{aggregate_confidence, RankingSnapshot, SessionSnapshot};
use crate::state::{Comparison, ItemId};
use crate::trace::ComparisonSink;
use crate::uncertainty::{UncertaintyEstimator, UncertaintyEstimate};

pub use control::{DriverControl, DriverSignal};
pub use refresh::UncertaintyRefresher;
pub use worklist::{Block, Partition, Worklist};

/// Stop conditions. All off by default: the driver then runs until cancelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Stop once the log holds this many comparisons.
    pub max_comparisons: Option<usize>,
    /// Stop after this many completed passes.
    pub max_passes: Option<usize>,
    /// Stop once aggregate confidence reaches this value.
    pub target_confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Idle,
    Sorting,
    Converged,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DriverStopReason {
    BudgetExhausted,
    PassLimitReached,
    ConfidenceReached,
    /// A whole pass finished without recording a comparison.
    NoProgress,
    Cancelled,
    /// The selector rejected its inputs. Only reachable through a bug.
    SelectionFailed { message: String },
}

/// Why the driver is not issuing comparisons right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Suspension {
    AwaitingOracle { a: ItemId, b: ItemId },
    /// The last call for this pair failed; waiting for resume or cancel.
    AwaitingRetry { a: ItemId, b: ItemId, error: String },
    Paused,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriverCounters {
    pub passes_completed: usize,
    /// Comparisons recorded by this run (warm-start entries excluded).
    pub comparisons_made: usize,
    pub oracle_faults: usize,
    pub model_fit_failures: usize,
    pub skips: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverOutcome {
    pub state: DriverState,
    pub stop_reason: DriverStopReason,
    pub counters: DriverCounters,
}

enum Step {
    Continue,
    Stop(DriverStopReason),
}

pub struct AdaptiveSortDriver {
    oracle: Arc<dyn ComparisonOracle>,
    fitter: BradleyTerryModel,
    selector: QuerySelector,
    estimator: UncertaintyEstimator,
    engine: EngineConfig,
    control: DriverControl,
    signals: watch::Receiver<DriverSignal>,
    publisher: watch::Sender<Arc<SessionSnapshot>>,
    observers: Vec<Arc<dyn ComparisonObserver>>,
    sink: Option<Arc<dyn ComparisonSink>>,
    state: DriverState,
    counters: DriverCounters,
    retry: Option<(ItemId, ItemId)>,
    /// Log length when the current pass began.
    pass_start: usize,
}

impl AdaptiveSortDriver {
    pub fn new(
        oracle: Arc<dyn ComparisonOracle>,
        engine: EngineConfig,
        control: DriverControl,
        publisher: watch::Sender<Arc<SessionSnapshot>>,
    ) -> Self {
        let fitter = BradleyTerryModel::new(engine.bradley_terry.clone());
        Self {
            oracle,
            selector: QuerySelector::new(engine.selector.clone()),
            estimator: UncertaintyEstimator::new(fitter.clone()),
            fitter,
            signals: control.subscribe(),
            control,
            publisher,
            engine,
            observers: Vec::new(),
            sink: None,
            state: DriverState::Idle,
            counters: DriverCounters::default(),
            retry: None,
            pass_start: 0,
        }
    }

    /// Observers are notified in order after every recorded comparison.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn ComparisonObserver>>) -> Self {
        self.observers = observers;
        self
    }

    pub fn with_log_sink(mut self, sink: Option<Arc<dyn ComparisonSink>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn counters(&self) -> &DriverCounters {
        &self.counters
    }

    /// Drive `session` until a stop condition holds or the control handle
    /// cancels. The session's log, model and estimate are current on return.
    pub async fn run(&mut self, session: &mut Session) -> DriverOutcome {
        self.state = DriverState::Sorting;
        let mut refresher = UncertaintyRefresher::new(
            self.estimator.clone(),
            self.engine.uncertainty.clone(),
            session.uncertainty.clone(),
        );
        if !session.state.is_empty() {
            session.uncertainty = refresher.refresh(&session.state).await;
        }

        tracing::info!(
            session_id = %session.id,
            items = session.state.item_ids().len(),
            warm_start = session.state.len(),
            "adaptive sort started"
        );
        self.publish(session, None, None);

        self.pass_start = session.state.len();
        let mut worklist = Worklist::new(session.model.ranking());
        let stop_reason = loop {
            match self.step(session, &mut worklist, &mut refresher).await {
                Step::Continue => {}
                Step::Stop(reason) => break reason,
            }
        };

        session.uncertainty = refresher.settle(&session.state).await;
        self.state = match stop_reason {
            DriverStopReason::Cancelled | DriverStopReason::SelectionFailed { .. } => {
                DriverState::Cancelled
            }
            _ => DriverState::Converged,
        };
        tracing::info!(
            session_id = %session.id,
            state = ?self.state,
            reason = ?stop_reason,
            comparisons = session.state.len(),
            passes = self.counters.passes_completed,
            faults = self.counters.oracle_faults,
            "adaptive sort finished"
        );
        self.publish(session, None, Some(stop_reason.clone()));

        DriverOutcome {
            state: self.state,
            stop_reason,
            counters: self.counters.clone(),
        }
    }

    async fn step(
        &mut self,
        session: &mut Session,
        worklist: &mut Worklist,
        refresher: &mut UncertaintyRefresher,
    ) -> Step {
        if self.control.is_cancelled() {
            return Step::Stop(DriverStopReason::Cancelled);
        }
        if self.control.signal() == DriverSignal::Pause {
            self.publish(session, Some(Suspension::Paused), None);
            tracing::debug!(session_id = %session.id, "driver paused");
            if !control::wait_until_runnable(&mut self.signals, &self.control).await {
                return Step::Stop(DriverStopReason::Cancelled);
            }
            return Step::Continue;
        }
        if let Some(reason) = self.stop_condition(session) {
            return Step::Stop(reason);
        }

        if worklist.is_complete() {
            self.counters.passes_completed += 1;
            tracing::debug!(
                pass = self.counters.passes_completed,
                comparisons = session.state.len(),
                "pass complete"
            );
            if let Some(max) = self.engine.driver.max_passes {
                if self.counters.passes_completed >= max {
                    return Step::Stop(DriverStopReason::PassLimitReached);
                }
            }
            if session.state.len() == self.pass_start {
                tracing::warn!(
                    skips = self.counters.skips,
                    "pass recorded no comparison; stopping"
                );
                return Step::Stop(DriverStopReason::NoProgress);
            }
            self.pass_start = session.state.len();
            *worklist = Worklist::new(session.model.ranking());
            tokio::task::yield_now().await;
            return Step::Continue;
        }

        let (pivot, x) = match self.next_pair(session, worklist) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(error = %e, "pair selection failed");
                return Step::Stop(DriverStopReason::SelectionFailed {
                    message: e.to_string(),
                });
            }
        };

        self.publish(
            session,
            Some(Suspension::AwaitingOracle {
                a: pivot.clone(),
                b: x.clone(),
            }),
            None,
        );

        let fault = match self.oracle.compare(&pivot, &x).await {
            Ok(OracleVerdict::Winner { winner, confidence }) => {
                if winner != pivot && winner != x {
                    Some(
                        InvalidComparisonError::WinnerNotInPair {
                            winner,
                            a: pivot.clone(),
                            b: x.clone(),
                        }
                        .to_string(),
                    )
                } else {
                    let loser = if winner == pivot { x.clone() } else { pivot.clone() };
                    let x_won = winner == x;
                    match session
                        .state
                        .add_comparison_with(winner, loser, confidence, Utc::now())
                    {
                        Ok(_) => {
                            self.counters.comparisons_made += 1;
                            self.after_record(session, refresher).await;
                            worklist.place(&x, x_won);
                            None
                        }
                        Err(e) => Some(e.to_string()),
                    }
                }
            }
            Ok(OracleVerdict::Skip) => {
                self.counters.skips += 1;
                let x_better = session.model.strength(&x).value_or_neutral()
                    > session.model.strength(&pivot).value_or_neutral();
                tracing::debug!(a = %pivot, b = %x, "oracle skipped pair; placing by model");
                worklist.place(&x, x_better);
                // An in-process oracle can answer without suspending.
                tokio::task::yield_now().await;
                None
            }
            Err(e) => Some(e.to_string()),
        };

        if let Some(error) = fault {
            self.counters.oracle_faults += 1;
            tracing::warn!(a = %pivot, b = %x, error = %error, "comparison failed; awaiting retry");
            // Mark the current signal seen before announcing the fault so a
            // resume issued in reaction to it is not missed.
            let _ = self.signals.borrow_and_update();
            self.publish(
                session,
                Some(Suspension::AwaitingRetry {
                    a: pivot.clone(),
                    b: x.clone(),
                    error,
                }),
                None,
            );
            self.retry = Some((pivot, x));
            if !control::wait_for_retry(&mut self.signals, &self.control).await {
                return Step::Stop(DriverStopReason::Cancelled);
            }
            tracing::debug!("retrying failed comparison");
        }
        Step::Continue
    }

    fn stop_condition(&self, session: &Session) -> Option<DriverStopReason> {
        let cfg = &self.engine.driver;
        if let Some(max) = cfg.max_comparisons {
            if session.state.len() >= max {
                return Some(DriverStopReason::BudgetExhausted);
            }
        }
        if let Some(target) = cfg.target_confidence {
            if !session.state.is_empty()
                && aggregate_confidence(
                    &session.model,
                    &session.uncertainty,
                    session.state.item_ids(),
                ) >= target
            {
                return Some(DriverStopReason::ConfidenceReached);
            }
        }
        None
    }

    /// `(pivot, x)` for the next comparison of the active partition, starting
    /// a partition on the leftmost unsorted block when none is running.
    fn next_pair(
        &mut self,
        session: &Session,
        worklist: &mut Worklist,
    ) -> Result<(ItemId, ItemId), ConfigurationError> {
        if let Some(pair) = self.retry.take() {
            return Ok(pair);
        }

        if worklist.active().is_none() {
            let Some((idx, block)) = worklist.next_unsorted() else {
                return Err(ConfigurationError::invalid("worklist", "no unsorted block"));
            };
            let pivot = median_by_model(block, &session.model);
            if !worklist.begin_partition(idx, &pivot) {
                return Err(ConfigurationError::invalid("worklist", "pivot not in block"));
            }
        }

        let Some(part) = worklist.active() else {
            return Err(ConfigurationError::invalid("worklist", "no active partition"));
        };
        let pivot = part.pivot().clone();
        let candidates: Vec<(ItemId, ItemId)> = part
            .pending()
            .iter()
            .map(|x| (pivot.clone(), x.clone()))
            .collect();
        let (a, b) = self.selector.select_among(
            &session.state,
            &session.model,
            &session.uncertainty,
            session.state.len(),
            &candidates,
        )?;
        let x = if a == pivot { b } else { a };
        Ok((pivot, x))
    }

    async fn after_record(&mut self, session: &mut Session, refresher: &mut UncertaintyRefresher) {
        match self
            .fitter
            .fit(session.state.comparisons(), session.state.item_ids())
        {
            Ok(model) => session.model = Arc::new(model),
            Err(e) => {
                self.counters.model_fit_failures += 1;
                tracing::warn!(error = %e, "model refit failed; keeping previous model");
            }
        }
        session.uncertainty = refresher.refresh(&session.state).await;

        let Some(comparison) = session.state.comparisons().last().cloned() else {
            return;
        };
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record(&comparison) {
                tracing::warn!(error = %e, "failed to write comparison log entry");
            }
        }
        if !self.observers.is_empty() {
            let event = ComparisonEvent {
                session_id: session.id,
                index: session.state.len(),
                comparison: comparison.clone(),
                pass: self.counters.passes_completed + 1,
                aggregate_confidence: aggregate_confidence(
                    &session.model,
                    &session.uncertainty,
                    session.state.item_ids(),
                ),
                recorded_at: Utc::now(),
            };
            for observer in &self.observers {
                if let Err(e) = observer.on_comparison(event.clone()).await {
                    tracing::warn!(error = %e, "comparison observer failed");
                }
            }
        }
        log_comparison(&comparison, session.state.len());
    }

    fn publish(
        &self,
        session: &Session,
        suspension: Option<Suspension>,
        stop_reason: Option<DriverStopReason>,
    ) {
        let snapshot = SessionSnapshot {
            session_id: session.id,
            driver_state: self.state,
            suspension,
            ranking: Arc::new(RankingSnapshot::build(
                &session.state,
                &session.model,
                &session.uncertainty,
            )),
            passes_completed: self.counters.passes_completed,
            oracle_faults: self.counters.oracle_faults,
            model_fit_failures: self.counters.model_fit_failures,
            skips: self.counters.skips,
            stop_reason,
            published_at: Utc::now(),
        };
        self.publisher.send_replace(Arc::new(snapshot));
    }
}

fn log_comparison(comparison: &Comparison, index: usize) {
    tracing::debug!(
        index,
        winner = %comparison.winner,
        loser = %comparison.loser,
        "comparison recorded"
    );
}

/// Middle item of `block` under the current model order.
fn median_by_model(block: &[ItemId], model: &StrengthModel) -> ItemId {
    let mut ordered: Vec<&ItemId> = block.iter().collect();
    ordered.sort_by(|a, b| {
        model
            .strength(b)
            .value_or_neutral()
            .total_cmp(&model.strength(a).value_or_neutral())
            .then_with(|| a.cmp(b))
    });
    ordered[(ordered.len() - 1) / 2].clone()
}

/// Fresh estimate for a session that has not run yet.
pub(crate) fn initial_estimate(items: &[ItemId]) -> Arc<UncertaintyEstimate> {
    Arc::new(UncertaintyEstimate::maximal(items))
}
