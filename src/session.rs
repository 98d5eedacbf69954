//! Session lifecycle: start, pause, resume, stop, and read-only views.
//!
//! The controller owns the [`Session`] until `start`, hands it to a driver task,
//! and gets it back when the task finishes. Readers only ever see immutable
//! snapshots swapped through a `watch` channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bradley_terry::{BradleyTerryModel, StrengthModel};
use crate::config::EngineConfig;
use crate::driver::{
    self, AdaptiveSortDriver, DriverControl, DriverOutcome, DriverState, DriverStopReason,
};
use crate::error::{ConfigurationError, LifecycleError};
use crate::hooks::ComparisonObserver;
use crate::oracle::ComparisonOracle;
use crate::snapshot::{RankingSnapshot, SessionSnapshot};
use crate::state::{Comparison, ItemId, RankingState, StateReplayError};
use crate::trace::ComparisonSink;
use crate::uncertainty::UncertaintyEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Result of a lifecycle request that may not apply in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Ignored(LifecycleError),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Replay(#[from] StateReplayError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("driver task failed: {0}")]
    Driver(String),
}

/// One ranking run: the log plus the latest derived estimates.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) id: Uuid,
    pub(crate) state: RankingState,
    pub(crate) model: Arc<StrengthModel>,
    pub(crate) uncertainty: Arc<UncertaintyEstimate>,
}

impl Session {
    fn new(state: RankingState, fitter: &BradleyTerryModel) -> Self {
        let model = match fitter.fit(state.comparisons(), state.item_ids()) {
            Ok(model) => model,
            Err(e) => {
                tracing::warn!(error = %e, "warm-start fit failed; starting from a uniform model");
                StrengthModel::uniform(state.item_ids())
            }
        };
        let uncertainty = driver::initial_estimate(state.item_ids());
        Self {
            id: Uuid::new_v4(),
            state,
            model: Arc::new(model),
            uncertainty,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &RankingState {
        &self.state
    }

    pub fn model(&self) -> &StrengthModel {
        &self.model
    }

    pub fn uncertainty(&self) -> &UncertaintyEstimate {
        &self.uncertainty
    }

    pub fn snapshot(&self) -> RankingSnapshot {
        RankingSnapshot::build(&self.state, &self.model, &self.uncertainty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatistics {
    pub session_id: Option<Uuid>,
    pub status: SessionStatus,
    pub comparisons_made: usize,
    pub item_count: usize,
    pub aggregate_confidence: f64,
    pub top_item: Option<ItemId>,
    pub most_uncertain_item: Option<ItemId>,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub driver_state: DriverState,
    pub passes_completed: usize,
    pub oracle_faults: usize,
    pub model_fit_failures: usize,
    pub skips: usize,
    pub stop_reason: Option<DriverStopReason>,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

type DriverTask = JoinHandle<(Session, DriverOutcome)>;

pub struct SessionController {
    oracle: Arc<dyn ComparisonOracle>,
    config: EngineConfig,
    observers: Vec<Arc<dyn ComparisonObserver>>,
    sink: Option<Arc<dyn ComparisonSink>>,
    status: SessionStatus,
    control: Option<DriverControl>,
    task: Option<DriverTask>,
    publisher: watch::Sender<Arc<SessionSnapshot>>,
    snapshots: watch::Receiver<Arc<SessionSnapshot>>,
    started_at: Option<Instant>,
    stopped_after: Option<Duration>,
    session: Option<Session>,
    outcome: Option<DriverOutcome>,
    final_snapshot: Option<Arc<RankingSnapshot>>,
    /// First failure seen joining the driver task.
    join_error: Option<String>,
}

impl SessionController {
    pub fn new(
        oracle: Arc<dyn ComparisonOracle>,
        config: EngineConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let (publisher, snapshots) = watch::channel(Arc::new(SessionSnapshot::idle()));
        Ok(Self {
            oracle,
            config,
            observers: Vec::new(),
            sink: None,
            status: SessionStatus::Idle,
            control: None,
            task: None,
            publisher,
            snapshots,
            started_at: None,
            stopped_after: None,
            session: None,
            outcome: None,
            final_snapshot: None,
            join_error: None,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ComparisonObserver>) -> Self {
        self.add_observer(observer);
        self
    }

    /// Register another observer. Applies from the next `start`.
    pub fn add_observer(&mut self, observer: Arc<dyn ComparisonObserver>) {
        self.observers.push(observer);
    }

    /// Unregister `observer` by identity. Applies from the next `start`.
    pub fn remove_observer(&mut self, observer: &Arc<dyn ComparisonObserver>) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| !Arc::ptr_eq(o, observer));
        self.observers.len() != before
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn ComparisonSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Register `items` and start the driver. Needs a tokio runtime.
    pub fn start(&mut self, items: impl IntoIterator<Item = ItemId>) -> Result<Uuid, SessionError> {
        self.ensure_idle()?;
        let state = RankingState::new(items)?;
        Ok(self.launch(state))
    }

    /// Start from a stored comparison log. Every entry is validated first.
    pub fn start_from_log(
        &mut self,
        items: impl IntoIterator<Item = ItemId>,
        log: impl IntoIterator<Item = Comparison>,
    ) -> Result<Uuid, SessionError> {
        self.ensure_idle()?;
        let state = RankingState::from_log(items, log)?;
        Ok(self.launch(state))
    }

    fn ensure_idle(&self) -> Result<(), LifecycleError> {
        match self.status {
            SessionStatus::Idle => Ok(()),
            SessionStatus::Running | SessionStatus::Paused => Err(LifecycleError::AlreadyRunning),
            SessionStatus::Stopped => Err(LifecycleError::AlreadyStopped),
        }
    }

    fn launch(&mut self, state: RankingState) -> Uuid {
        let mut session = Session::new(state, &BradleyTerryModel::new(self.config.bradley_terry.clone()));
        let id = session.id;
        let control = DriverControl::new();
        let mut driver = AdaptiveSortDriver::new(
            self.oracle.clone(),
            self.config.clone(),
            control.clone(),
            self.publisher.clone(),
        )
        .with_observers(self.observers.clone())
        .with_log_sink(self.sink.clone());

        tracing::info!(session_id = %id, items = session.state.item_ids().len(), "session started");
        self.task = Some(tokio::spawn(async move {
            let outcome = driver.run(&mut session).await;
            (session, outcome)
        }));
        self.control = Some(control);
        self.status = SessionStatus::Running;
        self.started_at = Some(Instant::now());
        id
    }

    pub fn pause(&mut self) -> Transition {
        match self.status {
            SessionStatus::Running => {
                if self.driver_finished() {
                    return Transition::Ignored(LifecycleError::DriverFinished);
                }
                if let Some(control) = &self.control {
                    control.pause();
                }
                self.status = SessionStatus::Paused;
                Transition::Applied
            }
            SessionStatus::Paused => Transition::Ignored(LifecycleError::AlreadyPaused),
            SessionStatus::Idle => Transition::Ignored(LifecycleError::NotStarted),
            SessionStatus::Stopped => Transition::Ignored(LifecycleError::AlreadyStopped),
        }
    }

    fn driver_finished(&self) -> bool {
        matches!(
            self.snapshots.borrow().driver_state,
            DriverState::Converged | DriverState::Cancelled
        )
    }

    /// Leave `Paused`, or retry the pair a running session is stuck on after
    /// an oracle fault.
    pub fn resume(&mut self) -> Transition {
        match self.status {
            SessionStatus::Paused => {
                if let Some(control) = &self.control {
                    control.resume();
                }
                self.status = SessionStatus::Running;
                Transition::Applied
            }
            SessionStatus::Running => {
                if self.snapshots.borrow().is_awaiting_retry() {
                    if let Some(control) = &self.control {
                        control.resume();
                    }
                    Transition::Applied
                } else {
                    Transition::Ignored(LifecycleError::NotPaused)
                }
            }
            SessionStatus::Idle => Transition::Ignored(LifecycleError::NotStarted),
            SessionStatus::Stopped => Transition::Ignored(LifecycleError::AlreadyStopped),
        }
    }

    /// Cancel the driver, wait for it, and return the final ranking. Later
    /// calls return the same snapshot, or the same error.
    pub async fn stop(&mut self) -> Result<Arc<RankingSnapshot>, SessionError> {
        if let Some(done) = &self.final_snapshot {
            return Ok(done.clone());
        }
        if let Some(message) = &self.join_error {
            return Err(SessionError::Driver(message.clone()));
        }
        if self.status == SessionStatus::Idle {
            return Err(LifecycleError::NotStarted.into());
        }

        if let Some(control) = &self.control {
            control.cancel();
        }
        let Some(task) = self.task.take() else {
            return Err(SessionError::Driver("driver task missing".to_string()));
        };
        let joined = task.await;
        self.status = SessionStatus::Stopped;
        self.stopped_after = self.started_at.map(|t| t.elapsed());

        let (session, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(error = %e, "driver task failed");
                self.join_error = Some(e.to_string());
                return Err(SessionError::Driver(e.to_string()));
            }
        };
        let snapshot = Arc::new(session.snapshot());
        tracing::info!(
            session_id = %session.id,
            comparisons = session.state.len(),
            reason = ?outcome.stop_reason,
            "session stopped"
        );
        self.session = Some(session);
        self.outcome = Some(outcome);
        self.final_snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Drop a stopped session so the controller can start again.
    pub fn reset(&mut self) -> Transition {
        match self.status {
            SessionStatus::Stopped => {
                self.control = None;
                self.task = None;
                self.session = None;
                self.outcome = None;
                self.final_snapshot = None;
                self.join_error = None;
                self.started_at = None;
                self.stopped_after = None;
                self.publisher.send_replace(Arc::new(SessionSnapshot::idle()));
                self.status = SessionStatus::Idle;
                Transition::Applied
            }
            SessionStatus::Idle => Transition::Ignored(LifecycleError::NotStarted),
            SessionStatus::Running | SessionStatus::Paused => {
                Transition::Ignored(LifecycleError::AlreadyRunning)
            }
        }
    }

    /// Wait until the driver stops on its own (a stop condition) or is
    /// cancelled. Returns immediately when no session is running.
    pub async fn wait_for_driver(&self) {
        if !matches!(self.status, SessionStatus::Running | SessionStatus::Paused) {
            return;
        }
        let mut snapshots = self.snapshots.clone();
        loop {
            let finished = matches!(
                snapshots.borrow_and_update().driver_state,
                DriverState::Converged | DriverState::Cancelled
            );
            if finished || snapshots.changed().await.is_err() {
                return;
            }
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshots.clone()
    }

    /// The finished session, after `stop`.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn outcome(&self) -> Option<&DriverOutcome> {
        self.outcome.as_ref()
    }

    pub fn statistics(&self) -> SessionStatistics {
        let live = self.snapshot();
        let ranking: &RankingSnapshot = match &self.final_snapshot {
            Some(done) => done.as_ref(),
            None => live.ranking.as_ref(),
        };
        let elapsed = match (self.stopped_after, self.started_at) {
            (Some(d), _) => d,
            (None, Some(t)) => t.elapsed(),
            (None, None) => Duration::ZERO,
        };
        let (driver_state, stop_reason, counters) = match &self.outcome {
            Some(o) => (o.state, Some(o.stop_reason.clone()), Some(o.counters.clone())),
            None => (live.driver_state, live.stop_reason.clone(), None),
        };

        SessionStatistics {
            session_id: self
                .session
                .as_ref()
                .map(|s| s.id)
                .or((live.session_id != Uuid::nil()).then_some(live.session_id)),
            status: self.status,
            comparisons_made: ranking.comparisons_made,
            item_count: ranking.entries.len(),
            aggregate_confidence: ranking.aggregate_confidence,
            top_item: ranking.top_item().cloned(),
            most_uncertain_item: ranking.most_uncertain_item().cloned(),
            elapsed,
            driver_state,
            passes_completed: counters
                .as_ref()
                .map(|c| c.passes_completed)
                .unwrap_or(live.passes_completed),
            oracle_faults: counters
                .as_ref()
                .map(|c| c.oracle_faults)
                .unwrap_or(live.oracle_faults),
            model_fit_failures: counters
                .as_ref()
                .map(|c| c.model_fit_failures)
                .unwrap_or(live.model_fit_failures),
            skips: counters.as_ref().map(|c| c.skips).unwrap_or(live.skips),
            stop_reason,
        }
    }
}
