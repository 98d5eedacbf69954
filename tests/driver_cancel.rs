use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ordinal_harness::{
    ComparisonOracle, DriverState, DriverStopReason, EngineConfig, ItemId, OracleError,
    OracleVerdict, SessionController, SessionStatus, Suspension,
};
use tokio::sync::Notify;

/// Blocks every call until the test releases it.
struct GatedOracle {
    entered: Notify,
    release: Notify,
    calls: AtomicUsize,
}

impl GatedOracle {
    fn new() -> Self {
        Self {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl ComparisonOracle for GatedOracle {
    async fn compare(&self, a: &ItemId, _b: &ItemId) -> Result<OracleVerdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(OracleVerdict::winner(a.clone()))
    }
}

fn ids(names: &[&str]) -> Vec<ItemId> {
    names.iter().map(|n| ItemId::from(*n)).collect()
}

#[tokio::test]
async fn cancel_during_oracle_call_keeps_the_answer_and_stops() {
    let oracle = Arc::new(GatedOracle::new());
    let mut controller = SessionController::new(oracle.clone(), EngineConfig::default()).unwrap();
    controller.start(ids(&["a", "b", "c", "d"])).unwrap();

    oracle.entered.notified().await;
    let snap = controller.snapshot();
    assert!(matches!(snap.suspension, Some(Suspension::AwaitingOracle { .. })));

    let gate = oracle.clone();
    let (ranking, ()) = tokio::join!(controller.stop(), async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.release.notify_one();
    });
    let ranking = ranking.unwrap();

    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    assert_eq!(ranking.comparisons_made, 1);
    assert_eq!(controller.status(), SessionStatus::Stopped);

    let outcome = controller.outcome().unwrap();
    assert_eq!(outcome.state, DriverState::Cancelled);
    assert_eq!(outcome.stop_reason, DriverStopReason::Cancelled);
    assert_eq!(outcome.counters.comparisons_made, 1);

    let session = controller.session().unwrap();
    assert_eq!(session.state().len(), 1);
    assert_eq!(session.model().comparison_count(), 1);
}

#[tokio::test]
async fn cancel_before_first_call_records_nothing() {
    let oracle = Arc::new(GatedOracle::new());
    let mut controller = SessionController::new(oracle.clone(), EngineConfig::default()).unwrap();
    controller.start(ids(&["a", "b"])).unwrap();
    assert!(controller.pause().is_applied());

    // Either the driver is parked on the pause or it is inside the first
    // call; release once so the second case can finish too.
    oracle.release.notify_one();
    let ranking = controller.stop().await.unwrap();
    assert!(ranking.comparisons_made <= 1);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), ranking.comparisons_made);
    assert_eq!(
        controller.statistics().stop_reason,
        Some(DriverStopReason::Cancelled)
    );
}
