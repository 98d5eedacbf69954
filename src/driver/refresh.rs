//! Background bootstrap refresh.
//!
//! Bootstrap refits are CPU-bound, so they run on the blocking pool. At most
//! one estimate is in flight. The driver waits up to the configured budget for
//! it and otherwise keeps selecting with the previous estimate.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::state::RankingState;
use crate::uncertainty::{UncertaintyConfig, UncertaintyEstimate, UncertaintyEstimator};

struct PendingEstimate {
    log_len: usize,
    handle: JoinHandle<UncertaintyEstimate>,
}

pub struct UncertaintyRefresher {
    estimator: UncertaintyEstimator,
    config: UncertaintyConfig,
    latest: Arc<UncertaintyEstimate>,
    pending: Option<PendingEstimate>,
}

impl UncertaintyRefresher {
    pub fn new(
        estimator: UncertaintyEstimator,
        config: UncertaintyConfig,
        initial: Arc<UncertaintyEstimate>,
    ) -> Self {
        Self {
            estimator,
            config,
            latest: initial,
            pending: None,
        }
    }

    pub fn latest(&self) -> Arc<UncertaintyEstimate> {
        self.latest.clone()
    }

    /// Seed for the estimate over a log of `log_len` entries.
    fn seed_for(&self, log_len: usize) -> u64 {
        self.config.seed ^ (log_len as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    }

    fn spawn(&mut self, state: &RankingState) {
        let estimator = self.estimator.clone();
        let comparisons = state.comparisons().to_vec();
        let items = state.item_ids().to_vec();
        let n_bootstrap = self.config.n_bootstrap;
        let seed = self.seed_for(comparisons.len());
        let log_len = comparisons.len();
        let handle = tokio::task::spawn_blocking(move || {
            estimator.estimate(&comparisons, &items, n_bootstrap, seed)
        });
        self.pending = Some(PendingEstimate { log_len, handle });
    }

    /// Collect a finished estimate, if any, without waiting.
    async fn harvest_finished(&mut self) {
        let finished = self
            .pending
            .as_ref()
            .map(|p| p.handle.is_finished())
            .unwrap_or(false);
        if finished {
            if let Some(pending) = self.pending.take() {
                self.accept(pending.handle.await);
            }
        }
    }

    fn accept(&mut self, joined: Result<UncertaintyEstimate, tokio::task::JoinError>) {
        match joined {
            Ok(estimate) => {
                if estimate.comparison_count() >= self.latest.comparison_count() {
                    self.latest = Arc::new(estimate);
                }
            }
            Err(e) => tracing::warn!(error = %e, "uncertainty refresh task failed"),
        }
    }

    /// Bring the estimate up to date with `state`, waiting at most the budget.
    pub async fn refresh(&mut self, state: &RankingState) -> Arc<UncertaintyEstimate> {
        self.harvest_finished().await;
        if self.pending.is_none() && self.latest.comparison_count() != state.len() {
            self.spawn(state);
        }

        let budget = Duration::from_millis(self.config.budget_ms);
        let waited = match self.pending.as_mut() {
            Some(pending) => Some(timeout(budget, &mut pending.handle).await),
            None => None,
        };
        match waited {
            Some(Ok(joined)) => {
                self.pending = None;
                self.accept(joined);
            }
            Some(Err(_)) => {
                let target_len = self.pending.as_ref().map(|p| p.log_len).unwrap_or(0);
                tracing::debug!(
                    target_len,
                    current_len = state.len(),
                    "uncertainty refresh over budget; using previous estimate"
                );
            }
            None => {}
        }
        self.latest.clone()
    }

    /// Wait without a deadline until the estimate matches `state`.
    pub async fn settle(&mut self, state: &RankingState) -> Arc<UncertaintyEstimate> {
        if let Some(pending) = self.pending.take() {
            self.accept(pending.handle.await);
        }
        if self.latest.comparison_count() != state.len() {
            self.spawn(state);
            if let Some(pending) = self.pending.take() {
                self.accept(pending.handle.await);
            }
        }
        self.latest.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ItemId;

    fn state_with_log() -> RankingState {
        let mut state = RankingState::new(["a", "b", "c"].map(ItemId::from)).unwrap();
        let (a, b, c) = (ItemId::from("a"), ItemId::from("b"), ItemId::from("c"));
        state.add_comparison(&a, &b).unwrap();
        state.add_comparison(&b, &c).unwrap();
        state.add_comparison(&c, &a).unwrap();
        state
    }

    #[tokio::test]
    async fn settle_matches_direct_estimate() {
        let state = state_with_log();
        let config = UncertaintyConfig::default();
        let mut refresher = UncertaintyRefresher::new(
            UncertaintyEstimator::default(),
            config.clone(),
            Arc::new(UncertaintyEstimate::maximal(state.item_ids())),
        );
        let settled = refresher.settle(&state).await;

        let direct = UncertaintyEstimator::default().estimate(
            state.comparisons(),
            state.item_ids(),
            config.n_bootstrap,
            refresher.seed_for(state.len()),
        );
        assert_eq!(*settled, direct);
        assert_eq!(settled.comparison_count(), 3);
    }

    #[tokio::test]
    async fn zero_budget_keeps_previous_estimate_until_ready() {
        let state = state_with_log();
        let initial = Arc::new(UncertaintyEstimate::maximal(state.item_ids()));
        let mut refresher = UncertaintyRefresher::new(
            UncertaintyEstimator::default(),
            UncertaintyConfig {
                budget_ms: 0,
                ..UncertaintyConfig::default()
            },
            initial,
        );
        let first = refresher.refresh(&state).await;
        assert!(first.comparison_count() == 0 || first.comparison_count() == 3);
        let settled = refresher.settle(&state).await;
        assert_eq!(settled.comparison_count(), 3);
    }
}
