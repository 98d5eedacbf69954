//! Read-only views of a session, published to readers as immutable `Arc`s.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::bradley_terry::{Strength, StrengthModel};
use crate::driver::{DriverState, DriverStopReason, Suspension};
use crate::state::{ItemId, RankingState};
use crate::uncertainty::{Uncertainty, UncertaintyEstimate};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// 1-based.
    pub rank: usize,
    pub item: ItemId,
    pub strength: Strength,
    pub uncertainty: Uncertainty,
    pub normalized_uncertainty: f64,
    /// Items with different labels are not comparable.
    pub component: usize,
    pub comparisons: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingSnapshot {
    pub entries: Vec<RankedEntry>,
    pub comparisons_made: usize,
    pub aggregate_confidence: f64,
    pub component_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// `1 - mean(normalized uncertainty)` over `items`; 0 for an empty set.
pub fn aggregate_confidence(
    model: &StrengthModel,
    uncertainty: &UncertaintyEstimate,
    items: &[ItemId],
) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let total: f64 = items.iter().map(|id| uncertainty.normalized(model, id)).sum();
    (1.0 - total / items.len() as f64).clamp(0.0, 1.0)
}

impl RankingSnapshot {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            comparisons_made: 0,
            aggregate_confidence: 0.0,
            component_count: 0,
            generated_at: Utc::now(),
        }
    }

    pub fn build(
        state: &RankingState,
        model: &StrengthModel,
        uncertainty: &UncertaintyEstimate,
    ) -> Self {
        let entries = model
            .ranking()
            .into_iter()
            .enumerate()
            .map(|(pos, item)| RankedEntry {
                rank: pos + 1,
                strength: model.strength(&item),
                uncertainty: uncertainty.get(&item),
                normalized_uncertainty: uncertainty.normalized(model, &item),
                component: model.component(&item).unwrap_or(usize::MAX),
                comparisons: state.comparison_count(&item),
                item,
            })
            .collect();

        Self {
            entries,
            comparisons_made: state.len(),
            aggregate_confidence: aggregate_confidence(model, uncertainty, state.item_ids()),
            component_count: model.component_count(),
            generated_at: Utc::now(),
        }
    }

    pub fn ranking(&self) -> Vec<ItemId> {
        self.entries.iter().map(|e| e.item.clone()).collect()
    }

    pub fn entry(&self, id: &ItemId) -> Option<&RankedEntry> {
        self.entries.iter().find(|e| &e.item == id)
    }

    pub fn top_item(&self) -> Option<&ItemId> {
        self.entries.first().map(|e| &e.item)
    }

    /// Highest normalized uncertainty; the better-ranked item wins ties.
    pub fn most_uncertain_item(&self) -> Option<&ItemId> {
        let mut best: Option<&RankedEntry> = None;
        for entry in &self.entries {
            match best {
                Some(b) if entry.normalized_uncertainty <= b.normalized_uncertainty => {}
                _ => best = Some(entry),
            }
        }
        best.map(|e| &e.item)
    }
}

/// Everything a reader needs about a live session, swapped in atomically
/// after every step of the driver.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub driver_state: DriverState,
    pub suspension: Option<Suspension>,
    pub ranking: Arc<RankingSnapshot>,
    pub passes_completed: usize,
    pub oracle_faults: usize,
    pub model_fit_failures: usize,
    pub skips: usize,
    pub stop_reason: Option<DriverStopReason>,
    pub published_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Placeholder published before any session has started.
    pub fn idle() -> Self {
        Self {
            session_id: Uuid::nil(),
            driver_state: DriverState::Idle,
            suspension: None,
            ranking: Arc::new(RankingSnapshot::empty()),
            passes_completed: 0,
            oracle_faults: 0,
            model_fit_failures: 0,
            skips: 0,
            stop_reason: None,
            published_at: Utc::now(),
        }
    }

    pub fn is_awaiting_retry(&self) -> bool {
        matches!(self.suspension, Some(Suspension::AwaitingRetry { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bradley_terry::BradleyTerryModel;

    #[test]
    fn snapshot_of_fresh_state_is_all_sentinels() {
        let state = RankingState::new(["b", "a"].map(ItemId::from)).unwrap();
        let model = StrengthModel::uniform(state.item_ids());
        let unc = UncertaintyEstimate::maximal(state.item_ids());
        let snap = RankingSnapshot::build(&state, &model, &unc);

        assert_eq!(snap.ranking(), vec![ItemId::from("a"), ItemId::from("b")]);
        assert!(snap.entries.iter().all(|e| e.strength == Strength::Undefined));
        assert_eq!(snap.aggregate_confidence, 0.0);
        assert_eq!(snap.most_uncertain_item(), Some(&ItemId::from("a")));
    }

    #[test]
    fn fitted_snapshot_ranks_winner_first() {
        let mut state = RankingState::new(["a", "b", "c"].map(ItemId::from)).unwrap();
        state
            .add_comparison(&ItemId::from("c"), &ItemId::from("a"))
            .unwrap();
        let model = BradleyTerryModel::default()
            .fit(state.comparisons(), state.item_ids())
            .unwrap();
        let unc = UncertaintyEstimate::maximal(state.item_ids());
        let snap = RankingSnapshot::build(&state, &model, &unc);

        assert_eq!(snap.top_item(), Some(&ItemId::from("c")));
        assert_eq!(snap.comparisons_made, 1);
        assert_eq!(snap.component_count, 2);
        assert_eq!(snap.entry(&ItemId::from("c")).unwrap().comparisons, 1);
    }
}
