//! Comparison log and registered item set: the single source of truth for a
//! ranking session.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, InvalidComparisonError};

/// Opaque item identifier supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unordered pair key: the lexicographically smaller id comes first.
pub type PairKey = (ItemId, ItemId);

pub fn pair_key(a: &ItemId, b: &ItemId) -> PairKey {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// One recorded outcome. Immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub winner: ItemId,
    pub loser: ItemId,
    pub timestamp: DateTime<Utc>,
    /// Oracle-reported confidence, kept as metadata only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Comparison {
    pub fn new(winner: impl Into<ItemId>, loser: impl Into<ItemId>) -> Self {
        Self {
            winner: winner.into(),
            loser: loser.into(),
            timestamp: Utc::now(),
            confidence: None,
        }
    }

    pub fn involves(&self, item: &ItemId) -> bool {
        &self.winner == item || &self.loser == item
    }
}

/// Append-only comparison log over a fixed set of registered items.
#[derive(Debug, Clone)]
pub struct RankingState {
    items: Vec<ItemId>,
    index: HashMap<ItemId, usize>,
    log: Vec<Comparison>,
    per_item: Vec<usize>,
}

impl RankingState {
    /// Register the item set. Requires at least two unique ids.
    pub fn new(items: impl IntoIterator<Item = ItemId>) -> Result<Self, ConfigurationError> {
        let items: Vec<ItemId> = items.into_iter().collect();
        let mut index = HashMap::with_capacity(items.len());
        for (idx, id) in items.iter().enumerate() {
            if index.insert(id.clone(), idx).is_some() {
                return Err(ConfigurationError::DuplicateItem(id.clone()));
            }
        }
        if items.len() < 2 {
            return Err(ConfigurationError::TooFewItems { count: items.len() });
        }
        let per_item = vec![0; items.len()];
        Ok(Self {
            items,
            index,
            log: Vec::new(),
            per_item,
        })
    }

    /// Rebuild a state from a stored log, validating every entry in order.
    pub fn from_log(
        items: impl IntoIterator<Item = ItemId>,
        log: impl IntoIterator<Item = Comparison>,
    ) -> Result<Self, StateReplayError> {
        let mut state = Self::new(items)?;
        for (position, c) in log.into_iter().enumerate() {
            state
                .add_comparison_with(c.winner, c.loser, c.confidence, c.timestamp)
                .map_err(|source| StateReplayError::Entry { position, source })?;
        }
        Ok(state)
    }

    /// Record `winner` beating `loser` now. Returns the new log length.
    pub fn add_comparison(
        &mut self,
        winner: &ItemId,
        loser: &ItemId,
    ) -> Result<usize, InvalidComparisonError> {
        self.add_comparison_with(winner.clone(), loser.clone(), None, Utc::now())
    }

    pub fn add_comparison_with(
        &mut self,
        winner: ItemId,
        loser: ItemId,
        confidence: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<usize, InvalidComparisonError> {
        if winner == loser {
            return Err(InvalidComparisonError::SelfComparison(winner));
        }
        let w = self.position(&winner)?;
        let l = self.position(&loser)?;

        self.per_item[w] += 1;
        self.per_item[l] += 1;
        self.log.push(Comparison {
            winner,
            loser,
            timestamp,
            confidence: confidence.filter(|c| c.is_finite()),
        });
        Ok(self.log.len())
    }

    fn position(&self, id: &ItemId) -> Result<usize, InvalidComparisonError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| InvalidComparisonError::UnknownItem(id.clone()))
    }

    pub fn comparisons(&self) -> &[Comparison] {
        &self.log
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains_key(id)
    }

    /// Number of recorded comparisons involving `id` (0 for unknown ids).
    pub fn comparison_count(&self, id: &ItemId) -> usize {
        self.index.get(id).map(|&i| self.per_item[i]).unwrap_or(0)
    }

    /// How often each unordered pair occurs among the last `window` entries.
    pub fn recent_pair_counts(&self, window: usize) -> HashMap<PairKey, usize> {
        let start = self.log.len().saturating_sub(window);
        let mut counts = HashMap::new();
        for c in &self.log[start..] {
            *counts.entry(pair_key(&c.winner, &c.loser)).or_insert(0) += 1;
        }
        counts
    }

    pub fn win_matrix(&self) -> WinMatrix {
        let n = self.items.len();
        let mut wins = vec![vec![0usize; n]; n];
        for c in &self.log {
            // Entries were validated on insert.
            if let (Some(&w), Some(&l)) = (self.index.get(&c.winner), self.index.get(&c.loser)) {
                wins[w][l] += 1;
            }
        }
        WinMatrix {
            items: self.items.clone(),
            wins,
        }
    }
}

/// Pairwise win counts: `wins(a, b)` is how often `a` beat `b`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinMatrix {
    pub items: Vec<ItemId>,
    pub wins: Vec<Vec<usize>>,
}

impl WinMatrix {
    pub fn wins(&self, a: &ItemId, b: &ItemId) -> usize {
        let ia = self.items.iter().position(|id| id == a);
        let ib = self.items.iter().position(|id| id == b);
        match (ia, ib) {
            (Some(ia), Some(ib)) => self.wins[ia][ib],
            _ => 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateReplayError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("log entry {position}: {source}")]
    Entry {
        position: usize,
        source: InvalidComparisonError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ItemId> {
        names.iter().map(|n| ItemId::from(*n)).collect()
    }

    #[test]
    fn rejects_small_or_duplicate_item_sets() {
        assert_eq!(
            RankingState::new(ids(&["a"])).unwrap_err(),
            ConfigurationError::TooFewItems { count: 1 }
        );
        assert_eq!(
            RankingState::new(ids(&["a", "b", "a"])).unwrap_err(),
            ConfigurationError::DuplicateItem(ItemId::from("a"))
        );
    }

    #[test]
    fn add_comparison_appends_and_counts() {
        let mut state = RankingState::new(ids(&["a", "b", "c"])).unwrap();
        let a = ItemId::from("a");
        let b = ItemId::from("b");
        let c = ItemId::from("c");

        assert_eq!(state.add_comparison(&a, &b).unwrap(), 1);
        assert_eq!(state.add_comparison(&c, &b).unwrap(), 2);

        assert_eq!(state.comparisons()[0].winner, a);
        assert_eq!(state.comparisons()[1].loser, b);
        assert_eq!(state.comparison_count(&b), 2);
        assert_eq!(state.comparison_count(&a), 1);
        assert_eq!(state.win_matrix().wins(&c, &b), 1);
        assert_eq!(state.win_matrix().wins(&b, &c), 0);
    }

    #[test]
    fn invalid_comparisons_leave_log_untouched() {
        let mut state = RankingState::new(ids(&["a", "b"])).unwrap();
        let a = ItemId::from("a");
        let x = ItemId::from("x");

        assert_eq!(
            state.add_comparison(&a, &a).unwrap_err(),
            InvalidComparisonError::SelfComparison(a.clone())
        );
        assert_eq!(
            state.add_comparison(&a, &x).unwrap_err(),
            InvalidComparisonError::UnknownItem(x)
        );
        assert!(state.is_empty());
        assert_eq!(state.comparison_count(&a), 0);
    }

    #[test]
    fn recent_pair_counts_only_sees_trailing_window() {
        let mut state = RankingState::new(ids(&["a", "b", "c"])).unwrap();
        let (a, b, c) = (ItemId::from("a"), ItemId::from("b"), ItemId::from("c"));
        state.add_comparison(&a, &b).unwrap();
        state.add_comparison(&b, &a).unwrap();
        state.add_comparison(&a, &c).unwrap();

        let all = state.recent_pair_counts(10);
        assert_eq!(all.get(&pair_key(&a, &b)), Some(&2));

        let last_two = state.recent_pair_counts(2);
        assert_eq!(last_two.get(&pair_key(&b, &a)), Some(&1));
        assert_eq!(last_two.get(&pair_key(&c, &a)), Some(&1));
    }

    #[test]
    fn from_log_reports_offending_position() {
        let log = vec![Comparison::new("a", "b"), Comparison::new("a", "z")];
        match RankingState::from_log(ids(&["a", "b"]), log) {
            Err(StateReplayError::Entry { position, .. }) => assert_eq!(position, 1),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
