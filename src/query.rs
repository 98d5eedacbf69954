//! Pair selection: which two items to put in front of the oracle next.
//!
//! Two concrete scoring stages exist. `Diversity` spreads early comparisons
//! across the current order; `InformationGain` targets the pair whose outcome
//! is least predictable, weighted by how little is known about either item.
//! `Adaptive` moves from the first to the second by an explicit threshold table
//! on the number of comparisons made.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bradley_terry::StrengthModel;
use crate::error::ConfigurationError;
use crate::state::{pair_key, ItemId, PairKey, RankingState};
use crate::uncertainty::UncertaintyEstimate;

/// Gains closer than this are treated as equal and fall back to id order.
const GAIN_TIE_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    Diversity,
    InformationGain,
    Adaptive,
}

/// Scoring rule applied to one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Diversity,
    InformationGain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub strategy: QueryStrategy,
    /// Adaptive: pure diversity below this many comparisons.
    pub diversity_until: usize,
    /// Adaptive: pure information gain from this many comparisons on.
    pub information_gain_from: usize,
    /// Trailing log entries inspected by the repeat exclusion.
    pub repeat_window: usize,
    /// A pair seen more than this many times inside the window is skipped
    /// while any other candidate remains. Zero bans any repeat in the window.
    pub max_repeats: usize,
    /// Seed for the adaptive blend draw.
    pub seed: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            strategy: QueryStrategy::Adaptive,
            diversity_until: 10,
            information_gain_from: 50,
            repeat_window: 10,
            max_repeats: 1,
            seed: 0x5e1e_c7ed,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuerySelector {
    config: SelectorConfig,
}

impl QuerySelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Threshold table. Deterministic for a given seed and count.
    pub fn stage(&self, comparison_count: usize) -> Stage {
        match self.config.strategy {
            QueryStrategy::Diversity => Stage::Diversity,
            QueryStrategy::InformationGain => Stage::InformationGain,
            QueryStrategy::Adaptive => {
                let lo = self.config.diversity_until;
                let hi = self.config.information_gain_from.max(lo);
                if comparison_count < lo {
                    Stage::Diversity
                } else if comparison_count >= hi {
                    Stage::InformationGain
                } else {
                    let p = (comparison_count - lo) as f64 / (hi - lo) as f64;
                    let mut rng = StdRng::seed_from_u64(self.config.seed ^ comparison_count as u64);
                    if rng.gen::<f64>() < p {
                        Stage::InformationGain
                    } else {
                        Stage::Diversity
                    }
                }
            }
        }
    }

    /// Best pair over all registered items.
    ///
    /// The returned pair is ordered by id. Never a self pair, never an
    /// unregistered id.
    pub fn select_pair(
        &self,
        state: &RankingState,
        strengths: &StrengthModel,
        uncertainties: &UncertaintyEstimate,
        comparison_count: usize,
    ) -> Result<(ItemId, ItemId), ConfigurationError> {
        let items = state.item_ids();
        if items.len() < 2 {
            return Err(ConfigurationError::TooFewItems { count: items.len() });
        }
        let mut candidates = Vec::with_capacity(items.len() * (items.len() - 1) / 2);
        for (i, a) in items.iter().enumerate() {
            for b in &items[i + 1..] {
                candidates.push((a.clone(), b.clone()));
            }
        }
        self.select_among(state, strengths, uncertainties, comparison_count, &candidates)
    }

    /// Best pair from a caller-restricted candidate set.
    pub fn select_among(
        &self,
        state: &RankingState,
        strengths: &StrengthModel,
        uncertainties: &UncertaintyEstimate,
        comparison_count: usize,
        candidates: &[(ItemId, ItemId)],
    ) -> Result<(ItemId, ItemId), ConfigurationError> {
        if state.item_ids().len() < 2 {
            return Err(ConfigurationError::TooFewItems {
                count: state.item_ids().len(),
            });
        }

        let mut pairs: Vec<PairKey> = candidates
            .iter()
            .filter(|(a, b)| a != b && state.contains(a) && state.contains(b))
            .map(|(a, b)| pair_key(a, b))
            .collect();
        pairs.sort();
        pairs.dedup();
        if pairs.is_empty() {
            return Err(ConfigurationError::invalid(
                "candidates",
                "no pair of distinct registered items",
            ));
        }

        let recent = state.recent_pair_counts(self.config.repeat_window);
        let fresh: Vec<PairKey> = pairs
            .iter()
            .filter(|p| recent.get(*p).copied().unwrap_or(0) <= self.config.max_repeats)
            .cloned()
            .collect();
        let pool = if fresh.is_empty() { pairs } else { fresh };

        let stage = self.stage(comparison_count);
        let chosen = match stage {
            Stage::InformationGain => best_information_gain(&pool, strengths, uncertainties),
            Stage::Diversity => best_diversity(&pool, state, strengths),
        };
        tracing::trace!(?stage, a = %chosen.0, b = %chosen.1, "selected pair");
        Ok(chosen)
    }
}

fn binary_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -p * p.log2() - (1.0 - p) * (1.0 - p).log2()
}

/// `pool` must be non-empty and sorted by id pair.
fn best_information_gain(
    pool: &[PairKey],
    strengths: &StrengthModel,
    uncertainties: &UncertaintyEstimate,
) -> PairKey {
    let mut best = pool[0].clone();
    let mut best_gain = f64::NEG_INFINITY;
    for (a, b) in pool {
        let p = strengths.win_probability(a, b);
        let u_a = uncertainties.normalized(strengths, a);
        let u_b = uncertainties.normalized(strengths, b);
        let gain = binary_entropy(p) * (1.0 + u_a + u_b);
        if gain > best_gain + GAIN_TIE_TOLERANCE {
            best_gain = gain;
            best = (a.clone(), b.clone());
        }
    }
    best
}

/// `pool` must be non-empty.
fn best_diversity(pool: &[PairKey], state: &RankingState, strengths: &StrengthModel) -> PairKey {
    let rank: HashMap<ItemId, usize> = strengths
        .ranking()
        .into_iter()
        .enumerate()
        .map(|(pos, id)| (id, pos))
        .collect();
    let distance = |a: &ItemId, b: &ItemId| {
        let ra = rank.get(a).copied().unwrap_or(0);
        let rb = rank.get(b).copied().unwrap_or(0);
        ra.abs_diff(rb)
    };
    let seen = |a: &ItemId, b: &ItemId| state.comparison_count(a) + state.comparison_count(b);

    pool.iter()
        .min_by(|(a1, b1), (a2, b2)| {
            distance(a2, b2)
                .cmp(&distance(a1, b1))
                .then_with(|| seen(a1, b1).cmp(&seen(a2, b2)))
                .then_with(|| (a1, b1).cmp(&(a2, b2)))
        })
        .cloned()
        .unwrap_or_else(|| pool[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bradley_terry::BradleyTerryModel;

    fn state(names: &[&str]) -> RankingState {
        RankingState::new(names.iter().map(|n| ItemId::from(*n))).unwrap()
    }

    fn fitted(state: &RankingState) -> (StrengthModel, UncertaintyEstimate) {
        let model = BradleyTerryModel::default()
            .fit(state.comparisons(), state.item_ids())
            .unwrap();
        let unc = UncertaintyEstimate::maximal(state.item_ids());
        (model, unc)
    }

    fn selector(strategy: QueryStrategy) -> QuerySelector {
        QuerySelector::new(SelectorConfig {
            strategy,
            ..SelectorConfig::default()
        })
    }

    #[test]
    fn adaptive_threshold_table() {
        let sel = selector(QueryStrategy::Adaptive);
        assert_eq!(sel.stage(0), Stage::Diversity);
        assert_eq!(sel.stage(9), Stage::Diversity);
        assert_eq!(sel.stage(50), Stage::InformationGain);
        assert_eq!(sel.stage(500), Stage::InformationGain);
        for count in 10..50 {
            assert_eq!(sel.stage(count), sel.stage(count));
        }
    }

    #[test]
    fn information_gain_ties_break_lexicographically() {
        let s = state(&["d", "c", "b", "a"]);
        let (model, unc) = fitted(&s);
        let pair = selector(QueryStrategy::InformationGain)
            .select_pair(&s, &model, &unc, 0)
            .unwrap();
        assert_eq!(pair, (ItemId::from("a"), ItemId::from("b")));
    }

    #[test]
    fn diversity_starts_from_opposite_ends() {
        let s = state(&["a", "b", "c", "d"]);
        let (model, unc) = fitted(&s);
        let pair = selector(QueryStrategy::Diversity)
            .select_pair(&s, &model, &unc, 0)
            .unwrap();
        assert_eq!(pair, (ItemId::from("a"), ItemId::from("d")));
    }

    #[test]
    fn pair_over_the_repeat_limit_is_excluded_until_nothing_else_remains() {
        let mut s = state(&["a", "b", "c"]);
        let (a, b, c) = (ItemId::from("a"), ItemId::from("b"), ItemId::from("c"));
        s.add_comparison(&a, &b).unwrap();
        s.add_comparison(&a, &b).unwrap();
        let (model, unc) = fitted(&s);
        let sel = selector(QueryStrategy::InformationGain);

        let pair = sel.select_pair(&s, &model, &unc, s.len()).unwrap();
        assert_ne!(pair, (a.clone(), b.clone()));

        let only = vec![(b.clone(), a.clone())];
        let forced = sel.select_among(&s, &model, &unc, s.len(), &only).unwrap();
        assert_eq!(forced, (a.clone(), b.clone()));

        let bad = vec![(c.clone(), c.clone()), (a.clone(), ItemId::from("zz"))];
        assert!(sel.select_among(&s, &model, &unc, s.len(), &bad).is_err());
    }

    #[test]
    fn pair_compared_once_stays_eligible_under_default_limit() {
        let mut s = state(&["a", "b", "c", "d"]);
        let (a, b, c, d) = (
            ItemId::from("a"),
            ItemId::from("b"),
            ItemId::from("c"),
            ItemId::from("d"),
        );
        s.add_comparison(&c, &d).unwrap();
        let (model, unc) = fitted(&s);
        let candidates = vec![(c.clone(), d.clone()), (a.clone(), b.clone())];

        // c and d sit at opposite ends of the fitted order.
        let pair = selector(QueryStrategy::Diversity)
            .select_among(&s, &model, &unc, s.len(), &candidates)
            .unwrap();
        assert_eq!(pair, (c.clone(), d.clone()));

        let strict = QuerySelector::new(SelectorConfig {
            strategy: QueryStrategy::Diversity,
            max_repeats: 0,
            ..SelectorConfig::default()
        });
        let pair = strict
            .select_among(&s, &model, &unc, s.len(), &candidates)
            .unwrap();
        assert_eq!(pair, (a, b));
    }

    #[test]
    fn entropy_peaks_at_even_odds() {
        assert!((binary_entropy(0.5) - 1.0).abs() < 1e-12);
        assert_eq!(binary_entropy(0.0), 0.0);
        assert!(binary_entropy(0.9) < binary_entropy(0.6));
    }
}
