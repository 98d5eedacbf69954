//! Bootstrap uncertainty for Bradley-Terry strengths.
//!
//! The comparison log is resampled with replacement, each resample is refitted,
//! and the per-item sample standard deviation of the log-strength across
//! resamples is reported. Resampling uses a seeded `StdRng`, so the same log
//! and seed always produce the same estimate.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bradley_terry::{BradleyTerryModel, StrengthModel};
use crate::state::{Comparison, ItemId};

/// Bootstrap settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UncertaintyConfig {
    /// Resamples per estimate.
    pub n_bootstrap: usize,
    /// Base seed. The driver mixes in the log length so successive estimates
    /// draw different resamples while staying reproducible.
    pub seed: u64,
    /// How long the driver waits for a fresh estimate before selecting with
    /// the previous one.
    pub budget_ms: u64,
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self {
            n_bootstrap: 50,
            seed: 0x0bd1_7a11,
            budget_ms: 250,
        }
    }
}

/// Spread of an item's log-strength across bootstrap resamples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Uncertainty {
    StdDev(f64),
    /// Fewer than two resamples produced a strength for the item.
    Maximal,
}

impl Uncertainty {
    pub fn std_dev(&self) -> Option<f64> {
        match self {
            Uncertainty::StdDev(sd) => Some(*sd),
            Uncertainty::Maximal => None,
        }
    }

    pub fn is_maximal(&self) -> bool {
        matches!(self, Uncertainty::Maximal)
    }
}

/// Map an uncertainty into `[0, 1]`, 1 meaning nothing is known.
///
/// `coverage` is the share of the other items the item is comparable with
/// (its component size minus one over the item count minus one). A tight
/// estimate inside a small component still counts as mostly unknown.
pub fn normalized_uncertainty(uncertainty: Uncertainty, coverage: f64) -> f64 {
    match uncertainty {
        Uncertainty::Maximal => 1.0,
        Uncertainty::StdDev(sd) => {
            let sd = if sd.is_finite() { sd.max(0.0) } else { return 1.0 };
            let coverage = coverage.clamp(0.0, 1.0);
            let certainty = 1.0 - sd / (sd + 1.0);
            (1.0 - certainty * coverage).clamp(0.0, 1.0)
        }
    }
}

/// Per-item uncertainties computed from one log snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertaintyEstimate {
    items: Vec<ItemId>,
    index: HashMap<ItemId, usize>,
    values: Vec<Uncertainty>,
    comparisons: usize,
}

impl UncertaintyEstimate {
    /// Every item at the `Maximal` sentinel.
    pub fn maximal(item_ids: &[ItemId]) -> Self {
        Self {
            items: item_ids.to_vec(),
            index: item_ids
                .iter()
                .enumerate()
                .map(|(i, id)| (id.clone(), i))
                .collect(),
            values: vec![Uncertainty::Maximal; item_ids.len()],
            comparisons: 0,
        }
    }

    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn values(&self) -> &[Uncertainty] {
        &self.values
    }

    /// `Maximal` for unknown ids.
    pub fn get(&self, id: &ItemId) -> Uncertainty {
        self.index
            .get(id)
            .map(|&i| self.values[i])
            .unwrap_or(Uncertainty::Maximal)
    }

    /// Log length this estimate was computed from.
    pub fn comparison_count(&self) -> usize {
        self.comparisons
    }

    /// Normalized uncertainty of `id`, using `model` for component coverage.
    pub fn normalized(&self, model: &StrengthModel, id: &ItemId) -> f64 {
        normalized_uncertainty(self.get(id), model.coverage(id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct UncertaintyEstimator {
    model: BradleyTerryModel,
}

impl UncertaintyEstimator {
    pub fn new(model: BradleyTerryModel) -> Self {
        Self { model }
    }

    pub fn estimate(
        &self,
        comparisons: &[Comparison],
        item_ids: &[ItemId],
        n_bootstrap: usize,
        seed: u64,
    ) -> UncertaintyEstimate {
        let mut estimate = UncertaintyEstimate::maximal(item_ids);
        estimate.comparisons = comparisons.len();
        if comparisons.is_empty() || n_bootstrap == 0 {
            return estimate;
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut samples: Vec<Vec<f64>> = vec![Vec::new(); item_ids.len()];
        let mut failed = 0usize;
        let mut resample = Vec::with_capacity(comparisons.len());

        for _ in 0..n_bootstrap {
            resample.clear();
            for _ in 0..comparisons.len() {
                let pick = rng.gen_range(0..comparisons.len());
                resample.push(comparisons[pick].clone());
            }

            match self.model.fit(&resample, item_ids) {
                Ok(fitted) => {
                    for (i, strength) in fitted.strengths().iter().enumerate() {
                        if let Some(v) = strength.value() {
                            samples[i].push(v);
                        }
                    }
                }
                Err(e) => {
                    failed += 1;
                    tracing::debug!(error = %e, "bootstrap resample failed to fit; skipping");
                }
            }
        }

        if failed > 0 {
            tracing::debug!(failed, n_bootstrap, "bootstrap finished with failed resamples");
        }

        estimate.values = samples.iter().map(|s| sample_std(s)).collect();
        estimate
    }
}

fn sample_std(values: &[f64]) -> Uncertainty {
    if values.len() < 2 {
        return Uncertainty::Maximal;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Uncertainty::StdDev(var.sqrt())
}
