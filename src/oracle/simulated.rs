//! In-process oracles: a seeded noisy simulation, a fixed preference order,
//! and a closure adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use super::{ComparisonOracle, OracleError, OracleVerdict};
use crate::bradley_terry::sigmoid;
use crate::state::ItemId;

/// Noisy Bradley-Terry oracle over known true log-strengths.
///
/// `P(a wins) = (1 - noise) * sigmoid(s_a - s_b) + noise * 0.5`, so `noise = 1`
/// is a coin flip. Items without a true strength sit at 0.
pub struct SimulatedOracle {
    strengths: HashMap<ItemId, f64>,
    noise: f64,
    rng: Mutex<StdRng>,
    calls: AtomicUsize,
}

impl SimulatedOracle {
    pub fn new(strengths: impl IntoIterator<Item = (ItemId, f64)>, noise: f64, seed: u64) -> Self {
        Self {
            strengths: strengths.into_iter().collect(),
            noise: if noise.is_finite() { noise.clamp(0.0, 1.0) } else { 1.0 },
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn true_strength(&self, id: &ItemId) -> f64 {
        self.strengths.get(id).copied().unwrap_or(0.0)
    }

    /// Items best first by true strength; ties by id.
    pub fn true_ranking(&self) -> Vec<ItemId> {
        let mut ids: Vec<&ItemId> = self.strengths.keys().collect();
        ids.sort_by(|a, b| {
            self.true_strength(b)
                .total_cmp(&self.true_strength(a))
                .then_with(|| a.cmp(b))
        });
        ids.into_iter().cloned().collect()
    }

    /// Probability that `a` beats `b` after noise.
    pub fn win_probability(&self, a: &ItemId, b: &ItemId) -> f64 {
        let p = sigmoid(self.true_strength(a) - self.true_strength(b));
        (1.0 - self.noise) * p + self.noise * 0.5
    }

    pub fn comparison_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ComparisonOracle for SimulatedOracle {
    async fn compare(&self, a: &ItemId, b: &ItemId) -> Result<OracleVerdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let p = self.win_probability(a, b);
        let draw: f64 = self.rng.lock().await.gen();
        let (winner, confidence) = if draw < p { (a, p) } else { (b, 1.0 - p) };
        Ok(OracleVerdict::winner_with_confidence(winner.clone(), confidence))
    }
}

/// Always prefers whichever item comes first in a fixed order.
#[derive(Debug, Clone)]
pub struct PreferenceOracle {
    rank: HashMap<ItemId, usize>,
}

impl PreferenceOracle {
    pub fn new(best_first: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            rank: best_first
                .into_iter()
                .enumerate()
                .map(|(pos, id)| (id, pos))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl ComparisonOracle for PreferenceOracle {
    async fn compare(&self, a: &ItemId, b: &ItemId) -> Result<OracleVerdict, OracleError> {
        let ra = self
            .rank
            .get(a)
            .ok_or_else(|| OracleError::failed(format!("no preference for {a}")))?;
        let rb = self
            .rank
            .get(b)
            .ok_or_else(|| OracleError::failed(format!("no preference for {b}")))?;
        let winner = if ra <= rb { a } else { b };
        Ok(OracleVerdict::winner(winner.clone()))
    }
}

/// Adapts a synchronous closure, e.g. a prompt handler.
pub struct CallbackOracle<F> {
    callback: F,
    calls: AtomicUsize,
}

impl<F> CallbackOracle<F>
where
    F: Fn(&ItemId, &ItemId) -> Result<OracleVerdict, OracleError> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn comparison_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl<F> ComparisonOracle for CallbackOracle<F>
where
    F: Fn(&ItemId, &ItemId) -> Result<OracleVerdict, OracleError> + Send + Sync,
{
    async fn compare(&self, a: &ItemId, b: &ItemId) -> Result<OracleVerdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.callback)(a, b)
    }
}
