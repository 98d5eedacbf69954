//! Offline evaluation harness.
//!
//! Runs synthetic cases through the real session controller and driver,
//! with a seeded [`SimulatedOracle`] standing in for the human, and scores the
//! final ranking against the known true strengths.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::driver::DriverStopReason;
use crate::hooks::{ComparisonEvent, ComparisonObserver, ObserverError};
use crate::oracle::SimulatedOracle;
use crate::query::QueryStrategy;
use crate::session::{SessionController, SessionError};
use crate::state::ItemId;

// =============================================================================
// Synthetic case definitions
// =============================================================================

#[derive(Debug, Clone)]
pub struct SyntheticCase {
    pub name: &'static str,
    /// True log-strengths, one per item.
    pub true_strengths: Vec<f64>,
    pub noise: f64,
    pub comparison_budget: usize,
    pub strategy: QueryStrategy,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationMetrics {
    pub kendall_tau: f64,
    pub spearman_rho: f64,
    pub top1_correct: bool,
    pub comparisons_used: usize,
    pub passes_completed: usize,
    pub aggregate_confidence: f64,
    pub stop_reason: Option<DriverStopReason>,
    pub latency_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub case_name: String,
    pub metrics: EvaluationMetrics,
    /// Aggregate confidence after each recorded comparison.
    pub confidence_trajectory: Vec<f64>,
}

// =============================================================================
// Public API
// =============================================================================

pub fn synthetic_cases() -> Vec<SyntheticCase> {
    vec![
        SyntheticCase {
            name: "clean_ordering_8",
            true_strengths: spaced(8, 4.0),
            noise: 0.0,
            comparison_budget: 40,
            strategy: QueryStrategy::Adaptive,
            seed: 42,
        },
        SyntheticCase {
            name: "noisy_ordering_12",
            true_strengths: spaced(12, 1.0),
            noise: 0.3,
            comparison_budget: 90,
            strategy: QueryStrategy::Adaptive,
            seed: 43,
        },
        SyntheticCase {
            name: "information_gain_10",
            true_strengths: spaced(10, 1.5),
            noise: 0.1,
            comparison_budget: 60,
            strategy: QueryStrategy::InformationGain,
            seed: 44,
        },
        SyntheticCase {
            name: "diversity_10",
            true_strengths: spaced(10, 1.5),
            noise: 0.1,
            comparison_budget: 60,
            strategy: QueryStrategy::Diversity,
            seed: 45,
        },
        SyntheticCase {
            name: "tight_cluster_10",
            true_strengths: spaced(10, 0.25),
            noise: 0.1,
            comparison_budget: 80,
            strategy: QueryStrategy::Adaptive,
            seed: 46,
        },
    ]
}

/// Run every case whose name contains `filter`, `concurrency` at a time.
/// Results come back in case order.
pub async fn run_synthetic_suite(
    filter: Option<&str>,
    concurrency: usize,
) -> Vec<Result<EvaluationResult, SessionError>> {
    let cases: Vec<(usize, SyntheticCase)> = synthetic_cases()
        .into_iter()
        .filter(|c| filter.map(|f| c.name.contains(f)).unwrap_or(true))
        .enumerate()
        .collect();

    let mut results: Vec<(usize, Result<EvaluationResult, SessionError>)> = stream::iter(cases)
        .map(|(idx, case)| async move { (idx, run_synthetic_case(&case).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, r)| r).collect()
}

pub async fn run_synthetic_case(case: &SyntheticCase) -> Result<EvaluationResult, SessionError> {
    let start = Instant::now();
    let items: Vec<ItemId> = (0..case.true_strengths.len())
        .map(|i| ItemId::new(format!("item_{i:02}")))
        .collect();
    let oracle = Arc::new(SimulatedOracle::new(
        items.iter().cloned().zip(case.true_strengths.iter().copied()),
        case.noise,
        case.seed,
    ));

    let mut config = EngineConfig::default().with_seed(case.seed);
    config.selector.strategy = case.strategy;
    config.driver.max_comparisons = Some(case.comparison_budget);

    let trajectory = Arc::new(TrajectoryObserver::default());
    let mut controller =
        SessionController::new(oracle, config)?.with_observer(trajectory.clone());
    controller.start(items.clone())?;
    controller.wait_for_driver().await;

    let ranking = controller.stop().await?;
    let stats = controller.statistics();

    let predicted: Vec<f64> = items
        .iter()
        .map(|id| {
            ranking
                .entry(id)
                .map(|e| e.strength.value_or_neutral())
                .unwrap_or(0.0)
        })
        .collect();
    let truth_top = argmax(&case.true_strengths).map(|i| items[i].clone());

    tracing::debug!(case = case.name, comparisons = stats.comparisons_made, "case finished");
    Ok(EvaluationResult {
        case_name: case.name.to_string(),
        metrics: EvaluationMetrics {
            kendall_tau: kendall_tau_b(&predicted, &case.true_strengths),
            spearman_rho: spearman_rho(&predicted, &case.true_strengths),
            top1_correct: truth_top.as_ref() == ranking.top_item(),
            comparisons_used: stats.comparisons_made,
            passes_completed: stats.passes_completed,
            aggregate_confidence: stats.aggregate_confidence,
            stop_reason: stats.stop_reason,
            latency_ms: start.elapsed().as_millis(),
        },
        confidence_trajectory: trajectory.points().await,
    })
}

/// `case,index,confidence` rows for plotting.
pub fn confidence_curve_csv(results: &[EvaluationResult]) -> String {
    let mut out = String::from("case,comparison,aggregate_confidence\n");
    for r in results {
        for (i, c) in r.confidence_trajectory.iter().enumerate() {
            out.push_str(&format!("{},{},{:.6}\n", r.case_name, i + 1, c));
        }
    }
    out
}

#[derive(Default)]
struct TrajectoryObserver {
    points: Mutex<Vec<f64>>,
}

impl TrajectoryObserver {
    async fn points(&self) -> Vec<f64> {
        self.points.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ComparisonObserver for TrajectoryObserver {
    async fn on_comparison(&self, event: ComparisonEvent) -> Result<(), ObserverError> {
        self.points.lock().await.push(event.aggregate_confidence);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// `n` strengths from `(n-1) * step / 2` down in steps of `step`.
fn spaced(n: usize, step: f64) -> Vec<f64> {
    let mid = (n.saturating_sub(1)) as f64 / 2.0;
    (0..n).map(|i| (mid - i as f64) * step).collect()
}

fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n != y.len() || n < 2 {
        return 0.0;
    }

    let mut concordant = 0f64;
    let mut discordant = 0f64;
    let mut ties_x = 0f64;
    let mut ties_y = 0f64;

    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];

            if dx == 0.0 && dy == 0.0 {
                continue;
            } else if dx == 0.0 {
                ties_x += 1.0;
            } else if dy == 0.0 {
                ties_y += 1.0;
            } else if (dx > 0.0) == (dy > 0.0) {
                concordant += 1.0;
            } else {
                discordant += 1.0;
            }
        }
    }

    let denom = ((concordant + discordant + ties_x) * (concordant + discordant + ties_y)).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (concordant - discordant) / denom
    }
}

pub fn spearman_rho(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n != y.len() || n < 2 {
        return 0.0;
    }
    let rx = ranks_with_ties(x);
    let ry = ranks_with_ties(y);

    let mean_x = rx.iter().sum::<f64>() / n as f64;
    let mean_y = ry.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut den_x = 0.0;
    let mut den_y = 0.0;
    for i in 0..n {
        let dx = rx[i] - mean_x;
        let dy = ry[i] - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }

    if den_x == 0.0 || den_y == 0.0 {
        0.0
    } else {
        num / (den_x.sqrt() * den_y.sqrt())
    }
}

fn ranks_with_ties(scores: &[f64]) -> Vec<f64> {
    let n = scores.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0usize;
    while i < n {
        let score = scores[indices[i]];
        let mut j = i + 1;
        while j < n && scores[indices[j]] == score {
            j += 1;
        }
        let avg_rank = (i + j - 1) as f64 / 2.0;
        for &idx in &indices[i..j] {
            ranks[idx] = avg_rank;
        }
        i = j;
    }
    ranks
}
