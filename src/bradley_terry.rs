//! Bradley-Terry strength model.
//!
//! `P(i beats j) = π_i / (π_i + π_j)`, fitted by minorize-maximize iterations
//! on the win/loss log. Strengths are reported on the log scale.
//!
//! Implementation notes:
//! - The comparison graph is split into connected components and each
//!   component is fitted on its own. Strengths are only comparable inside one
//!   component, so each component is centred to mean log-strength 0.
//! - Every item in a component also plays a fixed reference item of strength 1
//!   (`prior_strength` pseudo-wins and pseudo-losses). This keeps the MLE finite
//!   under perfect separation, which is the normal case for a consistent
//!   oracle, and pins the free scale of the component.
//! - Items with no comparisons are singleton components and get
//!   `Strength::Undefined`, never a number.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ModelFitError;
use crate::state::{Comparison, ItemId};

/// Settings for the MM fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BradleyTerryConfig {
    /// Iteration cap per component. Hitting it is a `ModelFitError`.
    pub max_iterations: usize,
    /// Stop when no log-strength moves more than this between iterations.
    pub tolerance: f64,
    /// Pseudo-wins and pseudo-losses against the reference item, per item.
    /// 0 disables regularization (perfectly separated data then fails to fit).
    pub prior_strength: f64,
}

impl Default for BradleyTerryConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2_000,
            tolerance: 1e-8,
            prior_strength: 1.0,
        }
    }
}

/// Point estimate of an item's log-strength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Strength {
    Fitted(f64),
    /// No comparisons in the item's component.
    Undefined,
}

impl Strength {
    /// Ordering value used for undefined items.
    pub const NEUTRAL: f64 = 0.0;

    pub fn value(&self) -> Option<f64> {
        match self {
            Strength::Fitted(v) => Some(*v),
            Strength::Undefined => None,
        }
    }

    pub fn value_or_neutral(&self) -> f64 {
        self.value().unwrap_or(Self::NEUTRAL)
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Strength::Fitted(_))
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Fitted strengths for every registered item.
#[derive(Debug, Clone, PartialEq)]
pub struct StrengthModel {
    items: Vec<ItemId>,
    index: HashMap<ItemId, usize>,
    strengths: Vec<Strength>,
    labels: Vec<usize>,
    component_sizes: Vec<usize>,
    iterations: usize,
    comparisons: usize,
}

impl StrengthModel {
    /// Model with no evidence: every item undefined and in its own component.
    pub fn uniform(item_ids: &[ItemId]) -> Self {
        let n = item_ids.len();
        Self {
            items: item_ids.to_vec(),
            index: index_of(item_ids),
            strengths: vec![Strength::Undefined; n],
            labels: (0..n).collect(),
            component_sizes: vec![1; n],
            iterations: 0,
            comparisons: 0,
        }
    }

    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn strengths(&self) -> &[Strength] {
        &self.strengths
    }

    /// `Undefined` for unknown ids as well.
    pub fn strength(&self, id: &ItemId) -> Strength {
        self.index
            .get(id)
            .map(|&i| self.strengths[i])
            .unwrap_or(Strength::Undefined)
    }

    pub fn component(&self, id: &ItemId) -> Option<usize> {
        self.index.get(id).map(|&i| self.labels[i])
    }

    pub fn component_size(&self, id: &ItemId) -> usize {
        self.component(id)
            .map(|c| self.component_sizes[c])
            .unwrap_or(0)
    }

    pub fn component_count(&self) -> usize {
        self.component_sizes.len()
    }

    pub fn same_component(&self, a: &ItemId, b: &ItemId) -> bool {
        match (self.component(a), self.component(b)) {
            (Some(ca), Some(cb)) => ca == cb,
            _ => false,
        }
    }

    /// Share of the other items that `id` can be compared against.
    pub fn coverage(&self, id: &ItemId) -> f64 {
        let n = self.items.len();
        if n < 2 {
            return 0.0;
        }
        let size = self.component_size(id);
        size.saturating_sub(1) as f64 / (n - 1) as f64
    }

    /// `P(a beats b)`; 0.5 when the pair is not comparable.
    pub fn win_probability(&self, a: &ItemId, b: &ItemId) -> f64 {
        if !self.same_component(a, b) {
            return 0.5;
        }
        match (self.strength(a), self.strength(b)) {
            (Strength::Fitted(sa), Strength::Fitted(sb)) => sigmoid(sa - sb),
            _ => 0.5,
        }
    }

    /// Items best first. Undefined items sort at the neutral value; ties by id.
    pub fn ranking(&self) -> Vec<ItemId> {
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.sort_by(|&i, &j| {
            self.strengths[j]
                .value_or_neutral()
                .partial_cmp(&self.strengths[i].value_or_neutral())
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.items[i].cmp(&self.items[j]))
        });
        order.into_iter().map(|i| self.items[i].clone()).collect()
    }

    /// Largest iteration count over all fitted components.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Size of the log this model was fitted on.
    pub fn comparison_count(&self) -> usize {
        self.comparisons
    }
}

fn index_of(item_ids: &[ItemId]) -> HashMap<ItemId, usize> {
    item_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect()
}

// ---------------------------------------------------------------------
//  Graph topology
// ---------------------------------------------------------------------

/// Component label per node, numbered in order of each component's
/// smallest node index.
fn compute_components(n: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(i, j) in edges {
        if i == j || i >= n || j >= n {
            continue;
        }
        adj[i].push(j);
        adj[j].push(i);
    }

    let mut labels = vec![usize::MAX; n];
    let mut comp_id = 0;
    for start in 0..n {
        if labels[start] != usize::MAX {
            continue;
        }
        let mut stack = vec![start];
        labels[start] = comp_id;
        while let Some(u) = stack.pop() {
            for &v in &adj[u] {
                if labels[v] == usize::MAX {
                    labels[v] = comp_id;
                    stack.push(v);
                }
            }
        }
        comp_id += 1;
    }
    labels
}

// ---------------------------------------------------------------------
//  Fit
// ---------------------------------------------------------------------

/// Pure fitter: same log and items in, same strengths out.
#[derive(Debug, Clone, Default)]
pub struct BradleyTerryModel {
    config: BradleyTerryConfig,
}

struct ComponentFit {
    log_strengths: Vec<f64>,
    iterations: usize,
}

impl BradleyTerryModel {
    pub fn new(config: BradleyTerryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BradleyTerryConfig {
        &self.config
    }

    pub fn fit(
        &self,
        comparisons: &[Comparison],
        item_ids: &[ItemId],
    ) -> Result<StrengthModel, ModelFitError> {
        let mut model = StrengthModel::uniform(item_ids);
        model.comparisons = comparisons.len();
        if comparisons.is_empty() {
            return Ok(model);
        }

        let n = item_ids.len();
        let mut edges = Vec::with_capacity(comparisons.len());
        for c in comparisons {
            let w = *model
                .index
                .get(&c.winner)
                .ok_or_else(|| ModelFitError::UnknownItem(c.winner.clone()))?;
            let l = *model
                .index
                .get(&c.loser)
                .ok_or_else(|| ModelFitError::UnknownItem(c.loser.clone()))?;
            if w != l {
                edges.push((w, l));
            }
        }

        let labels = compute_components(n, &edges);
        let n_components = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_components];
        for (node, &c) in labels.iter().enumerate() {
            members[c].push(node);
        }

        let mut edges_by_component: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n_components];
        for &(w, l) in &edges {
            edges_by_component[labels[w]].push((w, l));
        }

        let mut max_iterations = 0;
        for (c, nodes) in members.iter().enumerate() {
            if nodes.len() < 2 {
                continue;
            }
            let fit = self.fit_component(nodes, &edges_by_component[c], item_ids)?;
            max_iterations = max_iterations.max(fit.iterations);
            for (local, &node) in nodes.iter().enumerate() {
                model.strengths[node] = Strength::Fitted(fit.log_strengths[local]);
            }
        }

        model.component_sizes = members.iter().map(|m| m.len()).collect();
        model.labels = labels;
        model.iterations = max_iterations;
        Ok(model)
    }

    fn fit_component(
        &self,
        nodes: &[usize],
        edges: &[(usize, usize)],
        item_ids: &[ItemId],
    ) -> Result<ComponentFit, ModelFitError> {
        let m = nodes.len();
        let local: HashMap<usize, usize> = nodes.iter().enumerate().map(|(l, &g)| (g, l)).collect();

        let mut wins = vec![0.0f64; m];
        // Ordered so the float sums below do not depend on hash order.
        let mut games: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); m];
        for &(w, l) in edges {
            let (lw, ll) = (local[&w], local[&l]);
            wins[lw] += 1.0;
            *games[lw].entry(ll).or_insert(0.0) += 1.0;
            *games[ll].entry(lw).or_insert(0.0) += 1.0;
        }

        let prior = self.config.prior_strength.max(0.0);
        let mut pi = vec![1.0f64; m];
        let mut delta = f64::INFINITY;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let mut next = vec![0.0f64; m];
            for i in 0..m {
                let mut denom = 0.0;
                for (&j, &n_ij) in &games[i] {
                    denom += n_ij / (pi[i] + pi[j]);
                }
                if prior > 0.0 {
                    denom += 2.0 * prior / (pi[i] + 1.0);
                }
                next[i] = if denom > 0.0 {
                    (wins[i] + prior) / denom
                } else {
                    pi[i]
                };
            }

            if prior == 0.0 {
                // No reference item: pin the scale at geometric mean 1.
                let log_mean = next.iter().map(|p| p.ln()).sum::<f64>() / m as f64;
                if log_mean.is_finite() {
                    let scale = log_mean.exp();
                    for p in next.iter_mut() {
                        *p /= scale;
                    }
                }
            }

            delta = 0.0;
            for i in 0..m {
                let step = (next[i].ln() - pi[i].ln()).abs();
                if !step.is_finite() {
                    return Err(ModelFitError::NonFinite(item_ids[nodes[i]].clone()));
                }
                delta = f64::max(delta, step);
            }
            pi = next;

            if delta < self.config.tolerance {
                let logs: Vec<f64> = pi.iter().map(|p| p.ln()).collect();
                let mean = logs.iter().sum::<f64>() / m as f64;
                return Ok(ComponentFit {
                    log_strengths: logs.into_iter().map(|s| s - mean).collect(),
                    iterations,
                });
            }
        }

        Err(ModelFitError::NotConverged { iterations, delta })
    }
}
