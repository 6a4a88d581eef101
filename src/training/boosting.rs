//! Shared machinery for the second-order boosters
//!
//! Both boosters fit squared error, so a row contributes gradient
//! `pred - y` and hessian `1` (scaled by its sampling weight under GOSS).

use crate::error::{Result, StackcastError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Per-row first and second order terms of the loss
#[derive(Debug, Clone)]
pub(crate) struct Gradients {
    pub grad: Vec<f64>,
    pub hess: Vec<f64>,
}

impl Gradients {
    /// Squared error around the current predictions
    pub fn squared_error(predictions: &Array1<f64>, y: &Array1<f64>) -> Self {
        let grad = predictions.iter().zip(y.iter()).map(|(p, t)| p - t).collect();
        Self { grad, hess: vec![1.0; y.len()] }
    }

    pub fn sum_over(&self, rows: &[usize]) -> GradStats {
        rows.iter().fold(GradStats::default(), |acc, &r| acc.with(self.grad[r], self.hess[r]))
    }
}

/// Summed gradient and hessian of a set of rows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct GradStats {
    pub g: f64,
    pub h: f64,
}

impl GradStats {
    pub fn with(self, g: f64, h: f64) -> Self {
        Self { g: self.g + g, h: self.h + h }
    }

    pub fn minus(self, other: GradStats) -> Self {
        Self { g: self.g - other.g, h: self.h - other.h }
    }

    /// Structure score `G² / (H + λ)`
    pub fn score(&self, lambda: f64) -> f64 {
        self.g * self.g / (self.h + lambda)
    }

    /// Optimal weight `-soft(G, α) / (H + λ)`
    pub fn leaf_weight(&self, lambda: f64, alpha: f64) -> f64 {
        let shrunk = if self.g.abs() <= alpha { 0.0 } else { self.g - alpha * self.g.signum() };
        let denom = self.h + lambda;
        if denom <= 0.0 {
            0.0
        } else {
            -shrunk / denom
        }
    }
}

/// Constraints applied while scanning thresholds
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitRules {
    pub lambda: f64,
    pub min_child_hessian: f64,
    pub min_child_rows: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct SplitCandidate {
    pub feature: usize,
    pub threshold: f64,
    /// `score(L) + score(R) - score(parent)`, not halved
    pub gain: f64,
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

/// Exact greedy scan of one feature: rows sorted by value, prefix sums,
/// thresholds at midpoints between distinct values.
fn scan_feature(
    x: &Array2<f64>,
    grads: &Gradients,
    rows: &[usize],
    feature: usize,
    rules: SplitRules,
) -> Option<SplitCandidate> {
    let mut sorted: Vec<usize> = rows.to_vec();
    sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

    let total = grads.sum_over(&sorted);
    let parent = total.score(rules.lambda);
    let min_rows = rules.min_child_rows.max(1);

    let mut left = GradStats::default();
    let mut best: Option<(f64, usize)> = None;
    for pos in 0..sorted.len().saturating_sub(1) {
        let row = sorted[pos];
        left = left.with(grads.grad[row], grads.hess[row]);

        let n_left = pos + 1;
        if n_left < min_rows || sorted.len() - n_left < min_rows {
            continue;
        }
        if x[[sorted[pos + 1], feature]] <= x[[row, feature]] {
            continue;
        }
        let right = total.minus(left);
        if left.h < rules.min_child_hessian || right.h < rules.min_child_hessian {
            continue;
        }

        let gain = left.score(rules.lambda) + right.score(rules.lambda) - parent;
        if best.map_or(true, |(g, _)| gain > g) {
            best = Some((gain, n_left));
        }
    }

    best.map(|(gain, cut)| {
        let threshold = (x[[sorted[cut - 1], feature]] + x[[sorted[cut], feature]]) / 2.0;
        let right = sorted.split_off(cut);
        SplitCandidate { feature, threshold, gain, left: sorted, right }
    })
}

/// Best split over `features`, scanned in parallel. Equal gains resolve to
/// the lower feature index.
pub(crate) fn best_split(
    x: &Array2<f64>,
    grads: &Gradients,
    rows: &[usize],
    features: &[usize],
    rules: SplitRules,
) -> Option<SplitCandidate> {
    features
        .par_iter()
        .filter_map(|&f| scan_feature(x, grads, rows, f, rules))
        .collect::<Vec<_>>()
        .into_iter()
        .fold(None, |best: Option<SplitCandidate>, c| match best {
            Some(b) => match c.gain.total_cmp(&b.gain) {
                Ordering::Greater => Some(c),
                Ordering::Equal if c.feature < b.feature => Some(c),
                _ => Some(b),
            },
            None => Some(c),
        })
}

/// Sorted random subset of `0..n` holding `ceil(n * rate)` entries
pub(crate) fn sample_indices<R: Rng>(rng: &mut R, n: usize, rate: f64) -> Vec<usize> {
    if rate >= 1.0 || n == 0 {
        return (0..n).collect();
    }
    let k = ((n as f64 * rate).ceil() as usize).clamp(1, n);
    let mut idx = rand::seq::index::sample(rng, n, k).into_vec();
    idx.sort_unstable();
    idx
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum BoostedNode {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<BoostedNode>,
        right: Box<BoostedNode>,
    },
}

impl BoostedNode {
    pub fn predict(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                BoostedNode::Leaf(w) => return *w,
                BoostedNode::Split { feature, threshold, left, right } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn count_splits(&self, counts: &mut [f64]) {
        if let BoostedNode::Split { feature, left, right, .. } = self {
            if let Some(c) = counts.get_mut(*feature) {
                *c += 1.0;
            }
            left.count_splits(counts);
            right.count_splits(counts);
        }
    }
}

/// Mean-initialised additive model of shrunken trees
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct BoostedEnsemble {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<BoostedNode>,
    n_features: usize,
}

impl BoostedEnsemble {
    /// Validate shapes and start from the target mean
    pub fn start(x: &Array2<f64>, y: &Array1<f64>, learning_rate: f64) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(StackcastError::TrainingError("cannot boost on an empty dataset".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(StackcastError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        Ok(Self {
            base_score: y.mean().unwrap_or(0.0),
            learning_rate,
            trees: Vec::new(),
            n_features: x.ncols(),
        })
    }

    pub fn initial_predictions(&self, n: usize) -> Array1<f64> {
        Array1::from_elem(n, self.base_score)
    }

    /// Append a tree and move `predictions` by its shrunken output
    pub fn push(&mut self, tree: BoostedNode, x: &Array2<f64>, predictions: &mut Array1<f64>) {
        for (p, row) in predictions.iter_mut().zip(x.rows()) {
            *p += self.learning_rate * tree.predict(row);
        }
        self.trees.push(tree);
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.n_features == 0 {
            return Err(StackcastError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(StackcastError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.base_score
                    + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
            })
            .collect())
    }

    /// Split counts per feature, normalised to sum to one
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.n_features == 0 {
            return None;
        }
        let mut counts = vec![0.0; self.n_features];
        for tree in &self.trees {
            tree.count_splits(&mut counts);
        }
        let total: f64 = counts.iter().sum();
        if total > 0.0 {
            counts.iter_mut().for_each(|c| *c /= total);
        }
        Some(Array1::from_vec(counts))
    }
}
