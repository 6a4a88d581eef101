//! Leaf-wise second-order boosting in the style of LightGBM
//!
//! Each tree expands the open leaf with the largest gain until `max_leaves`
//! is reached, subject to `max_depth` and `min_child_samples`. With
//! `top_rate + other_rate < 1`, Gradient-based One-Side Sampling keeps the
//! largest gradients and a random share of the rest, amplifying the latter
//! by `(1 - top_rate) / other_rate`.

use super::boosting::{best_split, sample_indices, BoostedEnsemble, BoostedNode, Gradients, SplitCandidate, SplitRules};
use crate::error::Result;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LightGBMConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub top_rate: f64,
    pub other_rate: f64,
    pub random_state: Option<u64>,
}

impl Default for LightGBMConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            reg_lambda: 0.0,
            reg_alpha: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            top_rate: 1.0,
            other_rate: 0.0,
            random_state: Some(42),
        }
    }
}

impl LightGBMConfig {
    fn uses_goss(&self) -> bool {
        self.top_rate + self.other_rate < 1.0
    }

    fn rules(&self) -> SplitRules {
        SplitRules {
            lambda: self.reg_lambda,
            min_child_hessian: 0.0,
            min_child_rows: self.min_child_samples.max(1),
        }
    }
}

/// Open leaf waiting in the expansion queue
struct Frontier {
    node: usize,
    depth: usize,
    split: SplitCandidate,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Max-heap on gain; earlier nodes first on ties
    fn cmp(&self, other: &Self) -> Ordering {
        self.split
            .gain
            .total_cmp(&other.split.gain)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Arena slot; leaves keep their rows until the tree is finalised
enum Slot {
    Leaf(Vec<usize>),
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

struct LeafWiseGrower<'a> {
    x: &'a Array2<f64>,
    grads: &'a Gradients,
    features: Vec<usize>,
    config: &'a LightGBMConfig,
}

impl LeafWiseGrower<'_> {
    fn max_depth(&self) -> usize {
        self.config.max_depth.unwrap_or(usize::MAX)
    }

    fn candidate(&self, node: usize, depth: usize, rows: &[usize]) -> Option<Frontier> {
        let rules = self.config.rules();
        if depth >= self.max_depth() || rows.len() < 2 * rules.min_child_rows {
            return None;
        }
        best_split(self.x, self.grads, rows, &self.features, rules)
            .filter(|split| split.gain > 0.0)
            .map(|split| Frontier { node, depth, split })
    }

    fn grow(&self, rows: Vec<usize>) -> BoostedNode {
        let mut slots = Vec::new();
        let mut queue = BinaryHeap::new();
        queue.extend(self.candidate(0, 0, &rows));
        slots.push(Slot::Leaf(rows));

        let mut n_leaves = 1;
        while n_leaves < self.config.max_leaves {
            let Some(Frontier { node, depth, split }) = queue.pop() else {
                break;
            };

            let left = slots.len();
            let right = left + 1;
            queue.extend(self.candidate(left, depth + 1, &split.left));
            queue.extend(self.candidate(right, depth + 1, &split.right));
            slots.push(Slot::Leaf(split.left));
            slots.push(Slot::Leaf(split.right));
            slots[node] = Slot::Split { feature: split.feature, threshold: split.threshold, left, right };
            n_leaves += 1;
        }

        self.assemble(&slots, 0)
    }

    fn assemble(&self, slots: &[Slot], idx: usize) -> BoostedNode {
        match &slots[idx] {
            Slot::Leaf(rows) => BoostedNode::Leaf(
                self.grads
                    .sum_over(rows)
                    .leaf_weight(self.config.reg_lambda, self.config.reg_alpha),
            ),
            Slot::Split { feature, threshold, left, right } => BoostedNode::Split {
                feature: *feature,
                threshold: *threshold,
                left: Box::new(self.assemble(slots, *left)),
                right: Box::new(self.assemble(slots, *right)),
            },
        }
    }
}

/// Keep the `top_rate` share with the largest |gradient| and a random
/// `other_rate` share of the rest, whose terms are scaled up in place.
fn goss_sample(
    grads: &mut Gradients,
    top_rate: f64,
    other_rate: f64,
    rng: &mut Xoshiro256PlusPlus,
) -> Vec<usize> {
    let n = grads.grad.len();
    let n_top = ((n as f64 * top_rate).ceil() as usize).min(n);
    let n_other = ((n as f64 * other_rate).ceil() as usize).min(n - n_top);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| grads.grad[b].abs().total_cmp(&grads.grad[a].abs()));
    let mut rest = order.split_off(n_top);
    rest.shuffle(rng);
    rest.truncate(n_other);

    if other_rate > 0.0 {
        let amplify = (1.0 - top_rate) / other_rate;
        for &r in &rest {
            grads.grad[r] *= amplify;
            grads.hess[r] *= amplify;
        }
    }

    order.extend(rest);
    order.sort_unstable();
    order
}

/// Squared-error regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMRegressor {
    pub config: LightGBMConfig,
    ensemble: BoostedEnsemble,
}

impl LightGBMRegressor {
    pub fn new(config: LightGBMConfig) -> Self {
        Self { config, ensemble: BoostedEnsemble::default() }
    }

    pub fn n_trees(&self) -> usize {
        self.ensemble.n_trees()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let mut ensemble = BoostedEnsemble::start(x, y, self.config.learning_rate)?;
        let mut predictions = ensemble.initial_predictions(x.nrows());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));

        for _ in 0..self.config.n_estimators {
            let mut grads = Gradients::squared_error(&predictions, y);
            let rows = if self.config.uses_goss() {
                goss_sample(&mut grads, self.config.top_rate, self.config.other_rate, &mut rng)
            } else {
                sample_indices(&mut rng, x.nrows(), self.config.subsample)
            };
            let features = sample_indices(&mut rng, x.ncols(), self.config.colsample_bytree);

            let grower = LeafWiseGrower { x, grads: &grads, features, config: &self.config };
            let tree = grower.grow(rows);
            ensemble.push(tree, x, &mut predictions);
        }

        self.ensemble = ensemble;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.ensemble.predict(x)
    }

    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        self.ensemble.feature_importances()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((100, 3), |(i, j)| (i * 3 + j) as f64 / 100.0);
        let y = Array1::from_shape_fn(100, |i| 2.0 * (i * 3) as f64 / 100.0 + 0.1);
        (x, y)
    }

    #[test]
    fn test_fits_a_ramp() {
        let (x, y) = ramp_data();
        let config = LightGBMConfig { n_estimators: 50, max_leaves: 8, min_child_samples: 2, ..Default::default() };
        let mut model = LightGBMRegressor::new(config);
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        assert_eq!(preds.len(), 100);
        let baseline = y.mapv(|v| (v - y.mean().unwrap()).powi(2)).mean().unwrap();
        let mse = (&preds - &y).mapv(|v| v * v).mean().unwrap();
        assert!(mse < baseline * 0.1, "MSE {} vs baseline {}", mse, baseline);
    }

    #[test]
    fn test_single_leaf_predicts_mean() {
        let (x, y) = ramp_data();
        let config = LightGBMConfig { n_estimators: 5, max_leaves: 1, ..Default::default() };
        let mut model = LightGBMRegressor::new(config);
        model.fit(&x, &y).unwrap();

        let mean = y.mean().unwrap();
        for p in model.predict(&x).unwrap() {
            assert!((p - mean).abs() < 1e-9);
        }
    }

    #[test]
    fn test_too_few_rows_to_split() {
        let (x, y) = ramp_data();
        let x = x.slice(ndarray::s![..10, ..]).to_owned();
        let y = y.slice(ndarray::s![..10]).to_owned();
        let mut model = LightGBMRegressor::new(LightGBMConfig { n_estimators: 3, ..Default::default() });
        model.fit(&x, &y).unwrap();
        assert_eq!(model.feature_importances().unwrap().sum(), 0.0);
    }

    #[test]
    fn test_goss_fit() {
        let (x, y) = ramp_data();
        let config = LightGBMConfig {
            n_estimators: 10,
            max_leaves: 8,
            min_child_samples: 2,
            top_rate: 0.3,
            other_rate: 0.2,
            ..Default::default()
        };
        let mut model = LightGBMRegressor::new(config);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_trees(), 10);
        assert!(model.predict(&x).unwrap().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_goss_keeps_largest_gradients() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut grads = Gradients { grad: vec![0.1, -5.0, 0.2, 3.0, 0.0], hess: vec![1.0; 5] };
        let picked = goss_sample(&mut grads, 0.4, 0.0, &mut rng);
        assert_eq!(picked, vec![1, 3]);
    }

    #[test]
    fn test_goss_amplifies_sampled_rest() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut grads = Gradients { grad: vec![0.1, -5.0, 0.2, 3.0], hess: vec![1.0; 4] };
        let picked = goss_sample(&mut grads, 0.5, 0.25, &mut rng);
        assert_eq!(picked.len(), 3);
        let rest: Vec<usize> = picked.into_iter().filter(|&r| r != 1 && r != 3).collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(grads.hess[rest[0]], 2.0);
    }
}
