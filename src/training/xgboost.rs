//! Level-wise second-order boosting in the style of XGBoost
//!
//! Trees grow depth-first to `max_depth`. A node splits when the halved
//! structure gain exceeds `gamma`; leaf weights are `-soft(G, α) / (H + λ)`.
//! Rows are subsampled per tree, columns per tree.

use super::boosting::{best_split, sample_indices, BoostedEnsemble, BoostedNode, Gradients, SplitRules};
use crate::error::Result;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// L1 penalty on leaf weights
    pub reg_alpha: f64,
    /// Minimum gain for a split
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: Some(42),
        }
    }
}

impl XGBoostConfig {
    fn rules(&self) -> SplitRules {
        SplitRules {
            lambda: self.reg_lambda,
            min_child_hessian: self.min_child_weight,
            min_child_rows: 1,
        }
    }
}

struct TreeGrower<'a> {
    x: &'a Array2<f64>,
    grads: &'a Gradients,
    features: &'a [usize],
    config: &'a XGBoostConfig,
}

impl TreeGrower<'_> {
    fn grow(&self, rows: &[usize], depth: usize) -> BoostedNode {
        let stats = self.grads.sum_over(rows);
        let leaf = BoostedNode::Leaf(stats.leaf_weight(self.config.reg_lambda, self.config.reg_alpha));

        if depth >= self.config.max_depth || rows.len() < 2 || stats.h < self.config.min_child_weight {
            return leaf;
        }

        match best_split(self.x, self.grads, rows, self.features, self.config.rules()) {
            Some(split) if 0.5 * split.gain > self.config.gamma => BoostedNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(self.grow(&split.left, depth + 1)),
                right: Box::new(self.grow(&split.right, depth + 1)),
            },
            _ => leaf,
        }
    }
}

/// Squared-error regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostRegressor {
    config: XGBoostConfig,
    ensemble: BoostedEnsemble,
}

impl XGBoostRegressor {
    pub fn new(config: XGBoostConfig) -> Self {
        Self { config, ensemble: BoostedEnsemble::default() }
    }

    pub fn config(&self) -> &XGBoostConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.ensemble.n_trees()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let mut ensemble = BoostedEnsemble::start(x, y, self.config.learning_rate)?;
        let mut predictions = ensemble.initial_predictions(x.nrows());
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        for _ in 0..self.config.n_estimators {
            let grads = Gradients::squared_error(&predictions, y);
            let rows = sample_indices(&mut rng, x.nrows(), self.config.subsample);
            let features = sample_indices(&mut rng, x.ncols(), self.config.colsample_bytree);

            let grower = TreeGrower { x, grads: &grads, features: &features, config: &self.config };
            let tree = grower.grow(&rows, 0);
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
