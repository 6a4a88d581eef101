//! Regression tree used by the random forest

use crate::error::{Result, StackcastError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if sample[*feature_idx] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Best split found for one feature
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// CART regression tree (variance reduction)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn per split; all when `None`
    pub max_features: Option<usize>,
    /// Seed for per-split feature sampling
    pub random_state: Option<u64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(StackcastError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(StackcastError::TrainingError("cannot fit a tree on zero rows".to_string()));
        }

        self.n_features = n_features;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, indices, 0, &mut importances, &mut rng));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let (sum, sq_sum) = indices
            .iter()
            .fold((0.0, 0.0), |(s, sq), &i| (s + y[i], sq + y[i] * y[i]));
        let value = sum / n_samples as f64;
        let impurity = variance(n_samples, sum, sq_sum);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        if should_stop {
            return TreeNode::Leaf { value, n_samples };
        }

        let Some(best) = self.find_best_split(x, y, &indices, impurity, rng) else {
            return TreeNode::Leaf { value, n_samples };
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, best.feature]] <= best.threshold);

        importances[best.feature] += n_samples as f64 * best.gain;

        let left = Box::new(self.build_tree(x, y, left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: best.feature,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n_features = x.ncols();
        let n_try = self.max_features.unwrap_or(n_features).min(n_features);
        let mut features: Vec<usize> = if n_try < n_features {
            sample(rng, n_features, n_try).into_vec()
        } else {
            (0..n_features).collect()
        };
        features.sort_unstable();

        let min_leaf = self.min_samples_leaf;
        let n = indices.len();

        // Each feature scans its sorted values once with running sums
        let candidates: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&feature| {
                let mut sorted: Vec<(f64, f64)> =
                    indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
                sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

                let total_sum: f64 = sorted.iter().map(|p| p.1).sum();
                let total_sq: f64 = sorted.iter().map(|p| p.1 * p.1).sum();

                let mut left_sum = 0.0;
                let mut left_sq = 0.0;
                let mut best: Option<SplitCandidate> = None;

                for pos in 0..n - 1 {
                    let (value, target) = sorted[pos];
                    left_sum += target;
                    left_sq += target * target;

                    let left_count = pos + 1;
                    let right_count = n - left_count;
                    if left_count < min_leaf || right_count < min_leaf {
                        continue;
                    }
                    let next = sorted[pos + 1].0;
                    if next <= value {
                        continue;
                    }

                    let weighted = (left_count as f64 * variance(left_count, left_sum, left_sq)
                        + right_count as f64
                            * variance(right_count, total_sum - left_sum, total_sq - left_sq))
                        / n as f64;
                    let gain = parent_impurity - weighted;

                    if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                        best = Some(SplitCandidate {
                            feature,
                            threshold: (value + next) / 2.0,
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        // Ties resolve to the lowest feature index
        candidates.into_iter().flatten().fold(None, |best, c| match best {
            Some(b) if b.gain >= c.gain => Some(b),
            _ => Some(c),
        })
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(StackcastError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(StackcastError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| root.predict(row)).collect())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }
}

/// Population variance from running sums
fn variance(count: usize, sum: f64, sq_sum: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let n = count as f64;
    (sq_sum / n - (sum / n).powi(2)).max(0.0)
}
