//! Random forest regressor

use super::decision_tree::DecisionTree;
use crate::error::{Result, StackcastError};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for max features
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            random_state: Some(42),
        }
    }
}

/// Bagged regression trees; predictions are the mean over trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub config: ForestConfig,
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(StackcastError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || self.config.n_estimators == 0 {
            return Err(StackcastError::TrainingError(
                "random forest needs at least one row and one tree".to_string(),
            ));
        }

        self.n_features = n_features;
        let max_features = self.config.max_features.resolve(n_features);
        let base_seed = self.config.random_state.unwrap_or(42);
        let config = &self.config;

        // Each tree owns its seed so the ensemble is reproducible under rayon
        let trees: Vec<DecisionTree> = (0..config.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if config.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot = y.select(Axis(0), &sample_indices);

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(config.min_samples_split)
                    .with_min_samples_leaf(config.min_samples_leaf)
                    .with_max_features(max_features)
                    .with_random_state(seed);
                if let Some(d) = config.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree.fit(&x_boot, &y_boot)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut total = vec![0.0; self.n_features];
        for imp in self.trees.iter().filter_map(|t| t.feature_importances()) {
            for (acc, &val) in total.iter_mut().zip(imp.iter()) {
                *acc += val;
            }
        }

        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            for imp in &mut total {
                *imp /= sum;
            }
        }
        self.feature_importances = Some(Array1::from_vec(total));
    }

    /// Mean prediction over all trees
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(StackcastError::ModelNotFitted);
        }

        let all_predictions = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let mut sum = Array1::zeros(x.nrows());
        for preds in &all_predictions {
            sum += preds;
        }
        Ok(sum / all_predictions.len() as f64)
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 0.3],
            [2.0, 0.1],
            [3.0, 0.4],
            [4.0, 0.1],
            [5.0, 0.5],
            [6.0, 0.9],
            [7.0, 0.2],
            [8.0, 0.6],
        ];
        let y = array![1.0, 1.0, 1.0, 1.0, 10.0, 10.0, 10.0, 10.0];
        (x, y)
    }

    #[test]
    fn test_regressor() {
        let (x, y) = step_data();
        let mut forest = RandomForest::new(ForestConfig {
            n_estimators: 20,
            max_depth: Some(3),
            ..Default::default()
        });
        forest.fit(&x, &y).unwrap();
        assert_eq!(forest.n_trees(), 20);

        let preds = forest.predict(&array![[1.5, 0.2], [7.5, 0.2]]).unwrap();
        assert!(preds[0] < 5.5);
        assert!(preds[1] > 5.5);
    }

    #[test]
    fn test_seeded_forest_is_reproducible() {
        let (x, y) = step_data();
        let config = ForestConfig {
            n_estimators: 10,
            max_features: MaxFeatures::Fixed(1),
            ..Default::default()
        };

        let mut a = RandomForest::new(config.clone());
        let mut b = RandomForest::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_feature_importances_sum_to_one() {
        let (x, y) = step_data();
        let mut forest = RandomForest::new(ForestConfig { n_estimators: 5, ..Default::default() });
        forest.fit(&x, &y).unwrap();

        let imp = forest.feature_importances().unwrap();
        assert!((imp.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(16), 4);
        assert_eq!(MaxFeatures::Fixed(50).resolve(16), 16);
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(16), 1);
    }
}
