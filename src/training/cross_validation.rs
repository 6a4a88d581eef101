//! Contiguous-block fold assignment and out-of-fold base predictions

use super::models::BaseModelPool;
use crate::error::{Result, StackcastError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Partition of `0..n` into `k` ordered, contiguous blocks.
///
/// Every block but the last holds `max(n / k, 1)` rows and the last block
/// absorbs the remainder. When `n < k` the trailing blocks are empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    bounds: Vec<Range<usize>>,
    n_samples: usize,
}

impl FoldAssignment {
    pub fn contiguous(n_samples: usize, n_folds: usize) -> Self {
        let size = (n_samples / n_folds.max(1)).max(1);
        let bounds = (0..n_folds)
            .map(|f| {
                let start = (f * size).min(n_samples);
                let end = if f + 1 == n_folds {
                    n_samples
                } else {
                    ((f + 1) * size).min(n_samples)
                };
                start..end
            })
            .collect();
        Self { bounds, n_samples }
    }

    pub fn n_folds(&self) -> usize {
        self.bounds.len()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Row range of fold `f`
    pub fn fold(&self, f: usize) -> Range<usize> {
        self.bounds.get(f).cloned().unwrap_or(self.n_samples..self.n_samples)
    }

    pub fn splits(&self) -> Vec<CVSplit> {
        self.bounds
            .iter()
            .enumerate()
            .map(|(fold_idx, held_out)| CVSplit {
                train_indices: (0..self.n_samples).filter(|i| !held_out.contains(i)).collect(),
                test_indices: held_out.clone().collect(),
                fold_idx,
            })
            .collect()
    }
}

/// Out-of-fold base predictions, one column per base model in pool order
#[derive(Debug, Clone)]
pub struct OutOfFoldPredictions {
    pub model_names: Vec<String>,
    /// n_samples x n_models
    pub predictions: Array2<f64>,
}

impl OutOfFoldPredictions {
    pub fn column(&self, model: &str) -> Option<Array1<f64>> {
        self.model_names
            .iter()
            .position(|m| m == model)
            .map(|j| self.predictions.column(j).to_owned())
    }
}

/// Cross-validator producing out-of-fold predictions for a base pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossValidator {
    n_folds: usize,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self { n_folds: 5 }
    }
}

impl CrossValidator {
    pub fn new(n_folds: usize) -> Self {
        Self { n_folds }
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Fold count must lie in `2..=n_samples`
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        if self.n_folds < 2 {
            return Err(StackcastError::ConfigurationMismatch(format!(
                "n_folds must be at least 2, got {}",
                self.n_folds
            )));
        }
        if self.n_folds > n_samples {
            return Err(StackcastError::ConfigurationMismatch(format!(
                "n_folds ({}) exceeds the number of training windows ({})",
                self.n_folds, n_samples
            )));
        }
        Ok(())
    }

    pub fn assignment(&self, n_samples: usize) -> FoldAssignment {
        FoldAssignment::contiguous(n_samples, self.n_folds)
    }

    /// For each fold, fit a fresh instance of every base model on the rows
    /// outside the fold and predict the rows inside it. Empty folds are
    /// skipped. Failures are attributed to the first row of the held-out fold.
    pub fn out_of_fold(
        &self,
        pool: &BaseModelPool,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<OutOfFoldPredictions> {
        let n_samples = x.nrows();
        if y.len() != n_samples {
            return Err(StackcastError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }

        let mut predictions = Array2::zeros((n_samples, pool.len()));

        for split in self.assignment(n_samples).splits() {
            let Some(&first_row) = split.test_indices.first() else {
                debug!(fold = split.fold_idx, "empty fold skipped");
                continue;
            };

            let x_train = x.select(Axis(0), &split.train_indices);
            let y_train = y.select(Axis(0), &split.train_indices);
            let x_held = x.select(Axis(0), &split.test_indices);

            for (j, entry) in pool.models().iter().enumerate() {
                let mut model = entry.spec.build();
                model
                    .fit(&x_train, &y_train)
                    .map_err(|e| e.for_model(&entry.name, Some(first_row)))?;
                let preds = model
                    .predict(&x_held)
                    .map_err(|e| e.for_model(&entry.name, Some(first_row)))?;

                for (&row, &p) in split.test_indices.iter().zip(preds.iter()) {
                    predictions[[row, j]] = p;
                }
            }
        }

        Ok(OutOfFoldPredictions {
            model_names: pool.names(),
            predictions,
        })
    }
}
