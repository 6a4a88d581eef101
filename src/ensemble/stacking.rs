//! Stacking ensemble with a ridge meta-learner

use crate::error::{Result, StackcastError};
use crate::training::{ensure_finite, BaseModelPool, CrossValidator, Model, OutOfFoldPredictions, RidgeRegression};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for stacking ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingConfig {
    /// Number of cross-validation folds
    pub n_folds: usize,
    /// L2 strength of the ridge meta-learner
    pub meta_alpha: f64,
    /// Floor applied to final predictions
    pub clip_min: Option<f64>,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            meta_alpha: 1.0,
            clip_min: None,
        }
    }
}

impl StackingConfig {
    pub fn with_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_meta_alpha(mut self, alpha: f64) -> Self {
        self.meta_alpha = alpha;
        self
    }

    pub fn with_clip_min(mut self, clip_min: Option<f64>) -> Self {
        self.clip_min = clip_min;
        self
    }
}

/// Concatenate base predictions with extra per-row meta-features
/// (reference forecast, then auxiliary predictions).
pub fn meta_matrix(base: &Array2<f64>, extras: &[&Array1<f64>]) -> Result<Array2<f64>> {
    let n = base.nrows();
    let mut meta = Array2::zeros((n, base.ncols() + extras.len()));
    meta.slice_mut(ndarray::s![.., ..base.ncols()]).assign(base);

    for (j, extra) in extras.iter().enumerate() {
        if extra.len() != n {
            return Err(StackcastError::ShapeError {
                expected: format!("{} meta rows", n),
                actual: format!("{} values in meta-feature {}", extra.len(), base.ncols() + j),
            });
        }
        meta.column_mut(base.ncols() + j).assign(*extra);
    }
    Ok(meta)
}

/// Two-level stack: out-of-fold base predictions feed a ridge meta-model,
/// base models are then refit on all rows for prediction.
pub struct StackingRegressor {
    config: StackingConfig,
    pool: BaseModelPool,
    fitted_base_models: Vec<Box<dyn Model>>,
    meta_learner: Option<RidgeRegression>,
}

impl StackingRegressor {
    pub fn new(config: StackingConfig, pool: BaseModelPool) -> Self {
        Self {
            config,
            pool,
            fitted_base_models: Vec::new(),
            meta_learner: None,
        }
    }

    pub fn config(&self) -> &StackingConfig {
        &self.config
    }

    /// Fit the stack. `extras` are appended to the base predictions in
    /// order and must be supplied identically to [`predict`](Self::predict).
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        extras: &[&Array1<f64>],
    ) -> Result<OutOfFoldPredictions> {
        self.pool.validate()?;
        let cv = CrossValidator::new(self.config.n_folds);
        cv.validate(x.nrows())?;
        ensure_finite("features", x, Some(y))?;

        let oof = cv.out_of_fold(&self.pool, x, y)?;

        let meta_x = meta_matrix(&oof.predictions, extras)?;
        ensure_finite("meta", &meta_x, None)?;
        let mut meta = RidgeRegression::new(self.config.meta_alpha);
        meta.fit(&meta_x, y).map_err(|e| e.for_model("meta", None))?;
        debug!(coefficients = ?meta.coefficients, "meta-learner fitted");

        self.fitted_base_models = self
            .pool
            .models()
            .iter()
            .map(|entry| {
                let mut model = entry.spec.build();
                model.fit(x, y).map_err(|e| e.for_model(&entry.name, None))?;
                Ok(model)
            })
            .collect::<Result<Vec<_>>>()?;
        self.meta_learner = Some(meta);

        Ok(oof)
    }

    /// Base predictions of the full-data refits, one column per model
    pub fn predict_base(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.fitted_base_models.is_empty() {
            return Err(StackcastError::ModelNotFitted);
        }
        let columns = self
            .fitted_base_models
            .iter()
            .zip(self.pool.models())
            .map(|(model, entry)| {
                model
                    .predict(x)
                    .map(|p| p.insert_axis(Axis(1)))
                    .map_err(|e| e.for_model(&entry.name, None))
            })
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<_> = columns.iter().map(|c| c.view()).collect();
        Ok(ndarray::concatenate(Axis(1), &views)?)
    }

    /// Final predictions for `x`. Rows with NaN/Inf features are rejected,
    /// the error naming the first such row.
    pub fn predict(&self, x: &Array2<f64>, extras: &[&Array1<f64>]) -> Result<Array1<f64>> {
        let meta = self.meta_learner.as_ref().ok_or(StackcastError::ModelNotFitted)?;
        ensure_finite("features", x, None)?;
        let meta_x = meta_matrix(&self.predict_base(x)?, extras)?;
        ensure_finite("meta", &meta_x, None)?;

        let predictions = meta.predict(&meta_x).map_err(|e| e.for_model("meta", None))?;
        Ok(match self.config.clip_min {
            Some(floor) => predictions.mapv(|p| p.max(floor)),
            None => predictions,
        })
    }

    /// Meta-learner weights, in meta-feature order
    pub fn meta_coefficients(&self) -> Option<&Array1<f64>> {
        self.meta_learner.as_ref().and_then(|m| m.coefficients.as_ref())
    }

    pub fn meta_intercept(&self) -> Option<f64> {
        self.meta_learner.as_ref().and_then(|m| m.intercept)
    }

    /// Mean of the full-data base models' importances, each normalised to
    /// sum to one. Models reporting none, or all zeros, are left out.
    pub fn base_importances(&self) -> Option<Array1<f64>> {
        let normalised: Vec<Array1<f64>> = self
            .fitted_base_models
            .iter()
            .filter_map(|m| m.feature_importances())
            .filter_map(|imp| {
                let total = imp.sum();
                (total > 0.0 && total.is_finite()).then(|| imp / total)
            })
            .collect();

        let first = normalised.first()?;
        let sum = normalised
            .iter()
            .skip(1)
            .fold(first.clone(), |acc, imp| acc + imp);
        Some(sum / normalised.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ModelSpec;
    use ndarray::array;

    #[test]
    fn test_meta_matrix_layout() {
        let base = array![[1.0, 2.0], [3.0, 4.0]];
        let reference = array![10.0, 20.0];
        let aux = array![-1.0, -2.0];
        let meta = meta_matrix(&base, &[&reference, &aux]).unwrap();
        assert_eq!(meta, array![[1.0, 2.0, 10.0, -1.0], [3.0, 4.0, 20.0, -2.0]]);

        assert!(meta_matrix(&base, &[&array![1.0]]).is_err());
    }

    #[test]
    fn test_stack_learns_from_reference() {
        // Target equals the reference forecast; base models see only noise
        let x = Array2::from_shape_fn((40, 1), |(i, _)| ((i * 7) % 5) as f64);
        let reference = Array1::from_shape_fn(40, |i| (i as f64).sin() * 10.0 + 50.0);
        let y = reference.clone();

        let mut stack = StackingRegressor::new(
            StackingConfig::default().with_meta_alpha(1e-6),
            BaseModelPool::mean_only(),
        );
        stack.fit(&x, &y, &[&reference]).unwrap();

        let preds = stack.predict(&x, &[&reference]).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-3);
        }
        let coef = stack.meta_coefficients().unwrap();
        assert!((coef[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_clip_min() {
        let x = Array2::zeros((10, 1));
        let y = Array1::from_elem(10, -5.0);
        let reference = Array1::zeros(10);

        let mut stack = StackingRegressor::new(
            StackingConfig::default().with_clip_min(Some(0.0)),
            BaseModelPool::mean_only(),
        );
        stack.fit(&x, &y, &[&reference]).unwrap();
        assert_eq!(stack.predict(&x, &[&reference]).unwrap(), Array1::<f64>::zeros(10));
    }

    #[test]
    fn test_too_many_folds_rejected_before_fit() {
        let x = Array2::zeros((3, 1));
        let y = array![1.0, 2.0, 3.0];
        let mut stack = StackingRegressor::new(StackingConfig::default(), BaseModelPool::mean_only());
        assert!(stack.fit(&x, &y, &[]).unwrap_err().is_configuration_mismatch());
        assert!(stack.predict(&x, &[]).is_err());
    }

    #[test]
    fn test_non_finite_features_fail_with_row() {
        let mut x = Array2::zeros((10, 2));
        x[[6, 1]] = f64::NAN;
        let y = Array1::zeros(10);
        let pool = BaseModelPool::mean_only().with_model("ridge", ModelSpec::Ridge { alpha: 1.0 });

        let err = StackingRegressor::new(StackingConfig::default(), pool)
            .fit(&x, &y, &[])
            .unwrap_err();
        match err {
            StackcastError::ModelFitFailure { window, .. } => assert_eq!(window, Some(6)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_prediction_rows_are_rejected() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = x.column(0).to_owned();
        let pool = BaseModelPool::new(vec![]).with_model(
            "xgb",
            ModelSpec::XGBoost(crate::training::XGBoostConfig { n_estimators: 5, ..Default::default() }),
        );
        let mut stack = StackingRegressor::new(StackingConfig::default(), pool);
        stack.fit(&x, &y, &[]).unwrap();

        let mut x_test = Array2::from_elem((3, 2), 1.0);
        x_test[[2, 0]] = f64::NAN;
        match stack.predict(&x_test, &[]) {
            Err(StackcastError::ModelFitFailure { model, window, .. }) => {
                assert_eq!(model, "features");
                assert_eq!(window, Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_base_importances_average_reporting_models() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        let y = x.column(0).mapv(|v| if v < 20.0 { 0.0 } else { 10.0 });

        let mean = StackingRegressor::new(StackingConfig::default(), BaseModelPool::mean_only());
        assert!(mean.base_importances().is_none());

        let pool = BaseModelPool::mean_only().with_model(
            "xgb",
            ModelSpec::XGBoost(crate::training::XGBoostConfig {
                n_estimators: 3,
                max_depth: 1,
                ..Default::default()
            }),
        );
        let mut stack = StackingRegressor::new(StackingConfig::default(), pool);
        stack.fit(&x, &y, &[]).unwrap();

        let imp = stack.base_importances().unwrap();
        assert_eq!(imp.len(), 2);
        assert!((imp.sum() - 1.0).abs() < 1e-12);
        assert!(imp[0] > imp[1]);
    }
}
