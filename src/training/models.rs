//! Model trait, model factory and the base-model pool

use super::lightgbm::{LightGBMConfig, LightGBMRegressor};
use super::linear_models::RidgeRegression;
use super::random_forest::{ForestConfig, MaxFeatures, RandomForest};
use super::xgboost::{XGBoostConfig, XGBoostRegressor};
use crate::error::{Result, StackcastError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Trait for regression models plugged into the stack
pub trait Model: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Get feature importances (if available)
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

impl Model for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RidgeRegression::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RidgeRegression::predict(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.coefficients.as_ref().map(|c| c.mapv(f64::abs))
    }
}

impl Model for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        RandomForest::feature_importances(self).cloned()
    }
}

impl Model for XGBoostRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        XGBoostRegressor::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        XGBoostRegressor::predict(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        XGBoostRegressor::feature_importances(self)
    }
}

impl Model for LightGBMRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LightGBMRegressor::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LightGBMRegressor::predict(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        LightGBMRegressor::feature_importances(self)
    }
}

/// Predicts the training mean everywhere
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeanRegressor {
    mean: Option<f64>,
}

impl MeanRegressor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Model for MeanRegressor {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let mean = y
            .mean()
            .ok_or_else(|| StackcastError::TrainingError("cannot fit on zero rows".to_string()))?;
        self.mean = Some(mean);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mean = self.mean.ok_or(StackcastError::ModelNotFitted)?;
        Ok(Array1::from_elem(x.nrows(), mean))
    }
}

/// Serializable description of a regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    #[serde(rename = "xgboost")]
    XGBoost(XGBoostConfig),
    #[serde(rename = "lightgbm")]
    LightGBM(LightGBMConfig),
    Ridge { alpha: f64 },
    RandomForest(ForestConfig),
    Mean,
}

impl ModelSpec {
    /// A fresh, unfitted instance
    pub fn build(&self) -> Box<dyn Model> {
        match self {
            ModelSpec::XGBoost(config) => Box::new(XGBoostRegressor::new(config.clone())),
            ModelSpec::LightGBM(config) => Box::new(LightGBMRegressor::new(config.clone())),
            ModelSpec::Ridge { alpha } => Box::new(RidgeRegression::new(*alpha)),
            ModelSpec::RandomForest(config) => Box::new(RandomForest::new(config.clone())),
            ModelSpec::Mean => Box::new(MeanRegressor::new()),
        }
    }
}

/// A named entry in the base pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseModel {
    pub name: String,
    pub spec: ModelSpec,
}

impl BaseModel {
    pub fn new(name: impl Into<String>, spec: ModelSpec) -> Self {
        Self { name: name.into(), spec }
    }
}

/// Ordered set of base regressors. The order fixes the column order of
/// the meta-feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseModelPool {
    models: Vec<BaseModel>,
}

impl Default for BaseModelPool {
    fn default() -> Self {
        Self::default_energy()
    }
}

impl BaseModelPool {
    pub fn new(models: Vec<BaseModel>) -> Self {
        Self { models }
    }

    /// Gradient-boosted trees (level-wise and leaf-wise), ridge and a
    /// random forest, all seeded with 42
    pub fn default_energy() -> Self {
        Self::new(vec![
            BaseModel::new(
                "xgb",
                ModelSpec::XGBoost(XGBoostConfig {
                    n_estimators: 200,
                    max_depth: 4,
                    learning_rate: 0.1,
                    random_state: Some(42),
                    ..Default::default()
                }),
            ),
            BaseModel::new(
                "lgbm",
                ModelSpec::LightGBM(LightGBMConfig {
                    n_estimators: 200,
                    max_depth: Some(4),
                    learning_rate: 0.1,
                    random_state: Some(42),
                    ..Default::default()
                }),
            ),
            BaseModel::new("ridge", ModelSpec::Ridge { alpha: 1.0 }),
            BaseModel::new(
                "rf",
                ModelSpec::RandomForest(ForestConfig {
                    n_estimators: 100,
                    max_depth: Some(8),
                    max_features: MaxFeatures::All,
                    bootstrap: true,
                    random_state: Some(42),
                    ..Default::default()
                }),
            ),
        ])
    }

    /// Single mean baseline
    pub fn mean_only() -> Self {
        Self::new(vec![BaseModel::new("mean", ModelSpec::Mean)])
    }

    pub fn with_model(mut self, name: impl Into<String>, spec: ModelSpec) -> Self {
        self.models.push(BaseModel::new(name, spec));
        self
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> &[BaseModel] {
        &self.models
    }

    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(StackcastError::ConfigurationMismatch(
                "base model pool is empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.name.as_str()) {
                return Err(StackcastError::ConfigurationMismatch(format!(
                    "duplicate base model name '{}'",
                    model.name
                )));
            }
        }
        Ok(())
    }
}

/// Reject NaN/Inf inputs before a fit. `row` in the error is the first
/// offending row of `x` (or `y`).
pub fn ensure_finite(model: &str, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<()> {
    if let Some((row, _)) = x
        .rows()
        .into_iter()
        .enumerate()
        .find(|(_, r)| r.iter().any(|v| !v.is_finite()))
    {
        return Err(StackcastError::ModelFitFailure {
            model: model.to_string(),
            window: Some(row),
            reason: "non-finite feature value".to_string(),
        });
    }
    if let Some(row) = y.and_then(|y| y.iter().position(|v| !v.is_finite())) {
        return Err(StackcastError::ModelFitFailure {
            model: model.to_string(),
            window: Some(row),
            reason: "non-finite target value".to_string(),
        });
    }
    Ok(())
}
