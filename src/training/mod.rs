//! Base regression models and out-of-fold training
//!
//! Provides the regressors the stacking ensemble draws on:
//! - Gradient boosting, level-wise (XGBoost-style) and leaf-wise (LightGBM-style)
//! - Ridge regression
//! - Random forest over CART regression trees
//! - A mean baseline
//!
//! plus contiguous-block cross-validation producing out-of-fold predictions.

mod boosting;
mod models;
pub mod cross_validation;
pub mod decision_tree;
pub mod lightgbm;
pub mod linear_models;
pub mod random_forest;
pub mod xgboost;

pub use cross_validation::{CVSplit, CrossValidator, FoldAssignment, OutOfFoldPredictions};
pub use decision_tree::{DecisionTree, TreeNode};
pub use lightgbm::{LightGBMConfig, LightGBMRegressor};
pub use linear_models::RidgeRegression;
pub use models::{ensure_finite, BaseModel, BaseModelPool, MeanRegressor, Model, ModelSpec};
pub use random_forest::{ForestConfig, MaxFeatures, RandomForest};
pub use xgboost::{XGBoostConfig, XGBoostRegressor};
